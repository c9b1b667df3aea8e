//! The fetch-and-archive job loop.
//!
//! For every configured feed, and every date in the lookback window (newest
//! first), the runner decides what to do with the (feed, date) pair:
//!
//! | Archive / resolver state | Outcome | Writes |
//! |--------------------------|---------|--------|
//! | image already archived | `exists` | none |
//! | terminal-miss marker present | `terminal-miss` | none |
//! | resolver failed | `error` | none |
//! | resolver served an older date | `not-yet-published` | none |
//! | image found | `saved` | `comic.png` |
//! | absent, older than the grace window | `recorded-miss` | `.missing` |
//! | absent, inside the grace window | `pending` | none |
//!
//! Pairs left without a write are retried by the next run. Nothing that goes
//! wrong with one pair stops the others.

use crate::archive;
use crate::models::{EntryState, FeedId, Outcome, Resolution, RunSummary, midnight};
use crate::scrapers::FeedResolver;
use chrono::{NaiveDate, TimeDelta};
use std::path::PathBuf;
use tracing::{error, info, instrument, warn};

/// Days a confirmed absence must age before it becomes a terminal miss.
pub const GRACE_WINDOW_DAYS: i64 = 3;

/// Dates to visit for a lookback of `days_past` days, `today` first.
///
/// Stops early at the start of the representable calendar.
pub fn lookback(today: NaiveDate, days_past: u32) -> impl Iterator<Item = NaiveDate> {
    (0..days_past).map_while(move |i| today.checked_sub_signed(TimeDelta::days(i64::from(i))))
}

/// Whether a confirmed absence on `date` may be recorded as terminal.
pub fn past_grace_window(date: NaiveDate, today: NaiveDate) -> bool {
    (today - date).num_days() > GRACE_WINDOW_DAYS
}

/// Owns the resolver (and through it the render engine) for one run.
#[derive(Debug)]
pub struct Runner<F> {
    resolver: F,
    base_dir: PathBuf,
    days_past: u32,
}

impl<F: FeedResolver> Runner<F> {
    pub fn new(resolver: F, base_dir: PathBuf, days_past: u32) -> Self {
        Self {
            resolver,
            base_dir,
            days_past,
        }
    }

    /// Process every (feed, date) pair once, feed by feed.
    ///
    /// Consumes the runner so the resolver is released when the run ends.
    #[instrument(level = "info", skip_all, fields(feeds = feeds.len(), days_past = self.days_past, %today))]
    pub async fn run(self, feeds: &[FeedId], today: NaiveDate) -> RunSummary {
        let mut summary = RunSummary::default();
        for feed in feeds {
            info!(%feed, "Processing feed");
            for date in lookback(today, self.days_past) {
                let outcome = self.process(feed, date, today).await;
                summary.record(outcome);
            }
        }
        info!(
            total = summary.total(),
            saved = summary.saved,
            recorded_miss = summary.recorded_miss,
            exists = summary.exists,
            terminal_miss = summary.terminal_miss,
            not_yet_published = summary.not_yet_published,
            pending = summary.pending,
            errored = summary.errored,
            "Run finished"
        );
        summary
    }

    /// Decide and apply the outcome for one (feed, date) pair.
    pub async fn process(&self, feed: &FeedId, date: NaiveDate, today: NaiveDate) -> Outcome {
        let image_path = archive::image_path(feed, date, &self.base_dir);
        let marker_path = archive::marker_path(feed, date, &self.base_dir);

        match archive::entry_state(feed, date, &self.base_dir) {
            EntryState::Resolved => {
                info!(%feed, %date, outcome = %Outcome::Exists, path = %image_path.display(), "Comic already archived");
                return Outcome::Exists;
            }
            EntryState::TerminalMiss => {
                info!(%feed, %date, outcome = %Outcome::TerminalMiss, path = %marker_path.display(), "Comic recorded as missing");
                return Outcome::TerminalMiss;
            }
            EntryState::Absent => {}
        }

        let resolution = match self.resolver.resolve(feed, date).await {
            Ok(resolution) => resolution,
            Err(e) => {
                error!(%feed, %date, outcome = %Outcome::Errored, error = %e, "Failed to resolve comic; will retry next run");
                return Outcome::Errored;
            }
        };

        let resolved_at = resolution.resolved_at();
        if resolved_at < midnight(date) {
            info!(%feed, %date, outcome = %Outcome::NotYetPublished, %resolved_at, "Comic not published yet; publisher served an older strip");
            return Outcome::NotYetPublished;
        }

        match resolution {
            Resolution::Found { image, .. } => {
                match archive::save_image(feed, date, &self.base_dir, &image).await {
                    Ok(path) => {
                        info!(%feed, %date, outcome = %Outcome::Saved, path = %path.display(), "Downloaded comic");
                        Outcome::Saved
                    }
                    Err(e) => {
                        error!(%feed, %date, outcome = %Outcome::Errored, error = %e, "Failed to write comic");
                        Outcome::Errored
                    }
                }
            }
            Resolution::Absent { .. } if past_grace_window(date, today) => {
                match archive::record_miss(feed, date, &self.base_dir).await {
                    Ok(path) => {
                        info!(%feed, %date, outcome = %Outcome::RecordedMiss, path = %path.display(), "Comic does not exist; recorded as missing");
                        Outcome::RecordedMiss
                    }
                    Err(e) => {
                        error!(%feed, %date, outcome = %Outcome::Errored, error = %e, "Failed to write missing marker");
                        Outcome::Errored
                    }
                }
            }
            Resolution::Absent { .. } => {
                warn!(%feed, %date, outcome = %Outcome::Pending, "Comic not published yet; inside grace window");
                Outcome::Pending
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::ResolveError;
    use image::{DynamicImage, RgbImage};
    use std::collections::{BTreeMap, HashMap};
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use url::Url;

    #[derive(Debug, Clone, Copy)]
    enum Script {
        Image,
        ImageFrom(NaiveDate),
        Absent,
        Fail,
    }

    /// Resolver that answers from a script and logs every call.
    #[derive(Debug, Clone)]
    struct FakeResolver {
        default: Script,
        overrides: HashMap<(String, NaiveDate), Script>,
        calls: Arc<Mutex<Vec<(String, NaiveDate)>>>,
    }

    impl FakeResolver {
        fn new(default: Script) -> Self {
            Self {
                default,
                overrides: HashMap::new(),
                calls: Arc::default(),
            }
        }

        fn with(mut self, feed: &str, date: NaiveDate, script: Script) -> Self {
            self.overrides.insert((feed.to_string(), date), script);
            self
        }

        fn calls(&self) -> Vec<(String, NaiveDate)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl FeedResolver for FakeResolver {
        async fn resolve(&self, feed: &FeedId, date: NaiveDate) -> Result<Resolution, ResolveError> {
            self.calls.lock().unwrap().push((feed.to_string(), date));
            let script = self
                .overrides
                .get(&(feed.to_string(), date))
                .copied()
                .unwrap_or(self.default);
            let image = || DynamicImage::ImageRgb8(RgbImage::new(2, 2));
            match script {
                Script::Image => Ok(Resolution::Found {
                    image: image(),
                    resolved_at: midnight(date),
                }),
                Script::ImageFrom(served) => Ok(Resolution::Found {
                    image: image(),
                    resolved_at: midnight(served),
                }),
                Script::Absent => Ok(Resolution::Absent {
                    resolved_at: midnight(date),
                }),
                Script::Fail => Err(ResolveError::Layout {
                    url: Url::parse("https://example.com/layout-changed").unwrap(),
                    selector: "img",
                }),
            }
        }
    }

    fn feed(name: &str) -> FeedId {
        FeedId::parse(name).unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 15).unwrap()
    }

    fn days_ago(n: i64) -> NaiveDate {
        today() - TimeDelta::days(n)
    }

    /// Every file under `base`, relative path to contents.
    fn snapshot(base: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
        fn walk(dir: &Path, base: &Path, out: &mut BTreeMap<PathBuf, Vec<u8>>) {
            let Ok(entries) = std::fs::read_dir(dir) else {
                return;
            };
            for entry in entries {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    walk(&path, base, out);
                } else {
                    let rel = path.strip_prefix(base).unwrap().to_path_buf();
                    out.insert(rel, std::fs::read(&path).unwrap());
                }
            }
        }
        let mut out = BTreeMap::new();
        walk(base, base, &mut out);
        out
    }

    #[test]
    fn test_lookback_is_newest_first() {
        let dates: Vec<_> = lookback(NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(), 3).collect();
        assert_eq!(
            dates,
            [
                NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
                NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
            ]
        );
        assert_eq!(lookback(today(), 0).count(), 0);
    }

    #[test]
    fn test_lookback_stops_at_earliest_date() {
        let start = NaiveDate::MIN + TimeDelta::days(1);
        let dates: Vec<_> = lookback(start, 5).collect();
        assert_eq!(dates, [start, NaiveDate::MIN]);
    }

    #[test]
    fn test_grace_window_boundary() {
        assert!(!past_grace_window(today(), today()));
        assert!(!past_grace_window(days_ago(1), today()));
        assert!(!past_grace_window(days_ago(3), today()));
        assert!(past_grace_window(days_ago(4), today()));
        assert!(past_grace_window(days_ago(10), today()));
    }

    #[tokio::test]
    async fn test_saves_every_pair_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = FakeResolver::new(Script::Image);
        let runner = Runner::new(resolver.clone(), tmp.path().to_path_buf(), 3);

        let summary = runner.run(&[feed("garfield"), feed("bignate")], today()).await;

        assert_eq!(summary.saved, 6);
        assert_eq!(summary.writes(), 6);
        let expected: Vec<_> = ["garfield", "bignate"]
            .iter()
            .flat_map(|f| (0..3).map(move |i| (f.to_string(), days_ago(i))))
            .collect();
        assert_eq!(resolver.calls(), expected);
        for (name, date) in expected {
            assert!(archive::has_image(&feed(&name), date, tmp.path()));
        }
    }

    #[tokio::test]
    async fn test_second_run_is_a_no_op() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = FakeResolver::new(Script::Image).with("garfield", days_ago(5), Script::Absent);
        let feeds = [feed("garfield"), feed("bignate")];

        let first = Runner::new(resolver.clone(), tmp.path().to_path_buf(), 7)
            .run(&feeds, today())
            .await;
        assert_eq!(first.saved, 13);
        assert_eq!(first.recorded_miss, 1);
        let after_first = snapshot(tmp.path());
        let calls_after_first = resolver.calls().len();

        let second = Runner::new(resolver.clone(), tmp.path().to_path_buf(), 7)
            .run(&feeds, today())
            .await;
        assert_eq!(second.writes(), 0);
        assert_eq!(second.exists, 13);
        assert_eq!(second.terminal_miss, 1);
        assert_eq!(resolver.calls().len(), calls_after_first);
        assert_eq!(snapshot(tmp.path()), after_first);
    }

    #[tokio::test]
    async fn test_absence_is_terminal_only_after_grace_window() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = Runner::new(FakeResolver::new(Script::Absent), tmp.path().to_path_buf(), 11);
        let f = feed("garfield");

        let summary = runner.run(std::slice::from_ref(&f), today()).await;

        assert!(archive::has_terminal_miss(&f, days_ago(10), tmp.path()));
        assert!(archive::has_terminal_miss(&f, days_ago(4), tmp.path()));
        assert!(!archive::has_terminal_miss(&f, days_ago(3), tmp.path()));
        assert!(!archive::has_terminal_miss(&f, days_ago(1), tmp.path()));
        assert!(!archive::entry_dir(&f, days_ago(1), tmp.path()).exists());
        assert_eq!(summary.recorded_miss, 7);
        assert_eq!(summary.pending, 4);
        assert_eq!(summary.errored, 0);
    }

    #[tokio::test]
    async fn test_older_served_date_is_not_yet_published() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = FakeResolver::new(Script::ImageFrom(days_ago(1)));
        let runner = Runner::new(resolver, tmp.path().to_path_buf(), 1);
        let f = feed("garfield");

        let outcome = runner.process(&f, today(), today()).await;

        assert_eq!(outcome, Outcome::NotYetPublished);
        assert_eq!(archive::entry_state(&f, today(), tmp.path()), EntryState::Absent);
        assert!(snapshot(tmp.path()).is_empty());
    }

    #[tokio::test]
    async fn test_error_does_not_stop_the_run() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = FakeResolver::new(Script::Image).with("garfield", days_ago(1), Script::Fail);
        let runner = Runner::new(resolver.clone(), tmp.path().to_path_buf(), 3);

        let summary = runner.run(&[feed("garfield"), feed("bignate")], today()).await;

        assert_eq!(summary.errored, 1);
        assert_eq!(summary.saved, 5);
        assert_eq!(resolver.calls().len(), 6);
        assert_eq!(
            archive::entry_state(&feed("garfield"), days_ago(1), tmp.path()),
            EntryState::Absent
        );
        assert!(archive::has_image(&feed("garfield"), days_ago(2), tmp.path()));
    }

    #[tokio::test]
    async fn test_existing_entries_skip_the_resolver() {
        let tmp = tempfile::tempdir().unwrap();
        let f = feed("garfield");
        archive::record_miss(&f, days_ago(1), tmp.path()).await.unwrap();
        archive::save_image(&f, today(), tmp.path(), &DynamicImage::ImageRgb8(RgbImage::new(1, 1)))
            .await
            .unwrap();
        let resolver = FakeResolver::new(Script::Image);
        let runner = Runner::new(resolver.clone(), tmp.path().to_path_buf(), 3);

        let summary = runner.run(std::slice::from_ref(&f), today()).await;

        assert_eq!(summary.exists, 1);
        assert_eq!(summary.terminal_miss, 1);
        assert_eq!(summary.saved, 1);
        assert_eq!(resolver.calls(), [("garfield".to_string(), days_ago(2))]);
        assert!(!archive::has_image(&f, days_ago(1), tmp.path()));
    }

    #[tokio::test]
    async fn test_write_failure_is_an_error_outcome() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join("blocked");
        std::fs::write(&base, b"not a directory").unwrap();
        let runner = Runner::new(FakeResolver::new(Script::Image), base, 2);

        let summary = runner.run(&[feed("garfield")], today()).await;

        assert_eq!(summary.errored, 2);
        assert_eq!(summary.writes(), 0);
    }
}
