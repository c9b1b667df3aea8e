//! Data models shared by the resolver, the archive and the job runner.
//!
//! - [`FeedId`]: a validated comic feed identifier (e.g. `garfield`)
//! - [`Resolution`]: what a resolver produced for one (feed, date) pair
//! - [`EntryState`]: what the archive already holds for a pair
//! - [`Outcome`]: the decision the runner took for a pair
//! - [`RunSummary`]: per-outcome counters for a whole run

use crate::utils::is_valid_feed_id;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use image::DynamicImage;
use std::fmt;

/// A comic feed identifier that has passed validation.
///
/// Only ASCII alphanumerics and `-` are allowed, so the identifier is safe to
/// use both as a URL path segment and as a directory name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeedId(String);

impl FeedId {
    /// Validate `name` and wrap it, or return `None` if it is not a valid id.
    pub fn parse(name: &str) -> Option<Self> {
        is_valid_feed_id(name).then(|| Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Midnight at the start of `date`.
pub fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

/// Result of a single resolver invocation.
///
/// `resolved_at` is the publication timestamp the resolver actually served.
/// It is earlier than the requested date's midnight when the publisher fell
/// back to an older strip.
#[derive(Debug)]
pub enum Resolution {
    /// An image was found and decoded.
    Found {
        image: DynamicImage,
        resolved_at: NaiveDateTime,
    },
    /// The publisher explicitly reported that nothing exists for the date.
    Absent { resolved_at: NaiveDateTime },
}

impl Resolution {
    pub fn resolved_at(&self) -> NaiveDateTime {
        match self {
            Resolution::Found { resolved_at, .. } | Resolution::Absent { resolved_at } => {
                *resolved_at
            }
        }
    }
}

/// Persisted state of an archive entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Absent,
    Resolved,
    TerminalMiss,
}

/// Decision taken by the runner for one (feed, date) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// An image was already archived.
    Exists,
    /// A terminal-miss marker was already archived.
    TerminalMiss,
    /// The resolver served an older date than requested; nothing written.
    NotYetPublished,
    /// Confirmed absent but still inside the grace window; nothing written.
    Pending,
    /// The image was written to the archive.
    Saved,
    /// A terminal-miss marker was written.
    RecordedMiss,
    /// Resolution or archive write failed; nothing written.
    Errored,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Exists => "exists",
            Outcome::TerminalMiss => "terminal-miss",
            Outcome::NotYetPublished => "not-yet-published",
            Outcome::Pending => "pending",
            Outcome::Saved => "saved",
            Outcome::RecordedMiss => "recorded-miss",
            Outcome::Errored => "error",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters for one run of the job runner.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub exists: usize,
    pub terminal_miss: usize,
    pub not_yet_published: usize,
    pub pending: usize,
    pub saved: usize,
    pub recorded_miss: usize,
    pub errored: usize,
    /// Feeds skipped because their identifier failed validation.
    pub rejected_feeds: usize,
}

impl RunSummary {
    pub fn record(&mut self, outcome: Outcome) {
        let counter = match outcome {
            Outcome::Exists => &mut self.exists,
            Outcome::TerminalMiss => &mut self.terminal_miss,
            Outcome::NotYetPublished => &mut self.not_yet_published,
            Outcome::Pending => &mut self.pending,
            Outcome::Saved => &mut self.saved,
            Outcome::RecordedMiss => &mut self.recorded_miss,
            Outcome::Errored => &mut self.errored,
        };
        *counter += 1;
    }

    /// Number of archive writes performed.
    pub fn writes(&self) -> usize {
        self.saved + self.recorded_miss
    }

    /// Number of (feed, date) pairs visited.
    pub fn total(&self) -> usize {
        self.exists
            + self.terminal_miss
            + self.not_yet_published
            + self.pending
            + self.saved
            + self.recorded_miss
            + self.errored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_id_parse() {
        assert_eq!(FeedId::parse("garfield").unwrap().as_str(), "garfield");
        assert!(FeedId::parse("calvin-and-hobbes").is_some());
        assert!(FeedId::parse("").is_none());
        assert!(FeedId::parse("../etc").is_none());
    }

    #[test]
    fn test_midnight() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(midnight(date).to_string(), "2024-01-05 00:00:00");
    }

    #[test]
    fn test_run_summary_counts() {
        let mut summary = RunSummary::default();
        summary.record(Outcome::Saved);
        summary.record(Outcome::RecordedMiss);
        summary.record(Outcome::Exists);
        summary.record(Outcome::Errored);
        assert_eq!(summary.writes(), 2);
        assert_eq!(summary.total(), 4);
        assert_eq!(summary.errored, 1);
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(Outcome::NotYetPublished.to_string(), "not-yet-published");
        assert_eq!(Outcome::RecordedMiss.to_string(), "recorded-miss");
        assert_eq!(Outcome::Errored.as_str(), "error");
    }
}
