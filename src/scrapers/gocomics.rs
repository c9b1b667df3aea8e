//! GoComics resolver.
//!
//! Strips live at `https://www.gocomics.com/{feed}/{year}/{month}/{day}` with
//! month and day NOT zero-padded, e.g. `/garfield/2024/1/5`.
//!
//! When a date has no strip, GoComics either shows an alert box on the page
//! or redirects to the most recent strip it has. The first case is a
//! confirmed absence. The second is detected from the final URL after
//! redirects and reported through `resolved_at`: any strip that cannot be
//! attributed to the requested date is reported as published before it.

use super::{FeedResolver, ResolveError};
use crate::models::{FeedId, Resolution, midnight};
use crate::render::PageRenderer;
use crate::utils::url_date;
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Selector;
use tracing::{debug, info, instrument};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://www.gocomics.com";

const NOT_PUBLISHED_CSS: &str = "div.amu-container-alert > div";
const COMIC_IMAGE_CSS: &str = "div.comic__container > div > a > picture > img";

static NOT_PUBLISHED: Lazy<Selector> =
    Lazy::new(|| Selector::parse(NOT_PUBLISHED_CSS).expect("static selector"));
static COMIC_IMAGE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(COMIC_IMAGE_CSS).expect("static selector"));
static DATED_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/[A-Za-z0-9-]+/(\d{4})/(\d{1,2})/(\d{1,2})/?$").expect("static regex")
});

/// Page URL for `feed` on `date` under `base`.
pub fn source_url(base: &Url, feed: &FeedId, date: NaiveDate) -> Result<Url, url::ParseError> {
    Url::parse(&format!(
        "{}/{}/{}",
        base.as_str().trim_end_matches('/'),
        feed,
        url_date(date)
    ))
}

/// Date named by a `/{feed}/{year}/{month}/{day}` page URL, if it is one.
pub fn served_date(url: &Url) -> Option<NaiveDate> {
    let caps = DATED_PATH.captures(url.path())?;
    NaiveDate::from_ymd_opt(
        caps[1].parse().ok()?,
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
    )
}

/// Publication time of the strip behind `final_url`, a page loaded for `date`
/// from `requested`.
///
/// A redirect to an older dated page reports that page's midnight. A redirect
/// to an undated page (the feed's latest strip) or to a later date reports
/// the instant before the requested midnight, so the strip is never archived
/// under `date`.
pub fn served_at(requested: &Url, final_url: &Url, date: NaiveDate) -> NaiveDateTime {
    let requested_at = midnight(date);
    if final_url == requested {
        return requested_at;
    }
    match served_date(final_url) {
        Some(served) if served == date => requested_at,
        Some(served) if served < date => midnight(served),
        _ => requested_at
            .checked_sub_signed(TimeDelta::seconds(1))
            .unwrap_or(NaiveDateTime::MIN),
    }
}

#[derive(Debug)]
pub struct GoComics<R> {
    renderer: R,
    base_url: Url,
}

impl<R> GoComics<R> {
    pub fn new(renderer: R, base_url: Url) -> Self {
        Self { renderer, base_url }
    }
}

impl<R: PageRenderer> FeedResolver for GoComics<R> {
    #[instrument(level = "info", skip_all, fields(%feed, %date))]
    async fn resolve(&self, feed: &FeedId, date: NaiveDate) -> Result<Resolution, ResolveError> {
        let url = source_url(&self.base_url, feed, date)?;
        let page = self.renderer.load(&url).await.map_err(ResolveError::Render)?;

        let resolved_at = served_at(&url, &page.url, date);
        if resolved_at != midnight(date) {
            info!(requested = %date, %resolved_at, final_url = %page.url, "Publisher served a different strip");
        }

        if page.find_first(&NOT_PUBLISHED).is_some() {
            debug!("Found not-published indicator");
            return Ok(Resolution::Absent { resolved_at });
        }

        let element = page
            .find_first(&COMIC_IMAGE)
            .ok_or_else(|| ResolveError::Layout {
                url: page.url.clone(),
                selector: COMIC_IMAGE_CSS,
            })?;
        let src = element
            .attr("src")
            .map(str::trim)
            .filter(|src| !src.is_empty())
            .ok_or_else(|| ResolveError::MissingSource {
                url: page.url.clone(),
            })?;
        let image_url = page.resolve_link(src)?;

        let bytes = self
            .renderer
            .fetch_bytes(&image_url)
            .await
            .map_err(ResolveError::Download)?;
        let image = image::load_from_memory(&bytes)?;
        debug!(
            %image_url,
            bytes = bytes.len(),
            width = image.width(),
            height = image.height(),
            "Decoded comic image"
        );

        Ok(Resolution::Found { image, resolved_at })
    }
}
