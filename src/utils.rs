//! Utility functions for feed id validation and date formatting.

use chrono::{Datelike, NaiveDate};

/// Check if a feed identifier is valid.
///
/// A valid identifier is non-empty and consists only of ASCII alphanumerics
/// and hyphens, which keeps it safe as both a URL segment and a directory name.
///
/// # Examples
///
/// ```ignore
/// assert!(is_valid_feed_id("calvin-and-hobbes"));
/// assert!(!is_valid_feed_id("comic/with/slash"));
/// ```
pub fn is_valid_feed_id(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Zero-padded `YYYY-MM-DD` form used for archive directories.
pub fn archive_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Unpadded `year/month/day` form used in publisher URLs.
pub fn url_date(date: NaiveDate) -> String {
    format!("{}/{}/{}", date.year(), date.month(), date.day())
}
