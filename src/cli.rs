//! Command-line interface definitions for the comic archiver.
//!
//! Every option can also be supplied through an environment variable, which is
//! the usual way to configure it from a scheduler (cron, systemd timer, CI).

use crate::scrapers::gocomics::DEFAULT_BASE_URL;
use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;
use url::Url;

pub const DEFAULT_USER_AGENT: &str = concat!("comic_archive/", env!("CARGO_PKG_VERSION"));

/// Command-line arguments for one archiving run.
///
/// Options left unset fall back to the YAML config file (if given), then to
/// built-in defaults.
///
/// # Examples
///
/// ```sh
/// # Default feeds, last 7 days, archive under ..
/// comic_archive
///
/// # Explicit feeds and window
/// comic_archive --feeds garfield,bignate --days-past 14 --base-dir /srv/comics
///
/// # Same, from the environment
/// COMIC_FEEDS=garfield,bignate COMIC_DAYS_PAST=14 comic_archive
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Comma-separated feed identifiers (e.g. garfield,bignate)
    #[arg(short, long, env = "COMIC_FEEDS", value_delimiter = ',')]
    pub feeds: Option<Vec<String>>,

    /// Optional path to a YAML config file
    #[arg(short, long, env = "COMIC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Number of days to look back, today included
    #[arg(short, long, env = "COMIC_DAYS_PAST")]
    pub days_past: Option<u32>,

    /// Directory under which the `comics/` archive lives
    #[arg(short, long, env = "COMIC_BASE_DIR")]
    pub base_dir: Option<PathBuf>,

    /// Treat this date (YYYY-MM-DD) as today instead of the local date
    #[arg(long, env = "COMIC_TODAY")]
    pub today: Option<NaiveDate>,

    /// Publisher base URL
    #[arg(long, env = "COMIC_SOURCE_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub source_base_url: Url,

    /// User agent sent with every request
    #[arg(long, env = "COMIC_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// Per-request timeout in seconds
    #[arg(long, env = "COMIC_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,
}

#[cfg(test)]
impl Cli {
    /// The command with every `COMIC_*` fallback removed, so parsing only
    /// sees the given arguments whatever the calling shell exports.
    pub(crate) fn command_without_env() -> clap::Command {
        <Self as clap::CommandFactory>::command().mut_args(|arg| arg.env(None::<&'static str>))
    }

    pub(crate) fn try_parse_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let matches = Self::command_without_env().try_get_matches_from(args)?;
        <Self as clap::FromArgMatches>::from_arg_matches(&matches)
    }

    pub(crate) fn parse_args<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Self::try_parse_args(args).unwrap()
    }
}
