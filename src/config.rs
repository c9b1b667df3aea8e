//! Run configuration.
//!
//! Settings come from three layers, highest priority first: command-line
//! flags (or their environment variables), an optional YAML file, and
//! built-in defaults.
//!
//! ```yaml
//! feeds:
//!   - garfield
//!   - bignate
//! days_past: 10
//! base_dir: /srv/comics
//! ```
//!
//! Feed identifiers are validated here. An invalid entry is reported and
//! dropped; the remaining feeds still run.

use crate::cli::Cli;
use crate::models::FeedId;
use chrono::NaiveDate;
use itertools::Itertools;
use serde::Deserialize;
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};
use url::Url;

pub const DEFAULT_FEEDS: &[&str] = &["bignate", "pearlsbeforeswine"];
pub const DEFAULT_DAYS_PAST: u32 = 7;
pub const DEFAULT_BASE_DIR: &str = "..";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Contents of the optional YAML config file.
///
/// Feeds are kept as raw YAML values so a malformed entry (a number, a list)
/// is rejected on its own instead of failing the whole file.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub feeds: Option<Vec<Value>>,
    #[serde(default)]
    pub days_past: Option<u32>,
    #[serde(default)]
    pub base_dir: Option<PathBuf>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }
}

/// Validate a feed entry of any YAML type. Only strings can be feed ids.
pub fn feed_id_from_value(value: &Value) -> Option<FeedId> {
    value.as_str().and_then(FeedId::parse)
}

/// Split raw feed entries into valid ids (deduplicated, order kept) and the
/// printable form of the rejected ones.
pub fn partition_feeds(values: &[Value]) -> (Vec<FeedId>, Vec<String>) {
    let mut rejected = Vec::new();
    let feeds = values
        .iter()
        .filter_map(|value| {
            let feed = feed_id_from_value(value);
            if feed.is_none() {
                let label = match value.as_str() {
                    Some(s) => s.to_string(),
                    None => format!("{value:?}"),
                };
                rejected.push(label);
            }
            feed
        })
        .unique()
        .collect();
    (feeds, rejected)
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub feeds: Vec<FeedId>,
    pub rejected_feeds: Vec<String>,
    pub days_past: u32,
    pub base_dir: PathBuf,
    pub today: Option<NaiveDate>,
    pub source_base_url: Url,
    pub user_agent: String,
    pub timeout: Duration,
}

impl Settings {
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => {
                let file = FileConfig::load(path)?;
                info!(path = %path.display(), "Loaded config file");
                file
            }
            None => FileConfig::default(),
        };
        Ok(Self::merge(cli, file))
    }

    fn merge(cli: Cli, file: FileConfig) -> Self {
        let raw_feeds: Vec<Value> = match (cli.feeds, file.feeds) {
            (Some(feeds), _) => feeds.into_iter().map(Value::String).collect(),
            (None, Some(feeds)) => feeds,
            (None, None) => DEFAULT_FEEDS
                .iter()
                .map(|feed| Value::String(feed.to_string()))
                .collect(),
        };
        let (feeds, rejected_feeds) = partition_feeds(&raw_feeds);
        for feed in &rejected_feeds {
            error!(feed = %feed, "Invalid feed identifier; skipping feed");
        }
        if feeds.is_empty() {
            warn!("No valid feeds configured; nothing to do");
        }

        Self {
            feeds,
            rejected_feeds,
            days_past: cli.days_past.or(file.days_past).unwrap_or(DEFAULT_DAYS_PAST),
            base_dir: cli
                .base_dir
                .or(file.base_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_BASE_DIR)),
            today: cli.today,
            source_base_url: cli.source_base_url,
            user_agent: cli.user_agent,
            timeout: Duration::from_secs(cli.timeout_secs),
        }
    }
}
