//! On-disk comic archive.
//!
//! The archive tree is the only persisted state. Every (feed, date) pair owns
//! one directory:
//!
//! ```text
//! base_dir/
//! └── comics/
//!     └── garfield/
//!         ├── 2024-05-15/
//!         │   └── comic.png     # resolved
//!         └── 2024-05-01/
//!             └── .missing      # terminal miss
//! ```
//!
//! Directory names use zero-padded dates, unlike the publisher's URLs.

use crate::models::{EntryState, FeedId};
use crate::utils::archive_date;
use chrono::NaiveDate;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument};

const ARCHIVE_DIR: &str = "comics";
const IMAGE_FILE: &str = "comic.png";
const IMAGE_PART_FILE: &str = ".comic.png.part";
const MARKER_FILE: &str = ".missing";
const WRITE_CHECK_FILE: &str = ".write-check";

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode image: {0}")]
    Encode(#[from] image::ImageError),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ArchiveError + '_ {
    move |source| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Create the `comics/` root under `base_dir` and make sure it accepts writes.
///
/// Returns the root. Failing here means no pair could ever be archived.
#[instrument(level = "info", skip_all, fields(base_dir = %base_dir.display()))]
pub async fn prepare_root(base_dir: &Path) -> Result<PathBuf, ArchiveError> {
    let root = base_dir.join(ARCHIVE_DIR);
    fs::create_dir_all(&root).await.map_err(io_error(&root))?;

    let check = root.join(WRITE_CHECK_FILE);
    fs::write(&check, b"").await.map_err(io_error(&check))?;
    fs::remove_file(&check).await.map_err(io_error(&check))?;
    info!(root = %root.display(), "Archive root is writable");
    Ok(root)
}

/// Directory holding every file for one (feed, date) pair.
pub fn entry_dir(feed: &FeedId, date: NaiveDate, base_dir: &Path) -> PathBuf {
    base_dir
        .join(ARCHIVE_DIR)
        .join(feed.as_str())
        .join(archive_date(date))
}

/// Where the image for (feed, date) is stored.
pub fn image_path(feed: &FeedId, date: NaiveDate, base_dir: &Path) -> PathBuf {
    entry_dir(feed, date, base_dir).join(IMAGE_FILE)
}

/// Where the terminal-miss marker for (feed, date) is stored.
pub fn marker_path(feed: &FeedId, date: NaiveDate, base_dir: &Path) -> PathBuf {
    entry_dir(feed, date, base_dir).join(MARKER_FILE)
}

pub fn has_image(feed: &FeedId, date: NaiveDate, base_dir: &Path) -> bool {
    image_path(feed, date, base_dir).exists()
}

pub fn has_terminal_miss(feed: &FeedId, date: NaiveDate, base_dir: &Path) -> bool {
    marker_path(feed, date, base_dir).exists()
}

/// Current state of the entry. An archived image wins over a stray marker.
pub fn entry_state(feed: &FeedId, date: NaiveDate, base_dir: &Path) -> EntryState {
    if has_image(feed, date, base_dir) {
        EntryState::Resolved
    } else if has_terminal_miss(feed, date, base_dir) {
        EntryState::TerminalMiss
    } else {
        EntryState::Absent
    }
}

/// Encode `image` as PNG and store it at [`image_path`].
///
/// The bytes go to a sibling `.part` file first and are renamed into place,
/// so an interrupted write never leaves a partial `comic.png` behind.
#[instrument(level = "debug", skip_all, fields(%feed, %date))]
pub async fn save_image(
    feed: &FeedId,
    date: NaiveDate,
    base_dir: &Path,
    image: &DynamicImage,
) -> Result<PathBuf, ArchiveError> {
    let dir = entry_dir(feed, date, base_dir);
    fs::create_dir_all(&dir).await.map_err(io_error(&dir))?;

    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;

    let part = dir.join(IMAGE_PART_FILE);
    let path = dir.join(IMAGE_FILE);
    fs::write(&part, &bytes).await.map_err(io_error(&part))?;
    fs::rename(&part, &path).await.map_err(io_error(&path))?;
    debug!(path = %path.display(), bytes = bytes.len(), "Wrote image");
    Ok(path)
}

/// Create the empty terminal-miss marker at [`marker_path`].
#[instrument(level = "debug", skip_all, fields(%feed, %date))]
pub async fn record_miss(
    feed: &FeedId,
    date: NaiveDate,
    base_dir: &Path,
) -> Result<PathBuf, ArchiveError> {
    let dir = entry_dir(feed, date, base_dir);
    fs::create_dir_all(&dir).await.map_err(io_error(&dir))?;
    let path = dir.join(MARKER_FILE);
    fs::write(&path, b"").await.map_err(io_error(&path))?;
    debug!(path = %path.display(), "Wrote terminal-miss marker");
    Ok(path)
}
