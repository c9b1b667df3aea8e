//! Publisher-specific feed resolvers.
//!
//! A resolver turns a (feed, date) pair into a [`Resolution`]: either a
//! decoded image, or the publisher's explicit statement that nothing exists
//! for that date. Each publisher is one variant of [`Resolver`], so the job
//! runner never needs to know which site it is talking to.
//!
//! # Supported Publishers
//!
//! | Publisher | Module | Method |
//! |-----------|--------|--------|
//! | GoComics | [`gocomics`] | HTML page + image download |
//!
//! # Errors
//!
//! Only an explicit "not published" indicator yields [`Resolution::Absent`].
//! Anything else that goes wrong, including a page whose layout no longer
//! matches the expected selectors, is a [`ResolveError`].

use crate::models::{FeedId, Resolution};
use crate::render::{PageRenderer, RenderError};
use chrono::NaiveDate;
use url::Url;

pub mod gocomics;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("failed to load page: {0}")]
    Render(#[source] RenderError),
    #[error("no element matching `{selector}` on {url}")]
    Layout { url: Url, selector: &'static str },
    #[error("comic image on {url} has no src")]
    MissingSource { url: Url },
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("failed to download image: {0}")]
    Download(#[source] RenderError),
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
}

/// The capability the job runner depends on.
pub trait FeedResolver {
    /// Resolve one (feed, date) pair with a single render and download.
    async fn resolve(&self, feed: &FeedId, date: NaiveDate) -> Result<Resolution, ResolveError>;
}

/// Closed set of publishers.
#[derive(Debug)]
pub enum Resolver<R> {
    GoComics(gocomics::GoComics<R>),
}

impl<R: PageRenderer> FeedResolver for Resolver<R> {
    async fn resolve(&self, feed: &FeedId, date: NaiveDate) -> Result<Resolution, ResolveError> {
        match self {
            Resolver::GoComics(publisher) => publisher.resolve(feed, date).await,
        }
    }
}
