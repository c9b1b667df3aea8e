//! Page rendering and byte fetching.
//!
//! Resolvers only need two capabilities from the outside world: load a page
//! and look up elements in it, and download raw bytes. [`PageRenderer`] is
//! that seam. [`HttpRenderer`] implements it with a plain HTTP client and an
//! HTML parser, which is enough for publishers that render server-side.

use reqwest::Client;
use scraper::{Html, Selector};
use std::time::{Duration, Instant};
use tracing::{debug, instrument};
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected status code {status} for {url}")]
    HttpStatus { url: Url, status: u16 },
}

/// A loaded page: where it ended up after redirects, and its markup.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub url: Url,
    pub html: String,
}

/// Attributes of an element found on a [`RenderedPage`].
#[derive(Debug, Clone, Default)]
pub struct PageElement {
    attrs: Vec<(String, String)>,
}

impl PageElement {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

impl RenderedPage {
    /// First element matching `selector`, if any.
    pub fn find_first(&self, selector: &Selector) -> Option<PageElement> {
        let document = Html::parse_document(&self.html);
        document.select(selector).next().map(|element| PageElement {
            attrs: element
                .value()
                .attrs()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        })
    }

    /// Resolve a possibly relative link against the page's final URL.
    pub fn resolve_link(&self, href: &str) -> Result<Url, url::ParseError> {
        self.url.join(href)
    }
}

/// The render/fetch collaborator used by resolvers.
pub trait PageRenderer {
    /// Load the page at `url`, following redirects.
    async fn load(&self, url: &Url) -> Result<RenderedPage, RenderError>;

    /// Fetch the raw bytes at `url`.
    async fn fetch_bytes(&self, url: &Url) -> Result<Vec<u8>, RenderError>;
}

/// [`PageRenderer`] backed by `reqwest` and `scraper`.
#[derive(Debug, Clone)]
pub struct HttpRenderer {
    client: Client,
}

impl HttpRenderer {
    /// Build the HTTP client. Failing here means nothing can be fetched this run.
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, RenderError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    async fn get(&self, url: &Url) -> Result<reqwest::Response, RenderError> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RenderError::HttpStatus {
                url: response.url().clone(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

impl PageRenderer for HttpRenderer {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn load(&self, url: &Url) -> Result<RenderedPage, RenderError> {
        let t0 = Instant::now();
        let response = self.get(url).await?;
        let final_url = response.url().clone();
        let html = response.text().await?;
        debug!(
            final_url = %final_url,
            bytes = html.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Loaded page"
        );
        Ok(RenderedPage {
            url: final_url,
            html,
        })
    }

    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch_bytes(&self, url: &Url) -> Result<Vec<u8>, RenderError> {
        let bytes = self.get(url).await?.bytes().await?;
        debug!(bytes = bytes.len(), "Fetched bytes");
        Ok(bytes.to_vec())
    }
}
