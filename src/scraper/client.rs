//! Blocking HTTP page fetcher with a static identity header.
//!
//! No retries and no built-in delay: pacing is done by [Pacer](super::Pacer) at the
//! call sites, and a failed request costs exactly one item.

use super::error::ScraperError;
use super::{FetchedImage, PageFetcher};
use reqwest::Url;
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux i686; rv:109.0) Gecko/20100101 Firefox/109.0";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_REDIRECTS: usize = 10;

/// Non-interactive fetcher: returns the served HTML as text.
#[derive(Debug)]
pub struct HttpFetcher {
    inner: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn builder() -> HttpFetcherBuilder {
        HttpFetcherBuilder::default()
    }

    /// GET with status check. Non-2xx is reported as [ScraperError::PageUnavailable].
    fn get(&self, url: &str) -> Result<reqwest::blocking::Response, ScraperError> {
        let response = self
            .inner
            .get(url)
            .send()
            .map_err(|e| ScraperError::Network {
                url: url.to_string(),
                source: e,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScraperError::PageUnavailable {
                url: url.to_string(),
                status: Some(status.as_u16()),
                reason: format!("HTTP {}", status.as_u16()),
            });
        }
        Ok(response)
    }
}

impl PageFetcher for HttpFetcher {
    fn fetch_page(&mut self, url: &str) -> Result<String, ScraperError> {
        tracing::debug!(url, "GET page");
        self.get(url)?.text().map_err(|e| ScraperError::BodyRead {
            url: url.to_string(),
            source: e,
        })
    }

    fn fetch_image(&mut self, url: &str) -> Result<FetchedImage, ScraperError> {
        tracing::debug!(url, "GET image");
        let response = self.get(url)?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let bytes = response.bytes().map_err(|e| ScraperError::BodyRead {
            url: url.to_string(),
            source: e,
        })?;
        Ok(FetchedImage {
            bytes: bytes.to_vec(),
            ext: image_extension(content_type.as_deref(), url),
        })
    }
}

/// Pick a file extension from the Content-Type, then the URL path, then fall back to `jpg`.
pub(crate) fn image_extension(content_type: Option<&str>, url: &str) -> String {
    if let Some(ct) = content_type {
        let ct = ct.to_ascii_lowercase();
        for (needle, ext) in [
            ("jpeg", "jpg"),
            ("jpg", "jpg"),
            ("png", "png"),
            ("webp", "webp"),
            ("gif", "gif"),
            ("avif", "avif"),
        ] {
            if ct.contains(needle) {
                return ext.to_string();
            }
        }
    }
    let from_path = Url::parse(url).ok().and_then(|u| {
        let last = u.path_segments()?.last()?.to_string();
        let (_, ext) = last.rsplit_once('.')?;
        let ext = ext.to_ascii_lowercase();
        let known = ["jpg", "jpeg", "png", "webp", "gif", "avif"];
        known.contains(&ext.as_str()).then(|| {
            if ext == "jpeg" {
                "jpg".to_string()
            } else {
                ext
            }
        })
    });
    from_path.unwrap_or_else(|| "jpg".to_string())
}

/// Builder for [HttpFetcher] with optional User-Agent and timeout.
#[derive(Debug)]
pub struct HttpFetcherBuilder {
    user_agent: Option<String>,
    timeout_secs: u64,
}

impl Default for HttpFetcherBuilder {
    fn default() -> Self {
        Self {
            user_agent: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl HttpFetcherBuilder {
    /// Set a custom User-Agent. If not set, a browser-like default is used.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Set request timeout in seconds. Default 30.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn build(self) -> Result<HttpFetcher, reqwest::Error> {
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let inner = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(self.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(HttpFetcher { inner })
    }
}
