//! Shared error type for site adapters and page fetchers.

use thiserror::Error;

/// Errors raised while resolving a site, fetching pages, or extracting chapters.
#[derive(Debug, Error)]
pub enum ScraperError {
    // Site / URL
    #[error("Invalid URL: {input}: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("Could not detect site from URL host '{host}'. Use --site to choose one.")]
    UnrecognizedHost { host: String },

    // Transport
    #[error("Network error: could not reach {url}: {source}")]
    Network { url: String, source: reqwest::Error },

    #[error("Failed to read response body from {url}: {source}")]
    BodyRead { url: String, source: reqwest::Error },

    /// `status` is the HTTP status when the server answered with one.
    #[error("Page unavailable: {url}: {reason}")]
    PageUnavailable {
        url: String,
        status: Option<u16>,
        reason: String,
    },

    #[error("Browser session error: {reason}")]
    Browser { reason: String },

    // Extraction
    #[error("Invalid CSS selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Could not extract {what} at {url} (page layout may have changed).")]
    ExtractionMismatch { url: String, what: String },

    #[error("No chapter list found at {url}: every extraction strategy came back empty.")]
    ListingNotFound { url: String },

    /// One page of a paginated listing failed; the whole listing is unusable.
    #[error("Listing page {page} failed: {source}")]
    ListingPage {
        page: u32,
        #[source]
        source: Box<ScraperError>,
    },
}

impl ScraperError {
    /// Failures that only cost the current chapter (or image); the run continues.
    pub fn is_item_recoverable(&self) -> bool {
        matches!(
            self,
            ScraperError::Network { .. }
                | ScraperError::BodyRead { .. }
                | ScraperError::PageUnavailable { .. }
                | ScraperError::Browser { .. }
                | ScraperError::ExtractionMismatch { .. }
        )
    }

    /// True when the page itself is gone (404/410, or a browser page titled as not found).
    /// Rate limiting and server errors are not, and neither is a failed later listing page.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ScraperError::PageUnavailable {
                status: Some(404 | 410),
                ..
            }
        )
    }
}
