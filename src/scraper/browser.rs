//! Render-capable page fetcher backed by a headless Chromium (chromiumoxide).
//!
//! Some image mirrors sit behind bot protection and only hand images to a real
//! browser. The session owns one browser and one tab for the whole run and is
//! driven synchronously through a private single-worker tokio runtime.

use crate::scraper::error::ScraperError;
use crate::scraper::{CaptureMode, FetchedImage, PageFetcher};
use base64::Engine;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;

/// Draws the first image of the current document onto a canvas and returns a PNG data URL.
const CANVAS_CAPTURE_SCRIPT: &str = r#"(() => {
    const img = document.getElementsByTagName('img')[0];
    if (!img || !img.naturalWidth) { return null; }
    const canvas = document.createElement('canvas');
    canvas.width = img.naturalWidth;
    canvas.height = img.naturalHeight;
    canvas.getContext('2d').drawImage(img, 0, 0, img.naturalWidth, img.naturalHeight);
    return canvas.toDataURL('image/png');
})()"#;

/// Launch settings for [BrowserSession].
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub headless: bool,
    pub capture: CaptureMode,
    /// Chrome/Chromium binary; autodetected when `None`.
    pub executable: Option<PathBuf>,
    pub user_agent: Option<String>,
    pub request_timeout: Duration,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            capture: CaptureMode::Canvas,
            executable: None,
            user_agent: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// One browser and one tab, alive for the whole run. Closed explicitly with
/// [BrowserSession::close] or on drop.
pub struct BrowserSession {
    runtime: tokio::runtime::Runtime,
    browser: Option<Browser>,
    page: Option<Page>,
    capture: CaptureMode,
}

fn browser_err<E: std::fmt::Display>(what: &'static str) -> impl FnOnce(E) -> ScraperError {
    move |e| ScraperError::Browser {
        reason: format!("{what}: {e}"),
    }
}

impl BrowserSession {
    pub fn launch(options: &BrowserOptions) -> Result<Self, ScraperError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .map_err(browser_err("Failed to start browser runtime"))?;

        let mut builder = BrowserConfig::builder()
            .arg("--no-sandbox")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .request_timeout(options.request_timeout);
        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &options.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder
            .build()
            .map_err(browser_err("Failed to build browser config"))?;

        let (browser, page) = runtime.block_on(async {
            let (browser, mut handler) = Browser::launch(config).await.map_err(browser_err(
                "Failed to launch browser (is Chrome or Chromium installed and in PATH?)",
            ))?;
            tokio::spawn(async move { while handler.next().await.is_some() {} });
            let page = browser
                .new_page("about:blank")
                .await
                .map_err(browser_err("Failed to open tab"))?;
            if let Some(ua) = &options.user_agent {
                page.set_user_agent(ua.as_str())
                    .await
                    .map_err(browser_err("Failed to set user agent"))?;
            }
            Ok::<_, ScraperError>((browser, page))
        })?;
        tracing::debug!(headless = options.headless, "browser session started");

        Ok(Self {
            runtime,
            browser: Some(browser),
            page: Some(page),
            capture: options.capture,
        })
    }

    fn page(&self) -> Result<&Page, ScraperError> {
        self.page.as_ref().ok_or_else(|| ScraperError::Browser {
            reason: "browser session already closed".to_string(),
        })
    }

    /// Navigate the tab and return the document title once loading finished.
    fn navigate(&self, url: &str) -> Result<Option<String>, ScraperError> {
        let page = self.page()?;
        self.runtime.block_on(async {
            page.goto(url)
                .await
                .map_err(browser_err("Navigation failed"))?;
            page.wait_for_navigation()
                .await
                .map_err(browser_err("Navigation did not finish"))?;
            page.get_title()
                .await
                .map_err(browser_err("Failed to read page title"))
        })
    }

    fn capture_image(&self, url: &str) -> Result<FetchedImage, ScraperError> {
        let page = self.page()?;
        match self.capture {
            CaptureMode::Canvas => {
                let data_url: Option<String> = self.runtime.block_on(async {
                    page.evaluate(CANVAS_CAPTURE_SCRIPT)
                        .await
                        .map_err(browser_err("Canvas script failed"))?
                        .into_value()
                        .map_err(browser_err("Canvas script returned an unexpected value"))
                })?;
                let data_url = data_url.ok_or_else(|| ScraperError::ExtractionMismatch {
                    url: url.to_string(),
                    what: "loaded image".to_string(),
                })?;
                let bytes = decode_data_url(&data_url).ok_or_else(|| {
                    ScraperError::ExtractionMismatch {
                        url: url.to_string(),
                        what: "base64 image data".to_string(),
                    }
                })?;
                Ok(FetchedImage {
                    bytes,
                    ext: "png".to_string(),
                })
            }
            CaptureMode::Screenshot => {
                let bytes = self.runtime.block_on(async {
                    let element = page
                        .find_element("img")
                        .await
                        .map_err(browser_err("No image element on page"))?;
                    element
                        .screenshot(CaptureScreenshotFormat::Png)
                        .await
                        .map_err(browser_err("Screenshot failed"))
                })?;
                Ok(FetchedImage {
                    bytes,
                    ext: "png".to_string(),
                })
            }
        }
    }

    /// Close the tab and the browser process.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let page = self.page.take();
        let Some(mut browser) = self.browser.take() else {
            return;
        };
        self.runtime.block_on(async {
            if let Some(page) = page {
                let _ = page.close().await;
            }
            if let Err(e) = browser.close().await {
                tracing::debug!(error = %e, "browser close failed");
            }
            let _ = browser.wait().await;
        });
        tracing::debug!("browser session closed");
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl PageFetcher for BrowserSession {
    fn fetch_page(&mut self, url: &str) -> Result<String, ScraperError> {
        tracing::debug!(url, "browser: load page");
        let title = self.navigate(url)?;
        if title.as_deref().is_some_and(is_not_found_title) {
            return Err(ScraperError::PageUnavailable {
                url: url.to_string(),
                status: Some(404),
                reason: "page title reports 404".to_string(),
            });
        }
        let page = self.page()?;
        self.runtime.block_on(async {
            page.content()
                .await
                .map_err(browser_err("Failed to read page content"))
        })
    }

    fn fetch_image(&mut self, url: &str) -> Result<FetchedImage, ScraperError> {
        // image documents are titled after the file, so their title says nothing about a 404
        tracing::debug!(url, capture = ?self.capture, "browser: load image");
        self.navigate(url)?;
        self.capture_image(url)
    }
}

/// Error pages the kn mirrors serve with a 200 status.
fn is_not_found_title(title: &str) -> bool {
    let title = title.trim().to_ascii_lowercase();
    title.starts_with("404") || title.contains("404 not found")
}

/// Payload of a `data:<mime>;base64,<payload>` URL.
fn decode_data_url(data_url: &str) -> Option<Vec<u8>> {
    let (header, payload) = data_url.split_once(',')?;
    if !header.starts_with("data:") || !header.ends_with(";base64") {
        return None;
    }
    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .ok()
        .filter(|b| !b.is_empty())
}
