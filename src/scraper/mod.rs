//! Site adapters and scraping. Site detection, fetcher and scraper traits, and adapters.

mod client;
mod error;

#[cfg(feature = "browser")]
pub mod browser;
pub mod content;
pub mod listing;
pub mod manga;
pub mod novel;
pub mod pacing;

pub use client::{HttpFetcher, HttpFetcherBuilder, DEFAULT_USER_AGENT};
pub use error::ScraperError;
pub use pacing::Pacer;

use crate::model::{ArchiveKind, Chapter, ChapterList, RetrievedResource};
use reqwest::Url;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Image bytes plus the file extension they should be stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub ext: String,
}

/// Abstraction over "get this page's HTML" and "get this image's bytes".
///
/// Implemented by the plain HTTP client and by the browser session; adapters only
/// ever see this trait.
pub trait PageFetcher {
    fn fetch_page(&mut self, url: &str) -> Result<String, ScraperError>;
    fn fetch_image(&mut self, url: &str) -> Result<FetchedImage, ScraperError>;
}

/// Which page fetcher a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    Http,
    Browser,
}

impl FromStr for FetchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(FetchMode::Http),
            "browser" => Ok(FetchMode::Browser),
            other => Err(format!("unknown fetcher '{other}' (expected http or browser)")),
        }
    }
}

/// How the browser session turns an image page into bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureMode {
    /// Draw the loaded image onto a canvas and read back a PNG data URL.
    #[default]
    Canvas,
    /// Screenshot the image element.
    Screenshot,
}

impl FromStr for CaptureMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "canvas" => Ok(CaptureMode::Canvas),
            "screenshot" => Ok(CaptureMode::Screenshot),
            other => Err(format!(
                "unknown capture mode '{other}' (expected canvas or screenshot)"
            )),
        }
    }
}

/// Supported source site. Used for dispatch and for the --site override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Site {
    Mangakakalot,
    Manganelo,
    Mangatown,
    Novelfull,
    Webnovelpub,
    Wuxiaworld,
}

impl Site {
    pub const ALL: [Site; 6] = [
        Site::Mangakakalot,
        Site::Manganelo,
        Site::Mangatown,
        Site::Novelfull,
        Site::Webnovelpub,
        Site::Wuxiaworld,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Site::Mangakakalot => "mangakakalot",
            Site::Manganelo => "manganelo",
            Site::Mangatown => "mangatown",
            Site::Novelfull => "novelfull",
            Site::Webnovelpub => "webnovelpub",
            Site::Wuxiaworld => "wuxiaworld",
        }
    }

    pub fn kind(self) -> ArchiveKind {
        match self {
            Site::Mangakakalot | Site::Manganelo | Site::Mangatown => ArchiveKind::Images,
            Site::Novelfull | Site::Webnovelpub | Site::Wuxiaworld => ArchiveKind::Document,
        }
    }

    pub fn default_base(self) -> &'static str {
        match self {
            Site::Mangakakalot => "https://mangakakalot.com",
            Site::Manganelo => "https://manganelo.com",
            Site::Mangatown => "https://www.mangatown.com",
            Site::Novelfull => "https://novelfull.com",
            Site::Webnovelpub => "https://www.webnovelpub.com",
            Site::Wuxiaworld => "https://www.wuxiaworld.com",
        }
    }

    /// Delays used unless config or CLI say otherwise.
    pub fn default_pacer(self) -> Pacer {
        let (image_ms, chapter_ms) = match self {
            Site::Mangakakalot | Site::Manganelo => (700, 5000),
            Site::Mangatown => (500, 2000),
            Site::Novelfull => (0, 1000),
            Site::Webnovelpub | Site::Wuxiaworld => (0, 200),
        };
        Pacer::new(
            Duration::from_millis(image_ms),
            Duration::from_millis(chapter_ms),
        )
    }

    /// The manga-kn mirrors serve their images only to a real browser.
    pub fn default_fetch_mode(self) -> FetchMode {
        match self {
            Site::Mangakakalot | Site::Manganelo => FetchMode::Browser,
            _ => FetchMode::Http,
        }
    }

    /// Path segment that precedes the slug in listing URLs, if any.
    fn slug_prefix(self) -> Option<&'static str> {
        match self {
            Site::Mangakakalot | Site::Manganelo | Site::Mangatown => Some("manga"),
            Site::Webnovelpub | Site::Wuxiaworld => Some("novel"),
            Site::Novelfull => None,
        }
    }

    fn from_host(host: &str) -> Option<Site> {
        Site::ALL
            .into_iter()
            .find(|site| host.contains(&format!("{}.", site.name())))
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Site {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Site::ALL
            .into_iter()
            .find(|site| site.name() == wanted)
            .ok_or_else(|| {
                let names: Vec<_> = Site::ALL.iter().map(|s| s.name()).collect();
                format!("unknown site '{}' (expected one of: {})", s, names.join(", "))
            })
    }
}

/// A work on a specific site: where its listing lives and how its pages are addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkTarget {
    pub site: Site,
    /// Scheme and host (and port), no trailing slash.
    pub base_url: String,
    pub slug: String,
}

impl WorkTarget {
    pub fn new(site: Site, base_url: &str, slug: &str) -> Self {
        Self {
            site,
            base_url: base_url.trim_end_matches('/').to_string(),
            slug: slug.trim_matches('/').to_string(),
        }
    }

    /// First (or only) listing page.
    pub fn listing_url(&self) -> String {
        match self.site {
            Site::Novelfull | Site::Webnovelpub => self.listing_page_template().replace("{page}", "1"),
            Site::Mangakakalot | Site::Manganelo | Site::Mangatown | Site::Wuxiaworld => {
                format!(
                    "{}/{}/{}",
                    self.base_url,
                    self.site.slug_prefix().unwrap_or_default(),
                    self.slug
                )
            }
        }
    }

    /// Listing URL with a `{page}` placeholder, for sites that paginate.
    pub fn listing_page_template(&self) -> String {
        match self.site {
            Site::Novelfull => format!("{}/{}.html?page={{page}}", self.base_url, self.slug),
            Site::Webnovelpub => {
                format!("{}/novel/{}/chapters/page-{{page}}", self.base_url, self.slug)
            }
            _ => self.listing_url(),
        }
    }
}

/// Resolve the work argument: a listing URL (site from host unless overridden) or a bare slug
/// (site override required).
pub fn resolve_work(work: &str, override_site: Option<Site>) -> Result<WorkTarget, ScraperError> {
    let work = work.trim();
    let parsed = match Url::parse(work) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => url,
        Ok(_) | Err(_) if !work.contains("://") => {
            let site = override_site.ok_or_else(|| ScraperError::InvalidUrl {
                input: work.to_string(),
                reason: "not a URL; pass --site to look up a slug".to_string(),
            })?;
            if work.is_empty() || work.contains('/') {
                return Err(ScraperError::InvalidUrl {
                    input: work.to_string(),
                    reason: "a slug must be a single non-empty path segment".to_string(),
                });
            }
            return Ok(WorkTarget::new(site, site.default_base(), work));
        }
        Ok(url) => {
            return Err(ScraperError::InvalidUrl {
                input: work.to_string(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            })
        }
        Err(e) => {
            return Err(ScraperError::InvalidUrl {
                input: work.to_string(),
                reason: e.to_string(),
            })
        }
    };
    let host = parsed.host_str().ok_or_else(|| ScraperError::InvalidUrl {
        input: work.to_string(),
        reason: "URL has no host".to_string(),
    })?;
    let site = match override_site {
        Some(site) => site,
        None => Site::from_host(host).ok_or_else(|| ScraperError::UnrecognizedHost {
            host: host.to_string(),
        })?,
    };
    let slug = slug_from_path(site, &parsed).ok_or_else(|| ScraperError::InvalidUrl {
        input: work.to_string(),
        reason: format!("could not find the {} work name in the path", site.name()),
    })?;
    let base = match parsed.port() {
        Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
        None => format!("{}://{}", parsed.scheme(), host),
    };
    Ok(WorkTarget::new(site, &base, &slug))
}

fn slug_from_path(site: Site, url: &Url) -> Option<String> {
    let segments: Vec<&str> = url
        .path_segments()?
        .filter(|s| !s.is_empty())
        .collect();
    let slug = match site.slug_prefix() {
        Some(prefix) => match segments.iter().position(|s| *s == prefix) {
            Some(i) => segments.get(i + 1).copied(),
            None => segments.last().copied(),
        },
        None => segments.first().copied(),
    }?;
    let slug = slug.strip_suffix(".html").unwrap_or(slug);
    (!slug.is_empty()).then(|| slug.to_string())
}

/// Trait implemented by site adapters (image sites and text sites).
pub trait Scraper {
    /// What the adapter produces, and therefore which archive the run uses.
    fn kind(&self) -> ArchiveKind;

    fn listing_url(&self) -> String;

    /// Discover the work's chapters in chronological order.
    fn list_chapters(&mut self, pacer: &Pacer) -> Result<ChapterList, ScraperError>;

    /// Retrieve one chapter. An error here costs only this chapter when
    /// [ScraperError::is_item_recoverable] holds.
    fn fetch_chapter(
        &mut self,
        chapter: &Chapter,
        pacer: &Pacer,
    ) -> Result<Vec<RetrievedResource>, ScraperError>;
}

/// Dispatch by site: build the adapter for `target` over the given fetcher.
pub fn build_scraper<'a>(
    target: &WorkTarget,
    fetcher: &'a mut dyn PageFetcher,
) -> Result<Box<dyn Scraper + 'a>, ScraperError> {
    match target.site.kind() {
        ArchiveKind::Images => Ok(Box::new(manga::MangaScraper::new(
            manga::MangaProfile::for_target(target)?,
            fetcher,
        ))),
        ArchiveKind::Document => Ok(Box::new(novel::NovelScraper::new(
            novel::NovelProfile::for_target(target)?,
            fetcher,
        ))),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory fetcher for adapter tests.

    use super::client::image_extension;
    use super::{FetchedImage, PageFetcher, ScraperError};
    use std::collections::HashMap;

    /// Serves canned pages and images; anything else is a 404.
    #[derive(Debug, Default)]
    pub struct FakeFetcher {
        pages: HashMap<String, String>,
        images: HashMap<String, Vec<u8>>,
        pub requested: Vec<String>,
    }

    impl FakeFetcher {
        pub fn page(mut self, url: &str, html: &str) -> Self {
            self.pages.insert(url.to_string(), html.to_string());
            self
        }

        pub fn image(mut self, url: &str, bytes: &[u8]) -> Self {
            self.images.insert(url.to_string(), bytes.to_vec());
            self
        }

        fn missing(url: &str) -> ScraperError {
            ScraperError::PageUnavailable {
                url: url.to_string(),
                status: Some(404),
                reason: "HTTP 404".to_string(),
            }
        }
    }

    impl PageFetcher for FakeFetcher {
        fn fetch_page(&mut self, url: &str) -> Result<String, ScraperError> {
            self.requested.push(url.to_string());
            self.pages.get(url).cloned().ok_or_else(|| Self::missing(url))
        }

        fn fetch_image(&mut self, url: &str) -> Result<FetchedImage, ScraperError> {
            self.requested.push(url.to_string());
            let bytes = self.images.get(url).cloned().ok_or_else(|| Self::missing(url))?;
            Ok(FetchedImage {
                bytes,
                ext: image_extension(None, url),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_detection_from_host() -> Result<(), ScraperError> {
        let target = resolve_work("https://www.mangatown.com/manga/onepunch_man/", None)?;
        assert_eq!(target.site, Site::Mangatown);
        assert_eq!(target.slug, "onepunch_man");
        assert_eq!(
            target.listing_url(),
            "https://www.mangatown.com/manga/onepunch_man"
        );

        let target = resolve_work("https://manganelo.com/manga/read_abc", None)?;
        assert_eq!(target.site, Site::Manganelo);
        Ok(())
    }

    #[test]
    fn novelfull_url_and_pagination_template() -> Result<(), ScraperError> {
        let target = resolve_work("https://novelfull.com/some-novel.html", None)?;
        assert_eq!(target.site, Site::Novelfull);
        assert_eq!(target.slug, "some-novel");
        assert_eq!(target.listing_url(), "https://novelfull.com/some-novel.html?page=1");
        assert_eq!(
            target.listing_page_template(),
            "https://novelfull.com/some-novel.html?page={page}"
        );
        Ok(())
    }

    #[test]
    fn webnovelpub_slug_is_taken_after_novel_segment() -> Result<(), ScraperError> {
        let target =
            resolve_work("https://www.webnovelpub.com/novel/the-slug-1234/chapters/page-3", None)?;
        assert_eq!(target.slug, "the-slug-1234");
        assert_eq!(
            target.listing_url(),
            "https://www.webnovelpub.com/novel/the-slug-1234/chapters/page-1"
        );
        Ok(())
    }

    #[test]
    fn slug_requires_site_override() {
        let result = resolve_work("tales-of-demons-and-gods", None);
        assert!(matches!(result, Err(ScraperError::InvalidUrl { .. })));

        let target = resolve_work("tales-of-demons-and-gods", Some(Site::Wuxiaworld));
        assert_eq!(
            target.map(|t| t.listing_url()).ok().as_deref(),
            Some("https://www.wuxiaworld.com/novel/tales-of-demons-and-gods")
        );
    }

    #[test]
    fn unrecognized_host_errors() -> Result<(), String> {
        let result = resolve_work("https://example.com/manga/foo", None);
        match &result {
            Err(ScraperError::UnrecognizedHost { host }) if host == "example.com" => Ok(()),
            _ => Err(format!("expected UnrecognizedHost, got {:?}", result)),
        }
    }

    #[test]
    fn override_keeps_host_and_port_of_url() -> Result<(), ScraperError> {
        let target = resolve_work("http://127.0.0.1:8080/manga/local", Some(Site::Mangatown))?;
        assert_eq!(target.base_url, "http://127.0.0.1:8080");
        assert_eq!(target.listing_url(), "http://127.0.0.1:8080/manga/local");
        Ok(())
    }

    #[test]
    fn site_names_round_trip_and_defaults() {
        for site in Site::ALL {
            assert_eq!(site.name().parse::<Site>(), Ok(site));
        }
        assert!("mangadex".parse::<Site>().is_err());
        assert_eq!(Site::Mangakakalot.default_fetch_mode(), FetchMode::Browser);
        assert_eq!(Site::Novelfull.kind(), ArchiveKind::Document);
        assert_eq!(
            Site::Mangatown.default_pacer().image_delay(),
            Duration::from_millis(500)
        );
    }
}
