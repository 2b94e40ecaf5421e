//! Image-site adapter (mangakakalot, manganelo, mangatown). Lists chapters, then fetches
//! each chapter page's images one by one.

use crate::model::{ArchiveKind, Chapter, ChapterList, RetrievedResource};
use crate::scraper::content::{collect_image_urls, find_container, ImageFilter};
use crate::scraper::error::ScraperError;
use crate::scraper::listing::{
    self, parse_selector, ListingPlan, ListingStrategy, RawOrder, SelectorStrategy, TitleSource,
};
use crate::scraper::{Pacer, PageFetcher, Scraper, Site, WorkTarget};
use reqwest::Url;
use scraper::{Html, Selector};

/// CDN hosts the manga-kn mirrors serve chapter pages from.
const KN_CDN_DOMAINS: &[&str] = &["blogspot", "mpcdn", "mgimgcdn", "mkklcdn"];

/// Per-site knowledge for an image source.
pub struct MangaProfile {
    site: Site,
    listing_url: String,
    strategies: Vec<Box<dyn ListingStrategy>>,
    filter: ImageFilter,
    /// Reader container anchors, first match wins.
    scope: Vec<Selector>,
    /// When true a chapter page without a reader container is skipped; otherwise
    /// the whole page is searched.
    scope_required: bool,
}

impl MangaProfile {
    pub fn for_target(target: &WorkTarget) -> Result<Self, ScraperError> {
        let listing_url = target.listing_url();
        match target.site {
            Site::Mangakakalot | Site::Manganelo => Ok(Self {
                site: target.site,
                listing_url,
                strategies: vec![
                    Box::new(SelectorStrategy::new(
                        "chapter-name",
                        "a.chapter-name",
                        TitleSource::Text,
                        RawOrder::NewestFirst,
                    )?),
                    Box::new(SelectorStrategy::new(
                        "panel-story-chapter-list",
                        "div.panel-story-chapter-list a",
                        TitleSource::Text,
                        RawOrder::NewestFirst,
                    )?),
                    Box::new(SelectorStrategy::new(
                        "chapter-list-rows",
                        "div.chapter-list div.row span a",
                        TitleSource::Text,
                        RawOrder::NewestFirst,
                    )?),
                ],
                filter: ImageFilter::new(KN_CDN_DOMAINS, &["avatar", "logo"]),
                scope: vec![
                    parse_selector("div.container-chapter-reader")?,
                    parse_selector("#vungdoc")?,
                ],
                scope_required: false,
            }),
            Site::Mangatown => Ok(Self {
                site: target.site,
                listing_url,
                strategies: vec![Box::new(SelectorStrategy::new(
                    "chapter_list",
                    "ul.chapter_list li > a",
                    TitleSource::Text,
                    RawOrder::NewestFirst,
                )?)],
                filter: ImageFilter::new(&[], &["logo", "avatar", "icon"]),
                scope: vec![parse_selector("#viewer")?, parse_selector("div.read_img")?],
                scope_required: true,
            }),
            other => Err(ScraperError::InvalidUrl {
                input: target.listing_url(),
                reason: format!("{other} is not an image site"),
            }),
        }
    }
}

/// Image-site scraper. Holds a reference to the run's page fetcher.
pub struct MangaScraper<'a> {
    profile: MangaProfile,
    fetcher: &'a mut dyn PageFetcher,
}

impl<'a> MangaScraper<'a> {
    pub fn new(profile: MangaProfile, fetcher: &'a mut dyn PageFetcher) -> Self {
        Self { profile, fetcher }
    }

    /// Retained image URLs on one chapter page.
    fn image_urls(&self, chapter: &Chapter, html: &str) -> Result<Vec<String>, ScraperError> {
        let page_url = Url::parse(&chapter.url).map_err(|e| ScraperError::InvalidUrl {
            input: chapter.url.clone(),
            reason: e.to_string(),
        })?;
        let doc = Html::parse_document(html);
        let scope = match find_container(&doc, &self.profile.scope) {
            Some(container) => container,
            None if self.profile.scope_required => {
                return Err(ScraperError::ExtractionMismatch {
                    url: chapter.url.clone(),
                    what: "image reader container".to_string(),
                })
            }
            None => doc.root_element(),
        };
        let urls = collect_image_urls(scope, &page_url, &self.profile.filter);
        if urls.is_empty() {
            return Err(ScraperError::ExtractionMismatch {
                url: chapter.url.clone(),
                what: "chapter images".to_string(),
            });
        }
        Ok(urls)
    }
}

impl Scraper for MangaScraper<'_> {
    fn kind(&self) -> ArchiveKind {
        ArchiveKind::Images
    }

    fn listing_url(&self) -> String {
        self.profile.listing_url.clone()
    }

    fn list_chapters(&mut self, pacer: &Pacer) -> Result<ChapterList, ScraperError> {
        tracing::info!(site = %self.profile.site, url = %self.profile.listing_url, "fetching chapter list");
        let plan = ListingPlan {
            first_page: self.profile.listing_url.clone(),
            pagination: None,
            strategies: &self.profile.strategies,
        };
        listing::list_chapters(&mut *self.fetcher, &plan, pacer)
    }

    fn fetch_chapter(
        &mut self,
        chapter: &Chapter,
        pacer: &Pacer,
    ) -> Result<Vec<RetrievedResource>, ScraperError> {
        let html = self.fetcher.fetch_page(&chapter.url)?;
        let urls = self.image_urls(chapter, &html)?;
        tracing::debug!(chapter = %chapter.title, images = urls.len(), "chapter images found");

        let mut resources = Vec::with_capacity(urls.len());
        for (i, url) in urls.iter().enumerate() {
            // position on the page, kept even when an earlier image failed
            let order = i + 1;
            match self.fetcher.fetch_image(url) {
                Ok(image) => resources.push(RetrievedResource::Image {
                    order,
                    bytes: image.bytes,
                    ext: image.ext,
                }),
                Err(e) if e.is_item_recoverable() => {
                    tracing::warn!(chapter = %chapter.title, order, error = %e, "skipping image");
                }
                Err(e) => return Err(e),
            }
            pacer.after_image();
        }
        if resources.is_empty() {
            return Err(ScraperError::ExtractionMismatch {
                url: chapter.url.clone(),
                what: "any downloadable chapter image".to_string(),
            });
        }
        Ok(resources)
    }
}
