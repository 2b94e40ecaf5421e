//! Text-site adapter (novelfull, webnovelpub, wuxiaworld). Each chapter becomes one cleaned
//! HTML fragment headed by an `<h2>` so the document's table of contents has an entry.

use crate::model::{ArchiveKind, Chapter, ChapterList, RetrievedResource};
use crate::scraper::content::{escape_text, find_container, FragmentCleaner};
use crate::scraper::error::ScraperError;
use crate::scraper::listing::{
    self, parse_selector, LastPage, ListingPlan, ListingStrategy, Pagination, RawOrder,
    SelectorStrategy, TitleSource,
};
use crate::scraper::{Pacer, PageFetcher, Scraper, Site, WorkTarget};
use scraper::{Html, Selector};

/// What part of the content container makes up the chapter text.
pub enum ContentSelection {
    /// Everything inside the container, cleaned.
    Whole,
    /// Only the matching descendants (e.g. paragraphs), in document order.
    Only(Selector),
}

/// Per-site knowledge for a text source.
pub struct NovelProfile {
    site: Site,
    listing_url: String,
    pagination: Option<Pagination>,
    strategies: Vec<Box<dyn ListingStrategy>>,
    /// Content container anchors, first match wins.
    anchors: Vec<Selector>,
    selection: ContentSelection,
    cleaner: FragmentCleaner,
}

impl NovelProfile {
    pub fn for_target(target: &WorkTarget) -> Result<Self, ScraperError> {
        let listing_url = target.listing_url();
        let template = target.listing_page_template();
        match target.site {
            Site::Novelfull => Ok(Self {
                site: target.site,
                listing_url,
                pagination: Some(Pagination {
                    last_page: LastPage::Attr {
                        selector: "#list-chapter ul.pagination li.last a",
                        attr: "data-page",
                        offset: 1,
                    },
                    url_template: template,
                }),
                strategies: vec![
                    Box::new(SelectorStrategy::new(
                        "list-chapter-title",
                        "#list-chapter ul.list-chapter li > a",
                        TitleSource::Attr("title"),
                        RawOrder::OldestFirst,
                    )?),
                    Box::new(SelectorStrategy::new(
                        "list-chapter-any",
                        "ul.list-chapter li a",
                        TitleSource::Text,
                        RawOrder::OldestFirst,
                    )?),
                ],
                anchors: vec![
                    parse_selector("#chapter-content")?,
                    parse_selector("div.chapter-c")?,
                ],
                selection: ContentSelection::Whole,
                cleaner: FragmentCleaner::new(&["div.ads", "ins", "iframe"], &["h3", "h4"])?,
            }),
            Site::Webnovelpub => Ok(Self {
                site: target.site,
                listing_url,
                pagination: Some(Pagination {
                    last_page: LastPage::HrefSuffix {
                        selector: "li.PagedList-skipToLast a",
                    },
                    url_template: template,
                }),
                strategies: vec![Box::new(SelectorStrategy::new(
                    "data-chapterno",
                    "li[data-chapterno] a",
                    TitleSource::Attr("title"),
                    RawOrder::OldestFirst,
                )?)],
                anchors: vec![parse_selector("#chapter-container")?],
                selection: ContentSelection::Only(parse_selector("p")?),
                cleaner: FragmentCleaner::new(&[], &[])?,
            }),
            Site::Wuxiaworld => Ok(Self {
                site: target.site,
                listing_url,
                pagination: None,
                strategies: vec![
                    Box::new(SelectorStrategy::new(
                        "chapter-item",
                        "li.chapter-item a",
                        TitleSource::Text,
                        RawOrder::OldestFirst,
                    )?),
                    Box::new(SelectorStrategy::new(
                        "chapter-list-anchor",
                        "div.chapter-list a",
                        TitleSource::Text,
                        RawOrder::OldestFirst,
                    )?),
                ],
                anchors: vec![
                    parse_selector("#chapter-content")?,
                    parse_selector("div.chapter-content")?,
                ],
                selection: ContentSelection::Whole,
                cleaner: FragmentCleaner::new(&["a.chapter-nav", "div.ads", "ins"], &[])?,
            }),
            other => Err(ScraperError::InvalidUrl {
                input: listing_url,
                reason: format!("{other} is not a text site"),
            }),
        }
    }
}

/// Text-site scraper. Holds a reference to the run's page fetcher.
pub struct NovelScraper<'a> {
    profile: NovelProfile,
    fetcher: &'a mut dyn PageFetcher,
}

impl<'a> NovelScraper<'a> {
    pub fn new(profile: NovelProfile, fetcher: &'a mut dyn PageFetcher) -> Self {
        Self { profile, fetcher }
    }

    fn chapter_markup(&self, chapter: &Chapter, html: &str) -> Result<String, ScraperError> {
        let doc = Html::parse_document(html);
        let container = find_container(&doc, &self.profile.anchors).ok_or_else(|| {
            ScraperError::ExtractionMismatch {
                url: chapter.url.clone(),
                what: "chapter content container".to_string(),
            }
        })?;
        let body = match &self.profile.selection {
            ContentSelection::Whole => self.profile.cleaner.clean(container),
            ContentSelection::Only(keep) => self.profile.cleaner.clean_each(container, keep),
        };
        if body.trim().is_empty() {
            return Err(ScraperError::ExtractionMismatch {
                url: chapter.url.clone(),
                what: "chapter text".to_string(),
            });
        }
        Ok(with_heading(&chapter.title, body))
    }
}

/// Prepend `<h2>title</h2>` unless the fragment already carries a chapter heading.
fn with_heading(title: &str, body: String) -> String {
    if body.contains("<h2") {
        body
    } else {
        format!("<h2>{}</h2>\n{}", escape_text(title), body)
    }
}

impl Scraper for NovelScraper<'_> {
    fn kind(&self) -> ArchiveKind {
        ArchiveKind::Document
    }

    fn listing_url(&self) -> String {
        self.profile.listing_url.clone()
    }

    fn list_chapters(&mut self, pacer: &Pacer) -> Result<ChapterList, ScraperError> {
        tracing::info!(site = %self.profile.site, url = %self.profile.listing_url, "fetching chapter list");
        let plan = ListingPlan {
            first_page: self.profile.listing_url.clone(),
            pagination: self.profile.pagination.as_ref(),
            strategies: &self.profile.strategies,
        };
        listing::list_chapters(&mut *self.fetcher, &plan, pacer)
    }

    fn fetch_chapter(
        &mut self,
        chapter: &Chapter,
        _pacer: &Pacer,
    ) -> Result<Vec<RetrievedResource>, ScraperError> {
        let html = self.fetcher.fetch_page(&chapter.url)?;
        let markup = self.chapter_markup(chapter, &html)?;
        Ok(vec![RetrievedResource::Markup { markup }])
    }
}
