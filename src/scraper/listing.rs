//! Chapter list discovery: an ordered cascade of extraction strategies over the listing
//! page(s), followed by order normalization to oldest-first.
//!
//! Sites change their templates without notice, so each adapter carries several
//! [ListingStrategy] values. The first one that yields entries wins and the rest are
//! never consulted. Raw DOM order is site-dependent; [ChapterList] is always chronological.

use crate::model::ChapterList;
use crate::scraper::error::ScraperError;
use crate::scraper::{PageFetcher, Pacer};
use reqwest::Url;
use scraper::{Html, Selector};
use std::collections::HashSet;

/// Order in which a listing template presents its chapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawOrder {
    OldestFirst,
    NewestFirst,
}

/// One `(title, url)` pair as it appears on the page, before sanitizing and ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub title: String,
    pub url: String,
}

/// One way of recovering the chapter list from a listing page.
pub trait ListingStrategy {
    fn name(&self) -> &str;
    fn raw_order(&self) -> RawOrder;
    fn extract(&self, doc: &Html, page_url: &Url) -> Vec<RawEntry>;
}

/// Where a chapter anchor keeps its title.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleSource {
    /// Visible anchor text.
    Text,
    /// An attribute (falls back to the text when missing or blank).
    Attr(&'static str),
}

/// Strategy driven by a CSS selector that matches chapter anchors.
#[derive(Debug)]
pub struct SelectorStrategy {
    name: &'static str,
    selector: Selector,
    title: TitleSource,
    order: RawOrder,
}

/// Parse a CSS selector or return an error (avoids panics from Selector::parse).
pub(crate) fn parse_selector(sel: &str) -> Result<Selector, ScraperError> {
    Selector::parse(sel).map_err(|e| ScraperError::InvalidSelector {
        selector: sel.to_string(),
        reason: e.to_string(),
    })
}

impl SelectorStrategy {
    pub fn new(
        name: &'static str,
        css: &str,
        title: TitleSource,
        order: RawOrder,
    ) -> Result<Self, ScraperError> {
        Ok(Self {
            name,
            selector: parse_selector(css)?,
            title,
            order,
        })
    }
}

impl ListingStrategy for SelectorStrategy {
    fn name(&self) -> &str {
        self.name
    }

    fn raw_order(&self) -> RawOrder {
        self.order
    }

    fn extract(&self, doc: &Html, page_url: &Url) -> Vec<RawEntry> {
        let mut entries = Vec::new();
        for anchor in doc.select(&self.selector) {
            let href = match anchor.value().attr("href").map(str::trim) {
                Some(h) if !h.is_empty() && h != "#" && !h.starts_with("javascript:") => h,
                _ => continue,
            };
            let url = match page_url.join(href) {
                Ok(u) => u.to_string(),
                Err(_) => continue,
            };
            let text = || anchor.text().collect::<String>();
            let title = match self.title {
                TitleSource::Text => text(),
                TitleSource::Attr(name) => anchor
                    .value()
                    .attr(name)
                    .filter(|t| !t.trim().is_empty())
                    .map(String::from)
                    .unwrap_or_else(text),
            };
            entries.push(RawEntry { title, url });
        }
        entries
    }
}

/// Winning strategy and its entries.
#[derive(Debug)]
pub struct CascadeHit {
    pub strategy: String,
    pub order: RawOrder,
    pub entries: Vec<RawEntry>,
}

/// Try each strategy in order; the first non-empty result wins.
pub fn run_cascade(
    doc: &Html,
    page_url: &Url,
    strategies: &[Box<dyn ListingStrategy>],
) -> Option<CascadeHit> {
    for strategy in strategies {
        let entries = strategy.extract(doc, page_url);
        if entries.is_empty() {
            tracing::debug!(strategy = strategy.name(), "listing strategy found nothing");
            continue;
        }
        return Some(CascadeHit {
            strategy: strategy.name().to_string(),
            order: strategy.raw_order(),
            entries,
        });
    }
    None
}

/// Replace characters that are illegal in path components. Idempotent.
pub fn sanitize_title(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| match c {
            ':' | '/' | '\\' | '?' | '*' | '"' | '<' | '>' | '|' => '_',
            c if c.is_whitespace() || c.is_control() => ' ',
            c => c,
        })
        .collect();
    let joined = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    // "." and ".." would escape the work root
    if !joined.is_empty() && joined.chars().all(|c| c == '.') {
        return "_".repeat(joined.len());
    }
    joined
}

/// Put raw entries in chronological order, drop repeated URLs, sanitize titles, assign indices.
pub fn normalize(mut entries: Vec<RawEntry>, order: RawOrder) -> ChapterList {
    if order == RawOrder::NewestFirst {
        entries.reverse();
    }
    let mut seen = HashSet::new();
    entries.retain(|e| seen.insert(e.url.clone()));
    ChapterList::from_chronological(entries.into_iter().enumerate().map(|(i, e)| {
        let title = sanitize_title(&e.title);
        let title = if title.is_empty() {
            format!("Chapter {}", i + 1)
        } else {
            title
        };
        (title, e.url)
    }))
}

/// How to read the number of the last listing page from page 1.
#[derive(Debug, Clone)]
pub enum LastPage {
    /// Numeric attribute on the "last" link, plus a fixed offset (novelfull counts from 0).
    Attr {
        selector: &'static str,
        attr: &'static str,
        offset: u32,
    },
    /// Number after the final `-` of the "last" link's href, e.g. `/chapters/page-12`.
    HrefSuffix { selector: &'static str },
}

impl LastPage {
    pub fn read(&self, doc: &Html) -> Option<u32> {
        match self {
            LastPage::Attr {
                selector,
                attr,
                offset,
            } => {
                let sel = parse_selector(selector).ok()?;
                let value = doc.select(&sel).next()?.value().attr(attr)?;
                value.trim().parse::<u32>().ok().map(|n| n + offset)
            }
            LastPage::HrefSuffix { selector } => {
                let sel = parse_selector(selector).ok()?;
                let href = doc.select(&sel).next()?.value().attr("href")?;
                let path = href.split(['?', '#']).next().unwrap_or(href);
                let (_, tail) = path.trim_end_matches('/').rsplit_once('-')?;
                tail.parse::<u32>().ok()
            }
        }
    }
}

/// Multi-page listing: page 1 tells how many pages exist, `url_template` builds the rest.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub last_page: LastPage,
    /// URL with a `{page}` placeholder.
    pub url_template: String,
}

impl Pagination {
    pub fn page_url(&self, page: u32) -> String {
        self.url_template.replace("{page}", &page.to_string())
    }
}

/// Everything the lister needs for one work.
pub struct ListingPlan<'a> {
    pub first_page: String,
    pub pagination: Option<&'a Pagination>,
    pub strategies: &'a [Box<dyn ListingStrategy>],
}

/// Fetch the listing page(s) and build the chronological chapter list.
///
/// A failure on page 1 is returned unchanged so callers can recognize a missing work.
/// Any later page that fails or comes back empty aborts the listing: a gap would
/// shift every index after it.
pub fn list_chapters(
    fetcher: &mut dyn PageFetcher,
    plan: &ListingPlan<'_>,
    pacer: &Pacer,
) -> Result<ChapterList, ScraperError> {
    let first_url = Url::parse(&plan.first_page).map_err(|e| ScraperError::InvalidUrl {
        input: plan.first_page.clone(),
        reason: e.to_string(),
    })?;
    let html = fetcher.fetch_page(&plan.first_page)?;
    let (hit, last_page) = {
        let doc = Html::parse_document(&html);
        let hit = run_cascade(&doc, &first_url, plan.strategies).ok_or_else(|| {
            ScraperError::ListingNotFound {
                url: plan.first_page.clone(),
            }
        })?;
        let last_page = plan
            .pagination
            .and_then(|p| p.last_page.read(&doc))
            .unwrap_or(1);
        (hit, last_page)
    };
    tracing::debug!(
        strategy = %hit.strategy,
        entries = hit.entries.len(),
        pages = last_page,
        "listing page 1 parsed"
    );

    let order = hit.order;
    let mut entries = hit.entries;
    if let Some(pagination) = plan.pagination {
        for page in 2..=last_page {
            pacer.between_listing_pages();
            let url = pagination.page_url(page);
            let page_url = Url::parse(&url).map_err(|e| ScraperError::ListingPage {
                page,
                source: Box::new(ScraperError::InvalidUrl {
                    input: url.clone(),
                    reason: e.to_string(),
                }),
            })?;
            let html = fetcher
                .fetch_page(&url)
                .map_err(|e| ScraperError::ListingPage {
                    page,
                    source: Box::new(e),
                })?;
            let doc = Html::parse_document(&html);
            let page_hit = run_cascade(&doc, &page_url, plan.strategies).ok_or_else(|| {
                ScraperError::ListingPage {
                    page,
                    source: Box::new(ScraperError::ListingNotFound { url: url.clone() }),
                }
            })?;
            if page_hit.order != order {
                tracing::warn!(
                    page,
                    strategy = %page_hit.strategy,
                    "listing page matched a template with a different order; keeping page 1 order"
                );
            }
            tracing::debug!(page, entries = page_hit.entries.len(), "listing page parsed");
            entries.extend(page_hit.entries);
        }
    }

    let list = normalize(entries, order);
    if list.is_empty() {
        return Err(ScraperError::ListingNotFound {
            url: plan.first_page.clone(),
        });
    }
    Ok(list)
}
