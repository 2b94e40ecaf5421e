//! Chapter page content: image URL filtering and text fragment cleaning.

use crate::scraper::error::ScraperError;
use crate::scraper::listing::parse_selector;
use reqwest::Url;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};

/// URL substring filter for chapter images.
///
/// A URL is kept when it contains at least one allow-listed substring and none of the
/// deny-listed ones. An empty allow list accepts every URL (the deny list still applies).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageFilter {
    allow: Vec<String>,
    deny: Vec<String>,
}

impl ImageFilter {
    pub fn new(allow: &[&str], deny: &[&str]) -> Self {
        Self {
            allow: allow.iter().map(|s| s.to_string()).collect(),
            deny: deny.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn accepts(&self, url: &str) -> bool {
        let allowed = self.allow.is_empty() || self.allow.iter().any(|a| url.contains(a.as_str()));
        allowed && !self.deny.iter().any(|d| url.contains(d.as_str()))
    }
}

/// Image URLs under `scope` in document order (`src`, else `data-src`), resolved against the
/// page and filtered. Document order is taken to be reading order.
pub fn collect_image_urls(scope: ElementRef<'_>, page_url: &Url, filter: &ImageFilter) -> Vec<String> {
    let img = match Selector::parse("img") {
        Ok(sel) => sel,
        Err(_) => return Vec::new(),
    };
    scope
        .select(&img)
        .filter_map(|el| {
            let value = el.value();
            let raw = value
                .attr("src")
                .filter(|s| !s.trim().is_empty() && !s.starts_with("data:"))
                .or_else(|| value.attr("data-src"))?;
            page_url.join(raw.trim()).ok().map(|u| u.to_string())
        })
        .filter(|url| filter.accepts(url))
        .collect()
}

/// First element matched by the anchors, tried in order.
pub fn find_container<'a>(doc: &'a Html, anchors: &[Selector]) -> Option<ElementRef<'a>> {
    anchors.iter().find_map(|sel| doc.select(sel).next())
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

/// Serializes a content container without scripts and ad blocks, with some headings renamed.
#[derive(Debug)]
pub struct FragmentCleaner {
    drop: Vec<Selector>,
    promote: Vec<String>,
}

impl FragmentCleaner {
    /// `drop` selectors are removed with their subtree (`script` always is);
    /// `promote` tags are renamed to `h2`.
    pub fn new(drop: &[&str], promote: &[&str]) -> Result<Self, ScraperError> {
        let mut selectors = vec![parse_selector("script")?];
        for sel in drop {
            selectors.push(parse_selector(sel)?);
        }
        Ok(Self {
            drop: selectors,
            promote: promote.iter().map(|t| t.to_ascii_lowercase()).collect(),
        })
    }

    /// Inner HTML of `container` after cleaning.
    pub fn clean(&self, container: ElementRef<'_>) -> String {
        let mut out = String::new();
        self.write_children(container, false, &mut out);
        out.trim().to_string()
    }

    /// Only the descendants matching `keep`, each serialized whole and cleaned.
    pub fn clean_each(&self, container: ElementRef<'_>, keep: &Selector) -> String {
        let mut out = String::new();
        for el in container.select(keep) {
            if !self.drop.iter().any(|sel| sel.matches(&el)) {
                self.write_element(el, &mut out);
            }
        }
        out
    }

    fn write_children(&self, parent: ElementRef<'_>, raw_text: bool, out: &mut String) {
        for child in parent.children() {
            match child.value() {
                Node::Text(text) if raw_text => out.push_str(text),
                Node::Text(text) => escape_into(text, false, out),
                Node::Element(_) => {
                    if let Some(el) = ElementRef::wrap(child) {
                        if !self.drop.iter().any(|sel| sel.matches(&el)) {
                            self.write_element(el, out);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn write_element(&self, el: ElementRef<'_>, out: &mut String) {
        let element = el.value();
        let name = element.name();
        let tag = if self.promote.iter().any(|p| p == name) {
            "h2"
        } else {
            name
        };
        out.push('<');
        out.push_str(tag);
        for (attr, value) in element.attrs() {
            out.push(' ');
            out.push_str(attr);
            out.push_str("=\"");
            escape_into(value, true, out);
            out.push('"');
        }
        if VOID_ELEMENTS.contains(&tag) {
            out.push_str("/>");
            return;
        }
        out.push('>');
        self.write_children(el, matches!(tag, "style" | "script"), out);
        out.push_str("</");
        out.push_str(tag);
        out.push('>');
    }
}

fn escape_into(s: &str, attribute: bool, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
}

/// Escape text for use inside an element (titles in generated headings).
pub fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    escape_into(s, false, &mut out);
    out
}
