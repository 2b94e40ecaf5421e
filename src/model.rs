//! Data model shared by the lister, selector, fetchers and archives.
//!
//! The ordered [ChapterList] is the single source of truth for addressing work:
//! it is built once per run, always in chronological order, and only sliced afterwards.

use serde::{Deserialize, Serialize};

/// One chapter of a serialized work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    /// 0-based chronological position (earliest published chapter is 0).
    pub index: usize,
    /// Title with path-illegal characters already replaced.
    pub title: String,
    pub url: String,
}

/// Chronologically ordered chapters; `chapters[i].index == i` always holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ChapterList {
    chapters: Vec<Chapter>,
}

impl ChapterList {
    /// Build from `(title, url)` pairs that are already oldest-first. Indices are assigned here.
    pub fn from_chronological<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let chapters = entries
            .into_iter()
            .enumerate()
            .map(|(index, (title, url))| Chapter { index, title, url })
            .collect();
        Self { chapters }
    }

    pub fn len(&self) -> usize {
        self.chapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Chapter> {
        self.chapters.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Chapter> {
        self.chapters.iter()
    }
}

impl<'a> IntoIterator for &'a ChapterList {
    type Item = &'a Chapter;
    type IntoIter = std::slice::Iter<'a, Chapter>;

    fn into_iter(self) -> Self::IntoIter {
        self.chapters.iter()
    }
}

/// What a site produces and therefore how the run is archived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// One folder of numbered image files per chapter.
    Images,
    /// All chapters concatenated into one paginated document.
    Document,
}

/// One unit of chapter content, alive only between fetch and materialize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievedResource {
    Image {
        /// 1-based position on the chapter page.
        order: usize,
        bytes: Vec<u8>,
        /// File extension without the dot, e.g. `jpg`.
        ext: String,
    },
    Markup {
        markup: String,
    },
}
