//! The run loop: list, select, then fetch and materialize chapters one at a time.
//!
//! A chapter that fails with a recoverable error is logged and skipped; the run goes on.
//! Anything else aborts the run.

use crate::archive::{
    ArchiveError, Artifact, DocumentArchive, DocumentFormat, DocumentRenderer, ImageArchive,
    ImageArchiveOptions, Materializer, RunStamp,
};
use crate::model::{ArchiveKind, Chapter};
use crate::scraper::{Pacer, Scraper, ScraperError};
use crate::select::{self, SelectionCriteria, SelectionError, SelectionProvider};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Scraper(#[from] ScraperError),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

/// Everything a run needs besides the scraper and the prompt.
pub struct RunConfig<'a> {
    pub criteria: SelectionCriteria,
    pub pacer: Pacer,
    /// Root folder (image sites) or work name without extension (text sites).
    pub dest: PathBuf,
    pub image_options: ImageArchiveOptions,
    pub document_format: DocumentFormat,
    pub renderer: &'a dyn DocumentRenderer,
    /// Called before each chapter with (position, total, title); position is 1-based.
    pub progress: Option<&'a dyn Fn(u32, u32, &str)>,
}

/// A chapter that was selected but not stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedChapter {
    pub index: usize,
    pub title: String,
    pub reason: String,
}

#[derive(Debug)]
pub struct RunSummary {
    pub listed: usize,
    pub selected: usize,
    pub materialized: usize,
    pub skipped: Vec<SkippedChapter>,
    pub artifact: Artifact,
}

pub fn run(
    scraper: &mut dyn Scraper,
    config: &RunConfig<'_>,
    provider: &mut dyn SelectionProvider,
) -> Result<RunSummary, RunError> {
    let chapters = scraper.list_chapters(&config.pacer)?;
    tracing::info!(chapters = chapters.len(), "chapter list ready");

    let selected = select::resolve(&config.criteria, &chapters, provider)?;
    tracing::info!(selected = selected.len(), "chapters selected");

    let work_name = config
        .dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| config.dest.display().to_string());
    let stamp = RunStamp::now(scraper.listing_url(), work_name);

    let (materialized, skipped, artifact) = match scraper.kind() {
        ArchiveKind::Images => {
            let mut archive = ImageArchive::new(&config.dest, config.image_options);
            let skipped = fetch_all(scraper, &selected, &mut archive, config)?;
            let materialized = archive.materialized();
            (materialized, skipped, archive.finish(&stamp)?)
        }
        ArchiveKind::Document => {
            let mut archive = DocumentArchive::new(&config.dest);
            let skipped = fetch_all(scraper, &selected, &mut archive, config)?;
            let materialized = archive.materialized();
            let artifact = archive.finish(config.renderer, config.document_format, &stamp)?;
            (materialized, skipped, artifact)
        }
    };

    Ok(RunSummary {
        listed: chapters.len(),
        selected: selected.len(),
        materialized,
        skipped,
        artifact,
    })
}

fn fetch_all(
    scraper: &mut dyn Scraper,
    selected: &[Chapter],
    materializer: &mut dyn Materializer,
    config: &RunConfig<'_>,
) -> Result<Vec<SkippedChapter>, RunError> {
    let total = selected.len() as u32;
    let mut skipped = Vec::new();
    for (n, chapter) in selected.iter().enumerate() {
        if let Some(progress) = config.progress {
            progress(n as u32 + 1, total, &chapter.title);
        }
        tracing::debug!(index = chapter.index, title = %chapter.title, url = %chapter.url, "fetching chapter");
        match scraper.fetch_chapter(chapter, &config.pacer) {
            Ok(resources) => materializer.materialize(chapter, resources)?,
            Err(e) if e.is_item_recoverable() => {
                tracing::warn!(index = chapter.index, title = %chapter.title, error = %e, "skipping chapter");
                skipped.push(SkippedChapter {
                    index: chapter.index,
                    title: chapter.title.clone(),
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        }
        if n + 1 < selected.len() {
            config.pacer.after_chapter();
        }
    }
    Ok(skipped)
}
