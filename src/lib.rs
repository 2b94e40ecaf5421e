//! chapterdl: archive manga chapters as image folders and web novels as a single PDF.

pub mod archive;
pub mod cli;
pub mod config;
pub mod engine;
pub mod logging;
pub mod model;
pub mod scraper;
pub mod select;

// Re-exports for CLI and consumers.
pub use archive::{
    ArchiveError, Artifact, DocumentFormat, DocumentRenderer, ImageArchiveOptions, WkHtmlToPdf,
};
pub use engine::{run, RunConfig, RunError, RunSummary, SkippedChapter};
pub use model::{ArchiveKind, Chapter, ChapterList};
pub use scraper::{
    build_scraper, resolve_work, FetchMode, HttpFetcher, HttpFetcherBuilder, Pacer, PageFetcher,
    Scraper, ScraperError, Site, WorkTarget,
};
pub use select::{SelectionCriteria, SelectionError, SelectionProvider, StdinPrompt};
