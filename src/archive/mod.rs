//! Persisting retrieved chapters: image folders per chapter, or one document for the whole run.

pub mod document;
pub mod images;

pub use document::{
    DocumentArchive, DocumentBody, DocumentFormat, DocumentRenderer, WkHtmlToPdf, PAGE_BREAK,
};
pub use images::{ImageArchive, ImageArchiveOptions};

use crate::model::{Chapter, RetrievedResource};
use chrono::{DateTime, Local, SecondsFormat};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const TOOL_NAME: &str = env!("CARGO_PKG_NAME");
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Errors from materializing chapters and assembling the final artifact.
///
/// Maps to CLI exit code 3.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Document rendering failed: {reason}")]
    RenderFailure { reason: String },

    #[error("Nothing to assemble: every selected chapter was skipped.")]
    NothingToAssemble,

    #[error("Failed to write CBZ archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Chapter '{chapter}' produced {kind} content, which this archive cannot store.")]
    UnexpectedResource { chapter: String, kind: &'static str },
}

impl ArchiveError {
    pub(crate) fn io(path: &Path) -> impl FnOnce(std::io::Error) -> ArchiveError + '_ {
        move |source| ArchiveError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Writes one chapter's resources into the run's archive. Re-materializing a chapter
/// overwrites what was there.
pub trait Materializer {
    fn materialize(
        &mut self,
        chapter: &Chapter,
        resources: Vec<RetrievedResource>,
    ) -> Result<(), ArchiveError>;

    /// Chapters stored so far.
    fn materialized(&self) -> usize;
}

/// Provenance written into finished archives.
#[derive(Debug, Clone)]
pub struct RunStamp {
    pub source_url: String,
    pub work_name: String,
    pub created: DateTime<Local>,
}

impl RunStamp {
    pub fn now(source_url: impl Into<String>, work_name: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            work_name: work_name.into(),
            created: Local::now(),
        }
    }

    pub fn created_rfc3339(&self) -> String {
        self.created.to_rfc3339_opts(SecondsFormat::Secs, false)
    }

    pub fn tool(&self) -> String {
        format!("{TOOL_NAME} {TOOL_VERSION}")
    }
}

/// What a finished run left on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    /// One directory per chapter under `root`, in creation order.
    Directory {
        root: PathBuf,
        chapters: Vec<PathBuf>,
        extras: Vec<PathBuf>,
    },
    /// A single rendered document.
    Document { path: PathBuf },
}

impl Artifact {
    pub fn primary_path(&self) -> &Path {
        match self {
            Artifact::Directory { root, .. } => root,
            Artifact::Document { path } => path,
        }
    }
}
