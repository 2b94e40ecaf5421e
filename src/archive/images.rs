//! Image archive: `{root}/{chapter title}/{n}.{ext}`, plus an optional `info.txt` stamp and
//! optional per-chapter CBZ files.

use crate::archive::{ArchiveError, Artifact, Materializer, RunStamp};
use crate::model::{Chapter, RetrievedResource};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageArchiveOptions {
    /// Write `{root}/info.txt` when the run finishes.
    pub write_info: bool,
    /// Also pack each chapter folder into `{root}/{title}.cbz`.
    pub cbz: bool,
}

impl Default for ImageArchiveOptions {
    fn default() -> Self {
        Self {
            write_info: true,
            cbz: false,
        }
    }
}

/// Directory tree of chapter images.
#[derive(Debug)]
pub struct ImageArchive {
    root: PathBuf,
    options: ImageArchiveOptions,
    created: Vec<PathBuf>,
}

impl ImageArchive {
    pub fn new(root: impl Into<PathBuf>, options: ImageArchiveOptions) -> Self {
        Self {
            root: root.into(),
            options,
            created: Vec::new(),
        }
    }

    /// Chapter directories in the order they were first written.
    pub fn created_dirs(&self) -> &[PathBuf] {
        &self.created
    }

    pub fn finish(self, stamp: &RunStamp) -> Result<Artifact, ArchiveError> {
        if self.created.is_empty() {
            return Err(ArchiveError::NothingToAssemble);
        }
        let mut extras = Vec::new();
        if self.options.cbz {
            for dir in &self.created {
                extras.push(pack_cbz(dir)?);
            }
        }
        if self.options.write_info {
            let path = self.root.join("info.txt");
            let info = format!(
                "Downloaded by: {}\nSource: {}\nChapters: {}\nCompleted: {}\n",
                stamp.tool(),
                stamp.source_url,
                self.created.len(),
                stamp.created_rfc3339(),
            );
            fs::write(&path, info).map_err(ArchiveError::io(&path))?;
            extras.push(path);
        }
        Ok(Artifact::Directory {
            root: self.root,
            chapters: self.created,
            extras,
        })
    }
}

impl Materializer for ImageArchive {
    fn materialize(
        &mut self,
        chapter: &Chapter,
        resources: Vec<RetrievedResource>,
    ) -> Result<(), ArchiveError> {
        if resources.is_empty() {
            return Ok(());
        }
        let dir = self.root.join(&chapter.title);
        fs::create_dir_all(&dir).map_err(ArchiveError::io(&dir))?;
        for resource in resources {
            match resource {
                RetrievedResource::Image { order, bytes, ext } => {
                    let path = dir.join(format!("{order}.{ext}"));
                    fs::write(&path, &bytes).map_err(ArchiveError::io(&path))?;
                }
                RetrievedResource::Markup { .. } => {
                    return Err(ArchiveError::UnexpectedResource {
                        chapter: chapter.title.clone(),
                        kind: "markup",
                    })
                }
            }
        }
        if !self.created.contains(&dir) {
            self.created.push(dir);
        }
        Ok(())
    }

    fn materialized(&self) -> usize {
        self.created.len()
    }
}

/// Numeric file stem first so that `2.jpg` sorts before `10.jpg`.
fn page_sort_key(path: &Path) -> (u64, String) {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let number = path
        .file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(u64::MAX);
    (number, name)
}

/// Pack `dir` into a sibling `{dir}.cbz` with stored (uncompressed) entries in page order.
fn pack_cbz(dir: &Path) -> Result<PathBuf, ArchiveError> {
    let mut pages: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(ArchiveError::io(dir))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    pages.sort_by_key(|p| page_sort_key(p));

    let mut name = dir.as_os_str().to_owned();
    name.push(".cbz");
    let cbz_path = PathBuf::from(name);
    let file = File::create(&cbz_path).map_err(ArchiveError::io(&cbz_path))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .unix_permissions(0o644);
    for page in &pages {
        let entry = page
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let bytes = fs::read(page).map_err(ArchiveError::io(page))?;
        zip.start_file(entry, options)?;
        zip.write_all(&bytes).map_err(ArchiveError::io(&cbz_path))?;
    }
    zip.finish()?;
    Ok(cbz_path)
}
