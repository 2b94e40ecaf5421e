//! Document archive: every chapter's markup concatenated into one body, wrapped in a fixed
//! envelope and rendered to `{work}.pdf` (or written as `{work}.html`).
//!
//! The final file only appears once rendering succeeded: output goes to a temporary file
//! in the destination directory which is persisted under the final name afterwards.

use crate::archive::{ArchiveError, Artifact, Materializer, RunStamp};
use crate::model::{Chapter, RetrievedResource};
use crate::scraper::content::escape_text;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Separator between chapters; forces each chapter onto a new page.
pub const PAGE_BREAK: &str = r#"<hr style="page-break-before: always;"/>"#;

const TOC_STYLESHEET: &str = "default_toc.xsl";

/// Accumulated chapter markup, in materialization order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentBody {
    html: String,
    blocks: usize,
}

impl DocumentBody {
    /// Append one chapter block; every block after the first is preceded by [PAGE_BREAK].
    pub fn push(&mut self, markup: &str) {
        if self.blocks > 0 {
            self.html.push('\n');
            self.html.push_str(PAGE_BREAK);
            self.html.push('\n');
        }
        self.html.push_str(markup);
        self.blocks += 1;
    }

    pub fn blocks(&self) -> usize {
        self.blocks
    }

    pub fn is_empty(&self) -> bool {
        self.blocks == 0
    }

    pub fn as_str(&self) -> &str {
        &self.html
    }
}

/// Full HTML document around the body, with a trailing provenance block.
pub fn envelope(body: &DocumentBody, stamp: &RunStamp) -> String {
    let url = escape_text(&stamp.source_url).replace('"', "&quot;");
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>{title}</title>
</head>
<body>
{body}
<div style="page-break-before: always;">
    <p><b>Extra metadata</b></p>
    <p>Downloaded from: <a href="{url}">{name}</a></p>
    <p>Created on: {created}</p>
    <p>Created using: {tool}</p>
</div>
</body>
</html>
"#,
        title = escape_text(&stamp.work_name),
        body = body.as_str(),
        url = url,
        name = escape_text(&stamp.work_name),
        created = stamp.created_rfc3339(),
        tool = escape_text(&stamp.tool()),
    )
}

/// Output flavour of a document run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentFormat {
    #[default]
    Pdf,
    /// The envelope itself, unrendered.
    Html,
}

impl DocumentFormat {
    pub fn extension(self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Html => "html",
        }
    }
}

/// HTML-to-paginated-document engine.
pub trait DocumentRenderer {
    /// Path of the table-of-contents stylesheet in `dir`, created on first use.
    fn ensure_toc_stylesheet(&self, dir: &Path) -> Result<PathBuf, ArchiveError>;

    /// Render `html` into `out` with a table of contents styled by `stylesheet`.
    fn render(&self, html: &Path, stylesheet: &Path, out: &Path) -> Result<(), ArchiveError>;
}

/// Renders through the `wkhtmltopdf` executable.
#[derive(Debug, Clone)]
pub struct WkHtmlToPdf {
    program: PathBuf,
}

impl Default for WkHtmlToPdf {
    fn default() -> Self {
        Self::new("wkhtmltopdf")
    }
}

impl WkHtmlToPdf {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run<I, S>(&self, args: I) -> Result<std::process::Output, ArchiveError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|e| ArchiveError::RenderFailure {
                reason: format!(
                    "Could not run {}: {}. Is wkhtmltopdf installed and on PATH?",
                    self.program.display(),
                    e
                ),
            })
    }
}

impl DocumentRenderer for WkHtmlToPdf {
    fn ensure_toc_stylesheet(&self, dir: &Path) -> Result<PathBuf, ArchiveError> {
        let path = dir.join(TOC_STYLESHEET);
        if path.exists() {
            return Ok(path);
        }
        let output = self.run(["--dump-default-toc-xsl"])?;
        if !output.status.success() || output.stdout.is_empty() {
            return Err(ArchiveError::RenderFailure {
                reason: format!(
                    "wkhtmltopdf could not dump the default TOC stylesheet: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        fs::write(&path, &output.stdout).map_err(ArchiveError::io(&path))?;
        tracing::debug!(path = %path.display(), "wrote TOC stylesheet");
        Ok(path)
    }

    fn render(&self, html: &Path, stylesheet: &Path, out: &Path) -> Result<(), ArchiveError> {
        let output = self.run([
            OsStr::new("--encoding"),
            OsStr::new("utf-8"),
            OsStr::new("--margin-bottom"),
            OsStr::new("20mm"),
            OsStr::new("--footer-center"),
            OsStr::new("[page]"),
            OsStr::new("toc"),
            OsStr::new("--xsl-style-sheet"),
            stylesheet.as_os_str(),
            html.as_os_str(),
            out.as_os_str(),
        ])?;
        if output.status.success() {
            return Ok(());
        }
        // a non-zero exit fails the render even when a partial PDF was written
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
        Err(ArchiveError::RenderFailure {
            reason: format!(
                "wkhtmltopdf exited with {}: {}",
                output.status,
                tail.into_iter().rev().collect::<Vec<_>>().join("\n")
            ),
        })
    }
}

/// Single-document archive for text sources.
#[derive(Debug)]
pub struct DocumentArchive {
    /// Work name as given by the operator, without extension; may include directories.
    dest: PathBuf,
    body: DocumentBody,
}

impl DocumentArchive {
    pub fn new(dest: impl Into<PathBuf>) -> Self {
        Self {
            dest: dest.into(),
            body: DocumentBody::default(),
        }
    }

    pub fn body(&self) -> &DocumentBody {
        &self.body
    }

    /// `{dest}.{ext}`; appended rather than replaced so names like `vol.1` survive.
    pub fn output_path(&self, format: DocumentFormat) -> PathBuf {
        let mut name: OsString = self.dest.as_os_str().to_owned();
        name.push(".");
        name.push(format.extension());
        PathBuf::from(name)
    }

    fn output_dir(&self) -> PathBuf {
        match self.dest.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    pub fn finish(
        self,
        renderer: &dyn DocumentRenderer,
        format: DocumentFormat,
        stamp: &RunStamp,
    ) -> Result<Artifact, ArchiveError> {
        if self.body.is_empty() {
            return Err(ArchiveError::NothingToAssemble);
        }
        let dir = self.output_dir();
        let final_path = self.output_path(format);
        let document = envelope(&self.body, stamp);

        let mut out = tempfile::Builder::new()
            .prefix(".chapterdl-")
            .suffix(&format!(".{}", format.extension()))
            .tempfile_in(&dir)
            .map_err(ArchiveError::io(&dir))?;

        match format {
            DocumentFormat::Html => {
                out.write_all(document.as_bytes())
                    .map_err(ArchiveError::io(out.path()))?;
            }
            DocumentFormat::Pdf => {
                let stylesheet = renderer.ensure_toc_stylesheet(&dir)?;
                let mut source = tempfile::Builder::new()
                    .prefix(".chapterdl-")
                    .suffix(".html")
                    .tempfile_in(&dir)
                    .map_err(ArchiveError::io(&dir))?;
                source
                    .write_all(document.as_bytes())
                    .and_then(|_| source.flush())
                    .map_err(ArchiveError::io(source.path()))?;
                tracing::info!(chapters = self.body.blocks(), "rendering document");
                renderer.render(source.path(), &stylesheet, out.path())?;
            }
        }

        out.persist(&final_path).map_err(|e| ArchiveError::Io {
            path: final_path.clone(),
            source: e.error,
        })?;
        Ok(Artifact::Document { path: final_path })
    }
}

impl Materializer for DocumentArchive {
    fn materialize(
        &mut self,
        chapter: &Chapter,
        resources: Vec<RetrievedResource>,
    ) -> Result<(), ArchiveError> {
        for resource in resources {
            match resource {
                RetrievedResource::Markup { markup } => self.body.push(&markup),
                RetrievedResource::Image { .. } => {
                    return Err(ArchiveError::UnexpectedResource {
                        chapter: chapter.title.clone(),
                        kind: "image",
                    })
                }
            }
        }
        Ok(())
    }

    fn materialized(&self) -> usize {
        self.body.blocks()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Renderer that copies the HTML, or fails on demand.
    struct FakeRenderer {
        fail: bool,
    }

    impl DocumentRenderer for FakeRenderer {
        fn ensure_toc_stylesheet(&self, dir: &Path) -> Result<PathBuf, ArchiveError> {
            let path = dir.join(TOC_STYLESHEET);
            if !path.exists() {
                fs::write(&path, "<xsl/>").map_err(ArchiveError::io(&path))?;
            }
            Ok(path)
        }

        fn render(&self, html: &Path, _: &Path, out: &Path) -> Result<(), ArchiveError> {
            if self.fail {
                return Err(ArchiveError::RenderFailure {
                    reason: "engine crashed".into(),
                });
            }
            fs::copy(html, out).map_err(ArchiveError::io(out))?;
            Ok(())
        }
    }

    fn markup(title: &str) -> Vec<RetrievedResource> {
        vec![RetrievedResource::Markup {
            markup: format!("<h2>{title}</h2><p>text</p>"),
        }]
    }

    fn chapter(index: usize) -> Chapter {
        Chapter {
            index,
            title: format!("Chapter {}", index + 1),
            url: format!("https://example.com/c/{index}"),
        }
    }

    #[test]
    fn three_chapters_have_two_page_breaks_in_order() -> Result<(), ArchiveError> {
        let mut archive = DocumentArchive::new("work");
        for i in 0..3 {
            archive.materialize(&chapter(i), markup(&format!("Chapter {}", i + 1)))?;
        }
        let body = archive.body().as_str();
        assert_eq!(body.matches(PAGE_BREAK).count(), 2);
        assert!(!body.starts_with(PAGE_BREAK));
        let first = body.find("Chapter 1").unwrap_or(usize::MAX);
        let second = body.find("Chapter 2").unwrap_or(usize::MAX);
        let third = body.find("Chapter 3").unwrap_or(usize::MAX);
        assert!(first < second && second < third);
        Ok(())
    }

    #[test]
    fn envelope_has_charset_and_metadata() {
        let mut body = DocumentBody::default();
        body.push("<h2>One</h2>");
        let stamp = RunStamp::now("https://novelfull.com/work.html", "work");
        let html = envelope(&body, &stamp);
        assert!(html.contains(r#"<meta charset="utf-8">"#));
        assert!(html.contains("<h2>One</h2>"));
        assert!(html.contains("Extra metadata"));
        assert!(html.contains(r#"href="https://novelfull.com/work.html""#));
    }

    #[test]
    fn pdf_is_persisted_with_stylesheet_on_success() -> Result<(), Box<dyn std::error::Error>> {
        let tmp = tempfile::tempdir()?;
        let mut archive = DocumentArchive::new(tmp.path().join("my-novel"));
        archive.materialize(&chapter(0), markup("Chapter 1"))?;
        let stamp = RunStamp::now("https://example.com", "my-novel");
        let artifact = archive.finish(&FakeRenderer { fail: false }, DocumentFormat::Pdf, &stamp)?;
        let pdf = tmp.path().join("my-novel.pdf");
        assert_eq!(artifact, Artifact::Document { path: pdf.clone() });
        assert!(fs::read_to_string(&pdf)?.contains("Chapter 1"));
        assert!(tmp.path().join(TOC_STYLESHEET).exists());
        Ok(())
    }

    #[test]
    fn render_failure_leaves_no_document() -> Result<(), Box<dyn std::error::Error>> {
        let tmp = tempfile::tempdir()?;
        let mut archive = DocumentArchive::new(tmp.path().join("my-novel"));
        archive.materialize(&chapter(0), markup("Chapter 1"))?;
        let stamp = RunStamp::now("https://example.com", "my-novel");
        let result = archive.finish(&FakeRenderer { fail: true }, DocumentFormat::Pdf, &stamp);
        assert!(matches!(result, Err(ArchiveError::RenderFailure { .. })));
        assert!(!tmp.path().join("my-novel.pdf").exists());
        let leftovers: Vec<_> = fs::read_dir(tmp.path())?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".chapterdl-"))
            .collect();
        assert!(leftovers.is_empty());
        Ok(())
    }

    #[test]
    fn html_format_keeps_dotted_names() -> Result<(), Box<dyn std::error::Error>> {
        let tmp = tempfile::tempdir()?;
        let mut archive = DocumentArchive::new(tmp.path().join("vol.1"));
        archive.materialize(&chapter(0), markup("Chapter 1"))?;
        let stamp = RunStamp::now("https://example.com", "vol.1");
        archive.finish(&FakeRenderer { fail: true }, DocumentFormat::Html, &stamp)?;
        let html = fs::read_to_string(tmp.path().join("vol.1.html"))?;
        assert!(html.starts_with("<!DOCTYPE html>"));
        Ok(())
    }

    #[test]
    fn empty_body_is_nothing_to_assemble() {
        let archive = DocumentArchive::new("work");
        let stamp = RunStamp::now("https://example.com", "work");
        let result = archive.finish(&FakeRenderer { fail: false }, DocumentFormat::Pdf, &stamp);
        assert!(matches!(result, Err(ArchiveError::NothingToAssemble)));
    }

    /// Stand-in for wkhtmltopdf that writes a partial PDF and then reports a network error.
    #[cfg(unix)]
    fn failing_wkhtmltopdf(dir: &Path) -> std::io::Result<PathBuf> {
        use std::os::unix::fs::PermissionsExt;
        let script = dir.join("fake-wkhtmltopdf");
        fs::write(
            &script,
            r#"#!/bin/sh
if [ "$1" = "--dump-default-toc-xsl" ]; then
    echo '<xsl/>'
    exit 0
fi
for last; do :; done
printf 'partial' > "$last"
echo "Exit with code 1 due to network error: ContentNotFoundError" >&2
exit 1
"#,
        )?;
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755))?;
        Ok(script)
    }

    #[cfg(unix)]
    #[test]
    fn wkhtmltopdf_network_error_is_a_render_failure() -> Result<(), Box<dyn std::error::Error>> {
        let tools = tempfile::tempdir()?;
        let renderer = WkHtmlToPdf::new(failing_wkhtmltopdf(tools.path())?);

        let tmp = tempfile::tempdir()?;
        let mut archive = DocumentArchive::new(tmp.path().join("my-novel"));
        archive.materialize(&chapter(0), markup("Chapter 1"))?;
        let stamp = RunStamp::now("https://example.com", "my-novel");
        let result = archive.finish(&renderer, DocumentFormat::Pdf, &stamp);

        match result {
            Err(ArchiveError::RenderFailure { reason }) => {
                assert!(reason.contains("due to network error"), "{reason}");
            }
            other => panic!("expected a render failure, got {other:?}"),
        }
        assert!(!tmp.path().join("my-novel.pdf").exists());
        assert!(tmp.path().join(TOC_STYLESHEET).exists());
        Ok(())
    }

    #[test]
    fn image_resources_are_rejected() {
        let mut archive = DocumentArchive::new("work");
        let result = archive.materialize(
            &chapter(0),
            vec![RetrievedResource::Image {
                order: 1,
                bytes: vec![1],
                ext: "jpg".into(),
            }],
        );
        assert!(matches!(result, Err(ArchiveError::UnexpectedResource { .. })));
    }
}
