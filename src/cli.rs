//! CLI parsing and orchestration. Parses args, builds the fetcher and site adapter, runs the
//! engine, and maps errors to exit codes.

use crate::archive::{ArchiveError, DocumentFormat, ImageArchiveOptions, WkHtmlToPdf};
use crate::config::{self, Config};
use crate::engine::{self, RunConfig, RunError};
use crate::model::ArchiveKind;
use crate::scraper::{
    build_scraper, resolve_work, CaptureMode, FetchMode, FetchedImage, HttpFetcher, Pacer,
    PageFetcher, ScraperError, Site, WorkTarget,
};
use crate::select::{SelectionCriteria, SelectionError, StdinPrompt};
use clap::Parser;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Printed on stdout when the work's listing page does not exist.
pub const NOT_FOUND_SENTINEL: &str = "ERR404";

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    /// The listing page is missing; nothing was written.
    #[error("ERR404")]
    NotFound {
        #[source]
        source: ScraperError,
    },

    #[error("{0}")]
    Scraper(#[from] ScraperError),

    #[error("{0}")]
    Selection(#[from] SelectionError),

    #[error("{0}")]
    Archive(#[from] ArchiveError),
}

impl CliRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) | CliRunError::Selection(_) => 1,
            CliRunError::NotFound { .. } | CliRunError::Scraper(_) => 2,
            CliRunError::Archive(_) => 3,
        }
    }

    /// Listing errors: a missing page becomes the not-found sentinel.
    fn from_listing(e: ScraperError) -> Self {
        if e.is_not_found() {
            CliRunError::NotFound { source: e }
        } else {
            CliRunError::Scraper(e)
        }
    }
}

impl From<RunError> for CliRunError {
    fn from(e: RunError) -> Self {
        match e {
            RunError::Scraper(e) => CliRunError::from_listing(e),
            RunError::Selection(e) => CliRunError::Selection(e),
            RunError::Archive(e) => CliRunError::Archive(e),
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "chapterdl", version)]
#[command(about = "Archive manga chapters as image folders and web novels as a single PDF")]
#[command(
    after_help = "Chapter indices are 0-based and chronological (0 is the first published chapter). \
Without --cstart/--cstop/--clist the chapter list is printed and the range is asked for. \
Config file keys (user_agent, timeout_secs, image_delay_ms, chapter_delay_ms, write_info, wkhtmltopdf, \
capture, headless, browser_executable) are read from ./chapterdl.toml or ~/.config/chapterdl/config.toml. \
CLI flags override config."
)]
pub struct Args {
    /// Listing URL of the work, or its slug together with --site.
    pub work: String,

    /// Image sites: root folder for chapter folders. Text sites: work name, written as DEST.pdf.
    pub dest: PathBuf,

    /// Site to use (mangakakalot, manganelo, mangatown, novelfull, webnovelpub, wuxiaworld). Required for slugs.
    #[arg(long, value_parser = parse_site)]
    pub site: Option<Site>,

    /// First chapter index to fetch (inclusive).
    #[arg(long)]
    pub cstart: Option<usize>,

    /// Last chapter index to fetch (inclusive).
    #[arg(long)]
    pub cstop: Option<usize>,

    /// Explicit comma-separated chapter indices, fetched in the given order, e.g. 0,4,2.
    #[arg(long, value_delimiter = ',', conflicts_with_all = ["cstart", "cstop"])]
    pub clist: Option<Vec<usize>>,

    /// Page fetcher: http or browser. Default depends on the site.
    #[arg(long, value_parser = parse_fetcher)]
    pub fetcher: Option<FetchMode>,

    /// How the browser fetcher captures images: canvas or screenshot.
    #[arg(long, value_parser = parse_capture)]
    pub capture: Option<CaptureMode>,

    /// Show the browser window instead of running headless.
    #[arg(long)]
    pub headful: bool,

    /// Text sites: write DEST.html instead of rendering DEST.pdf.
    #[arg(long)]
    pub html: bool,

    /// Image sites: do not write info.txt.
    #[arg(long)]
    pub no_info: bool,

    /// Image sites: also pack each chapter folder into a .cbz file.
    #[arg(long)]
    pub cbz: bool,

    /// Fetch the chapter list, print it, and exit without downloading anything.
    #[arg(long)]
    pub dry_run: bool,

    /// With --dry-run: print the chapter list as JSON.
    #[arg(long, requires = "dry_run")]
    pub json: bool,

    /// HTTP User-Agent (overrides config).
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Delay after each image in milliseconds (overrides config and site default).
    #[arg(long)]
    pub image_delay_ms: Option<u64>,

    /// Delay after each chapter in milliseconds (overrides config and site default).
    #[arg(long)]
    pub chapter_delay_ms: Option<u64>,

    /// Request timeout in seconds (overrides config; default 30).
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Suppress progress output (warnings and errors only).
    #[arg(short, long)]
    pub quiet: bool,

    /// Debug logging and the full error chain.
    #[arg(long)]
    pub verbose: bool,
}

fn parse_site(s: &str) -> Result<Site, String> {
    s.parse()
}

fn parse_fetcher(s: &str) -> Result<FetchMode, String> {
    s.parse()
}

fn parse_capture(s: &str) -> Result<CaptureMode, String> {
    s.parse()
}

impl Args {
    fn criteria(&self) -> SelectionCriteria {
        SelectionCriteria {
            start: self.cstart,
            stop: self.cstop,
            list: self.clist.clone(),
        }
    }
}

/// Site defaults, then config, then CLI flags.
fn effective_pacer(site: Site, args: &Args, config: Option<&Config>) -> Pacer {
    let defaults = site.default_pacer();
    let image = args
        .image_delay_ms
        .or_else(|| config.and_then(|c| c.image_delay_ms))
        .map(Duration::from_millis)
        .unwrap_or(defaults.image_delay());
    let chapter = args
        .chapter_delay_ms
        .or_else(|| config.and_then(|c| c.chapter_delay_ms))
        .map(Duration::from_millis)
        .unwrap_or(defaults.chapter_delay());
    Pacer::new(image, chapter)
}

/// Text sites write DEST.pdf next to DEST; its parent must exist.
fn validate_output_path(path: &Path) -> Result<(), CliRunError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(CliRunError::InvalidInput(format!(
                "Cannot write output: {}: parent directory does not exist.",
                path.display()
            )));
        }
    }
    Ok(())
}

/// The run's page fetcher; the browser variant is released by [ActiveFetcher::close] or on drop.
enum ActiveFetcher {
    Http(HttpFetcher),
    #[cfg(feature = "browser")]
    Browser(crate::scraper::browser::BrowserSession),
}

impl ActiveFetcher {
    fn open(
        mode: FetchMode,
        args: &Args,
        config: Option<&Config>,
    ) -> Result<Self, CliRunError> {
        const DEFAULT_TIMEOUT_SECS: u64 = 30;
        let timeout_secs = args
            .timeout
            .or_else(|| config.and_then(|c| c.timeout_secs))
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        let user_agent = args
            .user_agent
            .clone()
            .or_else(|| config.and_then(|c| c.user_agent.clone()));

        match mode {
            FetchMode::Http => {
                let mut builder = HttpFetcher::builder().timeout_secs(timeout_secs);
                if let Some(ua) = user_agent {
                    builder = builder.user_agent(ua);
                }
                let client = builder.build().map_err(|e| {
                    CliRunError::InvalidInput(format!("Failed to create HTTP client: {}", e))
                })?;
                Ok(ActiveFetcher::Http(client))
            }
            #[cfg(feature = "browser")]
            FetchMode::Browser => {
                use crate::scraper::browser::{BrowserOptions, BrowserSession};
                let capture = match args.capture {
                    Some(c) => c,
                    None => config
                        .and_then(|c| c.capture.as_deref())
                        .map(str::parse::<CaptureMode>)
                        .transpose()
                        .map_err(CliRunError::InvalidInput)?
                        .unwrap_or_default(),
                };
                let options = BrowserOptions {
                    headless: !args.headful && config.and_then(|c| c.headless).unwrap_or(true),
                    capture,
                    executable: config.and_then(|c| c.browser_executable.clone()),
                    user_agent,
                    request_timeout: Duration::from_secs(timeout_secs),
                };
                Ok(ActiveFetcher::Browser(BrowserSession::launch(&options)?))
            }
            #[cfg(not(feature = "browser"))]
            FetchMode::Browser => Err(CliRunError::InvalidInput(
                "This build has no browser support; use --fetcher http.".to_string(),
            )),
        }
    }

    fn close(self) {
        match self {
            ActiveFetcher::Http(_) => {}
            #[cfg(feature = "browser")]
            ActiveFetcher::Browser(session) => session.close(),
        }
    }
}

impl PageFetcher for ActiveFetcher {
    fn fetch_page(&mut self, url: &str) -> Result<String, ScraperError> {
        match self {
            ActiveFetcher::Http(f) => f.fetch_page(url),
            #[cfg(feature = "browser")]
            ActiveFetcher::Browser(f) => f.fetch_page(url),
        }
    }

    fn fetch_image(&mut self, url: &str) -> Result<FetchedImage, ScraperError> {
        match self {
            ActiveFetcher::Http(f) => f.fetch_image(url),
            #[cfg(feature = "browser")]
            ActiveFetcher::Browser(f) => f.fetch_image(url),
        }
    }
}

fn resolve_target(args: &Args) -> Result<WorkTarget, CliRunError> {
    resolve_work(&args.work, args.site).map_err(|e| match &e {
        ScraperError::InvalidUrl { input, reason } => CliRunError::InvalidInput(format!(
            "Expected a listing URL (e.g. https://www.mangatown.com/manga/name) or a slug with --site. Invalid: {}: {}",
            input, reason
        )),
        ScraperError::UnrecognizedHost { host } => CliRunError::InvalidInput(format!(
            "Unsupported site: {}. Use --site to choose one of: {}.",
            host,
            Site::ALL.map(Site::name).join(", ")
        )),
        _ => CliRunError::Scraper(e),
    })
}

/// Entry point for the CLI. Returns Ok(()) on success; Err with exit code and message on failure.
pub fn run(args: &Args) -> Result<(), CliRunError> {
    let target = resolve_target(args)?;
    let config = config::load_config().map_err(CliRunError::InvalidInput)?;
    let kind = target.site.kind();
    if kind == ArchiveKind::Document && !args.dry_run {
        validate_output_path(&args.dest)?;
    }

    let pacer = effective_pacer(target.site, args, config.as_ref());
    let mode = args
        .fetcher
        .unwrap_or_else(|| target.site.default_fetch_mode());
    tracing::info!(site = %target.site, slug = %target.slug, fetcher = ?mode, "starting");

    let mut fetcher = ActiveFetcher::open(mode, args, config.as_ref())?;
    let mut scraper = build_scraper(&target, &mut fetcher)?;

    if args.dry_run {
        let chapters = scraper
            .list_chapters(&pacer)
            .map_err(CliRunError::from_listing)?;
        if args.json {
            let json = serde_json::to_string_pretty(&chapters).map_err(|e| {
                CliRunError::InvalidInput(format!("Failed to serialize chapter list: {}", e))
            })?;
            println!("{json}");
        } else {
            for chapter in &chapters {
                println!("{}\t:{}", chapter.index, chapter.title);
            }
            eprintln!("Chapters: {}", chapters.len());
        }
        drop(scraper);
        fetcher.close();
        return Ok(());
    }

    let progress_state: RefCell<Option<indicatif::ProgressBar>> = RefCell::new(None);
    let progress_cb = |n: u32, total: u32, title: &str| {
        if total == 0 {
            return;
        }
        let mut state = progress_state.borrow_mut();
        let pb = state.get_or_insert_with(|| {
            let bar = indicatif::ProgressBar::new(total as u64);
            bar.set_style(
                indicatif::ProgressStyle::default_bar()
                    .template("{spinner} {msg} [{bar:40}] {pos}/{len} ({elapsed})")
                    .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar())
                    .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
                    .progress_chars("█▉▊▋▌▍▎▏ "),
            );
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        });
        pb.set_position(n.saturating_sub(1) as u64);
        pb.set_message(format!("Fetching chapter {}/{}: {}", n, total, title));
    };
    let progress: Option<&dyn Fn(u32, u32, &str)> = if args.quiet {
        None
    } else {
        Some(&progress_cb)
    };

    let renderer = WkHtmlToPdf::new(
        config
            .as_ref()
            .and_then(|c| c.wkhtmltopdf.clone())
            .unwrap_or_else(|| PathBuf::from("wkhtmltopdf")),
    );
    let run_config = RunConfig {
        criteria: args.criteria(),
        pacer,
        dest: args.dest.clone(),
        image_options: ImageArchiveOptions {
            write_info: !args.no_info && config.as_ref().and_then(|c| c.write_info).unwrap_or(true),
            cbz: args.cbz,
        },
        document_format: if args.html {
            DocumentFormat::Html
        } else {
            DocumentFormat::Pdf
        },
        renderer: &renderer,
        progress,
    };

    let mut prompt = StdinPrompt::stdio();
    let result = engine::run(scraper.as_mut(), &run_config, &mut prompt);

    if let Some(pb) = progress_state.borrow_mut().take() {
        pb.disable_steady_tick();
        pb.finish_and_clear();
    }
    drop(scraper);
    fetcher.close();

    let summary = result?;
    if !summary.skipped.is_empty() {
        eprintln!(
            "Skipped {} of {} chapters:",
            summary.skipped.len(),
            summary.selected
        );
        for skipped in &summary.skipped {
            eprintln!("  {}\t:{}: {}", skipped.index, skipped.title, skipped.reason);
        }
    }
    if !args.quiet {
        eprintln!(
            "Wrote {} ({} chapters)",
            summary.artifact.primary_path().display(),
            summary.materialized
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("chapterdl").chain(args.iter().copied()))
    }

    #[test]
    fn clist_is_comma_separated_and_keeps_order() -> Result<(), clap::Error> {
        let args = parse(&["work", "out", "--site", "mangatown", "--clist", "4,0,4"])?;
        assert_eq!(args.clist, Some(vec![4, 0, 4]));
        assert_eq!(args.site, Some(Site::Mangatown));
        assert_eq!(args.criteria(), SelectionCriteria::list(vec![4, 0, 4]));
        Ok(())
    }

    #[test]
    fn clist_conflicts_with_range() {
        assert!(parse(&["work", "out", "--clist", "1,2", "--cstart", "0"]).is_err());
        assert!(parse(&["work", "out", "--clist", "1", "--cstop", "3"]).is_err());
    }

    #[test]
    fn json_requires_dry_run() {
        assert!(parse(&["work", "out", "--json"]).is_err());
        assert!(parse(&["work", "out", "--json", "--dry-run"]).is_ok());
    }

    #[test]
    fn site_fetcher_and_capture_values() {
        assert_eq!(parse_site("Novelfull"), Ok(Site::Novelfull));
        assert!(parse_site("mangadex").is_err());
        assert_eq!(parse_fetcher("browser"), Ok(FetchMode::Browser));
        assert!(parse_fetcher("curl").is_err());
        assert_eq!(parse_capture("screenshot"), Ok(CaptureMode::Screenshot));
    }

    #[test]
    fn pacer_precedence_cli_over_config_over_site() -> Result<(), clap::Error> {
        let config = Config {
            image_delay_ms: Some(100),
            chapter_delay_ms: Some(900),
            ..Config::default()
        };
        let args = parse(&["w", "out", "--chapter-delay-ms", "50"])?;
        let pacer = effective_pacer(Site::Mangatown, &args, Some(&config));
        assert_eq!(pacer.image_delay(), Duration::from_millis(100));
        assert_eq!(pacer.chapter_delay(), Duration::from_millis(50));

        let pacer = effective_pacer(Site::Mangatown, &args, None);
        assert_eq!(pacer.image_delay(), Duration::from_millis(500));
        Ok(())
    }

    #[test]
    fn slug_without_site_is_invalid_input() -> Result<(), clap::Error> {
        let args = parse(&["some-slug", "out"])?;
        let err = resolve_target(&args).unwrap_err();
        assert_eq!(err.exit_code(), 1);
        Ok(())
    }

    #[test]
    fn missing_listing_maps_to_sentinel() {
        let err = CliRunError::from(RunError::Scraper(ScraperError::PageUnavailable {
            url: "https://www.mangatown.com/manga/none".into(),
            status: Some(404),
            reason: "HTTP 404".into(),
        }));
        assert_eq!(err.to_string(), NOT_FOUND_SENTINEL);
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn throttled_listing_keeps_its_diagnostic() {
        let err = CliRunError::from(RunError::Scraper(ScraperError::PageUnavailable {
            url: "https://www.mangatown.com/manga/w".into(),
            status: Some(503),
            reason: "HTTP 503".into(),
        }));
        assert!(matches!(err, CliRunError::Scraper(_)));
        assert!(err.to_string().contains("HTTP 503"), "{err}");
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn validate_output_path_parent_missing() {
        let path = PathBuf::from("/nonexistent_dir_chapterdl_xyz/novel");
        let result = validate_output_path(&path);
        assert!(matches!(result, Err(CliRunError::InvalidInput(msg)) if msg.contains("parent directory does not exist")));
        assert!(validate_output_path(Path::new("novel")).is_ok());
    }

    #[test]
    fn cli_run_error_exit_codes() {
        assert_eq!(CliRunError::InvalidInput("x".into()).exit_code(), 1);
        assert_eq!(
            CliRunError::Selection(SelectionError::Inverted { start: 2, stop: 1 }).exit_code(),
            1
        );
        assert_eq!(
            CliRunError::Scraper(ScraperError::ListingNotFound { url: "x".into() }).exit_code(),
            2
        );
        assert_eq!(CliRunError::Archive(ArchiveError::NothingToAssemble).exit_code(), 3);
    }
}
