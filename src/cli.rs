//! CLI parsing and orchestration: listing walk, detail pool, feed (or JSON) output.

use crate::config::{self, Config};
use crate::feed::{FeedOptions, DEFAULT_BLOG_TITLE};
use crate::formats::{write_feed, write_json, FormatError, OutputFormat};
use crate::scraper::{
    fetch_details, walk_listing, DetailOptions, PageSource, PoliteClient, ScraperError,
    WalkOptions,
};
use clap::Parser;
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_START_URL: &str = "https://mangaindo.biz/all-mangas/";
const DEFAULT_WORKERS: usize = 4;
const DEFAULT_PAGE_DELAY_SECS: f64 = 1.0;
const DEFAULT_TIMEOUT_SECS: u64 = 20;
const DEFAULT_RETRY_COUNT: u32 = 3;
const DEFAULT_BACKOFF_SECS: f64 = 1.0;
/// Limit applied by --test when no explicit limit is given.
const QUICK_TEST_LIMIT: usize = 10;

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Scraper(#[from] ScraperError),

    #[error("{0}")]
    Format(#[from] FormatError),
}

impl CliRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) | CliRunError::Scraper(_) => 1,
            CliRunError::Format(_) => 2,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "mangafeed")]
#[command(about = "Scrape a manga listing site and write a Blogger-compatible Atom import feed")]
#[command(
    after_help = "Config file keys (start_url, output, user_agent, accept_language, timeout_secs, retry_count, retry_backoff_secs, page_delay_secs, workers, blog_title) are read from ./mangafeed.toml or <config dir>/mangafeed/config.toml. CLI flags override config."
)]
pub struct Args {
    /// Listing start URL (default https://mangaindo.biz/all-mangas/).
    #[arg(long)]
    pub start_url: Option<String>,

    /// Output file. Default: mangaindo_blogger_import.xml (or .json with --format json).
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Maximum number of manga to collect (0 = all).
    #[arg(long, default_value_t = 0)]
    pub limit_manga: usize,

    /// Concurrent workers for detail pages (default 4).
    #[arg(long)]
    pub workers: Option<usize>,

    /// Delay between listing page requests in seconds (default 1.0).
    #[arg(long)]
    pub delay: Option<f64>,

    /// Do not include chapter posts.
    #[arg(long)]
    pub no_chapters: bool,

    /// Do not include manga-level posts (only chapters).
    #[arg(long)]
    pub no_manga_posts: bool,

    /// Quick test run: limit to 10 manga unless --limit-manga is set.
    #[arg(long)]
    pub test: bool,

    /// Feed title (default "Mangaindo Import").
    #[arg(long)]
    pub blog_title: Option<String>,

    /// Output format: atom or json.
    #[arg(long, default_value = "atom", value_parser = parse_format)]
    pub format: OutputFormat,

    /// HTTP User-Agent (overrides config).
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Request timeout in seconds (overrides config; default 20).
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Walk the listing only and print what was found; fetch no details and write nothing.
    #[arg(long)]
    pub dry_run: bool,

    /// Only warnings and errors on stderr; no progress bar.
    #[arg(short, long)]
    pub quiet: bool,

    /// Debug logging and the full error chain on failure.
    #[arg(long)]
    pub verbose: bool,
}

fn parse_format(s: &str) -> Result<OutputFormat, String> {
    match s.to_lowercase().as_str() {
        "atom" | "xml" | "blogger" => Ok(OutputFormat::Atom),
        "json" => Ok(OutputFormat::Json),
        _ => Err(format!(
            "Invalid --format value: '{}'. Use atom or json.",
            s
        )),
    }
}

/// Install the stderr tracing subscriber. RUST_LOG wins when set.
pub fn init_tracing(quiet: bool, verbose: bool) {
    let level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,mangafeed={}", level)));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .try_init();
}

/// Everything a run needs, after merging CLI flags, config file, and defaults.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub start_url: String,
    pub output: PathBuf,
    pub format: OutputFormat,
    pub limit: usize,
    pub workers: usize,
    pub page_delay: Duration,
    pub timeout_secs: u64,
    pub retry_count: u32,
    pub backoff_secs: f64,
    pub user_agent: Option<String>,
    pub accept_language: Option<String>,
    pub feed: FeedOptions,
}

/// Merge CLI flags over config over defaults, and validate the result.
pub fn resolve_settings(args: &Args, config: Option<&Config>) -> Result<RunSettings, CliRunError> {
    let start_url = args
        .start_url
        .clone()
        .or_else(|| config.and_then(|c| c.start_url.clone()))
        .unwrap_or_else(|| DEFAULT_START_URL.to_string());
    validate_start_url(&start_url)?;

    let workers = args
        .workers
        .or_else(|| config.and_then(|c| c.workers))
        .unwrap_or(DEFAULT_WORKERS);
    if workers == 0 {
        return Err(CliRunError::InvalidInput(
            "Invalid worker count: must be at least 1.".to_string(),
        ));
    }

    let delay = args
        .delay
        .or_else(|| config.and_then(|c| c.page_delay_secs))
        .unwrap_or(DEFAULT_PAGE_DELAY_SECS);
    let page_delay = seconds("delay", delay)?;
    let backoff_secs = config
        .and_then(|c| c.retry_backoff_secs)
        .unwrap_or(DEFAULT_BACKOFF_SECS);
    seconds("retry_backoff_secs", backoff_secs)?;

    let limit = if args.test && args.limit_manga == 0 {
        QUICK_TEST_LIMIT
    } else {
        args.limit_manga
    };

    let output = args
        .output
        .clone()
        .or_else(|| config.and_then(|c| c.output.clone()))
        .unwrap_or_else(|| PathBuf::from(args.format.default_file_name()));

    let blog_title = args
        .blog_title
        .clone()
        .or_else(|| config.and_then(|c| c.blog_title.clone()))
        .unwrap_or_else(|| DEFAULT_BLOG_TITLE.to_string());

    Ok(RunSettings {
        start_url,
        output,
        format: args.format,
        limit,
        workers,
        page_delay,
        timeout_secs: args
            .timeout
            .or_else(|| config.and_then(|c| c.timeout_secs))
            .unwrap_or(DEFAULT_TIMEOUT_SECS),
        retry_count: config
            .and_then(|c| c.retry_count)
            .unwrap_or(DEFAULT_RETRY_COUNT)
            .max(1),
        backoff_secs,
        user_agent: args
            .user_agent
            .clone()
            .or_else(|| config.and_then(|c| c.user_agent.clone())),
        accept_language: config.and_then(|c| c.accept_language.clone()),
        feed: FeedOptions {
            include_manga_posts: !args.no_manga_posts,
            include_chapters: !args.no_chapters,
            blog_title,
        },
    })
}

/// A non-negative, finite number of seconds that fits in a Duration.
fn seconds(name: &str, secs: f64) -> Result<Duration, CliRunError> {
    Duration::try_from_secs_f64(secs).map_err(|_| {
        CliRunError::InvalidInput(format!(
            "Invalid {}: {} (must be a non-negative number of seconds).",
            name, secs
        ))
    })
}

fn validate_start_url(input: &str) -> Result<(), CliRunError> {
    let url = Url::parse(input).map_err(|e| {
        CliRunError::InvalidInput(format!(
            "Expected a listing URL, e.g. {}. Invalid: {}: {}",
            DEFAULT_START_URL, input, e
        ))
    })?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(CliRunError::InvalidInput(format!(
            "Expected an http or https listing URL, got: {}",
            input
        )));
    }
    Ok(())
}

/// The output file's parent directory must exist.
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

fn build_client(settings: &RunSettings) -> Result<PoliteClient, CliRunError> {
    let mut builder = PoliteClient::builder()
        .timeout_secs(settings.timeout_secs)
        .retry_count(settings.retry_count)
        .backoff_secs(settings.backoff_secs);
    if let Some(ref ua) = settings.user_agent {
        builder = builder.user_agent(ua.clone());
    }
    if let Some(ref lang) = settings.accept_language {
        builder = builder.accept_language(lang.clone());
    }
    builder
        .build()
        .map_err(|e| CliRunError::InvalidInput(format!("Failed to create HTTP client: {}", e)))
}

fn progress_bar(total: usize) -> indicatif::ProgressBar {
    let bar = indicatif::ProgressBar::new(total as u64);
    if let Ok(style) = indicatif::ProgressStyle::with_template(
        "{spinner} {msg} [{bar:40}] {pos}/{len} ({elapsed})",
    ) {
        bar.set_style(
            style
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
                .progress_chars("█▉▊▋▌▍▎▏ "),
        );
    }
    bar.set_message("Fetching details");
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

/// Entry point for the CLI. Returns Ok(()) on success; Err with exit code and message on failure.
pub fn run(args: &Args) -> Result<(), CliRunError> {
    let config = config::load_config().map_err(CliRunError::InvalidInput)?;
    let settings = resolve_settings(args, config.as_ref())?;
    let client = build_client(&settings)?;
    run_with_source(&client, &settings, args.dry_run, args.quiet)
}

/// Run the pipeline against any page source: walk, extract, then write the output.
///
/// With `dry_run`, prints the collected listing entries to stdout and stops.
pub fn run_with_source<S: PageSource + ?Sized>(
    source: &S,
    settings: &RunSettings,
    dry_run: bool,
    quiet: bool,
) -> Result<(), CliRunError> {
    if !dry_run {
        validate_output_path(&settings.output)?;
    }

    info!("Scraping listing pages from {}", settings.start_url);
    let walk = WalkOptions {
        limit: settings.limit,
        page_delay: settings.page_delay,
    };
    let entries = walk_listing(source, &settings.start_url, &walk)?;
    info!("Found {} manga links", entries.len());

    if dry_run {
        for e in &entries {
            println!("{}\t{}", e.title, e.link);
        }
        return Ok(());
    }

    let options = DetailOptions {
        workers: settings.workers,
        fetch_chapters: settings.feed.include_chapters || settings.format == OutputFormat::Json,
    };
    let bar = (!quiet && !entries.is_empty()).then(|| progress_bar(entries.len()));
    let on_progress: &(dyn Fn(usize, usize) + Sync) = &|done, _total| {
        if let Some(ref b) = bar {
            b.set_position(done as u64);
        }
    };
    let details = fetch_details(source, &entries, &options, Some(on_progress));
    if let Some(b) = bar {
        b.finish_and_clear();
    }

    match settings.format {
        OutputFormat::Atom => {
            info!("Building Blogger Atom feed");
            write_feed(&details, &settings.feed, &settings.output)?;
        }
        OutputFormat::Json => write_json(&details, &settings.output)?,
    }
    info!(
        "Saved {} (manga: {})",
        settings.output.display(),
        details.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["mangafeed"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn defaults_without_config() -> Result<(), CliRunError> {
        let s = resolve_settings(&args(&[]), None)?;
        assert_eq!(s.start_url, DEFAULT_START_URL);
        assert_eq!(s.output, PathBuf::from("mangaindo_blogger_import.xml"));
        assert_eq!(s.limit, 0);
        assert_eq!(s.workers, 4);
        assert_eq!(s.page_delay, Duration::from_secs(1));
        assert_eq!(s.timeout_secs, 20);
        assert_eq!(s.retry_count, 3);
        assert!(s.feed.include_chapters && s.feed.include_manga_posts);
        assert_eq!(s.feed.blog_title, "Mangaindo Import");
        Ok(())
    }

    #[test]
    fn quick_test_mode_caps_only_unlimited_runs() -> Result<(), CliRunError> {
        assert_eq!(resolve_settings(&args(&["--test"]), None)?.limit, 10);
        assert_eq!(
            resolve_settings(&args(&["--test", "--limit-manga", "3"]), None)?.limit,
            3
        );
        assert_eq!(
            resolve_settings(&args(&["--limit-manga", "25"]), None)?.limit,
            25
        );
        Ok(())
    }

    #[test]
    fn cli_flags_override_config() -> Result<(), CliRunError> {
        let config: Config = toml::from_str(
            r#"
            workers = 8
            page_delay_secs = 3.0
            blog_title = "From Config"
            user_agent = "Config/1.0"
            retry_count = 0
        "#,
        )
        .map_err(|e| CliRunError::InvalidInput(e.to_string()))?;
        let s = resolve_settings(
            &args(&["--workers", "2", "--user-agent", "Cli/1.0"]),
            Some(&config),
        )?;
        assert_eq!(s.workers, 2);
        assert_eq!(s.page_delay, Duration::from_secs(3));
        assert_eq!(s.feed.blog_title, "From Config");
        assert_eq!(s.user_agent.as_deref(), Some("Cli/1.0"));
        assert_eq!(s.retry_count, 1);
        Ok(())
    }

    #[test]
    fn post_kind_flags() -> Result<(), CliRunError> {
        let s = resolve_settings(&args(&["--no-chapters", "--no-manga-posts"]), None)?;
        assert!(!s.feed.include_chapters);
        assert!(!s.feed.include_manga_posts);
        Ok(())
    }

    #[test]
    fn json_format_changes_default_output() -> Result<(), CliRunError> {
        let s = resolve_settings(&args(&["--format", "JSON"]), None)?;
        assert_eq!(s.format, OutputFormat::Json);
        assert_eq!(s.output, PathBuf::from("mangaindo_blogger_import.json"));
        Ok(())
    }

    #[test]
    fn parse_format_values() {
        assert_eq!(parse_format("atom").unwrap(), OutputFormat::Atom);
        assert_eq!(parse_format("xml").unwrap(), OutputFormat::Atom);
        assert_eq!(parse_format("json").unwrap(), OutputFormat::Json);
        assert!(parse_format("epub").is_err());
    }

    #[test]
    fn rejects_bad_settings() {
        assert!(matches!(
            resolve_settings(&args(&["--start-url", "not a url"]), None),
            Err(CliRunError::InvalidInput(_))
        ));
        assert!(matches!(
            resolve_settings(&args(&["--start-url", "ftp://mangaindo.biz/"]), None),
            Err(CliRunError::InvalidInput(_))
        ));
        assert!(matches!(
            resolve_settings(&args(&["--workers", "0"]), None),
            Err(CliRunError::InvalidInput(_))
        ));
        assert!(matches!(
            resolve_settings(&args(&["--delay=-1"]), None),
            Err(CliRunError::InvalidInput(_))
        ));
    }

    #[test]
    fn rejects_durations_too_large_to_represent() -> Result<(), CliRunError> {
        let err = resolve_settings(&args(&["--delay", "1e20"]), None).unwrap_err();
        assert!(matches!(err, CliRunError::InvalidInput(ref m) if m.contains("delay")));
        assert_eq!(err.exit_code(), 1);

        let config: Config = toml::from_str("retry_backoff_secs = 1e300")
            .map_err(|e| CliRunError::InvalidInput(e.to_string()))?;
        let err = resolve_settings(&args(&[]), Some(&config)).unwrap_err();
        assert!(matches!(
            err,
            CliRunError::InvalidInput(ref m) if m.contains("retry_backoff_secs")
        ));

        let config: Config = toml::from_str("retry_backoff_secs = -1.0")
            .map_err(|e| CliRunError::InvalidInput(e.to_string()))?;
        assert!(resolve_settings(&args(&[]), Some(&config)).is_err());
        Ok(())
    }

    #[test]
    fn validate_output_path_parent_missing() {
        let path = PathBuf::from("/nonexistent_dir_mangafeed_xyz/feed.xml");
        match validate_output_path(&path) {
            Err(CliRunError::InvalidInput(msg)) => {
                assert!(msg.contains("parent directory does not exist"))
            }
            other => panic!("expected InvalidInput, got {:?}", other),
        }
        assert!(validate_output_path(Path::new("feed.xml")).is_ok());
    }

    #[test]
    fn exit_codes() {
        assert_eq!(CliRunError::InvalidInput("x".into()).exit_code(), 1);
        assert_eq!(
            CliRunError::Format(FormatError::Io {
                path: PathBuf::from("x"),
                source: std::io::Error::new(std::io::ErrorKind::Other, "boom"),
            })
            .exit_code(),
            2
        );
    }

    struct Offline;

    impl PageSource for Offline {
        fn fetch_page(&self, url: &str) -> Result<String, ScraperError> {
            Err(ScraperError::HttpStatus {
                status: 503,
                url: url.to_string(),
            })
        }
    }

    #[test]
    fn unreachable_site_still_writes_empty_feed() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let output = dir.path().join("feed.xml");
        let mut settings = resolve_settings(&args(&["--delay", "0"]), None)?;
        settings.output = output.clone();
        run_with_source(&Offline, &settings, false, true)?;
        let xml = std::fs::read_to_string(&output)?;
        assert!(xml.contains("<feed "));
        assert!(!xml.contains("<entry>"));
        Ok(())
    }

    #[test]
    fn dry_run_writes_nothing() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let output = dir.path().join("feed.xml");
        let mut settings = resolve_settings(&args(&[]), None)?;
        settings.output = output.clone();
        run_with_source(&Offline, &settings, true, true)?;
        assert!(!output.exists());
        Ok(())
    }
}
