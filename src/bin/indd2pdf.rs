//! CLI binary for indd2pdf.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indd2pdf::{
    convert, inspect, ConversionConfig, ConversionProgress, ConversionProgressCallback,
    PageSelection, ProgressCallback, Stage,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: a spinner while discovering and merging, a bar while
/// pages render. Pages finish out of order, so the bar follows the running
/// completed count rather than page numbers.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(spinner_style());
        bar.set_prefix("Preparing");
        bar.set_message("Starting browser…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }

    fn activate_bar(&self, prefix: &'static str, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        self.bar.set_style(style);
        self.bar.set_prefix(prefix);
        self.bar.reset_eta();
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(TICKS)
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_progress(&self, progress: &ConversionProgress) {
        match progress.stage {
            Stage::Fetching if progress.total_pages == 0 => {
                self.bar.set_prefix("Discovering");
                self.bar.set_message(progress.message.clone());
            }
            Stage::Fetching | Stage::Converting => {
                let prefix = if progress.stage == Stage::Fetching {
                    "Fetching"
                } else {
                    "Rendering"
                };
                // The running count restarts at 1 for each counted stage.
                if progress.current_page <= 1 {
                    self.activate_bar(prefix, progress.total_pages);
                }
                self.bar.set_position(progress.current_page as u64);
                self.bar.println(format!(
                    "  {} {}",
                    green("✓"),
                    dim(&progress.message)
                ));
            }
            Stage::Merging => {
                self.bar.set_style(spinner_style());
                self.bar.set_prefix("Merging");
                self.bar.set_message(format!("{} pages…", progress.total_pages));
            }
            Stage::Complete => {
                self.bar.finish_and_clear();
                eprintln!("{} {}", green("✔"), bold(&progress.message));
            }
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert a publication to output.pdf
  indd2pdf https://indd.adobe.com/view/0b1f7c2e-9d3a-4e55-8a1b-3c5d7e9f0a12

  # Choose the output file
  indd2pdf https://indd.adobe.com/view/<id> -o catalog.pdf

  # Only pages 3 to 10, six tabs at a time
  indd2pdf https://indd.adobe.com/view/<id> -r 3-10 -c 6

  # Keep the per-page PDFs
  indd2pdf https://indd.adobe.com/view/<id> -t ./pages

  # Also save every page's raw HTML
  indd2pdf https://indd.adobe.com/view/<id> --html-dir ./html

  # List pages and sizes without rendering
  indd2pdf --inspect-only --json https://indd.adobe.com/view/<id>

BROWSER:
  A local Chrome or Chromium is required. It is auto-detected from the usual
  install locations and PATH; use --chrome (or INDD2PDF_CHROME) to point at a
  specific binary. Use --headful to watch pages render.

ENVIRONMENT VARIABLES:
  Every option can also be set as INDD2PDF_<OPTION>, e.g. INDD2PDF_CONCURRENCY=6.
  RUST_LOG overrides the log filter (e.g. RUST_LOG=indd2pdf=debug).
"#;

/// Convert online InDesign publications to PDF.
#[derive(Parser, Debug)]
#[command(
    name = "indd2pdf",
    version,
    about = "Convert online InDesign publications to PDF",
    long_about = "Convert an online InDesign publication (an indd.adobe.com/view link) into a \
single PDF. Each page is printed by headless Chrome at its authored size and the pages are \
merged in reading order.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Publication view URL (https://indd.adobe.com/view/<id>).
    view_url: String,

    /// Output PDF path.
    #[arg(short, long, env = "INDD2PDF_OUTPUT", default_value = "output.pdf")]
    output: PathBuf,

    /// Keep per-page PDFs in this directory instead of a temporary one.
    #[arg(short = 't', long, env = "INDD2PDF_TEMP_DIR")]
    temp_dir: Option<PathBuf>,

    /// Pages rendered at once (one browser tab each).
    #[arg(short, long, env = "INDD2PDF_CONCURRENCY", default_value_t = 3,
          value_parser = clap::value_parser!(u64).range(1..=32))]
    concurrency: u64,

    /// Page range: 5 or 3-15 (1-indexed, inclusive).
    #[arg(short = 'r', long, env = "INDD2PDF_RANGE")]
    range: Option<String>,

    /// HTTP timeout for raw HTML fetches, in milliseconds.
    #[arg(long, env = "INDD2PDF_TIMEOUT", default_value_t = 30_000)]
    timeout: u64,

    /// Attempts per page for raw HTML fetches.
    #[arg(long, env = "INDD2PDF_RETRIES", default_value_t = 3)]
    retries: u32,

    /// Browser navigation timeout, in milliseconds.
    #[arg(long, env = "INDD2PDF_NAVIGATION_TIMEOUT", default_value_t = 60_000)]
    navigation_timeout: u64,

    /// Wait after the view page loads before reading its iframes, in milliseconds.
    #[arg(long, env = "INDD2PDF_SETTLE_DELAY", default_value_t = 2_000)]
    settle_delay: u64,

    /// Chrome/Chromium executable to use.
    #[arg(long, env = "INDD2PDF_CHROME")]
    chrome: Option<PathBuf>,

    /// Show the browser window.
    #[arg(long, env = "INDD2PDF_HEADFUL")]
    headful: bool,

    /// Also save each selected page's raw HTML here.
    #[arg(long, env = "INDD2PDF_HTML_DIR")]
    html_dir: Option<PathBuf>,

    /// Print the resolved publication and page list only, no conversion.
    #[arg(long)]
    inspect_only: bool,

    /// Print results as JSON on stdout.
    #[arg(long, env = "INDD2PDF_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "INDD2PDF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "INDD2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "INDD2PDF_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let found = inspect(&cli.view_url, &config)
            .await
            .context("Failed to inspect publication")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&found).context("Failed to serialize publication")?
            );
        } else {
            let manifest = &found.publication.manifest;
            println!("View URL:     {}", cli.view_url);
            if let Some(ref name) = manifest.document_name {
                println!("Title:        {}", name);
            }
            if let Some(ref creator) = manifest.creator {
                println!("Creator:      {}", creator);
            }
            println!("Publication:  {}", found.publication.publication_id);
            println!("Content ID:   {}", found.publication.numeric_id);
            println!("Package:      {}", found.publication.package_id);
            println!("Base URL:     {}", found.publication.base_content_url);
            println!("Pages:        {}", found.page_count());
            for page in &found.pages {
                println!(
                    "  {:>4}  {:>5} x {:<5}  {}",
                    page.page_number, page.width, page.height, page.filename
                );
            }
        }
        return Ok(());
    }

    // ── Run conversion ───────────────────────────────────────────────────
    let stats = convert(&cli.view_url, &config)
        .await
        .context("Conversion failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&stats).context("Failed to serialise stats")?
        );
    } else if !cli.quiet {
        eprintln!(
            "{}  {}/{} pages  {}ms  →  {}",
            if show_progress { cyan("◆") } else { green("✔") },
            stats.converted_pages,
            stats.total_pages,
            stats.total_duration_ms,
            bold(&stats.output_path.display().to_string()),
        );
        if let Some(ref dir) = stats.html_dir {
            eprintln!("   raw HTML in {}", dim(&dir.display().to_string()));
        }
    }

    Ok(())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let pages = match cli.range {
        Some(ref range) => parse_range(range)?,
        None => PageSelection::All,
    };

    let mut builder = ConversionConfig::builder()
        .output_path(&cli.output)
        .concurrency(cli.concurrency as usize)
        .pages(pages)
        .timeout_ms(cli.timeout)
        .retries(cli.retries)
        .navigation_timeout_ms(cli.navigation_timeout)
        .settle_delay_ms(cli.settle_delay)
        .headless(!cli.headful);

    if let Some(ref dir) = cli.temp_dir {
        builder = builder.temp_dir(dir);
    }
    if let Some(ref chrome) = cli.chrome {
        builder = builder.chrome_executable(chrome);
    }
    if let Some(ref dir) = cli.html_dir {
        builder = builder.html_dir(dir);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--range` (`5` or `3-15`) into `PageSelection`.
fn parse_range(s: &str) -> Result<PageSelection> {
    let s = s.trim();

    if let Some((start, end)) = s.split_once('-') {
        let start: usize = start
            .trim()
            .parse()
            .context("Invalid start page in range")?;
        let end: usize = end.trim().parse().context("Invalid end page in range")?;

        if start < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
        }
        if start > end {
            anyhow::bail!(
                "Invalid page range '{}-{}': start must be <= end",
                start,
                end
            );
        }
        return Ok(PageSelection::Range(start, end));
    }

    let page: usize = s.parse().context("Invalid page number")?;
    if page < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
    }
    Ok(PageSelection::single(page))
}
