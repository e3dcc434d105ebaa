//! Conversion entry points.
//!
//! [`convert`] runs the whole pipeline for one view URL:
//!
//! ```text
//! discover ──▶ select ──▶ (fetch HTML) ──▶ render ──▶ merge ──▶ output.pdf
//! ```
//!
//! Every stage is fatal on error. Before an error reaches the caller, the
//! browser has been closed by the stage that launched it and an owned
//! working directory has been removed.

use crate::config::{ConversionConfig, PageSelection};
use crate::error::Indd2PdfError;
use crate::output::{ConversionStats, DiscoveredPublication};
use crate::pipeline::manifest::PageUrl;
use crate::pipeline::{discover, fetch, merge, render};
use crate::progress::{self, Stage};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Convert the publication behind `view_url` into one PDF at
/// `config.output_path`.
///
/// # Errors
/// Any failure aborts the run: a malformed view URL, a hosting page whose
/// embedded data or frames can't be read, a page that won't load or print,
/// a raw-HTML fetch that exhausts its retries, or an unreadable intermediate
/// PDF. The output file is only written once every page has been merged.
pub async fn convert(
    view_url: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionStats, Indd2PdfError> {
    let view_url = view_url.as_ref();
    info!("Starting conversion: {}", view_url);

    let work_dir = WorkDir::acquire(config.temp_dir.as_deref()).await?;
    let result = run(view_url, config, work_dir.path()).await;
    work_dir.release();
    result
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    view_url: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionStats, Indd2PdfError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Indd2PdfError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(view_url, config))
}

/// Resolve the publication and its page list without rendering anything.
pub async fn inspect(
    view_url: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<DiscoveredPublication, Indd2PdfError> {
    let launcher = config.resolve_launcher();
    discover::discover(launcher.as_ref(), view_url.as_ref(), config).await
}

async fn run(
    view_url: &str,
    config: &ConversionConfig,
    work_dir: &Path,
) -> Result<ConversionStats, Indd2PdfError> {
    let total_start = Instant::now();
    let callback = config.progress_callback.as_ref();
    let launcher = config.resolve_launcher();

    // ── Step 1: Discover ─────────────────────────────────────────────────
    progress::emit(
        callback,
        Stage::Fetching,
        0,
        0,
        "Fetching publication metadata...",
    );
    let discovery_start = Instant::now();
    let discovered = discover::discover(launcher.as_ref(), view_url, config).await?;
    let discovery_duration_ms = discovery_start.elapsed().as_millis() as u64;
    let total_pages = discovered.page_count();

    // ── Step 2: Apply the page filter ────────────────────────────────────
    let pages = select_pages(&discovered.pages, config.pages)?;
    let selected = pages.len();
    debug!("Selected {} of {} pages", selected, total_pages);

    // ── Step 3: Raw HTML, when asked for ─────────────────────────────────
    let mut fetch_duration_ms = 0;
    if let Some(ref dir) = config.html_dir {
        let fetch_start = Instant::now();
        let fetcher = fetch::PageFetcher::from_config(config)?;
        let bodies = fetcher
            .fetch_all(&pages, config.concurrency, callback)
            .await?;
        fetch::save_pages(dir, &bodies).await?;
        fetch_duration_ms = fetch_start.elapsed().as_millis() as u64;
    }

    // ── Step 4: Render ───────────────────────────────────────────────────
    let render_start = Instant::now();
    let pdf_paths = render::render_all(launcher.as_ref(), &pages, work_dir, config).await?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;

    // ── Step 5: Merge ────────────────────────────────────────────────────
    progress::emit(
        callback,
        Stage::Merging,
        selected,
        selected,
        "Merging PDFs...",
    );
    let merge_start = Instant::now();
    merge::merge(&pdf_paths, &config.output_path).await?;
    let merge_duration_ms = merge_start.elapsed().as_millis() as u64;

    let stats = ConversionStats {
        publication_id: discovered.publication.publication_id.clone(),
        total_pages,
        converted_pages: selected,
        output_path: config.output_path.clone(),
        html_dir: config.html_dir.clone(),
        total_duration_ms: total_start.elapsed().as_millis() as u64,
        discovery_duration_ms,
        fetch_duration_ms,
        render_duration_ms,
        merge_duration_ms,
    };

    info!(
        "Conversion complete: {}/{} pages → {} in {}ms",
        selected,
        total_pages,
        config.output_path.display(),
        stats.total_duration_ms
    );
    progress::emit(
        callback,
        Stage::Complete,
        selected,
        selected,
        format!("PDF saved to {}", config.output_path.display()),
    );

    Ok(stats)
}

/// Apply the page filter, failing when nothing survives it.
pub fn select_pages(
    pages: &[PageUrl],
    selection: PageSelection,
) -> Result<Vec<PageUrl>, Indd2PdfError> {
    let selected = selection.select(pages);
    if selected.is_empty() {
        let (start, end) = match selection {
            PageSelection::Range(start, end) => (start, end),
            PageSelection::All => (1, pages.len()),
        };
        return Err(Indd2PdfError::NoPagesSelected {
            start,
            end,
            total: pages.len(),
        });
    }
    Ok(selected)
}

// ── Working directory ────────────────────────────────────────────────────

/// Where per-page PDFs are written for the duration of a run.
///
/// Ownership is decided once, at acquisition: a directory the caller named
/// is theirs and survives the run; otherwise a fresh temp directory is
/// created and removed by [`WorkDir::release`].
#[derive(Debug)]
pub enum WorkDir {
    Owned(TempDir),
    Caller(PathBuf),
}

impl WorkDir {
    pub async fn acquire(caller_dir: Option<&Path>) -> Result<Self, Indd2PdfError> {
        match caller_dir {
            Some(dir) => {
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(|e| Indd2PdfError::TempDirFailed {
                        path: dir.to_path_buf(),
                        source: e,
                    })?;
                debug!("Using caller working directory {}", dir.display());
                Ok(WorkDir::Caller(dir.to_path_buf()))
            }
            None => {
                let dir = tempfile::Builder::new()
                    .prefix("indd2pdf-")
                    .tempdir()
                    .map_err(|e| Indd2PdfError::TempDirFailed {
                        path: std::env::temp_dir(),
                        source: e,
                    })?;
                debug!("Created working directory {}", dir.path().display());
                Ok(WorkDir::Owned(dir))
            }
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            WorkDir::Owned(dir) => dir.path(),
            WorkDir::Caller(path) => path,
        }
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, WorkDir::Owned(_))
    }

    /// Remove the directory if this run created it.
    pub fn release(self) {
        match self {
            WorkDir::Owned(dir) => {
                let path = dir.path().to_path_buf();
                if let Err(e) = dir.close() {
                    warn!("Failed to remove working directory {}: {}", path.display(), e);
                }
            }
            WorkDir::Caller(path) => {
                debug!("Leaving caller working directory {}", path.display());
            }
        }
    }
}
