//! Page rendering: print every page to its own PDF through one browser.
//!
//! ## One browser, many tabs
//!
//! Launching Chromium costs far more than opening a tab, so the pipeline
//! launches a single engine for the whole run and gives each page a fresh
//! tab sized to the page's authored dimensions. At most `concurrency` tabs
//! are open at once: the page list is drained through `buffer_unordered`,
//! which admits the next page as soon as any in-flight one finishes.
//!
//! ## Why network idle?
//!
//! Discovery only needs inline script data, but a printed page needs its
//! fonts, images and SVG masks. Printing on `load` produces pages with
//! missing glyphs, so every tab waits for the network to go quiet first.
//!
//! Any failed page aborts the run: no further page is started, and pages
//! already in flight finish and close their tabs before the first error is
//! returned. Output paths are returned in page-number order regardless of
//! which tab finished first.

use crate::browser::{
    close_engine, close_page, BrowserEngine, BrowserLauncher, PdfOptions, Viewport, WaitUntil,
};
use crate::config::ConversionConfig;
use crate::error::Indd2PdfError;
use crate::pipeline::manifest::PageUrl;
use crate::progress::{self, Stage};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// Deterministic location of a page's PDF inside the working directory.
pub fn page_pdf_path(work_dir: &Path, page_number: usize) -> PathBuf {
    work_dir.join(format!("page-{page_number}.pdf"))
}

/// Launch a browser, render `pages` into `work_dir`, and close the browser
/// on every exit path.
pub async fn render_all(
    launcher: &dyn BrowserLauncher,
    pages: &[PageUrl],
    work_dir: &Path,
    config: &ConversionConfig,
) -> Result<Vec<PathBuf>, Indd2PdfError> {
    if pages.is_empty() {
        return Ok(Vec::new());
    }

    let engine = launcher.launch().await?;
    let result = render_with_engine(engine.as_ref(), pages, work_dir, config).await;
    close_engine(engine, result).await
}

/// Render `pages` through an already running engine.
pub async fn render_with_engine(
    engine: &dyn BrowserEngine,
    pages: &[PageUrl],
    work_dir: &Path,
    config: &ConversionConfig,
) -> Result<Vec<PathBuf>, Indd2PdfError> {
    let total = pages.len();
    let completed = AtomicUsize::new(0);
    let timeout = config.navigation_timeout();
    info!(
        "Rendering {} pages ({} at a time)",
        total, config.concurrency
    );

    // After the first failure no new page starts, but pages already in
    // flight run to completion so each one closes its own tab.
    let aborted = AtomicBool::new(false);
    let outcomes: Vec<Result<Option<(usize, PathBuf)>, Indd2PdfError>> =
        stream::iter(pages.iter().map(|page| {
            let completed = &completed;
            let aborted = &aborted;
            async move {
                if aborted.load(Ordering::SeqCst) {
                    return Ok(None);
                }
                let path = match render_page(engine, page, work_dir, timeout).await {
                    Ok(path) => path,
                    Err(e) => {
                        if !aborted.swap(true, Ordering::SeqCst) {
                            debug!(
                                "Page {} failed; draining in-flight pages",
                                page.page_number
                            );
                        }
                        return Err(e);
                    }
                };
                if aborted.load(Ordering::SeqCst) {
                    return Ok(Some((page.page_number, path)));
                }
                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                progress::emit(
                    config.progress_callback.as_ref(),
                    Stage::Converting,
                    done,
                    total,
                    format!("Rendered page {} ({}/{})", page.page_number, done, total),
                );
                Ok(Some((page.page_number, path)))
            }
        }))
        .buffer_unordered(config.concurrency.max(1))
        .collect()
        .await;

    // Outcomes arrive in completion order, so the first error is the one
    // that aborted the run.
    let mut rendered = Vec::with_capacity(total);
    for outcome in outcomes {
        if let Some(done) = outcome? {
            rendered.push(done);
        }
    }

    rendered.sort_by_key(|(page_number, _)| *page_number);
    Ok(rendered.into_iter().map(|(_, path)| path).collect())
}

/// Render one page into `work_dir/page-{n}.pdf`. The tab is closed whether
/// or not rendering succeeds.
pub async fn render_page(
    engine: &dyn BrowserEngine,
    page: &PageUrl,
    work_dir: &Path,
    timeout: Duration,
) -> Result<PathBuf, Indd2PdfError> {
    let (width, height) = page.dimensions()?;
    let tab = engine.new_page(Some(Viewport { width, height })).await?;

    let result = async {
        tab.goto(&page.url, WaitUntil::NetworkIdle, timeout).await?;

        let bytes = tab
            .pdf(&PdfOptions::sized(width, height))
            .await
            .map_err(|e| Indd2PdfError::RenderFailed {
                page: page.page_number,
                detail: e.to_string(),
            })?;

        let path = page_pdf_path(work_dir, page.page_number);
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| Indd2PdfError::OutputWriteFailed {
                path: path.clone(),
                source: e,
            })?;

        debug!(
            "Page {} → {} ({}x{} px, {} bytes)",
            page.page_number,
            path.display(),
            width,
            height,
            bytes.len()
        );
        Ok(path)
    }
    .await;

    close_page(tab, result).await
}
