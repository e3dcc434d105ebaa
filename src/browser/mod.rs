//! Browser automation seam.
//!
//! The pipeline talks to the browser only through the three object-safe
//! traits below, so discovery and rendering can be driven by a real Chromium
//! ([`chromium::ChromiumLauncher`]) or by an in-memory stub in tests. Inject a
//! launcher with [`crate::config::ConversionConfigBuilder::launcher`]; when
//! none is set the orchestrator builds a [`chromium::ChromiumLauncher`] from
//! the config.
//!
//! Ownership mirrors the engine's lifecycle: `close` consumes the boxed
//! engine/page, so nothing can use a handle after it has been torn down.

pub mod chromium;

use crate::error::Indd2PdfError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

pub use chromium::ChromiumLauncher;

/// CSS pixels per inch, used to size printed pages.
pub const CSS_PX_PER_INCH: f64 = 96.0;

/// Viewport for a new page, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// How long `goto` waits after the navigation commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitUntil {
    /// The document `load` event.
    Load,
    /// No network activity for a short quiet period.
    NetworkIdle,
}

/// Print settings for [`BrowserPage::pdf`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfOptions {
    /// Paper width in CSS pixels.
    pub width_px: u32,
    /// Paper height in CSS pixels.
    pub height_px: u32,
    pub print_background: bool,
    /// When false the explicit size wins over any CSS `@page` size.
    pub prefer_css_page_size: bool,
}

impl PdfOptions {
    /// Exact-size, background-on print settings for a page of `width × height` px.
    pub fn sized(width_px: u32, height_px: u32) -> Self {
        Self {
            width_px,
            height_px,
            print_background: true,
            prefer_css_page_size: false,
        }
    }

    pub fn paper_width_inches(&self) -> f64 {
        self.width_px as f64 / CSS_PX_PER_INCH
    }

    pub fn paper_height_inches(&self) -> f64 {
        self.height_px as f64 / CSS_PX_PER_INCH
    }
}

/// Starts a browser engine instance.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserEngine>, Indd2PdfError>;
}

/// A running browser instance.
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    /// Open a fresh page (tab), optionally sized to `viewport`.
    async fn new_page(
        &self,
        viewport: Option<Viewport>,
    ) -> Result<Box<dyn BrowserPage>, Indd2PdfError>;

    /// Shut the browser down.
    async fn close(self: Box<Self>) -> Result<(), Indd2PdfError>;
}

/// A single browser page.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    async fn goto(&self, url: &str, wait: WaitUntil, timeout: Duration)
        -> Result<(), Indd2PdfError>;

    /// Serialized DOM of the current document (not the original response body).
    async fn content(&self) -> Result<String, Indd2PdfError>;

    /// Attribute `name` of every element matching `selector`, in document order.
    async fn attributes(
        &self,
        selector: &str,
        name: &str,
    ) -> Result<Vec<Option<String>>, Indd2PdfError>;

    /// Print the current document to PDF bytes.
    async fn pdf(&self, options: &PdfOptions) -> Result<Vec<u8>, Indd2PdfError>;

    async fn close(self: Box<Self>) -> Result<(), Indd2PdfError>;
}

/// Close `engine` after the work that used it has finished.
///
/// Call this on every exit path once the engine's work has produced
/// `result`. The work's error wins over a close error; a failed close after
/// successful work is returned to the caller.
pub async fn close_engine<T>(
    engine: Box<dyn BrowserEngine>,
    result: Result<T, Indd2PdfError>,
) -> Result<T, Indd2PdfError> {
    let closed = engine.close().await;
    match (result, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close_err)) => {
            warn!("Browser close failed after error: {}", close_err);
            Err(e)
        }
    }
}

/// Close `page` after the work that used it has finished.
///
/// A failed page close only logs: the browser reclaims the tab when the
/// engine shuts down.
pub async fn close_page<T>(
    page: Box<dyn BrowserPage>,
    result: Result<T, Indd2PdfError>,
) -> Result<T, Indd2PdfError> {
    if let Err(e) = page.close().await {
        warn!("Failed to close page: {}", e);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_options_convert_px_to_inches() {
        let opts = PdfOptions::sized(816, 1056);
        assert!((opts.paper_width_inches() - 8.5).abs() < f64::EPSILON);
        assert!((opts.paper_height_inches() - 11.0).abs() < f64::EPSILON);
        assert!(opts.print_background);
        assert!(!opts.prefer_css_page_size);
    }
}
