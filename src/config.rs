//! Configuration types for publication-to-PDF conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. The CLI maps its flags onto the
//! builder; library callers set only what they need and rely on the
//! defaults below for the rest.

use crate::browser::{BrowserLauncher, ChromiumLauncher};
use crate::error::Indd2PdfError;
use crate::pipeline::manifest::PageUrl;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for one conversion run.
///
/// # Example
/// ```rust
/// use indd2pdf::{ConversionConfig, PageSelection};
///
/// let config = ConversionConfig::builder()
///     .output_path("catalog.pdf")
///     .concurrency(4)
///     .pages(PageSelection::Range(1, 10))
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Where the merged PDF is written. Overwritten if it exists. Default: `output.pdf`.
    pub output_path: PathBuf,

    /// Working directory for per-page PDFs.
    ///
    /// `None` (default) creates a fresh temp directory that is deleted when the
    /// run ends. A caller-supplied directory is created if missing and never
    /// deleted.
    pub temp_dir: Option<PathBuf>,

    /// Maximum number of pages rendered (or fetched) at once. Default: 3.
    ///
    /// Every in-flight page is a live browser tab loading fonts, images and
    /// scripts, so memory grows linearly with this value.
    pub concurrency: usize,

    /// Page filter applied after discovery. Default: all pages.
    pub pages: PageSelection,

    /// HTTP request timeout for the fetch pipeline, in milliseconds. Default: 30 000.
    pub timeout_ms: u64,

    /// Browser navigation timeout, in milliseconds. Default: 60 000.
    pub navigation_timeout_ms: u64,

    /// Attempts per page in the fetch pipeline. Default: 3.
    pub retries: u32,

    /// Base delay between fetch attempts; attempt `n` waits `n × base`. Default: 1 000 ms.
    pub retry_delay_ms: u64,

    /// Pause after the view page loads so script-injected iframes can attach. Default: 2 000 ms.
    pub settle_delay_ms: u64,

    /// Explicit Chrome/Chromium binary. Default: auto-detect.
    pub chrome_executable: Option<PathBuf>,

    /// Run the browser without a window. Default: true.
    pub headless: bool,

    /// When set, every selected page's raw HTML is also fetched into this directory.
    pub html_dir: Option<PathBuf>,

    /// Pre-constructed browser launcher. Takes precedence over
    /// `chrome_executable`/`headless`.
    pub launcher: Option<Arc<dyn BrowserLauncher>>,

    /// Receives stage/page progress notifications.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("output.pdf"),
            temp_dir: None,
            concurrency: 3,
            pages: PageSelection::default(),
            timeout_ms: 30_000,
            navigation_timeout_ms: 60_000,
            retries: 3,
            retry_delay_ms: 1_000,
            settle_delay_ms: 2_000,
            chrome_executable: None,
            headless: true,
            html_dir: None,
            launcher: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("output_path", &self.output_path)
            .field("temp_dir", &self.temp_dir)
            .field("concurrency", &self.concurrency)
            .field("pages", &self.pages)
            .field("timeout_ms", &self.timeout_ms)
            .field("navigation_timeout_ms", &self.navigation_timeout_ms)
            .field("retries", &self.retries)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("settle_delay_ms", &self.settle_delay_ms)
            .field("chrome_executable", &self.chrome_executable)
            .field("headless", &self.headless)
            .field("html_dir", &self.html_dir)
            .field("launcher", &self.launcher.as_ref().map(|_| "<dyn BrowserLauncher>"))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// The injected launcher, or a Chromium launcher built from this config.
    pub fn resolve_launcher(&self) -> Arc<dyn BrowserLauncher> {
        if let Some(ref launcher) = self.launcher {
            return Arc::clone(launcher);
        }

        let mut chromium = ChromiumLauncher::new()
            .headless(self.headless)
            .request_timeout(self.navigation_timeout());
        if let Some(ref path) = self.chrome_executable {
            chromium = chromium.chrome_executable(path);
        }
        Arc::new(chromium)
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output_path = path.into();
        self
    }

    pub fn temp_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.temp_dir = Some(path.into());
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.config.timeout_ms = ms;
        self
    }

    pub fn navigation_timeout_ms(mut self, ms: u64) -> Self {
        self.config.navigation_timeout_ms = ms;
        self
    }

    pub fn retries(mut self, n: u32) -> Self {
        self.config.retries = n.max(1);
        self
    }

    pub fn retry_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry_delay_ms = ms;
        self
    }

    pub fn settle_delay_ms(mut self, ms: u64) -> Self {
        self.config.settle_delay_ms = ms;
        self
    }

    pub fn chrome_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.chrome_executable = Some(path.into());
        self
    }

    pub fn headless(mut self, v: bool) -> Self {
        self.config.headless = v;
        self
    }

    pub fn html_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.html_dir = Some(path.into());
        self
    }

    pub fn launcher(mut self, launcher: Arc<dyn BrowserLauncher>) -> Self {
        self.config.launcher = Some(launcher);
        self
    }

    pub fn progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.config.progress_callback = Some(callback);
        self
    }

    /// Build the configuration, validating constraints.
    ///
    /// `concurrency` and `retries` are already clamped to at least 1 by
    /// their setters.
    pub fn build(self) -> Result<ConversionConfig, Indd2PdfError> {
        let c = &self.config;
        if c.timeout_ms == 0 || c.navigation_timeout_ms == 0 {
            return Err(Indd2PdfError::InvalidConfig(
                "Timeouts must be greater than zero".into(),
            ));
        }
        if let PageSelection::Range(start, end) = c.pages {
            if start == 0 || start > end {
                return Err(Indd2PdfError::InvalidConfig(format!(
                    "Invalid page range {start}-{end}: pages are 1-indexed and start must be <= end"
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Page selection ───────────────────────────────────────────────────────

/// Which manifest pages to convert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PageSelection {
    /// Every page (default).
    #[default]
    All,
    /// Pages `start..=end`, 1-indexed. Bounds past the end are clipped.
    Range(usize, usize),
}

impl PageSelection {
    /// A single page.
    pub fn single(page: usize) -> Self {
        PageSelection::Range(page, page)
    }

    pub fn contains(&self, page_number: usize) -> bool {
        match *self {
            PageSelection::All => true,
            PageSelection::Range(start, end) => start <= page_number && page_number <= end,
        }
    }

    /// Keep the selected pages, preserving their original order.
    pub fn select(&self, pages: &[PageUrl]) -> Vec<PageUrl> {
        pages
            .iter()
            .filter(|p| self.contains(p.page_number))
            .cloned()
            .collect()
    }
}

impl fmt::Display for PageSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageSelection::All => write!(f, "all"),
            PageSelection::Range(start, end) if start == end => write!(f, "{start}"),
            PageSelection::Range(start, end) => write!(f, "{start}-{end}"),
        }
    }
}
