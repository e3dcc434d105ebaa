//! # indd2pdf
//!
//! Convert an online InDesign publication (an `indd.adobe.com/view/...`
//! link) into a single PDF.
//!
//! ## Why a browser?
//!
//! Published documents are served as one HTML file per page, laid out with
//! absolutely positioned text, web fonts and SVG. Only a real browser
//! reproduces that faithfully, so each page is printed by headless Chromium
//! at its authored size and the page PDFs are stitched together afterwards.
//! The hosting page offers no manifest endpoint; the page list and content
//! location are recovered from its inline script data and iframe URLs.
//!
//! ## Pipeline Overview
//!
//! ```text
//! view URL
//!  │
//!  ├─ 1. Discover  load the view page, read reader data + iframe URLs
//!  ├─ 2. Resolve   publication / numeric / package IDs → page URLs
//!  ├─ 3. Select    optional page range
//!  ├─ 4. Fetch     raw page HTML (only with `html_dir`)
//!  ├─ 5. Render    one tab per page, N at a time, print to PDF
//!  └─ 6. Merge     concatenate in page order → output.pdf
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use indd2pdf::{convert, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::builder()
//!         .output_path("catalog.pdf")
//!         .build()?;
//!     let stats = convert(
//!         "https://indd.adobe.com/view/0b1f7c2e-9d3a-4e55-8a1b-3c5d7e9f0a12",
//!         &config,
//!     )
//!     .await?;
//!     eprintln!("{} pages in {}ms", stats.converted_pages, stats.total_duration_ms);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `indd2pdf` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! indd2pdf = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod browser;
pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use browser::{BrowserEngine, BrowserLauncher, BrowserPage, ChromiumLauncher};
pub use config::{ConversionConfig, ConversionConfigBuilder, PageSelection};
pub use convert::{convert, convert_sync, inspect};
pub use error::Indd2PdfError;
pub use output::{ConversionStats, DiscoveredPublication};
pub use pipeline::manifest::{PageUrl, ParsedPublication};
pub use progress::{
    ConversionProgress, ConversionProgressCallback, NoopProgressCallback, ProgressCallback, Stage,
};
