//! Error type for the indd2pdf library.
//!
//! Every failure in this crate is fatal: a publication with one missing page
//! is not an acceptable output, so there is no per-page error channel.
//! [`Indd2PdfError`] variants are grouped by the stage that raises them so a
//! caller (or an operator reading a log line) can tell at a glance whether
//! the input was wrong, the hosting page changed its embedding, the network
//! flaked, or the browser/PDF stage broke.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the indd2pdf library.
#[derive(Debug, Error)]
pub enum Indd2PdfError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The view URL does not contain a `/view/<id>` publication segment.
    #[error("Invalid InDesign view URL: '{url}'\nExpected a link of the form https://indd.adobe.com/view/<publication-id>")]
    InvalidViewUrl { url: String },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// The loaded page has no inline `readerViewDataFromServer = {...}` block.
    #[error("Could not find readerViewDataFromServer in the publication HTML")]
    ReaderDataNotFound,

    /// The inline reader data block was found but is not valid JSON, or lacks
    /// MANIFEST_BODY / VERSION_PREFIX.
    #[error("Failed to parse readerViewDataFromServer: {detail}")]
    ReaderDataInvalid { detail: String },

    /// MANIFEST_BODY is not valid JSON.
    #[error("Failed to parse MANIFEST_BODY: {detail}")]
    ManifestInvalid { detail: String },

    /// MANIFEST_BODY parsed, but has no `pages` array.
    #[error("Manifest does not contain a pages array")]
    ManifestMissingPages,

    /// MANIFEST_BODY has a `pages` array with no entries.
    #[error("Manifest pages array is empty")]
    ManifestEmpty,

    /// Neither the `relativepath=` iframe attribute nor an indd.adobe.com
    /// content URL was present in the static HTML.
    #[error("Could not extract numeric content ID from HTML")]
    NumericIdNotFound,

    /// Neither a dummy frame nor the content iframe exposed a numeric content ID.
    #[error(
        "Could not extract numeric content ID from any iframe on '{url}'\n\
The hosting page may have changed its frame layout."
    )]
    ContentFrameNotFound { url: String },

    // ── Browser errors ────────────────────────────────────────────────────
    /// Chrome/Chromium could not be started.
    #[error(
        "Failed to launch headless browser: {detail}\n\
Install Chrome or Chromium, or point --chrome at an existing binary."
    )]
    BrowserLaunchFailed { detail: String },

    /// A browser protocol command failed outside of navigation or rendering.
    #[error("Browser error: {detail}")]
    Browser { detail: String },

    /// Navigation did not reach the requested load state in time.
    #[error("Navigation to '{url}' timed out after {timeout_ms}ms")]
    NavigationTimeout { url: String, timeout_ms: u64 },

    /// Navigation failed outright (DNS, TLS, aborted load…).
    #[error("Navigation to '{url}' failed: {detail}")]
    NavigationFailed { url: String, detail: String },

    /// A page descriptor carries a width/height that is not a positive integer.
    #[error("Page {page} has an unusable size {width}x{height}")]
    InvalidPageSize {
        page: usize,
        width: String,
        height: String,
    },

    /// Printing a page to PDF failed.
    #[error("Rendering page {page} to PDF failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    // ── Network errors ────────────────────────────────────────────────────
    /// Every fetch attempt for a page failed; `reason` is the last failure.
    #[error("Failed to fetch '{url}' after {attempts} attempts: {reason}")]
    FetchFailed {
        url: String,
        attempts: u32,
        reason: String,
    },

    // ── Merge / output errors ─────────────────────────────────────────────
    /// A per-page PDF expected in the working directory is missing.
    #[error("Intermediate PDF not found: '{path}'")]
    IntermediatePdfMissing { path: PathBuf },

    /// A per-page PDF could not be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// The merge stage was handed an empty list.
    #[error("No page PDFs to merge")]
    NoPagesToMerge,

    /// Could not write the merged output document.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Run errors ────────────────────────────────────────────────────────
    /// The working directory could not be created.
    #[error("Failed to prepare working directory '{path}': {source}")]
    TempDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The page range filter matched nothing.
    #[error("Page range {start}-{end} selects no pages (publication has {total} pages)")]
    NoPagesSelected {
        start: usize,
        end: usize,
        total: usize,
    },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Indd2PdfError {
    /// True for errors raised while pulling the manifest or content ID out of
    /// the hosting page's markup.
    pub fn is_extraction_error(&self) -> bool {
        matches!(
            self,
            Indd2PdfError::ReaderDataNotFound
                | Indd2PdfError::ReaderDataInvalid { .. }
                | Indd2PdfError::ManifestInvalid { .. }
                | Indd2PdfError::ManifestMissingPages
                | Indd2PdfError::ManifestEmpty
                | Indd2PdfError::NumericIdNotFound
                | Indd2PdfError::ContentFrameNotFound { .. }
        )
    }
}
