//! Result types returned by the conversion entry points.

use crate::pipeline::manifest::{PageUrl, ParsedPublication};
use serde::Serialize;
use std::path::PathBuf;

/// Summary of a finished conversion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionStats {
    pub publication_id: String,
    /// Pages in the publication's manifest.
    pub total_pages: usize,
    /// Pages rendered into the output (after the page-range filter).
    pub converted_pages: usize,
    pub output_path: PathBuf,
    /// Directory the raw page HTML was written to, if requested.
    pub html_dir: Option<PathBuf>,
    pub total_duration_ms: u64,
    pub discovery_duration_ms: u64,
    /// Zero when no raw HTML was fetched.
    pub fetch_duration_ms: u64,
    pub render_duration_ms: u64,
    pub merge_duration_ms: u64,
}

/// Output of discovery: the resolved publication and its ordered page list.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredPublication {
    #[serde(flatten)]
    pub publication: ParsedPublication,
    pub pages: Vec<PageUrl>,
}

impl DiscoveredPublication {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Document title from the manifest, if it carries one.
    pub fn document_name(&self) -> Option<&str> {
        self.publication.manifest.document_name.as_deref()
    }
}
