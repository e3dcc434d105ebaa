//! Manifest resolution: turn a view URL plus rendered HTML into page URLs.
//!
//! The hosting page exposes no manifest endpoint. Everything we need is
//! smuggled through its markup instead:
//!
//! * the publication ID is the `/view/<id>` segment of the view URL;
//! * `readerViewDataFromServer = {...}` in an inline script carries the
//!   package token (`VERSION_PREFIX`) and the manifest itself, JSON-encoded a
//!   second time inside `MANIFEST_BODY`;
//! * the numeric content ID only appears inside iframe URLs.
//!
//! Every function here is pure (`&str → Result`/`Option`) so each extraction
//! rule can be tested against an isolated HTML fixture. Live-DOM lookups for
//! the numeric ID are layered on top in [`crate::pipeline::discover`].

use crate::error::Indd2PdfError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

static VIEW_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/view/([a-f0-9-]+)").expect("valid regex"));

static READER_DATA_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"readerViewDataFromServer\s*=\s*(\{[\s\S]*?\})\s*;?\s*(?:</script>|\n)")
        .expect("valid regex")
});

static RELATIVE_PATH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"relativepath=/content/2/[a-f0-9-]+/(\d+)/package/").expect("valid regex")
});

static CONTENT_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"indd\.adobe\.com/content/2/[a-f0-9-]+/(\d+)/package").expect("valid regex")
});

/// Host and fixed path prefix shared by every publication's content files.
pub const CONTENT_ROOT: &str = "https://indd.adobe.com/content/2";

/// Client-side configuration blob injected as `readerViewDataFromServer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaderViewData {
    /// The publication manifest, itself a JSON document encoded as a string.
    #[serde(rename = "MANIFEST_BODY")]
    pub manifest_body: String,

    /// Package/version token used as the last segment of the content base URL.
    #[serde(rename = "VERSION_PREFIX")]
    pub version_prefix: String,

    /// Opaque passthrough keys.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Decoded `MANIFEST_BODY`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicationManifest {
    #[serde(rename = "Creator", default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,

    #[serde(rename = "documentName", default, skip_serializing_if = "Option::is_none")]
    pub document_name: Option<String>,

    /// Pages in reading order. Never re-sorted.
    pub pages: Vec<PageDescriptor>,

    #[serde(rename = "coverImage", default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,

    #[serde(rename = "shareImage", default, skip_serializing_if = "Option::is_none")]
    pub share_image: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One entry of the manifest `pages` array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageDescriptor {
    /// Page HTML filename, relative to the content base URL.
    pub html: String,

    /// Authored width in CSS pixels, kept as written.
    #[serde(deserialize_with = "string_or_number")]
    pub width: String,

    /// Authored height in CSS pixels, kept as written.
    #[serde(deserialize_with = "string_or_number")]
    pub height: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Fully resolved publication: every identifier plus the derived base URL.
#[derive(Debug, Clone, Serialize)]
pub struct ParsedPublication {
    pub publication_id: String,
    pub numeric_id: String,
    pub package_id: String,
    pub manifest: PublicationManifest,
    pub base_content_url: String,
}

impl ParsedPublication {
    /// Compose the publication once all identifiers are known.
    pub fn new(
        publication_id: String,
        numeric_id: String,
        package_id: String,
        manifest: PublicationManifest,
    ) -> Self {
        let base_content_url = content_base_url(&publication_id, &numeric_id, &package_id);
        Self {
            publication_id,
            numeric_id,
            package_id,
            manifest,
            base_content_url,
        }
    }
}

/// A single page ready to be rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageUrl {
    /// 1-based position in the manifest.
    pub page_number: usize,
    pub url: String,
    pub filename: String,
    pub width: String,
    pub height: String,
}

impl PageUrl {
    /// Width and height as whole CSS pixels.
    ///
    /// Only the leading integer is read, so `"612.5"` and `"612px"` both give
    /// 612. Zero or non-numeric sizes are rejected.
    pub fn dimensions(&self) -> Result<(u32, u32), Indd2PdfError> {
        match (leading_int(&self.width), leading_int(&self.height)) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Ok((w, h)),
            _ => Err(Indd2PdfError::InvalidPageSize {
                page: self.page_number,
                width: self.width.clone(),
                height: self.height.clone(),
            }),
        }
    }
}

fn leading_int(s: &str) -> Option<u32> {
    let s = s.trim();
    let end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    s[..end].parse().ok()
}

/// Build the canonical content base URL.
pub fn content_base_url(publication_id: &str, numeric_id: &str, package_id: &str) -> String {
    format!("{CONTENT_ROOT}/{publication_id}/{numeric_id}/package/{package_id}")
}

/// Pull the publication ID out of a view URL.
pub fn extract_publication_id(view_url: &str) -> Result<String, Indd2PdfError> {
    VIEW_ID_RE
        .captures(view_url)
        .map(|c| c[1].to_string())
        .ok_or_else(|| Indd2PdfError::InvalidViewUrl {
            url: view_url.to_string(),
        })
}

/// Locate and decode the inline `readerViewDataFromServer` assignment.
pub fn extract_reader_view_data(html: &str) -> Result<ReaderViewData, Indd2PdfError> {
    let caps = READER_DATA_RE
        .captures(html)
        .ok_or(Indd2PdfError::ReaderDataNotFound)?;

    serde_json::from_str(&caps[1]).map_err(|e| Indd2PdfError::ReaderDataInvalid {
        detail: e.to_string(),
    })
}

/// Decode `MANIFEST_BODY`, checking for a non-empty `pages` array.
pub fn parse_manifest_body(manifest_body: &str) -> Result<PublicationManifest, Indd2PdfError> {
    let value: Value =
        serde_json::from_str(manifest_body).map_err(|e| Indd2PdfError::ManifestInvalid {
            detail: e.to_string(),
        })?;

    match value.get("pages") {
        Some(Value::Array(pages)) if pages.is_empty() => return Err(Indd2PdfError::ManifestEmpty),
        Some(Value::Array(_)) => {}
        _ => return Err(Indd2PdfError::ManifestMissingPages),
    }

    serde_json::from_value(value).map_err(|e| Indd2PdfError::ManifestInvalid {
        detail: e.to_string(),
    })
}

// ── Numeric-ID strategies ────────────────────────────────────────────────

/// A static-HTML strategy for the numeric content ID.
pub type NumericIdStrategy = fn(&str) -> Option<String>;

/// `relativepath=/content/2/<pub>/<n>/package/` on the content iframe.
pub fn numeric_id_from_relative_path(html: &str) -> Option<String> {
    RELATIVE_PATH_RE.captures(html).map(|c| c[1].to_string())
}

/// A direct `indd.adobe.com/content/2/<pub>/<n>/package` URL anywhere in the markup.
pub fn numeric_id_from_content_url(html: &str) -> Option<String> {
    CONTENT_URL_RE.captures(html).map(|c| c[1].to_string())
}

/// Tried in order; the first hit wins.
pub const NUMERIC_ID_STRATEGIES: &[NumericIdStrategy] =
    &[numeric_id_from_relative_path, numeric_id_from_content_url];

/// Run [`NUMERIC_ID_STRATEGIES`] against the HTML.
pub fn extract_numeric_id(html: &str) -> Result<String, Indd2PdfError> {
    NUMERIC_ID_STRATEGIES
        .iter()
        .enumerate()
        .find_map(|(i, strategy)| {
            strategy(html).inspect(|id| debug!("Numeric ID {} found by strategy {}", id, i + 1))
        })
        .ok_or(Indd2PdfError::NumericIdNotFound)
}

// ── Entry points ─────────────────────────────────────────────────────────

/// Resolve a publication entirely from static HTML.
pub fn resolve(view_url: &str, html: &str) -> Result<ParsedPublication, Indd2PdfError> {
    let publication_id = extract_publication_id(view_url)?;
    let reader_data = extract_reader_view_data(html)?;
    let manifest = parse_manifest_body(&reader_data.manifest_body)?;
    let numeric_id = extract_numeric_id(html)?;

    Ok(ParsedPublication::new(
        publication_id,
        numeric_id,
        reader_data.version_prefix,
        manifest,
    ))
}

/// One [`PageUrl`] per manifest page, numbered from 1 in manifest order.
pub fn build_page_urls(parsed: &ParsedPublication) -> Vec<PageUrl> {
    parsed
        .manifest
        .pages
        .iter()
        .enumerate()
        .map(|(index, page)| PageUrl {
            page_number: index + 1,
            url: format!("{}/{}", parsed.base_content_url, page.html),
            filename: page.html.clone(),
            width: page.width.clone(),
            height: page.height.clone(),
        })
        .collect()
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number, got {other}"
        ))),
    }
}
