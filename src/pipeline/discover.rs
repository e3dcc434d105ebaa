//! Discovery session: load the view page in a browser and resolve its pages.
//!
//! Static markup is enough for the manifest and package token, but the
//! numeric content ID is only reliably available from iframes the hosting
//! page injects after load. Discovery therefore reads the rendered DOM for
//! the manifest, waits a settling delay, then asks the live DOM for frame
//! URLs:
//!
//! 1. every `iframe[name="dummyFrame"]` `src`, in document order, against a
//!    pattern that captures the full content base URL and the numeric ID;
//! 2. failing that, the single `iframe#contentIFrame` `src` against a
//!    narrower pattern that captures only the numeric ID.
//!
//! The first hit wins. When neither strategy matches the run fails with
//! [`Indd2PdfError::ContentFrameNotFound`], which is kept apart from the
//! manifest errors because it means the hosting page changed its frame
//! layout rather than its data.

use crate::browser::{close_engine, close_page, BrowserLauncher, BrowserPage, WaitUntil};
use crate::config::ConversionConfig;
use crate::error::Indd2PdfError;
use crate::output::DiscoveredPublication;
use crate::pipeline::manifest::{self, ParsedPublication};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

/// Hidden preload frames; their `src` carries the whole content base URL.
pub const DUMMY_FRAME_SELECTOR: &str = r#"iframe[name="dummyFrame"]"#;

/// The reader's main content frame.
pub const CONTENT_FRAME_SELECTOR: &str = "iframe#contentIFrame";

static DUMMY_FRAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(https://indd\.adobe\.com/content/2/[^/]+/(\d+)/package/[^/]+)/")
        .expect("valid regex")
});

static CONTENT_FRAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/content/2/[^/]+/(\d+)/package/").expect("valid regex"));

/// A numeric ID found in a frame URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameMatch {
    pub numeric_id: String,
    /// Content base URL as the frame spelled it, when the pattern captures one.
    pub base_url: Option<String>,
}

/// Match a dummy frame `src`.
pub fn match_dummy_frame(src: &str) -> Option<FrameMatch> {
    DUMMY_FRAME_RE.captures(src).map(|c| FrameMatch {
        numeric_id: c[2].to_string(),
        base_url: Some(c[1].to_string()),
    })
}

/// Match the content iframe `src`.
pub fn match_content_frame(src: &str) -> Option<FrameMatch> {
    CONTENT_FRAME_RE.captures(src).map(|c| FrameMatch {
        numeric_id: c[1].to_string(),
        base_url: None,
    })
}

/// First dummy frame whose `src` matches, in document order.
pub fn first_dummy_frame_match(srcs: &[Option<String>]) -> Option<FrameMatch> {
    srcs.iter().flatten().find_map(|src| match_dummy_frame(src))
}

/// Launch a browser, discover the publication behind `view_url`, and shut
/// the browser down again on every exit path.
pub async fn discover(
    launcher: &dyn BrowserLauncher,
    view_url: &str,
    config: &ConversionConfig,
) -> Result<DiscoveredPublication, Indd2PdfError> {
    // Input errors surface before a browser is started.
    let publication_id = manifest::extract_publication_id(view_url)?;

    let engine = launcher.launch().await?;
    let result = async {
        let page = engine.new_page(None).await?;
        let result = discover_on_page(page.as_ref(), view_url, &publication_id, config).await;
        close_page(page, result).await
    }
    .await;
    close_engine(engine, result).await
}

/// Run discovery against an already-open page.
pub async fn discover_on_page(
    page: &dyn BrowserPage,
    view_url: &str,
    publication_id: &str,
    config: &ConversionConfig,
) -> Result<DiscoveredPublication, Indd2PdfError> {
    info!("Loading view page {}", view_url);
    // Some publications never reach network idle; `load` is enough for the
    // inline reader data.
    page.goto(view_url, WaitUntil::Load, config.navigation_timeout())
        .await?;

    let html = page.content().await?;
    let reader_data = manifest::extract_reader_view_data(&html)?;
    let publication_manifest = manifest::parse_manifest_body(&reader_data.manifest_body)?;
    debug!(
        "Manifest lists {} pages, package {}",
        publication_manifest.pages.len(),
        reader_data.version_prefix
    );

    if !config.settle_delay().is_zero() {
        tokio::time::sleep(config.settle_delay()).await;
    }

    let frame = find_content_frame(page)
        .await?
        .ok_or_else(|| Indd2PdfError::ContentFrameNotFound {
            url: view_url.to_string(),
        })?;

    let publication = ParsedPublication::new(
        publication_id.to_string(),
        frame.numeric_id,
        reader_data.version_prefix,
        publication_manifest,
    );

    if let Some(ref seen) = frame.base_url {
        if *seen != publication.base_content_url {
            warn!(
                "Frame base URL {} differs from composed {}; using the composed URL",
                seen, publication.base_content_url
            );
        }
    }

    let pages = manifest::build_page_urls(&publication);
    info!(
        "Discovered {} pages under {}",
        pages.len(),
        publication.base_content_url
    );

    Ok(DiscoveredPublication { publication, pages })
}

/// Try the dummy frames first, then the content iframe.
async fn find_content_frame(
    page: &dyn BrowserPage,
) -> Result<Option<FrameMatch>, Indd2PdfError> {
    let dummy_srcs = page.attributes(DUMMY_FRAME_SELECTOR, "src").await?;
    if let Some(hit) = first_dummy_frame_match(&dummy_srcs) {
        debug!(
            "Numeric ID {} found in dummy frame ({} candidates)",
            hit.numeric_id,
            dummy_srcs.len()
        );
        return Ok(Some(hit));
    }

    let content_srcs = page.attributes(CONTENT_FRAME_SELECTOR, "src").await?;
    let hit = content_srcs
        .into_iter()
        .next()
        .flatten()
        .and_then(|src| match_content_frame(&src));
    if let Some(ref hit) = hit {
        debug!("Numeric ID {} found in content iframe", hit.numeric_id);
    }
    Ok(hit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{BrowserEngine, PdfOptions, Viewport};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    const PUB_ID: &str = "0b1f7c2e-9d3a-4e55-8a1b-3c5d7e9f0a12";
    const VIEW_URL: &str = "https://indd.adobe.com/view/0b1f7c2e-9d3a-4e55-8a1b-3c5d7e9f0a12";

    fn dummy_src(n: &str) -> String {
        format!("https://indd.adobe.com/content/2/{PUB_ID}/{n}/package/v1a2b3/preload.html")
    }

    fn content_src(n: &str) -> String {
        format!("/iframe.html?relativepath=/content/2/{PUB_ID}/{n}/package/v1a2b3/")
    }

    fn view_html(pages: usize) -> String {
        let pages: Vec<serde_json::Value> = (1..=pages)
            .map(|i| serde_json::json!({ "html": format!("page{i}.html"), "width": "600", "height": "800" }))
            .collect();
        let manifest = serde_json::json!({ "documentName": "Lookbook", "pages": pages }).to_string();
        let data = serde_json::json!({ "MANIFEST_BODY": manifest, "VERSION_PREFIX": "v1a2b3" });
        format!("<html><script>readerViewDataFromServer = {data};</script></html>")
    }

    /// Shared record of what the stub browser was asked to do.
    #[derive(Default)]
    struct Calls {
        selectors: Mutex<Vec<String>>,
        gotos: Mutex<Vec<(String, WaitUntil)>>,
        page_closed: AtomicBool,
        engine_closed: AtomicBool,
    }

    struct StubPage {
        html: String,
        frames: HashMap<&'static str, Vec<Option<String>>>,
        calls: Arc<Calls>,
    }

    #[async_trait]
    impl BrowserPage for StubPage {
        async fn goto(&self, url: &str, wait: WaitUntil, _timeout: Duration) -> Result<(), Indd2PdfError> {
            self.calls.gotos.lock().unwrap().push((url.to_string(), wait));
            Ok(())
        }

        async fn content(&self) -> Result<String, Indd2PdfError> {
            Ok(self.html.clone())
        }

        async fn attributes(&self, selector: &str, _name: &str) -> Result<Vec<Option<String>>, Indd2PdfError> {
            self.calls.selectors.lock().unwrap().push(selector.to_string());
            Ok(self.frames.get(selector).cloned().unwrap_or_default())
        }

        async fn pdf(&self, _options: &PdfOptions) -> Result<Vec<u8>, Indd2PdfError> {
            unreachable!("discovery never prints")
        }

        async fn close(self: Box<Self>) -> Result<(), Indd2PdfError> {
            self.calls.page_closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct StubEngine {
        page: Mutex<Option<StubPage>>,
        calls: Arc<Calls>,
    }

    #[async_trait]
    impl BrowserEngine for StubEngine {
        async fn new_page(&self, _viewport: Option<Viewport>) -> Result<Box<dyn BrowserPage>, Indd2PdfError> {
            let page = self.page.lock().unwrap().take().expect("one page per discovery");
            Ok(Box::new(page))
        }

        async fn close(self: Box<Self>) -> Result<(), Indd2PdfError> {
            self.calls.engine_closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct StubLauncher {
        html: String,
        frames: HashMap<&'static str, Vec<Option<String>>>,
        calls: Arc<Calls>,
        launched: AtomicBool,
    }

    impl StubLauncher {
        fn new(html: String, frames: HashMap<&'static str, Vec<Option<String>>>) -> Self {
            Self {
                html,
                frames,
                calls: Arc::new(Calls::default()),
                launched: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl BrowserLauncher for StubLauncher {
        async fn launch(&self) -> Result<Box<dyn crate::browser::BrowserEngine>, Indd2PdfError> {
            self.launched.store(true, Ordering::SeqCst);
            Ok(Box::new(StubEngine {
                page: Mutex::new(Some(StubPage {
                    html: self.html.clone(),
                    frames: self.frames.clone(),
                    calls: Arc::clone(&self.calls),
                })),
                calls: Arc::clone(&self.calls),
            }))
        }
    }

    fn quick_config() -> ConversionConfig {
        ConversionConfig::builder().settle_delay_ms(0).build().unwrap()
    }

    #[test]
    fn dummy_frame_pattern_captures_base_and_id() {
        let hit = match_dummy_frame(&dummy_src("4242")).unwrap();
        assert_eq!(hit.numeric_id, "4242");
        assert_eq!(
            hit.base_url.as_deref(),
            Some(format!("https://indd.adobe.com/content/2/{PUB_ID}/4242/package/v1a2b3").as_str())
        );
    }

    #[test]
    fn dummy_frame_pattern_requires_trailing_segment() {
        let src = format!("https://indd.adobe.com/content/2/{PUB_ID}/4242/package/v1a2b3");
        assert!(match_dummy_frame(&src).is_none());
        assert!(match_dummy_frame("about:blank").is_none());
    }

    #[test]
    fn content_frame_pattern_captures_id_only() {
        let hit = match_content_frame(&content_src("77")).unwrap();
        assert_eq!(hit.numeric_id, "77");
        assert!(hit.base_url.is_none());
    }

    #[test]
    fn first_dummy_match_skips_missing_and_unmatched() {
        let srcs = vec![
            None,
            Some("about:blank".to_string()),
            Some(dummy_src("11")),
            Some(dummy_src("22")),
        ];
        assert_eq!(first_dummy_frame_match(&srcs).unwrap().numeric_id, "11");
        assert!(first_dummy_frame_match(&[None, Some("x".into())]).is_none());
    }

    #[tokio::test]
    async fn dummy_frame_wins_and_content_frame_is_never_queried() {
        let frames = HashMap::from([
            (DUMMY_FRAME_SELECTOR, vec![Some(dummy_src("111"))]),
            (CONTENT_FRAME_SELECTOR, vec![Some(content_src("999"))]),
        ]);
        let launcher = StubLauncher::new(view_html(3), frames);

        let found = discover(&launcher, VIEW_URL, &quick_config()).await.unwrap();

        assert_eq!(found.publication.numeric_id, "111");
        assert!(found.pages[0].url.contains("/111/"));
        assert!(!found.pages.iter().any(|p| p.url.contains("999")));
        assert_eq!(
            *launcher.calls.selectors.lock().unwrap(),
            vec![DUMMY_FRAME_SELECTOR.to_string()]
        );
    }

    #[tokio::test]
    async fn falls_back_to_content_frame() {
        let frames = HashMap::from([
            (DUMMY_FRAME_SELECTOR, vec![Some("about:blank".to_string())]),
            (CONTENT_FRAME_SELECTOR, vec![Some(content_src("555"))]),
        ]);
        let launcher = StubLauncher::new(view_html(2), frames);

        let found = discover(&launcher, VIEW_URL, &quick_config()).await.unwrap();

        assert_eq!(found.publication.numeric_id, "555");
        assert_eq!(
            found.publication.base_content_url,
            format!("https://indd.adobe.com/content/2/{PUB_ID}/555/package/v1a2b3")
        );
        assert_eq!(found.pages.len(), 2);
        assert_eq!(found.pages[1].page_number, 2);
        assert_eq!(
            found.pages[1].url,
            format!("{}/page2.html", found.publication.base_content_url)
        );
    }

    #[tokio::test]
    async fn no_frame_is_a_distinct_discovery_error() {
        let launcher = StubLauncher::new(view_html(2), HashMap::new());

        let err = discover(&launcher, VIEW_URL, &quick_config()).await.unwrap_err();

        assert!(matches!(err, Indd2PdfError::ContentFrameNotFound { ref url } if url == VIEW_URL));
        assert!(launcher.calls.page_closed.load(Ordering::SeqCst));
        assert!(launcher.calls.engine_closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn navigates_with_load_and_closes_everything() {
        let frames = HashMap::from([(DUMMY_FRAME_SELECTOR, vec![Some(dummy_src("8"))])]);
        let launcher = StubLauncher::new(view_html(1), frames);

        discover(&launcher, VIEW_URL, &quick_config()).await.unwrap();

        assert_eq!(
            *launcher.calls.gotos.lock().unwrap(),
            vec![(VIEW_URL.to_string(), WaitUntil::Load)]
        );
        assert!(launcher.calls.page_closed.load(Ordering::SeqCst));
        assert!(launcher.calls.engine_closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn manifest_errors_still_close_the_browser() {
        let launcher = StubLauncher::new("<html></html>".to_string(), HashMap::new());

        let err = discover(&launcher, VIEW_URL, &quick_config()).await.unwrap_err();

        assert!(matches!(err, Indd2PdfError::ReaderDataNotFound));
        assert!(launcher.calls.page_closed.load(Ordering::SeqCst));
        assert!(launcher.calls.engine_closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn bad_view_url_fails_before_launch() {
        let launcher = StubLauncher::new(view_html(1), HashMap::new());

        let err = discover(&launcher, "https://example.com/nope", &quick_config())
            .await
            .unwrap_err();

        assert!(matches!(err, Indd2PdfError::InvalidViewUrl { .. }));
        assert!(!launcher.launched.load(Ordering::SeqCst));
    }
}
