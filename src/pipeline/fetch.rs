//! Raw page retrieval over HTTP.
//!
//! Rendering goes through the browser; this path pulls the page HTML as
//! served, for callers who want the source markup next to the PDF
//! (`html_dir`). Each request carries a desktop-browser user agent because
//! the content host serves stripped pages to unknown clients.
//!
//! ## Retry Strategy
//!
//! Failures back off linearly: attempt `n` is followed by a wait of
//! `n × retry_delay`. With the defaults (3 attempts, 1 s base) a page that
//! never answers costs 1 s + 2 s of waiting before the run aborts.

use crate::config::ConversionConfig;
use crate::error::Indd2PdfError;
use crate::pipeline::manifest::PageUrl;
use crate::progress::{self, ProgressCallback, Stage};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Desktop Chrome user agent sent with every request.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Retrying HTTP fetcher for page resources.
#[derive(Debug, Clone)]
pub struct PageFetcher {
    client: reqwest::Client,
    retries: u32,
    retry_delay: Duration,
}

impl PageFetcher {
    /// `retries` is the total number of attempts per page (at least one).
    pub fn new(
        timeout: Duration,
        retries: u32,
        retry_delay: Duration,
    ) -> Result<Self, Indd2PdfError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(BROWSER_USER_AGENT)
            .build()
            .map_err(|e| Indd2PdfError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            retries: retries.max(1),
            retry_delay,
        })
    }

    pub fn from_config(config: &ConversionConfig) -> Result<Self, Indd2PdfError> {
        Self::new(config.timeout(), config.retries, config.retry_delay())
    }

    /// Fetch one URL, retrying on transport errors and non-2xx statuses.
    pub async fn fetch_page(&self, url: &str) -> Result<String, Indd2PdfError> {
        let mut last_err = String::new();

        for attempt in 1..=self.retries {
            match self.try_fetch(url).await {
                Ok(body) => {
                    debug!("Fetched {} ({} bytes, attempt {})", url, body.len(), attempt);
                    return Ok(body);
                }
                Err(reason) => {
                    warn!(
                        "Fetch {} attempt {}/{} failed: {}",
                        url, attempt, self.retries, reason
                    );
                    last_err = reason;
                }
            }

            if attempt < self.retries {
                sleep(self.retry_delay * attempt).await;
            }
        }

        Err(Indd2PdfError::FetchFailed {
            url: url.to_string(),
            attempts: self.retries,
            reason: last_err,
        })
    }

    async fn try_fetch(&self, url: &str) -> Result<String, String> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                "request timed out".to_string()
            } else {
                e.to_string()
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {status}"));
        }

        response.text().await.map_err(|e| e.to_string())
    }

    /// Fetch every page with at most `concurrency` requests in flight.
    ///
    /// Completion order is arbitrary; the map is keyed by page number. The
    /// first page to exhaust its retries aborts the batch.
    pub async fn fetch_all(
        &self,
        pages: &[PageUrl],
        concurrency: usize,
        progress_callback: Option<&ProgressCallback>,
    ) -> Result<BTreeMap<usize, String>, Indd2PdfError> {
        let total = pages.len();
        let completed = AtomicUsize::new(0);

        stream::iter(pages.iter().map(|page| {
            let completed = &completed;
            async move {
                let body = self.fetch_page(&page.url).await?;
                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                progress::emit(
                    progress_callback,
                    Stage::Fetching,
                    done,
                    total,
                    format!("Fetched page {}", page.page_number),
                );
                Ok::<_, Indd2PdfError>((page.page_number, body))
            }
        }))
        .buffer_unordered(concurrency.max(1))
        .try_collect()
        .await
    }
}

/// Write fetched bodies to `dir` as `page-{n}.html`, creating `dir` if needed.
pub async fn save_pages(
    dir: &Path,
    bodies: &BTreeMap<usize, String>,
) -> Result<Vec<PathBuf>, Indd2PdfError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| Indd2PdfError::OutputWriteFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;

    let mut written = Vec::with_capacity(bodies.len());
    for (page_number, body) in bodies {
        let path = dir.join(format!("page-{page_number}.html"));
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| Indd2PdfError::OutputWriteFailed {
                path: path.clone(),
                source: e,
            })?;
        written.push(path);
    }

    info!("Saved {} page HTML files to {}", written.len(), dir.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{ConversionProgress, ConversionProgressCallback};
    use std::sync::{Arc, Mutex};
    use wiremock::matchers::{method, path};
    use std::time::Instant;
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    fn fetcher(retries: u32) -> PageFetcher {
        PageFetcher::new(Duration::from_secs(5), retries, Duration::from_millis(5)).unwrap()
    }

    fn page(n: usize, base: &str) -> PageUrl {
        PageUrl {
            page_number: n,
            url: format!("{base}/page{n}.html"),
            filename: format!("page{n}.html"),
            width: "600".into(),
            height: "800".into(),
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/page1.html"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/page1.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>one</p>"))
            .expect(1)
            .mount(&server)
            .await;

        let body = fetcher(3)
            .fetch_page(&format!("{}/page1.html", server.uri()))
            .await
            .unwrap();
        assert_eq!(body, "<p>one</p>");
    }

    #[tokio::test]
    async fn exhausted_retries_report_attempt_count() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/page1.html"))
            .respond_with(ResponseTemplate::new(500))
            .expect(4)
            .mount(&server)
            .await;

        let url = format!("{}/page1.html", server.uri());
        let err = fetcher(4).fetch_page(&url).await.unwrap_err();

        match err {
            Indd2PdfError::FetchFailed {
                url: ref failed,
                attempts,
                ref reason,
            } => {
                assert_eq!(failed, &url);
                assert_eq!(attempts, 4);
                assert!(reason.contains("500"), "reason: {reason}");
            }
            other => panic!("expected FetchFailed, got {other:?}"),
        }
        assert!(err.to_string().contains("after 4 attempts"));
    }

    #[tokio::test]
    async fn sends_browser_user_agent() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let body = fetcher(1)
            .fetch_page(&format!("{}/any.html", server.uri()))
            .await
            .unwrap();
        assert_eq!(body, "ok");

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let agent = requests[0].headers.get("user-agent").unwrap().to_str().unwrap();
        assert_eq!(agent, BROWSER_USER_AGENT);
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ConversionProgress>>);

    impl ConversionProgressCallback for Recorder {
        fn on_progress(&self, progress: &ConversionProgress) {
            self.0.lock().unwrap().push(progress.clone());
        }
    }

    #[tokio::test]
    async fn fetch_all_keys_results_by_page_number() {
        let server = MockServer::start().await;

        for n in 1..=5 {
            // Early pages answer last so completion order differs from submission order.
            let delay = Duration::from_millis(60 - n as u64 * 10);
            Mock::given(method("GET"))
                .and(path(format!("/page{n}.html")))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_string(format!("body {n}"))
                        .set_delay(delay),
                )
                .mount(&server)
                .await;
        }

        let pages: Vec<PageUrl> = (1..=5).map(|n| page(n, &server.uri())).collect();
        let recorder = Arc::new(Recorder::default());
        let cb: ProgressCallback = recorder.clone();

        let bodies = fetcher(1).fetch_all(&pages, 2, Some(&cb)).await.unwrap();

        assert_eq!(bodies.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
        assert_eq!(bodies[&3], "body 3");

        let events = recorder.0.lock().unwrap();
        assert_eq!(events.len(), 5);
        assert!(events.iter().all(|e| e.stage == Stage::Fetching && e.total_pages == 5));
        assert_eq!(
            events.iter().map(|e| e.current_page).collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5]
        );
    }

    /// Stamps each arrival and answers after a fixed delay.
    struct SlowResponder {
        arrivals: Arc<Mutex<Vec<Instant>>>,
        delay: Duration,
    }

    impl Respond for SlowResponder {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            self.arrivals.lock().unwrap().push(Instant::now());
            ResponseTemplate::new(200)
                .set_body_string(request.url.path().to_string())
                .set_delay(self.delay)
        }
    }

    #[tokio::test]
    async fn fetch_all_stays_within_concurrency_ceiling() {
        let server = MockServer::start().await;
        let arrivals = Arc::new(Mutex::new(Vec::new()));
        let delay = Duration::from_millis(150);

        Mock::given(method("GET"))
            .respond_with(SlowResponder {
                arrivals: Arc::clone(&arrivals),
                delay,
            })
            .mount(&server)
            .await;

        let pages: Vec<PageUrl> = (1..=6).map(|n| page(n, &server.uri())).collect();
        let bodies = fetcher(1).fetch_all(&pages, 2, None).await.unwrap();

        assert_eq!(bodies.len(), 6);
        assert_eq!(bodies[&4], "/page4.html");

        // A slot only takes a new request once its previous response (held
        // for `delay`) came back, so any window shorter than `delay` sees at
        // most one arrival per slot.
        let mut stamps = arrivals.lock().unwrap().clone();
        stamps.sort();
        assert_eq!(stamps.len(), 6);
        let window = delay - Duration::from_millis(30);
        let busiest = stamps
            .iter()
            .map(|&start| {
                stamps
                    .iter()
                    .filter(|&&t| t >= start && t < start + window)
                    .count()
            })
            .max()
            .unwrap();
        assert_eq!(busiest, 2, "arrivals: {stamps:?}");
    }

    #[tokio::test]
    async fn fetch_all_aborts_on_a_dead_page() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/page1.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string("fine"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/page2.html"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let pages = vec![page(1, &server.uri()), page(2, &server.uri())];
        let err = fetcher(2).fetch_all(&pages, 2, None).await.unwrap_err();
        assert!(matches!(err, Indd2PdfError::FetchFailed { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn save_pages_writes_numbered_files() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("html");
        let bodies = BTreeMap::from([(2, "two".to_string()), (1, "one".to_string())]);

        let written = save_pages(&target, &bodies).await.unwrap();

        assert_eq!(written, vec![target.join("page-1.html"), target.join("page-2.html")]);
        assert_eq!(std::fs::read_to_string(target.join("page-2.html")).unwrap(), "two");
    }
}
