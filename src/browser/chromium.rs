//! Headless Chrome/Chromium backend built on `chromiumoxide`.
//!
//! `chromiumoxide` speaks the DevTools protocol over a websocket whose event
//! loop (the `Handler`) must be polled for anything to happen, so every
//! launched engine owns a background task draining it. The task is aborted
//! when the engine is closed.

use super::{BrowserEngine, BrowserLauncher, BrowserPage, PdfOptions, Viewport, WaitUntil};
use crate::error::Indd2PdfError;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{EventLifecycleEvent, PrintToPdfParams};
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default timeout for a single DevTools request.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Launches a local Chrome/Chromium through `chromiumoxide`.
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    chrome_executable: Option<PathBuf>,
    headless: bool,
    request_timeout: Duration,
}

impl Default for ChromiumLauncher {
    fn default() -> Self {
        Self {
            chrome_executable: None,
            headless: true,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl ChromiumLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use this binary instead of auto-detecting one.
    pub fn chrome_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.chrome_executable = Some(path.into());
        self
    }

    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn browser_config(&self) -> Result<BrowserConfig, Indd2PdfError> {
        let mut builder = BrowserConfig::builder()
            .request_timeout(self.request_timeout)
            .no_sandbox()
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--hide-scrollbars")
            .arg("--mute-audio");

        if !self.headless {
            builder = builder.with_head();
        }
        if let Some(ref path) = self.chrome_executable {
            builder = builder.chrome_executable(path);
        }

        builder
            .build()
            .map_err(|detail| Indd2PdfError::BrowserLaunchFailed { detail })
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserEngine>, Indd2PdfError> {
        let config = self.browser_config()?;

        let (browser, mut handler) =
            Browser::launch(config)
                .await
                .map_err(|e| Indd2PdfError::BrowserLaunchFailed {
                    detail: e.to_string(),
                })?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {}", e);
                }
            }
        });

        info!("Headless browser launched");

        Ok(Box::new(ChromiumEngine {
            browser,
            handler_task,
        }))
    }
}

struct ChromiumEngine {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

#[async_trait]
impl BrowserEngine for ChromiumEngine {
    async fn new_page(
        &self,
        viewport: Option<Viewport>,
    ) -> Result<Box<dyn BrowserPage>, Indd2PdfError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(browser_error)?;

        if let Some(vp) = viewport {
            page.execute(SetDeviceMetricsOverrideParams::new(
                i64::from(vp.width),
                i64::from(vp.height),
                1.0,
                false,
            ))
            .await
            .map_err(browser_error)?;
        }

        Ok(Box::new(ChromiumPage { page }))
    }

    async fn close(self: Box<Self>) -> Result<(), Indd2PdfError> {
        let ChromiumEngine {
            mut browser,
            handler_task,
        } = *self;

        let closed = browser.close().await.map(|_| ()).map_err(browser_error);
        if closed.is_ok() {
            if let Err(e) = browser.wait().await {
                warn!("Browser process did not exit cleanly: {}", e);
            }
        }
        handler_task.abort();

        if closed.is_ok() {
            info!("Headless browser closed");
        }
        closed
    }
}

struct ChromiumPage {
    page: Page,
}

impl ChromiumPage {
    /// Wait for the main frame to report `networkIdle` for the navigation to `url`.
    async fn goto_network_idle(&self, url: &str) -> Result<(), Indd2PdfError> {
        let mut events = self
            .page
            .event_listener::<EventLifecycleEvent>()
            .await
            .map_err(browser_error)?;

        self.page
            .goto(url)
            .await
            .map_err(|e| navigation_error(url, e))?;

        let main_frame = self.page.mainframe().await.map_err(browser_error)?;

        // Lifecycle events restart at "init" for each new document; anything
        // before that belongs to about:blank.
        let mut committed = false;
        while let Some(event) = events.next().await {
            if main_frame.as_ref().is_some_and(|id| *id != event.frame_id) {
                continue;
            }
            match event.name.as_str() {
                "init" => committed = true,
                "networkIdle" if committed => return Ok(()),
                _ => {}
            }
        }

        Err(Indd2PdfError::NavigationFailed {
            url: url.to_string(),
            detail: "page closed before reaching network idle".to_string(),
        })
    }
}

#[async_trait]
impl BrowserPage for ChromiumPage {
    async fn goto(
        &self,
        url: &str,
        wait: WaitUntil,
        timeout: Duration,
    ) -> Result<(), Indd2PdfError> {
        debug!("Navigating to {} (wait: {:?})", url, wait);

        let navigation = async {
            match wait {
                WaitUntil::Load => self
                    .page
                    .goto(url)
                    .await
                    .map(|_| ())
                    .map_err(|e| navigation_error(url, e)),
                WaitUntil::NetworkIdle => self.goto_network_idle(url).await,
            }
        };

        tokio::time::timeout(timeout, navigation)
            .await
            .map_err(|_| navigation_timeout(url, timeout))?
    }

    async fn content(&self) -> Result<String, Indd2PdfError> {
        self.page.content().await.map_err(browser_error)
    }

    async fn attributes(
        &self,
        selector: &str,
        name: &str,
    ) -> Result<Vec<Option<String>>, Indd2PdfError> {
        let elements = self
            .page
            .find_elements(selector)
            .await
            .map_err(browser_error)?;

        let mut values = Vec::with_capacity(elements.len());
        for element in &elements {
            values.push(element.attribute(name).await.map_err(browser_error)?);
        }
        Ok(values)
    }

    async fn pdf(&self, options: &PdfOptions) -> Result<Vec<u8>, Indd2PdfError> {
        let params = PrintToPdfParams::builder()
            .paper_width(options.paper_width_inches())
            .paper_height(options.paper_height_inches())
            .margin_top(0.0)
            .margin_bottom(0.0)
            .margin_left(0.0)
            .margin_right(0.0)
            .print_background(options.print_background)
            .prefer_css_page_size(options.prefer_css_page_size)
            .build();

        self.page.pdf(params).await.map_err(browser_error)
    }

    async fn close(self: Box<Self>) -> Result<(), Indd2PdfError> {
        self.page.close().await.map_err(browser_error)
    }
}

fn browser_error(e: CdpError) -> Indd2PdfError {
    Indd2PdfError::Browser {
        detail: e.to_string(),
    }
}

fn navigation_timeout(url: &str, timeout: Duration) -> Indd2PdfError {
    Indd2PdfError::NavigationTimeout {
        url: url.to_string(),
        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
    }
}

fn navigation_error(url: &str, e: CdpError) -> Indd2PdfError {
    Indd2PdfError::NavigationFailed {
        url: url.to_string(),
        detail: e.to_string(),
    }
}
