//! Progress notifications for a conversion run.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to observe
//! the run as it moves through its stages. Events are one-way and
//! unbuffered: the pipeline calls the callback inline and moves on.
//!
//! A run emits, in order:
//!
//! 1. `fetching` once discovery starts (and once per page when raw HTML is
//!    being fetched into `html_dir`),
//! 2. `converting` once per rendered page, with a running completed count,
//! 3. `merging` before the per-page PDFs are concatenated,
//! 4. `complete` as the final event of a successful run.
//!
//! # Example
//!
//! ```rust
//! use indd2pdf::{ConversionConfig, ConversionProgress, ConversionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     events: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_progress(&self, progress: &ConversionProgress) {
//!         self.events.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("[{}] {}", progress.stage, progress.message);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { events: AtomicUsize::new(0) });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Pipeline stage a progress event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Fetching,
    Converting,
    Merging,
    Complete,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetching => "fetching",
            Stage::Converting => "converting",
            Stage::Merging => "merging",
            Stage::Complete => "complete",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One progress notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionProgress {
    /// Pages finished so far in the current stage (0 when not page-scoped).
    pub current_page: usize,
    pub total_pages: usize,
    pub stage: Stage,
    pub message: String,
}

impl ConversionProgress {
    pub fn new(
        stage: Stage,
        current_page: usize,
        total_pages: usize,
        message: impl Into<String>,
    ) -> Self {
        Self {
            current_page,
            total_pages,
            stage,
            message: message.into(),
        }
    }
}

/// Receives progress notifications.
///
/// Pages render concurrently, so `on_progress` may be called from several
/// tasks. Implementations must guard shared mutable state themselves
/// (`Mutex`, atomics).
pub trait ConversionProgressCallback: Send + Sync {
    fn on_progress(&self, progress: &ConversionProgress);
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {
    fn on_progress(&self, _progress: &ConversionProgress) {}
}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

/// Build and deliver an event if a callback is configured.
pub(crate) fn emit(
    callback: Option<&ProgressCallback>,
    stage: Stage,
    current_page: usize,
    total_pages: usize,
    message: impl Into<String>,
) {
    if let Some(cb) = callback {
        cb.on_progress(&ConversionProgress::new(
            stage,
            current_page,
            total_pages,
            message,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<ConversionProgress>>,
    }

    impl ConversionProgressCallback for Recorder {
        fn on_progress(&self, progress: &ConversionProgress) {
            self.events.lock().unwrap().push(progress.clone());
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_progress(&ConversionProgress::new(Stage::Converting, 1, 5, "page 1"));
    }

    #[test]
    fn emit_without_callback_is_silent() {
        emit(None, Stage::Complete, 0, 0, "done");
    }

    #[test]
    fn emit_delivers_to_callback() {
        let recorder = Arc::new(Recorder::default());
        let cb: ProgressCallback = recorder.clone();

        emit(Some(&cb), Stage::Fetching, 0, 4, "Discovering pages");
        emit(Some(&cb), Stage::Converting, 1, 4, "Rendered page 2");

        let events = recorder.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].stage, Stage::Fetching);
        assert_eq!(events[1].current_page, 1);
        assert_eq!(events[1].total_pages, 4);
        assert_eq!(events[1].message, "Rendered page 2");
    }

    #[test]
    fn stage_serializes_lowercase() {
        let json = serde_json::to_string(&Stage::Converting).unwrap();
        assert_eq!(json, "\"converting\"");
        assert_eq!(Stage::Merging.to_string(), "merging");

        let event = ConversionProgress::new(Stage::Complete, 4, 4, "done");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["stage"], "complete");
        assert_eq!(value["currentPage"], 4);
        assert_eq!(value["totalPages"], 4);
    }
}
