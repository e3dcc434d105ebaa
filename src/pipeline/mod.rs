//! Pipeline stages for publication-to-PDF conversion.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own against fixtures or stub browsers.
//!
//! ## Data Flow
//!
//! ```text
//! discover ──▶ manifest ──▶ render ──▶ merge
//! (browser)    (pure)       (tabs)     (lopdf)
//!                   └──▶ fetch (reqwest, optional raw HTML)
//! ```
//!
//! 1. [`discover`] - load the view page, read the rendered DOM and live
//!    iframe URLs
//! 2. [`manifest`] - pure extraction of IDs, reader data and the page list
//! 3. [`render`]   - print each page to its own PDF, bounded concurrency
//! 4. [`merge`]    - concatenate page PDFs in page order; runs in
//!    `spawn_blocking` because lopdf is synchronous
//! 5. [`fetch`]    - retrying raw-HTML download, only when `html_dir` is set

pub mod discover;
pub mod fetch;
pub mod manifest;
pub mod merge;
pub mod render;
