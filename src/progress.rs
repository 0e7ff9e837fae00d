//! Progress-callback trait for conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the pipeline renders each embedded asset and runs each compile
//! attempt. The library never prints; the CLI turns these events into a
//! spinner and log lines.
//!
//! # Example
//!
//! ```rust
//! use md2pdf::{ConversionProgressCallback, ConversionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     rendered: Arc<AtomicUsize>,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_asset_complete(&self, id: &str, renderer: &str) {
//!         self.rendered.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{id} rendered by {renderer}");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     rendered: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::config::TemplateTier;
use std::path::Path;
use std::sync::Arc;

/// Called by the conversion pipeline as it works through a document.
///
/// Implementations must be `Send + Sync`: assets render concurrently, so
/// the asset methods may be called from different tasks at once. All
/// methods default to no-ops.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once after extraction, before any asset is rendered.
    ///
    /// # Arguments
    /// * `total_assets`: number of embedded diagrams/images that will be
    ///   rendered (unsupported artifact types are not counted)
    fn on_conversion_start(&self, total_assets: usize) {
        let _ = total_assets;
    }

    /// Called just before an asset's renderer chain runs.
    fn on_asset_start(&self, id: &str, index: usize, total_assets: usize) {
        let _ = (id, index, total_assets);
    }

    /// Called when an asset was written by `renderer`.
    fn on_asset_complete(&self, id: &str, renderer: &str) {
        let _ = (id, renderer);
    }

    /// Called when every renderer for an asset failed.
    fn on_asset_error(&self, id: &str, error: &str) {
        let _ = (id, error);
    }

    /// Called before each compile attempt.
    fn on_compile_start(&self, tier: TemplateTier, attempt: usize) {
        let _ = (tier, attempt);
    }

    /// Called when a compile attempt fails and another tier may follow.
    fn on_compile_failed(&self, tier: TemplateTier, error: &str) {
        let _ = (tier, error);
    }

    /// Called once after the PDF has been moved into place.
    fn on_conversion_complete(&self, output_path: &Path, tier: TemplateTier) {
        let _ = (output_path, tier);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
