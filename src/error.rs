//! Error types for the md2pdf library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Md2PdfError`] is **fatal**: the conversion cannot proceed at all
//!   (input missing, toolchain not installed, every compile attempt failed).
//!   Returned as `Err(Md2PdfError)` from the top-level `convert*` functions.
//!
//! * [`AssetError`] is **non-fatal**: a single embedded diagram or image could
//!   not be rendered. Stored inside [`crate::output::AssetResult`]; the
//!   document still compiles with a caption in place of the figure.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the md2pdf library.
///
/// Asset-level failures use [`AssetError`] and are stored in
/// [`crate::output::AssetResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum Md2PdfError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// The path exists but is a directory (or another non-regular file).
    #[error("Input '{path}' is not a regular file")]
    NotAFile { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file was read but is not valid UTF-8 text.
    #[error("Input '{path}' is not valid UTF-8 text: {detail}")]
    NotUtf8 { path: PathBuf, detail: String },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Toolchain errors ──────────────────────────────────────────────────
    /// A required external program (pandoc, the PDF engine) is not runnable.
    #[error("Required tool '{tool}' was not found or failed to start.\n{hint}")]
    ToolchainMissing { tool: String, hint: String },

    /// Every compile attempt (including simplified fallbacks) failed.
    #[error("PDF compilation failed after {attempts} attempt(s).\nLast error output:\n{stderr}")]
    CompileFailed { attempts: usize, stderr: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output PDF file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write inside the work directory.
    #[error("Work directory error at '{path}': {source}")]
    WorkDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The PDF was written but the system viewer could not be launched.
    #[error("Could not open '{path}' in a viewer: {detail}")]
    OpenFailed { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Md2PdfError {
    /// Helper for `map_err` on work-directory I/O.
    pub(crate) fn work_dir(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Md2PdfError::WorkDir { path, source }
    }
}

/// A non-fatal error for a single embedded asset.
///
/// The overall conversion continues; the asset's placeholder is replaced with
/// a caption so the reader can see something was there.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum AssetError {
    /// Every renderer in the chain failed.
    #[error("Asset '{id}': rendering failed: {detail}")]
    RenderFailed { id: String, detail: String },

    /// Embedded data could not be decoded (bad base64, unknown image bytes).
    #[error("Asset '{id}': invalid embedded data: {detail}")]
    InvalidData { id: String, detail: String },
}
