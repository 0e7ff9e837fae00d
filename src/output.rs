//! Result types returned by the conversion entry points.

use crate::config::TemplateTier;
use crate::error::AssetError;
use crate::pipeline::extract::ArtifactKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Everything a successful conversion produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// Where the PDF now lives.
    pub output_path: PathBuf,
    /// One entry per extracted artifact, in document order.
    pub assets: Vec<AssetResult>,
    /// Every compile attempt, including the successful one (last).
    pub attempts: Vec<CompileAttempt>,
    /// The tier that produced the PDF.
    pub tier: TemplateTier,
    pub stats: ConversionStats,
}

/// Outcome of rendering one artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetResult {
    pub id: String,
    pub kind: ArtifactKind,
    pub title: String,
    /// File name inside the work directory, when one was written.
    pub file: Option<String>,
    /// Name of the renderer that produced `file`.
    pub renderer: Option<String>,
    pub duration_ms: u64,
    /// Set when every renderer failed; the PDF shows a caption instead.
    pub error: Option<AssetError>,
}

impl AssetResult {
    pub fn is_rendered(&self) -> bool {
        self.file.is_some() && self.error.is_none()
    }
}

/// One invocation of the external compiler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileAttempt {
    pub tier: TemplateTier,
    pub success: bool,
    /// Process exit code; `None` when killed by a signal.
    pub exit_code: Option<i32>,
    /// Last lines of stderr, trimmed for display.
    pub stderr_tail: String,
    pub duration_ms: u64,
}

/// Counters and timings for a conversion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionStats {
    pub total_assets: usize,
    pub rendered_assets: usize,
    pub failed_assets: usize,
    /// Assets that are not renderable (unknown artifact type).
    pub unsupported_assets: usize,
    pub compile_attempts: usize,
    pub pdf_bytes: u64,
    pub render_duration_ms: u64,
    pub compile_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Summary of a document produced by [`crate::inspect`] without compiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInfo {
    /// The path or URL that was inspected.
    pub source: String,
    pub bytes: usize,
    pub words: usize,
    pub headings: usize,
    pub artifacts: Vec<ArtifactSummary>,
}

/// A short description of an extracted artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactSummary {
    pub id: String,
    pub kind: ArtifactKind,
    pub mime: String,
    pub title: String,
    pub bytes: usize,
}
