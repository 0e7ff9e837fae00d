//! Asset rendering: turn extracted artifacts into files pandoc can include.
//!
//! Every artifact kind has an ordered list of renderers, from the best
//! output to the most robust. [`RendererChain`] walks that list and stops at
//! the first renderer that produces a file:
//!
//! | Kind     | Chain |
//! |----------|-------|
//! | SVG      | `inkscape` → `resvg` (in-process) → raw SVG |
//! | Mermaid  | `mermaid-cli` → Graphviz `dot` → code image |
//! | Raster   | base64 decode |
//!
//! External programs run through `tokio::process`; a renderer whose program
//! is not installed reports [`RenderError::ToolMissing`] and the chain moves
//! on. CPU-bound rasterisation runs in `spawn_blocking`.

use crate::config::ConversionConfig;
use crate::error::AssetError;
use crate::output::AssetResult;
use crate::pipeline::extract::{Artifact, ArtifactKind, PreparedDocument};
use crate::pipeline::mermaid;
use async_trait::async_trait;
use base64::Engine as _;
use futures::stream::{self, StreamExt};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
#[cfg(feature = "native-svg")]
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// mermaid-cli output smaller than this is treated as a failed render.
const MIN_MERMAID_PNG_BYTES: u64 = 100;

/// Why a single renderer could not produce a file.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("{tool} is not installed")]
    ToolMissing { tool: String },

    #[error("{tool} failed: {detail}")]
    ToolFailed { tool: String, detail: String },

    #[error("{tool} timed out after {secs}s")]
    Timeout { tool: String, secs: u64 },

    #[error("not applicable: {0}")]
    NotApplicable(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared settings for one conversion's renderers.
#[derive(Debug, Clone)]
pub struct RenderContext {
    /// Directory asset files are written into; pandoc resolves them here.
    pub work_dir: PathBuf,
    pub svg_dpi: u32,
    pub raster_scale: f32,
    pub mermaid_timeout: Duration,
    /// Font family for Graphviz labels.
    pub font: String,
}

impl RenderContext {
    pub fn new(work_dir: impl Into<PathBuf>, config: &ConversionConfig, font: impl Into<String>) -> Self {
        Self {
            work_dir: work_dir.into(),
            svg_dpi: config.svg_dpi,
            raster_scale: config.raster_scale,
            mermaid_timeout: Duration::from_secs(config.mermaid_timeout_secs),
            font: font.into(),
        }
    }

    /// `file` must be a bare file name; see [`Artifact::file_stem`].
    fn path(&self, file: &str) -> PathBuf {
        self.work_dir.join(file)
    }
}

/// A file written for an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedAsset {
    /// File name relative to the work directory.
    pub file: String,
    pub renderer: &'static str,
}

/// One way of turning an artifact into an includable file.
#[async_trait]
pub trait AssetRenderer: Send + Sync {
    /// Short name used in logs and [`AssetResult::renderer`].
    fn name(&self) -> &'static str;

    /// Whether this renderer handles `kind` at all.
    fn supports(&self, kind: &ArtifactKind) -> bool;

    /// Cheap check made before [`AssetRenderer::render`]. Renderers that
    /// shell out report a missing program from `render` instead.
    fn is_available(&self) -> bool {
        true
    }

    async fn render(
        &self,
        artifact: &Artifact,
        ctx: &RenderContext,
    ) -> Result<RenderedAsset, RenderError>;
}

// ── Chain ────────────────────────────────────────────────────────────────

/// The errors of every renderer that was tried for one artifact.
#[derive(Debug, Default)]
pub struct ChainError {
    pub attempts: Vec<(&'static str, RenderError)>,
}

impl ChainError {
    /// True when the failure lies in the data rather than the tools.
    pub fn is_invalid_data(&self) -> bool {
        !self.attempts.is_empty()
            && self
                .attempts
                .iter()
                .all(|(_, e)| matches!(e, RenderError::InvalidData(_)))
    }
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.attempts.is_empty() {
            return f.write_str("no renderer available");
        }
        let parts: Vec<String> = self
            .attempts
            .iter()
            .map(|(name, e)| format!("{name}: {e}"))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

/// Ordered renderers tried until one succeeds.
pub struct RendererChain {
    renderers: Vec<Box<dyn AssetRenderer>>,
}

impl fmt::Debug for RendererChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.renderers.iter().map(|r| r.name()))
            .finish()
    }
}

impl Default for RendererChain {
    fn default() -> Self {
        let chain = Self::empty()
            .with(InkscapeRenderer)
            .with(ResvgRenderer)
            .with(RawSvgRenderer)
            .with(MermaidCliRenderer)
            .with(GraphvizRenderer)
            .with(CodeImageRenderer)
            .with(DataUriRenderer);
        debug!("Renderer chain: {:?}", chain);
        chain
    }
}

impl RendererChain {
    pub fn empty() -> Self {
        Self {
            renderers: Vec::new(),
        }
    }

    pub fn with(mut self, renderer: impl AssetRenderer + 'static) -> Self {
        self.renderers.push(Box::new(renderer));
        self
    }

    /// Names of the renderers that would be tried for `kind`, in order.
    pub fn candidates(&self, kind: &ArtifactKind) -> Vec<&'static str> {
        self.renderers
            .iter()
            .filter(|r| r.supports(kind) && r.is_available())
            .map(|r| r.name())
            .collect()
    }

    pub async fn render(
        &self,
        artifact: &Artifact,
        ctx: &RenderContext,
    ) -> Result<RenderedAsset, ChainError> {
        let mut failed = ChainError::default();
        for renderer in &self.renderers {
            if !renderer.supports(&artifact.kind) || !renderer.is_available() {
                continue;
            }
            match renderer.render(artifact, ctx).await {
                Ok(asset) => {
                    debug!("{} rendered by {}", artifact.id, renderer.name());
                    return Ok(asset);
                }
                Err(e) => {
                    debug!("{}: {} failed: {}", artifact.id, renderer.name(), e);
                    failed.attempts.push((renderer.name(), e));
                }
            }
        }
        Err(failed)
    }
}

// ── Stage entry point ────────────────────────────────────────────────────

/// Render every artifact of `doc` with at most `config.concurrency` in
/// flight. Results keep artifact order. Failures are recorded, not raised.
pub async fn render_assets(
    doc: &PreparedDocument,
    chain: &RendererChain,
    ctx: &RenderContext,
    config: &ConversionConfig,
) -> Vec<AssetResult> {
    // Progress counts only artifacts a renderer is tried for.
    let total = doc.renderable_count();
    let mut next_index = 0;
    stream::iter(doc.artifacts.iter().map(|artifact| {
        let cb = config.progress_callback.clone();
        let slot = (artifact.kind != ArtifactKind::Unsupported).then(|| {
            next_index += 1;
            next_index - 1
        });
        async move {
            let Some(index) = slot else {
                info!(
                    "Skipping {} ({}): unsupported artifact type",
                    artifact.id, artifact.mime
                );
                return unrendered(artifact, None, 0);
            };
            if let Some(ref cb) = cb {
                cb.on_asset_start(&artifact.id, index, total);
            }
            let start = Instant::now();
            let outcome = chain.render(artifact, ctx).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            match outcome {
                Ok(asset) => {
                    if let Some(ref cb) = cb {
                        cb.on_asset_complete(&artifact.id, asset.renderer);
                    }
                    AssetResult {
                        id: artifact.id.clone(),
                        kind: artifact.kind.clone(),
                        title: artifact.title.clone(),
                        file: Some(asset.file),
                        renderer: Some(asset.renderer.to_string()),
                        duration_ms,
                        error: None,
                    }
                }
                Err(e) => {
                    warn!("Could not render {}: {}", artifact.id, e);
                    let detail = e.to_string();
                    if let Some(ref cb) = cb {
                        cb.on_asset_error(&artifact.id, &detail);
                    }
                    let error = if e.is_invalid_data() {
                        AssetError::InvalidData {
                            id: artifact.id.clone(),
                            detail,
                        }
                    } else {
                        AssetError::RenderFailed {
                            id: artifact.id.clone(),
                            detail,
                        }
                    };
                    unrendered(artifact, Some(error), duration_ms)
                }
            }
        }
    }))
    .buffered(config.concurrency.max(1))
    .collect()
    .await
}

fn unrendered(artifact: &Artifact, error: Option<AssetError>, duration_ms: u64) -> AssetResult {
    AssetResult {
        id: artifact.id.clone(),
        kind: artifact.kind.clone(),
        title: artifact.title.clone(),
        file: None,
        renderer: None,
        duration_ms,
        error,
    }
}

// ── Subprocess helpers ───────────────────────────────────────────────────

/// Run `cmd` to completion, mapping spawn and exit failures.
async fn run_tool(tool: &str, cmd: &mut Command, timeout: Option<Duration>) -> Result<(), RenderError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd.spawn().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => RenderError::ToolMissing {
            tool: tool.to_string(),
        },
        _ => RenderError::ToolFailed {
            tool: tool.to_string(),
            detail: e.to_string(),
        },
    })?;

    let output = match timeout {
        Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| RenderError::Timeout {
                tool: tool.to_string(),
                secs: limit.as_secs(),
            })??,
        None => child.wait_with_output().await?,
    };

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(RenderError::ToolFailed {
            tool: tool.to_string(),
            detail: format!("{} {}", output.status, last_line(&stderr)),
        })
    }
}

fn last_line(text: &str) -> &str {
    text.lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("")
        .trim()
}

/// Size of `path` if it exists and is larger than `min` bytes.
async fn non_trivial_file(path: &Path, min: u64) -> Option<u64> {
    let meta = tokio::fs::metadata(path).await.ok()?;
    (meta.is_file() && meta.len() > min).then_some(meta.len())
}

async fn write_source(ctx: &RenderContext, file: &str, content: &[u8]) -> Result<PathBuf, RenderError> {
    let path = ctx.path(file);
    tokio::fs::write(&path, content).await?;
    Ok(path)
}

// ── SVG ──────────────────────────────────────────────────────────────────

/// `inkscape <id>.svg --export-filename <id>.png --export-dpi=<dpi>`.
pub struct InkscapeRenderer;

#[async_trait]
impl AssetRenderer for InkscapeRenderer {
    fn name(&self) -> &'static str {
        "inkscape"
    }

    fn supports(&self, kind: &ArtifactKind) -> bool {
        *kind == ArtifactKind::Svg
    }

    async fn render(&self, artifact: &Artifact, ctx: &RenderContext) -> Result<RenderedAsset, RenderError> {
        let svg = write_source(ctx, &format!("{}.svg", artifact.file_stem), artifact.content.as_bytes()).await?;
        let png_name = format!("{}.png", artifact.file_stem);
        let png = ctx.path(&png_name);

        run_tool(
            "inkscape",
            Command::new("inkscape")
                .arg(&svg)
                .arg(format!("--export-filename={}", png.display()))
                .arg(format!("--export-dpi={}", ctx.svg_dpi)),
            None,
        )
        .await?;

        if non_trivial_file(&png, 0).await.is_none() {
            return Err(RenderError::ToolFailed {
                tool: "inkscape".into(),
                detail: "no PNG was written".into(),
            });
        }
        Ok(RenderedAsset {
            file: png_name,
            renderer: self.name(),
        })
    }
}

/// In-process rasterisation with resvg.
pub struct ResvgRenderer;

#[async_trait]
impl AssetRenderer for ResvgRenderer {
    fn name(&self) -> &'static str {
        "resvg"
    }

    fn supports(&self, kind: &ArtifactKind) -> bool {
        *kind == ArtifactKind::Svg
    }

    fn is_available(&self) -> bool {
        cfg!(feature = "native-svg")
    }

    async fn render(&self, artifact: &Artifact, ctx: &RenderContext) -> Result<RenderedAsset, RenderError> {
        let png_name = format!("{}.png", artifact.file_stem);
        rasterize_to_file(artifact.content.clone(), ctx.path(&png_name), ctx.raster_scale).await?;
        Ok(RenderedAsset {
            file: png_name,
            renderer: self.name(),
        })
    }
}

/// Last resort: hand the SVG to pandoc as is.
pub struct RawSvgRenderer;

#[async_trait]
impl AssetRenderer for RawSvgRenderer {
    fn name(&self) -> &'static str {
        "raw-svg"
    }

    fn supports(&self, kind: &ArtifactKind) -> bool {
        *kind == ArtifactKind::Svg
    }

    async fn render(&self, artifact: &Artifact, ctx: &RenderContext) -> Result<RenderedAsset, RenderError> {
        let name = format!("{}.svg", artifact.file_stem);
        write_source(ctx, &name, artifact.content.as_bytes()).await?;
        Ok(RenderedAsset {
            file: name,
            renderer: self.name(),
        })
    }
}

// ── Mermaid ──────────────────────────────────────────────────────────────

/// `mmdc`, falling back to `npx @mermaid-js/mermaid-cli`.
pub struct MermaidCliRenderer;

#[async_trait]
impl AssetRenderer for MermaidCliRenderer {
    fn name(&self) -> &'static str {
        "mermaid-cli"
    }

    fn supports(&self, kind: &ArtifactKind) -> bool {
        *kind == ArtifactKind::Mermaid
    }

    async fn render(&self, artifact: &Artifact, ctx: &RenderContext) -> Result<RenderedAsset, RenderError> {
        let source = mermaid::normalize_source(&artifact.content);
        let mmd = write_source(ctx, &format!("{}.mmd", artifact.file_stem), source.as_bytes()).await?;
        let png_name = format!("{}.png", artifact.file_stem);
        let png = ctx.path(&png_name);

        let mmdc = run_tool(
            "mmdc",
            Command::new("mmdc")
                .arg("--input")
                .arg(&mmd)
                .arg("--output")
                .arg(&png)
                .args(["--backgroundColor", "white"]),
            Some(ctx.mermaid_timeout),
        )
        .await;

        match mmdc {
            Err(RenderError::ToolMissing { .. }) => {
                debug!("mmdc not found, trying npx for {}", artifact.id);
                run_tool(
                    "npx",
                    Command::new("npx")
                        .args(["--yes", "@mermaid-js/mermaid-cli", "--input"])
                        .arg(&mmd)
                        .arg("--output")
                        .arg(&png)
                        .args(["--backgroundColor", "white"]),
                    Some(ctx.mermaid_timeout),
                )
                .await?
            }
            other => other?,
        }

        if non_trivial_file(&png, MIN_MERMAID_PNG_BYTES).await.is_none() {
            return Err(RenderError::ToolFailed {
                tool: "mermaid-cli".into(),
                detail: "output image is missing or too small".into(),
            });
        }
        Ok(RenderedAsset {
            file: png_name,
            renderer: self.name(),
        })
    }
}

/// Flowcharts only: translate to DOT and run `dot -Tpng`.
pub struct GraphvizRenderer;

#[async_trait]
impl AssetRenderer for GraphvizRenderer {
    fn name(&self) -> &'static str {
        "graphviz"
    }

    fn supports(&self, kind: &ArtifactKind) -> bool {
        *kind == ArtifactKind::Mermaid
    }

    async fn render(&self, artifact: &Artifact, ctx: &RenderContext) -> Result<RenderedAsset, RenderError> {
        let dot_source = mermaid::flowchart_to_dot(&artifact.content, &ctx.font)
            .ok_or_else(|| RenderError::NotApplicable("not a flowchart".into()))?;
        let dot = write_source(ctx, &format!("{}.dot", artifact.file_stem), dot_source.as_bytes()).await?;
        let png_name = format!("{}.png", artifact.file_stem);
        let png = ctx.path(&png_name);

        run_tool(
            "dot",
            Command::new("dot")
                .arg("-Tpng")
                .arg(format!("-Gdpi={}", ctx.svg_dpi))
                .arg("-o")
                .arg(&png)
                .arg(&dot),
            None,
        )
        .await?;

        if non_trivial_file(&png, 0).await.is_none() {
            return Err(RenderError::ToolFailed {
                tool: "dot".into(),
                detail: "no PNG was written".into(),
            });
        }
        Ok(RenderedAsset {
            file: png_name,
            renderer: self.name(),
        })
    }
}

/// Shows the diagram source as a code listing image.
pub struct CodeImageRenderer;

#[async_trait]
impl AssetRenderer for CodeImageRenderer {
    fn name(&self) -> &'static str {
        "code-image"
    }

    fn supports(&self, kind: &ArtifactKind) -> bool {
        *kind == ArtifactKind::Mermaid
    }

    async fn render(&self, artifact: &Artifact, ctx: &RenderContext) -> Result<RenderedAsset, RenderError> {
        let svg = mermaid::code_image_svg(&artifact.content, &format!("Mermaid: {}", artifact.title));

        if cfg!(feature = "native-svg") {
            let png_name = format!("{}.png", artifact.file_stem);
            match rasterize_to_file(svg.clone(), ctx.path(&png_name), 1.5).await {
                Ok(()) => {
                    return Ok(RenderedAsset {
                        file: png_name,
                        renderer: self.name(),
                    })
                }
                Err(e) => debug!("Code image rasterisation failed for {}: {}", artifact.id, e),
            }
        }

        let svg_name = format!("{}_code.svg", artifact.file_stem);
        write_source(ctx, &svg_name, svg.as_bytes()).await?;
        Ok(RenderedAsset {
            file: svg_name,
            renderer: self.name(),
        })
    }
}

// ── Raster ───────────────────────────────────────────────────────────────

/// Decodes a base64 `data:` image and writes it with the right extension.
pub struct DataUriRenderer;

#[async_trait]
impl AssetRenderer for DataUriRenderer {
    fn name(&self) -> &'static str {
        "data-uri"
    }

    fn supports(&self, kind: &ArtifactKind) -> bool {
        matches!(kind, ArtifactKind::Raster { .. })
    }

    async fn render(&self, artifact: &Artifact, ctx: &RenderContext) -> Result<RenderedAsset, RenderError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(artifact.content.as_bytes())
            .map_err(|e| RenderError::InvalidData(format!("bad base64: {e}")))?;
        let ext = sniff_extension(&bytes)?;
        let name = format!("{}.{ext}", artifact.file_stem);
        write_source(ctx, &name, &bytes).await?;
        Ok(RenderedAsset {
            file: name,
            renderer: self.name(),
        })
    }
}

/// File extension for decoded image bytes that a LaTeX engine can include.
pub fn sniff_extension(bytes: &[u8]) -> Result<&'static str, RenderError> {
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(256)]);
    let head = head.trim_start();
    if head.starts_with("<svg") || (head.starts_with("<?xml") && head.contains("<svg")) {
        return Ok("svg");
    }
    match image::guess_format(bytes) {
        Ok(image::ImageFormat::Png) => Ok("png"),
        Ok(image::ImageFormat::Jpeg) => Ok("jpg"),
        Ok(other) => Err(RenderError::InvalidData(format!(
            "{other:?} images cannot be embedded in a PDF"
        ))),
        Err(e) => Err(RenderError::InvalidData(format!("unrecognised image data: {e}"))),
    }
}

// ── Native rasterisation ─────────────────────────────────────────────────

#[cfg(feature = "native-svg")]
static FONT_DB: once_cell::sync::Lazy<Arc<usvg::fontdb::Database>> = once_cell::sync::Lazy::new(|| {
    let mut db = usvg::fontdb::Database::new();
    db.load_system_fonts();
    if db.is_empty() {
        warn!("No system fonts found; SVG text will not render");
    }
    Arc::new(db)
});

/// Rasterise `svg` to a PNG at `path`, scaled by `scale`.
#[cfg(feature = "native-svg")]
pub async fn rasterize_to_file(svg: String, path: PathBuf, scale: f32) -> Result<(), RenderError> {
    let png = tokio::task::spawn_blocking(move || svg_to_png(&svg, scale))
        .await
        .map_err(|e| RenderError::ToolFailed {
            tool: "resvg".into(),
            detail: format!("render task panicked: {e}"),
        })??;
    tokio::fs::write(&path, png).await?;
    Ok(())
}

#[cfg(not(feature = "native-svg"))]
pub async fn rasterize_to_file(_svg: String, _path: PathBuf, _scale: f32) -> Result<(), RenderError> {
    Err(RenderError::ToolMissing {
        tool: "resvg".into(),
    })
}

#[cfg(feature = "native-svg")]
fn svg_to_png(svg: &str, scale: f32) -> Result<Vec<u8>, RenderError> {
    let failed = |detail: String| RenderError::ToolFailed {
        tool: "resvg".into(),
        detail,
    };

    let opts = usvg::Options {
        fontdb: Arc::clone(&*FONT_DB),
        ..Default::default()
    };
    let tree = usvg::Tree::from_str(svg, &opts).map_err(|e| failed(format!("SVG parsing failed: {e}")))?;

    let size = tree.size();
    let width = (size.width() * scale).ceil() as u32;
    let height = (size.height() * scale).ceil() as u32;
    let mut pixmap = tiny_skia::Pixmap::new(width.max(1), height.max(1))
        .ok_or_else(|| failed(format!("cannot allocate {width}x{height} pixmap")))?;
    pixmap.fill(tiny_skia::Color::WHITE);

    resvg::render(&tree, tiny_skia::Transform::from_scale(scale, scale), &mut pixmap.as_mut());
    pixmap
        .encode_png()
        .map_err(|e| failed(format!("PNG encoding failed: {e}")))
}
