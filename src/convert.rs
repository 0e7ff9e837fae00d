//! Conversion entry points.
//!
//! Every entry point runs the same straight-line pipeline: read the input,
//! cut out embedded figures, render them, write the intermediates into a work
//! directory, compile with pandoc, then move the PDF into place. Only the
//! asset rendering step runs anything concurrently.

use crate::config::ConversionConfig;
use crate::error::Md2PdfError;
use crate::fonts;
use crate::output::{ArtifactSummary, ConversionOutput, ConversionStats, DocumentInfo};
use crate::pipeline::assemble::{self, replace_placeholders};
use crate::pipeline::compile::{self, CompileJob, OUTPUT_FILE};
use crate::pipeline::extract::{self, parse_placeholder, ArtifactKind};
use crate::pipeline::input::{self, ResolvedInput};
use crate::pipeline::render::{self, RenderContext, RendererChain};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Convert a Markdown file or URL to a PDF next to it.
///
/// The output path comes from [`default_output_path`]: the input's file name
/// with a `.pdf` extension, or the URL's last path segment in the current
/// directory.
///
/// # Errors
/// Returns `Err(Md2PdfError)` only for fatal errors:
/// - input missing, unreadable or not UTF-8
/// - pandoc or the PDF engine not installed
/// - every compile attempt failed
///
/// Diagrams that cannot be rendered are not fatal; check
/// `output.stats.failed_assets`.
pub async fn convert(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Md2PdfError> {
    let input_str = input_str.as_ref();
    let output = default_output_path(input_str);
    convert_to_file(input_str, output, config).await
}

/// Convert a Markdown file or URL and write the PDF to `output_path`.
///
/// Missing parent directories of `output_path` are created.
pub async fn convert_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Md2PdfError> {
    let input_str = input_str.as_ref();
    info!("Starting conversion: {}", input_str);
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    run(resolved, output_path.as_ref(), config).await
}

/// Convert Markdown held in memory.
///
/// Relative image links resolve against the current directory.
///
/// # Example
/// ```rust,no_run
/// use md2pdf::{convert_from_str, ConversionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let markdown = "# Report\n\nThe area is $\\pi r^2$.\n";
/// let output = convert_from_str(markdown, "report.pdf", &ConversionConfig::default()).await?;
/// println!("{} bytes", output.stats.pdf_bytes);
/// # Ok(())
/// # }
/// ```
pub async fn convert_from_str(
    markdown: &str,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Md2PdfError> {
    let resolved = ResolvedInput {
        text: markdown.to_string(),
        source: "<string>".to_string(),
        base_dir: std::env::current_dir().ok(),
    };
    run(resolved, output_path.as_ref(), config).await
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Md2PdfError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Md2PdfError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input_str, config))
}

/// List what a document contains without compiling it.
///
/// Does not require pandoc or a TeX installation.
pub async fn inspect(input_str: impl AsRef<str>) -> Result<DocumentInfo, Md2PdfError> {
    let config = ConversionConfig::default();
    let resolved = input::resolve_input(input_str.as_ref(), config.download_timeout_secs).await?;
    let doc = extract::prepare(&resolved.text, &config);

    let body = without_placeholders(&doc.markdown);
    Ok(DocumentInfo {
        source: resolved.source,
        bytes: resolved.text.len(),
        words: body.split_whitespace().count(),
        headings: count_headings(&body),
        artifacts: doc
            .artifacts
            .iter()
            .map(|a| ArtifactSummary {
                id: a.id.clone(),
                kind: a.kind.clone(),
                mime: a.mime.clone(),
                title: a.title.clone(),
                bytes: a.content.len(),
            })
            .collect(),
    })
}

/// Where [`convert`] writes its PDF.
///
/// ```rust
/// use md2pdf::default_output_path;
/// use std::path::PathBuf;
///
/// assert_eq!(default_output_path("notes/todo.md"), PathBuf::from("notes/todo.pdf"));
/// assert_eq!(default_output_path("https://x.org/guide.md"), PathBuf::from("guide.pdf"));
/// ```
pub fn default_output_path(input_str: &str) -> PathBuf {
    if input::is_url(input_str) {
        let stem = input::url_stem(input_str).unwrap_or_else(|| "document".to_string());
        PathBuf::from(stem).with_extension("pdf")
    } else {
        Path::new(input_str).with_extension("pdf")
    }
}

// ── Pipeline ─────────────────────────────────────────────────────────────

async fn run(
    resolved: ResolvedInput,
    output_path: &Path,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Md2PdfError> {
    let total_start = Instant::now();

    // ── Step 1: Toolchain ────────────────────────────────────────────────
    compile::check_toolchain(config).await?;

    // ── Step 2: Extract artifacts ────────────────────────────────────────
    let doc = extract::prepare(&resolved.text, config);
    let total_assets = doc.artifacts.len();
    info!("Found {} embedded artifact(s) in {}", total_assets, resolved.source);
    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_start(doc.renderable_count());
    }

    // ── Step 3: Fonts ────────────────────────────────────────────────────
    let fonts = fonts::resolve(&config.fonts).await;

    // ── Step 4: Work directory ───────────────────────────────────────────
    // The TempDir guard removes the directory when it goes out of scope.
    let (_guard, work_dir) = match &config.work_dir {
        Some(dir) => {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(Md2PdfError::work_dir(dir))?;
            let dir = std::path::absolute(dir).map_err(Md2PdfError::work_dir(dir))?;
            (None, dir)
        }
        None => {
            let tmp = tempfile::Builder::new()
                .prefix("md2pdf-")
                .tempdir()
                .map_err(Md2PdfError::work_dir(std::env::temp_dir()))?;
            let dir = tmp.path().to_path_buf();
            (Some(tmp), dir)
        }
    };
    debug!("Work directory: {}", work_dir.display());

    // ── Step 5: Render assets ────────────────────────────────────────────
    let render_start = Instant::now();
    let chain = RendererChain::default();
    let ctx = RenderContext::new(&work_dir, config, fonts.sans.clone());
    let assets = render::render_assets(&doc, &chain, &ctx, config).await;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;

    // ── Step 6: Assemble ─────────────────────────────────────────────────
    let markdown = replace_placeholders(&doc.markdown, &doc.artifacts, &assets);
    let files = assemble::write_intermediates(&work_dir, &markdown, &fonts, config).await?;

    // ── Step 7: Compile ──────────────────────────────────────────────────
    let mut resource_paths = vec![work_dir.clone()];
    if let Some(base) = resolved.base_dir {
        resource_paths.push(base);
    }
    let job = CompileJob {
        files: &files,
        fonts: &fonts,
        output: work_dir.join(OUTPUT_FILE),
        resource_paths,
    };
    let (tier, attempts) = compile::compile_pdf(&job, config).await?;

    // ── Step 8: Move into place ──────────────────────────────────────────
    let pdf_bytes = move_output(&job.output, output_path).await?;

    // ── Step 9: Stats ────────────────────────────────────────────────────
    let stats = ConversionStats {
        total_assets,
        rendered_assets: assets.iter().filter(|a| a.is_rendered()).count(),
        failed_assets: assets.iter().filter(|a| a.error.is_some()).count(),
        unsupported_assets: assets
            .iter()
            .filter(|a| a.kind == ArtifactKind::Unsupported)
            .count(),
        compile_attempts: attempts.len(),
        pdf_bytes,
        render_duration_ms,
        compile_duration_ms: attempts.iter().map(|a| a.duration_ms).sum(),
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Conversion complete: {} ({} bytes, {} template, {}/{} assets rendered, {}ms)",
        output_path.display(),
        stats.pdf_bytes,
        tier,
        stats.rendered_assets,
        stats.total_assets,
        stats.total_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_complete(output_path, tier);
    }

    Ok(ConversionOutput {
        output_path: output_path.to_path_buf(),
        assets,
        attempts,
        tier,
        stats,
    })
}

/// Move the compiled PDF to `to`, copying when a rename is not possible
/// (different filesystems). Returns the file size.
async fn move_output(from: &Path, to: &Path) -> Result<u64, Md2PdfError> {
    let write_failed = |source| Md2PdfError::OutputWriteFailed {
        path: to.to_path_buf(),
        source,
    };

    if let Some(parent) = to.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
    }

    if let Err(e) = tokio::fs::rename(from, to).await {
        debug!("rename failed ({}), copying instead", e);
        tokio::fs::copy(from, to).await.map_err(write_failed)?;
        if let Err(e) = tokio::fs::remove_file(from).await {
            warn!("Could not remove {}: {}", from.display(), e);
        }
    }

    let meta = tokio::fs::metadata(to).await.map_err(write_failed)?;
    Ok(meta.len())
}

// ── Document statistics ──────────────────────────────────────────────────

static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^ {0,3}#{1,6}(?:\s|$)").unwrap());

fn without_placeholders(markdown: &str) -> String {
    markdown
        .lines()
        .filter(|l| parse_placeholder(l).is_none())
        .collect::<Vec<_>>()
        .join("\n")
}

/// ATX headings outside fenced code blocks.
fn count_headings(markdown: &str) -> usize {
    let mut in_fence = false;
    let mut count = 0;
    for line in markdown.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if !in_fence && RE_HEADING.is_match(line) {
            count += 1;
        }
    }
    count
}
