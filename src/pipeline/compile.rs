//! PDF compilation: run pandoc with the LaTeX engine, retrying with simpler
//! setups when the engine rejects the full one.
//!
//! ## Tiers
//!
//! | Tier         | Adds |
//! |--------------|------|
//! | `full`       | header.tex, geometry, coloured links, TOC, numbering, template |
//! | `simplified` | header-simple.tex |
//! | `minimal`    | nothing beyond fonts |
//!
//! Every tier passes the CJK fonts, `--listings`, `--pdf-engine` and the
//! resource path, so images resolve the same way in each attempt.

use crate::config::{ConversionConfig, TemplateTier};
use crate::error::Md2PdfError;
use crate::fonts::FontSet;
use crate::output::CompileAttempt;
use crate::pipeline::assemble::Intermediates;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Name of the PDF pandoc writes inside the work directory.
pub const OUTPUT_FILE: &str = "output.pdf";

/// Lines of stderr kept per attempt.
const STDERR_TAIL_LINES: usize = 20;

/// Everything one pandoc invocation needs besides the tier.
#[derive(Debug, Clone)]
pub struct CompileJob<'a> {
    pub files: &'a Intermediates,
    pub fonts: &'a FontSet,
    pub output: PathBuf,
    /// Directories pandoc searches for images, in order.
    pub resource_paths: Vec<PathBuf>,
}

/// Check that pandoc and the PDF engine can be started.
pub async fn check_toolchain(config: &ConversionConfig) -> Result<(), Md2PdfError> {
    require_tool(
        &config.pandoc_path,
        "Install pandoc from https://pandoc.org/installing.html or pass --pandoc <PATH>.",
    )
    .await?;
    require_tool(
        &config.pdf_engine,
        "Install a TeX distribution that provides it (TeX Live, MiKTeX or MacTeX), \
         or choose another engine with --engine.",
    )
    .await?;
    Ok(())
}

async fn require_tool(tool: &str, hint: &str) -> Result<(), Md2PdfError> {
    let missing = || Md2PdfError::ToolchainMissing {
        tool: tool.to_string(),
        hint: hint.to_string(),
    };
    let output = Command::new(tool)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await
        .map_err(|_| missing())?;
    if !output.status.success() {
        return Err(missing());
    }
    let version = String::from_utf8_lossy(&output.stdout);
    debug!("{}: {}", tool, version.lines().next().unwrap_or("").trim());
    Ok(())
}

/// The pandoc arguments for `tier`.
pub fn pandoc_args(tier: TemplateTier, job: &CompileJob<'_>, config: &ConversionConfig) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        job.files.markdown.clone().into(),
        "-o".into(),
        job.output.clone().into(),
        format!("--pdf-engine={}", config.pdf_engine).into(),
    ];

    match tier {
        TemplateTier::Full => {
            args.push("--include-in-header".into());
            args.push(job.files.header.clone().into());
        }
        TemplateTier::Simplified => {
            args.push("--include-in-header".into());
            args.push(job.files.simple_header.clone().into());
        }
        TemplateTier::Minimal => {}
    }

    args.push("-V".into());
    args.push(format!("CJKmainfont={}", job.fonts.serif).into());
    args.push("-V".into());
    args.push(format!("CJKsansfont={}", job.fonts.sans).into());
    args.push("-V".into());
    args.push(format!("CJKmonofont={}", job.fonts.mono).into());

    if tier == TemplateTier::Full {
        args.push("-V".into());
        args.push(format!("geometry:margin={}", config.margin).into());
        args.push("-V".into());
        args.push("colorlinks=true".into());
        if config.toc {
            args.push("--toc".into());
            args.push(format!("--toc-depth={}", config.toc_depth).into());
        }
        if config.number_sections {
            args.push("--number-sections".into());
        }
        if let Some(template) = &job.files.template {
            args.push("--template".into());
            args.push(template.clone().into());
        }
    }

    args.push("--listings".into());
    if let Some(paths) = join_resource_paths(&job.resource_paths) {
        args.push("--resource-path".into());
        args.push(paths);
    }
    args
}

fn join_resource_paths(paths: &[PathBuf]) -> Option<OsString> {
    if paths.is_empty() {
        return None;
    }
    std::env::join_paths(paths).ok()
}

/// Try each configured tier until one produces a PDF.
///
/// Returns the winning tier and every attempt made (the last one succeeded).
pub async fn compile_pdf(
    job: &CompileJob<'_>,
    config: &ConversionConfig,
) -> Result<(TemplateTier, Vec<CompileAttempt>), Md2PdfError> {
    let mut attempts = Vec::new();

    for (i, tier) in config.tiers().into_iter().enumerate() {
        if let Some(ref cb) = config.progress_callback {
            cb.on_compile_start(tier, i + 1);
        }
        let attempt = run_pandoc(tier, job, config).await?;
        let success = attempt.success;
        if success {
            info!("PDF compiled with {} template in {}ms", tier, attempt.duration_ms);
            attempts.push(attempt);
            return Ok((tier, attempts));
        }

        warn!(
            "Compile with {} template failed (exit {:?}): {}",
            tier,
            attempt.exit_code,
            attempt.stderr_tail.lines().last().unwrap_or("")
        );
        if let Some(ref cb) = config.progress_callback {
            cb.on_compile_failed(tier, &attempt.stderr_tail);
        }
        attempts.push(attempt);
    }

    let stderr = attempts
        .last()
        .map(|a| a.stderr_tail.clone())
        .unwrap_or_default();
    Err(Md2PdfError::CompileFailed {
        attempts: attempts.len(),
        stderr,
    })
}

async fn run_pandoc(
    tier: TemplateTier,
    job: &CompileJob<'_>,
    config: &ConversionConfig,
) -> Result<CompileAttempt, Md2PdfError> {
    let args = pandoc_args(tier, job, config);
    debug!("{} {:?}", config.pandoc_path, args);

    // A stale PDF from a failed earlier tier must not count as success.
    let _ = tokio::fs::remove_file(&job.output).await;

    let start = Instant::now();
    let mut cmd = Command::new(&config.pandoc_path);
    cmd.args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let output = cmd
        .output()
        .await
        .map_err(|_| Md2PdfError::ToolchainMissing {
            tool: config.pandoc_path.clone(),
            hint: "pandoc could not be started".into(),
        })?;

    let produced = is_non_empty_file(&job.output).await;
    let stderr = String::from_utf8_lossy(&output.stderr);
    Ok(CompileAttempt {
        tier,
        success: output.status.success() && produced,
        exit_code: output.status.code(),
        stderr_tail: tail(&stderr, STDERR_TAIL_LINES),
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

async fn is_non_empty_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

/// The last `n` non-blank lines of `text`.
pub fn tail(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}
