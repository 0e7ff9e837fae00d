//! End-to-end integration tests for md2pdf.
//!
//! These tests run the real toolchain: pandoc, a LaTeX engine and a CJK
//! font. Each test skips itself when any of them is missing, so the suite
//! passes on machines without a TeX installation.
//!
//! Run with:
//!   cargo test --test e2e -- --nocapture

use md2pdf::{
    convert, convert_from_str, convert_to_file, fonts, inspect, ArtifactKind, ConversionConfig,
    ConversionProgressCallback, Md2PdfError, TemplateTier,
};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

fn tool_runs(tool: &str) -> bool {
    Command::new(tool)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Skip this test unless pandoc, xelatex and a CJK font are installed.
macro_rules! e2e_skip_unless_ready {
    () => {{
        if !tool_runs("pandoc") || !tool_runs("xelatex") {
            println!("SKIP: pandoc and xelatex are required for e2e tests");
            return;
        }
        if fonts::detect_fonts().await.is_none() {
            println!("SKIP: no CJK font installed (try fonts-noto-cjk)");
            return;
        }
    }};
}

fn write_fixture(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("write fixture");
    path
}

fn assert_pdf(path: &Path, context: &str) {
    let bytes = std::fs::read(path)
        .unwrap_or_else(|e| panic!("[{context}] no PDF at {}: {e}", path.display()));
    assert!(
        bytes.starts_with(b"%PDF-"),
        "[{context}] output does not start with a PDF header"
    );
    assert!(bytes.len() > 1000, "[{context}] PDF suspiciously small");
    println!("[{context}] ✓  {} bytes", bytes.len());
}

const PLAIN: &str = "# Report\n\nSome plain text with *emphasis* and a list:\n\n- one\n- two\n\n## Details\n\nMore text.\n";

const WITH_SVG: &str = r#"# Diagram

Below is a figure.

<chat-artifact id="boxes" version="1" type="image/svg+xml" title="Two boxes">
<svg xmlns="http://www.w3.org/2000/svg" width="200" height="100" viewBox="0 0 200 100">
  <rect x="10" y="10" width="80" height="80" fill="steelblue"/>
  <rect x="110" y="10" width="80" height="80" fill="orange"/>
  <line x1="90" y1="50" x2="110"/>
</svg>
</chat-artifact>

After the figure.
"#;

// ── Always-run tests ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_convert_nonexistent_input() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("never.pdf");
    let err = convert_to_file("/definitely/not/a/real/file.md", &out, &ConversionConfig::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Md2PdfError::FileNotFound { .. }));
    assert!(err.to_string().contains("not found"));
    assert!(!out.exists());
}

#[tokio::test]
async fn test_inspect_reports_figures() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(dir.path(), "svg.md", WITH_SVG);

    let info = inspect(path.to_str().unwrap()).await.expect("inspect");
    assert_eq!(info.artifacts.len(), 1);
    assert_eq!(info.artifacts[0].id, "boxes");
    assert_eq!(info.artifacts[0].title, "Two boxes");
    assert_eq!(info.artifacts[0].kind, ArtifactKind::Svg);
    assert_eq!(info.headings, 1);

    let json = serde_json::to_string(&info).expect("serialisable");
    assert!(json.contains("\"type\":\"svg\""));
}

#[test]
fn test_noop_callback_is_send_sync() {
    use md2pdf::NoopProgressCallback;

    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<NoopProgressCallback>();

    let cb: Arc<dyn ConversionProgressCallback> = Arc::new(NoopProgressCallback);
    cb.on_asset_error("inline_svg_0", "no renderer");
}

// ── Conversion tests (need pandoc + xelatex) ─────────────────────────────────

/// A plain document lands next to its input as `<base>.pdf`.
#[tokio::test]
async fn test_convert_default_output_path() {
    e2e_skip_unless_ready!();
    let dir = tempfile::tempdir().unwrap();
    let input = write_fixture(dir.path(), "plain.md", PLAIN);

    let output = convert(input.to_str().unwrap(), &ConversionConfig::default())
        .await
        .expect("conversion should succeed");

    let expected = dir.path().join("plain.pdf");
    assert_eq!(output.output_path, expected);
    assert_pdf(&expected, "default_output");
    assert_eq!(output.stats.total_assets, 0);
    assert!(output.attempts.last().unwrap().success);
}

/// `-o` semantics: the PDF is written exactly where asked, parents created.
#[tokio::test]
async fn test_convert_explicit_output_path() {
    e2e_skip_unless_ready!();
    let dir = tempfile::tempdir().unwrap();
    let input = write_fixture(dir.path(), "plain.md", PLAIN);
    let out = dir.path().join("build/nested/report.pdf");

    let output = convert_to_file(input.to_str().unwrap(), &out, &ConversionConfig::default())
        .await
        .expect("conversion should succeed");

    assert_pdf(&out, "explicit_output");
    assert!(!dir.path().join("plain.pdf").exists());
    assert_eq!(output.stats.pdf_bytes, std::fs::metadata(&out).unwrap().len());
}

/// A document with an embedded SVG tag still produces a PDF, and the
/// figure is rendered when a rasteriser is available.
#[tokio::test]
async fn test_convert_with_embedded_svg() {
    e2e_skip_unless_ready!();
    let dir = tempfile::tempdir().unwrap();
    let input = write_fixture(dir.path(), "svg.md", WITH_SVG);
    let work = dir.path().join("work");

    let config = ConversionConfig::builder()
        .work_dir(&work)
        .build()
        .expect("valid config");
    let output = convert(input.to_str().unwrap(), &config)
        .await
        .expect("conversion should succeed");

    assert_pdf(&output.output_path, "embedded_svg");
    assert_eq!(output.assets.len(), 1);
    if cfg!(feature = "native-svg") {
        assert!(output.assets[0].is_rendered(), "{:?}", output.assets[0]);
        let file = output.assets[0].file.as_deref().unwrap();
        assert!(work.join(file).exists());
    }
    // Intermediates stay in a user-supplied work directory.
    assert!(work.join("document.md").exists());
    assert!(work.join("header.tex").exists());
}

/// Mermaid always yields something: a diagram when mmdc or dot is present,
/// a code image otherwise.
#[tokio::test]
async fn test_convert_with_mermaid() {
    e2e_skip_unless_ready!();
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("flow.pdf");
    let md = "# Flow\n\n```mermaid\ngraph TD\n  A[Start] --> B{Ok?}\n  B -->|yes| C[Done]\n```\n";

    let output = convert_from_str(md, &out, &ConversionConfig::default())
        .await
        .expect("conversion should succeed");

    assert_pdf(&out, "mermaid");
    assert_eq!(output.assets.len(), 1);
    assert_eq!(output.assets[0].kind, ArtifactKind::Mermaid);
    println!("[mermaid] renderer: {:?}", output.assets[0].renderer);
}

/// Events arrive in order: start, one asset, compile attempts, complete.
#[tokio::test]
async fn test_progress_events() {
    e2e_skip_unless_ready!();

    #[derive(Default)]
    struct Recorder {
        assets: AtomicUsize,
        tiers: Mutex<Vec<TemplateTier>>,
        completed: Mutex<Option<PathBuf>>,
    }

    impl ConversionProgressCallback for Recorder {
        fn on_conversion_start(&self, total_assets: usize) {
            self.assets.store(total_assets, Ordering::SeqCst);
        }
        fn on_compile_start(&self, tier: TemplateTier, _attempt: usize) {
            self.tiers.lock().unwrap().push(tier);
        }
        fn on_conversion_complete(&self, output_path: &Path, _tier: TemplateTier) {
            *self.completed.lock().unwrap() = Some(output_path.to_path_buf());
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let input = write_fixture(dir.path(), "svg.md", WITH_SVG);
    let out = dir.path().join("events.pdf");
    let recorder = Arc::new(Recorder::default());
    let config = ConversionConfig::builder()
        .progress_callback(Arc::clone(&recorder) as Arc<dyn ConversionProgressCallback>)
        .build()
        .unwrap();

    let output = convert_to_file(input.to_str().unwrap(), &out, &config)
        .await
        .expect("conversion should succeed");

    assert_eq!(recorder.assets.load(Ordering::SeqCst), 1);
    let tiers = recorder.tiers.lock().unwrap().clone();
    assert_eq!(tiers.first(), Some(&TemplateTier::Full));
    assert_eq!(tiers.last(), Some(&output.tier));
    assert_eq!(recorder.completed.lock().unwrap().as_deref(), Some(out.as_path()));
}
