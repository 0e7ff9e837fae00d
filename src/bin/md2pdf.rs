//! CLI binary for md2pdf.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use md2pdf::{
    convert_to_file, default_output_path, inspect, open_pdf, repair_svg, ConversionConfig,
    ConversionProgressCallback, FontOverrides, ProgressCallback, TemplateTier,
};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(TICKS)
}

fn shorten(msg: &str, max: usize) -> String {
    let line = msg.lines().last().unwrap_or("").trim();
    if line.chars().count() > max {
        let cut: String = line.chars().take(max - 1).collect();
        format!("{cut}\u{2026}")
    } else {
        line.to_string()
    }
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a bar while assets render (they may finish
/// out of order), then a spinner for each compile attempt.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Per-asset wall-clock start times for elapsed reporting.
    start_times: Mutex<HashMap<String, Instant>>,
    /// Count of assets that could not be rendered.
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(spinner_style());
        bar.set_prefix("Preparing");
        bar.set_message("Reading input…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} assets  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Rendering");
    }

    fn elapsed(&self, id: &str) -> String {
        let ms = self
            .start_times
            .lock()
            .unwrap()
            .remove(id)
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);
        format!("{:.1}s", ms as f64 / 1000.0)
    }

    fn abandon(&self) {
        self.bar.finish_and_clear();
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, total_assets: usize) {
        if total_assets == 0 {
            return;
        }
        self.activate_bar(total_assets);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Rendering {total_assets} embedded figure(s)…"))
        ));
    }

    fn on_asset_start(&self, id: &str, _index: usize, _total: usize) {
        self.start_times
            .lock()
            .unwrap()
            .insert(id.to_string(), Instant::now());
        self.bar.set_message(id.to_string());
    }

    fn on_asset_complete(&self, id: &str, renderer: &str) {
        let elapsed = self.elapsed(id);
        self.bar.println(format!(
            "  {} {:<24}  {:<10}  {}",
            green("✓"),
            id,
            dim(renderer),
            dim(&elapsed),
        ));
        self.bar.inc(1);
    }

    fn on_asset_error(&self, id: &str, error: &str) {
        let elapsed = self.elapsed(id);
        self.errors.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} {:<24}  {}  {}",
            red("✗"),
            id,
            red(&shorten(error, 80)),
            dim(&elapsed),
        ));
        self.bar.inc(1);
    }

    fn on_compile_start(&self, tier: TemplateTier, attempt: usize) {
        self.bar.set_style(spinner_style());
        self.bar.set_prefix("Compiling");
        self.bar
            .set_message(format!("{tier} template (attempt {attempt})"));
    }

    fn on_compile_failed(&self, tier: TemplateTier, error: &str) {
        self.bar.println(format!(
            "  {} {} template failed  {}",
            cyan("⚠"),
            tier,
            dim(&shorten(error, 80)),
        ));
    }

    fn on_conversion_complete(&self, output_path: &Path, tier: TemplateTier) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        let note = if failed == 0 {
            String::new()
        } else {
            format!("  ({} figure(s) not rendered)", red(&failed.to_string()))
        };
        eprintln!(
            "{} {}  {}{}",
            green("✔"),
            bold(&output_path.display().to_string()),
            dim(&format!("{tier} template")),
            note
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Basic conversion (writes notes.pdf next to notes.md)
  md2pdf notes.md

  # Choose the output path
  md2pdf notes.md -o build/notes.pdf

  # Convert from URL
  md2pdf https://example.com/docs/guide.md -o guide.pdf

  # Explicit CJK fonts, no table of contents
  md2pdf --cjk-serif "Source Han Serif SC" --cjk-sans "Source Han Sans SC" --no-toc report.md

  # List embedded figures without compiling (no pandoc needed)
  md2pdf --inspect-only chat-export.md

  # Keep intermediates for debugging a LaTeX failure
  md2pdf --work-dir ./md2pdf-work -v notes.md

  # Repair an SVG file and print it
  md2pdf --fix-svg figure.svg > figure-fixed.svg

EMBEDDED FIGURES:
  <chat-artifact id=".." version=".." type="image/svg+xml" title="..">…</chat-artifact>
  <svg>…</svg> and ```svg fences          → Inkscape, resvg, raw SVG
  ```mermaid fences                       → mmdc, npx mermaid-cli, Graphviz, code image
  ![alt](data:image/png;base64,…)         → decoded image file

TEMPLATE FALLBACK:
  full        header.tex, TOC, numbered sections, margins, coloured links
  simplified  reduced header
  minimal     CJK fonts only
  (disable with --no-fallback)

EXTERNAL TOOLS:
  pandoc, xelatex        required
  inkscape               optional, best SVG quality
  mmdc / npx, dot        optional, Mermaid diagrams
  fc-list                optional, CJK font detection on Linux

ENVIRONMENT VARIABLES:
  Every flag can be set with MD2PDF_<FLAG>, e.g. MD2PDF_ENGINE=lualatex.
  RUST_LOG overrides the log filter.
"#;

/// Convert Markdown files and URLs to PDF with pandoc and XeLaTeX.
#[derive(Parser, Debug)]
#[command(
    name = "md2pdf",
    version,
    about = "Convert Markdown files and URLs to PDF with pandoc and XeLaTeX",
    long_about = "Convert Markdown documents (local files or URLs) to PDF through pandoc and a \
LaTeX engine. Embedded SVG, Mermaid diagrams and base64 images are rendered to image files \
first, math delimiters are normalised, and CJK fonts are detected automatically.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local Markdown file path or HTTP/HTTPS URL.
    #[arg(required_unless_present = "fix_svg")]
    input: Option<String>,

    /// Write the PDF here instead of next to the input.
    #[arg(short, long, env = "MD2PDF_OUTPUT")]
    output: Option<PathBuf>,

    /// LaTeX engine passed to pandoc (xelatex, lualatex).
    #[arg(long, env = "MD2PDF_ENGINE", default_value = "xelatex")]
    engine: String,

    /// pandoc executable.
    #[arg(long, env = "MD2PDF_PANDOC", default_value = "pandoc")]
    pandoc: String,

    /// CJK serif (main) font family.
    #[arg(long, env = "MD2PDF_CJK_SERIF")]
    cjk_serif: Option<String>,

    /// CJK sans font family.
    #[arg(long, env = "MD2PDF_CJK_SANS")]
    cjk_sans: Option<String>,

    /// CJK monospace font family.
    #[arg(long, env = "MD2PDF_CJK_MONO")]
    cjk_mono: Option<String>,

    /// Page margin as a TeX dimension.
    #[arg(long, env = "MD2PDF_MARGIN", default_value = "2.5cm")]
    margin: String,

    /// Omit the table of contents.
    #[arg(long, env = "MD2PDF_NO_TOC")]
    no_toc: bool,

    /// Deepest heading level in the table of contents (1–6).
    #[arg(long, env = "MD2PDF_TOC_DEPTH", default_value_t = 3,
          value_parser = clap::value_parser!(u8).range(1..=6))]
    toc_depth: u8,

    /// Do not number section headings.
    #[arg(long, env = "MD2PDF_NO_NUMBER_SECTIONS")]
    no_number_sections: bool,

    /// Fail on the first compile error instead of retrying simpler templates.
    #[arg(long, env = "MD2PDF_NO_FALLBACK")]
    no_fallback: bool,

    /// Use a complete LaTeX template for the first attempt.
    #[arg(long, env = "MD2PDF_STANDALONE_TEMPLATE")]
    standalone_template: bool,

    /// Leave SVG markup as written.
    #[arg(long, env = "MD2PDF_NO_SVG_REPAIR")]
    no_svg_repair: bool,

    /// Leave math delimiters as written.
    #[arg(long, env = "MD2PDF_NO_MATH")]
    no_math: bool,

    /// DPI for Inkscape SVG rasterising (72–1200).
    #[arg(long, env = "MD2PDF_SVG_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=1200))]
    svg_dpi: u32,

    /// Number of figures rendered at the same time.
    #[arg(short, long, env = "MD2PDF_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Keep intermediate files in this directory.
    #[arg(long, env = "MD2PDF_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Print a summary of the document and its figures; do not compile.
    #[arg(long, env = "MD2PDF_INSPECT_ONLY")]
    inspect_only: bool,

    /// Print structured JSON (ConversionOutput / DocumentInfo) on stdout.
    #[arg(long, env = "MD2PDF_JSON")]
    json: bool,

    /// Open the PDF in the system viewer afterwards.
    #[arg(long, env = "MD2PDF_OPEN")]
    open: bool,

    /// Disable progress bar.
    #[arg(long, env = "MD2PDF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "MD2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "MD2PDF_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "MD2PDF_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Time limit for one mermaid-cli run in seconds.
    #[arg(long, env = "MD2PDF_MERMAID_TIMEOUT", default_value_t = 30)]
    mermaid_timeout: u64,

    /// Repair an SVG file and print the result; no conversion.
    #[arg(long, value_name = "FILE", env = "MD2PDF_FIX_SVG")]
    fix_svg: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless --verbose asks for them.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── SVG repair mode ──────────────────────────────────────────────────
    if let Some(ref path) = cli.fix_svg {
        let svg = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read SVG from {:?}", path))?;
        let fixed = repair_svg(&svg);
        match cli.output {
            Some(ref out) => tokio::fs::write(out, fixed)
                .await
                .with_context(|| format!("Failed to write {:?}", out))?,
            None => print!("{fixed}"),
        }
        return Ok(());
    }

    let input = cli
        .input
        .clone()
        .context("An input Markdown file or URL is required")?;

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let info = inspect(&input).await.context("Failed to inspect document")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&info).context("Failed to serialize document info")?
            );
        } else {
            println!("Source:       {}", info.source);
            println!("Size:         {} bytes", info.bytes);
            println!("Words:        {}", info.words);
            println!("Headings:     {}", info.headings);
            println!("Figures:      {}", info.artifacts.len());
            for a in &info.artifacts {
                println!(
                    "  {:<24} {:<28} {:>8} bytes  {}",
                    a.id, a.mime, a.bytes, a.title
                );
            }
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress = show_progress.then(CliProgressCallback::new_dynamic);
    let config = build_config(
        &cli,
        progress
            .clone()
            .map(|cb| cb as Arc<dyn ConversionProgressCallback>),
    )?;

    // ── Run conversion ───────────────────────────────────────────────────
    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&input));

    let output = match convert_to_file(&input, &output_path, &config).await {
        Ok(output) => output,
        Err(e) => {
            if let Some(ref cb) = progress {
                cb.abandon();
            }
            return Err(e).context("Conversion failed");
        }
    };

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if !cli.quiet && !show_progress {
        // The callback already printed its own summary line.
        eprintln!(
            "Wrote {} ({} bytes, {} template) in {}ms",
            output.output_path.display(),
            output.stats.pdf_bytes,
            output.tier,
            output.stats.total_duration_ms
        );
        if output.stats.failed_assets > 0 {
            eprintln!("  {} figure(s) could not be rendered", output.stats.failed_assets);
        }
    }

    if cli.open {
        open_pdf(&output.output_path).context("PDF written but could not be opened")?;
    }

    Ok(())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .pandoc_path(&cli.pandoc)
        .pdf_engine(&cli.engine)
        .fonts(FontOverrides {
            serif: cli.cjk_serif.clone(),
            sans: cli.cjk_sans.clone(),
            mono: cli.cjk_mono.clone(),
        })
        .margin(&cli.margin)
        .toc(!cli.no_toc)
        .toc_depth(cli.toc_depth)
        .number_sections(!cli.no_number_sections)
        .fallback(!cli.no_fallback)
        .standalone_template(cli.standalone_template)
        .repair_svg(!cli.no_svg_repair)
        .preprocess_math(!cli.no_math)
        .svg_dpi(cli.svg_dpi)
        .concurrency(cli.concurrency)
        .download_timeout_secs(cli.download_timeout)
        .mermaid_timeout_secs(cli.mermaid_timeout);

    if let Some(ref dir) = cli.work_dir {
        builder = builder.work_dir(dir);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
