//! # md2pdf
//!
//! Convert Markdown to PDF with pandoc and a LaTeX engine, including the
//! diagrams and formulas that chat exports and generated notes embed.
//!
//! ## Why this crate?
//!
//! pandoc handles plain Markdown well, but documents copied out of chat tools
//! carry `<chat-artifact>` SVGs, ```` ```mermaid ```` blocks, base64 images
//! and `\[ … \]` math that pandoc either drops or chokes on. This crate cuts
//! those out, turns each into an image file pandoc can include, and retries
//! the compile with simpler LaTeX setups when the first one fails. Layout,
//! fonts and math typesetting stay with pandoc and the TeX engine.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Markdown
//!  │
//!  ├─ 1. Input     read a local file or download from URL
//!  ├─ 2. Extract   cut out SVG / Mermaid / data-URI figures, fix math
//!  ├─ 3. Render    Inkscape / resvg / mmdc / Graphviz fallback chains
//!  ├─ 4. Assemble  image links, LaTeX header, optional template
//!  ├─ 5. Compile   pandoc --pdf-engine=xelatex, full → simplified → minimal
//!  └─ 6. Output    PDF moved into place + per-asset stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use md2pdf::{convert, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::default();
//!     let output = convert("notes.md", &config).await?;
//!     println!("wrote {}", output.output_path.display());
//!     eprintln!("{}/{} diagrams rendered",
//!         output.stats.rendered_assets,
//!         output.stats.total_assets);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature      | Default | Description |
//! |--------------|---------|-------------|
//! | `cli`        | on      | Enables the `md2pdf` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `native-svg` | on      | In-process SVG rasterising with resvg when Inkscape is absent |
//!
//! Disable both when using only the library with an external SVG toolchain:
//! ```toml
//! md2pdf = { version = "0.1", default-features = false }
//! ```
//!
//! ## External tools
//!
//! | Tool | Required | Used for |
//! |------|----------|----------|
//! | `pandoc` | yes | Markdown → LaTeX → PDF |
//! | `xelatex` | yes (or `--engine`) | typesetting with CJK fonts |
//! | `inkscape` | no | best-quality SVG → PNG |
//! | `mmdc` / `npx` | no | Mermaid diagrams |
//! | `dot` | no | Mermaid flowcharts when mmdc is missing |
//! | `fc-list` | no | CJK font detection on Linux |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod fonts;
pub mod open;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder, FontOverrides, TemplateTier};
pub use convert::{convert, convert_from_str, convert_sync, convert_to_file, default_output_path, inspect};
pub use error::{AssetError, Md2PdfError};
pub use fonts::FontSet;
pub use open::open_pdf;
pub use output::{
    ArtifactSummary, AssetResult, CompileAttempt, ConversionOutput, ConversionStats, DocumentInfo,
};
pub use pipeline::extract::{Artifact, ArtifactKind};
pub use pipeline::svgfix::repair_svg;
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
