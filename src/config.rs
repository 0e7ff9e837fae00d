//! Configuration types for Markdown-to-PDF conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. Every knob lives in one struct so a
//! run can be logged or diffed against another in one place.

use crate::error::Md2PdfError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Configuration for a Markdown-to-PDF conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use md2pdf::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .pdf_engine("lualatex")
///     .toc(false)
///     .margin("2cm")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// pandoc executable name or path. Default: `pandoc`.
    pub pandoc_path: String,

    /// LaTeX engine passed to `--pdf-engine`. Default: `xelatex`.
    ///
    /// The headers rely on `fontspec`/`xeCJK`, so only XeLaTeX and LuaLaTeX
    /// produce good results with CJK text.
    pub pdf_engine: String,

    /// Explicit CJK font choices. Unset fields are filled in by
    /// [`crate::fonts::detect_fonts`].
    pub fonts: FontOverrides,

    /// Page margin handed to the `geometry` package. Default: `2.5cm`.
    pub margin: String,

    /// Emit a table of contents. Default: true.
    pub toc: bool,

    /// Deepest heading level in the table of contents (1–6). Default: 3.
    pub toc_depth: u8,

    /// Number section headings. Default: true.
    pub number_sections: bool,

    /// Retry the compile with progressively simpler templates when the full
    /// template fails. Default: true.
    pub fallback: bool,

    /// Pass a complete LaTeX template (`--template`) on the first attempt
    /// instead of relying on pandoc's default template. Default: false.
    pub standalone_template: bool,

    /// Repair common SVG mistakes and rewrite LaTeX inside `<text>` before
    /// rendering. Default: true.
    pub repair_svg: bool,

    /// Normalise `\[…\]`, `\(…\)` and padded `$ … $` math. Default: true.
    pub preprocess_math: bool,

    /// DPI used when Inkscape rasterises SVG assets (72–1200). Default: 300.
    pub svg_dpi: u32,

    /// Scale factor for the in-process SVG rasteriser. Default: 2.0.
    pub raster_scale: f32,

    /// Number of assets rendered at the same time. Default: 4.
    pub concurrency: usize,

    /// Time limit for one mermaid-cli invocation in seconds. Default: 30.
    pub mermaid_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Use this directory for intermediate files and keep it afterwards.
    /// When `None` a temporary directory is created and removed.
    pub work_dir: Option<PathBuf>,

    /// Optional progress callback for per-asset and per-attempt events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            pandoc_path: "pandoc".to_string(),
            pdf_engine: "xelatex".to_string(),
            fonts: FontOverrides::default(),
            margin: "2.5cm".to_string(),
            toc: true,
            toc_depth: 3,
            number_sections: true,
            fallback: true,
            standalone_template: false,
            repair_svg: true,
            preprocess_math: true,
            svg_dpi: 300,
            raster_scale: 2.0,
            concurrency: 4,
            mermaid_timeout_secs: 30,
            download_timeout_secs: 120,
            work_dir: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("pandoc_path", &self.pandoc_path)
            .field("pdf_engine", &self.pdf_engine)
            .field("fonts", &self.fonts)
            .field("margin", &self.margin)
            .field("toc", &self.toc)
            .field("toc_depth", &self.toc_depth)
            .field("number_sections", &self.number_sections)
            .field("fallback", &self.fallback)
            .field("standalone_template", &self.standalone_template)
            .field("repair_svg", &self.repair_svg)
            .field("preprocess_math", &self.preprocess_math)
            .field("svg_dpi", &self.svg_dpi)
            .field("concurrency", &self.concurrency)
            .field("work_dir", &self.work_dir)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Template tiers tried in order by the compile stage.
    pub fn tiers(&self) -> Vec<TemplateTier> {
        if self.fallback {
            TemplateTier::ALL.to_vec()
        } else {
            vec![TemplateTier::Full]
        }
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn pandoc_path(mut self, path: impl Into<String>) -> Self {
        self.config.pandoc_path = path.into();
        self
    }

    pub fn pdf_engine(mut self, engine: impl Into<String>) -> Self {
        self.config.pdf_engine = engine.into();
        self
    }

    pub fn fonts(mut self, fonts: FontOverrides) -> Self {
        self.config.fonts = fonts;
        self
    }

    pub fn margin(mut self, margin: impl Into<String>) -> Self {
        self.config.margin = margin.into();
        self
    }

    pub fn toc(mut self, v: bool) -> Self {
        self.config.toc = v;
        self
    }

    pub fn toc_depth(mut self, depth: u8) -> Self {
        self.config.toc_depth = depth.clamp(1, 6);
        self
    }

    pub fn number_sections(mut self, v: bool) -> Self {
        self.config.number_sections = v;
        self
    }

    pub fn fallback(mut self, v: bool) -> Self {
        self.config.fallback = v;
        self
    }

    pub fn standalone_template(mut self, v: bool) -> Self {
        self.config.standalone_template = v;
        self
    }

    pub fn repair_svg(mut self, v: bool) -> Self {
        self.config.repair_svg = v;
        self
    }

    pub fn preprocess_math(mut self, v: bool) -> Self {
        self.config.preprocess_math = v;
        self
    }

    pub fn svg_dpi(mut self, dpi: u32) -> Self {
        self.config.svg_dpi = dpi.clamp(72, 1200);
        self
    }

    pub fn raster_scale(mut self, scale: f32) -> Self {
        self.config.raster_scale = scale.clamp(0.5, 8.0);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn mermaid_timeout_secs(mut self, secs: u64) -> Self {
        self.config.mermaid_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = Some(dir.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Md2PdfError> {
        let c = &self.config;
        if c.pandoc_path.trim().is_empty() {
            return Err(Md2PdfError::InvalidConfig(
                "pandoc path must not be empty".into(),
            ));
        }
        if c.pdf_engine.trim().is_empty() {
            return Err(Md2PdfError::InvalidConfig(
                "PDF engine must not be empty".into(),
            ));
        }
        if c.margin.trim().is_empty() || c.margin.contains(char::is_whitespace) {
            return Err(Md2PdfError::InvalidConfig(format!(
                "Margin must be a single TeX dimension such as 2.5cm, got {:?}",
                c.margin
            )));
        }
        if c.mermaid_timeout_secs == 0 {
            return Err(Md2PdfError::InvalidConfig(
                "Mermaid timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums & small types ──────────────────────────────────────────────────

/// How much of the custom LaTeX setup a compile attempt uses.
///
/// The first attempt carries the full math header, table of contents and
/// numbering. When the engine rejects it (a missing package, a clash with a
/// document's own macros) the next tier drops most of the header, and the
/// last tier passes nothing but fonts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateTier {
    /// Full header, TOC, numbered sections, geometry, coloured links.
    Full,
    /// Reduced header with basic math packages and listings colours.
    Simplified,
    /// No header at all; fonts and listings only.
    Minimal,
}

impl TemplateTier {
    /// Every tier, in the order they are attempted.
    pub const ALL: [TemplateTier; 3] = [
        TemplateTier::Full,
        TemplateTier::Simplified,
        TemplateTier::Minimal,
    ];
}

impl fmt::Display for TemplateTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TemplateTier::Full => "full",
            TemplateTier::Simplified => "simplified",
            TemplateTier::Minimal => "minimal",
        };
        f.write_str(s)
    }
}

/// User-chosen CJK fonts; `None` means "detect".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontOverrides {
    pub serif: Option<String>,
    pub sans: Option<String>,
    pub mono: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = ConversionConfig::default();
        assert_eq!(c.pandoc_path, "pandoc");
        assert_eq!(c.pdf_engine, "xelatex");
        assert_eq!(c.margin, "2.5cm");
        assert_eq!(c.toc_depth, 3);
        assert!(c.toc && c.number_sections && c.fallback);
        assert_eq!(c.svg_dpi, 300);
        assert_eq!(c.mermaid_timeout_secs, 30);
    }

    #[test]
    fn builder_clamps_values() {
        let c = ConversionConfig::builder()
            .toc_depth(9)
            .svg_dpi(10)
            .concurrency(0)
            .build()
            .unwrap();
        assert_eq!(c.toc_depth, 6);
        assert_eq!(c.svg_dpi, 72);
        assert_eq!(c.concurrency, 1);
    }

    #[test]
    fn builder_rejects_empty_engine() {
        let err = ConversionConfig::builder().pdf_engine(" ").build().unwrap_err();
        assert!(err.to_string().contains("engine"));
    }

    #[test]
    fn builder_rejects_bad_margin() {
        assert!(ConversionConfig::builder().margin("2 cm").build().is_err());
        assert!(ConversionConfig::builder().margin("20mm").build().is_ok());
    }

    #[test]
    fn tiers_respect_fallback_flag() {
        let with = ConversionConfig::default();
        assert_eq!(with.tiers(), TemplateTier::ALL.to_vec());

        let without = ConversionConfig::builder().fallback(false).build().unwrap();
        assert_eq!(without.tiers(), vec![TemplateTier::Full]);
    }

    #[test]
    fn tier_display_and_serde() {
        assert_eq!(TemplateTier::Simplified.to_string(), "simplified");
        let json = serde_json::to_string(&TemplateTier::Minimal).unwrap();
        assert_eq!(json, "\"minimal\"");
    }
}
