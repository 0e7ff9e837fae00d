//! Artifact extraction: pull embedded diagrams and images out of Markdown.
//!
//! Chat exports and generated notes embed figures in several shapes:
//! `<chat-artifact>` tags, raw `<svg>` elements, ```` ```svg ```` and
//! ```` ```mermaid ```` fences, and base64 `data:` images. pandoc can use none
//! of them directly, so each one is cut out, stored as an [`Artifact`], and
//! replaced by a placeholder line (`[artifact:<id>]`) that
//! [`crate::pipeline::assemble`] later swaps for an image reference.
//!
//! ## Pass order
//!
//! 1. `<chat-artifact>` tags (they may wrap SVG, so they go first)
//! 2. ```` ```svg ```` fences, then inline `<svg>` elements
//! 3. ```` ```mermaid ```` fences
//! 4. `data:image/...;base64` images (Markdown and `<img>`)
//! 5. math normalisation outside code

use crate::config::ConversionConfig;
use crate::pipeline::svgfix;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

/// MIME type recorded for SVG artifacts.
pub const SVG_MIME: &str = "image/svg+xml";
/// MIME type recorded for Mermaid artifacts.
pub const MERMAID_MIME: &str = "application/vnd.chat.mermaid";

/// What an artifact holds, which decides the renderer chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ArtifactKind {
    Svg,
    Mermaid,
    /// Base64 image data; `format` is the MIME subtype (`png`, `jpeg`, …).
    Raster { format: String },
    /// A `<chat-artifact>` whose type we cannot render.
    Unsupported,
}

impl ArtifactKind {
    /// Map a `<chat-artifact type="…">` value to a kind.
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.trim();
        if mime.eq_ignore_ascii_case(SVG_MIME) {
            ArtifactKind::Svg
        } else if mime.to_ascii_lowercase().ends_with(".mermaid") {
            ArtifactKind::Mermaid
        } else {
            ArtifactKind::Unsupported
        }
    }
}

/// One embedded figure cut out of the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub version: String,
    pub kind: ArtifactKind,
    pub mime: String,
    pub title: String,
    /// Source text (SVG / Mermaid) or base64 payload for rasters.
    pub content: String,
    /// Base name for files written for this artifact. Only ASCII
    /// alphanumerics, `_` and `-`, and unique within the document, so asset
    /// files always land directly in the work directory.
    #[serde(default)]
    pub file_stem: String,
}

/// Map `id` to a file-name-safe stem: every character outside
/// `[A-Za-z0-9_-]` becomes `_`.
pub fn safe_stem(id: &str) -> String {
    let stem: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.trim_matches('_').is_empty() {
        "artifact".to_string()
    } else {
        stem
    }
}

/// The document after extraction.
#[derive(Debug, Clone, Default)]
pub struct PreparedDocument {
    /// Markdown with placeholders in place of artifacts.
    pub markdown: String,
    /// Artifacts in extraction order; ids are unique.
    pub artifacts: Vec<Artifact>,
}

impl PreparedDocument {
    pub fn get(&self, id: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.id == id)
    }

    /// Number of artifacts a renderer will be tried for.
    pub fn renderable_count(&self) -> usize {
        self.artifacts
            .iter()
            .filter(|a| a.kind != ArtifactKind::Unsupported)
            .count()
    }

    /// Store an artifact; a repeated id replaces the earlier one in place
    /// and keeps its file stem.
    fn insert(&mut self, mut artifact: Artifact) {
        if let Some(existing) = self.artifacts.iter_mut().find(|a| a.id == artifact.id) {
            artifact.file_stem = std::mem::take(&mut existing.file_stem);
            *existing = artifact;
            return;
        }
        let base = safe_stem(&artifact.id);
        let mut stem = base.clone();
        let mut n = 1;
        while self.artifacts.iter().any(|a| a.file_stem == stem) {
            stem = format!("{base}_{n}");
            n += 1;
        }
        artifact.file_stem = stem;
        self.artifacts.push(artifact);
    }

    /// Next generated id `<prefix>_<n>` not already used, starting at
    /// `*next`. Returns the id and its number.
    fn generated_id(&self, prefix: &str, next: &mut usize) -> (String, usize) {
        loop {
            let n = *next;
            *next += 1;
            let id = format!("{prefix}_{n}");
            if self.get(&id).is_none() {
                return (id, n);
            }
        }
    }
}

/// The text that replaces an artifact in the Markdown.
pub fn placeholder(id: &str) -> String {
    format!("\n\n[artifact:{id}]\n\n")
}

/// If `line` (trimmed) is a placeholder, return its id.
pub fn parse_placeholder(line: &str) -> Option<&str> {
    line.trim()
        .strip_prefix("[artifact:")
        .and_then(|rest| rest.strip_suffix(']'))
}

/// Run every extraction pass over `text`.
pub fn prepare(text: &str, config: &ConversionConfig) -> PreparedDocument {
    let mut doc = PreparedDocument::default();

    let s = extract_chat_artifacts(text, &mut doc, config.repair_svg);
    let s = extract_svg(&s, &mut doc, config.repair_svg);
    let s = extract_mermaid(&s, &mut doc);
    let s = extract_data_images(&s, &mut doc);
    doc.markdown = if config.preprocess_math {
        preprocess_math(&s)
    } else {
        s
    };
    doc
}

// ── Pass 1: <chat-artifact> ──────────────────────────────────────────────

static RE_CHAT_ARTIFACT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"<chat-artifact\s+id="([^"]+)"\s+version="([^"]+)"\s+type="([^"]+)"\s+title="([^"]+)">([\s\S]*?)</chat-artifact>"#,
    )
    .unwrap()
});

fn extract_chat_artifacts(text: &str, doc: &mut PreparedDocument, repair: bool) -> String {
    RE_CHAT_ARTIFACT
        .replace_all(text, |caps: &Captures| {
            let id = caps[1].to_string();
            let mime = caps[3].to_string();
            let kind = ArtifactKind::from_mime(&mime);
            let mut content = caps[5].trim().to_string();
            if repair && kind == ArtifactKind::Svg {
                content = svgfix::repair_svg(&content);
            }
            doc.insert(Artifact {
                id: id.clone(),
                version: caps[2].to_string(),
                kind,
                mime,
                title: caps[4].to_string(),
                content,
                file_stem: String::new(),
            });
            placeholder(&id)
        })
        .into_owned()
}

// ── Pass 2: SVG ──────────────────────────────────────────────────────────

static RE_SVG_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```svg\s*([\s\S]*?)```").unwrap());
static RE_SVG_INLINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(<svg[\s\S]*?</svg>)").unwrap());
static RE_SVG_TITLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<title>(.*?)</title>").unwrap());

fn extract_svg(text: &str, doc: &mut PreparedDocument, repair: bool) -> String {
    let mut next = doc.artifacts.len();

    let mut store = |svg: &str, doc: &mut PreparedDocument| -> String {
        let svg = if repair {
            svgfix::repair_svg(svg)
        } else {
            svg.to_string()
        };
        let (id, n) = doc.generated_id("inline_svg", &mut next);
        let title = RE_SVG_TITLE
            .captures(&svg)
            .map(|c| c[1].trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| format!("Inline SVG figure {}", n + 1));
        doc.insert(Artifact {
            id: id.clone(),
            version: "1.0".into(),
            kind: ArtifactKind::Svg,
            mime: SVG_MIME.into(),
            title,
            content: svg,
            file_stem: String::new(),
        });
        placeholder(&id)
    };

    // Fences first so the inline pass does not grab the fence's body.
    let fenced = RE_SVG_FENCE.replace_all(text, |caps: &Captures| {
        let body = caps[1].trim();
        if body.starts_with("<svg") && body.ends_with("</svg>") {
            store(body, doc)
        } else {
            caps[0].to_string()
        }
    });

    RE_SVG_INLINE
        .replace_all(&fenced, |caps: &Captures| store(&caps[1], doc))
        .into_owned()
}

// ── Pass 3: Mermaid ──────────────────────────────────────────────────────

static RE_MERMAID_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```mermaid\s*([\s\S]*?)```").unwrap());

/// Human-readable title from a Mermaid source's leading keyword.
pub fn mermaid_title(source: &str) -> &'static str {
    let s = source.trim_start();
    if s.starts_with("sequenceDiagram") {
        "Sequence diagram"
    } else if s.starts_with("classDiagram") {
        "Class diagram"
    } else if s.starts_with("stateDiagram") {
        "State diagram"
    } else if s.starts_with("erDiagram") {
        "ER diagram"
    } else if s.starts_with("gantt") {
        "Gantt chart"
    } else if s.starts_with("pie") {
        "Pie chart"
    } else {
        "Flowchart"
    }
}

fn extract_mermaid(text: &str, doc: &mut PreparedDocument) -> String {
    let mut next = doc.artifacts.len();
    RE_MERMAID_FENCE
        .replace_all(text, |caps: &Captures| {
            let body = caps[1].trim();
            if body.is_empty() {
                return caps[0].to_string();
            }
            let (id, _) = doc.generated_id("inline_mermaid", &mut next);
            doc.insert(Artifact {
                id: id.clone(),
                version: "1.0".into(),
                kind: ArtifactKind::Mermaid,
                mime: MERMAID_MIME.into(),
                title: mermaid_title(body).to_string(),
                content: body.to_string(),
                file_stem: String::new(),
            });
            placeholder(&id)
        })
        .into_owned()
}

// ── Pass 4: data-URI images ──────────────────────────────────────────────

static RE_MD_DATA_IMAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"!\[([^\]]*)\]\(data:image/([A-Za-z0-9.+-]+);base64,([A-Za-z0-9+/=\s]+)\)")
        .unwrap()
});
static RE_HTML_DATA_IMAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<img\b[^>]*?\bsrc="data:image/([A-Za-z0-9.+-]+);base64,([A-Za-z0-9+/=\s]+)"[^>]*>"#)
        .unwrap()
});
static RE_ALT_ATTR: Lazy<Regex> = Lazy::new(|| Regex::new(r#"\balt="([^"]*)""#).unwrap());

fn extract_data_images(text: &str, doc: &mut PreparedDocument) -> String {
    let mut next = doc.artifacts.len();

    let mut store = |alt: &str, format: &str, payload: &str, doc: &mut PreparedDocument| {
        let (id, n) = doc.generated_id("inline_image", &mut next);
        let title = if alt.trim().is_empty() {
            format!("Embedded image {}", n + 1)
        } else {
            alt.trim().to_string()
        };
        let format = format.to_ascii_lowercase();
        doc.insert(Artifact {
            id: id.clone(),
            version: "1.0".into(),
            mime: format!("image/{format}"),
            kind: ArtifactKind::Raster { format },
            title,
            content: payload.chars().filter(|c| !c.is_whitespace()).collect(),
            file_stem: String::new(),
        });
        placeholder(&id)
    };

    let s = RE_MD_DATA_IMAGE.replace_all(text, |caps: &Captures| {
        store(&caps[1], &caps[2], &caps[3], doc)
    });
    RE_HTML_DATA_IMAGE
        .replace_all(&s, |caps: &Captures| {
            let alt = RE_ALT_ATTR
                .captures(&caps[0])
                .map(|c| c[1].to_string())
                .unwrap_or_default();
            store(&alt, &caps[1], &caps[2], doc)
        })
        .into_owned()
}

// ── Pass 5: math normalisation ───────────────────────────────────────────

/// Fenced blocks and inline code spans are copied through untouched.
static RE_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?ms)^```.*?^```[^\n]*$|`[^`\n]+`").unwrap());
static RE_DISPLAY_BRACKETS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\\\[(.+?)\\\]").unwrap());
static RE_INLINE_PARENS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\\\((.+?)\\\)").unwrap());
/// Display math and escaped dollars are matched so they can be skipped.
static RE_DOLLAR_MATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\$\$.+?\$\$|\\\$|\$([^$\n]+)\$").unwrap());

/// Normalise math delimiters so pandoc's `tex_math_dollars` picks them up.
///
/// * `\[ … \]` becomes `$$ … $$` when it spans lines or holds TeX
/// * `\( … \)` becomes `$…$` when it holds TeX
///
/// Escaped brackets around plain text, such as the citation `\[1\]`, are
/// literal brackets in pandoc Markdown and stay as written.
/// * `$ x^2 $` becomes `$x^2$` (pandoc ignores `$` followed by a space);
///   only content that looks like TeX is trimmed so prices such as
///   `$5 and $6` stay prose.
pub fn preprocess_math(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for m in RE_CODE.find_iter(text) {
        out.push_str(&rewrite_math(&text[last..m.start()]));
        out.push_str(m.as_str());
        last = m.end();
    }
    out.push_str(&rewrite_math(&text[last..]));
    out
}

fn rewrite_math(segment: &str) -> String {
    let s = RE_DISPLAY_BRACKETS.replace_all(segment, |caps: &Captures| {
        let inner = &caps[1];
        if looks_like_tex(inner) || inner.contains('\n') {
            format!("$${inner}$$")
        } else {
            caps[0].to_string()
        }
    });
    let s = RE_INLINE_PARENS.replace_all(&s, |caps: &Captures| {
        if looks_like_tex(&caps[1]) {
            format!("${}$", caps[1].trim())
        } else {
            caps[0].to_string()
        }
    });
    RE_DOLLAR_MATH
        .replace_all(&s, |caps: &Captures| match caps.get(1) {
            Some(inner) if looks_like_tex(inner.as_str()) => {
                format!("${}$", inner.as_str().trim())
            }
            _ => caps[0].to_string(),
        })
        .into_owned()
}

fn looks_like_tex(s: &str) -> bool {
    s.contains(['\\', '^', '_', '='])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prep(text: &str) -> PreparedDocument {
        prepare(text, &ConversionConfig::default())
    }

    #[test]
    fn chat_artifact_becomes_placeholder() {
        let text = "Intro\n<chat-artifact id=\"fig-1\" version=\"2\" type=\"image/svg+xml\" title=\"Orbit\">\n<svg><circle r=\"3\"/></svg>\n</chat-artifact>\nOutro";
        let doc = prep(text);
        assert_eq!(doc.artifacts.len(), 1);
        let a = &doc.artifacts[0];
        assert_eq!(a.id, "fig-1");
        assert_eq!(a.version, "2");
        assert_eq!(a.kind, ArtifactKind::Svg);
        assert_eq!(a.title, "Orbit");
        assert_eq!(a.content, "<svg><circle r=\"3\"/></svg>");
        assert!(doc.markdown.contains("\n\n[artifact:fig-1]\n\n"));
        assert!(!doc.markdown.contains("<svg"));
    }

    #[test]
    fn chat_artifact_kinds() {
        assert_eq!(ArtifactKind::from_mime("image/svg+xml"), ArtifactKind::Svg);
        assert_eq!(
            ArtifactKind::from_mime("application/vnd.chat.mermaid"),
            ArtifactKind::Mermaid
        );
        assert_eq!(
            ArtifactKind::from_mime("application/vnd.ant.mermaid"),
            ArtifactKind::Mermaid
        );
        assert_eq!(ArtifactKind::from_mime("text/html"), ArtifactKind::Unsupported);
    }

    #[test]
    fn repeated_chat_artifact_id_keeps_last_version() {
        let text = "<chat-artifact id=\"a\" version=\"1\" type=\"text/plain\" title=\"T\">old</chat-artifact>\n<chat-artifact id=\"a\" version=\"2\" type=\"text/plain\" title=\"T\">new</chat-artifact>";
        let doc = prep(text);
        assert_eq!(doc.artifacts.len(), 1);
        assert_eq!(doc.artifacts[0].content, "new");
        assert_eq!(doc.markdown.matches("[artifact:a]").count(), 2);
    }

    #[test]
    fn svg_ids_continue_after_chat_artifacts() {
        let text = "<chat-artifact id=\"x\" version=\"1\" type=\"text/plain\" title=\"T\">t</chat-artifact>\n\n<svg width=\"10\"><title>Axes</title></svg>\n\n<svg width=\"20\"></svg>";
        let doc = prep(text);
        let ids: Vec<_> = doc.artifacts.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["x", "inline_svg_1", "inline_svg_2"]);
        assert_eq!(doc.get("inline_svg_1").unwrap().title, "Axes");
        assert_eq!(doc.get("inline_svg_2").unwrap().title, "Inline SVG figure 3");
    }

    #[test]
    fn unsafe_chat_artifact_ids_get_safe_file_stems() {
        let text = "<chat-artifact id=\"../escaped\" version=\"1\" type=\"image/svg+xml\" title=\"T\"><svg/></chat-artifact>\n<chat-artifact id=\"__/escaped\" version=\"1\" type=\"image/svg+xml\" title=\"U\"><svg/></chat-artifact>\n<chat-artifact id=\"..\" version=\"1\" type=\"image/svg+xml\" title=\"V\"><svg/></chat-artifact>";
        let doc = prep(text);
        let stems: Vec<_> = doc.artifacts.iter().map(|a| a.file_stem.as_str()).collect();
        assert_eq!(stems, ["___escaped", "___escaped_1", "artifact"]);
        // Placeholders still use the id as written.
        assert!(doc.markdown.contains("[artifact:../escaped]"));
        assert_eq!(doc.get("../escaped").unwrap().file_stem, "___escaped");
    }

    #[test]
    fn safe_stem_keeps_plain_ids() {
        assert_eq!(safe_stem("inline_svg_0"), "inline_svg_0");
        assert_eq!(safe_stem("fig-1"), "fig-1");
        assert_eq!(safe_stem("a b/c"), "a_b_c");
        assert_eq!(safe_stem(""), "artifact");
    }

    #[test]
    fn generated_ids_skip_ids_already_taken() {
        let text = "<chat-artifact id=\"inline_svg_1\" version=\"1\" type=\"text/plain\" title=\"Mine\">t</chat-artifact>\n\n<svg width=\"10\"></svg>";
        let doc = prep(text);
        let ids: Vec<_> = doc.artifacts.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["inline_svg_1", "inline_svg_2"]);
        assert_eq!(doc.get("inline_svg_1").unwrap().title, "Mine");
        assert_eq!(doc.get("inline_svg_1").unwrap().content, "t");
        assert_eq!(doc.markdown.matches("[artifact:inline_svg_1]").count(), 1);
        assert_eq!(doc.renderable_count(), 1);
    }

    #[test]
    fn svg_fence_with_non_svg_body_is_left_alone() {
        let text = "```svg\nnot really svg\n```";
        let doc = prep(text);
        assert!(doc.artifacts.is_empty());
        assert_eq!(doc.markdown, text);
    }

    #[test]
    fn svg_fence_is_extracted_once() {
        let text = "```svg\n<svg viewBox=\"0 0 1 1\"></svg>\n```\n";
        let doc = prep(text);
        assert_eq!(doc.artifacts.len(), 1);
        assert!(!doc.markdown.contains("```"));
    }

    #[test]
    fn mermaid_fence_extracted_with_title() {
        let text = "# Flow\n\n```mermaid\nsequenceDiagram\n  A->>B: hi\n```\n\n```mermaid\n```";
        let doc = prep(text);
        assert_eq!(doc.artifacts.len(), 1);
        let a = &doc.artifacts[0];
        assert_eq!(a.id, "inline_mermaid_0");
        assert_eq!(a.kind, ArtifactKind::Mermaid);
        assert_eq!(a.title, "Sequence diagram");
        assert!(a.content.starts_with("sequenceDiagram"));
        // Empty fence stays in the text.
        assert!(doc.markdown.contains("```mermaid\n```"));
    }

    #[test]
    fn mermaid_titles() {
        assert_eq!(mermaid_title("graph TD\nA-->B"), "Flowchart");
        assert_eq!(mermaid_title("gantt\n"), "Gantt chart");
        assert_eq!(mermaid_title("pie title Pets"), "Pie chart");
        assert_eq!(mermaid_title("journey"), "Flowchart");
    }

    #[test]
    fn data_uri_images_extracted() {
        let text = "![Logo](data:image/png;base64,iVBORw0K\nGgo=)\n<img alt=\"Chart\" src=\"data:image/jpeg;base64,/9j/4AAQ\">";
        let doc = prep(text);
        assert_eq!(doc.artifacts.len(), 2);
        assert_eq!(doc.artifacts[0].title, "Logo");
        assert_eq!(doc.artifacts[0].content, "iVBORw0KGgo=");
        assert_eq!(
            doc.artifacts[0].kind,
            ArtifactKind::Raster { format: "png".into() }
        );
        assert_eq!(doc.artifacts[1].title, "Chart");
        assert_eq!(doc.artifacts[1].mime, "image/jpeg");
    }

    #[test]
    fn placeholder_roundtrip() {
        assert_eq!(parse_placeholder("  [artifact:inline_svg_0]  "), Some("inline_svg_0"));
        assert_eq!(parse_placeholder("[artifact:x"), None);
        assert_eq!(parse_placeholder("text"), None);
    }

    #[test]
    fn math_brackets_become_dollars() {
        assert_eq!(preprocess_math(r"see \[ a^2 + b^2 \] ok"), r"see $$ a^2 + b^2 $$ ok");
        assert_eq!(preprocess_math(r"inline \( x_1 \) here"), r"inline $x_1$ here");
        assert_eq!(preprocess_math("\\[\nE = mc^2\n\\]"), "$$\nE = mc^2\n$$");
    }

    #[test]
    fn escaped_brackets_around_prose_stay_literal() {
        let text = r"See reference \[1\] and \(note\).";
        assert_eq!(preprocess_math(text), text);
        assert_eq!(preprocess_math(r"range \[2-4\]"), r"range \[2-4\]");
    }

    #[test]
    fn math_padded_dollars_trimmed_only_for_tex() {
        assert_eq!(preprocess_math(r"value $ \alpha $ end"), r"value $\alpha$ end");
        assert_eq!(preprocess_math("costs $5 and $6"), "costs $5 and $6");
        assert_eq!(preprocess_math("$$ x = 1 $$"), "$$ x = 1 $$");
        assert_eq!(preprocess_math(r"price \$ 5"), r"price \$ 5");
    }

    #[test]
    fn math_untouched_inside_code() {
        let text = "```latex\n\\[ x \\]\n```\nand `\\( y \\)` but \\( z^2 \\)";
        let out = preprocess_math(text);
        assert!(out.contains("```latex\n\\[ x \\]\n```"));
        assert!(out.contains("`\\( y \\)`"));
        assert!(out.ends_with("but $z^2$"));
    }

    #[test]
    fn math_preprocessing_can_be_disabled() {
        let config = ConversionConfig::builder().preprocess_math(false).build().unwrap();
        let doc = prepare(r"\( x \)", &config);
        assert_eq!(doc.markdown, r"\( x \)");
    }
}
