//! SVG repair before rasterisation.
//!
//! Generated SVG often has two classes of defect that make renderers draw
//! garbage: mangled `<line>` coordinates (a repeated `y1`/`x2` where `y2`
//! belongs, or no `y2` at all) and TeX math written straight into `<text>`
//! elements, which no SVG renderer typesets. [`repair_svg`] fixes the first
//! and rewrites the second into Unicode plus `<tspan>` super/subscripts.
//!
//! The function is pure and total: anything it does not recognise passes
//! through unchanged.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashMap;

static RE_LINE_DUP_Y1: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"x1="([^"]+)"\s+y1="([^"]+)"\s+x2="([^"]+)"\s+y1="([^"]+)"\s+x2="([^"]+)""#)
        .unwrap()
});
static RE_LINE_DUP_X2: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"x1="([^"]+)"\s+y1="([^"]+)"\s+x2="([^"]+)"\s+x2="([^"]+)"\s+y2="([^"]+)""#)
        .unwrap()
});
static RE_LINE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<line\b[^>]*>").unwrap());
static RE_LINE_HEAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^<line\s+x1="[^"]+"\s+y1="([^"]+)"\s+x2="[^"]+""#).unwrap()
});
static RE_HAS_Y2: Lazy<Regex> = Lazy::new(|| Regex::new(r"\by2\s*=").unwrap());

static RE_TEXT: Lazy<Regex> = Lazy::new(|| Regex::new(r"<text([^>]*)>(.*?)</text>").unwrap());
static RE_FORMULA: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$([^$]+?)\$").unwrap());

static RE_BOLD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\(?:mathbf|textbf|boldsymbol)\{([^}]*)\}").unwrap());
static RE_ITALIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\mathit\{([^}]*)\}").unwrap());
static RE_VEC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\(?:vec|overrightarrow|overline)\{([^}]*)\}").unwrap());
static RE_ACCENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\(hat|tilde|bar|dot)\{([^}]*)\}").unwrap());
static RE_TEXT_CMD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\(?:text|mathrm|operatorname)\{([^}]*)\}").unwrap());
static RE_DETERMINANT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\\begin\{vmatrix\}.*?\\end\{vmatrix\}").unwrap());
static RE_MATRIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\\begin\{[pbBV]?matrix\}.*?\\end\{[pbBV]?matrix\}").unwrap()
});
static RE_FRAC: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\[dt]?frac\{([^}]+)\}\{([^}]+)\}").unwrap());
static RE_SQRT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\sqrt\{([^}]+)\}").unwrap());
static RE_COMMAND: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\([A-Za-z]+)").unwrap());
static RE_SUP_GROUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\^\{([^}]+)\}").unwrap());
static RE_SUB_GROUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"_\{([^}]+)\}").unwrap());
static RE_SUP_CHAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\^([A-Za-z0-9*'])").unwrap());
static RE_SUB_CHAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"_([A-Za-z0-9])").unwrap());

static RE_SVG_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"<svg\b[^>]*>").unwrap());

const SUP_OPEN: &str = r#"<tspan baseline-shift="super" font-size="0.8em">"#;
const SUB_OPEN: &str = r#"<tspan baseline-shift="sub" font-size="0.8em">"#;
const FORMULA_OPEN: &str = r#"<tspan font-family="serif" font-style="italic">"#;

const MATH_STYLE: &str = r#"<style type="text/css">
    .math { font-family: 'STIX Two Math', 'Latin Modern Math', serif; }
    .math-italic { font-style: italic; }
    .math-bold { font-weight: bold; }
</style>"#;

/// TeX command name (without backslash) to its Unicode rendering.
static SYMBOLS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    [
        // Greek
        ("alpha", "α"), ("beta", "β"), ("gamma", "γ"), ("Gamma", "Γ"),
        ("delta", "δ"), ("Delta", "Δ"), ("epsilon", "ε"), ("varepsilon", "ε"),
        ("zeta", "ζ"), ("eta", "η"), ("theta", "θ"), ("Theta", "Θ"),
        ("vartheta", "ϑ"), ("iota", "ι"), ("kappa", "κ"), ("lambda", "λ"),
        ("Lambda", "Λ"), ("mu", "μ"), ("nu", "ν"), ("xi", "ξ"), ("Xi", "Ξ"),
        ("pi", "π"), ("Pi", "Π"), ("rho", "ρ"), ("varrho", "ϱ"),
        ("sigma", "σ"), ("Sigma", "Σ"), ("tau", "τ"), ("upsilon", "υ"),
        ("Upsilon", "Υ"), ("phi", "φ"), ("Phi", "Φ"), ("varphi", "φ"),
        ("chi", "χ"), ("psi", "ψ"), ("Psi", "Ψ"), ("omega", "ω"),
        ("Omega", "Ω"),
        // Relations and operators
        ("infty", "∞"), ("pm", "±"), ("mp", "∓"), ("approx", "≈"),
        ("sim", "∼"), ("simeq", "≃"), ("cong", "≅"), ("equiv", "≡"),
        ("neq", "≠"), ("ne", "≠"), ("leq", "≤"), ("le", "≤"), ("geq", "≥"),
        ("ge", "≥"), ("ll", "≪"), ("gg", "≫"), ("propto", "∝"),
        ("subset", "⊂"), ("supset", "⊃"), ("subseteq", "⊆"),
        ("supseteq", "⊇"), ("cup", "∪"), ("cap", "∩"), ("emptyset", "∅"),
        ("in", "∈"), ("notin", "∉"), ("cdot", "·"), ("times", "×"),
        ("div", "÷"), ("circ", "∘"), ("bullet", "•"), ("oplus", "⊕"),
        ("otimes", "⊗"), ("perp", "⊥"), ("parallel", "∥"), ("forall", "∀"),
        ("exists", "∃"), ("nexists", "∄"), ("therefore", "∴"),
        ("because", "∵"), ("neg", "¬"), ("land", "∧"), ("lor", "∨"),
        ("wedge", "∧"), ("vee", "∨"), ("dagger", "†"),
        // Arrows
        ("leftarrow", "←"), ("rightarrow", "→"), ("to", "→"),
        ("gets", "←"), ("leftrightarrow", "↔"), ("Rightarrow", "⇒"),
        ("Leftarrow", "⇐"), ("Leftrightarrow", "⇔"), ("iff", "⇔"),
        ("implies", "⇒"), ("mapsto", "↦"), ("uparrow", "↑"),
        ("downarrow", "↓"), ("updownarrow", "↕"), ("Uparrow", "⇑"),
        ("Downarrow", "⇓"), ("Updownarrow", "⇕"),
        // Dots and misc
        ("ldots", "…"), ("dots", "…"), ("cdots", "⋯"), ("vdots", "⋮"),
        ("ddots", "⋱"), ("square", "□"), ("checkmark", "✓"),
        ("nabla", "∇"), ("partial", "∂"), ("prime", "′"), ("hbar", "ℏ"),
        ("ell", "ℓ"), ("Re", "ℜ"), ("Im", "ℑ"), ("aleph", "ℵ"),
        ("langle", "⟨"), ("rangle", "⟩"), ("lfloor", "⌊"), ("rfloor", "⌋"),
        ("lceil", "⌈"), ("rceil", "⌉"), ("degree", "°"),
        // Big operators
        ("int", "∫"), ("iint", "∬"), ("iiint", "∭"), ("oint", "∮"),
        ("sum", "∑"), ("prod", "∏"), ("coprod", "∐"),
        // Function names print upright as plain words
        ("sin", "sin"), ("cos", "cos"), ("tan", "tan"), ("log", "log"),
        ("ln", "ln"), ("exp", "exp"), ("lim", "lim"), ("max", "max"),
        ("min", "min"), ("det", "det"),
        // Sizing and spacing vanish
        ("left", ""), ("right", ""), ("big", ""), ("Big", ""),
        ("bigg", ""), ("Bigg", ""), ("displaystyle", ""),
        ("quad", " "), ("qquad", "  "),
    ]
    .into_iter()
    .collect()
});

/// Repair an SVG document. Returns the input unchanged when nothing applies.
pub fn repair_svg(svg: &str) -> String {
    let fixed = fix_line_attributes(svg);
    let fixed = RE_TEXT
        .replace_all(&fixed, |caps: &Captures| {
            let content = &caps[2];
            if !content.contains('$') {
                return caps[0].to_string();
            }
            format!("<text{}>{}</text>", &caps[1], rewrite_text_content(content))
        })
        .into_owned();

    if has_advanced_math(svg) {
        inject_math_style(&fixed)
    } else {
        fixed
    }
}

fn fix_line_attributes(svg: &str) -> String {
    let s = RE_LINE_DUP_Y1.replace_all(svg, r#"x1="$1" y1="$2" x2="$3" y2="$4""#);
    let s = RE_LINE_DUP_X2.replace_all(&s, r#"x1="$1" y1="$2" x2="$3" y2="$5""#);
    RE_LINE_TAG
        .replace_all(&s, |caps: &Captures| {
            let tag = &caps[0];
            if RE_HAS_Y2.is_match(tag) {
                return tag.to_string();
            }
            match RE_LINE_HEAD.captures(tag) {
                // A missing y2 is read as a horizontal line.
                Some(head) => {
                    let end = head.get(0).map_or(0, |m| m.end());
                    format!(r#"{} y2="{}"{}"#, &tag[..end], &head[1], &tag[end..])
                }
                None => tag.to_string(),
            }
        })
        .into_owned()
}

/// Rewrite every `$…$` formula inside one `<text>` body.
fn rewrite_text_content(content: &str) -> String {
    let rewritten = RE_FORMULA
        .replace_all(content, |caps: &Captures| {
            format!("{FORMULA_OPEN}{}</tspan>", tex_to_svg_text(&caps[1]))
        })
        .into_owned();
    let rewritten = rewritten.replace('²', &format!("{SUP_OPEN}2</tspan>"));
    let rewritten = rewritten.replace('³', &format!("{SUP_OPEN}3</tspan>"));

    if rewritten.matches("<tspan").count() != rewritten.matches("</tspan>").count() {
        tracing::debug!("Unbalanced <tspan> after TeX rewrite; keeping original text");
        return content.to_string();
    }
    rewritten
}

/// Translate one TeX formula into SVG text with `<tspan>` markup.
pub fn tex_to_svg_text(formula: &str) -> String {
    let s = RE_TEXT_CMD.replace_all(formula, "$1");
    let s = RE_BOLD.replace_all(&s, r#"<tspan font-weight="bold">$1</tspan>"#);
    let s = RE_ITALIC.replace_all(&s, r#"<tspan font-style="italic">$1</tspan>"#);
    let s = RE_VEC.replace_all(&s, r#"<tspan text-decoration="overline">$1</tspan>"#);
    let s = RE_ACCENT.replace_all(&s, |caps: &Captures| {
        let mark = match &caps[1] {
            "hat" => '\u{0302}',
            "tilde" => '\u{0303}',
            "bar" => '\u{0304}',
            _ => '\u{0307}',
        };
        format!("{}{mark}", &caps[2])
    });
    let s = RE_DETERMINANT.replace_all(&s, "|det|");
    let s = RE_MATRIX.replace_all(&s, "[matrix]");
    let s = RE_FRAC.replace_all(&s, "($1)/($2)");
    let s = RE_SQRT.replace_all(&s, "√($1)");
    let s = s
        .replace(r"\{", "{")
        .replace(r"\}", "}")
        .replace(r"\;", " ")
        .replace(r"\,", " ")
        .replace(r"\!", "");
    let s = RE_COMMAND.replace_all(&s, |caps: &Captures| match SYMBOLS.get(&caps[1]) {
        Some(sym) => (*sym).to_string(),
        None => caps[0].to_string(),
    });
    let s = RE_SUP_GROUP.replace_all(&s, format!("{SUP_OPEN}$1</tspan>").as_str());
    let s = RE_SUB_GROUP.replace_all(&s, format!("{SUB_OPEN}$1</tspan>").as_str());
    let s = RE_SUP_CHAR.replace_all(&s, format!("{SUP_OPEN}$1</tspan>").as_str());
    RE_SUB_CHAR
        .replace_all(&s, format!("{SUB_OPEN}$1</tspan>").as_str())
        .into_owned()
}

fn has_advanced_math(svg: &str) -> bool {
    svg.contains(r"\begin{align}") || svg.contains(r"\begin{matrix}") || svg.contains(r"\frac{")
}

fn inject_math_style(svg: &str) -> String {
    if let Some(pos) = svg.find("</defs>") {
        let mut out = String::with_capacity(svg.len() + MATH_STYLE.len() + 1);
        out.push_str(&svg[..pos]);
        out.push_str(MATH_STYLE);
        out.push('\n');
        out.push_str(&svg[pos..]);
        return out;
    }
    match RE_SVG_OPEN.find(svg) {
        Some(open) => format!(
            "{}\n<defs>{MATH_STYLE}</defs>{}",
            &svg[..open.end()],
            &svg[open.end()..]
        ),
        None => svg.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_svg_is_untouched() {
        let svg = r#"<svg width="10"><circle r="3"/><text x="1">Hello</text></svg>"#;
        assert_eq!(repair_svg(svg), svg);
    }

    #[test]
    fn duplicate_y1_becomes_y2() {
        let svg = r#"<line x1="50" y1="320" x2="650" y1="320" x2="650"/>"#;
        assert_eq!(
            repair_svg(svg),
            r#"<line x1="50" y1="320" x2="650" y2="320"/>"#
        );
    }

    #[test]
    fn duplicate_x2_collapses() {
        let svg = r#"<line x1="50" y1="320" x2="650" x2="650" y2="300"/>"#;
        assert_eq!(
            repair_svg(svg),
            r#"<line x1="50" y1="320" x2="650" y2="300"/>"#
        );
    }

    #[test]
    fn missing_y2_copies_y1() {
        let svg = r#"<line x1="0" y1="40" x2="100" stroke="black"/>"#;
        assert_eq!(
            repair_svg(svg),
            r#"<line x1="0" y1="40" x2="100" y2="40" stroke="black"/>"#
        );
    }

    #[test]
    fn complete_line_untouched() {
        let svg = r#"<line x1="0" y1="40" x2="100" y2="10"/>"#;
        assert_eq!(repair_svg(svg), svg);
    }

    #[test]
    fn greek_and_relations() {
        assert_eq!(tex_to_svg_text(r"\alpha \leq \beta"), "α ≤ β");
        assert_eq!(tex_to_svg_text(r"x \in S"), "x ∈ S");
        assert_eq!(tex_to_svg_text(r"\int f"), "∫ f");
        assert_eq!(tex_to_svg_text(r"\infty"), "∞");
        assert_eq!(tex_to_svg_text(r"\unknown"), r"\unknown");
    }

    #[test]
    fn fractions_and_scripts() {
        assert_eq!(tex_to_svg_text(r"\frac{a}{b}"), "(a)/(b)");
        assert_eq!(
            tex_to_svg_text("x^2"),
            format!("x{SUP_OPEN}2</tspan>")
        );
        assert_eq!(
            tex_to_svg_text("a_{ij}"),
            format!("a{SUB_OPEN}ij</tspan>")
        );
    }

    #[test]
    fn text_and_matrices() {
        assert_eq!(tex_to_svg_text(r"\text{rate} = 1"), "rate = 1");
        assert_eq!(
            tex_to_svg_text(r"\begin{pmatrix}1 & 0\\0 & 1\end{pmatrix}"),
            "[matrix]"
        );
        assert_eq!(tex_to_svg_text(r"\left( x \right)"), "( x )");
    }

    #[test]
    fn text_formula_is_wrapped() {
        let svg = r#"<svg><text x="5">Energy $E = mc^2$ here</text></svg>"#;
        let out = repair_svg(svg);
        assert!(out.contains(FORMULA_OPEN), "{out}");
        assert!(out.contains("Energy "));
        assert!(out.contains(" here</text>"));
        assert!(!out.contains('$'));
        assert_eq!(out.matches("<tspan").count(), out.matches("</tspan>").count());
    }

    #[test]
    fn text_without_dollar_untouched() {
        let svg = r#"<svg><text>x^2 and a_b</text></svg>"#;
        assert_eq!(repair_svg(svg), svg);
    }

    #[test]
    fn math_style_into_existing_defs() {
        let svg = r#"<svg><defs><marker id="m"/></defs><text>$\frac{1}{2}$</text></svg>"#;
        let out = repair_svg(svg);
        assert!(out.contains(".math {"));
        let style = out.find("<style").unwrap();
        let defs_end = out.find("</defs>").unwrap();
        assert!(style < defs_end);
        assert_eq!(out.matches("<defs>").count(), 1);
    }

    #[test]
    fn math_style_creates_defs() {
        let svg = r#"<svg width="1"><text>$\frac{1}{2}$</text></svg>"#;
        let out = repair_svg(svg);
        assert!(out.starts_with("<svg width=\"1\">\n<defs><style"));
    }
}
