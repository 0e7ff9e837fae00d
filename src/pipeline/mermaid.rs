//! Mermaid helpers: source normalisation, a flowchart → Graphviz DOT
//! translator, and a plain code-listing SVG for when nothing can draw the
//! diagram.
//!
//! The DOT translator covers the flowchart subset that generated documents
//! use in practice: node shapes, the four common edge operators, edge labels
//! and `style … fill:` overrides. Anything else (subgraphs, click handlers,
//! class definitions) is skipped.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::fmt::Write as _;

/// Listings longer than this are truncated in [`code_image_svg`].
pub const CODE_IMAGE_MAX_LINES: usize = 30;
const CODE_IMAGE_KEEP_LINES: usize = 27;
const CODE_IMAGE_WIDTH: usize = 800;
const CODE_IMAGE_LINE_HEIGHT: usize = 24;

/// Rewrite the legacy `graph ` header to `flowchart `.
pub fn normalize_source(source: &str) -> String {
    let source = source.trim();
    match source.strip_prefix("graph ") {
        Some(rest) => format!("flowchart {rest}"),
        None => source.to_string(),
    }
}

/// True when `source` declares a flowchart (`flowchart` or `graph`).
pub fn is_flowchart(source: &str) -> bool {
    let first = source.trim_start().split_whitespace().next().unwrap_or("");
    first == "flowchart" || first == "graph"
}

// ── Flowchart model ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Box,
    Rounded,
    Circle,
    Hexagon,
    Diamond,
    Plain,
}

impl Shape {
    /// `(dot shape, style, default fill)`.
    fn attrs(self) -> (&'static str, &'static str, &'static str) {
        match self {
            Shape::Box => ("box", "filled,rounded", "lightblue"),
            Shape::Rounded => ("box", "filled,rounded", "lightgreen"),
            Shape::Circle => ("circle", "filled", "lightblue"),
            Shape::Hexagon => ("hexagon", "filled", "lightpink"),
            Shape::Diamond => ("diamond", "filled", "lightyellow"),
            Shape::Plain => ("plaintext", "", "white"),
        }
    }
}

#[derive(Debug, Clone)]
struct Node {
    id: String,
    label: String,
    shape: Shape,
    fill: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EdgeStyle {
    Arrow,
    Open,
    Dotted,
    Thick,
}

#[derive(Debug, Clone)]
struct Edge {
    from: String,
    to: String,
    label: Option<String>,
    style: EdgeStyle,
}

#[derive(Debug, Default)]
struct Flowchart {
    direction: &'static str,
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
    edges: Vec<Edge>,
}

impl Flowchart {
    /// Register a node. An explicit shape always wins over an earlier bare
    /// reference; a bare reference never downgrades a defined node.
    fn define(&mut self, id: &str, label: Option<String>, shape: Shape) {
        match self.index.get(id) {
            Some(&i) => {
                if let Some(label) = label {
                    self.nodes[i].label = label;
                    self.nodes[i].shape = shape;
                }
            }
            None => {
                self.index.insert(id.to_string(), self.nodes.len());
                self.nodes.push(Node {
                    id: id.to_string(),
                    label: label.unwrap_or_else(|| id.to_string()),
                    shape,
                    fill: None,
                });
            }
        }
    }
}

static RE_EDGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\s*(?:--\s+([^-|>][^|>]*?)\s+(-{2,}>)|(-{2,}>|-{3,}|-\.+->|={2,}>|-\.+-)(?:\s*\|([^|]*)\|)?)\s*",
    )
    .unwrap()
});
static RE_NODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([A-Za-z0-9_]+)\s*(.*)$").unwrap());
static RE_FILL: Lazy<Regex> = Lazy::new(|| Regex::new(r"fill:\s*(#[0-9a-fA-F]{3,8})").unwrap());
static RE_BR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());

/// Translate a Mermaid flowchart into Graphviz DOT.
///
/// `font` is used for node and edge labels so CJK text renders. Returns
/// `None` when the source is not a flowchart or declares no nodes.
pub fn flowchart_to_dot(source: &str, font: &str) -> Option<String> {
    let source = normalize_source(source);
    if !is_flowchart(&source) {
        return None;
    }
    let chart = parse_flowchart(&source);
    if chart.nodes.is_empty() {
        return None;
    }
    Some(render_dot(&chart, font))
}

fn parse_flowchart(source: &str) -> Flowchart {
    let mut lines = source.lines();
    let header = lines.next().unwrap_or("");
    let mut chart = Flowchart {
        direction: direction_of(header),
        ..Default::default()
    };
    let mut styles: Vec<(String, String)> = Vec::new();

    for line in lines {
        let line = line.trim().trim_end_matches(';');
        if line.is_empty() || is_ignored_statement(line) {
            continue;
        }
        if let Some(rest) = line.strip_prefix("style ") {
            if let Some((id, css)) = rest.trim().split_once(char::is_whitespace) {
                if let Some(fill) = RE_FILL.captures(css) {
                    styles.push((id.to_string(), fill[1].to_string()));
                }
            }
            continue;
        }
        parse_statement(line, &mut chart);
    }

    for (id, fill) in styles {
        if let Some(&i) = chart.index.get(&id) {
            chart.nodes[i].fill = Some(fill);
        }
    }
    chart
}

fn direction_of(header: &str) -> &'static str {
    match header.split_whitespace().nth(1) {
        Some("LR") => "LR",
        Some("RL") => "RL",
        Some("BT") => "BT",
        _ => "TB",
    }
}

fn is_ignored_statement(line: &str) -> bool {
    const SKIP: [&str; 7] = ["%%", "subgraph", "classDef", "class ", "linkStyle", "click ", "direction "];
    line == "end" || SKIP.iter().any(|p| line.starts_with(p))
}

/// One statement: a node definition or a chain `A --> B -- x --> C`.
fn parse_statement(line: &str, chart: &mut Flowchart) {
    let mut groups: Vec<Vec<String>> = Vec::new();
    let mut links: Vec<(Option<String>, EdgeStyle)> = Vec::new();
    let mut last = 0;

    for caps in RE_EDGE.captures_iter(line) {
        let Some(m) = caps.get(0) else { continue };
        groups.push(parse_node_group(&line[last..m.start()], chart));
        last = m.end();

        let (op, label) = match (caps.get(2), caps.get(3)) {
            (Some(op), _) => (op.as_str(), caps.get(1)),
            (None, Some(op)) => (op.as_str(), caps.get(4)),
            (None, None) => continue,
        };
        let label = label
            .map(|l| clean_label(l.as_str()))
            .filter(|l| !l.is_empty());
        links.push((label, edge_style(op)));
    }
    groups.push(parse_node_group(&line[last..], chart));

    for (i, (label, style)) in links.into_iter().enumerate() {
        let (Some(from), Some(to)) = (groups.get(i), groups.get(i + 1)) else {
            break;
        };
        for f in from {
            for t in to {
                chart.edges.push(Edge {
                    from: f.clone(),
                    to: t.clone(),
                    label: label.clone(),
                    style,
                });
            }
        }
    }
}

/// Parse `A[x] & B` into node ids, defining each node on the way.
fn parse_node_group(text: &str, chart: &mut Flowchart) -> Vec<String> {
    text.split(" & ")
        .filter_map(|token| parse_node(token.trim(), chart))
        .collect()
}

fn parse_node(token: &str, chart: &mut Flowchart) -> Option<String> {
    let caps = RE_NODE.captures(token)?;
    let id = caps[1].to_string();
    let rest = caps[2].trim();

    let shaped = [
        ("([", "])", Shape::Rounded),
        ("((", "))", Shape::Circle),
        ("{{", "}}", Shape::Hexagon),
        ("{", "}", Shape::Diamond),
        ("[", "]", Shape::Box),
        ("(", ")", Shape::Rounded),
    ]
    .into_iter()
    .find_map(|(open, close, shape)| {
        rest.strip_prefix(open)
            .and_then(|r| r.strip_suffix(close))
            .map(|label| (clean_label(label), shape))
    });

    match shaped {
        Some((label, shape)) => chart.define(&id, Some(label), shape),
        None => chart.define(&id, None, Shape::Plain),
    }
    Some(id)
}

fn clean_label(label: &str) -> String {
    let label = label.trim().trim_matches(|c| c == '"' || c == '\'');
    RE_BR.replace_all(label, "\n").trim().to_string()
}

fn edge_style(op: &str) -> EdgeStyle {
    if op.starts_with('=') {
        EdgeStyle::Thick
    } else if op.contains('.') {
        EdgeStyle::Dotted
    } else if op.ends_with('>') {
        EdgeStyle::Arrow
    } else {
        EdgeStyle::Open
    }
}

fn dot_escape(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn render_dot(chart: &Flowchart, font: &str) -> String {
    let font = dot_escape(font);
    let mut out = String::new();
    let _ = writeln!(out, "digraph G {{");
    let _ = writeln!(
        out,
        "  graph [rankdir={}, nodesep=0.8, ranksep=1.0, splines=true, bgcolor=white];",
        chart.direction
    );
    let _ = writeln!(out, "  node [fontname=\"{font}\", fontsize=14];");
    let _ = writeln!(out, "  edge [fontname=\"{font}\"];");

    for node in &chart.nodes {
        let (shape, style, default_fill) = node.shape.attrs();
        let fill = node.fill.as_deref().unwrap_or(default_fill);
        let _ = write!(
            out,
            "  \"{}\" [label=\"{}\", shape={shape}",
            dot_escape(&node.id),
            dot_escape(&node.label)
        );
        if !style.is_empty() || node.fill.is_some() {
            let style = if style.is_empty() { "filled" } else { style };
            let _ = write!(out, ", style=\"{style}\", fillcolor=\"{fill}\"");
        }
        let _ = writeln!(out, "];");
    }

    for edge in &chart.edges {
        let mut attrs: Vec<String> = Vec::new();
        if let Some(label) = &edge.label {
            attrs.push(format!("label=\"{}\"", dot_escape(label)));
        }
        match edge.style {
            EdgeStyle::Arrow => {}
            EdgeStyle::Open => attrs.push("arrowhead=none".into()),
            EdgeStyle::Dotted => attrs.push("style=dashed".into()),
            EdgeStyle::Thick => attrs.push("penwidth=2".into()),
        }
        let _ = write!(
            out,
            "  \"{}\" -> \"{}\"",
            dot_escape(&edge.from),
            dot_escape(&edge.to)
        );
        if !attrs.is_empty() {
            let _ = write!(out, " [{}]", attrs.join(", "));
        }
        let _ = writeln!(out, ";");
    }
    out.push_str("}\n");
    out
}

// ── Code image ───────────────────────────────────────────────────────────

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// A plain SVG showing `code` as a listing under `title`.
pub fn code_image_svg(code: &str, title: &str) -> String {
    let mut lines: Vec<&str> = code.lines().collect();
    if lines.len() > CODE_IMAGE_MAX_LINES {
        lines.truncate(CODE_IMAGE_KEEP_LINES);
        lines.push("...");
        lines.push("(truncated)");
    }

    let width = CODE_IMAGE_WIDTH;
    let height = lines.len() * CODE_IMAGE_LINE_HEIGHT + 80;
    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}">"#
    );
    let _ = writeln!(svg, r##"  <rect width="{width}" height="{height}" fill="#f8f9fa"/>"##);
    let _ = writeln!(
        svg,
        r#"  <text x="20" y="40" font-family="sans-serif" font-size="16" font-weight="bold">{}</text>"#,
        xml_escape(title)
    );
    let _ = writeln!(
        svg,
        r##"  <rect x="10" y="60" width="{}" height="{}" fill="#f1f1f1" stroke="#cccccc" stroke-width="1"/>"##,
        width - 20,
        height - 70
    );
    for (i, line) in lines.iter().enumerate() {
        let y = 84 + i * CODE_IMAGE_LINE_HEIGHT;
        let _ = writeln!(
            svg,
            r#"  <text x="20" y="{y}" font-family="monospace" font-size="14" xml:space="preserve">{}</text>"#,
            xml_escape(line)
        );
    }
    svg.push_str("</svg>\n");
    svg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_header_normalised() {
        assert_eq!(normalize_source("graph TD\nA-->B"), "flowchart TD\nA-->B");
        assert_eq!(normalize_source("  sequenceDiagram\n"), "sequenceDiagram");
        assert!(is_flowchart("graph LR"));
        assert!(is_flowchart("flowchart TB"));
        assert!(!is_flowchart("sequenceDiagram"));
    }

    #[test]
    fn non_flowchart_yields_none() {
        assert!(flowchart_to_dot("sequenceDiagram\nA->>B: hi", "Sans").is_none());
        assert!(flowchart_to_dot("flowchart TD\n", "Sans").is_none());
    }

    #[test]
    fn direction_is_carried() {
        let dot = flowchart_to_dot("graph LR\nA --> B", "Sans").unwrap();
        assert!(dot.contains("rankdir=LR"));
        let dot = flowchart_to_dot("flowchart TD\nA --> B", "Sans").unwrap();
        assert!(dot.contains("rankdir=TB"));
    }

    #[test]
    fn node_shapes() {
        let src = "flowchart TD\nA[Start]\nB([Rounded])\nC((Circle))\nD{{Hex}}\nE{Choice}\nF";
        let dot = flowchart_to_dot(src, "Sans").unwrap();
        assert!(dot.contains(r#""A" [label="Start", shape=box, style="filled,rounded", fillcolor="lightblue"]"#));
        assert!(dot.contains(r#""B" [label="Rounded", shape=box, style="filled,rounded", fillcolor="lightgreen"]"#));
        assert!(dot.contains(r#""C" [label="Circle", shape=circle"#));
        assert!(dot.contains(r#""D" [label="Hex", shape=hexagon, style="filled", fillcolor="lightpink"]"#));
        assert!(dot.contains(r#""E" [label="Choice", shape=diamond, style="filled", fillcolor="lightyellow"]"#));
        assert!(dot.contains(r#""F" [label="F", shape=plaintext];"#));
    }

    #[test]
    fn edges_with_labels_and_inline_nodes() {
        let src = "flowchart TD\nA[\"Begin\"] -->|yes| B{Ok?}\nB -- no --> C[Retry<br>later]\nC -.-> A\nB ==> D\nD --- E";
        let dot = flowchart_to_dot(src, "Noto Sans CJK SC").unwrap();
        assert!(dot.contains(r#""A" [label="Begin""#));
        assert!(dot.contains(r#""A" -> "B" [label="yes"];"#));
        assert!(dot.contains(r#""B" -> "C" [label="no"];"#));
        assert!(dot.contains(r#""C" [label="Retry\nlater""#));
        assert!(dot.contains(r#""C" -> "A" [style=dashed];"#));
        assert!(dot.contains(r#""B" -> "D" [penwidth=2];"#));
        assert!(dot.contains(r#""D" -> "E" [arrowhead=none];"#));
        assert!(dot.contains(r#"fontname="Noto Sans CJK SC""#));
    }

    #[test]
    fn chained_and_grouped_edges() {
        let dot = flowchart_to_dot("graph TD\nA --> B --> C\nX & Y --> Z", "Sans").unwrap();
        assert!(dot.contains(r#""A" -> "B";"#));
        assert!(dot.contains(r#""B" -> "C";"#));
        assert!(dot.contains(r#""X" -> "Z";"#));
        assert!(dot.contains(r#""Y" -> "Z";"#));
    }

    #[test]
    fn bare_reference_does_not_downgrade_shape() {
        let dot = flowchart_to_dot("graph TD\nA[Start] --> B\nB --> A", "Sans").unwrap();
        assert!(dot.contains(r#""A" [label="Start", shape=box"#));
        assert_eq!(dot.matches(r#""A" [label="#).count(), 1);
    }

    #[test]
    fn style_fill_overrides_colour() {
        let src = "graph TD\nA[One] --> B\nstyle A fill:#f9f,stroke:#333\nstyle B fill:#0f0";
        let dot = flowchart_to_dot(src, "Sans").unwrap();
        assert!(dot.contains(r##""A" [label="One", shape=box, style="filled,rounded", fillcolor="#f9f"]"##));
        assert!(dot.contains(r##""B" [label="B", shape=plaintext, style="filled", fillcolor="#0f0"]"##));
    }

    #[test]
    fn ignored_statements_skipped() {
        let src = "graph TD\n%% comment\nsubgraph one\nA --> B\nend\nclassDef x fill:#fff\nclick A call()";
        let dot = flowchart_to_dot(src, "Sans").unwrap();
        assert!(!dot.contains("subgraph"));
        assert!(!dot.contains("comment"));
        assert!(!dot.contains("\"end\""));
        assert!(dot.contains(r#""A" -> "B";"#));
    }

    #[test]
    fn code_image_dimensions() {
        let svg = code_image_svg("a\nb\nc", "Flow");
        assert!(svg.contains(r#"width="800" height="152""#));
        assert!(svg.contains(">Flow</text>"));
        assert_eq!(svg.matches("font-family=\"monospace\"").count(), 3);
    }

    #[test]
    fn code_image_truncates_long_listings() {
        let code: String = (0..40).map(|i| format!("line {i}\n")).collect();
        let svg = code_image_svg(&code, "Big");
        assert_eq!(svg.matches("font-family=\"monospace\"").count(), 29);
        assert!(svg.contains(">...</text>"));
        assert!(svg.contains(">(truncated)</text>"));
        assert!(!svg.contains("line 27"));
    }

    #[test]
    fn code_image_escapes_xml() {
        let svg = code_image_svg("A --> B & <C>", "T \"q\"");
        assert!(svg.contains("A --&gt; B &amp; &lt;C&gt;"));
        assert!(svg.contains("T &quot;q&quot;"));
    }
}
