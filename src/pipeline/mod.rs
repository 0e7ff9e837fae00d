//! Pipeline stages for Markdown-to-PDF conversion.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested without pandoc or a TeX installation.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ render ──▶ assemble ──▶ compile
//! (URL/path) (regex)    (assets)   (markdown    (pandoc +
//!                                   + headers)   fallback)
//! ```
//!
//! 1. [`input`]    read a local file or download a URL
//! 2. [`extract`]  cut embedded SVG, Mermaid and data-URI images out of the
//!    text, leaving placeholders; normalise math delimiters
//! 3. [`svgfix`]   repair SVG markup before it is rasterised (called from
//!    `extract` and by `md2pdf --fix-svg`)
//! 4. [`render`]   run each artifact through its renderer chain; the only
//!    stage with concurrency
//! 5. [`mermaid`]  flowchart-to-DOT translation and code-image fallback used
//!    by `render`
//! 6. [`assemble`] swap placeholders for image links, write headers
//! 7. [`compile`]  run pandoc, retrying with simpler template tiers

pub mod assemble;
pub mod compile;
pub mod extract;
pub mod input;
pub mod mermaid;
pub mod render;
pub mod svgfix;
