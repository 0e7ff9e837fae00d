//! Tests that drive the `md2pdf` binary. None of them need pandoc.

#![cfg(feature = "cli")]

use std::process::Command;

fn md2pdf() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_md2pdf"));
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn nonexistent_input_exits_non_zero() {
    let out = md2pdf()
        .args(["--no-progress", "/definitely/not/here.md"])
        .output()
        .expect("run md2pdf");

    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("not found"), "stderr: {stderr}");
    assert!(stderr.contains("/definitely/not/here.md"), "stderr: {stderr}");
}

#[test]
fn no_arguments_prints_help_and_fails() {
    let out = md2pdf().output().expect("run md2pdf");
    assert!(!out.status.success());
    let text = String::from_utf8_lossy(&out.stderr).to_string() + &String::from_utf8_lossy(&out.stdout);
    assert!(text.contains("Usage"), "output: {text}");
}

#[test]
fn fix_svg_prints_repaired_markup() {
    let dir = tempfile::tempdir().unwrap();
    let svg = dir.path().join("in.svg");
    std::fs::write(
        &svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg"><line x1="0" y1="5" x2="10"/></svg>"#,
    )
    .unwrap();

    let out = md2pdf()
        .arg("--fix-svg")
        .arg(&svg)
        .output()
        .expect("run md2pdf");

    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("y2=\"5\""), "stdout: {stdout}");
}

#[test]
fn inspect_only_json() {
    let dir = tempfile::tempdir().unwrap();
    let md = dir.path().join("doc.md");
    std::fs::write(&md, "# Title\n\n```mermaid\ngraph LR\n  A --> B\n```\n").unwrap();

    let out = md2pdf()
        .args(["--inspect-only", "--json"])
        .arg(&md)
        .output()
        .expect("run md2pdf");

    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let info: serde_json::Value = serde_json::from_slice(&out.stdout).expect("valid JSON");
    assert_eq!(info["headings"], 1);
    assert_eq!(info["artifacts"][0]["id"], "inline_mermaid_0");
    assert_eq!(info["artifacts"][0]["kind"]["type"], "mermaid");
}

#[test]
fn inspect_only_from_environment() {
    let dir = tempfile::tempdir().unwrap();
    let md = dir.path().join("doc.md");
    std::fs::write(&md, "# One\n\n## Two\n").unwrap();

    let out = md2pdf()
        .env("MD2PDF_INSPECT_ONLY", "true")
        .env("MD2PDF_JSON", "true")
        .arg(&md)
        .output()
        .expect("run md2pdf");

    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let info: serde_json::Value = serde_json::from_slice(&out.stdout).expect("valid JSON");
    assert_eq!(info["headings"], 2);
    assert!(!dir.path().join("doc.pdf").exists());
}
