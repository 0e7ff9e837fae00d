//! Input resolution: turn a user-supplied path or URL into Markdown text.
//!
//! Local files are checked up front so the user gets a precise error (missing,
//! a directory, unreadable, not UTF-8) before any external tool starts. The
//! file's directory is remembered because relative image links in the
//! document are resolved against it.

use crate::error::Md2PdfError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Markdown text together with where it came from.
#[derive(Debug, Clone)]
pub struct ResolvedInput {
    pub text: String,
    /// The original path or URL, for messages and [`crate::DocumentInfo`].
    pub source: String,
    /// Directory of a local input; `None` for URLs.
    pub base_dir: Option<PathBuf>,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Read the input, downloading it first when it is a URL.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, Md2PdfError> {
    if input.trim().is_empty() {
        return Err(Md2PdfError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(Path::new(input)).await
    }
}

async fn resolve_local(path: &Path) -> Result<ResolvedInput, Md2PdfError> {
    let meta = match tokio::fs::metadata(path).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Md2PdfError::PermissionDenied {
                path: path.to_path_buf(),
            })
        }
        Err(_) => {
            return Err(Md2PdfError::FileNotFound {
                path: path.to_path_buf(),
            })
        }
    };
    if !meta.is_file() {
        return Err(Md2PdfError::NotAFile {
            path: path.to_path_buf(),
        });
    }

    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => Md2PdfError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => Md2PdfError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;
    let text = decode_text(bytes).map_err(|detail| Md2PdfError::NotUtf8 {
        path: path.to_path_buf(),
        detail,
    })?;

    let base_dir = std::path::absolute(path)
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf));
    debug!(
        "Read {} bytes from {} (base dir {:?})",
        text.len(),
        path.display(),
        base_dir
    );

    Ok(ResolvedInput {
        text,
        source: path.display().to_string(),
        base_dir,
    })
}

/// UTF-8 decode with a leading byte-order mark removed.
fn decode_text(bytes: Vec<u8>) -> Result<String, String> {
    let text = String::from_utf8(bytes).map_err(|e| e.utf8_error().to_string())?;
    Ok(match text.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => text,
    })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, Md2PdfError> {
    info!("Downloading Markdown from: {}", url);

    let failed = |reason: String| Md2PdfError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            Md2PdfError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    let text = decode_text(bytes.to_vec()).map_err(|detail| failed(format!("body is not UTF-8: {detail}")))?;
    info!("Downloaded {} bytes", text.len());

    Ok(ResolvedInput {
        text,
        source: url.to_string(),
        base_dir: None,
    })
}

/// The last non-empty path segment of a URL without its extension.
pub fn url_stem(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.rev().find(|s| !s.is_empty())?;
    let stem = Path::new(last).file_stem()?.to_string_lossy().to_string();
    (!stem.is_empty()).then_some(stem)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/notes.md"));
        assert!(is_url("http://example.com/notes.md"));
        assert!(!is_url("/tmp/notes.md"));
        assert!(!is_url("notes.md"));
        assert!(!is_url(""));
    }

    #[test]
    fn bom_is_stripped() {
        let text = decode_text(b"\xEF\xBB\xBF# Title".to_vec()).unwrap();
        assert_eq!(text, "# Title");
    }

    #[test]
    fn invalid_utf8_is_reported() {
        assert!(decode_text(vec![b'a', 0xFF, 0xFE]).is_err());
    }

    #[test]
    fn url_stems() {
        assert_eq!(url_stem("https://x.org/docs/guide.md").as_deref(), Some("guide"));
        assert_eq!(url_stem("https://x.org/docs/readme/").as_deref(), Some("readme"));
        assert_eq!(url_stem("https://x.org/"), None);
    }

    #[tokio::test]
    async fn missing_file() {
        let err = resolve_input("/definitely/not/here.md", 5).await.unwrap_err();
        assert!(matches!(err, Md2PdfError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_input(dir.path().to_str().unwrap(), 5).await.unwrap_err();
        assert!(matches!(err, Md2PdfError::NotAFile { .. }));
    }

    #[tokio::test]
    async fn empty_input_is_invalid() {
        let err = resolve_input("  ", 5).await.unwrap_err();
        assert!(matches!(err, Md2PdfError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn local_file_is_read_with_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.md");
        std::fs::write(&path, "# Hello\n").unwrap();

        let resolved = resolve_input(path.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(resolved.text, "# Hello\n");
        let base = resolved.base_dir.unwrap();
        assert_eq!(base.canonicalize().unwrap(), dir.path().canonicalize().unwrap());
    }

    #[tokio::test]
    async fn non_utf8_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latin1.md");
        std::fs::write(&path, [b'c', b'a', b'f', 0xE9]).unwrap();
        let err = resolve_input(path.to_str().unwrap(), 5).await.unwrap_err();
        assert!(matches!(err, Md2PdfError::NotUtf8 { .. }));
    }
}
