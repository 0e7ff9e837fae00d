//! Open a finished PDF in the platform's default viewer.

use crate::error::Md2PdfError;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::debug;

fn viewer_command(path: &Path) -> Command {
    if cfg!(target_os = "macos") {
        let mut cmd = Command::new("open");
        cmd.arg(path);
        cmd
    } else if cfg!(windows) {
        // `start` treats the first quoted argument as the window title.
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", "start", ""]).arg(path);
        cmd
    } else {
        let mut cmd = Command::new("xdg-open");
        cmd.arg(path);
        cmd
    }
}

/// Launch the viewer without waiting for it to exit.
pub fn open_pdf(path: &Path) -> Result<(), Md2PdfError> {
    let mut cmd = viewer_command(path);
    debug!("Opening viewer: {:?}", cmd);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(|_| ())
        .map_err(|e| Md2PdfError::OpenFailed {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
}
