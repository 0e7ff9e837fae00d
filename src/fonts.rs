//! CJK font selection for the LaTeX engine.
//!
//! XeLaTeX needs a CJK family name for `xeCJK`; a wrong one aborts the
//! compile. Installed fonts are listed with `fc-list :lang=zh` on Linux and
//! by scanning the font directories on macOS and Windows, then matched
//! against known family names per role. Explicit [`FontOverrides`] always win.

use crate::config::FontOverrides;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

const SERIF_CANDIDATES: &[&str] = &[
    "Noto Serif CJK SC",
    "Source Han Serif SC",
    "Source Han Serif CN",
    "思源宋体",
    "SimSun",
    "宋体",
    "STSong",
    "Songti SC",
    "FangSong",
    "仿宋",
];

const SANS_CANDIDATES: &[&str] = &[
    "Noto Sans CJK SC",
    "Source Han Sans SC",
    "Source Han Sans CN",
    "思源黑体",
    "Microsoft YaHei",
    "微软雅黑",
    "SimHei",
    "黑体",
    "PingFang SC",
    "STHeiti",
    "KaiTi",
    "楷体",
];

const MONO_CANDIDATES: &[&str] = &["Noto Sans Mono CJK SC", "Sarasa Mono SC", "Source Han Mono SC"];

/// The three CJK families handed to pandoc.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontSet {
    pub serif: String,
    pub sans: String,
    pub mono: String,
}

impl FontSet {
    /// Platform defaults used when nothing suitable is detected.
    pub fn fallback() -> Self {
        let (serif, sans, mono) = if cfg!(target_os = "macos") {
            ("STSong", "STHeiti", "STFangsong")
        } else if cfg!(windows) {
            ("SimSun", "SimHei", "KaiTi")
        } else {
            ("Noto Serif CJK SC", "Noto Sans CJK SC", "Noto Sans Mono CJK SC")
        };
        Self {
            serif: serif.into(),
            sans: sans.into(),
            mono: mono.into(),
        }
    }

    /// Fill unset overrides from `self`.
    pub fn with_overrides(self, overrides: &FontOverrides) -> Self {
        Self {
            serif: overrides.serif.clone().unwrap_or(self.serif),
            sans: overrides.sans.clone().unwrap_or(self.sans),
            mono: overrides.mono.clone().unwrap_or(self.mono),
        }
    }
}

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn first_match(listing: &str, candidates: &[&str]) -> Option<String> {
    candidates
        .iter()
        .find(|c| listing.contains(&normalize(c)))
        .map(|c| c.to_string())
}

/// Pick families from a font listing (one font per line, any format).
///
/// Sans falls back to serif and mono to sans, so one installed CJK family
/// is enough. Returns `None` when no known family appears.
pub fn match_fonts(listing: &str) -> Option<FontSet> {
    let listing = normalize(listing);
    let serif = first_match(&listing, SERIF_CANDIDATES);
    let sans = first_match(&listing, SANS_CANDIDATES);
    let mono = first_match(&listing, MONO_CANDIDATES);

    let serif = serif.or_else(|| sans.clone())?;
    let sans = sans.unwrap_or_else(|| serif.clone());
    let mono = mono.unwrap_or_else(|| sans.clone());
    Some(FontSet { serif, sans, mono })
}

/// Detect installed CJK fonts.
pub async fn detect_fonts() -> Option<FontSet> {
    let listing = if cfg!(any(target_os = "macos", windows)) {
        list_font_files().await
    } else {
        list_fontconfig().await
    };
    let found = match_fonts(&listing);
    debug!("Detected CJK fonts: {:?}", found);
    found
}

async fn list_fontconfig() -> String {
    let output = Command::new("fc-list")
        .arg(":lang=zh")
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .await;
    match output {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout).into_owned(),
        Ok(out) => {
            debug!("fc-list exited with {}", out.status);
            String::new()
        }
        Err(e) => {
            debug!("fc-list unavailable: {}", e);
            String::new()
        }
    }
}

fn font_dirs() -> Vec<PathBuf> {
    let mut dirs_out = Vec::new();
    if cfg!(target_os = "macos") {
        dirs_out.push(PathBuf::from("/System/Library/Fonts"));
        dirs_out.push(PathBuf::from("/Library/Fonts"));
    }
    if cfg!(windows) {
        let windir = std::env::var_os("WINDIR").unwrap_or_else(|| "C:\\Windows".into());
        dirs_out.push(PathBuf::from(windir).join("Fonts"));
    }
    if let Some(user) = dirs::font_dir() {
        dirs_out.push(user);
    }
    dirs_out
}

async fn list_font_files() -> String {
    let mut names = String::new();
    for dir in font_dirs() {
        let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
            continue;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().to_lowercase();
            if name.ends_with(".ttf") || name.ends_with(".otf") || name.ends_with(".ttc") {
                names.push_str(&name);
                names.push('\n');
            }
        }
    }
    names
}

/// Resolve the fonts for one conversion. Detection only runs when at least
/// one role is not overridden.
pub async fn resolve(overrides: &FontOverrides) -> FontSet {
    if let (Some(serif), Some(sans), Some(mono)) = (&overrides.serif, &overrides.sans, &overrides.mono) {
        return FontSet {
            serif: serif.clone(),
            sans: sans.clone(),
            mono: mono.clone(),
        };
    }
    let base = detect_fonts().await.unwrap_or_else(|| {
        info!("No known CJK font detected; using platform defaults");
        FontSet::fallback()
    });
    let fonts = base.with_overrides(overrides);
    info!("CJK fonts: serif={}, sans={}, mono={}", fonts.serif, fonts.sans, fonts.mono);
    fonts
}

#[cfg(test)]
mod tests {
    use super::*;

    const FC_LIST: &str = "\
/usr/share/fonts/opentype/noto/NotoSerifCJK-Regular.ttc: Noto Serif CJK SC,Noto Serif CJK SC Regular:style=Regular
/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc: Noto Sans CJK SC,Noto Sans CJK SC Regular:style=Regular
/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc: Noto Sans Mono CJK SC:style=Regular
";

    #[test]
    fn matches_fontconfig_listing() {
        let fonts = match_fonts(FC_LIST).unwrap();
        assert_eq!(fonts.serif, "Noto Serif CJK SC");
        assert_eq!(fonts.sans, "Noto Sans CJK SC");
        assert_eq!(fonts.mono, "Noto Sans Mono CJK SC");
    }

    #[test]
    fn single_family_fills_all_roles() {
        let fonts = match_fonts("/fonts/wqy.ttc: Microsoft YaHei:style=Regular").unwrap();
        assert_eq!(fonts.serif, "Microsoft YaHei");
        assert_eq!(fonts.sans, "Microsoft YaHei");
        assert_eq!(fonts.mono, "Microsoft YaHei");
    }

    #[test]
    fn file_name_listing_matches_without_spaces() {
        let fonts = match_fonts("simsun.ttc\nsimhei.ttf\n").unwrap();
        assert_eq!(fonts.serif, "SimSun");
        assert_eq!(fonts.sans, "SimHei");
        assert_eq!(fonts.mono, "SimHei");
    }

    #[test]
    fn nothing_known_yields_none() {
        assert!(match_fonts("DejaVuSans.ttf\nLiberation Serif").is_none());
        assert!(match_fonts("").is_none());
    }

    #[test]
    fn overrides_win() {
        let overrides = FontOverrides {
            serif: Some("My Serif".into()),
            sans: None,
            mono: Some("My Mono".into()),
        };
        let fonts = FontSet::fallback().with_overrides(&overrides);
        assert_eq!(fonts.serif, "My Serif");
        assert_eq!(fonts.sans, FontSet::fallback().sans);
        assert_eq!(fonts.mono, "My Mono");
    }

    #[test]
    fn full_overrides_skip_detection() {
        let overrides = FontOverrides {
            serif: Some("A".into()),
            sans: Some("B".into()),
            mono: Some("C".into()),
        };
        let fonts = tokio_test::block_on(resolve(&overrides));
        assert_eq!(
            fonts,
            FontSet {
                serif: "A".into(),
                sans: "B".into(),
                mono: "C".into()
            }
        );
    }
}
