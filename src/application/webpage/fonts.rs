//! Process-wide font registry.
//!
//! Font discovery runs once per process, on first use, and the loaded
//! family is read-only afterwards. Concurrent first callers are serialized
//! by the `OnceLock`, so exactly one scan happens no matter how many
//! requests arrive during cold start.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use genpdf::fonts::{FontData, FontFamily};
use tracing::{info, warn};

use crate::config::FontSettings;

/// File name candidates for one logical family, in variant order
/// regular, bold, italic, bold-italic.
struct FontCandidate {
    family: &'static str,
    files: [&'static str; 4],
}

#[cfg(target_os = "windows")]
const CANDIDATES: &[FontCandidate] = &[
    FontCandidate {
        family: "Arial",
        files: ["arial.ttf", "arialbd.ttf", "ariali.ttf", "arialbi.ttf"],
    },
    FontCandidate {
        family: "Calibri",
        files: ["calibri.ttf", "calibrib.ttf", "calibrii.ttf", "calibriz.ttf"],
    },
    FontCandidate {
        family: "Verdana",
        files: ["verdana.ttf", "verdanab.ttf", "verdanai.ttf", "verdanaz.ttf"],
    },
];

#[cfg(not(target_os = "windows"))]
const CANDIDATES: &[FontCandidate] = &[
    FontCandidate {
        family: "DejaVu Sans",
        files: [
            "DejaVuSans.ttf",
            "DejaVuSans-Bold.ttf",
            "DejaVuSans-Oblique.ttf",
            "DejaVuSans-BoldOblique.ttf",
        ],
    },
    FontCandidate {
        family: "Liberation Sans",
        files: [
            "LiberationSans-Regular.ttf",
            "LiberationSans-Bold.ttf",
            "LiberationSans-Italic.ttf",
            "LiberationSans-BoldItalic.ttf",
        ],
    },
    FontCandidate {
        family: "Noto Sans",
        files: [
            "NotoSans-Regular.ttf",
            "NotoSans-Bold.ttf",
            "NotoSans-Italic.ttf",
            "NotoSans-BoldItalic.ttf",
        ],
    },
];

/// A loaded family ready to hand to the document composer.
pub struct LoadedFontFamily {
    pub name: &'static str,
    pub family: FontFamily<FontData>,
}

static REGISTRY: OnceLock<Option<LoadedFontFamily>> = OnceLock::new();

/// Returns the process-wide font family, scanning the configured search
/// paths on first call. `None` means no usable font file was found on this
/// host; callers decide how to degrade.
pub fn registry(settings: &FontSettings) -> Option<&'static LoadedFontFamily> {
    register_once(&REGISTRY, || scan(settings))
}

// Exactly one caller runs the scan; concurrent first users block on it.
fn register_once(
    cell: &OnceLock<Option<LoadedFontFamily>>,
    load: impl FnOnce() -> Option<LoadedFontFamily>,
) -> Option<&LoadedFontFamily> {
    cell.get_or_init(load).as_ref()
}

fn scan(settings: &FontSettings) -> Option<LoadedFontFamily> {
    for candidate in CANDIDATES {
        match load_candidate(candidate, &settings.search_paths) {
            Ok(Some(family)) => {
                info!(family = candidate.family, "font family registered");
                return Some(LoadedFontFamily {
                    name: candidate.family,
                    family,
                });
            }
            Ok(None) => {}
            Err(message) => {
                warn!(family = candidate.family, message, "font candidate unusable");
            }
        }
    }

    warn!(
        searched = ?settings.search_paths,
        "no usable font family found, document composition will be unavailable"
    );
    None
}

fn load_candidate(
    candidate: &FontCandidate,
    search_paths: &[PathBuf],
) -> Result<Option<FontFamily<FontData>>, String> {
    let Some(regular_path) = find_file(candidate.files[0], search_paths) else {
        return Ok(None);
    };

    let regular = load_font(&regular_path)?;
    let bold = load_variant(candidate.files[1], search_paths, &regular);
    let italic = load_variant(candidate.files[2], search_paths, &regular);
    let bold_italic = load_variant(candidate.files[3], search_paths, &regular);

    Ok(Some(FontFamily {
        regular,
        bold,
        italic,
        bold_italic,
    }))
}

// Missing style variants fall back to the regular face.
fn load_variant(file: &str, search_paths: &[PathBuf], regular: &FontData) -> FontData {
    find_file(file, search_paths)
        .and_then(|path| load_font(&path).ok())
        .unwrap_or_else(|| regular.clone())
}

fn load_font(path: &Path) -> Result<FontData, String> {
    let bytes =
        std::fs::read(path).map_err(|err| format!("read {} failed: {err}", path.display()))?;
    FontData::new(bytes, None).map_err(|err| format!("parse {} failed: {err}", path.display()))
}

fn find_file(name: &str, search_paths: &[PathBuf]) -> Option<PathBuf> {
    search_paths
        .iter()
        .map(|dir| dir.join(name))
        .find(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::OnceLock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::{LoadedFontFamily, find_file, register_once};

    #[test]
    fn concurrent_first_use_runs_the_scan_once() {
        let cell: OnceLock<Option<LoadedFontFamily>> = OnceLock::new();
        let scans = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    register_once(&cell, || {
                        scans.fetch_add(1, Ordering::SeqCst);
                        None
                    });
                });
            }
        });

        assert_eq!(scans.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_directories_yield_no_match() {
        let paths = vec![PathBuf::from("/nonexistent/fonts")];
        assert!(find_file("DejaVuSans.ttf", &paths).is_none());
    }

    #[test]
    fn first_matching_directory_wins() {
        let dir = tempfile::tempdir().unwrap();
        let font_path = dir.path().join("Fake.ttf");
        std::fs::write(&font_path, b"not really a font").unwrap();

        let paths = vec![PathBuf::from("/nonexistent"), dir.path().to_path_buf()];
        assert_eq!(find_file("Fake.ttf", &paths), Some(font_path));
    }
}
