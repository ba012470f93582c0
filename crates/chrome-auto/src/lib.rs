//! # chrome-auto
//!
//! Locate a Chrome or Chromium executable that can print HTML to PDF in
//! headless mode, so that callers never have to configure a browser path
//! by hand.
//!
//! ## How it works
//!
//! On the first call to [`find_chrome`] (with no explicit path):
//!
//! 1. Honours `CHROME_PATH` when it points to an existing file.
//! 2. Searches `PATH` for the well-known executable names
//!    (`google-chrome`, `chromium`, `chrome`, `headless_shell`, …).
//! 3. Probes the per-platform install locations (`/Applications/…`,
//!    `%ProgramFiles%\Google\Chrome\…`, `/opt/google/chrome/…`).
//! 4. Falls back to browsers downloaded by Playwright under
//!    `{cache_dir}/ms-playwright/` (override: `PLAYWRIGHT_BROWSERS_PATH`).
//!
//! The discovered path is cached for the lifetime of the process.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use chrome_auto::find_chrome;
//!
//! let chrome = find_chrome(None).expect("no Chrome/Chromium installed");
//! println!("printing with {}", chrome.display());
//! ```
//!
//! ## Environment variable overrides
//!
//! - `CHROME_PATH`: path to an existing Chrome/Chromium binary; skips discovery.
//! - `PLAYWRIGHT_BROWSERS_PATH`: Playwright's browser cache directory.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use thiserror::Error;

// ── Public constants ─────────────────────────────────────────────────────────

/// Environment variable naming an explicit browser executable.
pub const CHROME_PATH_ENV: &str = "CHROME_PATH";

/// Environment variable overriding Playwright's browser cache location.
pub const PLAYWRIGHT_BROWSERS_ENV: &str = "PLAYWRIGHT_BROWSERS_PATH";

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by chrome-auto operations.
#[derive(Error, Debug)]
pub enum ChromeAutoError {
    /// An explicitly configured executable does not exist.
    #[error("Chrome executable '{path}' does not exist")]
    ExplicitPathMissing { path: PathBuf },

    /// Nothing suitable was found anywhere.
    #[error(
        "No Chrome/Chromium executable found ({searched} locations searched).\n\
Install Google Chrome or Chromium, or set {CHROME_PATH_ENV}=/path/to/chrome."
    )]
    NotFound { searched: usize },
}

// ── Internal: platform metadata ──────────────────────────────────────────────

/// Executable names looked up on `PATH`, most specific first.
fn executable_names() -> &'static [&'static str] {
    match std::env::consts::OS {
        "windows" => &["chrome.exe", "msedge.exe", "chromium.exe"],
        "macos" => &["chromium", "google-chrome", "chrome"],
        _ => &[
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
            "chrome",
            "headless_shell",
        ],
    }
}

/// Well-known install locations outside `PATH`.
fn install_locations() -> Vec<PathBuf> {
    match std::env::consts::OS {
        "macos" => vec![
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
            PathBuf::from("/Applications/Chromium.app/Contents/MacOS/Chromium"),
            PathBuf::from(
                "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
            ),
        ],
        "windows" => {
            let mut roots = Vec::new();
            for var in ["ProgramFiles", "ProgramFiles(x86)", "LOCALAPPDATA"] {
                if let Ok(root) = std::env::var(var) {
                    roots.push(PathBuf::from(root));
                }
            }
            roots
                .into_iter()
                .flat_map(|root| {
                    [
                        root.join(r"Google\Chrome\Application\chrome.exe"),
                        root.join(r"Chromium\Application\chrome.exe"),
                        root.join(r"Microsoft\Edge\Application\msedge.exe"),
                    ]
                })
                .collect()
        }
        _ => vec![
            PathBuf::from("/opt/google/chrome/chrome"),
            PathBuf::from("/usr/lib/chromium/chromium"),
            PathBuf::from("/snap/bin/chromium"),
        ],
    }
}

/// Paths of the browser binary relative to one Playwright browser directory.
fn playwright_relative_paths() -> &'static [&'static str] {
    match std::env::consts::OS {
        "macos" => &[
            "chrome-mac/Chromium.app/Contents/MacOS/Chromium",
            "chrome-mac-arm64/Chromium.app/Contents/MacOS/Chromium",
            "chrome-mac/headless_shell",
        ],
        "windows" => &[
            "chrome-win/chrome.exe",
            "chrome-win64/chrome.exe",
            "chrome-win/headless_shell.exe",
        ],
        _ => &[
            "chrome-linux/chrome",
            "chrome-linux64/chrome",
            "chrome-linux/headless_shell",
        ],
    }
}

// ── Cache directory resolution ───────────────────────────────────────────────

/// Returns Playwright's browser cache directory, if one can be determined.
///
/// Default locations:
/// - **macOS**: `~/Library/Caches/ms-playwright/`
/// - **Linux**: `~/.cache/ms-playwright/`
/// - **Windows**: `%LOCALAPPDATA%\ms-playwright\`
///
/// Override by setting `PLAYWRIGHT_BROWSERS_PATH`.
pub fn playwright_cache_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(PLAYWRIGHT_BROWSERS_ENV) {
        if !dir.is_empty() && dir != "0" {
            return Some(PathBuf::from(dir));
        }
    }
    dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
        .map(|base| base.join("ms-playwright"))
}

// ── Thread-safe singleton path cache ─────────────────────────────────────────

static RESOLVED_PATH: OnceLock<PathBuf> = OnceLock::new();

// ── Public API ───────────────────────────────────────────────────────────────

/// Returns `true` if a browser can be located without further setup.
pub fn is_chrome_available() -> bool {
    find_chrome(None).is_ok()
}

/// Locate a Chrome/Chromium executable.
///
/// - `explicit` wins when given; it must exist.
/// - Otherwise `CHROME_PATH` is used when it points to an existing file.
/// - Otherwise the discovery order described in the crate docs applies.
///
/// # Thread safety
///
/// Safe to call from multiple threads; discovery runs at most a handful of
/// times and the first successful result is kept.
pub fn find_chrome(explicit: Option<&Path>) -> Result<PathBuf, ChromeAutoError> {
    if let Some(path) = explicit {
        return if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            Err(ChromeAutoError::ExplicitPathMissing {
                path: path.to_path_buf(),
            })
        };
    }

    if let Some(path) = RESOLVED_PATH.get() {
        return Ok(path.clone());
    }

    let path = discover()?;
    let _ = RESOLVED_PATH.set(path.clone());
    Ok(path)
}

// ── Internal helpers ─────────────────────────────────────────────────────────

fn discover() -> Result<PathBuf, ChromeAutoError> {
    let mut searched = 0usize;

    // 1. Environment variable override.
    if let Ok(env_path) = std::env::var(CHROME_PATH_ENV) {
        let p = PathBuf::from(env_path);
        searched += 1;
        if p.is_file() {
            return Ok(p);
        }
        // Fall through: variable set but file missing → keep searching.
        eprintln!(
            "chrome-auto: {CHROME_PATH_ENV} '{}' not found; searching …",
            p.display()
        );
    }

    // 2. PATH lookup.
    let path_dirs: Vec<PathBuf> = std::env::var_os("PATH")
        .map(|v| std::env::split_paths(&v).collect())
        .unwrap_or_default();
    searched += path_dirs.len();
    if let Some(found) = search_dirs(&path_dirs, executable_names()) {
        return Ok(found);
    }

    // 3. Install locations.
    for candidate in install_locations() {
        searched += 1;
        if candidate.is_file() {
            return Ok(candidate);
        }
    }

    // 4. Playwright cache.
    if let Some(cache) = playwright_cache_dir() {
        searched += 1;
        if let Some(found) = playwright_executables(&cache).into_iter().next() {
            return Ok(found);
        }
    }

    Err(ChromeAutoError::NotFound { searched })
}

/// First `dir/name` that is a regular file, scanning names within each dir.
fn search_dirs(dirs: &[PathBuf], names: &[&str]) -> Option<PathBuf> {
    dirs.iter()
        .flat_map(|dir| names.iter().map(move |name| dir.join(name)))
        .find(|candidate| candidate.is_file())
}

/// Browser executables under a Playwright cache, newest revision first.
fn playwright_executables(cache_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(cache_dir) else {
        return Vec::new();
    };

    let mut revisions: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_dir()
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("chromium"))
        })
        .collect();
    revisions.sort();
    revisions.reverse();

    revisions
        .iter()
        .flat_map(|rev| playwright_relative_paths().iter().map(move |rel| rev.join(rel)))
        .filter(|p| p.is_file())
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
