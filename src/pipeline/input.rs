//! Input resolution: normalise a user-supplied path or URL to local bytes.
//!
//! Exports are usually local files, but a Confluence "Export to Word" link
//! can be passed directly. URLs are downloaded into a `TempDir` that lives as
//! long as the returned [`ResolvedInput`], so the download is cleaned up even
//! when a later stage fails.

use crate::config::ConversionConfig;
use crate::error::ConversionError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// File name used when a URL carries none.
const DEFAULT_DOWNLOAD_NAME: &str = "downloaded.doc";

/// The resolved input: either a local path or a downloaded temp file.
pub enum ResolvedInput {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input was a URL; the export was downloaded to a temp directory.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    /// Path to the export regardless of how it was resolved.
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to a local export.
///
/// Local files must exist, be readable and carry one of the configured
/// extensions. URLs are downloaded without an extension check since export
/// links rarely end in `.doc`.
pub async fn resolve_input(
    input: &str,
    config: &ConversionConfig,
) -> Result<ResolvedInput, ConversionError> {
    if is_url(input) {
        download_url(input, config.download_timeout_secs).await
    } else {
        resolve_local(Path::new(input), config)
    }
}

/// Validate a local input path.
pub fn resolve_local(path: &Path, config: &ConversionConfig) -> Result<ResolvedInput, ConversionError> {
    let path = path.to_path_buf();
    if path.as_os_str().is_empty() {
        return Err(ConversionError::InvalidInput {
            input: String::new(),
        });
    }
    if !path.exists() {
        return Err(ConversionError::InputNotFound { path });
    }
    if !config.accepts(&path) {
        return Err(ConversionError::UnsupportedExtension {
            path,
            expected: config
                .extensions
                .iter()
                .map(|e| format!(".{e}"))
                .collect::<Vec<_>>()
                .join(", "),
        });
    }

    // Check read permission by attempting to open
    match std::fs::File::open(&path) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ConversionError::PermissionDenied { path });
        }
        Err(source) => return Err(ConversionError::InputReadFailed { path, source }),
    }

    debug!("Resolved local export: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

/// Read the whole export into memory.
pub async fn read_input(path: &Path) -> Result<Vec<u8>, ConversionError> {
    tokio::fs::read(path).await.map_err(|source| match source.kind() {
        std::io::ErrorKind::NotFound => ConversionError::InputNotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => ConversionError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => ConversionError::InputReadFailed {
            path: path.to_path_buf(),
            source,
        },
    })
}

/// Download a URL to a temporary directory and return the path.
async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, ConversionError> {
    info!("Downloading export from: {}", url);

    let parsed = reqwest::Url::parse(url).map_err(|_| ConversionError::InvalidInput {
        input: url.to_string(),
    })?;

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ConversionError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(parsed.clone()).send().await.map_err(|e| {
        if e.is_timeout() {
            ConversionError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ConversionError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(ConversionError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(|e| {
        if e.is_timeout() {
            ConversionError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ConversionError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    let staging_failed = |source| ConversionError::DownloadStagingFailed {
        url: url.to_string(),
        source,
    };
    let temp_dir = TempDir::new().map_err(staging_failed)?;
    let file_path = temp_dir.path().join(download_name(&parsed));
    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(staging_failed)?;

    info!("Downloaded {} bytes to: {}", bytes.len(), file_path.display());

    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

/// Last path segment of the URL if it looks like a file name.
fn download_name(url: &reqwest::Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|last| !last.is_empty() && last.contains('.'))
        .map(str::to_string)
        .unwrap_or_else(|| DEFAULT_DOWNLOAD_NAME.to_string())
}
