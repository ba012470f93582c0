//! Error types for the confluence-doc2pdf library.
//!
//! Three layers reflect the three places a conversion can go wrong:
//!
//! * [`DecodeError`]: the MHTML container itself is unusable (no MIME
//!   headers, broken multipart boundary, no HTML root part).
//!
//! * [`RenderError`]: the headless browser could not be found, launched,
//!   finished too slowly, or produced something that is not a PDF.
//!
//! * [`ConversionError`]: **fatal for one file**. Wraps the two above and
//!   adds I/O and input-validation failures. Every variant knows which
//!   pipeline [`Stage`] it came from.
//!
//! Reference resolution never fails; its findings are reported in
//! [`crate::pipeline::resolve::ResolutionReport`] instead.
//!
//! In batch mode a `ConversionError` is flattened into a serialisable
//! [`JobFailure`] and stored in the job's outcome so the batch can continue.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Locating, downloading or reading the input.
    Input,
    /// Parsing the MIME container.
    Decode,
    /// Printing to PDF.
    Render,
    /// Writing the result.
    Output,
    /// Validating the configuration.
    Config,
    /// A broken invariant of the library itself.
    Internal,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Input => "input",
            Stage::Decode => "decode",
            Stage::Render => "render",
            Stage::Output => "output",
            Stage::Config => "config",
            Stage::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// The MHTML container could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// No top-level `Content-Type` header: the file is not a MIME container.
    #[error("no Content-Type header found; the file is not an MHTML export")]
    MissingContentType,

    /// A multipart body declared no `boundary` parameter.
    #[error("multipart content type '{content_type}' has no boundary parameter")]
    MissingBoundary { content_type: String },

    /// The declared boundary never occurs in the body.
    #[error("multipart boundary '{boundary}' does not occur in the body")]
    BoundaryNotFound { boundary: String },

    /// The container holds no HTML part to use as the document root.
    #[error("no text/html root part found in the container")]
    MissingRootPart,

    /// The root HTML part is base64 encoded but the payload is corrupt.
    #[error("root part has an invalid base64 payload: {detail}")]
    InvalidBase64 { detail: String },
}

/// The headless browser failed to produce a PDF.
#[derive(Debug, Error)]
pub enum RenderError {
    /// No Chrome/Chromium executable could be located.
    #[error("{0}")]
    EngineNotFound(#[from] chrome_auto::ChromeAutoError),

    /// Browser lookup failed before the batch started; every job reports it.
    #[error("no browser available: {reason}")]
    EngineUnavailable { reason: String },

    /// The browser process could not be spawned.
    #[error("failed to launch '{engine}': {source}")]
    LaunchFailed {
        engine: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The browser exited with a failure status.
    #[error("'{engine}' exited with {status}: {stderr}")]
    EngineFailed {
        engine: PathBuf,
        status: String,
        stderr: String,
    },

    /// The browser did not finish within the configured budget.
    #[error("rendering timed out after {secs}s\nIncrease --timeout for very large documents.")]
    Timeout { secs: u64 },

    /// The browser finished but the output is missing or not a PDF.
    #[error("rendering produced no valid PDF at '{path}': {detail}")]
    InvalidOutput { path: PathBuf, detail: String },

    /// Preparing the render session failed.
    #[error("render session I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// All errors that abort the conversion of a single file.
#[derive(Debug, Error)]
pub enum ConversionError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    InputNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// The input's extension is not one of the configured MHTML extensions.
    #[error("Unsupported input '{path}': expected one of {expected}")]
    UnsupportedExtension { path: PathBuf, expected: String },

    /// Reading the input failed after it was located.
    #[error("Failed to read '{path}': {source}")]
    InputReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// The downloaded bytes could not be staged in a temp file.
    #[error("Failed to store download of '{url}': {source}")]
    DownloadStagingFailed {
        url: String,
        #[source]
        source: std::io::Error,
    },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// The MHTML container could not be decoded.
    #[error("Failed to decode '{path}': {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },

    /// The render driver failed.
    #[error("Failed to render '{path}': {source}")]
    Render {
        path: PathBuf,
        #[source]
        source: RenderError,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConversionError {
    /// The pipeline stage this error belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            ConversionError::InputNotFound { .. }
            | ConversionError::PermissionDenied { .. }
            | ConversionError::InvalidInput { .. }
            | ConversionError::UnsupportedExtension { .. }
            | ConversionError::InputReadFailed { .. }
            | ConversionError::DownloadFailed { .. }
            | ConversionError::DownloadStagingFailed { .. }
            | ConversionError::DownloadTimeout { .. } => Stage::Input,
            ConversionError::Decode { .. } => Stage::Decode,
            ConversionError::Render { .. } => Stage::Render,
            ConversionError::OutputWriteFailed { .. } => Stage::Output,
            ConversionError::InvalidConfig(_) => Stage::Config,
            ConversionError::Internal(_) => Stage::Internal,
        }
    }
}

/// A per-file failure as recorded in a batch report.
///
/// Carries only plain data so reports can be serialised and cloned; the
/// full error chain is flattened into `message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{stage} stage failed: {message}")]
pub struct JobFailure {
    /// Stage the conversion stopped in.
    pub stage: Stage,
    /// Human-readable cause, including nested sources.
    pub message: String,
}

impl From<&ConversionError> for JobFailure {
    fn from(err: &ConversionError) -> Self {
        let mut message = err.to_string();
        let mut source = std::error::Error::source(err);
        while let Some(cause) = source {
            let text = cause.to_string();
            if !message.contains(&text) {
                message.push_str(": ");
                message.push_str(&text);
            }
            source = cause.source();
        }
        JobFailure {
            stage: err.stage(),
            message,
        }
    }
}
