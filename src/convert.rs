//! Single-document conversion entry points.
//!
//! Every entry point runs the same stages:
//!
//! ```text
//! input ─▶ decode ─▶ resolve ─▶ sanitize ─▶ render ─▶ output
//! ```
//!
//! [`prepare_html`] covers the three pure stages and is what
//! [`convert_to_html`] and [`inspect`] build on. [`convert_file_with`] is
//! generic over the [`PdfRenderer`] so batch mode and tests can supply their
//! own engine; [`convert_file`] locates Chrome itself.

use crate::config::ConversionConfig;
use crate::error::{ConversionError, DecodeError};
use crate::output::{ConversionStats, DocumentSummary};
use crate::pipeline::render::{ChromeRenderer, PdfRenderer};
use crate::pipeline::resolve::ResolutionReport;
use crate::pipeline::{input, mime, render, resolve, sanitize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Label used in errors for in-memory input.
const MEMORY_INPUT: &str = "<memory>";

/// A decoded, resolved and sanitised document ready for rendering.
#[derive(Debug, Clone)]
pub struct PreparedDocument {
    /// Self-contained HTML.
    pub html: String,
    /// MIME parts in the container, root included.
    pub parts: usize,
    pub subject: Option<String>,
    pub report: ResolutionReport,
}

/// Run decode → resolve → sanitize over raw MHTML bytes.
pub fn prepare_html(bytes: &[u8]) -> Result<PreparedDocument, DecodeError> {
    let doc = mime::decode(bytes)?;
    let resolved = resolve::resolve(&doc);
    let html = sanitize::sanitize(&resolved.html);
    debug!(
        "Prepared HTML: {} → {} bytes after sanitising",
        resolved.html.len(),
        html.len()
    );
    Ok(PreparedDocument {
        html,
        parts: doc.parts.len(),
        subject: doc.subject,
        report: resolved.report,
    })
}

/// Convert one MHTML export (path or URL) to a PDF using headless Chrome.
///
/// # Errors
/// Returns the first failing stage as a [`ConversionError`]; see
/// [`ConversionError::stage`].
pub async fn convert_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionStats, ConversionError> {
    let total_start = Instant::now();
    let input_str = input_str.as_ref();
    info!("Starting conversion: {}", input_str);

    let (source, prepared) = load(input_str, config).await?;
    let renderer = ChromeRenderer::from_config(config).map_err(|e| ConversionError::Render {
        path: source.clone(),
        source: e,
    })?;
    render_prepared(&renderer, source, prepared, output_path.as_ref(), config, total_start).await
}

/// Convert one MHTML export (path or URL) to a PDF with the given renderer.
pub async fn convert_file_with<R: PdfRenderer>(
    renderer: &R,
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionStats, ConversionError> {
    let total_start = Instant::now();
    let input_str = input_str.as_ref();
    info!("Starting conversion: {}", input_str);

    let (source, prepared) = load(input_str, config).await?;
    render_prepared(renderer, source, prepared, output_path.as_ref(), config, total_start).await
}

/// Convert a local export to a PDF with the given renderer.
///
/// Used by batch mode, where inputs come from a directory walk and need not
/// be valid UTF-8.
pub async fn convert_path_with<R: PdfRenderer>(
    renderer: &R,
    input: &Path,
    output: &Path,
    config: &ConversionConfig,
) -> Result<ConversionStats, ConversionError> {
    let total_start = Instant::now();
    info!("Starting conversion: {}", input.display());

    let resolved = input::resolve_local(input, config)?;
    let prepared = load_resolved(resolved.path()).await?;
    render_prepared(renderer, input.to_path_buf(), prepared, output, config, total_start).await
}

/// Convert MHTML bytes held in memory to a PDF using headless Chrome.
///
/// # Example
/// ```rust,no_run
/// use confluence_doc2pdf::{convert_from_bytes, ConversionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes: Vec<u8> = std::fs::read("Page.doc")?;
/// let stats = convert_from_bytes(&bytes, "Page.pdf", &ConversionConfig::default()).await?;
/// println!("{} resources inlined", stats.inlined_resources);
/// # Ok(())
/// # }
/// ```
pub async fn convert_from_bytes(
    bytes: &[u8],
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionStats, ConversionError> {
    let total_start = Instant::now();
    let source = PathBuf::from(MEMORY_INPUT);
    let prepared = prepare_html(bytes).map_err(|e| ConversionError::Decode {
        path: source.clone(),
        source: e,
    })?;
    let renderer = ChromeRenderer::from_config(config).map_err(|e| ConversionError::Render {
        path: source.clone(),
        source: e,
    })?;
    render_prepared(&renderer, source, prepared, output_path.as_ref(), config, total_start).await
}

/// Synchronous wrapper around [`convert_file`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionStats, ConversionError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ConversionError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert_file(input_str, output_path, config))
}

/// Write the self-contained HTML instead of printing it.
///
/// Useful for checking what the browser would see. The file is written
/// atomically (temp file + rename).
pub async fn convert_to_html(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionStats, ConversionError> {
    let total_start = Instant::now();
    let path = output_path.as_ref();
    let (source, prepared) = load(input_str.as_ref(), config).await?;

    ensure_parent(path).await?;
    let tmp_path = path.with_extension("html.tmp");
    tokio::fs::write(&tmp_path, &prepared.html)
        .await
        .map_err(|e| ConversionError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| ConversionError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    info!("Wrote HTML: {}", path.display());
    Ok(build_stats(source, path, &prepared, prepared.html.len() as u64, 0, total_start))
}

/// Decode a container and describe its parts without rendering.
pub async fn inspect(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<DocumentSummary, ConversionError> {
    let input_str = input_str.as_ref();
    let resolved = input::resolve_input(input_str, config).await?;
    let bytes = input::read_input(resolved.path()).await?;
    let doc = mime::decode(&bytes).map_err(|e| ConversionError::Decode {
        path: resolved.path().to_path_buf(),
        source: e,
    })?;
    let source = if input::is_url(input_str) {
        PathBuf::from(input_str)
    } else {
        resolved.path().to_path_buf()
    };
    Ok(DocumentSummary::from_document(source, &doc))
}

/// True if `output` already holds a complete PDF.
pub fn is_current_output(output: &Path) -> bool {
    render::is_valid_pdf_file(output)
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Resolve, read and prepare the input. Returns the local source path.
async fn load(
    input_str: &str,
    config: &ConversionConfig,
) -> Result<(PathBuf, PreparedDocument), ConversionError> {
    let resolved = input::resolve_input(input_str, config).await?;
    let prepared = load_resolved(resolved.path()).await?;

    // Downloads are reported under their URL, local files under their path.
    let source = if input::is_url(input_str) {
        PathBuf::from(input_str)
    } else {
        resolved.path().to_path_buf()
    };
    Ok((source, prepared))
}

async fn load_resolved(path: &Path) -> Result<PreparedDocument, ConversionError> {
    let bytes = input::read_input(path).await?;
    debug!("Read {} bytes from {}", bytes.len(), path.display());
    prepare_html(&bytes).map_err(|e| ConversionError::Decode {
        path: path.to_path_buf(),
        source: e,
    })
}

async fn render_prepared<R: PdfRenderer>(
    renderer: &R,
    source: PathBuf,
    prepared: PreparedDocument,
    output: &Path,
    config: &ConversionConfig,
    total_start: Instant,
) -> Result<ConversionStats, ConversionError> {
    if !prepared.report.unsupported.is_empty() {
        warn!(
            "{}: {} reference(s) to formats the browser cannot display",
            source.display(),
            prepared.report.unsupported.len()
        );
    }

    ensure_parent(output).await?;

    let render_start = Instant::now();
    debug!("Rendering with {}", renderer.name());
    renderer
        .render(&prepared.html, output, &config.print)
        .await
        .map_err(|e| ConversionError::Render {
            path: source.clone(),
            source: e,
        })?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;

    let output_bytes = tokio::fs::metadata(output)
        .await
        .map(|m| m.len())
        .map_err(|e| ConversionError::OutputWriteFailed {
            path: output.to_path_buf(),
            source: e,
        })?;

    let stats = build_stats(source, output, &prepared, output_bytes, render_duration_ms, total_start);
    info!(
        "Converted {} → {} ({} bytes, {}ms)",
        stats.input.display(),
        stats.output.display(),
        stats.output_bytes,
        stats.total_duration_ms
    );
    Ok(stats)
}

async fn ensure_parent(path: &Path) -> Result<(), ConversionError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ConversionError::OutputWriteFailed {
                path: path.to_path_buf(),
                source: e,
            }),
        _ => Ok(()),
    }
}

fn build_stats(
    source: PathBuf,
    output: &Path,
    prepared: &PreparedDocument,
    output_bytes: u64,
    render_duration_ms: u64,
    total_start: Instant,
) -> ConversionStats {
    ConversionStats {
        input: source,
        output: output.to_path_buf(),
        parts: prepared.parts,
        inlined_resources: prepared.report.inlined,
        unresolved_references: prepared.report.unresolved.clone(),
        unsupported_references: prepared.report.unsupported.clone(),
        html_bytes: prepared.html.len(),
        output_bytes,
        render_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    }
}
