//! # confluence-doc2pdf
//!
//! Convert Confluence "Export to Word" files to PDF.
//!
//! A Confluence Word export is not a Word document. It is a MIME
//! `multipart/related` web archive (MHTML) with a `.doc` extension: one
//! HTML part plus the page's images and stylesheets, each addressed by a
//! `Content-Location`. Word opens it as a web page; everything else chokes.
//! This crate unpacks the archive, turns it back into a single
//! self-contained HTML page and has headless Chrome print it.
//!
//! ## Pipeline Overview
//!
//! ```text
//! .doc / .mhtml
//!  │
//!  ├─ 1. Input     resolve local file or download from URL
//!  ├─ 2. Decode    MIME headers, boundaries, quoted-printable / base64, charsets
//!  ├─ 3. Resolve   inline referenced parts as data: URIs (lol_html)
//!  ├─ 4. Sanitize  strip Word conditional comments, o:/v:/w: markup, mso-* styles
//!  ├─ 5. Render    headless Chrome --print-to-pdf with an injected @page rule
//!  └─ 6. Output    PDF + per-file stats, or a BatchReport for directories
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use confluence_doc2pdf::{convert_batch, convert_file, ConversionConfig, PageFormat};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::builder()
//!         .page_format(PageFormat::Letter)
//!         .build()?;
//!
//!     let stats = convert_file("Release Notes.doc", "Release Notes.pdf", &config).await?;
//!     eprintln!("{} resources inlined", stats.inlined_resources);
//!
//!     let report = convert_batch("exports/", "pdf/", &config).await?;
//!     for (input, failure) in report.failures() {
//!         eprintln!("{}: {failure}", input.display());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `doc2pdf` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! confluence-doc2pdf = { version = "0.1", default-features = false }
//! ```
//!
//! ## Browser
//!
//! PDF output needs a Chrome or Chromium executable, located by the
//! `chrome-auto` crate (`--chrome`, `CHROME_PATH`, `PATH`, common install
//! locations, the Playwright cache). [`convert_to_html`] and [`inspect`] do
//! not need a browser. Implement [`PdfRenderer`] to plug in another engine.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{
    convert_batch, convert_batch_stream, convert_batch_with, convert_jobs, plan_jobs,
    ConversionJob, OutcomeStream,
};
pub use config::{ConversionConfig, ConversionConfigBuilder, Margins, PageFormat, PrintOptions};
pub use convert::{
    convert_file, convert_file_with, convert_from_bytes, convert_path_with, convert_sync,
    convert_to_html, inspect, is_current_output, prepare_html, PreparedDocument,
};
pub use error::{ConversionError, DecodeError, JobFailure, RenderError, Stage};
pub use output::{BatchReport, ConversionStats, DocumentSummary, JobOutcome, PartSummary};
pub use pipeline::render::{ChromeRenderer, PdfRenderer};
pub use pipeline::resolve::ResolutionReport;
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
