//! Pipeline stages for MHTML-to-PDF conversion.
//!
//! Each submodule implements one transformation step and can be tested on
//! its own; only [`input`] and [`render`] touch the file system or spawn
//! processes.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ mime ──▶ resolve ──▶ sanitize ──▶ render
//! (URL/path) (parts)  (data: URIs) (Word cleanup) (Chrome)
//!             ▲
//!          transfer
//!       (QP / base64)
//! ```
//!
//! 1. [`input`]    canonicalise the user-supplied path or URL to a local file
//! 2. [`mime`]     split the container into typed parts and pick the root HTML;
//!    bodies are decoded by [`transfer`]
//! 3. [`resolve`]  rewrite `src`/`href`/`background` references to `data:` URIs
//! 4. [`sanitize`] drop Office-only markup the browser would otherwise show
//! 5. [`render`]   print the HTML to PDF with a [`render::PdfRenderer`]

pub mod input;
pub mod mime;
pub mod render;
pub mod resolve;
pub mod sanitize;
pub mod transfer;
