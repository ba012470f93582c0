//! PDF rendering: print self-contained HTML through headless Chrome.
//!
//! ## Session lifecycle
//!
//! Every call gets its own [`RenderSession`]: a temp directory holding the
//! HTML page, a throw-away browser profile and the PDF Chrome writes. The
//! browser child is spawned with `kill_on_drop`, so a timeout or an early
//! `?` return kills it, and dropping the session removes the directory.
//! Nothing outlives the call except the PDF moved to its destination.
//!
//! ## Page layout
//!
//! Chrome's command-line printer has no flags for paper size or margins.
//! Both are expressed as an `@page` rule injected into the document head;
//! the background flag becomes `print-color-adjust: exact`.

use crate::config::{ConversionConfig, PrintOptions};
use crate::error::RenderError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info};

/// Lines of browser stderr kept in [`RenderError::EngineFailed`].
const STDERR_TAIL_LINES: usize = 12;

/// Anything that can print an HTML document to a PDF file.
///
/// The orchestrator is generic over this trait; [`ChromeRenderer`] is the
/// production implementation.
pub trait PdfRenderer: Send + Sync {
    /// Short engine description for logs.
    fn name(&self) -> String;

    /// Print `html` to a PDF at `output`, replacing any existing file.
    fn render(
        &self,
        html: &str,
        output: &Path,
        print: &PrintOptions,
    ) -> impl Future<Output = Result<(), RenderError>> + Send;
}

/// Headless Chrome/Chromium driven through `--print-to-pdf`.
#[derive(Debug, Clone)]
pub struct ChromeRenderer {
    executable: PathBuf,
    timeout: Duration,
    no_sandbox: bool,
}

impl ChromeRenderer {
    /// Use `executable` with a 60 s timeout and the sandbox enabled.
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            timeout: Duration::from_secs(60),
            no_sandbox: false,
        }
    }

    /// Locate a browser via `chrome-auto` and apply the config's render settings.
    pub fn from_config(config: &ConversionConfig) -> Result<Self, RenderError> {
        let executable = chrome_auto::find_chrome(config.chrome_path.as_deref())?;
        info!("Using browser: {}", executable.display());
        Ok(Self::new(executable)
            .with_timeout(Duration::from_secs(config.render_timeout_secs))
            .with_no_sandbox(config.no_sandbox))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_no_sandbox(mut self, no_sandbox: bool) -> Self {
        self.no_sandbox = no_sandbox;
        self
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    fn args(&self, session: &RenderSession) -> Result<Vec<String>, RenderError> {
        let page_url = reqwest::Url::from_file_path(session.html_path()).map_err(|_| {
            RenderError::InvalidOutput {
                path: session.html_path(),
                detail: "session path is not absolute".into(),
            }
        })?;

        let mut args = vec![
            "--headless".to_string(),
            "--disable-gpu".to_string(),
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
            "--disable-extensions".to_string(),
            "--disable-background-networking".to_string(),
            "--hide-scrollbars".to_string(),
            "--mute-audio".to_string(),
            "--run-all-compositor-stages-before-draw".to_string(),
            format!("--user-data-dir={}", session.profile_dir().display()),
            "--no-pdf-header-footer".to_string(),
            "--print-to-pdf-no-header".to_string(),
            format!("--print-to-pdf={}", session.pdf_path().display()),
        ];
        if self.no_sandbox {
            args.push("--no-sandbox".to_string());
        }
        args.push(page_url.to_string());
        Ok(args)
    }
}

impl PdfRenderer for ChromeRenderer {
    fn name(&self) -> String {
        self.executable.display().to_string()
    }

    async fn render(
        &self,
        html: &str,
        output: &Path,
        print: &PrintOptions,
    ) -> Result<(), RenderError> {
        let session = RenderSession::new()?;
        tokio::fs::write(session.html_path(), inject_print_styles(html, print)).await?;
        tokio::fs::create_dir_all(session.profile_dir()).await?;

        let args = self.args(&session)?;
        debug!("Launching {} {}", self.executable.display(), args.join(" "));

        let child = tokio::process::Command::new(&self.executable)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RenderError::LaunchFailed {
                engine: self.executable.clone(),
                source,
            })?;

        let result = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| RenderError::Timeout {
                secs: self.timeout.as_secs(),
            })??;

        if !result.status.success() {
            return Err(RenderError::EngineFailed {
                engine: self.executable.clone(),
                status: result.status.to_string(),
                stderr: stderr_tail(&result.stderr),
            });
        }

        let pdf_path = session.pdf_path();
        let bytes = tokio::fs::read(&pdf_path)
            .await
            .map_err(|e| RenderError::InvalidOutput {
                path: pdf_path.clone(),
                detail: format!("browser wrote no file ({e})"),
            })?;
        if !is_valid_pdf(&bytes) {
            return Err(RenderError::InvalidOutput {
                path: pdf_path,
                detail: format!("{} bytes that do not parse as a PDF with pages", bytes.len()),
            });
        }

        persist(&pdf_path, output).await?;
        debug!("Printed {} bytes to {}", bytes.len(), output.display());
        Ok(())
    }
}

// ── Session ──────────────────────────────────────────────────────────────

/// Scoped working directory for one render. Removed on drop.
pub struct RenderSession {
    dir: TempDir,
}

impl RenderSession {
    pub fn new() -> std::io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("doc2pdf-").tempdir()?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn html_path(&self) -> PathBuf {
        self.dir.path().join("page.html")
    }

    pub fn profile_dir(&self) -> PathBuf {
        self.dir.path().join("profile")
    }

    pub fn pdf_path(&self) -> PathBuf {
        self.dir.path().join("page.pdf")
    }
}

/// Move `from` to `to`.
///
/// The session directory usually lives on another filesystem than the
/// destination, so a failed rename falls back to copying next to the
/// destination and renaming there. Readers never see a half-written PDF.
async fn persist(from: &Path, to: &Path) -> Result<(), RenderError> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    let staging = to.with_extension("pdf.tmp");
    tokio::fs::copy(from, &staging).await?;
    if let Err(e) = tokio::fs::rename(&staging, to).await {
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(e.into());
    }
    Ok(())
}

// ── Print styles ─────────────────────────────────────────────────────────

static RE_HEAD_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</head\s*>").unwrap());
static RE_HTML_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<html\b[^>]*>").unwrap());

/// CSS carrying the page layout.
pub fn print_stylesheet(print: &PrintOptions) -> String {
    let mut css = format!(
        "@page {{ size: {}; margin: {}; }}",
        print.page_format.css_size(),
        print.margins.css()
    );
    if print.print_background {
        css.push_str(" html { -webkit-print-color-adjust: exact; print-color-adjust: exact; }");
    }
    css
}

/// Insert [`print_stylesheet`] at the end of the document head.
pub fn inject_print_styles(html: &str, print: &PrintOptions) -> String {
    let style = format!(
        "<style id=\"doc2pdf-print\">{}</style>",
        print_stylesheet(print)
    );

    if let Some(m) = RE_HEAD_CLOSE.find(html) {
        return format!("{}{}{}", &html[..m.start()], style, &html[m.start()..]);
    }
    if let Some(m) = RE_HTML_OPEN.find(html) {
        return format!(
            "{}<head>{}</head>{}",
            &html[..m.end()],
            style,
            &html[m.end()..]
        );
    }
    format!("{style}{html}")
}

// ── Validation ───────────────────────────────────────────────────────────

/// Number of pages in `bytes`, or None if it does not load as a PDF.
pub fn pdf_page_count(bytes: &[u8]) -> Option<usize> {
    if !bytes.starts_with(b"%PDF-") {
        return None;
    }
    match lopdf::Document::load_mem(bytes) {
        Ok(doc) => Some(doc.get_pages().len()),
        Err(e) => {
            debug!("PDF did not load: {}", e);
            None
        }
    }
}

/// A PDF that loads and has at least one page.
pub fn is_valid_pdf(bytes: &[u8]) -> bool {
    pdf_page_count(bytes).is_some_and(|pages| pages > 0)
}

/// [`is_valid_pdf`] for a file. Unreadable files are not valid.
pub fn is_valid_pdf_file(path: &Path) -> bool {
    std::fs::read(path)
        .map(|bytes| is_valid_pdf(&bytes))
        .unwrap_or(false)
}

/// A one-page A4 PDF, for tests that need a valid output.
#[cfg(test)]
pub(crate) fn one_page_pdf() -> Vec<u8> {
    use lopdf::{dictionary, Document, Object};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.trim().lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    let tail = lines[start..].join("\n");
    if tail.is_empty() {
        "(no output)".to_string()
    } else {
        tail
    }
}
