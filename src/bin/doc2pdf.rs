//! CLI binary for confluence-doc2pdf.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use confluence_doc2pdf::{
    convert_batch, convert_file, convert_to_html, inspect, BatchProgressCallback, BatchReport,
    ConversionConfig, ConversionStats, Margins, PageFormat, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    /// Spinner until the directory walk reports how many files there are.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Scanning");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Converting");
        self.bar.reset_eta();
    }

    fn elapsed_ms(&self, index: usize) -> u128 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut times| times.remove(&index))
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0)
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_files: usize) {
        self.activate_bar(total_files);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {total_files} exports…"))
        ));
    }

    fn on_file_start(&self, index: usize, _total: usize, input: &Path) {
        if let Ok(mut times) = self.start_times.lock() {
            times.insert(index, Instant::now());
        }
        self.bar.set_message(file_label(input));
    }

    fn on_file_complete(&self, index: usize, total: usize, input: &Path, _output: &Path) {
        let elapsed_ms = self.elapsed_ms(index);
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            green("✓"),
            index,
            total,
            file_label(input),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, index: usize, total: usize, input: &Path, error: &str) {
        let elapsed_ms = self.elapsed_ms(index);

        // Only the first line; the full cause is repeated after the batch.
        let first = error.lines().next().unwrap_or_default();
        let msg = if first.chars().count() > 80 {
            format!("{}\u{2026}", first.chars().take(79).collect::<String>())
        } else {
            first.to_string()
        };

        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}  {}",
            red("✗"),
            index,
            total,
            file_label(input),
            red(&msg),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_files: usize, success_count: usize) {
        let failed = total_files.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} exports converted successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} exports converted  ({} failed)",
                if failed == total_files {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_files,
                red(&failed.to_string()),
            );
        }
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert one export next to itself (Page.doc → Page.pdf)
  doc2pdf Page.doc

  # Convert to a specific file on Letter paper
  doc2pdf Page.doc Release-Notes.pdf --page-format letter

  # Convert a whole export tree, mirroring it under pdf/
  doc2pdf exports/ pdf/ --skip-existing

  # Download an export link and convert it
  doc2pdf "https://wiki.example.com/exportword?pageId=42" page.pdf

  # Write the self-contained HTML instead of a PDF
  doc2pdf --html-only Page.doc

  # List the parts of an export (no browser needed)
  doc2pdf --inspect-only --json Page.doc

MARGINS:
  --margin 10          10 mm on every side (default: 0)
  --margin 15,20       15 mm top/bottom, 20 mm left/right
  --margin 10,15,10,15 top, right, bottom, left

ENVIRONMENT VARIABLES:
  CHROME_PATH          Chrome/Chromium executable (same as --chrome)
  DOC2PDF_*            Fallback for every flag, e.g. DOC2PDF_PAGE_FORMAT=letter
  RUST_LOG             Override the log filter (e.g. RUST_LOG=confluence_doc2pdf=debug)

SETUP:
  A Chrome or Chromium install is required for PDF output. It is found on
  PATH, in the usual install locations, or in the Playwright browser cache.
  In containers running as root, add --no-sandbox.
"#;

/// Convert Confluence Word exports (MHTML .doc files) to PDF.
#[derive(Parser, Debug)]
#[command(
    name = "doc2pdf",
    version,
    about = "Convert Confluence Word exports (MHTML .doc) to PDF",
    long_about = "Convert Confluence \"Export to Word\" files, which are MHTML web archives \
with a .doc extension, into print-ready PDFs. Images and stylesheets embedded in the \
archive are inlined, Word-specific markup is stripped, and headless Chrome prints the result. \
Pass a directory to convert every export under it.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Export file, export URL, or a directory of exports.
    input: String,

    /// Output file (single mode) or directory (batch mode).
    #[arg(env = "DOC2PDF_OUTPUT")]
    output: Option<PathBuf>,

    /// Paper size: a4, a3, a5, letter, legal, tabloid or WxH in mm.
    #[arg(long, env = "DOC2PDF_PAGE_FORMAT")]
    page_format: Option<PageFormat>,

    /// Page margins in mm: 10, 15,20 or 10,15,10,15.
    #[arg(long, env = "DOC2PDF_MARGIN")]
    margin: Option<Margins>,

    /// Do not print background colours and images.
    #[arg(long, env = "DOC2PDF_NO_BACKGROUND")]
    no_background: bool,

    /// Per-document render timeout in seconds.
    #[arg(long, env = "DOC2PDF_TIMEOUT", default_value_t = 60)]
    timeout: u64,

    /// Path to the Chrome/Chromium executable.
    #[arg(long, env = "DOC2PDF_CHROME")]
    chrome: Option<PathBuf>,

    /// Launch Chrome with --no-sandbox (containers running as root).
    #[arg(long, env = "DOC2PDF_NO_SANDBOX")]
    no_sandbox: bool,

    /// Skip exports whose output already is a valid PDF.
    #[arg(long, env = "DOC2PDF_SKIP_EXISTING")]
    skip_existing: bool,

    /// Only convert exports directly inside the input directory.
    #[arg(long, env = "DOC2PDF_NO_RECURSIVE")]
    no_recursive: bool,

    /// Write the self-contained HTML instead of a PDF (single mode).
    #[arg(long, env = "DOC2PDF_HTML_ONLY", conflicts_with = "inspect_only")]
    html_only: bool,

    /// List the parts of the export only, no conversion.
    #[arg(long)]
    inspect_only: bool,

    /// Print results as JSON on stdout.
    #[arg(long, env = "DOC2PDF_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOC2PDF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOC2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOC2PDF_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds for URL inputs.
    #[arg(long, env = "DOC2PDF_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let batch_mode = Path::new(&cli.input).is_dir();
    check_mode(&cli, batch_mode)?;

    // ── Logging setup ────────────────────────────────────────────────────
    // The bar replaces INFO logs in batch mode.
    let show_progress = batch_mode && !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let config = build_config(&cli, None)?;
        let summary = inspect(&cli.input, &config)
            .await
            .context("Failed to inspect export")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
            );
        } else {
            println!("File:     {}", summary.input.display());
            if let Some(ref s) = summary.subject {
                println!("Subject:  {}", s);
            }
            println!("Parts:    {}", summary.parts.len());
            for part in &summary.parts {
                println!(
                    "  {}{:>3}  {:<28} {:<17} {:>9} B  {}",
                    if part.is_root { "*" } else { " " },
                    part.index,
                    part.content_type,
                    part.transfer_encoding,
                    part.size,
                    part.content_location
                        .as_deref()
                        .or(part.content_id.as_deref())
                        .unwrap_or("-"),
                );
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    // ── Batch mode ───────────────────────────────────────────────────────
    if batch_mode {
        let progress_cb: Option<ProgressCallback> = if show_progress {
            Some(CliProgressCallback::new_dynamic() as Arc<dyn BatchProgressCallback>)
        } else {
            None
        };
        let config = build_config(&cli, progress_cb)?;
        let output_dir = cli
            .output
            .clone()
            .unwrap_or_else(|| PathBuf::from(&cli.input));

        let report = convert_batch(&cli.input, &output_dir, &config)
            .await
            .context("Batch conversion failed")?;
        print_report(&cli, &report)?;

        return Ok(if report.is_success() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    // ── Single file ──────────────────────────────────────────────────────
    let config = build_config(&cli, None)?;
    let extension = if cli.html_only { "html" } else { "pdf" };
    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output(&cli.input, extension));

    let stats = if cli.html_only {
        convert_to_html(&cli.input, &output_path, &config).await
    } else {
        convert_file(&cli.input, &output_path, &config).await
    }
    .context("Conversion failed")?;

    print_stats(&cli, &stats)?;
    Ok(ExitCode::SUCCESS)
}

/// Reject flags that only make sense for a single export.
fn check_mode(cli: &Cli, batch_mode: bool) -> Result<()> {
    if !batch_mode {
        return Ok(());
    }
    if cli.html_only {
        anyhow::bail!(
            "--html-only writes a single HTML file; '{}' is a directory",
            cli.input
        );
    }
    if cli.inspect_only {
        anyhow::bail!(
            "--inspect-only reads a single export; '{}' is a directory",
            cli.input
        );
    }
    Ok(())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .print_background(!cli.no_background)
        .render_timeout_secs(cli.timeout)
        .no_sandbox(cli.no_sandbox)
        .recursive(!cli.no_recursive)
        .skip_existing(cli.skip_existing)
        .download_timeout_secs(cli.download_timeout);

    if let Some(format) = cli.page_format {
        builder = builder.page_format(format);
    }
    if let Some(margins) = cli.margin {
        builder = builder.margins(margins);
    }
    if let Some(ref chrome) = cli.chrome {
        builder = builder.chrome_path(chrome);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// `Page.doc` → `Page.pdf`; URLs use their last path segment in the
/// current directory.
fn default_output(input: &str, extension: &str) -> PathBuf {
    if input.starts_with("http://") || input.starts_with("https://") {
        let stem = input
            .split(['?', '#'])
            .next()
            .and_then(|path| path.rsplit('/').next())
            .and_then(|last| Path::new(last).file_stem())
            .filter(|stem| !stem.is_empty())
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "export".to_string());
        return PathBuf::from(format!("{stem}.{extension}"));
    }
    Path::new(input).with_extension(extension)
}

fn print_stats(cli: &Cli, stats: &ConversionStats) -> Result<()> {
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(stats).context("Failed to serialise stats")?
        );
        return Ok(());
    }
    if cli.quiet {
        return Ok(());
    }

    eprintln!(
        "{}  {} parts  {} inlined  {}ms  →  {}",
        if stats.unresolved_references.is_empty() {
            green("✔")
        } else {
            cyan("⚠")
        },
        stats.parts,
        stats.inlined_resources,
        stats.total_duration_ms,
        bold(&stats.output.display().to_string()),
    );
    for reference in &stats.unresolved_references {
        eprintln!("   {} unresolved: {}", cyan("⚠"), dim(reference));
    }
    for reference in &stats.unsupported_references {
        eprintln!("   {} not displayable: {}", cyan("⚠"), dim(reference));
    }
    Ok(())
}

fn print_report(cli: &Cli, report: &BatchReport) -> Result<()> {
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(report).context("Failed to serialise report")?
        );
    } else if !cli.quiet && cli.no_progress {
        // Without the bar nothing has summarised the run yet.
        eprintln!(
            "Converted {}/{} exports in {}ms ({} skipped)",
            report.converted() + report.skipped(),
            report.outcomes.len(),
            report.total_duration_ms,
            report.skipped(),
        );
    }

    // Failures always go to stderr, even with --quiet or --json.
    if !report.is_success() {
        eprintln!("{} {} failed:", red("✘"), report.failed());
        for (input, failure) in report.failures() {
            eprintln!("  {}  {}", bold(&input.display().to_string()), failure);
        }
    }
    Ok(())
}
