//! Directory conversion: every export under a directory, one job at a time.
//!
//! Jobs are planned up front by walking the input directory, then run
//! sequentially. A failing job is recorded as [`JobOutcome::Failed`] and the
//! batch moves on; only a missing input directory aborts the batch. Without
//! a browser every job still runs up to the render stage, so broken exports
//! are reported as decode failures and the rest as render failures.
//!
//! [`convert_batch_stream`] yields each outcome as soon as its job finishes;
//! [`convert_batch`] collects them into a [`BatchReport`].

use crate::config::{ConversionConfig, PrintOptions};
use crate::convert::{convert_path_with, is_current_output};
use crate::error::{ConversionError, JobFailure, RenderError};
use crate::output::{BatchReport, JobOutcome};
use crate::pipeline::render::{ChromeRenderer, PdfRenderer};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tokio_stream::Stream;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// A boxed stream of job outcomes, in job order.
pub type OutcomeStream = Pin<Box<dyn Stream<Item = JobOutcome> + Send>>;

/// One input file and the PDF it becomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionJob {
    pub input: PathBuf,
    pub output: PathBuf,
}

/// Enumerate the exports under `input_dir` and map each to its output path.
///
/// Files are matched by [`ConversionConfig::accepts`] and visited in sorted
/// order. The output keeps the input's path relative to `input_dir` with the
/// extension replaced by `.pdf`. Unreadable sub-directories are skipped with
/// a warning.
pub fn plan_jobs(
    input_dir: &Path,
    output_dir: &Path,
    config: &ConversionConfig,
) -> Result<Vec<ConversionJob>, ConversionError> {
    if !input_dir.is_dir() {
        return Err(ConversionError::InputNotFound {
            path: input_dir.to_path_buf(),
        });
    }

    let mut walker = WalkDir::new(input_dir).sort_by_file_name();
    if !config.recursive {
        walker = walker.max_depth(1);
    }

    let mut jobs = Vec::new();
    let mut claimed: HashSet<PathBuf> = HashSet::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() || !config.accepts(entry.path()) {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(input_dir)
            .map_err(|e| ConversionError::Internal(e.to_string()))?;
        let output = output_dir.join(relative).with_extension("pdf");
        if !claimed.insert(output.clone()) {
            warn!(
                "{} maps to {} which another export already targets; it will be overwritten",
                entry.path().display(),
                output.display()
            );
        }
        jobs.push(ConversionJob {
            input: entry.path().to_path_buf(),
            output,
        });
    }

    debug!("Planned {} jobs under {}", jobs.len(), input_dir.display());
    Ok(jobs)
}

/// Convert every export under `input_dir` into `output_dir` using headless Chrome.
///
/// # Errors
/// Only when the input directory does not exist. Per-file failures,
/// including a missing browser, are in the report.
pub async fn convert_batch(
    input_dir: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<BatchReport, ConversionError> {
    let (input_dir, output_dir) = (input_dir.as_ref(), output_dir.as_ref());
    let jobs = plan_jobs(input_dir, output_dir, config)?;
    if jobs.is_empty() {
        info!("No exports found under {}", input_dir.display());
        if let Some(ref cb) = config.progress_callback {
            cb.on_batch_start(0);
            cb.on_batch_complete(0, 0);
        }
        return Ok(BatchReport {
            input_dir: input_dir.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            outcomes: Vec::new(),
            total_duration_ms: 0,
        });
    }

    let renderer = Arc::new(BatchRenderer::from_config(config));
    Ok(run_batch(renderer, input_dir, output_dir, jobs, config).await)
}

/// [`convert_batch`] with a caller-supplied renderer.
pub async fn convert_batch_with<R: PdfRenderer + 'static>(
    renderer: Arc<R>,
    input_dir: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<BatchReport, ConversionError> {
    let (input_dir, output_dir) = (input_dir.as_ref(), output_dir.as_ref());
    let jobs = plan_jobs(input_dir, output_dir, config)?;
    Ok(run_batch(renderer, input_dir, output_dir, jobs, config).await)
}

/// Convert every export under `input_dir`, streaming outcomes as jobs finish.
///
/// Only the per-file progress events fire; batch start and completion are
/// reported by [`convert_batch`].
///
/// # Example
/// ```rust,no_run
/// use confluence_doc2pdf::{convert_batch_stream, ConversionConfig, JobOutcome};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ConversionConfig::default();
/// let mut outcomes = convert_batch_stream("exports/", "pdf/", &config)?;
/// while let Some(outcome) = outcomes.next().await {
///     if let JobOutcome::Failed { input, error, .. } = outcome {
///         eprintln!("{}: {error}", input.display());
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub fn convert_batch_stream(
    input_dir: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<OutcomeStream, ConversionError> {
    let input_dir = input_dir.as_ref();
    let jobs = plan_jobs(input_dir, output_dir.as_ref(), config)?;
    if jobs.is_empty() {
        return Ok(Box::pin(stream::empty::<JobOutcome>()));
    }
    let renderer = Arc::new(BatchRenderer::from_config(config));
    Ok(convert_jobs(renderer, jobs, config))
}

/// Run `jobs` sequentially, yielding each outcome in order.
pub fn convert_jobs<R: PdfRenderer + 'static>(
    renderer: Arc<R>,
    jobs: Vec<ConversionJob>,
    config: &ConversionConfig,
) -> OutcomeStream {
    let total = jobs.len();
    let config = config.clone();
    let s = stream::iter(jobs.into_iter().enumerate()).then(move |(i, job)| {
        let renderer = Arc::clone(&renderer);
        let cfg = config.clone();
        async move { run_job(renderer.as_ref(), i + 1, total, job, &cfg).await }
    });
    Box::pin(s)
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// The browser a batch prints with, or why there is none.
enum BatchRenderer {
    Chrome(ChromeRenderer),
    Unavailable(String),
}

impl BatchRenderer {
    fn from_config(config: &ConversionConfig) -> Self {
        match ChromeRenderer::from_config(config) {
            Ok(chrome) => BatchRenderer::Chrome(chrome),
            Err(e) => {
                warn!("{}; every export will fail at the render stage", e);
                BatchRenderer::Unavailable(e.to_string())
            }
        }
    }
}

impl PdfRenderer for BatchRenderer {
    fn name(&self) -> String {
        match self {
            BatchRenderer::Chrome(chrome) => chrome.name(),
            BatchRenderer::Unavailable(_) => "unavailable".to_string(),
        }
    }

    async fn render(
        &self,
        html: &str,
        output: &Path,
        print: &PrintOptions,
    ) -> Result<(), RenderError> {
        match self {
            BatchRenderer::Chrome(chrome) => chrome.render(html, output, print).await,
            BatchRenderer::Unavailable(reason) => Err(RenderError::EngineUnavailable {
                reason: reason.clone(),
            }),
        }
    }
}

async fn run_batch<R: PdfRenderer + 'static>(
    renderer: Arc<R>,
    input_dir: &Path,
    output_dir: &Path,
    jobs: Vec<ConversionJob>,
    config: &ConversionConfig,
) -> BatchReport {
    let start = Instant::now();
    let total = jobs.len();
    info!("Converting {} exports from {}", total, input_dir.display());
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let outcomes: Vec<JobOutcome> = convert_jobs(renderer, jobs, config).collect().await;

    let report = BatchReport {
        input_dir: input_dir.to_path_buf(),
        output_dir: output_dir.to_path_buf(),
        outcomes,
        total_duration_ms: start.elapsed().as_millis() as u64,
    };
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(total, report.converted() + report.skipped());
    }
    info!(
        "Batch complete: {} converted, {} skipped, {} failed in {}ms",
        report.converted(),
        report.skipped(),
        report.failed(),
        report.total_duration_ms
    );
    report
}

async fn run_job<R: PdfRenderer>(
    renderer: &R,
    index: usize,
    total: usize,
    job: ConversionJob,
    config: &ConversionConfig,
) -> JobOutcome {
    let cb = config.progress_callback.as_ref();
    if let Some(cb) = cb {
        cb.on_file_start(index, total, &job.input);
    }

    if config.skip_existing && is_current_output(&job.output) {
        info!("[{index}/{total}] Skipping {}: output exists", job.input.display());
        if let Some(cb) = cb {
            cb.on_file_complete(index, total, &job.input, &job.output);
        }
        return JobOutcome::Skipped {
            input: job.input,
            output: job.output,
        };
    }

    match convert_path_with(renderer, &job.input, &job.output, config).await {
        Ok(stats) => {
            if let Some(cb) = cb {
                cb.on_file_complete(index, total, &job.input, &job.output);
            }
            JobOutcome::Converted {
                input: job.input,
                output: job.output,
                stats,
            }
        }
        Err(e) => {
            let failure = JobFailure::from(&e);
            error!("[{index}/{total}] {}: {}", job.input.display(), failure);
            if let Some(cb) = cb {
                cb.on_file_error(index, total, &job.input, &failure.to_string());
            }
            JobOutcome::Failed {
                input: job.input,
                output: job.output,
                error: failure,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Stage;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"x").unwrap();
    }

    #[test]
    fn plans_sorted_mirrored_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        touch(&input.join("b.doc"));
        touch(&input.join("a.mht"));
        touch(&input.join("space/child.MHTML"));
        touch(&input.join("notes.txt"));

        let jobs = plan_jobs(&input, Path::new("/out"), &ConversionConfig::default()).unwrap();
        let pairs: Vec<_> = jobs
            .iter()
            .map(|j| {
                (
                    j.input.strip_prefix(&input).unwrap().to_path_buf(),
                    j.output.clone(),
                )
            })
            .collect();
        assert_eq!(
            pairs,
            vec![
                (PathBuf::from("a.mht"), PathBuf::from("/out/a.pdf")),
                (PathBuf::from("b.doc"), PathBuf::from("/out/b.pdf")),
                (PathBuf::from("space/child.MHTML"), PathBuf::from("/out/space/child.pdf")),
            ]
        );
    }

    #[test]
    fn non_recursive_stays_at_top_level() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("top.doc"));
        touch(&dir.path().join("sub/deep.doc"));

        let config = ConversionConfig::builder().recursive(false).build().unwrap();
        let jobs = plan_jobs(dir.path(), Path::new("out"), &config).unwrap();
        assert_eq!(jobs.len(), 1);
        assert!(jobs[0].input.ends_with("top.doc"));
    }

    #[test]
    fn custom_extensions() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.doc"));
        touch(&dir.path().join("b.mht"));

        let config = ConversionConfig::builder().extensions(["mht"]).build().unwrap();
        let jobs = plan_jobs(dir.path(), Path::new("out"), &config).unwrap();
        assert_eq!(jobs.len(), 1);
        assert!(jobs[0].input.ends_with("b.mht"));
    }

    #[test]
    fn missing_input_dir() {
        let dir = tempfile::tempdir().unwrap();
        let err = plan_jobs(&dir.path().join("nope"), Path::new("out"), &ConversionConfig::default())
            .unwrap_err();
        assert!(matches!(err, ConversionError::InputNotFound { .. }));
    }

    #[tokio::test]
    async fn missing_browser_fails_each_job() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        std::fs::create_dir_all(&input).unwrap();
        std::fs::write(input.join("broken.doc"), b"not a MIME container").unwrap();
        std::fs::write(input.join("good.doc"), b"Content-Type: text/html\n\n<p>x</p>").unwrap();
        let config = ConversionConfig::builder()
            .chrome_path(dir.path().join("no-browser-here"))
            .build()
            .unwrap();

        let report = convert_batch(&input, dir.path().join("out"), &config)
            .await
            .unwrap();
        assert_eq!(report.failed(), 2);
        let stages: Vec<_> = report.failures().map(|(_, f)| f.stage).collect();
        assert_eq!(stages, vec![Stage::Decode, Stage::Render]);
        let (_, render_failure) = report.failures().nth(1).unwrap();
        assert!(render_failure.message.contains("no browser available"), "{}", render_failure.message);
    }

    #[tokio::test]
    async fn empty_directory_needs_no_browser() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConversionConfig::builder()
            .chrome_path(dir.path().join("no-browser-here"))
            .build()
            .unwrap();
        let report = convert_batch(dir.path(), dir.path().join("out"), &config)
            .await
            .unwrap();
        assert!(report.outcomes.is_empty());
        assert!(report.is_success());
    }
}
