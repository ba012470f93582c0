//! Result types returned by conversions, batches and inspection.
//!
//! Everything here is plain serialisable data so the CLI can print it as
//! JSON (`--json`) and callers can log or persist it.

use crate::error::JobFailure;
use crate::pipeline::mime::MhtmlDocument;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Statistics for one successful conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStats {
    pub input: PathBuf,
    pub output: PathBuf,
    /// MIME parts in the container, root included.
    pub parts: usize,
    /// Distinct parts embedded into the HTML.
    pub inlined_resources: usize,
    /// References that matched no part.
    pub unresolved_references: Vec<String>,
    /// References to parts the browser cannot display.
    pub unsupported_references: Vec<String>,
    /// Size of the self-contained HTML handed to the renderer.
    pub html_bytes: usize,
    /// Size of the written output file.
    pub output_bytes: u64,
    /// Time spent in the render driver (0 for HTML-only output).
    pub render_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// What happened to one job of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum JobOutcome {
    Converted {
        input: PathBuf,
        output: PathBuf,
        stats: ConversionStats,
    },
    /// Output already existed and was a valid PDF.
    Skipped { input: PathBuf, output: PathBuf },
    Failed {
        input: PathBuf,
        output: PathBuf,
        error: JobFailure,
    },
}

impl JobOutcome {
    pub fn input(&self) -> &std::path::Path {
        match self {
            JobOutcome::Converted { input, .. }
            | JobOutcome::Skipped { input, .. }
            | JobOutcome::Failed { input, .. } => input,
        }
    }

    pub fn output(&self) -> &std::path::Path {
        match self {
            JobOutcome::Converted { output, .. }
            | JobOutcome::Skipped { output, .. }
            | JobOutcome::Failed { output, .. } => output,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, JobOutcome::Failed { .. })
    }
}

/// Every outcome of a directory conversion, in enumeration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub outcomes: Vec<JobOutcome>,
    pub total_duration_ms: u64,
}

impl BatchReport {
    pub fn converted(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, JobOutcome::Converted { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, JobOutcome::Skipped { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failure()).count()
    }

    /// Failed jobs with their causes.
    pub fn failures(&self) -> impl Iterator<Item = (&std::path::Path, &JobFailure)> {
        self.outcomes.iter().filter_map(|o| match o {
            JobOutcome::Failed { input, error, .. } => Some((input.as_path(), error)),
            _ => None,
        })
    }

    /// True when no job failed. An empty batch is a success.
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

/// Structure of an MHTML container, as shown by `--inspect-only`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub input: PathBuf,
    pub subject: Option<String>,
    pub parts: Vec<PartSummary>,
}

/// One part of a [`DocumentSummary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartSummary {
    pub index: usize,
    pub content_type: String,
    pub transfer_encoding: String,
    pub content_location: Option<String>,
    pub content_id: Option<String>,
    /// `html`, `stylesheet`, `image` or `other`.
    pub kind: String,
    /// Decoded payload size in bytes.
    pub size: usize,
    pub is_root: bool,
}

impl DocumentSummary {
    pub fn from_document(input: PathBuf, doc: &MhtmlDocument) -> Self {
        let parts = doc
            .parts
            .iter()
            .enumerate()
            .map(|(index, part)| PartSummary {
                index,
                content_type: part.content_type.clone(),
                transfer_encoding: part.transfer_encoding.to_string(),
                content_location: part.content_location.clone(),
                content_id: part.content_id.clone(),
                kind: part.body.kind().to_string(),
                size: part.len(),
                is_root: index == doc.root_index(),
            })
            .collect();
        DocumentSummary {
            input,
            subject: doc.subject.clone(),
            parts,
        }
    }
}
