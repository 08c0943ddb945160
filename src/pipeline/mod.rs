//! The pipeline driver: read a group, classify it, append the outcomes, repeat.
//!
//! Groups are dispatched in cohorts of `llm.max_concurrency`. A cohort's outcomes are
//! flattened in read order and appended as one durable write before the next group is
//! read, so the output is always an order-preserving prefix of the input and a run can be
//! resumed by counting the rows already written.

pub mod checkpoint;
pub mod dataset;
pub mod progress;
pub mod reconcile;
pub mod record;

pub use checkpoint::CheckpointTracker;
pub use dataset::{count_data_rows, DatasetError, InputReader, OutputWriter};
pub use progress::ProgressReporter;
pub use reconcile::{reconcile, Disposition, MISMATCH_REASON};
pub use record::{ClassificationOutcome, FailureKind, InputRecord, OutputRecord};

use crate::{
    backends::{BatchClassificationResponse, BatchItem, Classifier},
    config::{AppConfig, ConfigError, ProcessingMode, TextEncoding},
    prompt::PromptSource,
    quality::QualityFilter,
};
use encoding_rs::Encoding;
use futures::future::join_all;
use std::{collections::HashSet, fmt, future::Future};
use tokio::sync::Semaphore;

pub const NO_ID_REASON: &str = "missing id";
pub const DUPLICATE_ID_REASON: &str = "duplicate id in batch request";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    Read,
    Write,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Init => write!(f, "init"),
            Stage::Read => write!(f, "read"),
            Stage::Write => write!(f, "write"),
        }
    }
}

/// A failure that ends the run. Output written before it stays valid and resumable.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("init failed: {0}")]
    Init(DatasetError),
    #[error("read failed: {0}")]
    Read(DatasetError),
    #[error("write failed: {0}")]
    Write(DatasetError),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Init(_) => Stage::Init,
            PipelineError::Read(_) => Stage::Read,
            PipelineError::Write(_) => Stage::Write,
        }
    }

    pub fn cause(&self) -> &DatasetError {
        match self {
            PipelineError::Init(e) | PipelineError::Read(e) | PipelineError::Write(e) => e,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Data rows already in the output when the run started.
    pub resumed_from: usize,
    /// Input data rows, if they could be counted.
    pub total_rows: Option<usize>,
    pub skipped: usize,
    pub classified: usize,
    pub failed: usize,
    /// Rows appended by this run.
    pub written: usize,
}

impl RunSummary {
    fn record(&mut self, outputs: &[OutputRecord]) {
        let count = |pred: fn(&ClassificationOutcome) -> bool| {
            outputs.iter().filter(|o| pred(&o.outcome)).count()
        };
        self.skipped += count(ClassificationOutcome::is_skipped);
        self.classified += count(ClassificationOutcome::is_classified);
        self.failed += count(ClassificationOutcome::is_failed);
        self.written += outputs.len();
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "written {} rows (classified {}, skipped {}, failed {}); resumed from row {}",
            self.written, self.classified, self.skipped, self.failed, self.resumed_from
        )?;
        if let Some(total) = self.total_rows {
            write!(f, "; {total} input rows")?;
        }
        Ok(())
    }
}

pub struct Pipeline<B: Classifier> {
    config: AppConfig,
    backend: B,
    system_prompt: String,
    valid_categories: HashSet<String>,
    filter: QualityFilter,
    gate: Semaphore,
    input_encoding: &'static Encoding,
    output_encoding: TextEncoding,
}

impl<B: Classifier> Pipeline<B> {
    pub fn new(config: AppConfig, backend: B, prompts: &PromptSource) -> Result<Self, ConfigError> {
        Self::with_prompt(
            config,
            backend,
            prompts.system_prompt(),
            prompts.valid_categories(),
        )
    }

    /// Builds a pipeline from an already rendered system prompt.
    pub fn with_prompt<S: Into<String>>(
        config: AppConfig,
        backend: B,
        system_prompt: S,
        valid_categories: Vec<String>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let input_encoding = config.input_encoding()?;
        let output_encoding = config.output_encoding()?;
        let gate = Semaphore::new(config.llm.max_concurrency);
        Ok(Self {
            config,
            backend,
            system_prompt: system_prompt.into(),
            valid_categories: valid_categories.into_iter().collect(),
            filter: QualityFilter::default(),
            gate,
            input_encoding,
            output_encoding,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Processes every input row not yet present in the output.
    ///
    /// Per-record and per-group failures become `Failed` outcomes. Only dataset I/O
    /// errors end the run early.
    pub async fn run(&self) -> Result<RunSummary, PipelineError> {
        let processing = &self.config.processing;

        let processed = CheckpointTracker::new(&self.config.output_file)
            .count_processed()
            .map_err(PipelineError::Init)?;
        let total_rows = match count_data_rows(&self.config.input_file) {
            Ok(total) => Some(total),
            Err(e) => {
                crate::warn!("Could not count input rows for progress: {e}");
                None
            }
        };
        let mut summary = RunSummary {
            resumed_from: processed,
            total_rows,
            ..Default::default()
        };
        if processed > 0 {
            crate::info!("Resuming: skipping {processed} rows already in the output");
        }

        let mut reader = InputReader::open(&self.config.input_file, self.input_encoding, processed)
            .map_err(PipelineError::Read)?;
        if reader.position() < processed {
            crate::warn!(
                "Output holds {processed} rows but the input only {}; nothing left to classify",
                reader.position()
            );
        }
        reader
            .require_column(&processing.comment_column)
            .map_err(PipelineError::Read)?;
        if processing.mode == ProcessingMode::Batch {
            reader
                .require_column(&processing.id_column)
                .map_err(PipelineError::Read)?;
        }
        let columns = reader.schema().output_columns();
        let mut writer = OutputWriter::new(&self.config.output_file, self.output_encoding);
        let progress = ProgressReporter::new(total_rows, processed, processing.show_progress);

        let cohort_size = self.config.llm.max_concurrency;
        loop {
            let mut cohort = Vec::with_capacity(cohort_size);
            while cohort.len() < cohort_size {
                let group = reader
                    .next_group(processing.batch_size)
                    .map_err(PipelineError::Read)?;
                if group.is_empty() {
                    break;
                }
                cohort.push(group);
            }
            if cohort.is_empty() {
                break;
            }

            let first_row = cohort[0][0].position;
            let outputs: Vec<OutputRecord> =
                join_all(cohort.into_iter().map(|group| self.classify_group(group)))
                    .await
                    .into_iter()
                    .flatten()
                    .collect();

            writer
                .append(&columns, &outputs)
                .map_err(PipelineError::Write)?;
            summary.record(&outputs);
            progress.advance(outputs.len(), &summary);
            crate::debug!(
                "Appended rows {}..{} to {}",
                first_row,
                first_row + outputs.len(),
                writer.path().display()
            );
        }

        progress.finish();
        crate::info!("Run complete: {summary}");
        Ok(summary)
    }

    /// One outcome per record of `group`, in group order.
    async fn classify_group(&self, group: Vec<InputRecord>) -> Vec<OutputRecord> {
        let outputs = match self.config.processing.mode {
            ProcessingMode::Batch => self.classify_group_batch(group).await,
            ProcessingMode::Single => self.classify_group_single(group).await,
        };
        for output in &outputs {
            self.check_category(output);
        }
        outputs
    }

    async fn classify_group_batch(&self, group: Vec<InputRecord>) -> Vec<OutputRecord> {
        let dispositions = self.triage(&group);
        let items: Vec<BatchItem> = group
            .iter()
            .zip(&dispositions)
            .filter_map(|(record, disposition)| match disposition {
                Disposition::Submitted(id) => Some(BatchItem::new(id.clone(), self.comment(record))),
                _ => None,
            })
            .collect();

        let result = if items.is_empty() {
            Ok(BatchClassificationResponse::default())
        } else {
            self.gated(self.backend.classify_batch(&items, &self.system_prompt))
                .await
        };
        reconcile(group, &dispositions, result)
    }

    async fn classify_group_single(&self, group: Vec<InputRecord>) -> Vec<OutputRecord> {
        let outcomes = join_all(group.iter().map(|record| async move {
            let text = self.comment(record);
            if let Some(issue) = self.filter.evaluate(text) {
                return ClassificationOutcome::Skipped(issue);
            }
            match self
                .gated(self.backend.classify_one(text, &self.system_prompt))
                .await
            {
                Ok(response) => ClassificationOutcome::from(response),
                Err(e) => {
                    crate::error!("Classification failed for row {}: {e}", record.position);
                    ClassificationOutcome::from_error(&e)
                }
            }
        }))
        .await;

        group
            .into_iter()
            .zip(outcomes)
            .map(|(record, outcome)| OutputRecord::new(record, outcome))
            .collect()
    }

    /// Quality filter and id checks, before anything is sent.
    fn triage(&self, group: &[InputRecord]) -> Vec<Disposition> {
        let id_column = &self.config.processing.id_column;
        let mut seen = HashSet::with_capacity(group.len());
        group
            .iter()
            .map(|record| {
                if let Some(issue) = self.filter.evaluate(self.comment(record)) {
                    return Disposition::Skipped(issue);
                }
                let id = record.get(id_column).unwrap_or_default().trim();
                if id.is_empty() {
                    crate::warn!("Row {} has no {id_column}; not submitted", record.position);
                    Disposition::Rejected(NO_ID_REASON.to_string())
                } else if !seen.insert(id) {
                    crate::warn!("Row {} repeats {id_column} {id}; not submitted", record.position);
                    Disposition::Rejected(DUPLICATE_ID_REASON.to_string())
                } else {
                    Disposition::Submitted(id.to_string())
                }
            })
            .collect()
    }

    async fn gated<F: Future>(&self, call: F) -> F::Output {
        // Acquire only fails on a closed semaphore, and the gate is never closed.
        let _permit = self
            .gate
            .acquire()
            .await
            .expect("concurrency gate is never closed");
        call.await
    }

    fn comment<'a>(&self, record: &'a InputRecord) -> &'a str {
        record
            .get(&self.config.processing.comment_column)
            .unwrap_or_default()
    }

    fn check_category(&self, output: &OutputRecord) {
        if self.valid_categories.is_empty() {
            return;
        }
        if let ClassificationOutcome::Classified { category, .. } = &output.outcome {
            if !self.valid_categories.contains(category) {
                crate::warn!(
                    "Row {} classified as unknown category `{category}`",
                    output.record.position
                );
            }
        }
    }
}
