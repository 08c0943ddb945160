//! Matches a batch response back to the records of the group that produced it.
//!
//! A batch response is only a claim: ids may be missing, repeated, or never requested.
//! Reconciliation gives every record of the group exactly one definite outcome.

use super::record::{ClassificationOutcome, FailureKind, InputRecord, OutputRecord};
use crate::{
    backends::{BackendError, BatchClassificationResponse, ClassificationResponse},
    quality::QualityIssue,
};
use std::collections::{HashMap, HashSet};

pub const MISMATCH_REASON: &str = "batch mismatch: id missing in response";

/// What triage decided for one record of a group, before any backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// Failed the quality filter. No backend call.
    Skipped(QualityIssue),
    /// Cannot be submitted, e.g. it has no usable id.
    Rejected(String),
    /// Sent to the backend under this id.
    Submitted(String),
}

/// Joins `records` (in group order) with their outcomes. `dispositions[i]` belongs to
/// `records[i]`; `result` is the batch call made for the `Submitted` ones.
pub fn reconcile(
    records: Vec<InputRecord>,
    dispositions: &[Disposition],
    result: Result<BatchClassificationResponse, BackendError>,
) -> Vec<OutputRecord> {
    debug_assert_eq!(records.len(), dispositions.len());

    let mut outcomes = match result {
        Ok(response) => match_response(dispositions, response),
        Err(e) => {
            crate::error!("Batch failure: {e}");
            let outcome = ClassificationOutcome::failed(
                FailureKind::from(&e),
                format!("batch processing failed: {e}"),
            );
            submitted_ids(dispositions)
                .map(|id| (id.to_string(), Some(outcome.clone())))
                .collect()
        }
    };

    records
        .into_iter()
        .zip(dispositions)
        .map(|(record, disposition)| {
            let outcome = match disposition {
                Disposition::Skipped(issue) => ClassificationOutcome::Skipped(*issue),
                Disposition::Rejected(reason) => {
                    ClassificationOutcome::failed(FailureKind::Error, reason.clone())
                }
                Disposition::Submitted(id) => {
                    match outcomes.get_mut(id.as_str()).and_then(Option::take) {
                        Some(outcome) => outcome,
                        None => {
                            crate::warn!("Missing result for ID: {id}");
                            ClassificationOutcome::failed(FailureKind::Error, MISMATCH_REASON)
                        }
                    }
                }
            };
            OutputRecord::new(record, outcome)
        })
        .collect()
}

fn submitted_ids(dispositions: &[Disposition]) -> impl Iterator<Item = &str> {
    dispositions.iter().filter_map(|d| match d {
        Disposition::Submitted(id) => Some(id.as_str()),
        _ => None,
    })
}

/// id -> outcome for every requested id the response answered. Unknown ids and repeats
/// after the first answer are logged and dropped.
fn match_response(
    dispositions: &[Disposition],
    response: BatchClassificationResponse,
) -> HashMap<String, Option<ClassificationOutcome>> {
    let requested: HashSet<&str> = submitted_ids(dispositions).collect();
    let mut outcomes: HashMap<String, Option<ClassificationOutcome>> =
        HashMap::with_capacity(requested.len());

    for result in response.results {
        let Some(id) = result.id.clone() else {
            crate::warn!("Received result without an ID; discarding it");
            continue;
        };
        if !requested.contains(id.as_str()) {
            crate::warn!("Received unknown ID from backend: {id}");
            continue;
        }
        if outcomes.contains_key(&id) {
            crate::warn!("Received duplicate result for ID: {id}; keeping the first");
            continue;
        }
        outcomes.insert(id, Some(outcome_from(result)));
    }
    outcomes
}

fn outcome_from(mut result: ClassificationResponse) -> ClassificationOutcome {
    result.id = None;
    ClassificationOutcome::from(result)
}
