use crate::{backends::ClassificationResponse, quality::QualityIssue};
use std::{collections::HashMap, sync::Arc};

pub const CATEGORY_COLUMN: &str = "grievance_category";
pub const REASONING_COLUMN: &str = "reasoning";
pub const LANGUAGE_COLUMN: &str = "language";
pub const TRANSLATION_COLUMN: &str = "translation";

/// Appended to every output row, in this order. Input columns with these names are
/// replaced by the outcome.
pub const OUTCOME_COLUMNS: [&str; 4] = [
    CATEGORY_COLUMN,
    REASONING_COLUMN,
    LANGUAGE_COLUMN,
    TRANSLATION_COLUMN,
];

/// Column layout of the input dataset, shared by every record read from it.
#[derive(Debug, Clone, PartialEq)]
pub struct InputSchema {
    columns: Vec<String>,
    index: HashMap<String, usize>,
}

impl InputSchema {
    pub fn new(columns: Vec<String>) -> Self {
        let mut index = HashMap::with_capacity(columns.len());
        for (i, column) in columns.iter().enumerate() {
            index.entry(column.clone()).or_insert(i);
        }
        Self { columns, index }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.index.get(column).copied()
    }

    pub fn contains(&self, column: &str) -> bool {
        self.index.contains_key(column)
    }

    /// Input columns that survive into the output, followed by the outcome columns.
    pub fn output_columns(&self) -> Vec<String> {
        self.passthrough_columns()
            .map(|(_, c)| c.clone())
            .chain(OUTCOME_COLUMNS.iter().map(|c| c.to_string()))
            .collect()
    }

    fn passthrough_columns(&self) -> impl Iterator<Item = (usize, &String)> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| !OUTCOME_COLUMNS.contains(&c.as_str()))
    }
}

/// One row of the input dataset. Never mutated after it is read.
#[derive(Debug, Clone, PartialEq)]
pub struct InputRecord {
    /// 0-based data row index in the input dataset.
    pub position: usize,
    schema: Arc<InputSchema>,
    values: Vec<String>,
}

impl InputRecord {
    /// `values` is padded or truncated to the schema width.
    pub fn new(position: usize, schema: Arc<InputSchema>, mut values: Vec<String>) -> Self {
        values.resize(schema.columns().len(), String::new());
        Self {
            position,
            schema,
            values,
        }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.schema
            .position(column)
            .and_then(|i| self.values.get(i))
            .map(String::as_str)
    }

    pub fn schema(&self) -> &Arc<InputSchema> {
        &self.schema
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Transport or protocol failure, or no result for the record.
    Error,
    /// The provider's content-safety filter rejected the request.
    Filtered,
    /// The provider answered, but not with parseable JSON.
    Unclassified,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Error => "error",
            FailureKind::Filtered => "filtered",
            FailureKind::Unclassified => "unclassified",
        }
    }
}

impl From<&crate::backends::BackendError> for FailureKind {
    fn from(e: &crate::backends::BackendError) -> Self {
        match e.category() {
            "filtered" => FailureKind::Filtered,
            "unclassified" => FailureKind::Unclassified,
            _ => FailureKind::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClassificationOutcome {
    Skipped(QualityIssue),
    Classified {
        category: String,
        reasoning: String,
        language: Option<String>,
        translation: Option<String>,
    },
    Failed {
        kind: FailureKind,
        reason: String,
    },
}

impl ClassificationOutcome {
    pub fn failed<S: Into<String>>(kind: FailureKind, reason: S) -> Self {
        ClassificationOutcome::Failed {
            kind,
            reason: reason.into(),
        }
    }

    pub fn from_error(e: &crate::backends::BackendError) -> Self {
        ClassificationOutcome::failed(e.into(), e.to_string())
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, ClassificationOutcome::Skipped(_))
    }

    pub fn is_classified(&self) -> bool {
        matches!(self, ClassificationOutcome::Classified { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ClassificationOutcome::Failed { .. })
    }

    /// Values for [`OUTCOME_COLUMNS`].
    pub fn columns(&self) -> [String; 4] {
        match self {
            ClassificationOutcome::Skipped(issue) => [
                String::new(),
                format!("skipped_{}", issue.as_str()),
                String::new(),
                String::new(),
            ],
            ClassificationOutcome::Classified {
                category,
                reasoning,
                language,
                translation,
            } => [
                category.clone(),
                reasoning.clone(),
                language.clone().unwrap_or_default(),
                translation.clone().unwrap_or_default(),
            ],
            ClassificationOutcome::Failed { kind, reason } => [
                kind.as_str().to_string(),
                reason.clone(),
                String::new(),
                String::new(),
            ],
        }
    }
}

impl From<ClassificationResponse> for ClassificationOutcome {
    fn from(response: ClassificationResponse) -> Self {
        ClassificationOutcome::Classified {
            category: response.category,
            reasoning: response.reasoning,
            language: response.language,
            translation: response.translation,
        }
    }
}

/// An input record joined with its single outcome. Written once, never updated.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRecord {
    pub record: InputRecord,
    pub outcome: ClassificationOutcome,
}

impl OutputRecord {
    pub fn new(record: InputRecord, outcome: ClassificationOutcome) -> Self {
        Self { record, outcome }
    }

    /// Field values in [`InputSchema::output_columns`] order.
    pub fn to_row(&self) -> Vec<String> {
        let schema = self.record.schema();
        schema
            .passthrough_columns()
            .map(|(i, _)| self.record.values()[i].clone())
            .chain(self.outcome.columns())
            .collect()
    }
}
