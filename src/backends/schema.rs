//! The JSON shape every backend is asked to produce, and the tolerant parsing of what
//! comes back.

use super::error::BackendError;
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};

/// One (id, comment) pair of a batch request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub id: String,
    pub text: String,
}

impl BatchItem {
    pub fn new<I: Into<String>, T: Into<String>>(id: I, text: T) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResponse {
    /// Echo of the request id. Only meaningful for batch responses.
    #[serde(default, deserialize_with = "deserialize_id")]
    pub id: Option<String>,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub translation: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchClassificationResponse {
    #[serde(default)]
    pub results: Vec<ClassificationResponse>,
}

fn default_category() -> String {
    crate::prompt::UNCLASSIFIED_CATEGORY.to_string()
}

/// Models echo ids back as strings or numbers. Both are accepted.
fn deserialize_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// Schema of a single-item reply.
pub fn classification_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "id": {
                "type": "string",
                "description": "The unique identifier provided in the input"
            },
            "language": {
                "type": "string",
                "description": "Detected language code, e.g. en, mr, hi"
            },
            "translation": {
                "type": "string",
                "description": "English translation of the comment (copy original if already English)"
            },
            "reasoning": {
                "type": "string",
                "description": "Explanation for the classification"
            },
            "category": {
                "type": "string",
                "description": "The classification category"
            }
        },
        "required": ["language", "translation", "reasoning", "category"]
    })
}

/// Schema of a batch reply: one result per input id.
pub fn batch_classification_schema() -> serde_json::Value {
    let mut item = classification_schema();
    item["required"] = serde_json::json!(["id", "language", "translation", "reasoning", "category"]);
    serde_json::json!({
        "type": "object",
        "properties": {
            "results": {
                "type": "array",
                "description": "List of classification results corresponding to the input comments",
                "items": item
            }
        },
        "required": ["results"]
    })
}

/// Appended to every prompt so providers without a schema parameter still answer in shape.
pub fn json_instruction(schema: &serde_json::Value) -> String {
    format!("Respond in JSON matching this schema:\n{schema}")
}

pub fn format_batch_input(items: &[BatchItem]) -> String {
    items
        .iter()
        .map(|item| format!("ID: {}\nComment: {}\n", item.id, item.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Removes a surrounding markdown code fence (```json ... ``` or ``` ... ```).
pub fn strip_markdown_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let inner = if let Some(rest) = trimmed.strip_prefix("```json") {
        rest
    } else if let Some(rest) = trimmed.strip_prefix("```") {
        rest
    } else {
        return trimmed;
    };
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

pub fn parse_payload<T: DeserializeOwned>(raw: &str) -> Result<T, BackendError> {
    let payload = strip_markdown_fence(raw);
    if payload.is_empty() {
        return Err(BackendError::EmptyPayload(
            "response contained no text".to_string(),
        ));
    }
    serde_json::from_str(payload).map_err(|source| {
        crate::error!("Failed to decode JSON response: {}", raw);
        BackendError::MalformedPayload {
            raw: raw.to_string(),
            source,
        }
    })
}
