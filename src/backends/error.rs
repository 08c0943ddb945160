use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The call exceeded the configured per-call timeout
    #[error("request timed out after {}s", .timeout.as_secs())]
    Timeout { timeout: Duration },
    /// Underlying error from reqwest library after an API call was made
    #[error("http error: {0}")]
    Reqwest(#[from] reqwest::Error),
    /// The provider answered with a non-success status
    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to serialize api request: {0}")]
    JSONSerialize(serde_json::Error),
    /// The provider's response envelope could not be deserialized
    #[error("failed to deserialize api response: {0}")]
    JSONDeserialize(serde_json::Error),
}

/// Everything a classify call can fail with. Never fatal to a run: the pipeline turns each
/// one into a `Failed` outcome for the affected records.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("empty payload: {0}")]
    EmptyPayload(String),
    #[error("JSON decode error: {source}")]
    MalformedPayload {
        raw: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("safety filter triggered")]
    SafetyFiltered,
}

impl BackendError {
    /// Output category recorded for records this error affected.
    pub fn category(&self) -> &'static str {
        match self {
            BackendError::MalformedPayload { .. } => "unclassified",
            BackendError::SafetyFiltered => "filtered",
            _ => "error",
        }
    }
}

pub(crate) fn map_deserialization_error(e: serde_json::Error, bytes: &[u8]) -> ClientError {
    tracing::error!(
        "failed deserialization of: {}",
        String::from_utf8_lossy(bytes)
    );
    ClientError::JSONDeserialize(e)
}

pub(crate) fn map_serialization_error(e: serde_json::Error) -> ClientError {
    tracing::error!("failed serialization: {}", e);
    ClientError::JSONSerialize(e)
}
