// Internal modules
mod client;
mod config;
mod error;

// Public modules
pub mod gemini;
pub mod ollama;
pub mod schema;

// Public exports
pub use config::ApiConfig;
pub use error::{BackendError, ClientError};
pub use gemini::GeminiBackend;
pub use ollama::OllamaBackend;
pub use schema::{BatchClassificationResponse, BatchItem, ClassificationResponse};

use crate::config::{ConfigError, LlmConfig, Provider};
use std::future::Future;

/// The capability the pipeline needs from a text-generation provider.
///
/// Implementations translate to and from their provider's wire format and never panic on
/// provider misbehavior: every failure comes back as a [`BackendError`].
pub trait Classifier {
    fn classify_one(
        &self,
        text: &str,
        system_prompt: &str,
    ) -> impl Future<Output = Result<ClassificationResponse, BackendError>> + Send;

    fn classify_batch(
        &self,
        items: &[BatchItem],
        system_prompt: &str,
    ) -> impl Future<Output = Result<BatchClassificationResponse, BackendError>> + Send;
}

pub enum ClassifierBackend {
    Ollama(OllamaBackend),
    Gemini(GeminiBackend),
}

impl ClassifierBackend {
    /// Selects and builds the provider once. A missing credential for a provider that
    /// requires one fails here, before any record is processed.
    pub fn from_config(llm: &LlmConfig) -> Result<Self, ConfigError> {
        llm.validate()?;
        match llm.provider()? {
            Provider::Ollama => Ok(ClassifierBackend::Ollama(OllamaBackend::new(llm)?)),
            Provider::Gemini => Ok(ClassifierBackend::Gemini(GeminiBackend::new(llm)?)),
        }
    }

    pub fn provider_name(&self) -> &'static str {
        match self {
            ClassifierBackend::Ollama(_) => "ollama",
            ClassifierBackend::Gemini(_) => "gemini",
        }
    }

    pub fn model_id(&self) -> &str {
        match self {
            ClassifierBackend::Ollama(b) => &b.model,
            ClassifierBackend::Gemini(b) => &b.model,
        }
    }
}

impl Classifier for ClassifierBackend {
    async fn classify_one(
        &self,
        text: &str,
        system_prompt: &str,
    ) -> Result<ClassificationResponse, BackendError> {
        match self {
            ClassifierBackend::Ollama(b) => b.classify_one(text, system_prompt).await,
            ClassifierBackend::Gemini(b) => b.classify_one(text, system_prompt).await,
        }
    }

    async fn classify_batch(
        &self,
        items: &[BatchItem],
        system_prompt: &str,
    ) -> Result<BatchClassificationResponse, BackendError> {
        match self {
            ClassifierBackend::Ollama(b) => b.classify_batch(items, system_prompt).await,
            ClassifierBackend::Gemini(b) => b.classify_batch(items, system_prompt).await,
        }
    }
}
