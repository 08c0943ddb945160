#[allow(unused_imports)]
pub(crate) use anyhow::{anyhow, bail, Error, Result};
#[allow(unused_imports)]
pub(crate) use tracing::{debug, error, info, span, trace, warn, Level};

#[macro_use]
extern crate lazy_static;

pub mod backends;
pub mod config;
pub mod logging;
pub mod pipeline;
pub mod prompt;
pub mod quality;

use anyhow::Context;

pub use backends::{
    BackendError, BatchClassificationResponse, BatchItem, ClassificationResponse, Classifier,
    ClassifierBackend, ClientError,
};
pub use config::{AppConfig, ConfigError, LlmConfig, ProcessingConfig, ProcessingMode};
pub use pipeline::{
    ClassificationOutcome, FailureKind, Pipeline, PipelineError, RunSummary, Stage,
};
pub use prompt::PromptSource;
pub use quality::{QualityFilter, QualityIssue};

pub struct GrievanceClassifier {}

impl GrievanceClassifier {
    /// Builds every collaborator from a validated config and runs the pipeline to completion.
    ///
    /// Configuration, prompt and backend construction failures are fatal and happen before
    /// any input row is read.
    pub async fn run(config: AppConfig) -> crate::Result<RunSummary> {
        config.validate().context("invalid configuration")?;
        let prompts = PromptSource::load(&config.prompt_folder)
            .with_context(|| format!("failed to load prompts from {}", config.prompt_folder))?;
        let backend = ClassifierBackend::from_config(&config.llm)
            .context("failed to construct classifier backend")?;
        crate::info!(
            provider = backend.provider_name(),
            model = backend.model_id(),
            "Backend ready"
        );

        let pipeline = Pipeline::new(config, backend, &prompts)?;
        Ok(pipeline.run().await?)
    }
}
