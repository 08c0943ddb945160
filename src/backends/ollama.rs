use super::{
    client::ApiClient,
    config::{ApiConfig, ApiConfigTrait},
    schema::{
        batch_classification_schema, classification_schema, format_batch_input, json_instruction,
        parse_payload, BatchClassificationResponse, BatchItem, ClassificationResponse,
    },
    BackendError,
};
use crate::config::{ConfigError, LlmConfig};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use secrecy::ExposeSecret;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

pub const OLLAMA_DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const OLLAMA_API_KEY_ENV_VAR: &str = "OLLAMA_API_KEY";
pub const OLLAMA_GENERATE_PATH: &str = "/api/generate";

/// Local or self-hosted Ollama server. The system instruction travels in its own `system`
/// field and JSON output is requested with the `format` flag.
pub struct OllamaBackend {
    pub(crate) client: ApiClient<OllamaConfig>,
    pub model: String,
    pub options: OllamaOptions,
}

impl OllamaBackend {
    pub fn new(llm: &LlmConfig) -> Result<Self, ConfigError> {
        let mut api_config =
            ApiConfig::from_llm_config(llm, OLLAMA_DEFAULT_BASE_URL, OLLAMA_API_KEY_ENV_VAR);
        // Plain Ollama needs no credential; one is only sent when configured.
        if let Ok(api_key) = api_config.load_api_key() {
            api_config.api_key = Some(api_key);
        }
        let client = ApiClient::new(OllamaConfig { api_config }).map_err(|e| {
            ConfigError::Invalid {
                field: "llm",
                message: format!("failed to build HTTP client: {e}"),
            }
        })?;
        Ok(Self {
            client,
            model: llm.model.clone(),
            options: OllamaOptions {
                temperature: llm.temperature,
                top_p: llm.top_p,
                top_k: llm.top_k,
            },
        })
    }

    pub async fn classify_one(
        &self,
        text: &str,
        system_prompt: &str,
    ) -> Result<ClassificationResponse, BackendError> {
        let prompt = format!(
            "Comment: {text}\n\nClassify this comment.\n\n{}",
            json_instruction(&classification_schema())
        );
        self.generate(prompt, system_prompt).await
    }

    pub async fn classify_batch(
        &self,
        items: &[BatchItem],
        system_prompt: &str,
    ) -> Result<BatchClassificationResponse, BackendError> {
        let prompt = format!(
            "{}\nClassify each comment above and return one result per ID.\n\n{}",
            format_batch_input(items),
            json_instruction(&batch_classification_schema())
        );
        self.generate(prompt, system_prompt).await
    }

    async fn generate<T: DeserializeOwned>(
        &self,
        prompt: String,
        system_prompt: &str,
    ) -> Result<T, BackendError> {
        let request = OllamaGenerateRequest::new(self, prompt, system_prompt);
        let response: OllamaGenerateResponse =
            self.client.post(OLLAMA_GENERATE_PATH, &request).await?;
        parse_payload(&response.response)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct OllamaOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
}

#[derive(Debug, Serialize)]
pub struct OllamaGenerateRequest<'a> {
    pub model: &'a str,
    pub prompt: String,
    pub system: &'a str,
    pub stream: bool,
    pub format: &'static str,
    pub options: &'a OllamaOptions,
}

impl<'a> OllamaGenerateRequest<'a> {
    fn new(backend: &'a OllamaBackend, prompt: String, system_prompt: &'a str) -> Self {
        Self {
            model: &backend.model,
            prompt,
            system: system_prompt,
            stream: false,
            format: "json",
            options: &backend.options,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OllamaGenerateResponse {
    #[serde(default)]
    pub response: String,
}

#[derive(Clone, Debug)]
pub struct OllamaConfig {
    pub api_config: ApiConfig,
}

impl ApiConfigTrait for OllamaConfig {
    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.api_config.api_key {
            if let Ok(header_value) =
                HeaderValue::from_str(&format!("Bearer {}", api_key.expose_secret()))
            {
                headers.insert(AUTHORIZATION, header_value);
            } else {
                crate::error!("Failed to create header value from authorization value");
            }
        }
        headers
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_config.base_url, path)
    }

    fn api_config(&self) -> &ApiConfig {
        &self.api_config
    }
}
