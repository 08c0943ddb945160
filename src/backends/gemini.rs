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
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use secrecy::ExposeSecret;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

pub const GEMINI_DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const GEMINI_API_KEY_ENV_VAR: &str = "GEMINI_API_KEY";
pub const GEMINI_API_KEY_HEADER: &str = "x-goog-api-key";
pub const GEMINI_SAFETY_FINISH_REASON: &str = "SAFETY";

/// Google Gemini `generateContent`. The system instruction is inlined ahead of the user
/// input and JSON output is requested through `responseMimeType`.
pub struct GeminiBackend {
    pub(crate) client: ApiClient<GeminiConfig>,
    pub model: String,
    pub generation_config: GeminiGenerationConfig,
}

impl GeminiBackend {
    pub fn new(llm: &LlmConfig) -> Result<Self, ConfigError> {
        let mut api_config =
            ApiConfig::from_llm_config(llm, GEMINI_DEFAULT_BASE_URL, GEMINI_API_KEY_ENV_VAR);
        api_config.api_key = Some(api_config.load_api_key()?);
        let client = ApiClient::new(GeminiConfig { api_config }).map_err(|e| {
            ConfigError::Invalid {
                field: "llm",
                message: format!("failed to build HTTP client: {e}"),
            }
        })?;
        Ok(Self {
            client,
            model: llm.model.clone(),
            generation_config: GeminiGenerationConfig {
                temperature: llm.temperature,
                top_p: llm.top_p,
                top_k: llm.top_k,
                response_mime_type: "application/json".to_string(),
            },
        })
    }

    pub async fn classify_one(
        &self,
        text: &str,
        system_prompt: &str,
    ) -> Result<ClassificationResponse, BackendError> {
        let prompt = build_prompt(system_prompt, text, &classification_schema());
        self.generate(prompt).await
    }

    pub async fn classify_batch(
        &self,
        items: &[BatchItem],
        system_prompt: &str,
    ) -> Result<BatchClassificationResponse, BackendError> {
        let prompt = build_prompt(
            system_prompt,
            &format_batch_input(items),
            &batch_classification_schema(),
        );
        self.generate(prompt).await
    }

    async fn generate<T: DeserializeOwned>(&self, prompt: String) -> Result<T, BackendError> {
        let request = GeminiGenerateRequest {
            contents: vec![GeminiContent {
                role: None,
                parts: vec![GeminiPart { text: prompt }],
            }],
            generation_config: self.generation_config.clone(),
        };
        let response: GeminiGenerateResponse = self
            .client
            .post(&generate_path(&self.model), &request)
            .await?;
        parse_payload(response.payload_text()?)
    }
}

fn build_prompt(system_prompt: &str, user_input: &str, schema: &serde_json::Value) -> String {
    format!(
        "{system_prompt}\n\nUser Input:\n{user_input}\n\n{}",
        json_instruction(schema)
    )
}

fn generate_path(model: &str) -> String {
    format!("/models/{model}:generateContent")
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiGenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub response_mime_type: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiGenerateRequest {
    pub contents: Vec<GeminiContent>,
    pub generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiPart {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiGenerateResponse {
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiCandidate {
    #[serde(default)]
    pub content: Option<GeminiContent>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

impl GeminiGenerateResponse {
    /// Text of the first candidate's first part.
    pub fn payload_text(&self) -> Result<&str, BackendError> {
        let candidate = self
            .candidates
            .first()
            .ok_or_else(|| BackendError::EmptyPayload("no candidates returned".to_string()))?;
        if candidate.finish_reason.as_deref() == Some(GEMINI_SAFETY_FINISH_REASON) {
            return Err(BackendError::SafetyFiltered);
        }
        candidate
            .content
            .as_ref()
            .and_then(|content| content.parts.first())
            .map(|part| part.text.as_str())
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| BackendError::EmptyPayload("candidate had no text".to_string()))
    }
}

#[derive(Clone, Debug)]
pub struct GeminiConfig {
    pub api_config: ApiConfig,
}

impl ApiConfigTrait for GeminiConfig {
    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.api_config.api_key {
            if let Ok(header_value) = HeaderValue::from_str(api_key.expose_secret()) {
                headers.insert(HeaderName::from_static(GEMINI_API_KEY_HEADER), header_value);
            } else {
                crate::error!("Failed to create header value from api key");
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
