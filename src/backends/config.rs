use crate::config::{ConfigError, LlmConfig};
use reqwest::header::HeaderMap;
use secrecy::Secret;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: Option<Secret<String>>,
    pub api_key_env_var: String,
    pub timeout: Duration,
    pub max_retry_elapsed: Duration,
    pub use_system_proxy: bool,
}

impl ApiConfig {
    pub(crate) fn from_llm_config(
        llm: &LlmConfig,
        default_base_url: &str,
        default_api_key_env_var: &str,
    ) -> Self {
        Self {
            base_url: llm
                .base_url
                .as_deref()
                .unwrap_or(default_base_url)
                .trim_end_matches('/')
                .to_string(),
            api_key: llm.api_key.clone(),
            api_key_env_var: llm
                .api_key_env_var
                .clone()
                .unwrap_or_else(|| default_api_key_env_var.to_string()),
            timeout: llm.timeout(),
            max_retry_elapsed: llm.max_retry_elapsed(),
            use_system_proxy: llm.use_system_proxy,
        }
    }

    pub(crate) fn load_api_key(&self) -> Result<Secret<String>, ConfigError> {
        if let Some(api_key) = self.api_key.as_ref() {
            crate::trace!("Using api_key from config");
            return Ok(api_key.to_owned());
        }
        crate::trace!("api_key not set. Attempting to load from .env");
        dotenvy::dotenv().ok();

        match dotenvy::var(&self.api_key_env_var) {
            Ok(api_key) if !api_key.trim().is_empty() => {
                crate::trace!("Successfully loaded api_key from environment");
                Ok(api_key.into())
            }
            _ => {
                crate::trace!(
                    "{} not found in environment, nor was it set in config",
                    self.api_key_env_var
                );
                Err(ConfigError::MissingCredential {
                    env_var: self.api_key_env_var.clone(),
                })
            }
        }
    }
}

pub(crate) trait ApiConfigTrait {
    fn headers(&self) -> HeaderMap;

    fn url(&self, path: &str) -> String;

    fn api_config(&self) -> &ApiConfig;
}
