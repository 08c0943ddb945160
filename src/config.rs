//! Run configuration, loaded once from YAML and passed into the pipeline immutably.

use crate::logging::LoggingConfig;
use anyhow::Context;
use encoding_rs::Encoding;
use secrecy::Secret;
use serde::Deserialize;
use std::{path::Path, str::FromStr, time::Duration};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),
    #[error("missing credential: set `llm.api_key` or the {env_var} environment variable")]
    MissingCredential { env_var: String },
    #[error("unsupported encoding `{0}`")]
    UnsupportedEncoding(String),
    #[error("invalid value for {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub input_file: String,
    pub output_file: String,
    #[serde(default = "default_input_encoding")]
    pub input_encoding: String,
    #[serde(default = "default_output_encoding")]
    pub output_encoding: String,
    pub prompt_folder: String,
    pub llm: LlmConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    /// Provider endpoint root. Each provider has its own default.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<Secret<String>>,
    /// Environment variable consulted when `api_key` is not set.
    #[serde(default)]
    pub api_key_env_var: Option<String>,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Per-call timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    /// Upper bound in seconds on retrying rate limited calls. Zero disables retries.
    #[serde(default = "default_max_retry_elapsed")]
    pub max_retry_elapsed: u64,
    #[serde(default = "default_true")]
    pub use_system_proxy: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessingConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_comment_column")]
    pub comment_column: String,
    #[serde(default = "default_id_column")]
    pub id_column: String,
    #[serde(default)]
    pub mode: ProcessingMode,
    #[serde(default = "default_true")]
    pub show_progress: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            comment_column: default_comment_column(),
            id_column: default_id_column(),
            mode: ProcessingMode::default(),
            show_progress: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    /// One backend call per group, reconciled by id.
    #[default]
    Batch,
    /// One backend call per record.
    Single,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Ollama,
    Gemini,
}

impl FromStr for Provider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Provider::Ollama),
            "gemini" => Ok(Provider::Gemini),
            _ => Err(ConfigError::UnsupportedProvider(s.to_string())),
        }
    }
}

/// Output dataset encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    /// UTF-8 with a leading byte order mark.
    Utf8Sig,
}

impl FromStr for TextEncoding {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Ok(TextEncoding::Utf8),
            "utf-8-sig" | "utf8-sig" => Ok(TextEncoding::Utf8Sig),
            _ => Err(ConfigError::UnsupportedEncoding(s.to_string())),
        }
    }
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("failed to parse YAML config: {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> crate::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.input_file.trim().is_empty() {
            return Err(ConfigError::MissingField("input_file"));
        }
        if self.output_file.trim().is_empty() {
            return Err(ConfigError::MissingField("output_file"));
        }
        if self.prompt_folder.trim().is_empty() {
            return Err(ConfigError::MissingField("prompt_folder"));
        }
        self.input_encoding()?;
        self.output_encoding()?;
        self.llm.validate()?;
        self.processing.validate()
    }

    /// Decoder for the input dataset. Bytes it cannot decode become U+FFFD.
    pub fn input_encoding(&self) -> Result<&'static Encoding, ConfigError> {
        input_encoding_for_label(&self.input_encoding)
    }

    pub fn output_encoding(&self) -> Result<TextEncoding, ConfigError> {
        self.output_encoding.parse()
    }
}

impl LlmConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.provider()?;
        if self.model.trim().is_empty() {
            return Err(ConfigError::MissingField("llm.model"));
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::Invalid {
                field: "llm.max_concurrency",
                message: "must be at least 1".to_string(),
            });
        }
        if self.timeout == 0 {
            return Err(ConfigError::Invalid {
                field: "llm.timeout",
                message: "must be at least 1 second".to_string(),
            });
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Invalid {
                field: "llm.temperature",
                message: "must be between 0.0 and 2.0".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(ConfigError::Invalid {
                field: "llm.top_p",
                message: "must be between 0.0 and 1.0".to_string(),
            });
        }
        Ok(())
    }

    pub fn provider(&self) -> Result<Provider, ConfigError> {
        self.provider.parse()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn max_retry_elapsed(&self) -> Duration {
        Duration::from_secs(self.max_retry_elapsed)
    }
}

impl ProcessingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "processing.batch_size",
                message: "must be at least 1".to_string(),
            });
        }
        if self.comment_column.trim().is_empty() {
            return Err(ConfigError::MissingField("processing.comment_column"));
        }
        if self.mode == ProcessingMode::Batch && self.id_column.trim().is_empty() {
            return Err(ConfigError::MissingField("processing.id_column"));
        }
        Ok(())
    }
}

/// Resolves a WHATWG label, also accepting `-sig` suffixes and hyphenless spellings such
/// as `latin-1`. Encodings that are not ASCII-compatible cannot be split on delimiters
/// byte-wise and are rejected.
fn input_encoding_for_label(label: &str) -> Result<&'static Encoding, ConfigError> {
    let normalized = label.trim().to_ascii_lowercase().replace('_', "-");
    let base = normalized.strip_suffix("-sig").unwrap_or(&normalized);
    Encoding::for_label(base.as_bytes())
        .or_else(|| Encoding::for_label(base.replace('-', "").as_bytes()))
        .filter(|encoding| encoding.is_ascii_compatible())
        .ok_or_else(|| ConfigError::UnsupportedEncoding(label.to_string()))
}

fn default_input_encoding() -> String {
    "utf-8".to_string()
}

fn default_output_encoding() -> String {
    "utf-8-sig".to_string()
}

fn default_max_concurrency() -> usize {
    5
}

fn default_timeout() -> u64 {
    60
}

fn default_top_p() -> f32 {
    1.0
}

fn default_top_k() -> u32 {
    40
}

fn default_max_retry_elapsed() -> u64 {
    60
}

fn default_batch_size() -> usize {
    20
}

fn default_comment_column() -> String {
    "Comments".to_string()
}

fn default_id_column() -> String {
    "TicketNumber".to_string()
}

fn default_true() -> bool {
    true
}
