//! The JSON configuration file.
//!
//! ```json
//! {
//!   "provider": "openai",
//!   "openai": { "model": "gpt-4o-mini", "api_key": "$OPENAI_API_KEY" },
//!   "gemini": { "model": "gemini-2.0-flash", "max_output_tokens": 1000 },
//!   "ollama": { "model": "llama3.2", "base_url": "http://localhost:11434", "timeout_secs": 1200 },
//!   "save_dir": "~/lisp"
//! }
//! ```
//!
//! Every field is optional. A missing file means all defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::provider::{ProviderConfig, ProviderKind};

const DEFAULT_GEMINI_MAX_OUTPUT_TOKENS: u32 = 1000;
const DEFAULT_OLLAMA_TIMEOUT_SECS: u64 = 1200;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
}

/// Settings shared by the hosted backends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostedProviderSettings {
    #[serde(default)]
    pub model: Option<String>,
    /// API key (can use $VAR or ${VAR} syntax for env vars)
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeminiSettings {
    #[serde(flatten)]
    pub common: HostedProviderSettings,
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OllamaSettings {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Contents of `config.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantConfig {
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default)]
    pub openai: HostedProviderSettings,
    #[serde(default)]
    pub gemini: GeminiSettings,
    #[serde(default)]
    pub ollama: OllamaSettings,
    /// Directory for interactively saved code (supports `~` and env vars).
    #[serde(default)]
    pub save_dir: Option<String>,
    /// Replaces the built-in system prompt.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

/// Expand `$VAR`, `${VAR}` and `~` in a config value.
pub fn resolve_env_var(input: &str) -> Result<String, ConfigError> {
    shellexpand::full(input)
        .map(|s| s.into_owned())
        .map_err(|e| ConfigError::EnvVarNotFound(e.var_name))
}

impl AssistantConfig {
    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Config loaded");
        Ok(config)
    }

    /// Command-line overrides.
    pub fn apply_overrides(
        &mut self,
        provider: Option<ProviderKind>,
        model: Option<String>,
        save_dir: Option<PathBuf>,
    ) {
        if let Some(provider) = provider {
            self.provider = provider;
        }
        if let Some(model) = model {
            match self.provider {
                ProviderKind::Openai => self.openai.model = Some(model),
                ProviderKind::Gemini => self.gemini.common.model = Some(model),
                ProviderKind::Ollama => self.ollama.model = Some(model),
            }
        }
        if let Some(dir) = save_dir {
            self.save_dir = Some(dir.to_string_lossy().into_owned());
        }
    }

    /// Resolved save directory, if one is configured.
    pub fn save_dir(&self) -> Result<Option<PathBuf>, ConfigError> {
        self.save_dir
            .as_deref()
            .map(|dir| resolve_env_var(dir).map(PathBuf::from))
            .transpose()
    }

    /// Resolve the selected provider into an immutable [`ProviderConfig`].
    ///
    /// A missing credential is not an error here; adapter construction
    /// reports it.
    pub fn provider_config(&self) -> Result<ProviderConfig, ConfigError> {
        let kind = self.provider;
        let (model, base_url, api_key) = match kind {
            ProviderKind::Openai => (
                self.openai.model.as_deref(),
                self.openai.base_url.as_deref(),
                self.openai.api_key.as_deref(),
            ),
            ProviderKind::Gemini => (
                self.gemini.common.model.as_deref(),
                self.gemini.common.base_url.as_deref(),
                self.gemini.common.api_key.as_deref(),
            ),
            ProviderKind::Ollama => (
                self.ollama.model.as_deref(),
                self.ollama.base_url.as_deref(),
                None,
            ),
        };

        let mut config = ProviderConfig::new(kind, model.unwrap_or(kind.default_model()));
        if let Some(base_url) = base_url {
            config = config.with_base_url(resolve_env_var(base_url)?);
        }
        if let Some(prompt) = &self.system_prompt {
            config = config.with_system_prompt(prompt.clone());
        }

        config.credential = self.resolve_credential(kind, api_key)?;

        match kind {
            ProviderKind::Gemini => {
                config = config.with_max_output_tokens(
                    self.gemini
                        .max_output_tokens
                        .unwrap_or(DEFAULT_GEMINI_MAX_OUTPUT_TOKENS),
                );
            }
            ProviderKind::Ollama => {
                config = config.with_timeout(Duration::from_secs(
                    self.ollama.timeout_secs.unwrap_or(DEFAULT_OLLAMA_TIMEOUT_SECS),
                ));
            }
            ProviderKind::Openai => {}
        }

        Ok(config)
    }

    fn resolve_credential(
        &self,
        kind: ProviderKind,
        configured: Option<&str>,
    ) -> Result<Option<String>, ConfigError> {
        if !kind.requires_credential() {
            return Ok(None);
        }
        if let Some(raw) = configured {
            let key = resolve_env_var(raw)?;
            if !key.trim().is_empty() {
                return Ok(Some(key));
            }
        }
        Ok(kind
            .credential_env_var()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.trim().is_empty()))
    }
}
