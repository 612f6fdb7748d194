//! Resolved provider selection.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Supported chat backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// OpenAI chat completions
    #[default]
    #[serde(alias = "open_ai")]
    Openai,
    /// Google Gemini
    #[serde(alias = "google")]
    Gemini,
    /// Local Ollama server
    Ollama,
}

impl ProviderKind {
    /// Whether an API key must be configured.
    pub fn requires_credential(self) -> bool {
        !matches!(self, ProviderKind::Ollama)
    }

    /// Whether the backend can transcribe audio.
    pub fn supports_voice(self) -> bool {
        matches!(self, ProviderKind::Openai)
    }

    /// Environment variable consulted when no key is configured.
    pub fn credential_env_var(self) -> Option<&'static str> {
        match self {
            ProviderKind::Openai => Some("OPENAI_API_KEY"),
            ProviderKind::Gemini => Some("GEMINI_API_KEY"),
            ProviderKind::Ollama => None,
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            ProviderKind::Openai => "gpt-4o-mini",
            ProviderKind::Gemini => "gemini-2.0-flash",
            ProviderKind::Ollama => "llama3.2",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            ProviderKind::Openai => "https://api.openai.com/v1",
            ProviderKind::Gemini => "https://generativelanguage.googleapis.com",
            ProviderKind::Ollama => "http://localhost:11434",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Openai => write!(f, "openai"),
            ProviderKind::Gemini => write!(f, "gemini"),
            ProviderKind::Ollama => write!(f, "ollama"),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" | "open_ai" => Ok(ProviderKind::Openai),
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            "ollama" => Ok(ProviderKind::Ollama),
            other => Err(format!(
                "unknown provider '{other}' (expected openai, gemini or ollama)"
            )),
        }
    }
}

/// Everything needed to construct one provider adapter.
///
/// Fixed at conversation creation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub model_id: String,
    /// API key. Always `None` for Ollama.
    pub credential: Option<String>,
    pub system_prompt: String,
    pub base_url: String,
    /// Whole-request timeout. `None` leaves the HTTP client default.
    pub timeout: Option<Duration>,
    /// Output token cap, where the backend takes one.
    pub max_output_tokens: Option<u32>,
}

impl ProviderConfig {
    /// A config with the backend's defaults and the built-in system prompt.
    pub fn new(kind: ProviderKind, model_id: impl Into<String>) -> Self {
        Self {
            kind,
            model_id: model_id.into(),
            credential: None,
            system_prompt: crate::conversation::SYSTEM_PROMPT.to_string(),
            base_url: kind.default_base_url().to_string(),
            timeout: None,
            max_output_tokens: None,
        }
    }

    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_output_tokens(mut self, max: u32) -> Self {
        self.max_output_tokens = Some(max);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}
