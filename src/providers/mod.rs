//! Streaming chat backends.
//!
//! Every backend sits behind [`ProviderAdapter`]. They differ in how tool
//! calls are resolved:
//!
//! - OpenAI and Gemini resolve natively: when a streamed answer ends in
//!   tool calls, the adapter invokes them, appends calls and results to the
//!   turn's request transcript and asks again. Tool results never show up
//!   in the visible text.
//! - Ollama resolves manually: tool calls are collected while streaming and
//!   invoked after the stream ends, and each result is emitted as one more
//!   fragment.

mod gemini;
mod ollama;
mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{ProviderConfig, ProviderKind};
use crate::conversation::Message;
use crate::tools::{ToolCall, ToolRegistry};

pub use gemini::GeminiAdapter;
pub use ollama::OllamaAdapter;
pub use openai::OpenAiAdapter;

/// Upper bound on request rounds in one native tool loop.
pub const MAX_TOOL_ROUNDS: usize = 8;

/// Finite stream of response fragments.
pub type FragmentStream<'a> = BoxStream<'a, Result<String, ProviderError>>;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("No API key configured for {0}")]
    MissingCredential(ProviderKind),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{provider} API error ({status}): {message}")]
    Api {
        provider: ProviderKind,
        status: u16,
        message: String,
    },
    #[error("Stream error: {0}")]
    Stream(String),
}

/// How an adapter turns tool calls into results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolResolution {
    Native,
    Manual,
}

impl ToolResolution {
    pub fn for_kind(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::Openai | ProviderKind::Gemini => ToolResolution::Native,
            ProviderKind::Ollama => ToolResolution::Manual,
        }
    }
}

/// One chat backend.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn model_id(&self) -> &str;

    fn tool_resolution(&self) -> ToolResolution {
        ToolResolution::for_kind(self.kind())
    }

    /// Stream the answer to the last message of `history`.
    fn stream_response<'a>(&'a self, history: &'a [Message]) -> FragmentStream<'a>;

    /// Speech to text. Empty on failure or when unsupported.
    async fn transcribe_audio(&self, _audio: &[u8]) -> String {
        String::new()
    }
}

/// Build the adapter for `config`, wired to `tools`.
pub fn create_adapter(
    config: &ProviderConfig,
    tools: Arc<ToolRegistry>,
) -> Result<Box<dyn ProviderAdapter>, ProviderError> {
    let credential = if config.kind.requires_credential() {
        match config.credential.as_deref() {
            Some(key) if !key.trim().is_empty() => Some(key.to_string()),
            _ => return Err(ProviderError::MissingCredential(config.kind)),
        }
    } else {
        None
    };

    debug!(provider = %config.kind, model = %config.model_id, base_url = config.base_url(), "Creating adapter");

    let adapter: Box<dyn ProviderAdapter> = match (config.kind, credential) {
        (ProviderKind::Openai, Some(key)) => Box::new(OpenAiAdapter::new(config, key, tools)?),
        (ProviderKind::Gemini, Some(key)) => Box::new(GeminiAdapter::new(config, key, tools)?),
        (ProviderKind::Ollama, _) => Box::new(OllamaAdapter::new(config, tools)?),
        (kind, None) => return Err(ProviderError::MissingCredential(kind)),
    };
    Ok(adapter)
}

/// Result text for a natively resolved call.
///
/// Dispatch failures become error text so the model can recover.
pub(crate) fn resolve_native(tools: &ToolRegistry, call: &ToolCall) -> String {
    match tools.invoke(call) {
        Ok(result) => result.text,
        Err(e) => {
            warn!(tool = %call.tool_name, error = %e, "Tool call rejected");
            format!("Error: {e}")
        }
    }
}

/// Fragments produced by manually resolving the calls of one turn.
///
/// When the turn made no tool calls, a fenced code block in `response`
/// supersedes whatever was saved before. Rejected calls still count as
/// calls.
pub(crate) fn resolve_manual(tools: &ToolRegistry, calls: &[ToolCall], response: &str) -> Vec<String> {
    let mut fragments = Vec::new();
    for call in calls {
        match tools.invoke(call) {
            Ok(result) => fragments.push(result.text),
            Err(e) => warn!(tool = %call.tool_name, error = %e, "Skipping tool call"),
        }
    }
    if calls.is_empty() {
        tools.invalidate_if_superseded(response);
    }
    fragments
}

/// Error message from an API error body, falling back to the raw text.
pub(crate) fn api_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .or_else(|| v.get("error"))
                .and_then(|m| m.as_str().map(str::to_string))
        })
        .unwrap_or_else(|| body.trim().to_string())
}

/// Build the shared HTTP client.
pub(crate) fn http_client(config: &ProviderConfig) -> Result<reqwest::Client, ProviderError> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = config.timeout {
        builder = builder.timeout(timeout);
    }
    Ok(builder.build()?)
}
