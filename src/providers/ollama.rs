//! Ollama `/api/chat` with NDJSON streaming.
//!
//! Tool calls are resolved manually once the stream ends.

use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, trace};

use super::{
    api_error_message, http_client, resolve_manual, FragmentStream, ProviderAdapter, ProviderError,
};
use crate::config::{ProviderConfig, ProviderKind};
use crate::conversation::{Message, Role};
use crate::tools::{ToolCall, ToolRegistry};

pub struct OllamaAdapter {
    client: reqwest::Client,
    base_url: String,
    model: String,
    tools: Arc<ToolRegistry>,
}

/// One NDJSON line.
#[derive(Debug, Deserialize)]
struct OllamaStreamResponse {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Option<Vec<OllamaToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OllamaToolCall {
    #[serde(default)]
    id: Option<String>,
    function: OllamaFunction,
}

#[derive(Debug, Deserialize)]
struct OllamaFunction {
    name: String,
    #[serde(default)]
    arguments: JsonValue,
}

impl OllamaToolCall {
    fn into_call(self) -> ToolCall {
        let call = ToolCall::from_json_arguments(self.function.name, &self.function.arguments);
        match self.id {
            Some(id) => call.with_id(id),
            None => call,
        }
    }
}

/// Decode one NDJSON line. Blank lines yield `None`.
fn parse_line(line: &[u8]) -> Result<Option<OllamaStreamResponse>, ProviderError> {
    let line = std::str::from_utf8(line)
        .map_err(|e| ProviderError::Stream(format!("Invalid UTF-8 in stream: {e}")))?
        .trim();
    if line.is_empty() {
        return Ok(None);
    }
    trace!(line = %line, "Ollama NDJSON");
    serde_json::from_str(line)
        .map(Some)
        .map_err(|e| ProviderError::Stream(format!("Failed to parse stream: {e}")))
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

impl OllamaAdapter {
    pub fn new(config: &ProviderConfig, tools: Arc<ToolRegistry>) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(config)?,
            base_url: config.base_url().to_string(),
            model: config.model_id.clone(),
            tools,
        })
    }

    fn request_body(&self, history: &[Message]) -> JsonValue {
        let messages: Vec<JsonValue> = history
            .iter()
            .map(|m| json!({ "role": role_name(m.role), "content": m.text }))
            .collect();
        let tools: Vec<JsonValue> = self
            .tools
            .definitions()
            .into_iter()
            .map(|def| {
                json!({
                    "type": "function",
                    "function": {
                        "name": def.name,
                        "description": def.description,
                        "parameters": def.parameters,
                    }
                })
            })
            .collect();

        json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
            "tools": tools,
        })
    }
}

#[async_trait]
impl ProviderAdapter for OllamaAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn stream_response<'a>(&'a self, history: &'a [Message]) -> FragmentStream<'a> {
        let url = format!("{}/api/chat", self.base_url);
        let body = self.request_body(history);

        Box::pin(stream! {
            let response = match self.client.post(&url).json(&body).send().await {
                Ok(res) if res.status().is_success() => res,
                Ok(res) => {
                    let status = res.status();
                    let text = res.text().await.unwrap_or_default();
                    yield Err(ProviderError::Api {
                        provider: ProviderKind::Ollama,
                        status: status.as_u16(),
                        message: api_error_message(&text),
                    });
                    return;
                }
                Err(e) => {
                    yield Err(ProviderError::Http(e));
                    return;
                }
            };

            let mut bytes = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();
            let mut text = String::new();
            let mut calls: Vec<ToolCall> = Vec::new();
            let mut done = false;

            while !done {
                let finished = match bytes.next().await {
                    Some(Ok(chunk)) => {
                        buffer.extend_from_slice(&chunk);
                        false
                    }
                    Some(Err(e)) => {
                        yield Err(ProviderError::Http(e));
                        return;
                    }
                    None => true,
                };

                // Characters may span chunks; decode whole lines only
                let mut lines: Vec<Vec<u8>> = Vec::new();
                while let Some(line_end) = buffer.iter().position(|b| *b == b'\n') {
                    lines.push(buffer.drain(..=line_end).collect());
                }
                if finished && !buffer.is_empty() {
                    debug!(bytes = buffer.len(), "Ollama stream ended without a final newline");
                    lines.push(std::mem::take(&mut buffer));
                }

                for line in lines {
                    let parsed = match parse_line(&line) {
                        Ok(Some(parsed)) => parsed,
                        Ok(None) => continue,
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    };
                    if let Some(error) = parsed.error {
                        yield Err(ProviderError::Stream(error));
                        return;
                    }
                    if let Some(message) = parsed.message {
                        if !message.content.is_empty() {
                            text.push_str(&message.content);
                            yield Ok(message.content);
                        }
                        calls.extend(
                            message
                                .tool_calls
                                .unwrap_or_default()
                                .into_iter()
                                .map(OllamaToolCall::into_call),
                        );
                    }
                    if parsed.done {
                        done = true;
                        break;
                    }
                }

                if finished {
                    break;
                }
            }

            debug!(calls = calls.len(), "Ollama stream finished");
            for fragment in resolve_manual(&self.tools, &calls, &text) {
                yield Ok(fragment);
            }
        })
    }
}
