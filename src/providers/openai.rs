//! OpenAI chat completions over SSE, with Whisper transcription.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::multipart;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, trace, warn};

use super::{
    api_error_message, http_client, resolve_native, FragmentStream, ProviderAdapter,
    ProviderError, MAX_TOOL_ROUNDS,
};
use crate::config::{ProviderConfig, ProviderKind};
use crate::conversation::{Message, Role};
use crate::tools::{ToolCall, ToolRegistry};

const TRANSCRIPTION_MODEL: &str = "whisper-1";
const TRANSCRIPTION_FILE_NAME: &str = "recognized_audio.wav";

pub struct OpenAiAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    tools: Arc<ToolRegistry>,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<JsonValue>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Tool call assembled from streamed deltas.
#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

impl PartialToolCall {
    fn apply(&mut self, delta: ToolCallDelta) {
        if let Some(id) = delta.id {
            self.id = id;
        }
        if let Some(function) = delta.function {
            if let Some(name) = function.name {
                self.name.push_str(&name);
            }
            if let Some(arguments) = function.arguments {
                self.arguments.push_str(&arguments);
            }
        }
    }

    fn into_call(self) -> ToolCall {
        let arguments = serde_json::from_str::<JsonValue>(&self.arguments).unwrap_or_else(|e| {
            warn!(tool = %self.name, error = %e, "Unparseable tool arguments");
            JsonValue::Null
        });
        ToolCall::from_json_arguments(self.name, &arguments).with_id(self.id)
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

impl OpenAiAdapter {
    pub fn new(
        config: &ProviderConfig,
        api_key: String,
        tools: Arc<ToolRegistry>,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(config)?,
            base_url: config.base_url().to_string(),
            api_key,
            model: config.model_id.clone(),
            tools,
        })
    }

    fn tool_specs(&self) -> Vec<JsonValue> {
        self.tools
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
            .collect()
    }

    async fn send(&self, transcript: &[JsonValue]) -> Result<reqwest::Response, ProviderError> {
        let body = json!({
            "model": self.model,
            "messages": transcript,
            "stream": true,
            "tools": self.tool_specs(),
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                provider: ProviderKind::Openai,
                status: status.as_u16(),
                message: api_error_message(&text),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Openai
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn stream_response<'a>(&'a self, history: &'a [Message]) -> FragmentStream<'a> {
        Box::pin(stream! {
            let mut transcript: Vec<JsonValue> = history
                .iter()
                .map(|m| json!({ "role": role_name(m.role), "content": m.text }))
                .collect();

            for round in 0..MAX_TOOL_ROUNDS {
                let response = match self.send(&transcript).await {
                    Ok(response) => response,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };

                let mut events = response.bytes_stream().eventsource();
                let mut partial: BTreeMap<usize, PartialToolCall> = BTreeMap::new();
                let mut round_text = String::new();

                while let Some(event) = events.next().await {
                    let event = match event {
                        Ok(event) => event,
                        Err(e) => {
                            yield Err(ProviderError::Stream(format!("SSE stream error: {e}")));
                            return;
                        }
                    };
                    trace!(data = %event.data, "OpenAI SSE");
                    if event.data.trim() == "[DONE]" {
                        break;
                    }

                    let chunk: ChatChunk = match serde_json::from_str(&event.data) {
                        Ok(chunk) => chunk,
                        Err(e) => {
                            yield Err(ProviderError::Stream(format!("Failed to parse stream: {e}")));
                            return;
                        }
                    };
                    if let Some(error) = chunk.error {
                        yield Err(ProviderError::Stream(api_error_message(&json!({ "error": error }).to_string())));
                        return;
                    }

                    for delta in chunk.choices.into_iter().filter_map(|c| c.delta) {
                        if let Some(content) = delta.content.filter(|c| !c.is_empty()) {
                            round_text.push_str(&content);
                            yield Ok(content);
                        }
                        for call in delta.tool_calls.unwrap_or_default() {
                            partial.entry(call.index).or_default().apply(call);
                        }
                    }
                }

                if partial.is_empty() {
                    return;
                }

                let calls: Vec<ToolCall> = partial.into_values().map(PartialToolCall::into_call).collect();
                debug!(round, calls = calls.len(), "Resolving OpenAI tool calls");

                transcript.push(json!({
                    "role": "assistant",
                    "content": if round_text.is_empty() {
                        JsonValue::Null
                    } else {
                        JsonValue::String(round_text)
                    },
                    "tool_calls": calls.iter().map(|call| json!({
                        "id": call.id,
                        "type": "function",
                        "function": {
                            "name": call.tool_name,
                            "arguments": call.arguments_json().to_string(),
                        }
                    })).collect::<Vec<_>>(),
                }));
                for call in &calls {
                    transcript.push(json!({
                        "role": "tool",
                        "tool_call_id": call.id,
                        "content": resolve_native(&self.tools, call),
                    }));
                }
            }

            warn!(max_rounds = MAX_TOOL_ROUNDS, "Tool call rounds exhausted, ending turn");
        })
    }

    async fn transcribe_audio(&self, audio: &[u8]) -> String {
        let part = match multipart::Part::bytes(audio.to_vec())
            .file_name(TRANSCRIPTION_FILE_NAME)
            .mime_str("audio/wav")
        {
            Ok(part) => part,
            Err(e) => {
                warn!(error = %e, "Failed to build transcription request");
                return String::new();
            }
        };
        let form = multipart::Form::new()
            .text("model", TRANSCRIPTION_MODEL)
            .part("file", part);

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await;

        let response = match response {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                warn!(status = %r.status(), "Transcription rejected");
                return String::new();
            }
            Err(e) => {
                warn!(error = %e, "Transcription request failed");
                return String::new();
            }
        };

        match response.json::<TranscriptionResponse>().await {
            Ok(body) => body.text,
            Err(e) => {
                warn!(error = %e, "Unparseable transcription response");
                String::new()
            }
        }
    }
}
