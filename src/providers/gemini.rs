//! Google Gemini `streamGenerateContent` over SSE.

use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
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

const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 1000;

pub struct GeminiAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_output_tokens: u32,
    tools: Arc<ToolRegistry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<JsonValue>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    function_call: Option<FunctionCall>,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: JsonValue,
}

impl GeminiAdapter {
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
            max_output_tokens: config.max_output_tokens.unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS),
            tools,
        })
    }

    fn request_body(&self, system: &str, contents: &[JsonValue]) -> JsonValue {
        let declarations: Vec<JsonValue> = self
            .tools
            .definitions()
            .into_iter()
            .map(|def| {
                json!({
                    "name": def.name,
                    "description": def.description,
                    "parameters": def.parameters,
                })
            })
            .collect();

        let mut body = json!({
            "contents": contents,
            "tools": [{ "functionDeclarations": declarations }],
            "generationConfig": { "maxOutputTokens": self.max_output_tokens },
        });
        if !system.is_empty() {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }
        body
    }

    async fn send(&self, body: &JsonValue) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:streamGenerateContent",
                self.base_url, self.model
            ))
            .query(&[("alt", "sse")])
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                provider: ProviderKind::Gemini,
                status: status.as_u16(),
                message: api_error_message(&text),
            });
        }
        Ok(response)
    }
}

/// Split history into the system instruction and Gemini `contents`.
fn to_contents(history: &[Message]) -> (String, Vec<JsonValue>) {
    let mut system = Vec::new();
    let mut contents = Vec::new();
    for message in history {
        match message.role {
            Role::System => system.push(message.text.as_str()),
            Role::User => contents.push(json!({ "role": "user", "parts": [{ "text": message.text }] })),
            Role::Assistant => {
                contents.push(json!({ "role": "model", "parts": [{ "text": message.text }] }))
            }
        }
    }
    (system.join("\n\n"), contents)
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn stream_response<'a>(&'a self, history: &'a [Message]) -> FragmentStream<'a> {
        Box::pin(stream! {
            let (system, mut contents) = to_contents(history);

            for round in 0..MAX_TOOL_ROUNDS {
                let body = self.request_body(&system, &contents);
                let response = match self.send(&body).await {
                    Ok(response) => response,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };

                let mut events = response.bytes_stream().eventsource();
                let mut calls: Vec<ToolCall> = Vec::new();

                while let Some(event) = events.next().await {
                    let event = match event {
                        Ok(event) => event,
                        Err(e) => {
                            yield Err(ProviderError::Stream(format!("SSE stream error: {e}")));
                            return;
                        }
                    };
                    trace!(data = %event.data, "Gemini SSE");
                    if event.data.trim().is_empty() {
                        continue;
                    }

                    let chunk: GenerateChunk = match serde_json::from_str(&event.data) {
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

                    let parts = chunk
                        .candidates
                        .into_iter()
                        .filter_map(|c| c.content)
                        .flat_map(|c| c.parts);
                    for part in parts {
                        if let Some(text) = part.text.filter(|t| !t.is_empty()) {
                            yield Ok(text);
                        }
                        if let Some(call) = part.function_call {
                            calls.push(ToolCall::from_json_arguments(call.name, &call.args));
                        }
                    }
                }

                if calls.is_empty() {
                    return;
                }
                debug!(round, calls = calls.len(), "Resolving Gemini function calls");

                contents.push(json!({
                    "role": "model",
                    "parts": calls.iter().map(|call| json!({
                        "functionCall": { "name": call.tool_name, "args": call.arguments_json() }
                    })).collect::<Vec<_>>(),
                }));
                let responses: Vec<JsonValue> = calls
                    .iter()
                    .map(|call| json!({
                        "functionResponse": {
                            "name": call.tool_name,
                            "response": { "result": resolve_native(&self.tools, call) },
                        }
                    }))
                    .collect();
                contents.push(json!({ "role": "user", "parts": responses }));
            }

            warn!(max_rounds = MAX_TOOL_ROUNDS, "Function call rounds exhausted, ending turn");
        })
    }
}
