//! Tool call and result types shared by every provider.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

/// Name of the save tool.
pub const SAVE_CODE: &str = "save_code";
/// Name of the execute tool.
pub const EXECUTE_CODE: &str = "execute_code";
/// The single argument both tools take.
pub const ARG_LAST_CODE: &str = "last_code";

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call id, used to attribute the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub tool_name: String,
    #[serde(default)]
    pub arguments: BTreeMap<String, String>,
}

impl ToolCall {
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            id: None,
            tool_name: tool_name.into(),
            arguments: BTreeMap::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_argument(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }

    /// Build a call from a provider's JSON argument object.
    ///
    /// Strings are taken as-is; any other JSON value is kept in its
    /// serialized form. A non-object yields no arguments.
    pub fn from_json_arguments(tool_name: impl Into<String>, arguments: &JsonValue) -> Self {
        let mut call = Self::new(tool_name);
        if let JsonValue::Object(map) = arguments {
            for (key, value) in map {
                let value = match value {
                    JsonValue::String(s) => s.clone(),
                    other => other.to_string(),
                };
                call.arguments.insert(key.clone(), value);
            }
        }
        call
    }

    pub fn argument(&self, name: &str) -> Option<&str> {
        self.arguments.get(name).map(String::as_str)
    }

    /// Arguments as a JSON object, for echoing the call back to a provider.
    pub fn arguments_json(&self) -> JsonValue {
        JsonValue::Object(
            self.arguments
                .iter()
                .map(|(k, v)| (k.clone(), JsonValue::String(v.clone())))
                .collect(),
        )
    }
}

/// Text returned by a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub text: String,
}

impl ToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Backend-neutral tool declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    /// JSON Schema of the parameters object.
    pub parameters: JsonValue,
}

impl ToolDefinition {
    fn last_code_tool(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            parameters: json!({
                "type": "object",
                "properties": {
                    ARG_LAST_CODE: {
                        "type": "string",
                        "description": "The AutoLISP code generated immediately before"
                    }
                },
                "required": [ARG_LAST_CODE]
            }),
        }
    }

    /// Both code lifecycle tools.
    pub fn code_tools() -> Vec<ToolDefinition> {
        vec![
            Self::last_code_tool(SAVE_CODE, "Save the AutoLISP code"),
            Self::last_code_tool(EXECUTE_CODE, "Execute the AutoLISP code"),
        ]
    }
}
