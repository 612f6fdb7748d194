//! Event types emitted by the agent.

use serde::{Deserialize, Serialize};

use crate::handoff::PendingExecution;

/// Anything the agent reports while it works on a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// One streamed fragment of the assistant's answer (or a tool result
    /// that was folded into the visible response).
    AssistantResponseToken { text: String },
    /// Code has been persisted and must be loaded by the host.
    StartExecution(PendingExecution),
}

impl AgentEvent {
    /// Create a response token event.
    pub fn token(text: impl Into<String>) -> Self {
        Self::AssistantResponseToken { text: text.into() }
    }

    /// Create a start-execution event.
    pub fn start_execution(execution: PendingExecution) -> Self {
        Self::StartExecution(execution)
    }

    /// The token text, if this is a response token.
    pub fn as_token(&self) -> Option<&str> {
        match self {
            Self::AssistantResponseToken { text } => Some(text),
            Self::StartExecution(_) => None,
        }
    }

    /// The pending execution, if this is a start-execution event.
    pub fn as_execution(&self) -> Option<&PendingExecution> {
        match self {
            Self::StartExecution(execution) => Some(execution),
            Self::AssistantResponseToken { .. } => None,
        }
    }
}
