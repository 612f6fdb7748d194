//! The assistant facade.
//!
//! An [`Agent`] wires one [`Conversation`], the code [`ToolRegistry`] and a
//! [`HandoffCoordinator`] together. Callers create the event channel, keep
//! the receiving half, and drive the agent with [`Agent::get_response`]:
//!
//! ```ignore
//! let (events, mut rx) = messaging::channel();
//! let mut agent = Agent::new(&provider_config, store, events)?;
//! let answer = agent.get_response("draw a circle of radius 10").await?;
//! while let Ok(Some(event)) = rx.try_recv() { /* tokens, executions */ }
//! if agent.is_paused() {
//!     // hand executions to the host, then:
//!     agent.wait_until_ready().await;
//! }
//! ```

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ProviderConfig, ProviderKind};
use crate::conversation::{Conversation, Message};
use crate::handoff::{HandoffCoordinator, HandoffReporter};
use crate::messaging::EventSender;
use crate::providers::{create_adapter, ProviderAdapter, ProviderError};
use crate::tools::{CodeArtifactStore, CodeLifecycleState, ToolRegistry};

/// Errors from driving the agent.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("Waiting on {outstanding} host event(s); prompt not accepted")]
    Paused { outstanding: usize },
}

/// One conversation with its tools and handoff state.
pub struct Agent {
    conversation: Conversation,
    tools: Arc<ToolRegistry>,
    coordinator: HandoffCoordinator,
    events: EventSender,
}

impl Agent {
    /// Create an agent for `config`.
    ///
    /// Fails when the provider needs a credential that is not configured.
    pub fn new(
        config: &ProviderConfig,
        store: Arc<dyn CodeArtifactStore>,
        events: EventSender,
    ) -> Result<Self, AgentError> {
        Self::with_adapter_factory(config.system_prompt.clone(), store, events, |tools| {
            create_adapter(config, tools)
        })
    }

    /// Create an agent around a custom adapter.
    ///
    /// `factory` receives the registry the adapter must resolve tool calls
    /// through.
    pub fn with_adapter_factory<F>(
        system_prompt: impl Into<String>,
        store: Arc<dyn CodeArtifactStore>,
        events: EventSender,
        factory: F,
    ) -> Result<Self, AgentError>
    where
        F: FnOnce(Arc<ToolRegistry>) -> Result<Box<dyn ProviderAdapter>, ProviderError>,
    {
        let coordinator = HandoffCoordinator::new();
        let tools = Arc::new(ToolRegistry::new(store, coordinator.clone(), events.clone()));
        let adapter = factory(tools.clone())?;

        info!(provider = %adapter.kind(), model = adapter.model_id(), "Agent ready");
        Ok(Self {
            conversation: Conversation::new(system_prompt, adapter),
            tools,
            coordinator,
            events,
        })
    }

    /// Answer `prompt`, streaming fragments as `AssistantResponseToken`
    /// events, and return the full answer.
    ///
    /// Rejected while host events are outstanding.
    pub async fn get_response(&mut self, prompt: &str) -> Result<String, AgentError> {
        let outstanding = self.coordinator.outstanding();
        if outstanding > 0 {
            warn!(outstanding, "Prompt submitted while paused");
            return Err(AgentError::Paused { outstanding });
        }

        debug!(chars = prompt.len(), "Prompt accepted");
        self.coordinator.begin_response();
        let events = self.events.clone();
        let result = self
            .conversation
            .send(prompt, move |fragment| events.token(fragment))
            .await;
        self.coordinator.finish_response();

        Ok(result?)
    }

    /// Speech to text through the active provider. Empty when unsupported
    /// or on failure.
    pub async fn transcribe_audio(&self, audio: &[u8]) -> String {
        if audio.is_empty() {
            return String::new();
        }
        self.conversation.adapter().transcribe_audio(audio).await
    }

    pub fn provider(&self) -> ProviderKind {
        self.conversation.adapter().kind()
    }

    pub fn model_id(&self) -> &str {
        self.conversation.adapter().model_id()
    }

    /// Whether the agent is waiting on the host.
    pub fn is_paused(&self) -> bool {
        self.coordinator.is_paused()
    }

    /// Handle for the host to report execution outcomes.
    pub fn reporter(&self) -> HandoffReporter {
        self.coordinator.reporter()
    }

    pub fn coordinator(&self) -> &HandoffCoordinator {
        &self.coordinator
    }

    /// Wait until every outstanding host event has been reported.
    pub async fn wait_until_ready(&self) {
        self.coordinator.wait_until_ready().await
    }

    pub fn history(&self) -> &[Message] {
        self.conversation.history()
    }

    /// Copy of the code lifecycle state.
    pub fn code_state(&self) -> CodeLifecycleState {
        self.tools.snapshot()
    }
}
