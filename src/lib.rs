//! LISP assistant library
//!
//! A conversational assistant that writes AutoLISP code, saves it on
//! request and hands it to a host environment for execution, suspending
//! the conversation until the host reports back.
//!
//! ## Main Components
//!
//! - [`agent`] - The assistant facade tying a conversation to its tools
//! - [`cli`] - Session runner (prompt loop, keywords, handoffs)
//! - [`config`] - XDG paths, JSON settings and provider configuration
//! - [`conversation`] - History, system prompt and prompt wrapping
//! - [`handoff`] - Suspension until the host reports on executions
//! - [`host`] - Host environment contract and the terminal host
//! - [`messaging`] - Event channel between agent and caller
//! - [`providers`] - OpenAI, Gemini and Ollama streaming adapters
//! - [`tools`] - `save_code` / `execute_code` and artifact storage
//!
//! ## Quick Start
//!
//! ```ignore
//! use lisp_assistant::{messaging, Agent, AssistantConfig, FileArtifactStore, DirectoryChooser};
//!
//! let config = AssistantConfig::load(&path)?.provider_config()?;
//! let store = Arc::new(FileArtifactStore::new(DirectoryChooser::new("/tmp/lisp")));
//! let (events, receiver) = messaging::channel();
//! let mut agent = Agent::new(&config, store, events)?;
//! let answer = agent.get_response("draw a circle of radius 10").await?;
//! ```

pub mod agent;
pub mod cli;
pub mod config;
pub mod conversation;
pub mod handoff;
pub mod host;
pub mod messaging;
pub mod providers;
pub mod tools;

// Re-export commonly used types
pub use agent::{Agent, AgentError};
pub use cli::SessionRunner;
pub use config::{AssistantConfig, ConfigError, ProviderConfig, ProviderKind, XdgDirs};
pub use conversation::{Conversation, Message, Role};
pub use handoff::{HandoffCoordinator, HandoffReporter, HandoffState, HostReport, PendingExecution};
pub use host::{HostEnvironment, PromptResult, PromptStatus, TerminalHost};
pub use messaging::{AgentEvent, EventReceiver, EventSender};
pub use providers::{create_adapter, ProviderAdapter, ProviderError};
pub use tools::{
    CodeArtifactStore, CodeLifecycleState, DirectoryChooser, FileArtifactStore, PromptChooser,
    SaveLocationChooser, ToolRegistry,
};
