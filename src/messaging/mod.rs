//! Agent event channel.
//!
//! The agent never prints. Everything the caller has to react to while a
//! response is being produced flows through an explicit, single-consumer
//! channel that the caller creates and hands to [`crate::agent::Agent`]:
//!
//! ```text
//!   ┌──────────────┐  AssistantResponseToken   ┌──────────────────┐
//!   │    Agent     │ ────────────────────────▶ │  session runner  │
//!   │ (adapter and │  StartExecution           │  (host output,   │
//!   │  tool calls) │ ────────────────────────▶ │   handoff queue) │
//!   └──────────────┘                           └──────────────────┘
//! ```
//!
//! Events arrive in exactly the order they were produced, so the text
//! fragments of one response can be written out as they stream.
//!
//! ## Usage
//!
//! ```ignore
//! use lisp_assistant::messaging;
//!
//! let (events, mut receiver) = messaging::channel();
//! let agent = Agent::new(&provider_config, store, events)?;
//!
//! while let Some(event) = receiver.recv().await {
//!     // render tokens, queue executions
//! }
//! ```

mod bus;
mod types;

pub use bus::{channel, EventError, EventReceiver, EventSender};
pub use types::*;
