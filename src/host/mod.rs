//! The host environment contract.
//!
//! The host is whatever owns the user's terminal or drawing: it collects
//! prompts, shows messages and actually runs the persisted code. The
//! conversation only ever sees it through [`HostEnvironment`].

mod terminal;

pub use terminal::{HostPrompt, TerminalHost};

use crate::handoff::{HandoffReporter, PendingExecution};

/// How a prompt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptStatus {
    Ok,
    Cancelled,
}

/// Answer to [`HostEnvironment::prompt_user`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptResult {
    pub status: PromptStatus,
    pub text: String,
}

impl PromptResult {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            status: PromptStatus::Ok,
            text: text.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self {
            status: PromptStatus::Cancelled,
            text: String::new(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == PromptStatus::Cancelled
    }
}

/// Everything the session runner needs from its host.
pub trait HostEnvironment {
    /// Ask the user for a line of input.
    fn prompt_user(&mut self, text: &str, allow_voice_input: bool) -> PromptResult;

    /// Show a message. Failures stay inside the host.
    fn write_message(&mut self, text: &str);

    /// Load `execution.code_path` and invoke its entry point, if any.
    ///
    /// Must eventually report exactly once per sub-operation through
    /// `reporter`: once for the load, once more for the invocation.
    /// Reports may come later from another task.
    fn execute_loaded_code(&mut self, execution: PendingExecution, reporter: HandoffReporter);

    /// Record speech for transcription. `None` when the host cannot.
    fn capture_audio(&mut self) -> Option<Vec<u8>> {
        None
    }
}
