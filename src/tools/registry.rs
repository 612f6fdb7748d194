//! The code lifecycle tools and their shared state.
//!
//! `save_code` and `execute_code` are callable by every provider. They share
//! one [`CodeLifecycleState`]: executing exactly the code that was last
//! saved reruns the saved file, anything else goes through the temporary file.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::lisp::{contains_code_block, extract_entry_point};
use super::store::CodeArtifactStore;
use super::types::{ToolCall, ToolDefinition, ToolResult, ARG_LAST_CODE, EXECUTE_CODE, SAVE_CODE};
use crate::handoff::{HandoffCoordinator, PendingExecution};
use crate::messaging::EventSender;

/// Returned when nothing was saved.
pub const SAVE_FAILED: &str = "Failed to save the LISP code.";
/// Returned when the last saved file was run again.
pub const RAN_SAVED: &str = "Ran the most recently saved LISP code.";
/// Returned when freshly generated code was run from the temporary file.
pub const RAN_GENERATED: &str = "Ran the LISP code generated just before.";
/// Returned when the temporary file could not be written.
pub const RUN_FAILED: &str = "Failed to prepare the LISP code for execution.";

/// A tool call that could not be dispatched.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Tool {tool} called without argument {argument}")]
    MissingArgument { tool: String, argument: &'static str },
}

/// What was last saved through `save_code`.
///
/// `last_saved_path` and `last_saved_fingerprint` are set and cleared
/// together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeLifecycleState {
    last_saved_path: Option<PathBuf>,
    last_saved_fingerprint: Option<String>,
    last_entry_point: String,
}

impl CodeLifecycleState {
    pub fn last_saved_path(&self) -> Option<&PathBuf> {
        self.last_saved_path.as_ref()
    }

    pub fn last_saved_fingerprint(&self) -> Option<&str> {
        self.last_saved_fingerprint.as_deref()
    }

    pub fn last_entry_point(&self) -> &str {
        &self.last_entry_point
    }

    pub fn has_saved(&self) -> bool {
        self.last_saved_fingerprint.is_some()
    }

    fn record(&mut self, path: PathBuf, code: &str) {
        self.last_saved_path = Some(path);
        self.last_saved_fingerprint = Some(code.to_string());
        self.last_entry_point = extract_entry_point(code);
    }

    fn clear(&mut self) {
        self.last_saved_path = None;
        self.last_saved_fingerprint = None;
    }

    fn matching_save(&self, code: &str) -> Option<PendingExecution> {
        match (&self.last_saved_fingerprint, &self.last_saved_path) {
            (Some(fingerprint), Some(path)) if fingerprint == code => Some(PendingExecution::new(
                path.clone(),
                self.last_entry_point.clone(),
            )),
            _ => None,
        }
    }
}

/// The two code tools, bound to one conversation.
pub struct ToolRegistry {
    state: Mutex<CodeLifecycleState>,
    store: Arc<dyn CodeArtifactStore>,
    coordinator: HandoffCoordinator,
    events: EventSender,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("state", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl ToolRegistry {
    pub fn new(
        store: Arc<dyn CodeArtifactStore>,
        coordinator: HandoffCoordinator,
        events: EventSender,
    ) -> Self {
        Self {
            state: Mutex::new(CodeLifecycleState::default()),
            store,
            coordinator,
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CodeLifecycleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Declarations of every tool, for the provider request.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        ToolDefinition::code_tools()
    }

    /// Copy of the current lifecycle state.
    pub fn snapshot(&self) -> CodeLifecycleState {
        self.lock().clone()
    }

    /// Dispatch a model tool call.
    pub fn invoke(&self, call: &ToolCall) -> Result<ToolResult, ToolError> {
        let tool = call.tool_name.as_str();
        if tool != SAVE_CODE && tool != EXECUTE_CODE {
            return Err(ToolError::UnknownTool(call.tool_name.clone()));
        }
        let code = call
            .argument(ARG_LAST_CODE)
            .ok_or_else(|| ToolError::MissingArgument {
                tool: call.tool_name.clone(),
                argument: ARG_LAST_CODE,
            })?;

        debug!(tool, id = call.id.as_deref().unwrap_or(""), "Tool called");
        if tool == SAVE_CODE {
            Ok(self.save_code(code))
        } else {
            Ok(self.execute_code(code))
        }
    }

    /// Save `last_code` to a user-chosen location.
    pub fn save_code(&self, last_code: &str) -> ToolResult {
        if last_code.is_empty() {
            warn!(tool = SAVE_CODE, "Nothing to save");
            return ToolResult::text(SAVE_FAILED);
        }

        let path = match self.store.save(last_code, true) {
            Ok(Some(path)) => path,
            Ok(None) => return ToolResult::text(SAVE_FAILED),
            Err(e) => {
                warn!(tool = SAVE_CODE, error = %e, "Save failed");
                return ToolResult::text(SAVE_FAILED);
            }
        };

        self.lock().record(path.clone(), last_code);
        info!(path = %path.display(), "LISP code saved");
        ToolResult::text(path.display().to_string())
    }

    /// Hand `last_code` to the host for execution.
    pub fn execute_code(&self, last_code: &str) -> ToolResult {
        let reused = self.lock().matching_save(last_code);

        let (execution, text) = match reused {
            Some(execution) => (execution, RAN_SAVED),
            None => match self.store.save(last_code, false) {
                Ok(Some(path)) => (
                    PendingExecution::new(path, extract_entry_point(last_code)),
                    RAN_GENERATED,
                ),
                Ok(None) => return ToolResult::text(RUN_FAILED),
                Err(e) => {
                    warn!(tool = EXECUTE_CODE, error = %e, "Temporary save failed");
                    return ToolResult::text(RUN_FAILED);
                }
            },
        };

        info!(
            path = %execution.code_path.display(),
            entry_point = execution.entry_point.as_deref().unwrap_or(""),
            reused = text == RAN_SAVED,
            "Starting execution"
        );
        self.coordinator.register_execution(&execution);
        self.events.start_execution(execution);
        ToolResult::text(text)
    }

    /// Forget the saved code when a turn produced new code without saving it.
    ///
    /// Returns whether anything was cleared.
    pub(crate) fn invalidate_if_superseded(&self, response: &str) -> bool {
        let mut state = self.lock();
        if !state.has_saved() || !contains_code_block(response) {
            return false;
        }
        state.clear();
        debug!("Saved code superseded by new code block");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::{channel, AgentEvent, EventReceiver};
    use crate::tools::store::{FileArtifactStore, SaveLocationChooser, TEMP_FILE_NAME};
    use std::fs;
    use tempfile::TempDir;

    struct FixedChooser(Option<PathBuf>);

    impl SaveLocationChooser for FixedChooser {
        fn choose(&self) -> Option<PathBuf> {
            self.0.clone()
        }
    }

    struct Fixture {
        tmp: TempDir,
        registry: ToolRegistry,
        coordinator: HandoffCoordinator,
        events: EventReceiver,
    }

    fn fixture(chosen: Option<&str>) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let chosen = chosen.map(|name| tmp.path().join(name));
        let store = FileArtifactStore::with_temp_dir(tmp.path(), FixedChooser(chosen));
        let coordinator = HandoffCoordinator::new();
        let (sender, events) = channel();
        let registry = ToolRegistry::new(Arc::new(store), coordinator.clone(), sender);
        Fixture {
            tmp,
            registry,
            coordinator,
            events,
        }
    }

    const CIRCLE: &str = "(command \"_circle\" '(0 0) 10)";
    const DEFUN: &str = "(defun c:DRAWCIRCLE ()\n  (command \"_circle\" '(0 0) 10)\n)";

    // =========================================================================
    // save_code Tests
    // =========================================================================

    #[test]
    fn test_save_records_state() {
        let f = fixture(Some("circle.lsp"));
        let result = f.registry.save_code(DEFUN);
        let expected = f.tmp.path().join("circle.lsp");

        assert_eq!(result.text, expected.display().to_string());
        let state = f.registry.snapshot();
        assert_eq!(state.last_saved_path(), Some(&expected));
        assert_eq!(state.last_saved_fingerprint(), Some(DEFUN));
        assert_eq!(state.last_entry_point(), "DRAWCIRCLE");
        assert_eq!(fs::read_to_string(expected).unwrap(), DEFUN);
    }

    #[test]
    fn test_save_empty_code_fails_softly() {
        let f = fixture(Some("circle.lsp"));
        assert_eq!(f.registry.save_code("").text, SAVE_FAILED);
        assert!(!f.registry.snapshot().has_saved());
    }

    #[test]
    fn test_save_cancelled_fails_softly() {
        let f = fixture(None);
        assert_eq!(f.registry.save_code(CIRCLE).text, SAVE_FAILED);
        assert!(!f.registry.snapshot().has_saved());
    }

    #[test]
    fn test_double_save_keeps_fingerprint() {
        let f = fixture(Some("circle.lsp"));
        f.registry.save_code(CIRCLE);
        f.registry.save_code(CIRCLE);
        assert_eq!(f.registry.snapshot().last_saved_fingerprint(), Some(CIRCLE));
    }

    // =========================================================================
    // execute_code Tests
    // =========================================================================

    #[test]
    fn test_execute_after_save_reuses_saved_file() {
        let mut f = fixture(Some("circle.lsp"));
        f.registry.save_code(DEFUN);

        let result = f.registry.execute_code(DEFUN);
        assert_eq!(result.text, RAN_SAVED);
        assert!(!f.tmp.path().join(TEMP_FILE_NAME).exists());

        let events = f.events.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0],
            AgentEvent::start_execution(PendingExecution::new(
                f.tmp.path().join("circle.lsp"),
                "DRAWCIRCLE"
            ))
        );
        assert_eq!(f.coordinator.outstanding(), 2);
    }

    #[test]
    fn test_execute_without_save_uses_temp_file() {
        let mut f = fixture(Some("circle.lsp"));

        let result = f.registry.execute_code(CIRCLE);
        assert_eq!(result.text, RAN_GENERATED);

        let temp = f.tmp.path().join(TEMP_FILE_NAME);
        assert_eq!(fs::read_to_string(&temp).unwrap(), CIRCLE);
        let events = f.events.drain();
        assert_eq!(
            events,
            vec![AgentEvent::start_execution(PendingExecution::new(temp, ""))]
        );
        assert_eq!(f.coordinator.outstanding(), 1);
        assert!(!f.registry.snapshot().has_saved());
    }

    #[test]
    fn test_execute_different_code_leaves_fingerprint() {
        let mut f = fixture(Some("circle.lsp"));
        f.registry.save_code(CIRCLE);

        let result = f.registry.execute_code(DEFUN);
        assert_eq!(result.text, RAN_GENERATED);
        assert_eq!(f.registry.snapshot().last_saved_fingerprint(), Some(CIRCLE));

        let events = f.events.drain();
        let execution = events[0].as_execution().unwrap();
        assert_eq!(execution.code_path, f.tmp.path().join(TEMP_FILE_NAME));
        assert_eq!(execution.entry_point.as_deref(), Some("DRAWCIRCLE"));
    }

    #[test]
    fn test_execute_temp_write_failure_emits_nothing() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("blocker");
        fs::write(&blocker, "x").unwrap();
        let store = FileArtifactStore::with_temp_dir(&blocker, FixedChooser(None));
        let coordinator = HandoffCoordinator::new();
        let (sender, mut events) = channel();
        let registry = ToolRegistry::new(Arc::new(store), coordinator.clone(), sender);

        assert_eq!(registry.execute_code(CIRCLE).text, RUN_FAILED);
        assert!(events.drain().is_empty());
        assert!(!coordinator.is_paused());
    }

    // =========================================================================
    // invoke Tests
    // =========================================================================

    #[test]
    fn test_invoke_dispatches_by_name() {
        let mut f = fixture(Some("circle.lsp"));
        let save = ToolCall::new(SAVE_CODE).with_argument(ARG_LAST_CODE, CIRCLE);
        let exec = ToolCall::new(EXECUTE_CODE).with_argument(ARG_LAST_CODE, CIRCLE);

        assert!(f.registry.invoke(&save).unwrap().text.ends_with("circle.lsp"));
        assert_eq!(f.registry.invoke(&exec).unwrap().text, RAN_SAVED);
        assert_eq!(f.events.drain().len(), 1);
    }

    #[test]
    fn test_invoke_unknown_tool() {
        let f = fixture(None);
        let err = f.registry.invoke(&ToolCall::new("delete_everything")).unwrap_err();
        assert_eq!(err, ToolError::UnknownTool("delete_everything".to_string()));
    }

    #[test]
    fn test_invoke_missing_argument() {
        let f = fixture(None);
        let call = ToolCall::new(SAVE_CODE).with_argument("code", CIRCLE);
        assert!(matches!(
            f.registry.invoke(&call),
            Err(ToolError::MissingArgument { .. })
        ));
    }

    // =========================================================================
    // Invalidation Tests
    // =========================================================================

    #[test]
    fn test_invalidate_requires_code_block_and_save() {
        let f = fixture(Some("circle.lsp"));
        assert!(!f.registry.invalidate_if_superseded("```lisp\n(princ)\n```"));

        f.registry.save_code(CIRCLE);
        assert!(!f.registry.invalidate_if_superseded("Anything else?"));
        assert!(f.registry.snapshot().has_saved());

        assert!(f.registry.invalidate_if_superseded("```lisp\n(princ)\n```"));
        let state = f.registry.snapshot();
        assert!(state.last_saved_path().is_none());
        assert!(state.last_saved_fingerprint().is_none());
    }
}
