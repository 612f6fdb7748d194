//! Terminal host: a reedline prompt, stdout messages and printed AutoLISP.

use std::borrow::Cow;
use std::io::{self, Write};
use std::path::PathBuf;

use reedline::{
    Emacs, KeyCode, KeyModifiers, Prompt, PromptEditMode, PromptHistorySearch,
    PromptHistorySearchStatus, Reedline, ReedlineEvent, Signal,
};
use tracing::{debug, warn};

use super::{HostEnvironment, PromptResult};
use crate::handoff::{HandoffReporter, PendingExecution};

/// Prompt shown by [`TerminalHost`].
pub struct HostPrompt {
    pub label: String,
    pub voice: bool,
}

impl HostPrompt {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            voice: false,
        }
    }
}

impl Prompt for HostPrompt {
    fn render_prompt_left(&self) -> Cow<'_, str> {
        Cow::Owned(format!("\x1b[1;33mAI\x1b[0m \x1b[2m[{}]\x1b[0m", self.label))
    }

    fn render_prompt_right(&self) -> Cow<'_, str> {
        if self.voice {
            Cow::Borrowed("\x1b[2mV: voice\x1b[0m")
        } else {
            Cow::Borrowed("")
        }
    }

    fn render_prompt_indicator(&self, _mode: PromptEditMode) -> Cow<'_, str> {
        Cow::Borrowed(" > ")
    }

    fn render_prompt_multiline_indicator(&self) -> Cow<'_, str> {
        Cow::Borrowed("... ")
    }

    fn render_prompt_history_search_indicator(&self, hs: PromptHistorySearch) -> Cow<'_, str> {
        let prefix = match hs.status {
            PromptHistorySearchStatus::Passing => "",
            PromptHistorySearchStatus::Failing => "failing ",
        };
        Cow::Owned(format!("({}search: {}) ", prefix, hs.term))
    }
}

/// Line editor with Esc bound to cancel, like Ctrl-D.
fn create_reedline() -> Reedline {
    let mut keybindings = reedline::default_emacs_keybindings();
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Esc, ReedlineEvent::CtrlD);
    Reedline::create().with_edit_mode(Box::new(Emacs::new(keybindings)))
}

/// AutoLISP expression that loads `execution`'s file.
pub fn load_expression(execution: &PendingExecution) -> String {
    let path = execution.code_path.to_string_lossy().replace('\\', "/");
    format!("(load \"{}\")", path.replace('"', "\\\""))
}

/// AutoLISP expression that invokes the entry point, if any.
pub fn invoke_expression(execution: &PendingExecution) -> Option<String> {
    execution
        .entry_point
        .as_deref()
        .map(|name| format!("(c:{})", name))
}

/// Host for plain terminals.
///
/// There is no drawing to run code in, so executions are printed as the
/// expressions a CAD command line would receive and reported completed.
pub struct TerminalHost {
    editor: Option<Reedline>,
    prompt: HostPrompt,
    out: Box<dyn Write + Send>,
}

impl TerminalHost {
    pub fn new(label: &str) -> Self {
        Self::with_output(label, Box::new(io::stdout()))
    }

    /// Host writing messages to `out` instead of stdout.
    pub fn with_output(label: &str, out: Box<dyn Write + Send>) -> Self {
        Self {
            editor: None,
            prompt: HostPrompt::new(label),
            out,
        }
    }

    fn read_line(&mut self) -> PromptResult {
        let editor = self.editor.get_or_insert_with(create_reedline);
        match editor.read_line(&self.prompt) {
            Ok(Signal::Success(line)) => PromptResult::ok(line.trim()),
            Ok(Signal::CtrlC) | Ok(Signal::CtrlD) => PromptResult::cancelled(),
            Err(err) => {
                warn!(error = %err, "Readline error");
                PromptResult::cancelled()
            }
        }
    }
}

impl HostEnvironment for TerminalHost {
    fn prompt_user(&mut self, text: &str, allow_voice_input: bool) -> PromptResult {
        self.write_message(&format!("{}\n", text));
        self.prompt.voice = allow_voice_input;
        self.read_line()
    }

    fn write_message(&mut self, text: &str) {
        if let Err(e) = write!(self.out, "{}", text).and_then(|_| self.out.flush()) {
            debug!(error = %e, "Terminal write failed");
        }
    }

    fn execute_loaded_code(&mut self, execution: PendingExecution, reporter: HandoffReporter) {
        let mut lines = vec![load_expression(&execution)];
        lines.extend(invoke_expression(&execution));
        for line in &lines {
            self.write_message(&format!("{}\n", line));
        }

        let reports = lines.len();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    for _ in 0..reports {
                        reporter.completed();
                    }
                });
            }
            Err(_) => {
                for _ in 0..reports {
                    reporter.completed();
                }
            }
        }
    }

    fn capture_audio(&mut self) -> Option<Vec<u8>> {
        self.write_message("WAV file to transcribe\n");
        self.prompt.voice = false;
        let answer = self.read_line();
        if answer.is_cancelled() || answer.text.is_empty() {
            return None;
        }

        let path = PathBuf::from(shellexpand::tilde(&answer.text).as_ref());
        match std::fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                self.write_message(&format!("Could not read {}: {}\n", path.display(), e));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handoff::HandoffCoordinator;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    // =========================================================================
    // Expression Tests
    // =========================================================================

    #[test]
    fn test_load_expression_uses_forward_slashes() {
        let execution = PendingExecution::new(r"C:\temp\tmpAIGenLisp.lsp", "");
        assert_eq!(load_expression(&execution), "(load \"C:/temp/tmpAIGenLisp.lsp\")");
    }

    #[test]
    fn test_invoke_expression() {
        let execution = PendingExecution::new("/tmp/a.lsp", "DRAWCIRCLE");
        assert_eq!(invoke_expression(&execution).as_deref(), Some("(c:DRAWCIRCLE)"));
        assert!(invoke_expression(&PendingExecution::new("/tmp/a.lsp", "")).is_none());
    }

    #[test]
    fn test_prompt_rendering() {
        let mut prompt = HostPrompt::new("llama3.2");
        assert!(prompt.render_prompt_left().contains("llama3.2"));
        assert_eq!(prompt.render_prompt_right(), "");
        prompt.voice = true;
        assert!(prompt.render_prompt_right().contains("voice"));
    }

    // =========================================================================
    // Host Tests
    // =========================================================================

    #[test]
    fn test_write_message_goes_to_output() {
        let buf = SharedBuf::default();
        let mut host = TerminalHost::with_output("m", Box::new(buf.clone()));
        host.write_message("hello");
        host.write_message(" world");
        assert_eq!(buf.text(), "hello world");
    }

    #[tokio::test]
    async fn test_execute_prints_and_reports_each_step() {
        let buf = SharedBuf::default();
        let mut host = TerminalHost::with_output("m", Box::new(buf.clone()));
        let coordinator = HandoffCoordinator::new();
        let execution = PendingExecution::new("/tmp/a.lsp", "DRAWCIRCLE");
        coordinator.register_execution(&execution);

        host.execute_loaded_code(execution, coordinator.reporter());

        tokio::time::timeout(Duration::from_secs(2), coordinator.wait_until_ready())
            .await
            .expect("host should report both steps");
        assert_eq!(buf.text(), "(load \"/tmp/a.lsp\")\n(c:DRAWCIRCLE)\n");
        assert_eq!(coordinator.ready_signals(), 1);
    }

    #[test]
    fn test_execute_without_runtime_reports_inline() {
        let buf = SharedBuf::default();
        let mut host = TerminalHost::with_output("m", Box::new(buf.clone()));
        let coordinator = HandoffCoordinator::new();
        let execution = PendingExecution::new("/tmp/a.lsp", "");
        coordinator.register_execution(&execution);

        host.execute_loaded_code(execution, coordinator.reporter());
        assert!(!coordinator.is_paused());
    }
}
