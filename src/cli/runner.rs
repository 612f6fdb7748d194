//! Session runner for interactive and single-prompt modes.
//!
//! Drives an [`Agent`] against a [`HostEnvironment`]: reads prompts,
//! streams the answer to the host, and hands pending executions over when
//! the assistant asks for code to run.

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::agent::Agent;
use crate::handoff::PendingExecution;
use crate::host::HostEnvironment;
use crate::messaging::{AgentEvent, EventReceiver};

pub const STARTED_BANNER: &str = "\n***** AI assistant started *****\n";
pub const SUSPENDED_BANNER: &str = "\n***** AI assistant suspended *****\n";
pub const RESUMED_BANNER: &str = "\n***** AI assistant resumed *****\n";
pub const ENDED_BANNER: &str = "\n***** AI assistant ended *****\n";
pub const RESPONSE_HEADER: &str = "\nAI assistant:\n";

pub const PROMPT_TEXT: &str = "\nEnter your question (Exit or Esc to quit)";
pub const VOICE_PROMPT_TEXT: &str =
    "\nEnter your question or [Voice input(V)] (Exit or Esc to quit)";

/// What a line typed at the prompt asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Exit,
    Voice,
    Ask(String),
}

/// Whether `input` abbreviates `keyword` ("e", "Ex" and "exit" all abbreviate
/// "EXIT").
fn abbreviates(input: &str, keyword: &str) -> bool {
    keyword.starts_with(&input.to_uppercase())
}

/// Classify one prompt line. An empty line exits.
pub fn parse_command(input: &str, voice_enabled: bool) -> Command {
    let input = input.trim();
    if input.is_empty() {
        return Command::Exit;
    }
    if voice_enabled && abbreviates(input, "VOICE") {
        return Command::Voice;
    }
    if abbreviates(input, "EXIT") {
        return Command::Exit;
    }
    Command::Ask(input.to_string())
}

/// One assistant session bound to a host.
pub struct SessionRunner<H: HostEnvironment> {
    agent: Agent,
    events: EventReceiver,
    host: H,
}

impl<H: HostEnvironment> SessionRunner<H> {
    /// `events` must be the receiving half of the channel the agent was
    /// created with.
    pub fn new(agent: Agent, events: EventReceiver, host: H) -> Self {
        Self {
            agent,
            events,
            host,
        }
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Prompt until the user exits or cancels.
    ///
    /// A provider failure ends the session with an error.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        self.host.write_message(STARTED_BANNER);
        info!(provider = %self.agent.provider(), "Session started");

        let result = self.prompt_loop().await;

        self.host.write_message(ENDED_BANNER);
        info!("Session ended");
        result
    }

    /// Answer one prompt, performing any handoff it triggers.
    pub async fn run_once(&mut self, prompt: &str) -> anyhow::Result<String> {
        let (answer, executions) = self.respond(prompt).await?;
        if self.agent.is_paused() {
            self.host.write_message(SUSPENDED_BANNER);
            self.hand_off(executions);
            self.agent.wait_until_ready().await;
            self.host.write_message(RESUMED_BANNER);
        }
        Ok(answer)
    }

    async fn prompt_loop(&mut self) -> anyhow::Result<()> {
        while let Some(prompt) = self.next_prompt().await {
            self.run_once(&prompt).await?;
        }
        Ok(())
    }

    /// Next prompt to send, or `None` when the session should end.
    async fn next_prompt(&mut self) -> Option<String> {
        let voice = self.agent.provider().supports_voice();
        let text = if voice { VOICE_PROMPT_TEXT } else { PROMPT_TEXT };

        loop {
            let answer = self.host.prompt_user(text, voice);
            if answer.is_cancelled() {
                debug!("Prompt cancelled");
                return None;
            }

            match parse_command(&answer.text, voice) {
                Command::Exit => return None,
                Command::Ask(prompt) => return Some(prompt),
                Command::Voice => {
                    if let Some(prompt) = self.voice_prompt().await {
                        return Some(prompt);
                    }
                }
            }
        }
    }

    async fn voice_prompt(&mut self) -> Option<String> {
        let Some(audio) = self.host.capture_audio() else {
            self.host.write_message("\nVoice input is not available.\n");
            return None;
        };

        let text = self.agent.transcribe_audio(&audio).await;
        let text = text.trim();
        if text.is_empty() {
            self.host.write_message("\nNo speech was recognized.\n");
            return None;
        }

        self.host.write_message(&format!("{}\n", text));
        Some(text.to_string())
    }

    /// Stream the answer to the host while it is produced.
    ///
    /// Returns the answer and the executions requested during the turn.
    async fn respond(
        &mut self,
        prompt: &str,
    ) -> anyhow::Result<(String, Vec<PendingExecution>)> {
        let Self {
            agent,
            events,
            host,
        } = self;

        host.write_message(RESPONSE_HEADER);
        let mut executions = Vec::new();

        let response = agent.get_response(prompt);
        tokio::pin!(response);

        let result = loop {
            tokio::select! {
                biased;
                Some(event) = events.recv() => {
                    dispatch(event, host, &mut executions);
                }
                result = &mut response => break result,
            }
        };

        for event in events.drain() {
            dispatch(event, host, &mut executions);
        }
        host.write_message("\n");

        let answer = result.context("Failed to get a response from the assistant")?;
        Ok((answer, executions))
    }

    fn hand_off(&mut self, executions: Vec<PendingExecution>) {
        if executions.is_empty() {
            warn!(
                outstanding = self.agent.coordinator().outstanding(),
                "Paused without a pending execution"
            );
        }
        for execution in executions {
            debug!(path = %execution.code_path.display(), "Handing execution to host");
            self.host.execute_loaded_code(execution, self.agent.reporter());
        }
    }
}

fn dispatch<H: HostEnvironment>(
    event: AgentEvent,
    host: &mut H,
    executions: &mut Vec<PendingExecution>,
) {
    match event {
        AgentEvent::AssistantResponseToken { text } => host.write_message(&text),
        AgentEvent::StartExecution(execution) => executions.push(execution),
    }
}
