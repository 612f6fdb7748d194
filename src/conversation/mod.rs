//! Conversation history bound to one provider adapter.

mod prompts;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::providers::{ProviderAdapter, ProviderError};

pub use prompts::{wrap_user_prompt, SYSTEM_PROMPT};

/// Who wrote a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One entry of the history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            text: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// Ordered, append-only message history plus the adapter that answers it.
pub struct Conversation {
    history: Vec<Message>,
    adapter: Box<dyn ProviderAdapter>,
}

impl Conversation {
    /// Start a conversation seeded with `system_prompt`.
    pub fn new(system_prompt: impl Into<String>, adapter: Box<dyn ProviderAdapter>) -> Self {
        Self {
            history: vec![Message::system(system_prompt)],
            adapter,
        }
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn adapter(&self) -> &dyn ProviderAdapter {
        self.adapter.as_ref()
    }

    /// Send one prompt and stream the answer.
    ///
    /// `on_fragment` sees every fragment in arrival order before the next is
    /// requested. The concatenation of all fragments is appended to the
    /// history as one assistant message and returned. On a provider error
    /// nothing is appended for the failed answer.
    pub async fn send<F>(&mut self, prompt: &str, mut on_fragment: F) -> Result<String, ProviderError>
    where
        F: FnMut(&str) + Send,
    {
        self.history.push(Message::user(wrap_user_prompt(prompt)));

        let mut response = String::new();
        let mut fragments = 0usize;
        {
            let mut stream = self.adapter.stream_response(&self.history);
            while let Some(fragment) = stream.next().await {
                let fragment = fragment?;
                on_fragment(&fragment);
                response.push_str(&fragment);
                fragments += 1;
            }
        }

        debug!(
            provider = %self.adapter.kind(),
            fragments,
            chars = response.len(),
            "Response complete"
        );
        self.history.push(Message::assistant(response.clone()));
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKind;
    use crate::providers::FragmentStream;
    use async_trait::async_trait;
    use futures::stream;

    struct Scripted {
        fragments: Vec<Result<&'static str, &'static str>>,
    }

    #[async_trait]
    impl ProviderAdapter for Scripted {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Ollama
        }

        fn model_id(&self) -> &str {
            "scripted"
        }

        fn stream_response<'a>(&'a self, _history: &'a [Message]) -> FragmentStream<'a> {
            let items: Vec<Result<String, ProviderError>> = self
                .fragments
                .iter()
                .map(|f| match f {
                    Ok(text) => Ok(text.to_string()),
                    Err(msg) => Err(ProviderError::Stream(msg.to_string())),
                })
                .collect();
            Box::pin(stream::iter(items))
        }
    }

    fn conversation(fragments: Vec<Result<&'static str, &'static str>>) -> Conversation {
        Conversation::new("system", Box::new(Scripted { fragments }))
    }

    #[test]
    fn test_seeded_with_system_prompt() {
        let convo = conversation(vec![]);
        assert_eq!(convo.history(), &[Message::system("system")]);
    }

    #[tokio::test]
    async fn test_assistant_message_is_concatenation() {
        let mut convo = conversation(vec![Ok("```lisp\n"), Ok("(princ)"), Ok("\n```")]);
        let mut seen = Vec::new();

        let response = convo
            .send("say hi", |f| seen.push(f.to_string()))
            .await
            .unwrap();

        assert_eq!(seen, vec!["```lisp\n", "(princ)", "\n```"]);
        assert_eq!(response, "```lisp\n(princ)\n```");

        let history = convo.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[1], Message::user(wrap_user_prompt("say hi")));
        assert_eq!(history[2], Message::assistant(response));
    }

    #[tokio::test]
    async fn test_empty_stream_appends_empty_message() {
        let mut convo = conversation(vec![]);
        let response = convo.send("anything", |_| {}).await.unwrap();
        assert_eq!(response, "");
        assert_eq!(convo.history().last(), Some(&Message::assistant("")));
    }

    #[tokio::test]
    async fn test_error_stops_and_skips_assistant_message() {
        let mut convo = conversation(vec![Ok("partial"), Err("connection reset")]);
        let mut seen = Vec::new();

        let err = convo
            .send("x", |f| seen.push(f.to_string()))
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Stream(_)));
        assert_eq!(seen, vec!["partial"]);
        assert_eq!(convo.history().len(), 2);
        assert_eq!(convo.history()[1].role, Role::User);
    }

    #[tokio::test]
    async fn test_history_only_grows() {
        let mut convo = conversation(vec![Ok("a")]);
        convo.send("one", |_| {}).await.unwrap();
        convo.send("two", |_| {}).await.unwrap();

        let roles: Vec<Role> = convo.history().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                Role::System,
                Role::User,
                Role::Assistant,
                Role::User,
                Role::Assistant
            ]
        );
    }
}
