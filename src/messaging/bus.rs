//! Single-consumer event channel between the agent and its caller.

use tokio::sync::mpsc;

use super::AgentEvent;
use crate::handoff::PendingExecution;

/// Create a connected sender/receiver pair.
///
/// The channel is unbounded: a fragment is handed over the moment the
/// provider yields it, and the stream never waits on the consumer.
pub fn channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, EventReceiver { rx })
}

/// Sender half, owned by the agent and cloned into the tool registry.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<AgentEvent>,
}

impl EventSender {
    /// Send an event.
    pub fn send(&self, event: AgentEvent) -> Result<(), EventError> {
        self.tx.send(event).map_err(|_| EventError::Closed)?;
        Ok(())
    }

    /// Send a response token. A vanished consumer is not an error here.
    pub fn token(&self, text: impl Into<String>) {
        let _ = self.send(AgentEvent::token(text));
    }

    /// Announce that code must be executed by the host.
    pub fn start_execution(&self, execution: PendingExecution) {
        if self.send(AgentEvent::start_execution(execution)).is_err() {
            tracing::warn!("start_execution emitted with no event consumer");
        }
    }

    /// Whether the receiving half has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiver half, owned by the caller.
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<AgentEvent>,
}

impl EventReceiver {
    /// Receive the next event. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<AgentEvent> {
        self.rx.recv().await
    }

    /// Take an already-queued event without waiting.
    pub fn try_recv(&mut self) -> Result<Option<AgentEvent>, EventError> {
        match self.rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(EventError::Closed),
        }
    }

    /// Drain everything currently queued.
    pub fn drain(&mut self) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        while let Ok(Some(event)) = self.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Channel errors.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("Event channel closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Sender Tests
    // =========================================================================

    #[test]
    fn test_sender_is_clone() {
        let (sender1, mut receiver) = channel();
        let sender2 = sender1.clone();

        sender1.token("from sender1");
        sender2.token("from sender2");

        assert!(receiver.try_recv().unwrap().is_some());
        assert!(receiver.try_recv().unwrap().is_some());
    }

    #[test]
    fn test_send_closed_channel() {
        let (sender, receiver) = channel();
        drop(receiver);

        assert!(sender.is_closed());
        let result = sender.send(AgentEvent::token("lost"));
        assert!(matches!(result, Err(EventError::Closed)));
    }

    #[test]
    fn test_helpers_ignore_closed_channel() {
        let (sender, receiver) = channel();
        drop(receiver);

        sender.token("ignored");
        sender.start_execution(PendingExecution::new("/tmp/x.lsp", ""));
    }

    // =========================================================================
    // Receiver Tests
    // =========================================================================

    #[test]
    fn test_try_recv_empty() {
        let (_sender, mut receiver) = channel();
        assert!(receiver.try_recv().unwrap().is_none());
    }

    #[test]
    fn test_try_recv_disconnected() {
        let (sender, mut receiver) = channel();
        drop(sender);
        assert!(matches!(receiver.try_recv(), Err(EventError::Closed)));
    }

    #[tokio::test]
    async fn test_recv_returns_none_after_senders_dropped() {
        let (sender, mut receiver) = channel();
        sender.token("last");
        drop(sender);

        assert_eq!(receiver.recv().await, Some(AgentEvent::token("last")));
        assert_eq!(receiver.recv().await, None);
    }

    #[tokio::test]
    async fn test_events_keep_send_order() {
        let (sender, mut receiver) = channel();

        sender.token("(setq ");
        sender.token("r 10)");
        sender.start_execution(PendingExecution::new("/tmp/a.lsp", ""));

        assert_eq!(receiver.recv().await.unwrap().as_token(), Some("(setq "));
        assert_eq!(receiver.recv().await.unwrap().as_token(), Some("r 10)"));
        assert!(receiver.recv().await.unwrap().as_execution().is_some());
    }

    #[tokio::test]
    async fn test_sender_from_different_task() {
        let (sender, mut receiver) = channel();

        tokio::spawn(async move {
            sender.token("from spawned task");
        })
        .await
        .unwrap();

        assert_eq!(
            receiver.recv().await.unwrap().as_token(),
            Some("from spawned task")
        );
    }

    #[test]
    fn test_drain_collects_all_queued() {
        let (sender, mut receiver) = channel();
        for i in 0..3 {
            sender.token(format!("t{i}"));
        }
        let drained = receiver.drain();
        assert_eq!(drained.len(), 3);
        assert!(receiver.drain().is_empty());
    }

    #[test]
    fn test_event_error_display() {
        assert_eq!(EventError::Closed.to_string(), "Event channel closed");
    }
}
