//! Handoff coordination between the conversation and the host.
//!
//! When the assistant asks for code to be executed, the conversation is
//! suspended until the host has reported back on every sub-operation it
//! was handed (the load, and the entry-point invocation when there is one).
//!
//! ```text
//! Idle ──begin_response──▶ AwaitingResponse ──register_execution──▶ AwaitingExternalExecution
//!  ▲                              │                                          │
//!  └────────finish_response───────┘                 report × outstanding ────┘
//! ```
//!
//! Every mutation happens under one lock, so host reports may arrive from
//! any task or thread.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Code that has been persisted and must be loaded by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingExecution {
    /// Where the code was written.
    pub code_path: PathBuf,
    /// Command to invoke after loading (the `NAME` of `c:NAME`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<String>,
}

impl PendingExecution {
    /// Create a pending execution. An empty entry point means "load only".
    pub fn new(code_path: impl Into<PathBuf>, entry_point: impl Into<String>) -> Self {
        let entry_point = entry_point.into();
        Self {
            code_path: code_path.into(),
            entry_point: (!entry_point.is_empty()).then_some(entry_point),
        }
    }

    pub fn code_path(&self) -> &Path {
        &self.code_path
    }

    /// Number of host events this execution will produce.
    pub fn expected_reports(&self) -> usize {
        if self.entry_point.is_some() {
            2
        } else {
            1
        }
    }
}

/// Where the coordinator is in the response/handoff cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffState {
    Idle,
    AwaitingResponse,
    AwaitingExternalExecution,
}

/// Outcome of one host sub-operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostReport {
    Completed,
    Cancelled,
}

#[derive(Debug)]
struct Counter {
    state: HandoffState,
    outstanding: usize,
    ready_signals: u64,
}

#[derive(Debug)]
struct Shared {
    counter: Mutex<Counter>,
    ready: watch::Sender<bool>,
}

/// Tracks outstanding host events for one agent.
#[derive(Debug, Clone)]
pub struct HandoffCoordinator {
    shared: Arc<Shared>,
}

impl Default for HandoffCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl HandoffCoordinator {
    pub fn new() -> Self {
        let (ready, _) = watch::channel(true);
        Self {
            shared: Arc::new(Shared {
                counter: Mutex::new(Counter {
                    state: HandoffState::Idle,
                    outstanding: 0,
                    ready_signals: 0,
                }),
                ready,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Counter> {
        self.shared
            .counter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// A response is being produced.
    pub fn begin_response(&self) {
        let mut counter = self.lock();
        if counter.outstanding == 0 {
            counter.state = HandoffState::AwaitingResponse;
        }
    }

    /// The response stream has ended.
    ///
    /// Returns to `Idle` unless executions are still outstanding.
    pub fn finish_response(&self) {
        let mut counter = self.lock();
        if counter.outstanding == 0 {
            counter.state = HandoffState::Idle;
        }
    }

    /// Record an execution the host is about to be asked to run.
    ///
    /// Returns the new outstanding count.
    pub fn register_execution(&self, execution: &PendingExecution) -> usize {
        let mut counter = self.lock();
        counter.outstanding += execution.expected_reports();
        counter.state = HandoffState::AwaitingExternalExecution;
        self.shared.ready.send_replace(false);

        debug!(
            path = %execution.code_path.display(),
            entry_point = execution.entry_point.as_deref().unwrap_or(""),
            outstanding = counter.outstanding,
            "Execution registered"
        );
        counter.outstanding
    }

    /// Apply one host report.
    ///
    /// Returns `true` when this report released the conversation.
    pub fn report(&self, report: HostReport) -> bool {
        let mut counter = self.lock();
        if counter.outstanding == 0 {
            warn!(?report, "Host report with nothing outstanding, ignoring");
            return false;
        }

        counter.outstanding -= 1;
        debug!(?report, outstanding = counter.outstanding, "Host report");

        if counter.outstanding > 0 {
            return false;
        }

        counter.state = HandoffState::Idle;
        counter.ready_signals += 1;
        self.shared.ready.send_replace(true);
        true
    }

    /// Whether prompting must wait on the host.
    pub fn is_paused(&self) -> bool {
        self.lock().outstanding > 0
    }

    pub fn outstanding(&self) -> usize {
        self.lock().outstanding
    }

    pub fn state(&self) -> HandoffState {
        self.lock().state
    }

    /// How many times the coordinator has signalled ready.
    pub fn ready_signals(&self) -> u64 {
        self.lock().ready_signals
    }

    /// Handle the host uses to report outcomes.
    pub fn reporter(&self) -> HandoffReporter {
        HandoffReporter {
            coordinator: self.clone(),
        }
    }

    /// Wait until nothing is outstanding. Returns at once when idle.
    pub async fn wait_until_ready(&self) {
        let mut ready = self.shared.ready.subscribe();
        // The sender lives in `shared`, so this cannot observe a closed channel.
        let _ = ready.wait_for(|ready| *ready).await;
    }
}

/// Clonable handle the host uses to report sub-operation outcomes.
#[derive(Debug, Clone)]
pub struct HandoffReporter {
    coordinator: HandoffCoordinator,
}

impl HandoffReporter {
    pub fn completed(&self) -> bool {
        self.coordinator.report(HostReport::Completed)
    }

    pub fn cancelled(&self) -> bool {
        self.coordinator.report(HostReport::Cancelled)
    }

    pub fn report(&self, report: HostReport) -> bool {
        self.coordinator.report(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    // =========================================================================
    // PendingExecution Tests
    // =========================================================================

    #[test]
    fn test_pending_execution_empty_entry_point_is_none() {
        let execution = PendingExecution::new("/tmp/a.lsp", "");
        assert!(execution.entry_point.is_none());
        assert_eq!(execution.expected_reports(), 1);
    }

    #[test]
    fn test_pending_execution_with_entry_point() {
        let execution = PendingExecution::new("/tmp/a.lsp", "DRAWCIRCLE");
        assert_eq!(execution.entry_point.as_deref(), Some("DRAWCIRCLE"));
        assert_eq!(execution.expected_reports(), 2);
        assert_eq!(execution.code_path(), Path::new("/tmp/a.lsp"));
    }

    // =========================================================================
    // State Machine Tests
    // =========================================================================

    #[test]
    fn test_starts_idle_and_unpaused() {
        let coordinator = HandoffCoordinator::new();
        assert_eq!(coordinator.state(), HandoffState::Idle);
        assert!(!coordinator.is_paused());
        assert_eq!(coordinator.outstanding(), 0);
    }

    #[test]
    fn test_response_without_execution_returns_to_idle() {
        let coordinator = HandoffCoordinator::new();
        coordinator.begin_response();
        assert_eq!(coordinator.state(), HandoffState::AwaitingResponse);
        coordinator.finish_response();
        assert_eq!(coordinator.state(), HandoffState::Idle);
        assert_eq!(coordinator.ready_signals(), 0);
    }

    #[test]
    fn test_execution_keeps_awaiting_after_finish() {
        let coordinator = HandoffCoordinator::new();
        coordinator.begin_response();
        coordinator.register_execution(&PendingExecution::new("/tmp/a.lsp", ""));
        coordinator.finish_response();

        assert_eq!(coordinator.state(), HandoffState::AwaitingExternalExecution);
        assert!(coordinator.is_paused());
    }

    #[test]
    fn test_entry_point_adds_two() {
        let coordinator = HandoffCoordinator::new();
        let outstanding =
            coordinator.register_execution(&PendingExecution::new("/tmp/a.lsp", "DRAWCIRCLE"));
        assert_eq!(outstanding, 2);
    }

    #[test]
    fn test_completed_and_cancelled_decrement_identically() {
        let coordinator = HandoffCoordinator::new();
        coordinator.register_execution(&PendingExecution::new("/tmp/a.lsp", "DRAWCIRCLE"));

        assert!(!coordinator.report(HostReport::Completed));
        assert_eq!(coordinator.outstanding(), 1);
        assert!(coordinator.report(HostReport::Cancelled));
        assert_eq!(coordinator.outstanding(), 0);
        assert_eq!(coordinator.state(), HandoffState::Idle);
        assert_eq!(coordinator.ready_signals(), 1);
    }

    #[test]
    fn test_report_at_zero_is_ignored() {
        let coordinator = HandoffCoordinator::new();
        assert!(!coordinator.report(HostReport::Completed));
        assert_eq!(coordinator.outstanding(), 0);
        assert_eq!(coordinator.ready_signals(), 0);
    }

    #[test]
    fn test_ready_signalled_exactly_once_per_handoff() {
        let coordinator = HandoffCoordinator::new();
        for _ in 0..3 {
            coordinator.register_execution(&PendingExecution::new("/tmp/a.lsp", ""));
        }

        assert!(!coordinator.report(HostReport::Cancelled));
        assert!(!coordinator.report(HostReport::Completed));
        assert!(coordinator.report(HostReport::Completed));
        assert!(!coordinator.report(HostReport::Completed));
        assert_eq!(coordinator.ready_signals(), 1);
    }

    // =========================================================================
    // Async Tests
    // =========================================================================

    #[tokio::test]
    async fn test_wait_until_ready_returns_when_idle() {
        let coordinator = HandoffCoordinator::new();
        tokio::time::timeout(Duration::from_secs(1), coordinator.wait_until_ready())
            .await
            .expect("idle coordinator should be ready");
    }

    #[tokio::test]
    async fn test_reports_from_other_tasks_release_waiter() {
        let coordinator = HandoffCoordinator::new();
        coordinator.register_execution(&PendingExecution::new("/tmp/a.lsp", "DRAWCIRCLE"));

        let reporter = coordinator.reporter();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            reporter.completed();
            tokio::time::sleep(Duration::from_millis(10)).await;
            reporter.cancelled();
        });

        tokio::time::timeout(Duration::from_secs(2), coordinator.wait_until_ready())
            .await
            .expect("waiter should be released");
        handle.await.unwrap();

        assert!(!coordinator.is_paused());
        assert_eq!(coordinator.ready_signals(), 1);
    }

    #[tokio::test]
    async fn test_wait_blocks_while_outstanding() {
        let coordinator = HandoffCoordinator::new();
        coordinator.register_execution(&PendingExecution::new("/tmp/a.lsp", ""));

        let result =
            tokio::time::timeout(Duration::from_millis(50), coordinator.wait_until_ready()).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_reports_from_threads() {
        let coordinator = HandoffCoordinator::new();
        for _ in 0..8 {
            coordinator.register_execution(&PendingExecution::new("/tmp/a.lsp", "X"));
        }

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let reporter = coordinator.reporter();
                std::thread::spawn(move || {
                    if i % 2 == 0 {
                        reporter.completed()
                    } else {
                        reporter.cancelled()
                    }
                })
            })
            .collect();

        let released: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();

        assert_eq!(released, 1);
        assert_eq!(coordinator.outstanding(), 0);
        assert_eq!(coordinator.ready_signals(), 1);
    }
}
