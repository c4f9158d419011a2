//! Run and action outcome tracking.
//!
//! The workflow host reports into a shared [`RunMonitor`]; the test reads from
//! it. Statuses only move forward: once a run or an action reaches a terminal
//! status it never changes again.

use crate::error::{MockworkError, Result};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::{HeaderMap, StatusCode};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::watch;

/// Overall status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunStatus {
    /// No trigger has been sent.
    NotTriggered,
    /// The run is executing.
    Running,
    /// Every executed action succeeded.
    Succeeded,
    /// At least one action failed.
    Failed,
    /// The host cancelled the run.
    Cancelled,
    /// The run did not finish within the allotted time.
    TimedOut,
}

impl RunStatus {
    /// Check if the status is final.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Cancelled | Self::TimedOut
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Status of one named action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionStatus {
    /// The action never executed.
    NotStarted,
    /// The action is executing.
    Running,
    /// The action succeeded.
    Succeeded,
    /// The action failed.
    Failed,
    /// The action's run-after condition was not met.
    Skipped,
}

impl ActionStatus {
    /// Check if the status is final.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Everything known about one action.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRecord {
    /// Current status.
    pub status: ActionStatus,
    /// When the action started running.
    pub started_at: Option<DateTime<Utc>>,
    /// When the action reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
    /// Failure description, for failed actions.
    pub error: Option<String>,
}

impl ActionRecord {
    fn new() -> Self {
        Self {
            status: ActionStatus::NotStarted,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }
}

/// The synchronous response to the triggering request.
#[derive(Debug, Clone)]
pub struct TriggerResponse {
    /// HTTP status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Bytes,
}

impl TriggerResponse {
    /// Create a response with no headers.
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Get the body as a string.
    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Outcome of one triggered run.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Overall status.
    pub status: RunStatus,
    /// Response to the triggering request.
    pub response: TriggerResponse,
    /// Status of every action the host reported, by name.
    pub actions: BTreeMap<String, ActionStatus>,
}

impl RunResult {
    /// Status of a named action; `NotStarted` when never reported.
    pub fn action_status(&self, name: &str) -> ActionStatus {
        self.actions
            .get(name)
            .copied()
            .unwrap_or(ActionStatus::NotStarted)
    }
}

/// Shared run/action status table.
#[derive(Debug)]
pub struct RunMonitor {
    status: watch::Sender<RunStatus>,
    actions: RwLock<BTreeMap<String, ActionRecord>>,
    trigger_response: RwLock<Option<TriggerResponse>>,
}

impl Default for RunMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl RunMonitor {
    /// Create a monitor for a run that has not been triggered.
    pub fn new() -> Self {
        let (status, _) = watch::channel(RunStatus::NotTriggered);
        Self {
            status,
            actions: RwLock::new(BTreeMap::new()),
            trigger_response: RwLock::new(None),
        }
    }

    /// Current overall status.
    pub fn overall_status(&self) -> RunStatus {
        *self.status.borrow()
    }

    /// Move the run to `next`.
    pub fn set_run_status(&self, next: RunStatus) -> Result<()> {
        let mut outcome = Ok(());
        self.status.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            let allowed = match *current {
                RunStatus::NotTriggered => true,
                RunStatus::Running => next.is_terminal(),
                _ => false,
            };
            if allowed {
                tracing::debug!(from = %current, to = %next, "Run status changed");
                *current = next;
                true
            } else {
                outcome = Err(MockworkError::IllegalTransition {
                    subject: "run".to_string(),
                    from: current.to_string(),
                    to: next.to_string(),
                });
                false
            }
        });
        outcome
    }

    /// Wait until the run reaches a terminal status.
    pub async fn wait_for_completion(&self) -> RunStatus {
        let mut rx = self.status.subscribe();
        match rx.wait_for(|s| s.is_terminal()).await {
            Ok(status) => *status,
            Err(_) => self.overall_status(),
        }
    }

    /// Status of a named action; `NotStarted` when unknown.
    pub fn action_status(&self, name: &str) -> ActionStatus {
        self.actions
            .read()
            .get(name)
            .map_or(ActionStatus::NotStarted, |r| r.status)
    }

    /// Full record of a named action.
    pub fn action(&self, name: &str) -> Option<ActionRecord> {
        self.actions.read().get(name).cloned()
    }

    /// Move an action to `next`.
    pub fn set_action_status(&self, name: &str, next: ActionStatus) -> Result<()> {
        self.update_action(name, next, None)
    }

    /// Mark an action failed with a reason.
    pub fn fail_action(&self, name: &str, error: impl Into<String>) -> Result<()> {
        self.update_action(name, ActionStatus::Failed, Some(error.into()))
    }

    fn update_action(&self, name: &str, next: ActionStatus, error: Option<String>) -> Result<()> {
        let mut actions = self.actions.write();
        let record = actions
            .entry(name.to_string())
            .or_insert_with(ActionRecord::new);

        if record.status == next {
            return Ok(());
        }
        if record.status.is_terminal()
            || next == ActionStatus::NotStarted
            || (record.status == ActionStatus::Running && next == ActionStatus::Skipped)
        {
            return Err(MockworkError::IllegalTransition {
                subject: format!("action '{}'", name),
                from: record.status.to_string(),
                to: next.to_string(),
            });
        }

        let now = Utc::now();
        if next == ActionStatus::Running {
            record.started_at = Some(now);
        }
        if next.is_terminal() {
            record.finished_at = Some(now);
        }
        if error.is_some() {
            record.error = error;
        }
        tracing::debug!(action = name, from = %record.status, to = %next, "Action status changed");
        record.status = next;
        Ok(())
    }

    /// Status of every reported action.
    pub fn actions(&self) -> BTreeMap<String, ActionStatus> {
        self.actions
            .read()
            .iter()
            .map(|(name, record)| (name.clone(), record.status))
            .collect()
    }

    /// Store the response to the triggering request.
    pub fn set_trigger_response(&self, response: TriggerResponse) {
        *self.trigger_response.write() = Some(response);
    }

    /// Response to the triggering request, once triggered.
    pub fn trigger_response(&self) -> Option<TriggerResponse> {
        self.trigger_response.read().clone()
    }

    /// Assemble the run result around the triggering response.
    pub fn result(&self, response: TriggerResponse) -> RunResult {
        RunResult {
            status: self.overall_status(),
            response,
            actions: self.actions(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn unknown_action_is_not_started() {
        let monitor = RunMonitor::new();
        assert_eq!(
            monitor.action_status("never-executed-name"),
            ActionStatus::NotStarted
        );
        assert!(monitor.action("never-executed-name").is_none());
    }

    #[test]
    fn action_lifecycle_records_timestamps() {
        let monitor = RunMonitor::new();
        monitor.set_action_status("GET", ActionStatus::Running).unwrap();
        monitor.set_action_status("GET", ActionStatus::Succeeded).unwrap();

        let record = monitor.action("GET").unwrap();
        assert_eq!(record.status, ActionStatus::Succeeded);
        assert!(record.started_at.is_some());
        assert!(record.finished_at.is_some());
    }

    #[test]
    fn terminal_action_status_is_final() {
        let monitor = RunMonitor::new();
        monitor.fail_action("POST", "HTTP 500").unwrap();
        let err = monitor
            .set_action_status("POST", ActionStatus::Succeeded)
            .unwrap_err();
        assert_eq!(err.code(), "E303");
        assert_eq!(monitor.action_status("POST"), ActionStatus::Failed);
        assert_eq!(monitor.action("POST").unwrap().error.as_deref(), Some("HTTP 500"));
    }

    #[test]
    fn running_action_cannot_be_skipped() {
        let monitor = RunMonitor::new();
        monitor.set_action_status("A", ActionStatus::Running).unwrap();
        assert!(monitor.set_action_status("A", ActionStatus::Skipped).is_err());
    }

    #[test]
    fn run_status_is_monotonic() {
        let monitor = RunMonitor::new();
        assert_eq!(monitor.overall_status(), RunStatus::NotTriggered);
        monitor.set_run_status(RunStatus::Running).unwrap();
        monitor.set_run_status(RunStatus::Succeeded).unwrap();
        assert!(monitor.set_run_status(RunStatus::Failed).is_err());
        assert!(monitor.set_run_status(RunStatus::Running).is_err());
        assert_eq!(monitor.overall_status(), RunStatus::Succeeded);
    }

    #[tokio::test]
    async fn wait_for_completion_observes_terminal_status() {
        let monitor = Arc::new(RunMonitor::new());
        monitor.set_run_status(RunStatus::Running).unwrap();

        let reporter = Arc::clone(&monitor);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            reporter.set_run_status(RunStatus::Failed).unwrap();
        });

        let status = tokio::time::timeout(Duration::from_secs(2), monitor.wait_for_completion())
            .await
            .unwrap();
        assert_eq!(status, RunStatus::Failed);
    }

    #[test]
    fn result_collects_actions() {
        let monitor = RunMonitor::new();
        monitor.set_action_status("GET", ActionStatus::Succeeded).unwrap();
        let result = monitor.result(TriggerResponse::new(StatusCode::ACCEPTED, ""));
        assert_eq!(result.action_status("GET"), ActionStatus::Succeeded);
        assert_eq!(result.action_status("POST"), ActionStatus::NotStarted);
        assert_eq!(result.response.status, StatusCode::ACCEPTED);
    }
}
