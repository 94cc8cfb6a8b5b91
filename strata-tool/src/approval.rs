//! The approval gate — a message-passing channel keyed by
//! `(execution_id, tool_name)`.
//!
//! A gated tool call parks on the broker; an external principal
//! resolves it via [`ApprovalBroker::approve_tool_call`]. A second
//! resolution for the same key is a no-op. Only code running on behalf
//! of an execution enqueues entries for it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tier0::{ApprovalRecord, DurationMs, ExecutionId};
use tokio::sync::{oneshot, Mutex};
use tracing::debug;

/// An external principal's decision on a parked tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalDecision {
    /// Whether the call may proceed.
    pub granted: bool,
    /// Who decided.
    #[serde(default)]
    pub approved_by: Option<String>,
}

/// Which tool calls require approval.
///
/// A tool is gated when it is named directly, or when the built-in
/// tool→action map ties it to a listed action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalPolicy {
    /// Tool names requiring approval.
    #[serde(default)]
    pub tools: Vec<String>,
    /// Action categories requiring approval.
    #[serde(default)]
    pub actions: Vec<String>,
}

/// The built-in tool-name→action map.
fn action_for_tool(tool: &str) -> Option<&'static str> {
    match tool {
        "file_write" => Some("write_file"),
        "email_send" => Some("send_email"),
        "database_query" => Some("modify_data"),
        "shell_exec" => Some("external_api"),
        _ => None,
    }
}

impl ApprovalPolicy {
    /// Whether a call to `tool` must pass the gate.
    pub fn requires_approval(&self, tool: &str) -> bool {
        if self.tools.iter().any(|t| t == tool) {
            return true;
        }
        match action_for_tool(tool) {
            Some(action) => self.actions.iter().any(|a| a == action),
            None => false,
        }
    }
}

type PendingKey = (ExecutionId, String);

/// Parks gated tool calls until an external resolution arrives.
#[derive(Default, Clone)]
pub struct ApprovalBroker {
    pending: Arc<Mutex<HashMap<PendingKey, oneshot::Sender<ApprovalDecision>>>>,
}

impl ApprovalBroker {
    /// Create an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a call and wait for its resolution.
    ///
    /// With a timeout, an unresolved wait resolves to a denied record
    /// with the error `"Approval timeout"` attached by the caller.
    /// Returns the approval record; `granted = Some(false)` on denial
    /// or timeout.
    pub async fn wait_for_approval(
        &self,
        execution_id: &ExecutionId,
        tool_name: &str,
        timeout: Option<DurationMs>,
    ) -> (ApprovalRecord, bool) {
        let (sender, receiver) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert((execution_id.clone(), tool_name.to_string()), sender);
        }
        debug!(execution = %execution_id, tool = tool_name, "tool call awaiting approval");

        let decision = match timeout {
            Some(timeout) => {
                match tokio::time::timeout(timeout.to_std(), receiver).await {
                    Ok(Ok(decision)) => Some(decision),
                    // Timer expired or the sender vanished.
                    _ => None,
                }
            }
            None => receiver.await.ok(),
        };

        // Drop any leftover entry so a late approve_tool_call for this
        // key is a no-op.
        {
            let mut pending = self.pending.lock().await;
            pending.remove(&(execution_id.clone(), tool_name.to_string()));
        }

        match decision {
            Some(decision) => (
                ApprovalRecord {
                    required: true,
                    granted: Some(decision.granted),
                    approved_by: decision.approved_by,
                },
                false,
            ),
            None => (
                ApprovalRecord {
                    required: true,
                    granted: Some(false),
                    approved_by: None,
                },
                true,
            ),
        }
    }

    /// Resolve a parked tool call. A second call for the same
    /// `(execution_id, tool_name)` is a no-op.
    pub async fn approve_tool_call(
        &self,
        execution_id: &ExecutionId,
        tool_name: &str,
        decision: ApprovalDecision,
    ) {
        let sender = {
            let mut pending = self.pending.lock().await;
            pending.remove(&(execution_id.clone(), tool_name.to_string()))
        };
        match sender {
            Some(sender) => {
                // The waiter may have timed out between removal and
                // send; a failed send is equivalent to the no-op case.
                let _ = sender.send(decision);
            }
            None => {
                debug!(execution = %execution_id, tool = tool_name, "approval for unknown call ignored");
            }
        }
    }

    /// Number of calls currently parked (observability).
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// The keys of all parked calls, for approval surfaces that list
    /// what is waiting.
    pub async fn pending_keys(&self) -> Vec<(ExecutionId, String)> {
        self.pending.lock().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_gates_by_tool_name() {
        let policy = ApprovalPolicy {
            tools: vec!["file_write".into()],
            actions: vec![],
        };
        assert!(policy.requires_approval("file_write"));
        assert!(!policy.requires_approval("calc"));
    }

    #[test]
    fn policy_gates_by_action_map() {
        let policy = ApprovalPolicy {
            tools: vec![],
            actions: vec!["send_email".into(), "modify_data".into()],
        };
        assert!(policy.requires_approval("email_send"));
        assert!(policy.requires_approval("database_query"));
        assert!(!policy.requires_approval("file_write"));
        assert!(!policy.requires_approval("unmapped_tool"));
    }

    #[tokio::test]
    async fn approval_granted_resolves_waiter() {
        let broker = ApprovalBroker::new();
        let execution_id = ExecutionId::new("exec_1");

        let waiter = {
            let broker = broker.clone();
            let execution_id = execution_id.clone();
            tokio::spawn(async move {
                broker
                    .wait_for_approval(&execution_id, "file_write", None)
                    .await
            })
        };

        // Let the waiter park first.
        tokio::task::yield_now().await;
        while broker.pending_count().await == 0 {
            tokio::task::yield_now().await;
        }

        broker
            .approve_tool_call(
                &execution_id,
                "file_write",
                ApprovalDecision {
                    granted: true,
                    approved_by: Some("ops@example.com".into()),
                },
            )
            .await;

        let (record, timed_out) = waiter.await.unwrap();
        assert!(!timed_out);
        assert_eq!(record.granted, Some(true));
        assert_eq!(record.approved_by.as_deref(), Some("ops@example.com"));
    }

    #[tokio::test]
    async fn denial_resolves_with_granted_false() {
        let broker = ApprovalBroker::new();
        let execution_id = ExecutionId::new("exec_2");

        let waiter = {
            let broker = broker.clone();
            let execution_id = execution_id.clone();
            tokio::spawn(async move {
                broker
                    .wait_for_approval(&execution_id, "file_write", None)
                    .await
            })
        };
        while broker.pending_count().await == 0 {
            tokio::task::yield_now().await;
        }

        broker
            .approve_tool_call(
                &execution_id,
                "file_write",
                ApprovalDecision {
                    granted: false,
                    approved_by: None,
                },
            )
            .await;

        let (record, timed_out) = waiter.await.unwrap();
        assert!(!timed_out);
        assert_eq!(record.granted, Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn approval_timeout_denies() {
        let broker = ApprovalBroker::new();
        let execution_id = ExecutionId::new("exec_3");
        let (record, timed_out) = broker
            .wait_for_approval(
                &execution_id,
                "file_write",
                Some(DurationMs::from_millis(50)),
            )
            .await;
        assert!(timed_out);
        assert_eq!(record.granted, Some(false));
    }

    #[tokio::test]
    async fn second_resolution_is_noop() {
        let broker = ApprovalBroker::new();
        let execution_id = ExecutionId::new("exec_4");
        // No waiter parked: resolution is silently ignored.
        broker
            .approve_tool_call(
                &execution_id,
                "file_write",
                ApprovalDecision {
                    granted: true,
                    approved_by: None,
                },
            )
            .await;
        assert_eq!(broker.pending_count().await, 0);
    }
}
