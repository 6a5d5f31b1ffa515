//! Per-operation race resolution between "task ID known", "cancel requested",
//! and "operation completed".
//!
//! # State Machine
//!
//! ```text
//! Unresolved --assign--> IdKnown --cancel--> Resolved   (cancel issued)
//! Unresolved --cancel--> CancelPending --assign--> Resolved   (cancel issued)
//! any state --complete--> Completed   (absorbing, suppresses cancellation)
//! ```
//!
//! The cancellation side effect runs only on the two transitions into
//! `Resolved`, so it fires at most once per holder. It is always issued after
//! the holder lock has been released.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::LockResultExt;
use crate::transport::{CancelRequest, CancellationIssuer, ConnectionId, TaskId};

/// Monotonically increasing holder ID, used for set membership
static NEXT_HOLDER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, PartialEq, Eq)]
enum HolderState {
    /// Neither the task ID nor a cancel request has arrived
    Unresolved,
    /// Task ID known, no cancel requested yet
    IdKnown(TaskId),
    /// Cancel requested before the task ID was known
    CancelPending,
    /// Cancellation was issued
    Resolved,
    /// The operation delivered its result
    Completed,
}

/// Tracks a single dispatched operation on behalf of its connection.
pub struct TaskHolder {
    id: u64,
    connection: ConnectionId,
    issuer: Arc<dyn CancellationIssuer>,
    state: Mutex<HolderState>,
}

impl TaskHolder {
    /// Creates a holder for an operation dispatched on behalf of `connection`.
    pub fn new(connection: ConnectionId, issuer: Arc<dyn CancellationIssuer>) -> Self {
        Self {
            id: NEXT_HOLDER_ID.fetch_add(1, Ordering::Relaxed),
            connection,
            issuer,
            state: Mutex::new(HolderState::Unresolved),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Records the task ID returned by the executor.
    ///
    /// Issues the cancellation right away if the connection closed first.
    /// Does nothing if the operation already completed.
    pub fn assign_identifier(&self, task_id: TaskId) {
        let to_cancel = {
            let mut state = self
                .state
                .lock()
                .recover_poison("TaskHolder::assign_identifier");
            match std::mem::replace(&mut *state, HolderState::Resolved) {
                HolderState::Unresolved => {
                    *state = HolderState::IdKnown(task_id);
                    None
                }
                HolderState::CancelPending => Some(task_id),
                HolderState::Completed => {
                    *state = HolderState::Completed;
                    None
                }
                HolderState::IdKnown(existing) => {
                    log::warn!(
                        target: "tether::cancel",
                        "Task holder {} already has task {}, ignoring {}",
                        self.id,
                        existing,
                        task_id
                    );
                    *state = HolderState::IdKnown(existing);
                    None
                }
                HolderState::Resolved => {
                    log::warn!(
                        target: "tether::cancel",
                        "Task holder {} already resolved, ignoring {}",
                        self.id,
                        task_id
                    );
                    None
                }
            }
        };

        if let Some(task_id) = to_cancel {
            self.issue(task_id);
        }
    }

    /// Requests cancellation because the owning connection closed.
    ///
    /// Cancels immediately when the task ID is known, otherwise defers the
    /// cancellation to [`TaskHolder::assign_identifier`].
    pub fn cancel_if_present(&self) {
        let to_cancel = {
            let mut state = self
                .state
                .lock()
                .recover_poison("TaskHolder::cancel_if_present");
            match std::mem::replace(&mut *state, HolderState::Resolved) {
                HolderState::IdKnown(task_id) => Some(task_id),
                HolderState::Unresolved => {
                    *state = HolderState::CancelPending;
                    None
                }
                other => {
                    *state = other;
                    None
                }
            }
        };

        if let Some(task_id) = to_cancel {
            self.issue(task_id);
        }
    }

    /// Marks the operation as completed. Idempotent.
    pub fn mark_completed(&self) {
        *self
            .state
            .lock()
            .recover_poison("TaskHolder::mark_completed") = HolderState::Completed;
    }

    pub fn is_completed(&self) -> bool {
        matches!(
            *self.state.lock().recover_poison("TaskHolder::is_completed"),
            HolderState::Completed
        )
    }

    fn issue(&self, task_id: TaskId) {
        log::debug!(
            target: "tether::cancel",
            "Cancelling task {} of closed connection {}",
            task_id,
            self.connection
        );
        self.issuer
            .request_cancellation(CancelRequest::channel_closed(task_id, self.connection));
    }
}

impl std::fmt::Debug for TaskHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHolder")
            .field("id", &self.id)
            .field("connection", &self.connection)
            .field("state", &*self.state.lock().recover_poison("TaskHolder::fmt"))
            .finish()
    }
}
