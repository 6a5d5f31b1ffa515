//! Collaborator boundary: connections, executors, and cancellation issuers.
//!
//! The cancellation core only ever talks to the outside world through the
//! three traits in this module. Their contracts are what make the race
//! resolution in [`crate::cancel`] sound, so they are spelled out here.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::TetherResult;

/// Well-known operation names.
pub mod actions {
    /// Search across one or more indices.
    pub const SEARCH: &str = "indices:data/read/search";
    /// Cancel a running task.
    pub const CANCEL_TASKS: &str = "cluster:admin/tasks/cancel";
}

/// Monotonically increasing connection ID
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocates a fresh connection ID.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::SeqCst))
    }

    /// Wraps a raw value, for collaborators that allocate their own IDs.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Identifier of a dispatched operation: the node that runs it plus the
/// node-local task number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskId {
    node_id: Arc<str>,
    id: u64,
}

impl TaskId {
    pub fn new(node_id: impl Into<Arc<str>>, id: u64) -> Self {
        Self {
            node_id: node_id.into(),
            id,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node_id, self.id)
    }
}

/// A request to cancel a single task.
///
/// Issued without waiting for completion of the cancelled task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelRequest {
    pub task_id: TaskId,
    pub reason: String,
    pub wait_for_completion: bool,
}

impl CancelRequest {
    /// Cancellation caused by the closing of `connection`.
    pub fn channel_closed(task_id: TaskId, connection: ConnectionId) -> Self {
        Self {
            task_id,
            reason: format!("channel [{}] closed", connection),
            wait_for_completion: false,
        }
    }
}

/// Callback fired once when a connection closes. The close outcome is
/// informational; a failed close still counts as closed.
pub type CloseListener = Box<dyn FnOnce(io::Result<()>) + Send + 'static>;

/// A client connection with an open/closed lifecycle.
///
/// # Contract
///
/// - If the connection is already closed when `add_close_listener` is called,
///   the listener runs immediately, inline, on the calling thread.
/// - Otherwise the listener runs exactly once when the connection closes.
/// - At most one listener may be attached while the connection is open.
///   Implementations treat a second attachment as a fatal contract violation.
pub trait Connection: Send + Sync {
    fn id(&self) -> ConnectionId;

    fn is_open(&self) -> bool;

    /// Closes the connection. Closing twice is a contract violation and
    /// yields [`crate::error::TetherError::ConnectionAlreadyClosed`].
    fn close(&self) -> TetherResult<()>;

    fn add_close_listener(&self, listener: CloseListener);
}

/// Completion callback of a dispatched operation.
pub type ResponseCallback<R, E> = Box<dyn FnOnce(Result<R, E>) + Send + 'static>;

/// Runs operations on the local node.
///
/// `run_locally` may invoke `callback` before returning (same thread) or
/// later from any thread, and always returns the ID of the started task,
/// even when that task already completed.
pub trait Executor: Send + Sync {
    type Request: Send;
    type Response: Send + 'static;
    type Error: Send + 'static;

    fn run_locally(
        &self,
        action: &str,
        request: Self::Request,
        callback: ResponseCallback<Self::Response, Self::Error>,
    ) -> TaskId;
}

/// Issues best-effort cancellation requests.
///
/// Fire-and-forget: implementations must not block on the outcome and must
/// swallow their own failures.
pub trait CancellationIssuer: Send + Sync {
    fn request_cancellation(&self, request: CancelRequest);
}

impl<F> CancellationIssuer for F
where
    F: Fn(CancelRequest) + Send + Sync,
{
    fn request_cancellation(&self, request: CancelRequest) {
        self(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn task_id_displays_node_and_number() {
        let id = TaskId::new("node-1", 42);
        assert_eq!(id.to_string(), "node-1:42");
        assert_eq!(id.node_id(), "node-1");
        assert_eq!(id.id(), 42);
    }

    #[test]
    fn connection_ids_are_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
    }

    #[test]
    fn channel_closed_request_does_not_wait() {
        let request = CancelRequest::channel_closed(TaskId::new("n", 1), ConnectionId::from_raw(3));
        assert_eq!(request.reason, "channel [conn-3] closed");
        assert!(!request.wait_for_completion);
    }

    #[test]
    fn closures_are_cancellation_issuers() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let issuer = move |request: CancelRequest| sink.lock().unwrap().push(request.task_id);

        issuer.request_cancellation(CancelRequest::channel_closed(
            TaskId::new("n", 9),
            ConnectionId::from_raw(1),
        ));

        assert_eq!(*seen.lock().unwrap(), vec![TaskId::new("n", 9)]);
    }
}
