//! A tokio-backed local node that runs operations and serves cancellation.
//!
//! Every operation is a spawned tokio task guarded by a
//! [`CancellationToken`]. The node keeps the tokens of running tasks so a
//! [`CancelRequest`] can find them; requests for tasks that already finished
//! are dropped quietly.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::error::OperationError;
use crate::transport::{
    CancelRequest, CancellationIssuer, Executor, ResponseCallback, TaskId, actions,
};

/// Work to perform: simulated by holding the task open for `duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkRequest {
    pub duration: Duration,
}

/// Result of a finished operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkResponse {
    pub task_id: TaskId,
    pub elapsed: Duration,
}

struct RunningTask {
    token: CancellationToken,
    reason: Arc<OnceLock<String>>,
}

/// Executes [`WorkRequest`]s on a tokio runtime.
pub struct LocalNode {
    node_id: Arc<str>,
    handle: Handle,
    next_task: AtomicU64,
    running: Arc<DashMap<TaskId, RunningTask>>,
    cancellations_requested: AtomicUsize,
    cancellations_applied: AtomicUsize,
}

impl LocalNode {
    /// Creates a node that spawns its operations on `handle`.
    pub fn new(node_id: impl Into<Arc<str>>, handle: Handle) -> Self {
        Self {
            node_id: node_id.into(),
            handle,
            next_task: AtomicU64::new(0),
            running: Arc::new(DashMap::new()),
            cancellations_requested: AtomicUsize::new(0),
            cancellations_applied: AtomicUsize::new(0),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Number of operations currently running.
    pub fn running_tasks(&self) -> usize {
        self.running.len()
    }

    /// Number of cancellation requests received, whether or not they found a task.
    pub fn cancellations_requested(&self) -> usize {
        self.cancellations_requested.load(Ordering::SeqCst)
    }

    /// Number of cancellation requests that interrupted a running task.
    pub fn cancellations_applied(&self) -> usize {
        self.cancellations_applied.load(Ordering::SeqCst)
    }

    fn next_task_id(&self) -> TaskId {
        TaskId::new(
            Arc::clone(&self.node_id),
            self.next_task.fetch_add(1, Ordering::Relaxed),
        )
    }
}

impl Executor for LocalNode {
    type Request = WorkRequest;
    type Response = WorkResponse;
    type Error = OperationError;

    /// Zero-duration work completes inline, before the task ID is returned.
    fn run_locally(
        &self,
        action: &str,
        request: WorkRequest,
        callback: ResponseCallback<WorkResponse, OperationError>,
    ) -> TaskId {
        let task_id = self.next_task_id();
        log::trace!(
            target: "tether::node",
            "Starting {} as task {}",
            action,
            task_id
        );

        if request.duration.is_zero() {
            callback(Ok(WorkResponse {
                task_id: task_id.clone(),
                elapsed: Duration::ZERO,
            }));
            return task_id;
        }

        let token = CancellationToken::new();
        let reason = Arc::new(OnceLock::new());
        self.running.insert(
            task_id.clone(),
            RunningTask {
                token: token.clone(),
                reason: Arc::clone(&reason),
            },
        );

        let running = Arc::clone(&self.running);
        let spawned_id = task_id.clone();
        self.handle.spawn(async move {
            let started = Instant::now();
            let result = tokio::select! {
                _ = token.cancelled() => Err(OperationError::Cancelled {
                    task: spawned_id.to_string(),
                    reason: reason.get().cloned().unwrap_or_default(),
                }),
                _ = tokio::time::sleep(request.duration) => Ok(WorkResponse {
                    task_id: spawned_id.clone(),
                    elapsed: started.elapsed(),
                }),
            };
            running.remove(&spawned_id);
            callback(result);
        });

        task_id
    }
}

impl CancellationIssuer for LocalNode {
    fn request_cancellation(&self, request: CancelRequest) {
        self.cancellations_requested.fetch_add(1, Ordering::SeqCst);
        match self.running.remove(&request.task_id) {
            Some((_, task)) => {
                let _ = task.reason.set(request.reason.clone());
                task.token.cancel();
                self.cancellations_applied.fetch_add(1, Ordering::SeqCst);
                log::debug!(
                    target: "tether::node",
                    "[{}] {}: cancelled task {} ({})",
                    self.node_id(),
                    actions::CANCEL_TASKS,
                    request.task_id,
                    request.reason
                );
            }
            None => {
                // Best-effort: the task already finished or never existed.
                log::debug!(
                    target: "tether::node",
                    "[{}] {}: task {} is not running, ignoring",
                    self.node_id(),
                    actions::CANCEL_TASKS,
                    request.task_id
                );
            }
        }
    }
}
