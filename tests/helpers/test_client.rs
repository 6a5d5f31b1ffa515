//! Executor and cancellation issuer standing in for a node client.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tether::{CancelRequest, CancellationIssuer, Executor, ResponseCallback, TaskId};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

/// How searches complete.
#[derive(Clone)]
pub enum Completion {
    /// Mostly on another thread, every tenth search inline before the task ID
    /// is returned.
    Mixed,
    /// Never; the search only ends through cancellation in the real system.
    Never,
    /// On another thread once the gate is opened.
    Gated(CancellationToken),
}

pub struct TestClient {
    handle: Handle,
    completion: Completion,
    counter: AtomicU64,
    search_requests: AtomicUsize,
    cancelled_tasks: Mutex<HashSet<TaskId>>,
    parked: Mutex<Vec<ResponseCallback<(), String>>>,
}

impl TestClient {
    pub fn new(handle: Handle, completion: Completion) -> Arc<Self> {
        Arc::new(Self {
            handle,
            completion,
            counter: AtomicU64::new(0),
            search_requests: AtomicUsize::new(0),
            cancelled_tasks: Mutex::new(HashSet::new()),
            parked: Mutex::new(Vec::new()),
        })
    }

    pub fn search_requests(&self) -> usize {
        self.search_requests.load(Ordering::SeqCst)
    }

    pub fn cancelled_tasks(&self) -> HashSet<TaskId> {
        self.cancelled_tasks.lock().unwrap().clone()
    }
}

impl Executor for TestClient {
    type Request = ();
    type Response = ();
    type Error = String;

    fn run_locally(
        &self,
        _action: &str,
        _request: (),
        callback: ResponseCallback<(), String>,
    ) -> TaskId {
        let id = self.counter.fetch_add(1, Ordering::SeqCst);
        self.search_requests.fetch_add(1, Ordering::SeqCst);
        match &self.completion {
            Completion::Mixed if id % 10 == 0 => callback(Ok(())),
            Completion::Mixed => {
                self.handle.spawn(async move { callback(Ok(())) });
            }
            Completion::Never => self.parked.lock().unwrap().push(callback),
            Completion::Gated(gate) => {
                let gate = gate.clone();
                self.handle.spawn(async move {
                    gate.cancelled().await;
                    callback(Ok(()));
                });
            }
        }
        TaskId::new("node", id)
    }
}

impl CancellationIssuer for TestClient {
    fn request_cancellation(&self, request: CancelRequest) {
        assert!(
            self.cancelled_tasks
                .lock()
                .unwrap()
                .insert(request.task_id.clone()),
            "tried to cancel the same task more than once: {}",
            request.task_id
        );
    }
}
