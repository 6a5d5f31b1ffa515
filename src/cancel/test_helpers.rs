//! Shared test utilities for cancel module tests.
//!
//! Import from submodule tests via `use crate::cancel::test_helpers::*;`

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{TetherError, TetherResult};
use crate::transport::{
    CancelRequest, CancellationIssuer, CloseListener, Connection, ConnectionId, Executor,
    ResponseCallback, TaskId,
};

/// Issuer that records every cancellation request it receives.
#[derive(Debug, Default)]
pub(crate) struct RecordingIssuer {
    requests: Mutex<Vec<CancelRequest>>,
}

impl RecordingIssuer {
    pub(crate) fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub(crate) fn requests(&self) -> Vec<CancelRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn task_ids(&self) -> Vec<TaskId> {
        self.requests()
            .into_iter()
            .map(|request| request.task_id)
            .collect()
    }
}

impl CancellationIssuer for RecordingIssuer {
    fn request_cancellation(&self, request: CancelRequest) {
        self.requests.lock().unwrap().push(request);
    }
}

/// Connection whose close listener is held until `close()` is called.
pub(crate) struct ManualConnection {
    id: ConnectionId,
    state: Mutex<ManualState>,
}

struct ManualState {
    open: bool,
    listener: Option<CloseListener>,
    attach_count: usize,
}

impl ManualConnection {
    pub(crate) fn new() -> Self {
        Self::with_state(true)
    }

    pub(crate) fn closed() -> Self {
        Self::with_state(false)
    }

    fn with_state(open: bool) -> Self {
        Self {
            id: ConnectionId::next(),
            state: Mutex::new(ManualState {
                open,
                listener: None,
                attach_count: 0,
            }),
        }
    }

    /// Number of listeners attached over the connection's lifetime.
    pub(crate) fn attach_count(&self) -> usize {
        self.state.lock().unwrap().attach_count
    }
}

impl Connection for ManualConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn is_open(&self) -> bool {
        self.state.lock().unwrap().open
    }

    fn close(&self) -> TetherResult<()> {
        let listener = {
            let mut state = self.state.lock().unwrap();
            if !state.open {
                return Err(TetherError::ConnectionAlreadyClosed {
                    connection: self.id,
                });
            }
            state.open = false;
            state.listener.take()
        };
        if let Some(listener) = listener {
            listener(Ok(()));
        }
        Ok(())
    }

    fn add_close_listener(&self, listener: CloseListener) {
        let mut state = self.state.lock().unwrap();
        state.attach_count += 1;
        if !state.open {
            drop(state);
            listener(Ok(()));
            return;
        }
        assert!(
            state.listener.is_none(),
            "close listener already set, only one is allowed"
        );
        state.listener = Some(listener);
    }
}

/// Executor that parks callbacks until the test completes them by task number.
#[derive(Default)]
pub(crate) struct ParkingExecutor {
    next_id: Mutex<u64>,
    parked: Mutex<HashMap<u64, ResponseCallback<u64, String>>>,
}

impl ParkingExecutor {
    /// Delivers `Ok(task number)` to the parked callback. Returns false if
    /// nothing was parked under that number.
    pub(crate) fn complete(&self, id: u64) -> bool {
        let callback = self.parked.lock().unwrap().remove(&id);
        match callback {
            Some(callback) => {
                callback(Ok(id));
                true
            }
            None => false,
        }
    }
}

impl Executor for ParkingExecutor {
    type Request = bool;
    type Response = u64;
    type Error = String;

    /// `request == true` completes inline before returning the task ID.
    fn run_locally(
        &self,
        _action: &str,
        request: bool,
        callback: ResponseCallback<u64, String>,
    ) -> TaskId {
        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            *next
        };
        if request {
            callback(Ok(id));
        } else {
            self.parked.lock().unwrap().insert(id, callback);
        }
        TaskId::new("test-node", id)
    }
}
