//! Per-connection set of live task holders.
//!
//! The entry only decides whether it is still safe to track a holder. The
//! cancel-versus-complete race of each individual operation is resolved by
//! the holder itself, so a holder tracked just before close is still swept.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::registry::ConnectionRegistry;
use super::task_holder::TaskHolder;
use crate::error::LockResultExt;
use crate::transport::{CancellationIssuer, ConnectionId};

struct EntryState {
    /// Set once by the close notification; no holder is tracked afterwards
    closed: bool,
    /// Live holders keyed by holder ID
    live: HashMap<u64, Arc<TaskHolder>>,
}

/// Operations in flight on behalf of one connection.
pub struct ChannelEntry {
    connection: ConnectionId,
    issuer: Arc<dyn CancellationIssuer>,
    state: Mutex<EntryState>,
    /// Whether the close listener was attached to the connection
    listener_attached: AtomicBool,
}

impl ChannelEntry {
    pub fn new(connection: ConnectionId, issuer: Arc<dyn CancellationIssuer>) -> Self {
        Self {
            connection,
            issuer,
            state: Mutex::new(EntryState {
                closed: false,
                live: HashMap::new(),
            }),
            listener_attached: AtomicBool::new(false),
        }
    }

    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Creates a holder that cancels through this entry's issuer.
    pub fn new_holder(&self) -> Arc<TaskHolder> {
        Arc::new(TaskHolder::new(self.connection, Arc::clone(&self.issuer)))
    }

    /// Adds `holder` to the live set.
    ///
    /// A holder presented after close is cancelled instead of tracked. A
    /// holder that already completed is neither tracked nor cancelled.
    pub fn track(&self, holder: &Arc<TaskHolder>) {
        {
            let mut state = self.state.lock().recover_poison("ChannelEntry::track");
            if !state.closed {
                // Completion marks the holder under this same lock, so a
                // holder seen here as incomplete is guaranteed to be untracked later.
                if !holder.is_completed() {
                    state.live.insert(holder.id(), Arc::clone(holder));
                }
                return;
            }
        }

        log::debug!(
            target: "tether::cancel",
            "Connection {} already closed, cancelling holder {} on registration",
            self.connection,
            holder.id()
        );
        holder.cancel_if_present();
    }

    /// Removes `holder` from the live set and marks it completed. Idempotent.
    pub fn untrack(&self, holder: &TaskHolder) {
        let mut state = self.state.lock().recover_poison("ChannelEntry::untrack");
        holder.mark_completed();
        state.live.remove(&holder.id());
    }

    /// Handles the close notification of the connection.
    ///
    /// Marks the entry closed, drops it from `registry`, then requests
    /// cancellation for every holder that was still live.
    pub fn on_connection_closed(self: &Arc<Self>, registry: &ConnectionRegistry) {
        let drained = {
            let mut state = self
                .state
                .lock()
                .recover_poison("ChannelEntry::on_connection_closed");
            if state.closed {
                log::warn!(
                    target: "tether::registry",
                    "Close notification for {} delivered more than once",
                    self.connection
                );
                return;
            }
            state.closed = true;
            std::mem::take(&mut state.live)
        };

        if !registry.remove(self.connection, self) {
            log::debug!(
                target: "tether::registry",
                "Connection {} was no longer mapped to this entry",
                self.connection
            );
        }

        log::debug!(
            target: "tether::cancel",
            "Connection {} closed with {} live tasks",
            self.connection,
            drained.len()
        );
        for holder in drained.into_values() {
            holder.cancel_if_present();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().recover_poison("ChannelEntry::is_closed").closed
    }

    /// Number of live holders.
    pub fn num_tasks(&self) -> usize {
        self.state
            .lock()
            .recover_poison("ChannelEntry::num_tasks")
            .live
            .len()
    }

    /// Claims the right to attach the close listener. Returns true exactly once.
    pub(crate) fn claim_listener(&self) -> bool {
        self.listener_attached
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl std::fmt::Debug for ChannelEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelEntry")
            .field("connection", &self.connection)
            .field("closed", &self.is_closed())
            .field("num_tasks", &self.num_tasks())
            .finish()
    }
}
