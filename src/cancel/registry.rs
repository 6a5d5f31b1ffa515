//! Process-wide mapping from connection to its [`ChannelEntry`].
//!
//! One registry serves the whole process, but it is an ordinary value: the
//! dispatch layer constructs it and hands clones to whoever needs it.
//!
//! # Listener Attachment
//!
//! The entry is inserted into the map first and the close listener attached
//! afterwards, outside of any map guard. A connection that is already closed
//! fires the listener inline, which removes the entry again; doing that while
//! holding the shard lock would deadlock. The entry's one-shot claim flag
//! guarantees a single attachment per entry even when several dispatches for
//! the same connection race here.

use std::sync::Arc;

use dashmap::DashMap;

use super::channel_entry::ChannelEntry;
use crate::transport::{CancellationIssuer, Connection, ConnectionId};

/// Tracks the connections that have operations in flight.
#[derive(Clone)]
pub struct ConnectionRegistry {
    entries: Arc<DashMap<ConnectionId, Arc<ChannelEntry>>>,
    issuer: Arc<dyn CancellationIssuer>,
}

impl ConnectionRegistry {
    /// Creates an empty registry whose entries cancel through `issuer`.
    pub fn new(issuer: Arc<dyn CancellationIssuer>) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            issuer,
        }
    }

    /// Returns the entry for `connection`, creating it and attaching it as
    /// the connection's close listener on first use.
    ///
    /// If the connection is already closed the listener fires before this
    /// returns, so the returned entry may already be closed and unmapped.
    pub fn entry_for(&self, connection: &dyn Connection) -> Arc<ChannelEntry> {
        let id = connection.id();
        let entry = Arc::clone(
            self.entries
                .entry(id)
                .or_insert_with(|| Arc::new(ChannelEntry::new(id, Arc::clone(&self.issuer))))
                .value(),
        );

        if entry.claim_listener() {
            log::trace!(
                target: "tether::registry",
                "Attaching close listener to {}",
                id
            );
            let registry = self.clone();
            let listener_entry = Arc::clone(&entry);
            connection.add_close_listener(Box::new(move |outcome: std::io::Result<()>| {
                if let Err(e) = outcome {
                    log::debug!(
                        target: "tether::registry",
                        "Connection {} closed with error: {}",
                        id,
                        e
                    );
                }
                listener_entry.on_connection_closed(&registry);
            }));
        }

        entry
    }

    /// Removes the mapping for `connection` only if it still points at `entry`.
    ///
    /// Returns true if the mapping was removed.
    pub fn remove(&self, connection: ConnectionId, entry: &Arc<ChannelEntry>) -> bool {
        self.entries
            .remove_if(&connection, |_, current| Arc::ptr_eq(current, entry))
            .is_some()
    }

    /// Number of tracked connections.
    pub fn num_connections(&self) -> usize {
        self.entries.len()
    }

    /// Number of live operations across all connections.
    pub fn num_tasks(&self) -> usize {
        self.entries.iter().map(|entry| entry.num_tasks()).sum()
    }

    /// Number of live operations of `connection`; zero if it is not tracked.
    pub fn num_tasks_for(&self, connection: ConnectionId) -> usize {
        self.entries
            .get(&connection)
            .map(|entry| entry.num_tasks())
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("num_connections", &self.num_connections())
            .finish()
    }
}
