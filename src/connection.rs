//! In-process connection with a single close listener.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{LockResultExt, TetherError, TetherResult};
use crate::transport::{CloseListener, Connection, ConnectionId};

/// A connection that lives entirely in this process.
///
/// The close listener of an open connection runs on the thread that calls
/// [`Connection::close`]. Listeners attached after close run inline.
pub struct LocalConnection {
    id: ConnectionId,
    open: AtomicBool,
    listener: Mutex<Option<CloseListener>>,
}

impl Default for LocalConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalConnection {
    pub fn new() -> Self {
        Self {
            id: ConnectionId::next(),
            open: AtomicBool::new(true),
            listener: Mutex::new(None),
        }
    }
}

impl Connection for LocalConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn close(&self) -> TetherResult<()> {
        if self
            .open
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(TetherError::ConnectionAlreadyClosed {
                connection: self.id,
            });
        }

        let listener = self
            .listener
            .lock()
            .recover_poison("LocalConnection::close")
            .take();
        if let Some(listener) = listener {
            listener(Ok(()));
        }
        Ok(())
    }

    /// # Panics
    ///
    /// Panics if a listener is already attached to this open connection.
    fn add_close_listener(&self, listener: CloseListener) {
        let mut slot = self
            .listener
            .lock()
            .recover_poison("LocalConnection::add_close_listener");
        if !self.is_open() {
            drop(slot);
            listener(Ok(()));
            return;
        }
        assert!(
            slot.is_none(),
            "close listener already set on {}, only one is allowed",
            self.id
        );
        *slot = Some(listener);
    }
}

impl std::fmt::Debug for LocalConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalConnection")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .finish()
    }
}
