//! Connection whose close listener runs on the tokio runtime.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tether::{CloseListener, Connection, ConnectionId, TetherError, TetherResult};
use tokio::runtime::Handle;
use tokio::sync::oneshot;

pub struct TestConnection {
    id: ConnectionId,
    handle: Handle,
    open: AtomicBool,
    listener: Mutex<Option<CloseListener>>,
    closed_tx: Mutex<Option<oneshot::Sender<()>>>,
    closed_rx: Mutex<Option<oneshot::Receiver<()>>>,
}

impl TestConnection {
    pub fn new(handle: Handle) -> Self {
        let (tx, rx) = oneshot::channel();
        Self {
            id: ConnectionId::next(),
            handle,
            open: AtomicBool::new(true),
            listener: Mutex::new(None),
            closed_tx: Mutex::new(Some(tx)),
            closed_rx: Mutex::new(Some(rx)),
        }
    }

    /// Closes the connection and waits for its close listener to finish.
    pub async fn await_close(&self) {
        self.close().unwrap();
        let rx = self.closed_rx.lock().unwrap().take();
        if let Some(rx) = rx {
            let _ = rx.await;
        }
    }
}

impl Connection for TestConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn close(&self) -> TetherResult<()> {
        if self
            .open
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(TetherError::ConnectionAlreadyClosed {
                connection: self.id,
            });
        }
        let listener = self.listener.lock().unwrap().take();
        let closed_tx = self.closed_tx.lock().unwrap().take();
        let failure = self.id.as_u64() % 2 == 0;
        self.handle.spawn(async move {
            if let Some(listener) = listener {
                if failure {
                    listener(Err(std::io::Error::other("connection reset")));
                } else {
                    listener(Ok(()));
                }
            }
            if let Some(tx) = closed_tx {
                let _ = tx.send(());
            }
        });
        Ok(())
    }

    fn add_close_listener(&self, listener: CloseListener) {
        // If the connection is already closed, the listener runs immediately on this thread.
        let mut slot = self.listener.lock().unwrap();
        if !self.is_open() {
            drop(slot);
            listener(Ok(()));
            return;
        }
        assert!(
            slot.is_none(),
            "close listener already set, only one is allowed!"
        );
        *slot = Some(listener);
    }
}
