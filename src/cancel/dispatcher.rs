//! Entry point that ties dispatched operations to their connection.
//!
//! `dispatch` never blocks and never returns a result of its own: the
//! outcome reaches the caller only through the callback, and cancellation
//! outcomes never reach it at all.

use std::sync::Arc;

use super::registry::ConnectionRegistry;
use crate::transport::{Connection, Executor, ResponseCallback};

/// Dispatches operations through an [`Executor`] and cancels them when the
/// connection they were dispatched for closes.
pub struct CancellingDispatcher<E> {
    executor: Arc<E>,
    registry: ConnectionRegistry,
}

impl<E> Clone for CancellingDispatcher<E> {
    fn clone(&self) -> Self {
        Self {
            executor: Arc::clone(&self.executor),
            registry: self.registry.clone(),
        }
    }
}

impl<E: Executor> CancellingDispatcher<E> {
    pub fn new(executor: Arc<E>, registry: ConnectionRegistry) -> Self {
        Self { executor, registry }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn executor(&self) -> &Arc<E> {
        &self.executor
    }

    /// Runs `action` on behalf of `connection`, delivering its outcome to
    /// `callback`.
    ///
    /// The task ID, the completion, and the connection close may arrive in
    /// any order and on any thread. Cancellation is issued at most once, and
    /// only if the connection closed before the operation completed.
    pub fn dispatch<F>(
        &self,
        action: &str,
        request: E::Request,
        connection: &dyn Connection,
        callback: F,
    ) where
        F: FnOnce(Result<E::Response, E::Error>) + Send + 'static,
    {
        let entry = self.registry.entry_for(connection);
        let holder = entry.new_holder();

        let wrapped: ResponseCallback<E::Response, E::Error> = {
            let entry = Arc::clone(&entry);
            let holder = Arc::clone(&holder);
            Box::new(move |result| {
                entry.untrack(&holder);
                holder.mark_completed();
                callback(result);
            })
        };

        let task_id = self.executor.run_locally(action, request, wrapped);
        log::trace!(
            target: "tether::cancel",
            "Dispatched {} as task {} for {}",
            action,
            task_id,
            entry.connection()
        );

        entry.track(&holder);
        holder.assign_identifier(task_id);
    }

    /// Binds this dispatcher to a single connection.
    pub fn for_connection(&self, connection: Arc<dyn Connection>) -> CancellableClient<E> {
        CancellableClient {
            dispatcher: self.clone(),
            connection,
        }
    }
}

/// A dispatcher bound to one connection, handed to request handlers that
/// only know about their own client.
pub struct CancellableClient<E> {
    dispatcher: CancellingDispatcher<E>,
    connection: Arc<dyn Connection>,
}

impl<E: Executor> CancellableClient<E> {
    pub fn execute<F>(&self, action: &str, request: E::Request, callback: F)
    where
        F: FnOnce(Result<E::Response, E::Error>) + Send + 'static,
    {
        self.dispatcher
            .dispatch(action, request, self.connection.as_ref(), callback);
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }
}
