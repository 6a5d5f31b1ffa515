//! Ties the lifetime of client connections to the backend work dispatched
//! on their behalf: when a connection closes, its in-flight operations are
//! cancelled on a best-effort basis.

pub mod cancel;
pub mod config;
pub mod connection;
pub mod error;
pub mod node;
pub mod simulation;
pub mod transport;

pub use cancel::{
    CancellableClient, CancellingDispatcher, ChannelEntry, ConnectionRegistry, TaskHolder,
};
pub use connection::LocalConnection;
pub use error::{OperationError, TetherError, TetherResult};
pub use transport::{
    CancelRequest, CancellationIssuer, CloseListener, Connection, ConnectionId, Executor,
    ResponseCallback, TaskId,
};
