//! Error handling types for tether
//!
//! Cancellation issuance never produces an error here: it is best-effort and
//! its outcome is not observed. The types below cover collaborator contract
//! violations, configuration, and normal operation failure.

use std::sync::PoisonError;
use thiserror::Error;

use crate::transport::ConnectionId;

/// Error type for tether operations
#[derive(Debug, Error)]
pub enum TetherError {
    /// A connection was closed twice
    #[error("Connection {connection} is already closed")]
    ConnectionAlreadyClosed { connection: ConnectionId },

    /// Configuration error
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for tether operations
pub type TetherResult<T> = Result<T, TetherError>;

/// Failure of a dispatched operation, delivered unchanged to its callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    /// The backend honoured a cancellation request
    #[error("Task {task} was cancelled: {reason}")]
    Cancelled { task: String, reason: String },

    /// The operation itself failed
    #[error("Operation failed: {0}")]
    Failed(String),
}

/// Helper trait to recover the guard from a poisoned lock
pub trait LockResultExt<T> {
    /// Recover the guard from a PoisonError, logging the recovery.
    ///
    /// The context parameter identifies which operation triggered lock recovery,
    /// helping developers debug thread safety issues.
    fn recover_poison(self, context: &str) -> T;
}

impl<T> LockResultExt<T> for Result<T, PoisonError<T>> {
    fn recover_poison(self, context: &str) -> T {
        match self {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!(
                    target: "tether::lock_recovery",
                    "Recovered from poisoned lock in {}",
                    context
                );
                poisoned.into_inner()
            }
        }
    }
}

/// Helper functions for common error patterns
impl TetherError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        TetherError::Config {
            message: message.into(),
        }
    }
}
