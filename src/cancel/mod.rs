//! Connection-scoped cancellation of dispatched operations.
//!
//! When a client connection closes, every operation still running on its
//! behalf receives one best-effort cancellation request.
//!
//! - [`TaskHolder`]: resolves the per-operation race between task ID,
//!   completion, and close
//! - [`ChannelEntry`]: the live holders of one connection
//! - [`ConnectionRegistry`]: connection to entry mapping, one listener per connection
//! - [`CancellingDispatcher`]: wires the three together around an [`Executor`]
//!
//! No lock is held while calling into the executor, the caller's callback,
//! or the cancellation issuer.
//!
//! [`Executor`]: crate::transport::Executor

mod channel_entry;
mod dispatcher;
mod registry;
mod task_holder;
#[cfg(test)]
pub(crate) mod test_helpers;

pub use channel_entry::ChannelEntry;
pub use dispatcher::{CancellableClient, CancellingDispatcher};
pub use registry::ConnectionRegistry;
pub use task_holder::TaskHolder;
