//! Shared test helpers for cancellation integration tests.
//!
//! Note: We use `helpers/mod.rs` instead of the `helpers.rs` + `helpers/` pattern
//! because Cargo auto-discovers top-level `.rs` files in `tests/` as integration tests.

pub mod test_client;
pub mod test_connection;
