//! The system-under-test client interface.
//!
//! A client adapter talks to the real system: open a connection, set up
//! state, apply operations, tear down, close. The engine holds a shared
//! reference and drives one open/setup/.../teardown/close cycle per logical
//! process, so `setup`/`teardown` must be idempotent or externally
//! serialized if true once-per-run semantics are required.

use async_trait::async_trait;

use crate::error::SquallResult;
use crate::op::Op;

/// Capability set of a system-under-test adapter.
///
/// Every hook except [`Client::invoke`] has a default no-op success
/// implementation, so an adapter only implements what its system needs.
/// Connection state (the original "handle") lives inside the adapter.
#[async_trait]
pub trait Client: Send + Sync {
    /// Open a connection to the system under test.
    async fn open(&self) -> SquallResult<()> {
        Ok(())
    }

    /// Prepare system state before the workload.
    async fn setup(&self) -> SquallResult<()> {
        Ok(())
    }

    /// Apply one invocation and return its completion. The returned
    /// operation's `type` must be one of `ok`, `fail` or `info`; the engine
    /// re-stamps `f` and `process` from the invocation regardless. An `Err`
    /// aborts the calling process's loop, leaving the invocation dangling in
    /// the history.
    async fn invoke(&self, op: Op) -> SquallResult<Op>;

    /// Undo whatever `setup` did.
    async fn teardown(&self) -> SquallResult<()> {
        Ok(())
    }

    /// Release the connection.
    async fn close(&self) -> SquallResult<()> {
        Ok(())
    }
}
