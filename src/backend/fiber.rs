//! The preemptive backend: logical processes as tokio green threads.
//!
//! The runtime scheduler manages suspension and resumption, so ordering
//! between processes is not guaranteed and must not be assumed by test
//! logic. `cancel` forcibly terminates a live process; an in-flight
//! operation it was running is abandoned, leaving at most a dangling
//! `invoke` in the history — an expected, not erroneous, shape.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::error;

use super::{Backend, ProcessFuture, ProcessHandle, ProcessState, ThreadKind};
use crate::error::{SquallError, SquallResult};

struct FiberShared {
    id: u64,
    state: Mutex<ProcessState>,
}

impl FiberShared {
    fn state(&self) -> ProcessState {
        *self.state.lock()
    }

    fn set_state(&self, state: ProcessState) {
        *self.state.lock() = state;
    }
}

/// Green-thread backend on the ambient tokio runtime.
#[derive(Debug)]
pub struct FiberBackend {
    runtime: Handle,
}

impl FiberBackend {
    /// Fails with a configuration error when no runtime is available on
    /// this host thread.
    pub fn new() -> SquallResult<Self> {
        let runtime = Handle::try_current().map_err(|_| {
            SquallError::config("fiber backend requires a running tokio runtime")
        })?;
        Ok(Self { runtime })
    }
}

impl Backend for FiberBackend {
    fn kind(&self) -> ThreadKind {
        ThreadKind::Fiber
    }

    fn create(&mut self, id: u64, future: ProcessFuture) -> SquallResult<Box<dyn ProcessHandle>> {
        let shared = Arc::new(FiberShared {
            id,
            state: Mutex::new(ProcessState::Created),
        });
        let task_shared = Arc::clone(&shared);
        let join = self.runtime.spawn(async move {
            task_shared.set_state(ProcessState::Running);
            future.await;
            task_shared.set_state(ProcessState::Dead);
        });
        Ok(Box::new(FiberHandle { shared, join }))
    }

    fn drive(&mut self) {
        // The runtime schedules fibers itself.
    }
}

/// Handle to one tokio-backed process.
pub struct FiberHandle {
    shared: Arc<FiberShared>,
    join: JoinHandle<()>,
}

#[async_trait]
impl ProcessHandle for FiberHandle {
    fn id(&self) -> u64 {
        self.shared.id
    }

    fn state(&self) -> ProcessState {
        self.shared.state()
    }

    fn cancel(&self) {
        if !self.shared.state().is_terminal() {
            self.join.abort();
        }
    }

    async fn join(&mut self) {
        match (&mut self.join).await {
            Ok(()) => {}
            Err(err) if err.is_cancelled() => {
                self.shared.set_state(ProcessState::Cancelled);
            }
            Err(err) => {
                // Entry futures are wrapped in catch_unwind by the pool, so
                // this only fires for panics escaping that wrapper.
                error!(
                    process = self.shared.id,
                    error = %err,
                    "logical process terminated abnormally"
                );
                self.shared.set_state(ProcessState::Dead);
            }
        }
    }
}
