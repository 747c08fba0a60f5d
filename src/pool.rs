//! The pool of logical processes.
//!
//! A pool owns N processes on one backend, starts them against a shared
//! entry, drives the cooperative scheduler when that backend is selected,
//! and joins or cancels them. One slow or broken worker must never deadlock
//! the whole run: entry futures are caught at the process boundary and a
//! failure there is logged, not propagated.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::{debug, error};

use crate::backend::{backend_for, Backend, ProcessFuture, ProcessHandle, ProcessState, ThreadKind};
use crate::error::{SquallError, SquallResult};

/// A fixed-size pool of logical processes over one concurrency backend,
/// selected at construction and never mixed within a run.
pub struct ThreadPool {
    backend: Box<dyn Backend>,
    processes: Vec<Box<dyn ProcessHandle>>,
    size: usize,
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("size", &self.size)
            .field("processes", &self.processes.len())
            .finish()
    }
}

impl ThreadPool {
    /// Build a pool of `size` processes on `kind`. Fails with a
    /// configuration error on a zero size or a backend the host cannot
    /// support.
    pub fn new(kind: ThreadKind, size: usize) -> SquallResult<Self> {
        Self::build(kind, size, None)
    }

    /// [`ThreadPool::new`] with a fixed scheduling seed for the cooperative
    /// backend.
    pub fn seeded(kind: ThreadKind, size: usize, seed: u64) -> SquallResult<Self> {
        Self::build(kind, size, Some(seed))
    }

    fn build(kind: ThreadKind, size: usize, seed: Option<u64>) -> SquallResult<Self> {
        if size == 0 {
            return Err(SquallError::config("thread pool size must be at least 1"));
        }
        let backend = backend_for(kind, seed)?;
        Ok(Self {
            backend,
            processes: Vec::with_capacity(size),
            size,
        })
    }

    pub fn kind(&self) -> ThreadKind {
        self.backend.kind()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Create and start all processes against `entry`, then block until
    /// every one of them has joined. On the cooperative backend the
    /// scheduler loop is driven here, after all creates — it does not run
    /// itself.
    pub async fn start<F>(&mut self, entry: F) -> SquallResult<()>
    where
        F: Fn(u64) -> ProcessFuture,
    {
        if !self.processes.is_empty() {
            return Err(SquallError::config("thread pool already started"));
        }
        for id in 0..self.size as u64 {
            let future = AssertUnwindSafe(entry(id))
                .catch_unwind()
                .map(move |outcome| {
                    if let Err(payload) = outcome {
                        error!(
                            process = id,
                            message = %panic_message(&*payload),
                            "logical process panicked"
                        );
                    }
                })
                .boxed();
            let handle = self.backend.create(id, future)?;
            self.processes.push(handle);
        }

        self.backend.drive();

        for process in &mut self.processes {
            process.join().await;
            debug!(process = process.id(), state = ?process.state(), "process joined");
        }
        Ok(())
    }

    /// Best-effort pool-wide stop, used for teardown after failures so the
    /// run can still report partial results rather than hang. Idempotent.
    pub fn cancel(&mut self) {
        for process in &self.processes {
            process.cancel();
        }
    }

    /// Terminal (or current) state of every created process, in id order.
    pub fn states(&self) -> Vec<ProcessState> {
        self.processes.iter().map(|p| p.state()).collect()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::yield_now;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn zero_sized_pool_is_a_configuration_error() {
        let err = ThreadPool::new(ThreadKind::Coroutine, 0).unwrap_err();
        assert!(matches!(err, SquallError::Configuration { .. }));
    }

    #[test]
    fn fiber_pool_without_a_runtime_is_a_configuration_error() {
        let err = ThreadPool::new(ThreadKind::Fiber, 2).unwrap_err();
        assert!(matches!(err, SquallError::Configuration { .. }));
    }

    #[tokio::test]
    async fn coroutine_pool_runs_every_process() {
        let mut pool = ThreadPool::seeded(ThreadKind::Coroutine, 5, 11).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        let entry_counter = Arc::clone(&counter);
        pool.start(move |_id| {
            let counter = Arc::clone(&entry_counter);
            async move {
                for _ in 0..10 {
                    counter.fetch_add(1, Ordering::SeqCst);
                    yield_now().await;
                }
            }
            .boxed()
        })
        .await
        .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 50);
        assert!(pool
            .states()
            .iter()
            .all(|state| *state == ProcessState::Dead));
    }

    #[tokio::test]
    async fn panicking_process_does_not_block_siblings() {
        let mut pool = ThreadPool::seeded(ThreadKind::Coroutine, 3, 3).unwrap();
        let finished = Arc::new(AtomicUsize::new(0));

        let entry_finished = Arc::clone(&finished);
        pool.start(move |id| {
            let finished = Arc::clone(&entry_finished);
            async move {
                if id == 1 {
                    panic!("injected process failure");
                }
                yield_now().await;
                finished.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        })
        .await
        .unwrap();

        assert_eq!(finished.load(Ordering::SeqCst), 2);
        assert!(pool.states().iter().all(|state| state.is_terminal()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancel_stops_fiber_processes() {
        let mut pool = ThreadPool::new(ThreadKind::Fiber, 2).unwrap();

        // Start in the background so we can cancel while processes sleep.
        let started = Arc::new(AtomicUsize::new(0));
        let entry_started = Arc::clone(&started);
        let entry = move |_id: u64| -> ProcessFuture {
            let started = Arc::clone(&entry_started);
            async move {
                started.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            .boxed()
        };

        for id in 0..2 {
            let future = entry(id);
            let handle = pool.backend.create(id, future).unwrap();
            pool.processes.push(handle);
        }
        while started.load(Ordering::SeqCst) < 2 {
            tokio::task::yield_now().await;
        }

        pool.cancel();
        for process in &mut pool.processes {
            process.join().await;
        }
        assert!(pool
            .states()
            .iter()
            .all(|state| *state == ProcessState::Cancelled));
    }
}
