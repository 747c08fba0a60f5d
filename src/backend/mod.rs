//! Logical-process backends.
//!
//! One unit of concurrency — a logical process — runs an entry future to
//! completion. Two interchangeable backends implement the same capability
//! set {create, yield, cancel, join}: a cooperative single-thread scheduler
//! ([`cooperative`]) and preemptive green threads on the tokio runtime
//! ([`fiber`]). The pool picks an implementation by configuration; call
//! sites never branch on the backend.

pub mod cooperative;
pub mod fiber;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::{SquallError, SquallResult};

/// Which concurrency backend a pool runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadKind {
    /// Cooperative: one OS thread, explicit yield points, random ready-task
    /// selection.
    Coroutine,
    /// Preemptive: tokio green threads, scheduler-managed suspension.
    Fiber,
}

impl ThreadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreadKind::Coroutine => "coroutine",
            ThreadKind::Fiber => "fiber",
        }
    }
}

impl fmt::Display for ThreadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ThreadKind {
    type Err = SquallError;

    fn from_str(s: &str) -> SquallResult<Self> {
        match s {
            "coroutine" => Ok(ThreadKind::Coroutine),
            "fiber" => Ok(ThreadKind::Fiber),
            other => Err(SquallError::UnsupportedBackend {
                kind: other.to_string(),
            }),
        }
    }
}

/// Lifecycle of one logical process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Created,
    Running,
    Dead,
    Cancelled,
}

impl ProcessState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessState::Dead | ProcessState::Cancelled)
    }
}

/// The entry future of a logical process.
pub type ProcessFuture = BoxFuture<'static, ()>;

/// A handle to one live-or-terminal logical process.
#[async_trait]
pub trait ProcessHandle: Send {
    fn id(&self) -> u64;

    fn state(&self) -> ProcessState;

    /// Best-effort stop. Idempotent; safe on an already-dead process.
    /// Cooperative processes are only prevented from resuming again;
    /// preemptive processes may be interrupted mid-operation.
    fn cancel(&self);

    /// Return once the process has reached a terminal state.
    async fn join(&mut self);
}

/// A concurrency backend: creates logical processes and, for the cooperative
/// implementation, drives them.
pub trait Backend: Send {
    fn kind(&self) -> ThreadKind;

    /// Register the entry future as a new logical process and begin
    /// execution — up to the first yield point for the cooperative backend,
    /// under the runtime scheduler for the preemptive one.
    fn create(&mut self, id: u64, future: ProcessFuture) -> SquallResult<Box<dyn ProcessHandle>>;

    /// Run the cooperative scheduler loop to completion. The scheduler does
    /// not run itself; the pool calls this after all creates. No-op on the
    /// preemptive backend.
    fn drive(&mut self);
}

/// Construct the backend for `kind`, or fail with a configuration error when
/// the host cannot support it.
pub fn backend_for(kind: ThreadKind, seed: Option<u64>) -> SquallResult<Box<dyn Backend>> {
    match kind {
        ThreadKind::Coroutine => Ok(Box::new(cooperative::CoopBackend::new(seed))),
        ThreadKind::Fiber => Ok(Box::new(fiber::FiberBackend::new()?)),
    }
}

/// An explicit yield point, honored by both backends. Under the cooperative
/// scheduler this is the only preemption boundary; under tokio it gives the
/// runtime a chance to reschedule.
pub async fn yield_now() {
    YieldNow { yielded: false }.await
}

struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}
