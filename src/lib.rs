//! Concurrent workload execution engine for fault-injection testing of
//! distributed systems.
//!
//! squall drives a system under test with concurrently generated operations,
//! records a strictly ordered history of invocations and outcomes, and hands
//! that history to an external consistency checker. The engine guarantees
//! correct invoke/outcome pairing under concurrency across two backends —
//! cooperative single-thread scheduling and preemptive green threads — and
//! stays correct when a generator is exhausted, time-limited, or infinite.
//!
//! Checking observed histories, real fault injection, CLI handling and
//! client adapters for actual databases are external collaborators, not part
//! of this crate.

pub mod backend;
pub mod client;
pub mod error;
pub mod generator;
pub mod history;
pub mod nemesis;
pub mod op;
pub mod pool;
pub mod runner;

pub use backend::{yield_now, ProcessState, ThreadKind};
pub use client::Client;
pub use error::{SquallError, SquallResult};
pub use generator::{
    chain, mix, mix_seeded, op_fn, ops, range, seq, unfold, BoxGenerator, BoxOpGenerator, GenItem,
    Generator, GeneratorExt,
};
pub use history::History;
pub use nemesis::{Nemesis, NoopNemesis};
pub use op::{Op, OpType};
pub use pool::ThreadPool;
pub use runner::{run_workload, RunOutcome, Runner, TestOptions, Workload};
