//! The append-only operation log.
//!
//! Insertion order is the linearized order in which the engine observed
//! operations — not global real time. Multiple processes append concurrently,
//! so every append is serialized through a single mutex; its acquisition
//! order defines the order the external checker sees.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::error::SquallResult;
use crate::op::Op;

/// A cloneable handle to the shared operation log. Created empty at test
/// start, mutated only via [`History::add`], serialized after the run.
#[derive(Clone, Debug)]
pub struct History {
    ops: Arc<Mutex<Vec<Op>>>,
    started_at: Instant,
}

impl History {
    pub fn new() -> Self {
        Self {
            ops: Arc::new(Mutex::new(Vec::new())),
            started_at: Instant::now(),
        }
    }

    /// Append an operation. O(1), always succeeds, safe to call from any
    /// logical process under either backend. Stamps the record's `index`
    /// (append position) and `time` (nanoseconds since history creation) and
    /// returns the stamped copy.
    pub fn add(&self, mut op: Op) -> Op {
        let mut ops = self.ops.lock();
        op.index = Some(ops.len() as u64);
        op.time = Some(self.started_at.elapsed().as_nanos() as u64);
        ops.push(op.clone());
        op
    }

    pub fn len(&self) -> usize {
        self.ops.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.lock().is_empty()
    }

    /// A point-in-time copy of the recorded operations, in append order.
    pub fn snapshot(&self) -> Vec<Op> {
        self.ops.lock().clone()
    }

    /// Count of recorded invocations. Deliberately counts raw `invoke`
    /// records, matched or not.
    pub fn ops_planned(&self) -> usize {
        self.ops.lock().iter().filter(|op| op.is_planned()).count()
    }

    /// Count of operations with a definite outcome (`ok` or `fail`).
    pub fn ops_completed(&self) -> usize {
        self.ops.lock().iter().filter(|op| op.is_completed()).count()
    }

    /// Fixed-width text projection, one record per line:
    /// `"\n%3d    %-10s %-10s %-10s"` (process, type, f, value).
    pub fn to_txt(&self) -> String {
        let ops = self.ops.lock();
        let mut out = String::with_capacity(ops.len() * 48);
        for op in ops.iter() {
            out.push_str(&format!("\n{:>3}    {}", op.process, op));
        }
        out
    }

    /// JSON projection: the full ordered sequence as an array of operation
    /// objects, suitable for ingestion by an external consistency checker.
    pub fn to_json(&self) -> SquallResult<String> {
        let ops = self.ops.lock();
        Ok(serde_json::to_string_pretty(&*ops)?)
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}
