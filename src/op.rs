//! The canonical operation record.
//!
//! Operations follow a request/response model:
//! - `invoke` marks the start of an operation
//! - `ok` marks successful completion
//! - `fail` marks a definite failure
//! - `info` marks an indeterminate result (crash, timeout, etc.)

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The lifecycle phase of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpType {
    /// Operation was invoked but hasn't completed yet.
    Invoke,
    /// Operation completed successfully.
    Ok,
    /// Operation definitely failed.
    Fail,
    /// Operation outcome is permanently indeterminate.
    Info,
}

impl OpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpType::Invoke => "invoke",
            OpType::Ok => "ok",
            OpType::Fail => "fail",
            OpType::Info => "info",
        }
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A single operation as observed by the engine.
///
/// `value` is an opaque, test-defined payload: a scalar, a tuple, or a list
/// of micro-operations. It is an explicit JSON `null` when the operation
/// carries no payload. Field declaration order is the serialization order
/// consumed by external checkers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Op {
    #[serde(rename = "type")]
    pub op_type: OpType,
    pub f: String,
    pub value: Value,
    #[serde(default)]
    pub process: u64,
    /// Global sequence position, stamped by the history on append.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u64>,
    /// Nanoseconds since history creation, stamped on append.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<u64>,
}

impl Op {
    /// A fresh invocation template. The engine stamps `process` and the
    /// history stamps `index`/`time` once it is appended.
    pub fn invoke(f: impl Into<String>, value: Value) -> Self {
        Self {
            op_type: OpType::Invoke,
            f: f.into(),
            value,
            process: 0,
            index: None,
            time: None,
        }
    }

    /// Build the completion of this invocation. The completion carries the
    /// same `f` and `process` as the invoke it closes out; `index`/`time`
    /// are cleared so the history re-stamps them.
    pub fn complete(&self, op_type: OpType, value: Value) -> Self {
        Self {
            op_type,
            f: self.f.clone(),
            value,
            process: self.process,
            index: None,
            time: None,
        }
    }

    /// Successful completion of this invocation.
    pub fn ok(&self, value: Value) -> Self {
        self.complete(OpType::Ok, value)
    }

    /// Definite failure of this invocation.
    pub fn fail(&self, value: Value) -> Self {
        self.complete(OpType::Fail, value)
    }

    /// Indeterminate outcome for this invocation. No further operation may
    /// be attributed to it.
    pub fn info(&self, value: Value) -> Self {
        self.complete(OpType::Info, value)
    }

    pub fn with_process(mut self, process: u64) -> Self {
        self.process = process;
        self
    }

    /// An operation still awaiting its outcome.
    pub fn is_planned(&self) -> bool {
        self.op_type == OpType::Invoke
    }

    /// An operation with a definite outcome. `info` is deliberately
    /// excluded: it is terminal but ambiguous, and must not be counted as
    /// success or failure by downstream tooling.
    pub fn is_completed(&self) -> bool {
        matches!(self.op_type, OpType::Ok | OpType::Fail)
    }
}

impl fmt::Display for Op {
    /// Fixed-width, human-scannable rendering. Column widths are a contract:
    /// downstream report diffing depends on them.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // serde_json's Display ignores width flags, so render the value
        // first and pad it as a string.
        write!(
            f,
            "{:<10} {:<10} {:<10}",
            self.op_type.as_str(),
            self.f,
            self.value.to_string()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn planned_and_completed_are_mutually_exclusive() {
        for op_type in [OpType::Invoke, OpType::Ok, OpType::Fail, OpType::Info] {
            let op = Op {
                op_type,
                f: "read".to_string(),
                value: Value::Null,
                process: 0,
                index: None,
                time: None,
            };
            assert_ne!(op.is_planned(), op.is_completed(), "{op_type:?}");
        }
    }

    #[test]
    fn info_is_not_completed() {
        let op = Op::invoke("write", json!(1)).info(Value::Null);
        assert!(!op.is_completed());
        assert!(!op.is_planned());
    }

    #[test]
    fn completion_preserves_f_and_process() {
        let invoke = Op::invoke("cas", json!([1, 2])).with_process(3);
        let done = invoke.ok(json!([1, 2]));
        assert_eq!(done.f, "cas");
        assert_eq!(done.process, 3);
        assert_eq!(done.op_type, OpType::Ok);
    }

    #[test]
    fn display_is_fixed_width() {
        let op = Op::invoke("read", Value::Null);
        assert_eq!(op.to_string(), "invoke     read       null      ");

        let op = Op::invoke("write", json!(42)).ok(json!(42));
        assert_eq!(op.to_string(), "ok         write      42        ");
    }

    #[test]
    fn serializes_with_type_rename_and_omitted_optionals() {
        let op = Op::invoke("read", Value::Null).with_process(1);
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(
            json,
            json!({"type": "invoke", "f": "read", "value": null, "process": 1})
        );
    }

    #[test]
    fn round_trips_through_json() {
        let op = Op {
            op_type: OpType::Fail,
            f: "txn".to_string(),
            value: json!([["w", "x", 1], ["r", "y", null]]),
            process: 7,
            index: Some(12),
            time: Some(9000),
        };
        let encoded = serde_json::to_string(&op).unwrap();
        let decoded: Op = serde_json::from_str(&encoded).unwrap();
        assert_eq!(op, decoded);
    }
}
