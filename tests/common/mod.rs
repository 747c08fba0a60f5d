//! Shared helpers for integration tests: in-memory clients and workload
//! builders.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use squall::{op_fn, ops, seq, Client, GenItem, Op, SquallError, SquallResult};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A single shared register. `read` returns the current value, `write`
/// stores the payload, `cas [old, new]` swaps atomically or fails.
#[derive(Default)]
pub struct RegisterClient {
    register: Mutex<Value>,
}

#[async_trait]
impl Client for RegisterClient {
    async fn invoke(&self, op: Op) -> SquallResult<Op> {
        match op.f.as_str() {
            "read" => {
                let value = self.register.lock().clone();
                Ok(op.ok(value))
            }
            "write" => {
                let value = op.value.clone();
                *self.register.lock() = value.clone();
                Ok(op.ok(value))
            }
            "cas" => {
                let (old, new) = match op.value.as_array().map(|pair| pair.as_slice()) {
                    Some([old, new]) => (old.clone(), new.clone()),
                    _ => return Ok(op.fail(json!("malformed cas payload"))),
                };
                let mut register = self.register.lock();
                if *register == old {
                    *register = new.clone();
                    drop(register);
                    Ok(op.ok(json!([old, new])))
                } else {
                    drop(register);
                    Ok(op.fail(json!([old, new])))
                }
            }
            _ => Ok(op.fail(json!("unknown operation"))),
        }
    }
}

/// Completes every operation but refuses to set up.
#[derive(Default)]
pub struct FailingSetupClient {
    inner: RegisterClient,
}

#[async_trait]
impl Client for FailingSetupClient {
    async fn setup(&self) -> SquallResult<()> {
        Err(SquallError::ClientError {
            operation: "setup".to_string(),
            details: "injected setup failure".to_string(),
        })
    }

    async fn invoke(&self, op: Op) -> SquallResult<Op> {
        self.inner.invoke(op).await
    }
}

/// Errors out of every invocation, leaving dangling invokes behind.
pub struct BrokenInvokeClient;

#[async_trait]
impl Client for BrokenInvokeClient {
    async fn invoke(&self, op: Op) -> SquallResult<Op> {
        Err(SquallError::ClientError {
            operation: op.f,
            details: "injected invoke failure".to_string(),
        })
    }
}

/// A read/write mix of `n` operations with randomized write payloads.
pub fn register_workload_generator(n: usize) -> squall::BoxOpGenerator {
    use squall::GeneratorExt;

    let reads = ops(std::iter::repeat_with(|| Op::invoke("read", Value::Null)).take(n));
    let writes = seq(
        (0..n)
            .map(|_| {
                op_fn(|| {
                    let payload = rand::random::<u8>();
                    Op::invoke("write", json!(payload))
                })
            })
            .collect::<Vec<GenItem>>(),
    );
    squall::mix_seeded(vec![reads.boxed(), writes.boxed()], 99)
        .take(n)
        .boxed()
}

pub fn arc_client<C: Client + 'static>(client: C) -> Arc<dyn Client> {
    Arc::new(client)
}
