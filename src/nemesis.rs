//! Fault-injection actor interface.
//!
//! A nemesis disturbs the system under test (partitions, process kills,
//! clock skew) while the workload runs. This crate only defines the seam and
//! a no-op implementation; real fault injection is an external collaborator.

use async_trait::async_trait;

use crate::error::SquallResult;

/// A fault-injection actor, scheduled around the workload over the
/// configured node list.
#[async_trait]
pub trait Nemesis: Send + Sync {
    async fn setup(&self, _nodes: &[String]) -> SquallResult<()> {
        Ok(())
    }

    /// Inject the named fault against the given nodes.
    async fn inject(&self, _fault: &str, _nodes: &[String]) -> SquallResult<()> {
        Ok(())
    }

    /// Undo any outstanding fault.
    async fn heal(&self, _nodes: &[String]) -> SquallResult<()> {
        Ok(())
    }

    async fn teardown(&self, _nodes: &[String]) -> SquallResult<()> {
        Ok(())
    }
}

/// The default nemesis: injects nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNemesis;

#[async_trait]
impl Nemesis for NoopNemesis {}
