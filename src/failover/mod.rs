//! Failover orchestration
//!
//! A failover replaces the primary of a cluster with the replica named by a
//! Pgtask. The procedure is a fixed sequence of steps and is not
//! transactional: a failure partway leaves the cluster in an intermediate
//! state that has to be repaired by hand. Only a missing candidate, a
//! missing or ambiguous primary, and a failed relabel abort it; status
//! reports and the promotion command are best-effort.

pub mod label_patch;
mod procedure;
mod status;
mod strategy;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::crd::Pgtask;
use crate::error::{Error, Result};
use crate::platform::Platform;

pub use label_patch::{primary_workload_patch, relabel_workload, LabelPatch};
pub use procedure::{delete_primary, promote, relabel_pod, resolve_candidate};
pub use status::update_failover_status;
pub use strategy::{PodRelabelStrategy, WorkloadRelabelStrategy};

/// Command run inside the candidate to promote it
pub const PROMOTE_COMMAND: &str = "/opt/cpm/bin/promote.sh";

/// A procedure that replaces the primary of a cluster
#[async_trait]
pub trait FailoverStrategy: Send + Sync {
    /// Short identifier used in logs and configuration
    fn name(&self) -> &'static str;

    /// Promote the task's target pod to primary of `cluster`
    async fn failover(&self, cluster: &str, task: &Pgtask, namespace: &str) -> Result<()>;
}

/// Strategy selector used by the configuration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailoverStrategyKind {
    /// Relabel the promoted pod (default)
    #[default]
    PodRelabel,
    /// Patch the labels of the target's Deployment. Leaves the primary
    /// Service without a selected pod.
    WorkloadRelabel,
}

impl FailoverStrategyKind {
    pub fn build(self, platform: Arc<dyn Platform>) -> Arc<dyn FailoverStrategy> {
        match self {
            FailoverStrategyKind::PodRelabel => Arc::new(PodRelabelStrategy::new(platform)),
            FailoverStrategyKind::WorkloadRelabel => {
                Arc::new(WorkloadRelabelStrategy::new(platform))
            }
        }
    }
}

impl fmt::Display for FailoverStrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailoverStrategyKind::PodRelabel => f.write_str("pod-relabel"),
            FailoverStrategyKind::WorkloadRelabel => f.write_str("workload-relabel"),
        }
    }
}

impl FromStr for FailoverStrategyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "pod-relabel" => Ok(FailoverStrategyKind::PodRelabel),
            "2" | "workload-relabel" => Ok(FailoverStrategyKind::WorkloadRelabel),
            other => Err(Error::ConfigError(format!(
                "unknown failover strategy '{other}' (expected pod-relabel or workload-relabel)"
            ))),
        }
    }
}
