//! Triggers fired by the readiness monitor.
//!
//! Deciding whether to fail over, applying pending policies and finishing
//! the cluster creation workflow all live outside this crate; the readiness
//! monitor only signals them. Implementations must tolerate repeated calls
//! for the same cluster since nothing is deduplicated.

use async_trait::async_trait;
use tracing::info;

#[async_trait]
pub trait ClusterTriggers: Send + Sync {
    /// Readiness of the primary's database container in an autofail cluster
    async fn on_autofail_signal(&self, ready: bool, cluster: &str, namespace: &str);

    /// Primary database is ready; apply pending policies
    async fn on_primary_ready(&self, cluster: &str);

    /// Primary database is ready; complete the create-cluster workflow
    async fn on_cluster_creation_complete(&self, cluster: &str);
}

/// Triggers that only record the signal in the log
#[derive(Clone, Debug, Default)]
pub struct LoggingTriggers;

#[async_trait]
impl ClusterTriggers for LoggingTriggers {
    async fn on_autofail_signal(&self, ready: bool, cluster: &str, namespace: &str) {
        info!(
            cluster = cluster,
            namespace = namespace,
            ready = ready,
            "autofail signal"
        );
    }

    async fn on_primary_ready(&self, cluster: &str) {
        info!(cluster = cluster, "primary ready, applying policies");
    }

    async fn on_cluster_creation_complete(&self, cluster: &str) {
        info!(cluster = cluster, "cluster creation workflow complete");
    }
}
