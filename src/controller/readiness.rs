//! Readiness monitor for primary database pods
//!
//! Looks at the `database` container of the current copy of a changed pod
//! and fires two independent trigger branches. Neither branch tracks edges:
//! every qualifying change event fires again.

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::{debug, info};

use super::triggers::ClusterTriggers;
use crate::labels::{self, Role, DATABASE_CONTAINER, LABEL_AUTOFAIL, VALUE_TRUE};

/// Readiness of every container status named `database`
pub fn database_readiness(pod: &Pod) -> Vec<bool> {
    pod.status
        .as_ref()
        .and_then(|s| s.container_statuses.as_ref())
        .map(|statuses| {
            statuses
                .iter()
                .filter(|c| c.name == DATABASE_CONTAINER)
                .map(|c| c.ready)
                .collect()
        })
        .unwrap_or_default()
}

/// Whether the pod spec declares a `database` container
pub fn has_database_container(pod: &Pod) -> bool {
    pod.spec
        .as_ref()
        .map(|s| s.containers.iter().any(|c| c.name == DATABASE_CONTAINER))
        .unwrap_or(false)
}

/// Primary of a cluster that opted into autofail
fn is_autofail_primary(pod: &Pod) -> bool {
    labels::role_of(pod) == Some(Role::Primary)
        && !labels::cluster_of(pod).is_empty()
        && labels::label(pod, LABEL_AUTOFAIL) == Some(VALUE_TRUE)
}

/// Evaluate `current` and fire the autofail and post-promotion triggers.
pub async fn check_ready_status(triggers: &dyn ClusterTriggers, current: &Pod) {
    let cluster = labels::cluster_of(current);
    let namespace = current.namespace().unwrap_or_default();
    let readiness = database_readiness(current);

    if is_autofail_primary(current) {
        info!("an autofail cluster {}", cluster);
        for ready in &readiness {
            triggers
                .on_autofail_signal(*ready, cluster, &namespace)
                .await;
        }
    }

    if labels::role_of(current) == Some(Role::Primary) {
        for ready in readiness {
            if ready {
                debug!("{} went to Ready, apply policies...", cluster);
                triggers.on_primary_ready(cluster).await;
                triggers.on_cluster_creation_complete(cluster).await;
            }
        }
    }
}
