//! Individual failover steps shared by the strategies

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::{debug, error, info, warn};

use super::PROMOTE_COMMAND;
use crate::controller::has_database_container;
use crate::crd::Pgtask;
use crate::error::{Error, Result};
use crate::labels::{self, LABEL_SERVICE_SELECTOR, LABEL_WORKLOAD_NAME};
use crate::platform::{ExecOutput, ExecRequest, Platform};

/// Resolve the candidate pod named by the task's `target` label.
///
/// Returns the pod and the target name.
pub async fn resolve_candidate(
    platform: &dyn Platform,
    task: &Pgtask,
    namespace: &str,
) -> Result<(Pod, String)> {
    let target = task
        .target()
        .ok_or_else(|| Error::MissingTarget {
            task: task.name_any(),
        })?
        .to_string();

    let pod = platform
        .get_instance(&target, namespace)
        .await?
        .ok_or_else(|| Error::CandidateNotFound {
            name: target.clone(),
            namespace: namespace.to_string(),
        })?;

    if !has_database_container(&pod) {
        warn!("failover candidate {} has no database container", target);
    }
    debug!("best pod to failover to is {}", pod.name_any());

    Ok((pod, target))
}

/// Delete the Deployment of the single pod currently selected as primary.
///
/// Nothing is deleted unless exactly one pod carries
/// `service-selector=<cluster>`. Returns the deleted Deployment name.
pub async fn delete_primary(
    platform: &dyn Platform,
    namespace: &str,
    cluster: &str,
) -> Result<String> {
    let selector = labels::primary_selector(cluster);
    let pods = platform.list_instances(&selector, namespace).await?;

    let primary = match pods.as_slice() {
        [] => {
            error!("no primary pod found when trying to delete primary {}", selector);
            return Err(Error::NoPrimary {
                cluster: cluster.to_string(),
            });
        }
        [primary] => primary,
        many => {
            error!(
                "more than 1 primary pod found when trying to delete primary {}",
                selector
            );
            return Err(Error::AmbiguousPrimary {
                cluster: cluster.to_string(),
                count: many.len(),
            });
        }
    };

    let workload = labels::label(primary, LABEL_WORKLOAD_NAME)
        .filter(|w| !w.is_empty())
        .ok_or_else(|| Error::MissingLabel {
            pod: primary.name_any(),
            label: LABEL_WORKLOAD_NAME,
        })?
        .to_string();

    debug!("deleting deployment {}", workload);
    platform.delete_workload(&workload, namespace).await?;
    info!("deleted primary deployment {} of cluster {}", workload, cluster);

    Ok(workload)
}

/// Run the promotion command in the candidate's first container.
pub async fn promote(platform: &dyn Platform, pod: &Pod, namespace: &str) -> Result<ExecOutput> {
    let container = pod
        .spec
        .as_ref()
        .and_then(|s| s.containers.first())
        .map(|c| c.name.clone())
        .ok_or_else(|| Error::ExecError(format!("pod {} has no containers", pod.name_any())))?;

    let request = ExecRequest {
        pod: pod.name_any(),
        container,
        namespace: namespace.to_string(),
        command: vec![PROMOTE_COMMAND.to_string()],
    };

    debug!(
        "running exec with namespace=[{}] podname=[{}] container name=[{}]",
        request.namespace, request.pod, request.container
    );
    let output = platform.exec_in_container(&request).await?;
    debug!("stdout=[{}] stderr=[{}]", output.stdout, output.stderr);
    Ok(output)
}

/// Point the primary Service at the candidate pod.
///
/// The pod is re-fetched first so the write is based on its latest version.
pub async fn relabel_pod(
    platform: &dyn Platform,
    name: &str,
    namespace: &str,
    cluster: &str,
) -> Result<()> {
    let mut pod = platform
        .get_instance(name, namespace)
        .await
        .map_err(|e| {
            error!("error in getting pod {} during failover relabel: {}", name, e);
            e
        })?
        .ok_or_else(|| Error::NotFound {
            kind: "pod",
            name: name.to_string(),
        })?;

    pod.labels_mut()
        .insert(LABEL_SERVICE_SELECTOR.to_string(), cluster.to_string());

    platform.update_instance(&pod, namespace).await.map_err(|e| {
        error!("error in updating pod {} during failover relabel: {}", name, e);
        e
    })?;

    info!("pod {} now selected as primary of {}", name, cluster);
    Ok(())
}
