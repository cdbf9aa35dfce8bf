//! Concrete failover strategies

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::{error, info, instrument, warn};

use super::label_patch::relabel_workload;
use super::procedure::{delete_primary, promote, relabel_pod, resolve_candidate};
use super::status::update_failover_status;
use super::FailoverStrategy;
use crate::crd::{FailoverPhase, Pgtask};
use crate::error::Result;
use crate::platform::Platform;

/// Steps shared by every strategy: resolve the candidate, delete the old
/// primary's Deployment and run the promotion command.
///
/// A failed promotion command is logged and does not stop the failover.
async fn replace_primary(
    platform: &dyn Platform,
    cluster: &str,
    task: &Pgtask,
    namespace: &str,
) -> Result<(Pod, String)> {
    let (candidate, target) = resolve_candidate(platform, task, namespace).await?;

    delete_primary(platform, namespace, cluster).await?;
    update_failover_status(
        platform,
        task,
        namespace,
        FailoverPhase::DeletingPrimary,
        &format!("deleting primary deployment {cluster}"),
    )
    .await;

    // TODO: decide with product owners whether a failed promote should abort
    if let Err(e) = promote(platform, &candidate, namespace).await {
        error!("promotion of pod {} failed: {}", candidate.name_any(), e);
    }
    update_failover_status(
        platform,
        task,
        namespace,
        FailoverPhase::Promoting,
        &format!("promoting pod {} target {}", candidate.name_any(), target),
    )
    .await;

    Ok((candidate, target))
}

/// Record a fatal error on the task before handing it back
async fn report_failure<T>(
    platform: &dyn Platform,
    task: &Pgtask,
    namespace: &str,
    result: Result<T>,
) -> Result<T> {
    if let Err(e) = &result {
        warn!("failover for task {} failed: {}", task.name_any(), e);
        update_failover_status(
            platform,
            task,
            namespace,
            FailoverPhase::Failed,
            &format!("failover failed: {e}"),
        )
        .await;
    }
    result
}

/// Promote the candidate and point the primary Service at it by setting
/// `service-selector=<cluster>` on the candidate pod.
pub struct PodRelabelStrategy {
    platform: Arc<dyn Platform>,
}

impl PodRelabelStrategy {
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self { platform }
    }

    async fn run(&self, cluster: &str, task: &Pgtask, namespace: &str) -> Result<()> {
        let platform = self.platform.as_ref();
        let (candidate, _target) = replace_primary(platform, cluster, task, namespace).await?;
        let name = candidate.name_any();

        update_failover_status(
            platform,
            task,
            namespace,
            FailoverPhase::Relabeling,
            &format!("re-labeling pod {name} as primary of {cluster}"),
        )
        .await;
        relabel_pod(platform, &name, namespace, cluster).await?;

        update_failover_status(
            platform,
            task,
            namespace,
            FailoverPhase::Completed,
            &format!(
                "re-labeling deployment...pod {name} was the failover target...failover completed"
            ),
        )
        .await;
        Ok(())
    }
}

#[async_trait]
impl FailoverStrategy for PodRelabelStrategy {
    fn name(&self) -> &'static str {
        "pod-relabel"
    }

    #[instrument(skip(self, task), fields(task = %task.name_any()))]
    async fn failover(&self, cluster: &str, task: &Pgtask, namespace: &str) -> Result<()> {
        info!(
            "{} failover called on {} target is {:?}",
            self.name(),
            cluster,
            task.target()
        );
        let result = self.run(cluster, task, namespace).await;
        report_failure(self.platform.as_ref(), task, namespace, result).await
    }
}

/// Promote the candidate and mark the target's Deployment as primary with
/// `name=<cluster>` and `primary=true` instead of relabeling the pod.
///
/// No pod receives `service-selector=<cluster>`, so after this strategy runs
/// the primary Service selects nothing and a later failover of the same
/// cluster fails with [`crate::Error::NoPrimary`] until a pod is relabeled
/// by hand.
pub struct WorkloadRelabelStrategy {
    platform: Arc<dyn Platform>,
}

impl WorkloadRelabelStrategy {
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self { platform }
    }

    async fn run(&self, cluster: &str, task: &Pgtask, namespace: &str) -> Result<()> {
        let platform = self.platform.as_ref();
        let (candidate, target) = replace_primary(platform, cluster, task, namespace).await?;

        update_failover_status(
            platform,
            task,
            namespace,
            FailoverPhase::Relabeling,
            &format!("re-labeling deployment {target} as primary of {cluster}"),
        )
        .await;
        relabel_workload(platform, namespace, cluster, &target).await?;

        update_failover_status(
            platform,
            task,
            namespace,
            FailoverPhase::Completed,
            &format!(
                "re-labeling deployment {target}...pod {} was the failover target...failover completed",
                candidate.name_any()
            ),
        )
        .await;
        Ok(())
    }
}

#[async_trait]
impl FailoverStrategy for WorkloadRelabelStrategy {
    fn name(&self) -> &'static str {
        "workload-relabel"
    }

    #[instrument(skip(self, task), fields(task = %task.name_any()))]
    async fn failover(&self, cluster: &str, task: &Pgtask, namespace: &str) -> Result<()> {
        info!(
            "{} failover called on {} target is {:?}",
            self.name(),
            cluster,
            task.target()
        );
        let result = self.run(cluster, task, namespace).await;
        report_failure(self.platform.as_ref(), task, namespace, result).await
    }
}
