//! Collaborator seam between the failover logic and Kubernetes.
//!
//! Everything the controller and the failover procedure read or mutate goes
//! through [`Platform`], so the procedures can run against a live cluster
//! ([`KubePlatform`]) or an in-memory fake in unit tests.

mod kube_platform;
#[cfg(test)]
pub(crate) mod memory;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;

use crate::crd::Pgtask;
use crate::error::Result;
use crate::failover::LabelPatch;

pub use kube_platform::KubePlatform;

/// A command to run inside a container of a pod
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecRequest {
    pub pod: String,
    pub container: String,
    pub namespace: String,
    pub command: Vec<String>,
}

/// Captured output of a remote command
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

#[async_trait]
pub trait Platform: Send + Sync {
    /// Fetch a pod; `Ok(None)` when it does not exist
    async fn get_instance(&self, name: &str, namespace: &str) -> Result<Option<Pod>>;

    /// Replace a pod, failing with a conflict when its resourceVersion is stale
    async fn update_instance(&self, pod: &Pod, namespace: &str) -> Result<()>;

    /// List pods matching a label selector
    async fn list_instances(&self, label_selector: &str, namespace: &str) -> Result<Vec<Pod>>;

    /// Fetch a Deployment; `Ok(None)` when it does not exist
    async fn get_workload(&self, name: &str, namespace: &str) -> Result<Option<Deployment>>;

    async fn delete_workload(&self, name: &str, namespace: &str) -> Result<()>;

    /// Merge-patch the labels of a Deployment
    async fn patch_workload_labels(
        &self,
        name: &str,
        namespace: &str,
        patch: &LabelPatch,
    ) -> Result<()>;

    /// Run a command inside a container without stdin
    async fn exec_in_container(&self, request: &ExecRequest) -> Result<ExecOutput>;

    async fn get_task(&self, name: &str, namespace: &str) -> Result<Option<Pgtask>>;

    /// Persist the status subresource of a task
    async fn update_task_status(&self, task: &Pgtask, namespace: &str) -> Result<()>;
}
