//! [`Platform`] backed by the Kubernetes API

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use kube::{
    api::{Api, AttachParams, DeleteParams, ListParams, Patch, PatchParams, PostParams},
    Client, ResourceExt,
};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, instrument, warn};

use super::{ExecOutput, ExecRequest, Platform};
use crate::crd::Pgtask;
use crate::error::{Error, Result};
use crate::failover::LabelPatch;

/// Field manager name for patches
const FIELD_MANAGER: &str = "pg-failover-operator";

#[derive(Clone)]
pub struct KubePlatform {
    client: Client,
}

impl KubePlatform {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn tasks(&self, namespace: &str) -> Api<Pgtask> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl Platform for KubePlatform {
    async fn get_instance(&self, name: &str, namespace: &str) -> Result<Option<Pod>> {
        Ok(self.pods(namespace).get_opt(name).await?)
    }

    async fn update_instance(&self, pod: &Pod, namespace: &str) -> Result<()> {
        self.pods(namespace)
            .replace(&pod.name_any(), &PostParams::default(), pod)
            .await?;
        Ok(())
    }

    async fn list_instances(&self, label_selector: &str, namespace: &str) -> Result<Vec<Pod>> {
        let pods = self
            .pods(namespace)
            .list(&ListParams::default().labels(label_selector))
            .await?;
        Ok(pods.items)
    }

    async fn get_workload(&self, name: &str, namespace: &str) -> Result<Option<Deployment>> {
        Ok(self.deployments(namespace).get_opt(name).await?)
    }

    async fn delete_workload(&self, name: &str, namespace: &str) -> Result<()> {
        self.deployments(namespace)
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }

    async fn patch_workload_labels(
        &self,
        name: &str,
        namespace: &str,
        patch: &LabelPatch,
    ) -> Result<()> {
        let body = serde_json::json!({
            "metadata": {
                "labels": patch.to_merge_value()
            }
        });
        self.deployments(namespace)
            .patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&body))
            .await?;
        Ok(())
    }

    #[instrument(skip(self, request), fields(pod = %request.pod, container = %request.container))]
    async fn exec_in_container(&self, request: &ExecRequest) -> Result<ExecOutput> {
        let params = AttachParams::default()
            .container(request.container.clone())
            .stdin(false)
            .stdout(true)
            .stderr(true);

        let mut attached = self
            .pods(&request.namespace)
            .exec(&request.pod, request.command.clone(), &params)
            .await?;

        let stdout = attached.stdout();
        let stderr = attached.stderr();
        let status = attached.take_status();

        let (stdout, stderr) = tokio::join!(read_stream(stdout), read_stream(stderr));
        let output = ExecOutput { stdout, stderr };

        let status = match status {
            Some(status) => status.await,
            None => None,
        };
        debug!("exec finished with status {:?}", status);

        match status {
            Some(s) if s.status.as_deref() == Some("Failure") => Err(Error::ExecError(format!(
                "command {:?} failed: {} (stdout=[{}] stderr=[{}])",
                request.command,
                s.message.unwrap_or_default(),
                output.stdout,
                output.stderr
            ))),
            _ => Ok(output),
        }
    }

    async fn get_task(&self, name: &str, namespace: &str) -> Result<Option<Pgtask>> {
        Ok(self.tasks(namespace).get_opt(name).await?)
    }

    async fn update_task_status(&self, task: &Pgtask, namespace: &str) -> Result<()> {
        let patch = serde_json::json!({ "status": task.status });
        self.tasks(namespace)
            .patch_status(
                &task.name_any(),
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await?;
        Ok(())
    }
}

async fn read_stream<R: AsyncRead + Unpin>(reader: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        if let Err(e) = reader.read_to_end(&mut buf).await {
            warn!("Failed to read exec output stream: {}", e);
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
