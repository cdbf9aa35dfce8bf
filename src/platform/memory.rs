//! In-memory [`Platform`] used by unit tests.
//!
//! Objects are keyed by name only; every test works in a single namespace.
//! Pods carry a resourceVersion that is bumped on every write so stale
//! replaces fail with a 409 the same way the API server rejects them.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Container, ContainerStatus, Pod, PodSpec, PodStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::error::ErrorResponse;
use kube::ResourceExt;

use super::{ExecOutput, ExecRequest, Platform};
use crate::crd::{FailoverPhase, Pgtask};
use crate::error::{Error, Result};
use crate::failover::LabelPatch;

/// Every call the fake receives, in order
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    GetInstance(String),
    UpdateInstance {
        name: String,
        labels: BTreeMap<String, String>,
    },
    ListInstances(String),
    GetWorkload(String),
    DeleteWorkload(String),
    PatchWorkload {
        name: String,
        patch: LabelPatch,
    },
    Exec(ExecRequest),
    GetTask(String),
    UpdateTaskStatus {
        name: String,
        phase: FailoverPhase,
        message: String,
    },
}

/// Failures to inject
#[derive(Clone, Debug, Default)]
pub struct Failures {
    /// Number of upcoming pod updates rejected with 409
    pub update_conflicts: u32,
    /// Reject every pod update with this status code
    pub update_error_code: Option<u16>,
    /// Successful pod gets allowed before every further get fails with 500
    pub get_instance_ok_limit: Option<usize>,
    pub exec: bool,
    pub get_task: bool,
    pub update_task: bool,
    pub delete_workload: bool,
    pub patch_workload: bool,
}

#[derive(Default)]
struct State {
    pods: BTreeMap<String, Pod>,
    deployments: BTreeMap<String, Deployment>,
    tasks: BTreeMap<String, Pgtask>,
    calls: Vec<Call>,
    failures: Failures,
    successful_gets: usize,
}

#[derive(Default)]
pub struct InMemoryPlatform {
    state: Mutex<State>,
}

pub fn api_error(code: u16, reason: &str) -> Error {
    Error::KubeError(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: format!("injected {reason}"),
        reason: reason.to_string(),
        code,
    }))
}

impl InMemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("fake platform mutex poisoned")
    }

    pub fn with_pod(self, mut pod: Pod) -> Self {
        if pod.metadata.resource_version.is_none() {
            pod.metadata.resource_version = Some("1".to_string());
        }
        self.lock().pods.insert(pod.name_any(), pod);
        self
    }

    pub fn with_deployment(self, name: &str) -> Self {
        self.with_labeled_deployment(name, &[])
    }

    pub fn with_labeled_deployment(self, name: &str, labels: &[(&str, &str)]) -> Self {
        let deployment = Deployment {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(to_map(labels)),
                ..Default::default()
            },
            ..Default::default()
        };
        self.lock().deployments.insert(name.to_string(), deployment);
        self
    }

    pub fn with_task(self, task: Pgtask) -> Self {
        self.lock().tasks.insert(task.name_any(), task);
        self
    }

    pub fn with_failures(self, failures: Failures) -> Self {
        self.lock().failures = failures;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn pod(&self, name: &str) -> Option<Pod> {
        self.lock().pods.get(name).cloned()
    }

    pub fn task(&self, name: &str) -> Option<Pgtask> {
        self.lock().tasks.get(name).cloned()
    }

    pub fn deployment(&self, name: &str) -> Option<Deployment> {
        self.lock().deployments.get(name).cloned()
    }

    /// Bump a pod's resourceVersion as if someone else had written it
    pub fn touch_pod(&self, name: &str) {
        if let Some(pod) = self.lock().pods.get_mut(name) {
            pod.metadata.resource_version = Some(next_version(&pod.metadata.resource_version));
        }
    }

    pub fn update_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::UpdateInstance { .. }))
            .count()
    }

    pub fn task_messages(&self) -> Vec<(FailoverPhase, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::UpdateTaskStatus { phase, message, .. } => Some((phase, message)),
                _ => None,
            })
            .collect()
    }
}

/// Parse a `k=v,k2=v2` equality selector into a map
///
/// Only equality terms are understood; anything else is skipped.
fn parse_equality_selector(selector: &str) -> BTreeMap<String, String> {
    selector
        .split(',')
        .filter_map(|term| {
            let (key, value) = term.split_once('=')?;
            let key = key.trim().trim_end_matches('=');
            let value = value.trim().trim_start_matches('=');
            if key.is_empty() || key.ends_with('!') {
                return None;
            }
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

fn next_version(current: &Option<String>) -> String {
    let n: u64 = current.as_deref().and_then(|v| v.parse().ok()).unwrap_or(0);
    (n + 1).to_string()
}

fn to_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[async_trait]
impl Platform for InMemoryPlatform {
    async fn get_instance(&self, name: &str, _namespace: &str) -> Result<Option<Pod>> {
        let mut state = self.lock();
        state.calls.push(Call::GetInstance(name.to_string()));
        if let Some(limit) = state.failures.get_instance_ok_limit {
            if state.successful_gets >= limit {
                return Err(api_error(500, "InternalError"));
            }
        }
        state.successful_gets += 1;
        Ok(state.pods.get(name).cloned())
    }

    async fn update_instance(&self, pod: &Pod, _namespace: &str) -> Result<()> {
        let mut state = self.lock();
        let name = pod.name_any();
        state.calls.push(Call::UpdateInstance {
            name: name.clone(),
            labels: pod.labels().clone(),
        });

        if let Some(code) = state.failures.update_error_code {
            return Err(api_error(code, "Injected"));
        }
        if state.failures.update_conflicts > 0 {
            state.failures.update_conflicts -= 1;
            return Err(api_error(409, "Conflict"));
        }

        let stored = state
            .pods
            .get_mut(&name)
            .ok_or_else(|| api_error(404, "NotFound"))?;
        if stored.metadata.resource_version != pod.metadata.resource_version {
            return Err(api_error(409, "Conflict"));
        }
        let mut updated = pod.clone();
        updated.metadata.resource_version =
            Some(next_version(&stored.metadata.resource_version));
        *stored = updated;
        Ok(())
    }

    async fn list_instances(&self, label_selector: &str, _namespace: &str) -> Result<Vec<Pod>> {
        let mut state = self.lock();
        state
            .calls
            .push(Call::ListInstances(label_selector.to_string()));
        let wanted = parse_equality_selector(label_selector);
        Ok(state
            .pods
            .values()
            .filter(|p| wanted.iter().all(|(k, v)| p.labels().get(k) == Some(v)))
            .cloned()
            .collect())
    }

    async fn get_workload(&self, name: &str, _namespace: &str) -> Result<Option<Deployment>> {
        let mut state = self.lock();
        state.calls.push(Call::GetWorkload(name.to_string()));
        Ok(state.deployments.get(name).cloned())
    }

    async fn delete_workload(&self, name: &str, _namespace: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(Call::DeleteWorkload(name.to_string()));
        if state.failures.delete_workload {
            return Err(api_error(500, "InternalError"));
        }
        state
            .deployments
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| api_error(404, "NotFound"))
    }

    async fn patch_workload_labels(
        &self,
        name: &str,
        _namespace: &str,
        patch: &LabelPatch,
    ) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(Call::PatchWorkload {
            name: name.to_string(),
            patch: patch.clone(),
        });
        if state.failures.patch_workload {
            return Err(api_error(422, "Invalid"));
        }
        let deployment = state
            .deployments
            .get_mut(name)
            .ok_or_else(|| api_error(404, "NotFound"))?;
        deployment
            .metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .extend(patch.labels_to_set().clone());
        Ok(())
    }

    async fn exec_in_container(&self, request: &ExecRequest) -> Result<ExecOutput> {
        let mut state = self.lock();
        state.calls.push(Call::Exec(request.clone()));
        if state.failures.exec {
            return Err(Error::ExecError("injected exec failure".to_string()));
        }
        Ok(ExecOutput {
            stdout: "promoted".to_string(),
            stderr: String::new(),
        })
    }

    async fn get_task(&self, name: &str, _namespace: &str) -> Result<Option<Pgtask>> {
        let mut state = self.lock();
        state.calls.push(Call::GetTask(name.to_string()));
        if state.failures.get_task {
            return Err(api_error(500, "InternalError"));
        }
        Ok(state.tasks.get(name).cloned())
    }

    async fn update_task_status(&self, task: &Pgtask, _namespace: &str) -> Result<()> {
        let mut state = self.lock();
        let name = task.name_any();
        let (phase, message) = task
            .status
            .as_ref()
            .map(|s| (s.phase, s.message.clone()))
            .unwrap_or_default();
        state.calls.push(Call::UpdateTaskStatus {
            name: name.clone(),
            phase,
            message,
        });
        if state.failures.update_task {
            return Err(api_error(500, "InternalError"));
        }
        let stored = state
            .tasks
            .get_mut(&name)
            .ok_or_else(|| api_error(404, "NotFound"))?;
        stored.status = task.status.clone();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Object builders
// ---------------------------------------------------------------------------

/// Pod with labels, one container per name and the given container readiness
pub fn make_pod(name: &str, labels: &[(&str, &str)], containers: &[(&str, bool)]) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("pg".to_string()),
            labels: Some(to_map(labels)),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: containers
                .iter()
                .map(|(c, _)| Container {
                    name: c.to_string(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }),
        status: Some(PodStatus {
            container_statuses: Some(
                containers
                    .iter()
                    .map(|(c, ready)| ContainerStatus {
                        name: c.to_string(),
                        ready: *ready,
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
    }
}

/// Failover task targeting `target`
pub fn make_task(name: &str, cluster: &str, target: Option<&str>) -> Pgtask {
    let mut labels = BTreeMap::new();
    if let Some(t) = target {
        labels.insert(crate::labels::LABEL_TARGET.to_string(), t.to_string());
    }
    Pgtask {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("pg".to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        spec: crate::crd::PgtaskSpec {
            name: name.to_string(),
            task_type: crate::crd::TASK_TYPE_FAILOVER.to_string(),
            cluster_name: cluster.to_string(),
            parameters: BTreeMap::new(),
        },
        status: None,
    }
}

mod tests {
    use super::*;

    #[test]
    fn test_parse_equality_selector() {
        let parsed = parse_equality_selector("service-selector=c3, cluster==c3,role!=true");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed.get("service-selector").map(String::as_str), Some("c3"));
        assert_eq!(parsed.get("cluster").map(String::as_str), Some("c3"));
    }
}
