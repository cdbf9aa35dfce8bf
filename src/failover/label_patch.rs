//! Typed label patches for workload objects
//!
//! Builds the small label diff the alternate relabel path applies to a
//! Deployment and turns it into a JSON merge patch body.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::Deployment;
use kube::ResourceExt;
use tracing::{debug, error, info, instrument};

use crate::error::{Error, Result};
use crate::labels::{LABEL_NAME, LABEL_PRIMARY, VALUE_TRUE};
use crate::platform::Platform;

/// Labels to set on an object, sent as a JSON merge patch
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelPatch {
    set: BTreeMap<String, String>,
}

impl LabelPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn labels_to_set(&self) -> &BTreeMap<String, String> {
        &self.set
    }

    /// Keep only the entries that would change `current`
    pub fn diff(&self, current: &BTreeMap<String, String>) -> LabelPatch {
        LabelPatch {
            set: self
                .set
                .iter()
                .filter(|(k, v)| current.get(*k) != Some(*v))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// JSON merge patch value for `metadata.labels`
    pub fn to_merge_value(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.set
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect(),
        )
    }
}

/// Labels that mark a workload as the primary of `cluster`
pub fn primary_workload_patch(cluster: &str) -> LabelPatch {
    LabelPatch::new()
        .set(LABEL_NAME, cluster)
        .set(LABEL_PRIMARY, VALUE_TRUE)
}

/// Relabel the Deployment named `target` as the primary of `cluster`.
///
/// Only the labels that differ from the live object are sent. A missing
/// Deployment is reported as [`Error::NotFound`].
#[instrument(skip(platform))]
pub async fn relabel_workload(
    platform: &dyn Platform,
    namespace: &str,
    cluster: &str,
    target: &str,
) -> Result<()> {
    let deployment: Deployment =
        platform
            .get_workload(target, namespace)
            .await?
            .ok_or_else(|| Error::NotFound {
                kind: "deployment",
                name: target.to_string(),
            })?;

    let current = deployment.labels();
    debug!("current labels are {:?}", current);

    let patch = primary_workload_patch(cluster).diff(current);
    if patch.is_empty() {
        debug!("deployment {} already labeled as primary of {}", target, cluster);
        return Ok(());
    }

    debug!("labels to apply {:?}", patch.labels_to_set());
    platform
        .patch_workload_labels(target, namespace, &patch)
        .await
        .map_err(|e| {
            error!("error patching deployment {}: {}", target, e);
            e
        })?;

    info!("relabeled deployment {} as primary of {}", target, cluster);
    Ok(())
}
