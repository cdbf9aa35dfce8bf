//! Pgtask Custom Resource Definition
//!
//! A Pgtask records one in-flight operation against a PostgreSQL cluster.
//! Failover tasks are created by the autofail decision logic (or by an
//! operator) and carry the candidate pod in the `target` label; the
//! failover procedure reports its progress in `status`.

use std::collections::BTreeMap;
use std::fmt;

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::labels::LABEL_TARGET;

/// Task type string used for failover requests
pub const TASK_TYPE_FAILOVER: &str = "failover";

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "cr.client-go.k8s.io",
    version = "v1",
    kind = "Pgtask",
    plural = "pgtasks",
    namespaced,
    status = "PgtaskStatus",
    shortname = "pgt",
    printcolumn = r#"{"name":"Type","type":"string","jsonPath":".spec.taskType"}"#,
    printcolumn = r#"{"name":"Cluster","type":"string","jsonPath":".spec.clusterName"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PgtaskSpec {
    /// Logical name of the task
    #[serde(default)]
    pub name: String,

    /// Kind of operation, e.g. "failover"
    #[serde(default)]
    pub task_type: String,

    /// Cluster the task operates on
    #[serde(default)]
    pub cluster_name: String,

    /// Free-form parameters passed by the task creator
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
}

/// Progress of a failover, persisted on the task status
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum FailoverPhase {
    #[default]
    Idle,
    DeletingPrimary,
    Promoting,
    Relabeling,
    Completed,
    Failed,
}

impl FailoverPhase {
    /// Whether the failover has reached a final state
    pub fn is_terminal(&self) -> bool {
        matches!(self, FailoverPhase::Completed | FailoverPhase::Failed)
    }
}

impl fmt::Display for FailoverPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailoverPhase::Idle => "Idle",
            FailoverPhase::DeletingPrimary => "DeletingPrimary",
            FailoverPhase::Promoting => "Promoting",
            FailoverPhase::Relabeling => "Relabeling",
            FailoverPhase::Completed => "Completed",
            FailoverPhase::Failed => "Failed",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PgtaskStatus {
    /// Current failover phase
    #[serde(default)]
    pub phase: FailoverPhase,

    /// Human readable detail for the phase
    #[serde(default)]
    pub message: String,

    /// RFC3339 time of the last status write
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<String>,
}

impl Pgtask {
    /// Name of the pod the failover should promote
    pub fn target(&self) -> Option<&str> {
        self.labels()
            .get(LABEL_TARGET)
            .map(String::as_str)
            .filter(|t| !t.is_empty())
    }

    /// Reject tasks that do not request a failover
    pub fn ensure_failover(&self) -> Result<()> {
        if self.spec.task_type == TASK_TYPE_FAILOVER {
            return Ok(());
        }
        Err(Error::ConfigError(format!(
            "task {} has type '{}', expected '{}'",
            self.name_any(),
            self.spec.task_type,
            TASK_TYPE_FAILOVER
        )))
    }

    /// Current phase, `Idle` when no status has been written yet
    pub fn phase(&self) -> FailoverPhase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }

    /// Overwrite the status with a new phase and message
    pub fn set_progress(&mut self, phase: FailoverPhase, message: impl Into<String>) {
        self.status = Some(PgtaskStatus {
            phase,
            message: message.into(),
            last_update_time: Some(chrono::Utc::now().to_rfc3339()),
        });
    }
}
