//! Label protocol shared by every component of the operator.
//!
//! These keys and values are part of the wire contract with the rest of the
//! operator (Services select on `service-selector`, the cluster workflows
//! read `role` and `cluster`), so they must not change.

use kube::ResourceExt;

/// "true" for the primary pod, "false" for a replica; absent means unmanaged
pub const LABEL_ROLE: &str = "role";

/// Cluster identity shared by the primary and its replicas
pub const LABEL_CLUSTER: &str = "cluster";

/// Per-cluster opt-in for automatic failover
pub const LABEL_AUTOFAIL: &str = "autofail";

/// Routing label matched by the primary and replica Services
pub const LABEL_SERVICE_SELECTOR: &str = "service-selector";

/// Name of the Deployment that owns the pod
pub const LABEL_WORKLOAD_NAME: &str = "workload-name";

/// Label on a failover task naming the candidate pod
pub const LABEL_TARGET: &str = "target";

/// Workload labels applied by the alternate relabel path
pub const LABEL_NAME: &str = "name";
pub const LABEL_PRIMARY: &str = "primary";

pub const VALUE_TRUE: &str = "true";
pub const VALUE_FALSE: &str = "false";

/// Suffix of the replica Service selector value
pub const REPLICA_SUFFIX: &str = "-replica";

/// Name of the container whose readiness drives the readiness monitor
pub const DATABASE_CONTAINER: &str = "database";

/// Role a pod plays in its cluster, as read from the `role` label
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Primary,
    Replica,
}

impl Role {
    /// Parse the `role` label; any value other than "true"/"false" is unmanaged
    pub fn from_label(value: Option<&str>) -> Option<Self> {
        match value {
            Some(VALUE_TRUE) => Some(Role::Primary),
            Some(VALUE_FALSE) => Some(Role::Replica),
            _ => None,
        }
    }
}

/// Read a single label from any Kubernetes object
pub fn label<'a, K: ResourceExt>(obj: &'a K, key: &str) -> Option<&'a str> {
    obj.labels().get(key).map(String::as_str)
}

/// Role of the object, or `None` when it is not managed by the operator
pub fn role_of<K: ResourceExt>(obj: &K) -> Option<Role> {
    Role::from_label(label(obj, LABEL_ROLE))
}

/// Cluster name of the object; empty when the label is missing
pub fn cluster_of<K: ResourceExt>(obj: &K) -> &str {
    label(obj, LABEL_CLUSTER).unwrap_or_default()
}

/// Service selector value that routes traffic for the given role
pub fn service_selector_for(role: Role, cluster: &str) -> String {
    match role {
        Role::Primary => cluster.to_string(),
        Role::Replica => format!("{cluster}{REPLICA_SUFFIX}"),
    }
}

/// Label selector string matching the current primary of a cluster
pub fn primary_selector(cluster: &str) -> String {
    format!("{LABEL_SERVICE_SELECTOR}={cluster}")
}
