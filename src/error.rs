//! Error types for the failover operator

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// The pod a failover task points at does not exist
    #[error("failover candidate pod {namespace}/{name} not found")]
    CandidateNotFound { name: String, namespace: String },

    /// No pod matches the primary service selector
    #[error("could not find primary pod for cluster {cluster}")]
    NoPrimary { cluster: String },

    /// More than one pod matches the primary service selector
    #[error("more than 1 primary pod found for cluster {cluster} ({count} matches)")]
    AmbiguousPrimary { cluster: String, count: usize },

    /// A named object was expected but is absent
    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },

    /// The failover task does not carry a target label
    #[error("task {task} has no target label")]
    MissingTarget { task: String },

    /// A pod lacks a label the protocol requires
    #[error("pod {pod} is missing label {label}")]
    MissingLabel { pod: String, label: &'static str },

    /// Remote command failed or could not be started
    #[error("exec error: {0}")]
    ExecError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The controller stopped because its cancellation token fired
    #[error("controller cancelled")]
    Cancelled,
}

impl Error {
    /// Whether the error belongs to the conflict/transient class that a
    /// re-fetch and retry can resolve.
    pub fn is_retriable(&self) -> bool {
        match self {
            Error::KubeError(kube::Error::Api(resp)) => {
                resp.code == 409 || resp.code == 429 || (500..600).contains(&resp.code)
            }
            Error::KubeError(kube::Error::HyperError(_))
            | Error::KubeError(kube::Error::Service(_)) => true,
            _ => false,
        }
    }

    /// Whether the error is an HTTP 409 from the API server
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::KubeError(kube::Error::Api(resp)) if resp.code == 409)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
