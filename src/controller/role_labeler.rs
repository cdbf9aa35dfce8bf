//! Role labeling for newly added database pods
//!
//! Sets `service-selector` so the primary Service selects the primary pod
//! and the replica Service selects every replica. The pod may be written by
//! other actors between our read and our write, so each attempt re-fetches
//! it and a failed write is tried again, by default immediately and for any
//! error. Giving up is logged, never escalated.

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::{debug, error, info, instrument, warn};

use super::retry::RetryPolicy;
use crate::labels::{self, Role, LABEL_SERVICE_SELECTOR};
use crate::platform::Platform;

/// How a labeling pass ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LabelOutcome {
    /// Pod has no recognised `role` label
    Unmanaged,
    /// Label written on the given attempt (1-based)
    Labeled { attempts: u32 },
    /// Pod could not be fetched; nothing was written
    FetchFailed,
    /// Pod no longer exists
    Vanished,
    /// Write rejected with an error the policy does not retry
    Rejected { attempts: u32 },
    /// Every attempt failed
    GaveUp { attempts: u32 },
}

/// `service-selector` value the observed pod should carry
pub fn desired_service_selector(pod: &Pod) -> Option<String> {
    let role = labels::role_of(pod)?;
    Some(labels::service_selector_for(role, labels::cluster_of(pod)))
}

/// Label `observed` with its routing selector, retrying failed writes.
#[instrument(skip(platform, observed, policy), fields(pod = %observed.name_any()))]
pub async fn label_instance_role(
    platform: &dyn Platform,
    observed: &Pod,
    namespace: &str,
    policy: &RetryPolicy,
) -> LabelOutcome {
    let Some(selector) = desired_service_selector(observed) else {
        return LabelOutcome::Unmanaged;
    };
    let name = observed.name_any();

    match labels::role_of(observed) {
        Some(Role::Primary) => debug!("primary pod ADDED {} service-selector={}", name, selector),
        _ => debug!("replica pod ADDED {} service-selector={}", name, selector),
    }

    for attempt in 1..=policy.max_attempts {
        // The watched copy may already be stale
        let mut pod = match platform.get_instance(&name, namespace).await {
            Ok(Some(pod)) => pod,
            Ok(None) => {
                warn!("pod {} no longer exists, skipping role label", name);
                return LabelOutcome::Vanished;
            }
            Err(e) => {
                error!("could not get pod {}: {}", name, e);
                return LabelOutcome::FetchFailed;
            }
        };

        pod.labels_mut()
            .insert(LABEL_SERVICE_SELECTOR.to_string(), selector.clone());

        match platform.update_instance(&pod, namespace).await {
            Ok(()) => {
                info!(
                    "labeled pod {} {}={} (attempt {})",
                    name, LABEL_SERVICE_SELECTOR, selector, attempt
                );
                return LabelOutcome::Labeled { attempts: attempt };
            }
            Err(e) if policy.should_retry(&e) => {
                if e.is_conflict() {
                    debug!("pod {} changed since it was read (attempt {})", name, attempt);
                }
                warn!(
                    "could not update pod label for pod {} and label {}, will try update again: {}",
                    name, selector, e
                );
                if attempt < policy.max_attempts {
                    let delay = policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
            Err(e) => {
                error!("update of pod {} rejected: {}", name, e);
                return LabelOutcome::Rejected { attempts: attempt };
            }
        }
    }

    error!(
        "gave up labeling pod {} after {} attempts",
        name, policy.max_attempts
    );
    LabelOutcome::GaveUp {
        attempts: policy.max_attempts,
    }
}
