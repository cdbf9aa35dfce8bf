//! Reconciliation controller for database pods
//!
//! Watches pod lifecycle events, keeps the routing label of each database
//! pod in line with its role, and signals readiness transitions of primaries.

pub mod events;
mod pod_controller;
pub mod readiness;
pub mod retry;
pub mod role_labeler;
pub mod triggers;

pub use events::{EventHandler, EventTranslator, InstanceEvent};
pub use pod_controller::{run_event_loop, PodController, PodEventHandler};
pub use readiness::{check_ready_status, database_readiness, has_database_container};
pub use retry::{RetryPolicy, DEFAULT_MAX_ATTEMPTS};
pub use role_labeler::{desired_service_selector, label_instance_role, LabelOutcome};
pub use triggers::{ClusterTriggers, LoggingTriggers};
