//! Custom Resource Definitions for the failover operator
//!
//! Pods and Deployments are core Kubernetes kinds; the only custom kind the
//! failover subsystem touches is the Pgtask that carries a failover request.

mod pgtask;

pub use pgtask::{FailoverPhase, Pgtask, PgtaskSpec, PgtaskStatus, TASK_TYPE_FAILOVER};
