//! pg-failover-operator: failover control for PostgreSQL clusters on Kubernetes
//!
//! The pod controller labels new database pods with their service role and
//! watches readiness so the cluster layer can react to a failed primary.
//! The failover module replaces a cluster's primary with a chosen replica
//! when a failover `Pgtask` asks for it.

pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod failover;
pub mod labels;
pub mod platform;
pub mod telemetry;

pub use crate::error::{Error, Result};
