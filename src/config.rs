//! Operator configuration
//!
//! Values come from command line flags or their environment variables
//! (see `main.rs`) and are checked once at startup.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::controller::RetryPolicy;
use crate::error::{Error, Result};
use crate::failover::FailoverStrategyKind;

/// Output format of the log subscriber
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "plain" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(Error::ConfigError(format!(
                "unknown log format '{other}' (expected text or json)"
            ))),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Text => f.write_str("text"),
            LogFormat::Json => f.write_str("json"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Namespace the pod controller watches and failovers run in
    pub namespace: String,
    /// Failover procedure used for new tasks
    pub strategy: FailoverStrategyKind,
    /// Retry policy of the role labeler
    pub retry: RetryPolicy,
    pub log_format: LogFormat,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            strategy: FailoverStrategyKind::default(),
            retry: RetryPolicy::default(),
            log_format: LogFormat::default(),
        }
    }
}

impl OperatorConfig {
    /// Build the labeler's retry policy.
    ///
    /// Without `conflicts_only` every write error is retried immediately and
    /// the delays are ignored.
    pub fn retry_policy(
        max_attempts: u32,
        conflicts_only: bool,
        base_delay_ms: u64,
        max_delay_ms: u64,
    ) -> RetryPolicy {
        if conflicts_only {
            RetryPolicy::on_conflict(
                max_attempts,
                Duration::from_millis(base_delay_ms),
                Duration::from_millis(max_delay_ms),
            )
        } else {
            RetryPolicy::immediate(max_attempts)
        }
    }

    /// Reject settings the controller cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.namespace.trim().is_empty() {
            return Err(Error::ConfigError("namespace must not be empty".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::ConfigError(
                "retry attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.base_delay > self.retry.max_delay {
            return Err(Error::ConfigError(format!(
                "retry base delay {:?} exceeds max delay {:?}",
                self.retry.base_delay, self.retry.max_delay
            )));
        }
        Ok(())
    }
}
