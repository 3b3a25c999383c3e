use crate::core::{JournalError, Result};
use crate::executor::RetryPolicy;
use std::time::Duration;

/// Journal configuration
///
/// Defaults reproduce the classic journal behaviour: 120 busy retries
/// 100 ms apart, 10 schema retries, a `.ctmp` working copy with mode 0644.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalConfig {
    /// Retry policy for "database is locked" during compile and step
    pub busy_retry: RetryPolicy,

    /// Retry policy for "schema changed" reported at finalize
    pub schema_retry: RetryPolicy,

    /// Suffix appended (after a dot) to the journal path for the working copy
    pub staging_suffix: String,

    /// Permission bits given to the working copy
    pub working_copy_mode: u32,

    /// Upper bound on back-to-back sessions run by the session runner
    pub max_sessions: Option<usize>,
}

impl JournalConfig {
    pub fn new() -> Self {
        Self {
            busy_retry: RetryPolicy::BUSY,
            schema_retry: RetryPolicy::SCHEMA,
            staging_suffix: "ctmp".to_string(),
            working_copy_mode: 0o644,
            max_sessions: None,
        }
    }

    /// Set the busy retry policy
    pub fn busy_retry(mut self, policy: RetryPolicy) -> Self {
        self.busy_retry = policy;
        self
    }

    /// Set the schema retry policy
    pub fn schema_retry(mut self, policy: RetryPolicy) -> Self {
        self.schema_retry = policy;
        self
    }

    /// Set the number of busy attempts
    pub fn busy_attempts(mut self, attempts: usize) -> Self {
        self.busy_retry.max_attempts = attempts;
        self
    }

    /// Set the number of schema attempts
    pub fn schema_attempts(mut self, attempts: usize) -> Self {
        self.schema_retry.max_attempts = attempts;
        self
    }

    /// Set the pause between busy attempts
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.busy_retry.interval = interval;
        self
    }

    /// Set the working copy suffix
    pub fn staging_suffix(mut self, suffix: &str) -> Self {
        self.staging_suffix = suffix.to_string();
        self
    }

    /// Set the working copy permission bits
    pub fn working_copy_mode(mut self, mode: u32) -> Self {
        self.working_copy_mode = mode;
        self
    }

    /// Set the session limit
    pub fn max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = Some(max);
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.busy_retry.max_attempts == 0 {
            return Err(JournalError::Config("busy max_attempts must be > 0".to_string()));
        }

        if self.schema_retry.max_attempts == 0 {
            return Err(JournalError::Config("schema max_attempts must be > 0".to_string()));
        }

        if self.staging_suffix.is_empty() {
            return Err(JournalError::Config("staging suffix cannot be empty".to_string()));
        }

        if self.staging_suffix.contains(['/', '\\']) {
            return Err(JournalError::Config(format!(
                "staging suffix '{}' must not contain a path separator",
                self.staging_suffix
            )));
        }

        if self.working_copy_mode > 0o7777 {
            return Err(JournalError::Config(format!(
                "working copy mode {:o} is not a permission mask",
                self.working_copy_mode
            )));
        }

        if self.max_sessions == Some(0) {
            return Err(JournalError::Config("max_sessions must be > 0".to_string()));
        }

        Ok(())
    }
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self::new()
    }
}
