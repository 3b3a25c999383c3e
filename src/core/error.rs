use std::path::PathBuf;
use thiserror::Error;

/// Which phase ran out of busy retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPhase {
    /// Integrity check of the canonical journal during open.
    Check,
    Compile,
    Step,
}

impl std::fmt::Display for RetryPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryPhase::Check => write!(f, "check"),
            RetryPhase::Compile => write!(f, "compile"),
            RetryPhase::Step => write!(f, "step"),
        }
    }
}

/// Whether the journal remains usable after an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The statement failed; later statements may still succeed.
    Recoverable,
    /// The open, promotion or configuration step failed outright.
    Fatal,
}

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("Failed to create journal '{}': {reason}", path.display())]
    CreateFailed { path: PathBuf, reason: String },

    #[error("Failed to stage working copy '{}': {reason}", path.display())]
    StagingFailed { path: PathBuf, reason: String },

    #[error("Gave up waiting for lock to clear after {attempts} {phase} attempts")]
    Contention { phase: RetryPhase, attempts: usize },

    #[error("Schema kept changing, statement abandoned after {attempts} attempts")]
    SchemaDrift { attempts: usize },

    #[error("Statement failed: {0}")]
    Statement(String),

    #[error("Allocation failed while building result: {0}")]
    Allocation(String),

    #[error("Failed to promote working copy '{}': {reason}", path.display())]
    PromotionFailed { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Sync engine error: {0}")]
    Engine(String),

    #[error("Session limit of {0} reached while the engine still requested a repeat")]
    SessionLimit(usize),
}

impl JournalError {
    pub fn severity(&self) -> Severity {
        match self {
            JournalError::Contention { .. }
            | JournalError::SchemaDrift { .. }
            | JournalError::Statement(_)
            | JournalError::Allocation(_) => Severity::Recoverable,
            _ => Severity::Fatal,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.severity() == Severity::Recoverable
    }
}

pub type Result<T> = std::result::Result<T, JournalError>;

impl From<std::collections::TryReserveError> for JournalError {
    fn from(err: std::collections::TryReserveError) -> Self {
        Self::Allocation(err.to_string())
    }
}
