// ============================================================================
// SyncJournal Library
// ============================================================================

pub mod core;
pub mod storage;
pub mod result;
pub mod executor;
pub mod facade;
pub mod config;
pub mod session;

// Re-export main types for convenience
pub use facade::Journal;
pub use config::JournalConfig;
pub use core::{JournalError, Result, RetryPhase, Severity};
pub use result::{QueryRows, ResultRow};
pub use executor::RetryPolicy;
pub use storage::{CheckReport, Quarantine, check_journal, working_copy_path};
pub use session::{SessionOutcome, SessionReport, SessionRunner, SyncEngine};
