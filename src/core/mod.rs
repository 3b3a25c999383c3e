pub mod error;

pub use error::{JournalError, Result, RetryPhase, Severity};
