pub mod engine;
pub mod integrity;
pub mod sqlite;
pub mod staging;
#[cfg(test)]
pub(crate) mod scripted;

pub use engine::{JournalStore, PreparedStatement, Step, StepCursor, StoreFault};
pub use integrity::{CheckReport, Quarantine, check_journal};
pub use sqlite::{STORE_MAGIC, SqliteStore};
pub use staging::working_copy_path;
