//! First-run detection

use super::journal::Journal;
use crate::result::QueryRows;
use crate::storage::JournalStore;
use log::warn;

pub(crate) const METADATA_EXISTS: &str =
    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'metadata';";

pub(crate) const METADATA_COUNT: &str = "SELECT COUNT(key) FROM metadata LIMIT 1 OFFSET 0;";

/// `true` if the journal has never been populated.
///
/// A query that fails counts as "not empty": an unreadable journal must not
/// be mistaken for a first run.
pub(crate) fn is_empty<S: JournalStore>(journal: &Journal<S>) -> bool {
    match journal.query(METADATA_EXISTS) {
        Ok(rows) if count_is_zero(&rows) => return true,
        Ok(_) => {}
        Err(err) => {
            warn!("Cannot inspect journal '{}': {}", journal.canonical_path().display(), err);
            return false;
        }
    }

    match journal.query(METADATA_COUNT) {
        Ok(rows) => count_is_zero(&rows),
        Err(err) => {
            warn!("Cannot count journal metadata '{}': {}", journal.canonical_path().display(), err);
            false
        }
    }
}

fn count_is_zero(rows: &QueryRows) -> bool {
    match rows.first() {
        None => true,
        Some(row) => row.get(0) == Some("0"),
    }
}
