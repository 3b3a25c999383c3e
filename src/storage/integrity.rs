//! Journal integrity check: validate, quarantine, recreate

use super::engine::StoreFault;
use super::sqlite::{STORE_MAGIC, SqliteStore};
use crate::core::{JournalError, Result, RetryPhase};
use crate::executor::{Retry, RetryPolicy};
use log::{debug, error, warn};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{ErrorKind, Read};
use std::path::Path;

/// Why an existing journal file was deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Quarantine {
    /// The file does not start with the expected store header.
    VersionMismatch,
    /// The header matched but the store could not be opened or checked.
    Corrupted,
}

/// What the integrity check found at the journal path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CheckReport {
    /// A valid store was already there and was left untouched.
    Intact,
    /// Nothing usable was there; a new empty store was created.
    Created,
    /// A bad file was deleted and replaced by a new empty store.
    Recreated(Quarantine),
}

impl CheckReport {
    /// `true` when the store at the path is new and holds no prior state.
    pub fn is_fresh(&self) -> bool {
        !matches!(self, CheckReport::Intact)
    }
}

/// Make sure `path` holds a usable journal store.
///
/// Files that are not a store, or whose content SQLite reports as damaged,
/// are deleted and replaced by an empty store. A valid store is never
/// deleted: while another connection holds its lock the check is retried
/// under `busy`, and any other failure to verify it is returned with the
/// file left in place.
pub fn check_journal(path: &Path, busy: RetryPolicy) -> Result<CheckReport> {
    let quarantined = match read_header(path) {
        None => None,
        Some(header) if header.as_slice() == STORE_MAGIC.as_slice() => {
            match verify(path, busy)? {
                None => return Ok(CheckReport::Intact),
                Some(reason) => {
                    warn!("Journal '{}' corrupted ({}), removing", path.display(), reason);
                    quarantine(path)?;
                    Some(Quarantine::Corrupted)
                }
            }
        }
        Some(_) => {
            warn!("Journal '{}' has a store version mismatch, removing", path.display());
            quarantine(path)?;
            Some(Quarantine::VersionMismatch)
        }
    };

    create_store(path)?;
    Ok(match quarantined {
        Some(reason) => CheckReport::Recreated(reason),
        None => CheckReport::Created,
    })
}

/// `None` when the store is sound, `Some(reason)` when it is damaged.
fn verify(path: &Path, busy: RetryPolicy) -> Result<Option<String>> {
    let outcome = busy.run(|attempt| {
        if attempt > 1 {
            debug!("verify: BUSY counter: {}", attempt - 1);
        }
        match SqliteStore::verify(path) {
            Err(StoreFault::Busy) => Retry::Again,
            other => Retry::Done(other),
        }
    });

    match outcome {
        Ok(Ok(())) => Ok(None),
        Ok(Err(StoreFault::Corrupt(reason))) => Ok(Some(reason)),
        Ok(Err(fault)) => Err(JournalError::StagingFailed {
            path: path.to_path_buf(),
            reason: format!("cannot verify journal: {}", fault),
        }),
        Err(exhausted) => {
            error!("Gave up waiting for lock to clear on journal '{}'", path.display());
            Err(JournalError::Contention {
                phase: RetryPhase::Check,
                attempts: exhausted.attempts,
            })
        }
    }
}

/// Up to the first 16 bytes of the file, `None` if it cannot be read.
fn read_header(path: &Path) -> Option<Vec<u8>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) => {
            debug!("Journal '{}' not readable ({}), will create", path.display(), err);
            return None;
        }
    };

    let mut header = Vec::with_capacity(STORE_MAGIC.len());
    match file.take(STORE_MAGIC.len() as u64).read_to_end(&mut header) {
        Ok(_) => Some(header),
        Err(err) => {
            debug!("Failed to read journal header '{}': {}", path.display(), err);
            None
        }
    }
}

fn quarantine(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(JournalError::CreateFailed {
            path: path.to_path_buf(),
            reason: format!("cannot remove bad journal: {}", err),
        }),
    }
}

fn create_store(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| JournalError::CreateFailed {
            path: path.to_path_buf(),
            reason: format!("cannot create journal directory: {}", e),
        })?;
    }

    SqliteStore::create(path).map_err(|fault| JournalError::CreateFailed {
        path: path.to_path_buf(),
        reason: fault.to_string(),
    })
}
