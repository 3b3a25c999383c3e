//! Working-copy staging and promotion for the journal file

use crate::core::{JournalError, Result};
use log::{debug, warn};
use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Files SQLite may leave next to a store after a crash.
const SIDECAR_SUFFIXES: [&str; 3] = ["-journal", "-wal", "-shm"];

/// `<canonical>.<suffix>`
pub fn working_copy_path(canonical: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(canonical.as_os_str());
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

fn sidecar_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Copy the canonical journal to `working` and give the copy `mode`.
///
/// Leftovers of an interrupted session are overwritten; a stale hot journal
/// next to the old working copy is removed first so SQLite cannot replay it
/// into the fresh copy.
pub fn stage_working_copy(canonical: &Path, working: &Path, mode: u32) -> Result<()> {
    remove_sidecars(working)?;

    fs::copy(canonical, working).map_err(|e| JournalError::StagingFailed {
        path: working.to_path_buf(),
        reason: format!("copy from '{}' failed: {}", canonical.display(), e),
    })?;

    set_mode(working, mode)?;
    debug!("Staged journal '{}' -> '{}'", canonical.display(), working.display());
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| {
        JournalError::StagingFailed {
            path: path.to_path_buf(),
            reason: format!("cannot set mode {:o}: {}", mode, e),
        }
    })
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

fn remove_sidecars(path: &Path) -> Result<()> {
    for suffix in SIDECAR_SUFFIXES {
        let sidecar = sidecar_path(path, suffix);
        match fs::remove_file(&sidecar) {
            Ok(()) => warn!("Removed stale '{}' from an interrupted session", sidecar.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(JournalError::StagingFailed {
                    path: path.to_path_buf(),
                    reason: format!("cannot remove '{}': {}", sidecar.display(), e),
                });
            }
        }
    }
    Ok(())
}

/// Replace the canonical journal with the working copy in one rename.
pub fn promote(working: &Path, canonical: &Path) -> Result<()> {
    fs::rename(working, canonical).map_err(|e| JournalError::PromotionFailed {
        path: working.to_path_buf(),
        reason: e.to_string(),
    })?;
    debug!("Promoted '{}' -> '{}'", working.display(), canonical.display());
    Ok(())
}

/// Delete the working copy, leaving the canonical journal as it was.
pub fn discard(working: &Path) -> Result<()> {
    match fs::remove_file(working) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(JournalError::StagingFailed {
            path: working.to_path_buf(),
            reason: format!("cannot remove working copy: {}", e),
        }),
    }
}
