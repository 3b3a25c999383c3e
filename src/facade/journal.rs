use super::probe;
use crate::config::JournalConfig;
use crate::core::{JournalError, Result};
use crate::executor::StatementExecutor;
use crate::result::QueryRows;
use crate::storage::staging::{self, stage_working_copy, working_copy_path};
use crate::storage::{CheckReport, JournalStore, SqliteStore, StoreFault, check_journal};
use log::{info, warn};
use std::path::{Path, PathBuf};

/// An open journal session.
///
/// Owns the canonical journal path, the live handle on the working copy and
/// whether the journal held any state before this session. Every statement
/// goes to the working copy; the canonical file only changes on [`commit`].
///
/// Dropping a `Journal` without committing or discarding leaves both files
/// in place, which is exactly what a crash leaves behind.
///
/// [`commit`]: Journal::commit
pub struct Journal<S = SqliteStore> {
    canonical: PathBuf,
    working: PathBuf,
    store: S,
    config: JournalConfig,
    check: CheckReport,
    existed: bool,
}

impl Journal<SqliteStore> {
    /// Validate (or recreate) the journal at `path`, stage a working copy
    /// next to it and open that copy.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use syncjournal::{Journal, JournalConfig};
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let journal = Journal::open("/data/.sync_journal.db", JournalConfig::default())?;
    /// if !journal.existed() {
    ///     journal.mutate("CREATE TABLE metadata (key INTEGER PRIMARY KEY, path TEXT)")?;
    /// }
    /// let rows = journal.query("SELECT key, path FROM metadata")?;
    /// println!("{} entries", rows.row_count());
    /// journal.commit()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn open<P: AsRef<Path>>(path: P, config: JournalConfig) -> Result<Self> {
        config.validate()?;
        let canonical = path.as_ref().to_path_buf();

        let check = check_journal(&canonical, config.busy_retry)?;

        let working = working_copy_path(&canonical, &config.staging_suffix);
        stage_working_copy(&canonical, &working, config.working_copy_mode)?;
        let store = open_working_copy(&working, |path| SqliteStore::open(path))?;

        Ok(Self::from_parts(canonical, working, store, config, check))
    }

    /// Close the live handle and atomically replace the canonical journal
    /// with the working copy.
    pub fn commit(self) -> Result<()> {
        let Journal { canonical, working, store, .. } = self;
        store.close().map_err(|fault| JournalError::PromotionFailed {
            path: working.clone(),
            reason: format!("cannot close working copy: {}", fault),
        })?;
        staging::promote(&working, &canonical)
    }

    /// Close the live handle and delete the working copy. The canonical
    /// journal is left exactly as it was when the session opened.
    pub fn discard(self) -> Result<()> {
        let Journal { working, store, .. } = self;
        if let Err(fault) = store.close() {
            warn!("Closing working copy '{}' failed: {}", working.display(), fault);
        }
        staging::discard(&working)
    }
}

/// Open the staged copy; a copy that cannot be opened is removed again.
fn open_working_copy<S>(
    working: &Path,
    open: impl FnOnce(&Path) -> std::result::Result<S, StoreFault>,
) -> Result<S> {
    open(working).map_err(|fault| {
        if let Err(err) = staging::discard(working) {
            warn!("Removing unusable working copy '{}' failed: {}", working.display(), err);
        }
        JournalError::StagingFailed {
            path: working.to_path_buf(),
            reason: format!("cannot open working copy: {}", fault),
        }
    })
}

impl<S: JournalStore> Journal<S> {
    pub(crate) fn from_parts(
        canonical: PathBuf,
        working: PathBuf,
        store: S,
        config: JournalConfig,
        check: CheckReport,
    ) -> Self {
        let mut journal = Self {
            canonical,
            working,
            store,
            config,
            check,
            existed: false,
        };
        journal.existed = !probe::is_empty(&journal);
        if !journal.existed {
            info!("Journal '{}' doesn't exist yet", journal.canonical.display());
        }
        journal
    }

    fn executor(&self) -> StatementExecutor<'_, S> {
        StatementExecutor::new(&self.store, self.config.busy_retry, self.config.schema_retry)
    }

    /// Run a row-returning statement.
    ///
    /// `Ok` with no rows means the statement matched nothing; an `Err`
    /// means it could not be executed at all.
    pub fn query(&self, statement: &str) -> Result<QueryRows> {
        self.executor().query(statement)
    }

    /// Run a write statement and return the row id of the most recent insert
    /// on this journal, whether or not `statement` itself inserted.
    ///
    /// Blank statements are a no-op returning `0`.
    pub fn mutate(&self, statement: &str) -> Result<i64> {
        self.executor().mutate(statement)
    }

    /// Alias for [`Journal::mutate`].
    pub fn insert(&self, statement: &str) -> Result<i64> {
        self.mutate(statement)
    }

    /// `true` if the journal holds no metadata rows right now.
    pub fn is_empty(&self) -> bool {
        probe::is_empty(self)
    }

    /// `true` if the journal held metadata when this session opened it.
    pub fn existed(&self) -> bool {
        self.existed
    }

    pub fn check_report(&self) -> CheckReport {
        self.check
    }

    pub fn canonical_path(&self) -> &Path {
        &self.canonical
    }

    pub fn working_path(&self) -> &Path {
        &self.working
    }

    pub fn config(&self) -> &JournalConfig {
        &self.config
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &S {
        &self.store
    }
}
