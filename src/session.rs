//! Sync session loop: open, sync, promote, repeat while the engine asks

use crate::config::JournalConfig;
use crate::core::{JournalError, Result};
use crate::facade::Journal;
use std::path::{Path, PathBuf};
use tracing::{Level, event, info_span};

/// What the sync engine wants after a successful session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Done,
    /// Another session is needed, e.g. files changed while syncing.
    Repeat,
}

/// The synchronization engine driven by [`SessionRunner`].
pub trait SyncEngine {
    fn sync(&mut self, journal: &Journal) -> Result<SessionOutcome>;
}

impl<F> SyncEngine for F
where
    F: FnMut(&Journal) -> Result<SessionOutcome>,
{
    fn sync(&mut self, journal: &Journal) -> Result<SessionOutcome> {
        self(journal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionReport {
    /// Sessions run, including the final one.
    pub sessions: usize,
    /// Whether the journal was empty when the first session opened it.
    pub first_run: bool,
}

pub struct SessionRunner {
    journal_path: PathBuf,
    config: JournalConfig,
}

impl SessionRunner {
    pub fn new<P: AsRef<Path>>(journal_path: P, config: JournalConfig) -> Self {
        Self {
            journal_path: journal_path.as_ref().to_path_buf(),
            config,
        }
    }

    pub fn journal_path(&self) -> &Path {
        &self.journal_path
    }

    /// Run sessions until the engine returns [`SessionOutcome::Done`].
    ///
    /// Each successful session promotes its working copy. When the engine
    /// fails, the working copy is discarded and the error returned, so the
    /// canonical journal keeps the state of the last successful session.
    pub fn run<E: SyncEngine + ?Sized>(&self, engine: &mut E) -> Result<SessionReport> {
        let mut sessions = 0;
        let mut first_run = None;

        loop {
            if let Some(limit) = self.config.max_sessions {
                if sessions >= limit {
                    event!(Level::ERROR, limit, "session limit reached");
                    return Err(JournalError::SessionLimit(limit));
                }
            }
            sessions += 1;

            let span = info_span!(
                "sync_session",
                session = sessions,
                journal = %self.journal_path.display()
            );
            let _guard = span.enter();

            let journal = Journal::open(&self.journal_path, self.config.clone())?;
            let first = *first_run.get_or_insert(!journal.existed());
            event!(Level::DEBUG, existed = journal.existed(), "journal opened");

            let outcome = match engine.sync(&journal) {
                Ok(outcome) => outcome,
                Err(err) => {
                    event!(Level::ERROR, error = %err, "sync engine failed, discarding working copy");
                    if let Err(discard_err) = journal.discard() {
                        event!(Level::WARN, error = %discard_err, "discarding working copy failed");
                    }
                    return Err(err);
                }
            };

            journal.commit()?;
            event!(Level::INFO, ?outcome, "session committed");

            match outcome {
                SessionOutcome::Done => {
                    return Ok(SessionReport { sessions, first_run: first });
                }
                SessionOutcome::Repeat => {
                    event!(Level::INFO, "restarting sync, another sync is needed");
                }
            }
        }
    }
}
