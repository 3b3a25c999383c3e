//! Statement execution with busy and schema-drift retries

use super::retry::{Retry, RetryPolicy};
use crate::core::{JournalError, Result, RetryPhase};
use crate::result::{QueryRows, ResultRow};
use crate::storage::{JournalStore, PreparedStatement, Step, StepCursor, StoreFault};
use log::{debug, error, trace, warn};
use std::time::Duration;

/// Receives the rows a statement produces.
pub(crate) trait RowSink {
    /// Drop whatever an earlier pass over the statement produced.
    fn restart(&mut self);

    /// Called once the statement compiled, before the first step.
    fn columns(&mut self, _column_count: usize) {}

    fn accept<C: StepCursor + ?Sized>(&mut self, cursor: &C, column_count: usize) -> Result<()>;
}

#[derive(Debug, Default)]
pub(crate) struct RowCollector {
    column_count: usize,
    rows: Vec<ResultRow>,
}

impl RowCollector {
    pub(crate) fn into_rows(self) -> QueryRows {
        QueryRows::new(self.column_count, self.rows)
    }
}

impl RowSink for RowCollector {
    fn restart(&mut self) {
        self.rows.clear();
    }

    fn columns(&mut self, column_count: usize) {
        self.column_count = column_count;
    }

    fn accept<C: StepCursor + ?Sized>(&mut self, cursor: &C, column_count: usize) -> Result<()> {
        let row = ResultRow::from_cursor(cursor, column_count)?;
        self.rows.try_reserve(1)?;
        self.rows.push(row);
        Ok(())
    }
}

/// Sink for mutations: rows are stepped through and dropped.
pub(crate) struct Discard;

impl RowSink for Discard {
    fn restart(&mut self) {}

    fn accept<C: StepCursor + ?Sized>(&mut self, _cursor: &C, _column_count: usize) -> Result<()> {
        Ok(())
    }
}

/// How one compile/step/finalize pass ended.
enum Pass {
    Finished(Result<()>),
    SchemaChanged,
}

/// How the step loop of one pass ended.
enum StepEnd {
    Done,
    Error(String),
    Contention(usize),
    Aborted(JournalError),
}

pub(crate) struct StatementExecutor<'a, S: JournalStore> {
    store: &'a S,
    busy: RetryPolicy,
    schema: RetryPolicy,
}

impl<'a, S: JournalStore> StatementExecutor<'a, S> {
    pub(crate) fn new(store: &'a S, busy: RetryPolicy, schema: RetryPolicy) -> Self {
        Self { store, busy, schema }
    }

    pub(crate) fn query(&self, sql: &str) -> Result<QueryRows> {
        let mut collector = RowCollector::default();
        self.execute(sql, &mut collector)?;
        Ok(collector.into_rows())
    }

    /// Run a write statement and return the store's last inserted row id.
    /// Blank statements return `0` without touching the store.
    pub(crate) fn mutate(&self, sql: &str) -> Result<i64> {
        if sql.trim().is_empty() {
            return Ok(0);
        }
        self.execute(sql, &mut Discard)?;
        Ok(self.store.last_insert_rowid())
    }

    pub(crate) fn execute<K: RowSink>(&self, sql: &str, sink: &mut K) -> Result<()> {
        let outcome = self.schema.run(|attempt| {
            if attempt > 1 {
                debug!("Retrying now: {}", sql);
            }
            sink.restart();
            match self.run_pass(sql, sink) {
                Pass::Finished(result) => Retry::Done(result),
                Pass::SchemaChanged => {
                    error!("Schema change detected on statement: {}", sql);
                    Retry::Again
                }
            }
        });

        match outcome {
            Ok(result) => result,
            Err(exhausted) => {
                error!("Retry count has reached its maximum. Aborting statement: {}", sql);
                Err(JournalError::SchemaDrift { attempts: exhausted.attempts })
            }
        }
    }

    fn run_pass<K: RowSink>(&self, sql: &str, sink: &mut K) -> Pass {
        let compiled = self.busy.run(|attempt| {
            if attempt > 1 {
                debug!("compile: BUSY counter: {}", attempt - 1);
            }
            match self.store.compile(sql) {
                Err(StoreFault::Busy) => Retry::Again,
                other => Retry::Done(other),
            }
        });

        let mut stmt = match compiled {
            Ok(Ok(stmt)) => stmt,
            Ok(Err(fault)) => {
                warn!("compile error: {} - on statement {}", fault, sql);
                return Pass::Finished(Err(JournalError::Statement(fault.to_string())));
            }
            Err(exhausted) => {
                error!("Gave up waiting for lock to clear on statement {}", sql);
                return Pass::Finished(Err(JournalError::Contention {
                    phase: RetryPhase::Compile,
                    attempts: exhausted.attempts,
                }));
            }
        };

        let column_count = stmt.column_count();
        sink.columns(column_count);
        let stepped = step_all(&mut stmt, column_count, sink, self.busy, sql);

        if let StepEnd::Aborted(err) = stepped {
            if let Err(fault) = stmt.finalize() {
                warn!("finalize after abort failed: {} - on statement: {}", fault, sql);
            }
            return Pass::Finished(Err(err));
        }

        match (stepped, stmt.finalize()) {
            (_, Err(StoreFault::SchemaChanged)) => Pass::SchemaChanged,
            (StepEnd::Done, Ok(())) => Pass::Finished(Ok(())),
            (StepEnd::Done, Err(fault)) => {
                error!("finalize error: {} - on statement: {}", fault, sql);
                Pass::Finished(Err(JournalError::Statement(fault.to_string())))
            }
            (StepEnd::Error(msg), _) => {
                error!("step error: {} - on statement: {}", msg, sql);
                Pass::Finished(Err(JournalError::Statement(msg)))
            }
            (StepEnd::Contention(attempts), _) => Pass::Finished(Err(JournalError::Contention {
                phase: RetryPhase::Step,
                attempts,
            })),
            (StepEnd::Aborted(err), _) => Pass::Finished(Err(err)),
        }
    }
}

/// Step `stmt` to completion. A busy step restarts result production from
/// the first row, so the sink is reset before stepping resumes.
fn step_all<P, K>(stmt: &mut P, column_count: usize, sink: &mut K, busy: RetryPolicy, sql: &str) -> StepEnd
where
    P: PreparedStatement,
    K: RowSink,
{
    let mut busy_budget = busy.budget();
    let mut misuse_budget = busy.interval(Duration::ZERO).budget();
    let mut cursor = stmt.cursor();

    loop {
        match cursor.step() {
            Step::Row => {
                if let Err(err) = sink.accept(&cursor, column_count) {
                    return StepEnd::Aborted(err);
                }
            }
            Step::Done => return StepEnd::Done,
            Step::Error(msg) => return StepEnd::Error(msg),
            Step::Busy => {
                if !busy_budget.record_failure() {
                    error!("Busy counter has reached its maximum. Aborting statement: {}", sql);
                    return StepEnd::Contention(busy_budget.failures());
                }
                trace!("step: BUSY counter: {}", busy_budget.failures());
                drop(cursor);
                sink.restart();
                cursor = stmt.cursor();
            }
            Step::Misuse => {
                error!("step: MISUSE on statement: {}", sql);
                if !misuse_budget.record_failure() {
                    return StepEnd::Error(StoreFault::Misuse.to_string());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::scripted::{ScriptStep, ScriptedStore, row};

    fn fast(max_busy: usize, max_schema: usize) -> (RetryPolicy, RetryPolicy) {
        (
            RetryPolicy::new(max_busy, Duration::ZERO),
            RetryPolicy::new(max_schema, Duration::ZERO),
        )
    }

    fn executor(store: &ScriptedStore) -> StatementExecutor<'_, ScriptedStore> {
        let (busy, schema) = fast(120, 10);
        StatementExecutor::new(store, busy, schema)
    }

    #[test]
    fn test_query_collects_every_row() {
        let store = ScriptedStore::new(2);
        store
            .push_step(row(&[Some("1"), Some("a.txt")]))
            .push_step(row(&[Some("2"), None]))
            .push_step(ScriptStep::Done);

        let rows = executor(&store).query("SELECT key, path FROM metadata").unwrap();
        assert_eq!(rows.row_count(), 2);
        assert_eq!(rows.column_count, 2);
        assert_eq!(rows.rows[0].get(1), Some("a.txt"));
        assert!(rows.rows[1].is_null(1));
        assert_eq!(store.finalize_calls.get(), 1);
    }

    #[test]
    fn test_query_with_no_rows_is_ok_and_empty() {
        let store = ScriptedStore::new(1);
        let rows = executor(&store).query("SELECT key FROM metadata").unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_compile_busy_is_retried_then_succeeds() {
        let store = ScriptedStore::new(1);
        store
            .push_compile(Err(StoreFault::Busy))
            .push_compile(Err(StoreFault::Busy))
            .push_step(row(&[Some("7")]));

        let rows = executor(&store).query("SELECT 7").unwrap();
        assert_eq!(rows.row_count(), 1);
        assert_eq!(store.compile_calls.get(), 3);
    }

    #[test]
    fn test_compile_always_busy_gives_up_after_exact_attempts() {
        let store = ScriptedStore::new(1);
        store.compile_always(Err(StoreFault::Busy));

        let err = executor(&store).query("SELECT 1").unwrap_err();
        match err {
            JournalError::Contention { phase: RetryPhase::Compile, attempts } => assert_eq!(attempts, 120),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(store.compile_calls.get(), 120);
        assert_eq!(store.finalize_calls.get(), 0);
    }

    #[test]
    fn test_step_always_busy_gives_up_after_exact_attempts() {
        let store = ScriptedStore::new(1);
        store.step_always(ScriptStep::Busy);

        let err = executor(&store).mutate("INSERT INTO metadata VALUES (1)").unwrap_err();
        match err {
            JournalError::Contention { phase: RetryPhase::Step, attempts } => assert_eq!(attempts, 120),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(store.step_calls.get(), 120);
        assert_eq!(store.finalize_calls.get(), 1);
    }

    #[test]
    fn test_busy_step_restarts_collected_rows() {
        let store = ScriptedStore::new(1);
        store
            .push_step(row(&[Some("1")]))
            .push_step(ScriptStep::Busy)
            .push_step(row(&[Some("1")]))
            .push_step(row(&[Some("2")]))
            .push_step(ScriptStep::Done);

        let rows = executor(&store).query("SELECT key FROM metadata").unwrap();
        let keys: Vec<_> = rows.iter().map(|r| r.get(0).unwrap().to_string()).collect();
        assert_eq!(keys, vec!["1", "2"]);
    }

    #[test]
    fn test_schema_change_is_retried_then_succeeds() {
        let store = ScriptedStore::new(1);
        store
            .push_step(row(&[Some("stale")]))
            .push_step(ScriptStep::Done)
            .push_finalize(Err(StoreFault::SchemaChanged))
            .push_step(row(&[Some("fresh")]))
            .push_step(ScriptStep::Done);

        let rows = executor(&store).query("SELECT path FROM metadata").unwrap();
        assert_eq!(rows.row_count(), 1);
        assert_eq!(rows.rows[0].get(0), Some("fresh"));
        assert_eq!(store.compile_calls.get(), 2);
    }

    #[test]
    fn test_schema_always_changed_gives_up_after_exact_attempts() {
        let store = ScriptedStore::new(1);
        store.finalize_always(Err(StoreFault::SchemaChanged));

        let err = executor(&store).query("SELECT 1").unwrap_err();
        match err {
            JournalError::SchemaDrift { attempts } => assert_eq!(attempts, 10),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(store.compile_calls.get(), 10);
        assert_eq!(store.finalize_calls.get(), 10);
    }

    #[test]
    fn test_busy_and_schema_budgets_are_independent() {
        let store = ScriptedStore::new(1);
        let (busy, schema) = fast(3, 2);
        store
            .push_compile(Err(StoreFault::Busy))
            .push_compile(Err(StoreFault::Busy))
            .push_compile(Ok(()))
            .push_finalize(Err(StoreFault::SchemaChanged))
            .push_compile(Err(StoreFault::Busy))
            .push_compile(Err(StoreFault::Busy))
            .push_compile(Ok(()));

        StatementExecutor::new(&store, busy, schema).mutate("UPDATE metadata SET inode = 1").unwrap();
        assert_eq!(store.compile_calls.get(), 6);
    }

    #[test]
    fn test_step_error_fails_statement() {
        let store = ScriptedStore::new(1);
        store.push_step(ScriptStep::Error("constraint failed".into()));

        let err = executor(&store).mutate("INSERT INTO metadata VALUES (1)").unwrap_err();
        match err {
            JournalError::Statement(msg) => assert_eq!(msg, "constraint failed"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(store_still_usable(&store));
    }

    fn store_still_usable(store: &ScriptedStore) -> bool {
        store.reset_counters();
        executor(store).query("SELECT 1").is_ok() && store.compile_calls.get() == 1
    }

    #[test]
    fn test_compile_error_fails_without_retry() {
        let store = ScriptedStore::new(1);
        store.push_compile(Err(StoreFault::Other("no such table: metadata".into())));

        let err = executor(&store).query("SELECT key FROM metadata").unwrap_err();
        assert!(matches!(err, JournalError::Statement(_)));
        assert_eq!(store.compile_calls.get(), 1);
    }

    #[test]
    fn test_misuse_is_logged_and_stepping_continues() {
        let store = ScriptedStore::new(1);
        store
            .push_step(ScriptStep::Misuse)
            .push_step(row(&[Some("1")]))
            .push_step(ScriptStep::Done);

        let rows = executor(&store).query("SELECT 1").unwrap();
        assert_eq!(rows.row_count(), 1);
    }

    #[test]
    fn test_persistent_misuse_is_bounded() {
        let store = ScriptedStore::new(1);
        store.step_always(ScriptStep::Misuse);
        let (busy, schema) = fast(4, 10);

        let err = StatementExecutor::new(&store, busy, schema).query("SELECT 1").unwrap_err();
        assert!(matches!(err, JournalError::Statement(_)));
        assert_eq!(store.step_calls.get(), 4);
    }

    #[test]
    fn test_blank_mutation_touches_nothing() {
        let store = ScriptedStore::new(0);
        store.set_last_rowid(99);

        assert_eq!(executor(&store).mutate("").unwrap(), 0);
        assert_eq!(executor(&store).mutate("  \n\t ").unwrap(), 0);
        assert_eq!(store.compile_calls.get(), 0);
        assert_eq!(store.step_calls.get(), 0);
    }

    #[test]
    fn test_mutation_returns_last_rowid_and_discards_rows() {
        let store = ScriptedStore::new(1);
        store.set_last_rowid(41).push_step(row(&[Some("ignored")]));

        assert_eq!(executor(&store).mutate("INSERT INTO metadata VALUES (1)").unwrap(), 41);
        assert_eq!(store.step_calls.get(), 2);
    }

    /// Sink that fails to store the first row it is given.
    struct ExhaustedSink;

    impl RowSink for ExhaustedSink {
        fn restart(&mut self) {}

        fn accept<C: StepCursor + ?Sized>(&mut self, _cursor: &C, _column_count: usize) -> Result<()> {
            Err(JournalError::Allocation("memory allocation failed".into()))
        }
    }

    #[test]
    fn test_allocation_failure_aborts_without_retry() {
        let store = ScriptedStore::new(1);
        store
            .push_step(row(&[Some("1")]))
            .push_step(ScriptStep::Done)
            .finalize_always(Err(StoreFault::SchemaChanged));

        let err = executor(&store)
            .execute("SELECT key FROM metadata", &mut ExhaustedSink)
            .unwrap_err();

        assert!(matches!(err, JournalError::Allocation(_)));
        assert_eq!(store.compile_calls.get(), 1);
        assert_eq!(store.step_calls.get(), 1);
        assert_eq!(store.finalize_calls.get(), 1);
    }
}
