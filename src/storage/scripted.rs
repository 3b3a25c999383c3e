//! Scripted store for exercising the retry executor without SQLite.

use super::engine::{JournalStore, PreparedStatement, Step, StepCursor, StoreFault};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

/// Queue of scripted results; once drained, `fallback` is returned forever.
struct Script<T: Clone> {
    queue: VecDeque<T>,
    fallback: T,
}

impl<T: Clone> Script<T> {
    fn new(fallback: T) -> Self {
        Self { queue: VecDeque::new(), fallback }
    }

    fn next(&mut self) -> T {
        self.queue.pop_front().unwrap_or_else(|| self.fallback.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ScriptStep {
    Row(Vec<Option<String>>),
    Done,
    Busy,
    Misuse,
    Error(String),
}

pub(crate) struct ScriptedStore {
    columns: usize,
    compile: RefCell<Script<Result<(), StoreFault>>>,
    steps: RefCell<Script<ScriptStep>>,
    finalize: RefCell<Script<Result<(), StoreFault>>>,
    pub(crate) compile_calls: Cell<usize>,
    pub(crate) step_calls: Cell<usize>,
    pub(crate) finalize_calls: Cell<usize>,
    last_rowid: Cell<i64>,
}

impl ScriptedStore {
    pub(crate) fn new(columns: usize) -> Self {
        Self {
            columns,
            compile: RefCell::new(Script::new(Ok(()))),
            steps: RefCell::new(Script::new(ScriptStep::Done)),
            finalize: RefCell::new(Script::new(Ok(()))),
            compile_calls: Cell::new(0),
            step_calls: Cell::new(0),
            finalize_calls: Cell::new(0),
            last_rowid: Cell::new(0),
        }
    }

    pub(crate) fn push_compile(&self, result: Result<(), StoreFault>) -> &Self {
        self.compile.borrow_mut().queue.push_back(result);
        self
    }

    pub(crate) fn compile_always(&self, result: Result<(), StoreFault>) -> &Self {
        self.compile.borrow_mut().fallback = result;
        self
    }

    pub(crate) fn push_step(&self, step: ScriptStep) -> &Self {
        self.steps.borrow_mut().queue.push_back(step);
        self
    }

    pub(crate) fn step_always(&self, step: ScriptStep) -> &Self {
        self.steps.borrow_mut().fallback = step;
        self
    }

    pub(crate) fn push_finalize(&self, result: Result<(), StoreFault>) -> &Self {
        self.finalize.borrow_mut().queue.push_back(result);
        self
    }

    pub(crate) fn finalize_always(&self, result: Result<(), StoreFault>) -> &Self {
        self.finalize.borrow_mut().fallback = result;
        self
    }

    pub(crate) fn set_last_rowid(&self, rowid: i64) -> &Self {
        self.last_rowid.set(rowid);
        self
    }

    pub(crate) fn reset_counters(&self) {
        self.compile_calls.set(0);
        self.step_calls.set(0);
        self.finalize_calls.set(0);
    }
}

impl JournalStore for ScriptedStore {
    type Statement<'s> = ScriptedStatement<'s>;

    fn compile<'s>(&'s self, _sql: &str) -> Result<ScriptedStatement<'s>, StoreFault> {
        self.compile_calls.set(self.compile_calls.get() + 1);
        self.compile.borrow_mut().next()?;
        Ok(ScriptedStatement { store: self })
    }

    fn last_insert_rowid(&self) -> i64 {
        self.last_rowid.get()
    }
}

pub(crate) struct ScriptedStatement<'s> {
    store: &'s ScriptedStore,
}

impl<'s> PreparedStatement for ScriptedStatement<'s> {
    type Cursor<'c>
        = ScriptedCursor<'c>
    where
        Self: 'c;

    fn column_count(&self) -> usize {
        self.store.columns
    }

    fn cursor(&mut self) -> ScriptedCursor<'_> {
        ScriptedCursor { store: self.store, current: Vec::new() }
    }

    fn finalize(self) -> Result<(), StoreFault> {
        let store = self.store;
        store.finalize_calls.set(store.finalize_calls.get() + 1);
        store.finalize.borrow_mut().next()
    }
}

pub(crate) struct ScriptedCursor<'c> {
    store: &'c ScriptedStore,
    current: Vec<Option<String>>,
}

impl StepCursor for ScriptedCursor<'_> {
    fn step(&mut self) -> Step {
        self.store.step_calls.set(self.store.step_calls.get() + 1);
        match self.store.steps.borrow_mut().next() {
            ScriptStep::Row(values) => {
                self.current = values;
                Step::Row
            }
            ScriptStep::Done => Step::Done,
            ScriptStep::Busy => Step::Busy,
            ScriptStep::Misuse => Step::Misuse,
            ScriptStep::Error(msg) => Step::Error(msg),
        }
    }

    fn column_text(&self, index: usize) -> Option<&str> {
        self.current.get(index).and_then(|v| v.as_deref())
    }
}

pub(crate) fn row(values: &[Option<&str>]) -> ScriptStep {
    ScriptStep::Row(values.iter().map(|v| v.map(str::to_owned)).collect())
}
