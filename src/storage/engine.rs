/// Low-level condition reported by a store while compiling or finalizing a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreFault {
    /// The store is locked by another connection or process.
    Busy,
    /// The schema changed underneath a compiled statement.
    SchemaChanged,
    /// The store API was driven in an invalid order.
    Misuse,
    /// The file is not a database or its content is damaged.
    Corrupt(String),
    /// Any other failure, with the store's message.
    Other(String),
}

impl std::fmt::Display for StoreFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreFault::Busy => write!(f, "database is locked"),
            StoreFault::SchemaChanged => write!(f, "database schema has changed"),
            StoreFault::Misuse => write!(f, "library routine called out of sequence"),
            StoreFault::Corrupt(msg) => write!(f, "{}", msg),
            StoreFault::Other(msg) => write!(f, "{}", msg),
        }
    }
}

/// Outcome of a single step through a compiled statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// A row is available through [`StepCursor::column_text`].
    Row,
    Done,
    Busy,
    Misuse,
    Error(String),
}

/// Store backend seam - the retry executor only talks to these traits.
pub trait JournalStore {
    type Statement<'s>: PreparedStatement
    where
        Self: 's;

    /// Compile `sql` into a statement ready to step.
    fn compile<'s>(&'s self, sql: &str) -> Result<Self::Statement<'s>, StoreFault>;

    /// Row id assigned by the most recent successful insert on this handle.
    fn last_insert_rowid(&self) -> i64;
}

pub trait PreparedStatement {
    type Cursor<'c>: StepCursor
    where
        Self: 'c;

    /// Number of columns in the statement's projection.
    fn column_count(&self) -> usize;

    /// Start (or restart) result production from the first row.
    fn cursor(&mut self) -> Self::Cursor<'_>;

    /// Release the statement.
    fn finalize(self) -> Result<(), StoreFault>;
}

pub trait StepCursor {
    fn step(&mut self) -> Step;

    /// Text of column `index` of the current row, `None` for NULL.
    fn column_text(&self, index: usize) -> Option<&str>;
}
