//! SQLite-backed journal store

use super::engine::{JournalStore, PreparedStatement, Step, StepCursor, StoreFault};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, ErrorCode, OpenFlags, Rows, Statement};
use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// First 16 bytes of every SQLite 3 database file.
pub const STORE_MAGIC: &[u8; 16] = b"SQLite format 3\0";

pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
}

impl SqliteStore {
    /// Open an existing store read-write. The file is never created here.
    ///
    /// SQLite's own busy handler is disabled so every lock conflict is
    /// reported back to the retry executor.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreFault> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(fault_from)?;
        conn.busy_timeout(Duration::ZERO).map_err(fault_from)?;
        Ok(Self { conn, path })
    }

    /// Create an empty store at `path` and force its header onto disk.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<(), StoreFault> {
        let conn = Connection::open(path.as_ref()).map_err(fault_from)?;
        conn.pragma_update(None, "user_version", 0i64)
            .map_err(fault_from)?;
        conn.close().map_err(|(_, err)| fault_from(err))
    }

    /// Open an existing store and run SQLite's quick integrity check.
    ///
    /// The handle is read-write so a hot rollback journal left by a crashed
    /// writer is rolled back instead of failing the check. Damage is reported
    /// as [`StoreFault::Corrupt`]; a lock held elsewhere as [`StoreFault::Busy`].
    pub fn verify<P: AsRef<Path>>(path: P) -> Result<(), StoreFault> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(fault_from)?;
        conn.busy_timeout(Duration::ZERO).map_err(fault_from)?;
        let status: String = conn
            .pragma_query_value(None, "quick_check", |row| row.get(0))
            .map_err(fault_from)?;
        if status != "ok" {
            return Err(StoreFault::Corrupt(format!("quick_check reported: {}", status)));
        }
        conn.close().map_err(|(_, err)| fault_from(err))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn close(self) -> Result<(), StoreFault> {
        self.conn.close().map_err(|(_, err)| fault_from(err))
    }
}

impl JournalStore for SqliteStore {
    type Statement<'s> = SqliteStatement<'s>;

    fn compile<'s>(&'s self, sql: &str) -> Result<SqliteStatement<'s>, StoreFault> {
        let stmt = self.conn.prepare(sql).map_err(fault_from)?;
        Ok(SqliteStatement {
            stmt,
            schema_changed: Cell::new(false),
        })
    }

    fn last_insert_rowid(&self) -> i64 {
        self.conn.last_insert_rowid()
    }
}

pub struct SqliteStatement<'s> {
    stmt: Statement<'s>,
    // rusqlite resets the statement after a failed step, so the schema
    // condition is remembered here for finalize.
    schema_changed: Cell<bool>,
}

impl<'s> PreparedStatement for SqliteStatement<'s> {
    type Cursor<'c>
        = SqliteCursor<'c>
    where
        Self: 'c;

    fn column_count(&self) -> usize {
        self.stmt.column_count()
    }

    fn cursor(&mut self) -> SqliteCursor<'_> {
        let columns = self.stmt.column_count();
        SqliteCursor {
            rows: self.stmt.raw_query(),
            schema_changed: &self.schema_changed,
            columns,
            current: Vec::with_capacity(columns),
        }
    }

    fn finalize(self) -> Result<(), StoreFault> {
        let schema_changed = self.schema_changed.get();
        self.stmt.finalize().map_err(fault_from)?;
        if schema_changed {
            return Err(StoreFault::SchemaChanged);
        }
        Ok(())
    }
}

pub struct SqliteCursor<'c> {
    rows: Rows<'c>,
    schema_changed: &'c Cell<bool>,
    columns: usize,
    current: Vec<Option<String>>,
}

impl StepCursor for SqliteCursor<'_> {
    fn step(&mut self) -> Step {
        match self.rows.next() {
            Ok(Some(row)) => {
                self.current.clear();
                for index in 0..self.columns {
                    let text = match row.get_ref(index) {
                        Ok(value) => value_text(value),
                        Err(err) => return Step::Error(err.to_string()),
                    };
                    match text {
                        Ok(text) => self.current.push(text),
                        Err(msg) => return Step::Error(format!("column {}: {}", index, msg)),
                    }
                }
                Step::Row
            }
            Ok(None) => Step::Done,
            Err(err) => match fault_from(err) {
                StoreFault::Busy => Step::Busy,
                StoreFault::Misuse => Step::Misuse,
                StoreFault::SchemaChanged => {
                    self.schema_changed.set(true);
                    Step::Error(StoreFault::SchemaChanged.to_string())
                }
                StoreFault::Corrupt(msg) | StoreFault::Other(msg) => Step::Error(msg),
            },
        }
    }

    fn column_text(&self, index: usize) -> Option<&str> {
        self.current.get(index).and_then(|v| v.as_deref())
    }
}

/// Column text as `sqlite3_column_text` would produce it. Bytes that are
/// not valid UTF-8 are an error rather than being replaced.
fn value_text(value: ValueRef<'_>) -> Result<Option<String>, String> {
    match value {
        ValueRef::Null => Ok(None),
        ValueRef::Integer(i) => Ok(Some(i.to_string())),
        ValueRef::Real(f) => Ok(Some(real_text(f))),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => Ok(Some(text.to_owned())),
            Err(err) => Err(format!("value is not valid UTF-8 text ({})", err)),
        },
    }
}

/// SQLite's `%!.15g` rendering of a REAL: 15 significant digits, trailing
/// zeros dropped, at least one digit after the point, two-digit exponent.
fn real_text(f: f64) -> String {
    if f.is_infinite() {
        return if f < 0.0 { "-Inf" } else { "Inf" }.to_string();
    }
    if f == 0.0 {
        return "0.0".to_string();
    }

    let sci = format!("{:.14e}", f);
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return sci;
    };
    let Ok(exp) = exp.parse::<i32>() else {
        return sci;
    };

    let sign = if f < 0.0 { "-" } else { "" };
    let digits: String = mantissa.chars().filter(|c| c.is_ascii_digit()).collect();
    let digits = digits.trim_end_matches('0');

    if !(-4..15).contains(&exp) {
        let (lead, rest) = digits.split_at(1);
        let rest = if rest.is_empty() { "0" } else { rest };
        let exp_sign = if exp < 0 { '-' } else { '+' };
        format!("{}{}.{}e{}{:02}", sign, lead, rest, exp_sign, exp.abs())
    } else if exp >= 0 {
        let int_len = exp as usize + 1;
        if digits.len() <= int_len {
            format!("{}{}{}.0", sign, digits, "0".repeat(int_len - digits.len()))
        } else {
            format!("{}{}.{}", sign, &digits[..int_len], &digits[int_len..])
        }
    } else {
        format!("{}0.{}{}", sign, "0".repeat((-exp - 1) as usize), digits)
    }
}

pub(crate) fn fault_from(err: rusqlite::Error) -> StoreFault {
    match err.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => StoreFault::Busy,
        Some(ErrorCode::SchemaChanged) => StoreFault::SchemaChanged,
        Some(ErrorCode::ApiMisuse) => StoreFault::Misuse,
        Some(ErrorCode::NotADatabase) | Some(ErrorCode::DatabaseCorrupt) => {
            StoreFault::Corrupt(err.to_string())
        }
        _ => StoreFault::Other(err.to_string()),
    }
}
