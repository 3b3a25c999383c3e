use crate::core::Result;
use crate::storage::StepCursor;
use serde::Serialize;
use std::fmt;

const NULL_TEXT: &str = "NULL";

/// One row returned by a journal query: the text of each column, in
/// projection order. SQL NULL is kept as `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ResultRow {
    values: Vec<Option<String>>,
}

impl ResultRow {
    pub fn new(values: Vec<Option<String>>) -> Self {
        Self { values }
    }

    /// Copies the current row of `cursor` without aborting on allocation failure.
    pub(crate) fn from_cursor<C: StepCursor + ?Sized>(cursor: &C, column_count: usize) -> Result<Self> {
        let mut values = Vec::new();
        values.try_reserve_exact(column_count)?;
        for index in 0..column_count {
            let value = match cursor.column_text(index) {
                Some(text) => {
                    let mut owned = String::new();
                    owned.try_reserve_exact(text.len())?;
                    owned.push_str(text);
                    Some(owned)
                }
                None => None,
            };
            values.push(value);
        }
        Ok(Self { values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Text of column `index`, `None` for NULL or an out-of-range index.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.values.get(index).and_then(|v| v.as_deref())
    }

    pub fn is_null(&self, index: usize) -> bool {
        matches!(self.values.get(index), Some(None))
    }

    pub fn values(&self) -> &[Option<String>] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Option<String>> {
        self.values
    }
}

impl fmt::Display for ResultRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cells: Vec<&str> = self
            .values
            .iter()
            .map(|v| v.as_deref().unwrap_or(NULL_TEXT))
            .collect();
        write!(f, "{}", cells.join(" | "))
    }
}

/// Rows produced by one successful query. An empty set means the query ran
/// and matched nothing; failures are reported as errors instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryRows {
    pub column_count: usize,
    pub rows: Vec<ResultRow>,
}

impl QueryRows {
    pub fn new(column_count: usize, rows: Vec<ResultRow>) -> Self {
        Self { column_count, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first(&self) -> Option<&ResultRow> {
        self.rows.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ResultRow> {
        self.rows.iter()
    }

    pub fn print(&self) {
        if self.rows.is_empty() {
            println!("Empty result set");
            return;
        }

        // Calculate column widths
        let mut widths = vec![0usize; self.column_count];
        for row in &self.rows {
            for (i, value) in row.values().iter().enumerate() {
                let len = value.as_deref().unwrap_or(NULL_TEXT).len();
                if let Some(width) = widths.get_mut(i) {
                    *width = (*width).max(len);
                }
            }
        }

        for row in &self.rows {
            let row_str: Vec<String> = row
                .values()
                .iter()
                .enumerate()
                .map(|(i, val)| {
                    let width = widths.get(i).copied().unwrap_or(0);
                    format!("{:width$}", val.as_deref().unwrap_or(NULL_TEXT), width = width)
                })
                .collect();
            println!("{}", row_str.join(" | "));
        }

        println!("\n{} row(s)", self.rows.len());
    }
}

impl IntoIterator for QueryRows {
    type Item = ResultRow;
    type IntoIter = std::vec::IntoIter<ResultRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a QueryRows {
    type Item = &'a ResultRow;
    type IntoIter = std::slice::Iter<'a, ResultRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
