//! Tabular rows and their mapping onto entities.
//!
//! A [`Row`] is what a read leaves behind once the statement is finalized and
//! the connection closed: column names in result order, each paired with the
//! column value rendered as text. NULL stays `None`; it is never turned into
//! an empty string.

use rusqlite::types::ValueRef;
use thiserror::Error;

use crate::sqlite::Value;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapError {
    #[error("column `{column}` is missing or null")]
    MissingColumn { column: String },
}

/// One materialized result row.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Row {
    columns: Vec<(String, Option<String>)>,
}

impl Row {
    /// An empty row with no columns.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column. Used while materializing a result set.
    pub fn with_column(mut self, name: impl Into<String>, value: Option<String>) -> Self {
        self.columns.push((name.into(), value));
        self
    }

    /// Value of `column`, matched exactly (case-sensitive).
    /// Absent columns and NULL values are both `None`.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .and_then(|(_, value)| value.as_deref())
    }

    /// Like [`Row::get`], but an absent value is a [`MapError`].
    pub fn required(&self, column: &str) -> Result<String, MapError> {
        self.get(column)
            .map(str::to_owned)
            .ok_or_else(|| MapError::MissingColumn {
                column: column.to_owned(),
            })
    }

    /// Column names in result order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }
}

/// Entities that can be built from a [`Row`].
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> Result<Self, MapError>;
}

/// Map every row, stopping at the first row that cannot be mapped.
pub fn map_rows<T: FromRow>(rows: &[Row]) -> Result<Vec<T>, MapError> {
    rows.iter().map(T::from_row).collect()
}

/// Render a column value as text, `None` for NULL.
pub(crate) fn column_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

/// Coerce any scalar to its string form. Only NULL has no string form.
pub fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(f) => Some(f.to_string()),
        Value::Text(s) => Some(s),
        Value::Blob(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Value::Boolean(b) => Some(b.to_string()),
    }
}
