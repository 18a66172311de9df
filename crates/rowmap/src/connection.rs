//! The injected connection abstraction.
//!
//! The builder and store never talk to a backend directly: the surrounding
//! application supplies one [`Connection`] implementation per process. The
//! trait is deliberately small: parameter-safe literal quoting, synchronous
//! statement execution, and the post-execution introspection the store needs
//! (row counts and the last generated key).

use crate::error::{OrmError, OrmResult};
use crate::ident::Dialect;
use crate::value::{Key, Value};
use std::collections::HashMap;

/// A single synchronous connection to one backend.
pub trait Connection {
    /// The dialect this connection speaks (selects identifier quoting).
    fn dialect(&self) -> Dialect;

    /// Quote a text literal so it is safe to splice into a statement.
    ///
    /// Implementations must escape through the backend's native quoting
    /// routine; the builder never concatenates raw text.
    fn quote(&self, text: &str) -> String;

    /// Execute one statement and return its result set.
    ///
    /// Backend failures are surfaced as [`OrmError::Connection`].
    fn execute(&self, sql: &str) -> OrmResult<ResultSet>;
}

impl<C: Connection + ?Sized> Connection for &C {
    fn dialect(&self) -> Dialect {
        (**self).dialect()
    }

    fn quote(&self, text: &str) -> String {
        (**self).quote(text)
    }

    fn execute(&self, sql: &str) -> OrmResult<ResultSet> {
        (**self).execute(sql)
    }
}

/// One fetched row: a column name to value mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: HashMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column insertion, mainly for backends and tests.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.columns.insert(column.into(), value.into());
        self
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.columns.insert(column.into(), value.into());
    }

    /// Get a column value, if the row has one.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    /// Get a column value, failing with [`OrmError::UnknownField`].
    pub fn try_get(&self, column: &str) -> OrmResult<&Value> {
        self.columns
            .get(column)
            .ok_or_else(|| OrmError::UnknownField(column.to_string()))
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Row {
            columns: iter.into_iter().collect(),
        }
    }
}

/// The outcome of one executed statement.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    rows: Vec<Row>,
    affected: u64,
    last_insert_id: Option<Key>,
}

impl ResultSet {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows,
            affected: 0,
            last_insert_id: None,
        }
    }

    /// Builder-style affected-row count, for mutation statements.
    pub fn with_affected(mut self, affected: u64) -> Self {
        self.affected = affected;
        self
    }

    /// Builder-style generated key, for INSERT statements.
    pub fn with_last_insert_id(mut self, key: impl Into<Key>) -> Self {
        self.last_insert_id = Some(key.into());
        self
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Rows affected by a mutation statement.
    pub fn affected(&self) -> u64 {
        self.affected
    }

    /// Key generated by the backend for the last INSERT, if any.
    pub fn last_insert_id(&self) -> Option<&Key> {
        self.last_insert_id.as_ref()
    }
}
