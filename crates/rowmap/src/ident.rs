//! Safe SQL identifier handling.
//!
//! [`Dialect`] selects the identifier delimiter and [`ColumnRef`] represents a
//! column reference (plain or table-qualified). A literal delimiter character
//! inside a name is doubled on render, never stripped, so the quoted form is
//! always reversible.

use std::fmt::Write;

/// Target SQL dialect, selecting the identifier escape delimiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    /// Backtick-delimited identifiers, `LIMIT skip, n` pagination
    #[default]
    MySql,
    /// ANSI double-quoted identifiers
    Ansi,
}

impl Dialect {
    /// The identifier delimiter character for this dialect.
    pub fn ident_delim(self) -> char {
        match self {
            Dialect::MySql => '`',
            Dialect::Ansi => '"',
        }
    }

    /// Quote an identifier, doubling any embedded delimiter.
    pub fn quote_ident(self, name: &str) -> String {
        let mut out = String::with_capacity(name.len() + 2);
        self.write_ident(&mut out, name);
        out
    }

    pub(crate) fn write_ident(self, out: &mut String, name: &str) {
        let delim = self.ident_delim();
        out.push(delim);
        for ch in name.chars() {
            if ch == delim {
                out.push(delim);
            }
            out.push(ch);
        }
        out.push(delim);
    }
}

/// A column reference in a condition or sort clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRef {
    /// Plain column name
    Name(String),
    /// Table-qualified pair: `table`.`column`
    Qualified(String, String),
}

impl ColumnRef {
    /// Render the reference with the dialect's delimiter.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        let mut out = String::new();
        self.write_sql(&mut out, dialect);
        out
    }

    pub(crate) fn write_sql(&self, out: &mut String, dialect: Dialect) {
        match self {
            ColumnRef::Name(name) => dialect.write_ident(out, name),
            ColumnRef::Qualified(table, column) => {
                dialect.write_ident(out, table);
                out.push('.');
                dialect.write_ident(out, column);
            }
        }
    }

    /// The bare column name, without qualification.
    pub fn name(&self) -> &str {
        match self {
            ColumnRef::Name(name) => name,
            ColumnRef::Qualified(_, column) => column,
        }
    }
}

impl std::fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnRef::Name(name) => f.write_str(name),
            ColumnRef::Qualified(table, column) => {
                f.write_str(table)?;
                f.write_char('.')?;
                f.write_str(column)
            }
        }
    }
}

impl From<&str> for ColumnRef {
    /// A dot splits into a table-qualified pair; anything else is a plain name.
    fn from(s: &str) -> Self {
        match s.split_once('.') {
            Some((table, column)) => ColumnRef::Qualified(table.to_string(), column.to_string()),
            None => ColumnRef::Name(s.to_string()),
        }
    }
}

impl From<String> for ColumnRef {
    fn from(s: String) -> Self {
        ColumnRef::from(s.as_str())
    }
}

impl From<(&str, &str)> for ColumnRef {
    fn from((table, column): (&str, &str)) -> Self {
        ColumnRef::Qualified(table.to_string(), column.to_string())
    }
}
