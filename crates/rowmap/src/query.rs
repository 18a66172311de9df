//! The fluent query builder.
//!
//! A [`Query`] collects a field list, condition clauses, sort clauses and
//! pagination, then renders once into dialect-specific SQL text. The rendered
//! shape is a compatibility contract:
//!
//! - identifiers are delimiter-quoted with embedded delimiters doubled;
//! - scalar values go through [`Connection::quote`], never raw concatenation;
//! - conditions form a left-to-right `AND`/`OR` chain with no grouping;
//!   clause order is significant and there is no parenthesization;
//! - `skip` renders as `LIMIT <skip>, <limit-or-i64::MAX>`.
//!
//! Builders are write-once-then-render: execution consumes the instance.
//!
//! ```ignore
//! use rowmap::query::{self, Cmp};
//!
//! let sql = query::select("posts", &["id", "title"])
//!     .filter("status", Cmp::Eq, "published")
//!     .order_desc("created_at")
//!     .limit(10)
//!     .render(&conn)?;
//! ```

use crate::connection::{Connection, ResultSet, Row};
use crate::error::{OrmError, OrmResult};
use crate::ident::ColumnRef;
use crate::value::Value;
use std::fmt::Write;
use std::str::FromStr;


/// The statement family a [`Query`] renders to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Select,
    Update,
    Delete,
    Insert,
}

impl QueryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryKind::Select => "select",
            QueryKind::Update => "update",
            QueryKind::Delete => "delete",
            QueryKind::Insert => "insert",
        }
    }
}

impl FromStr for QueryKind {
    type Err = OrmError;

    fn from_str(s: &str) -> OrmResult<Self> {
        match s {
            "select" => Ok(QueryKind::Select),
            "update" => Ok(QueryKind::Update),
            "delete" => Ok(QueryKind::Delete),
            "insert" => Ok(QueryKind::Insert),
            other => Err(OrmError::InvalidQueryType(other.to_string())),
        }
    }
}

/// Condition comparator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmp {
    /// column = value (NULL rewrites to IS NULL)
    Eq,
    /// column != value (NULL rewrites to IS NOT NULL)
    Ne,
    /// column < value
    Lt,
    /// column > value
    Gt,
    /// column <= value
    Le,
    /// column >= value
    Ge,
    /// column IN (values...), requires a non-empty list
    In,
    /// Equality against another entity's key; renders as a scalar `=`
    RefEq,
}

impl Cmp {
    fn sql(self) -> &'static str {
        match self {
            Cmp::Eq | Cmp::RefEq => "=",
            Cmp::Ne => "!=",
            Cmp::Lt => "<",
            Cmp::Gt => ">",
            Cmp::Le => "<=",
            Cmp::Ge => ">=",
            Cmp::In => "IN",
        }
    }
}

/// Right-hand side of a condition: a scalar or a list (for `IN`).
#[derive(Debug, Clone, PartialEq)]
pub enum CondValue {
    Scalar(Value),
    List(Vec<Value>),
}

impl From<Value> for CondValue {
    fn from(v: Value) -> Self {
        CondValue::Scalar(v)
    }
}

impl From<Vec<Value>> for CondValue {
    fn from(v: Vec<Value>) -> Self {
        CondValue::List(v)
    }
}

impl From<bool> for CondValue {
    fn from(v: bool) -> Self {
        CondValue::Scalar(v.into())
    }
}

impl From<i32> for CondValue {
    fn from(v: i32) -> Self {
        CondValue::Scalar(v.into())
    }
}

impl From<i64> for CondValue {
    fn from(v: i64) -> Self {
        CondValue::Scalar(v.into())
    }
}

impl From<f64> for CondValue {
    fn from(v: f64) -> Self {
        CondValue::Scalar(v.into())
    }
}

impl From<&str> for CondValue {
    fn from(v: &str) -> Self {
        CondValue::Scalar(v.into())
    }
}

impl From<String> for CondValue {
    fn from(v: String) -> Self {
        CondValue::Scalar(v.into())
    }
}

/// One condition clause in the left-to-right chain.
#[derive(Debug, Clone, PartialEq)]
struct Cond {
    column: ColumnRef,
    cmp: Cmp,
    value: CondValue,
    /// Prefixed with OR instead of AND (ignored on the first clause)
    or: bool,
}

/// One sort clause.
#[derive(Debug, Clone, PartialEq)]
struct Sort {
    column: ColumnRef,
    descending: bool,
}

/// An incrementally built, one-shot statement description.
#[derive(Debug, Clone)]
pub struct Query {
    kind: QueryKind,
    table: String,
    columns: Vec<String>,
    assigns: Vec<(String, Value)>,
    conds: Vec<Cond>,
    sorts: Vec<Sort>,
    skip: Option<u64>,
    limit: Option<u64>,
}

/// Create a SELECT builder with an initial field list.
pub fn select(table: impl Into<String>, fields: &[&str]) -> Query {
    Query::new(QueryKind::Select, table).fields(fields)
}

/// Create a bulk-UPDATE builder with an initial assignment list.
pub fn update<V: Into<Value>>(
    table: impl Into<String>,
    assigns: impl IntoIterator<Item = (&'static str, V)>,
) -> Query {
    let mut q = Query::new(QueryKind::Update, table);
    for (field, value) in assigns {
        q = q.set(field, value);
    }
    q
}

/// Create a bulk-DELETE builder.
pub fn delete(table: impl Into<String>) -> Query {
    Query::new(QueryKind::Delete, table)
}

/// Create an INSERT builder.
pub fn insert(table: impl Into<String>) -> Query {
    Query::new(QueryKind::Insert, table)
}

impl Query {
    /// Construct an empty builder of the given kind.
    pub fn new(kind: QueryKind, table: impl Into<String>) -> Self {
        Self {
            kind,
            table: table.into(),
            columns: Vec::new(),
            assigns: Vec::new(),
            conds: Vec::new(),
            sorts: Vec::new(),
            skip: None,
            limit: None,
        }
    }

    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    // ==================== Field list / assignments ====================

    /// Append one field to the SELECT list.
    pub fn field(mut self, column: &str) -> Self {
        self.columns.push(column.to_string());
        self
    }

    /// Append several fields to the SELECT list.
    pub fn fields(mut self, columns: &[&str]) -> Self {
        self.columns.extend(columns.iter().map(|c| c.to_string()));
        self
    }

    /// Set a field value (UPDATE / INSERT). Re-setting a field replaces the
    /// earlier value in place, keeping its position.
    pub fn set(mut self, column: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        match self.assigns.iter_mut().find(|(c, _)| c == column) {
            Some(entry) => entry.1 = value,
            None => self.assigns.push((column.to_string(), value)),
        }
        self
    }

    // ==================== Conditions ====================

    /// Append a conjoined condition clause.
    pub fn filter(
        mut self,
        column: impl Into<ColumnRef>,
        cmp: Cmp,
        value: impl Into<CondValue>,
    ) -> Self {
        self.conds.push(Cond {
            column: column.into(),
            cmp,
            value: value.into(),
            or: false,
        });
        self
    }

    /// Append an or-fallback condition clause: evaluated only when the chain
    /// so far failed. A leading or-clause renders without a prefix.
    pub fn or_filter(
        mut self,
        column: impl Into<ColumnRef>,
        cmp: Cmp,
        value: impl Into<CondValue>,
    ) -> Self {
        self.conds.push(Cond {
            column: column.into(),
            cmp,
            value: value.into(),
            or: true,
        });
        self
    }

    /// Add: column = value
    pub fn eq(self, column: impl Into<ColumnRef>, value: impl Into<CondValue>) -> Self {
        self.filter(column, Cmp::Eq, value)
    }

    /// Add: column != value
    pub fn ne(self, column: impl Into<ColumnRef>, value: impl Into<CondValue>) -> Self {
        self.filter(column, Cmp::Ne, value)
    }

    /// Add: column < value
    pub fn lt(self, column: impl Into<ColumnRef>, value: impl Into<CondValue>) -> Self {
        self.filter(column, Cmp::Lt, value)
    }

    /// Add: column > value
    pub fn gt(self, column: impl Into<ColumnRef>, value: impl Into<CondValue>) -> Self {
        self.filter(column, Cmp::Gt, value)
    }

    /// Add: column <= value
    pub fn lte(self, column: impl Into<ColumnRef>, value: impl Into<CondValue>) -> Self {
        self.filter(column, Cmp::Le, value)
    }

    /// Add: column >= value
    pub fn gte(self, column: impl Into<ColumnRef>, value: impl Into<CondValue>) -> Self {
        self.filter(column, Cmp::Ge, value)
    }

    /// Add: column IN (values...)
    pub fn in_list(self, column: impl Into<ColumnRef>, values: Vec<Value>) -> Self {
        self.filter(column, Cmp::In, values)
    }

    // ==================== Ordering & pagination ====================

    /// Append an ascending sort clause.
    pub fn order_asc(mut self, column: impl Into<ColumnRef>) -> Self {
        self.sorts.push(Sort {
            column: column.into(),
            descending: false,
        });
        self
    }

    /// Append a descending sort clause.
    pub fn order_desc(mut self, column: impl Into<ColumnRef>) -> Self {
        self.sorts.push(Sort {
            column: column.into(),
            descending: true,
        });
        self
    }

    /// Skip the first `n` rows. Negative input coerces to 0.
    pub fn skip(mut self, n: i64) -> Self {
        self.skip = Some(n.max(0) as u64);
        self
    }

    /// Return at most `n` rows. Negative input coerces to 0.
    pub fn limit(mut self, n: i64) -> Self {
        self.limit = Some(n.max(0) as u64);
        self
    }

    // ==================== Rendering ====================

    /// Render the final statement for the connection's dialect.
    pub fn render(&self, conn: &impl Connection) -> OrmResult<String> {
        let dialect = conn.dialect();
        let mut sql = String::new();

        match self.kind {
            QueryKind::Select => {
                if self.columns.is_empty() {
                    return Err(OrmError::EmptyFieldList(self.table.clone()));
                }
                sql.push_str("SELECT ");
                for (i, column) in self.columns.iter().enumerate() {
                    if i > 0 {
                        sql.push_str(", ");
                    }
                    dialect.write_ident(&mut sql, column);
                }
                sql.push_str(" FROM ");
                dialect.write_ident(&mut sql, &self.table);
            }
            QueryKind::Update => {
                if self.assigns.is_empty() {
                    return Err(OrmError::EmptyFieldList(self.table.clone()));
                }
                sql.push_str("UPDATE ");
                dialect.write_ident(&mut sql, &self.table);
                sql.push_str(" SET ");
                for (i, (column, value)) in self.assigns.iter().enumerate() {
                    if i > 0 {
                        sql.push_str(", ");
                    }
                    dialect.write_ident(&mut sql, column);
                    sql.push_str(" = ");
                    sql.push_str(&render_value(conn, value));
                }
            }
            QueryKind::Delete => {
                sql.push_str("DELETE FROM ");
                dialect.write_ident(&mut sql, &self.table);
            }
            QueryKind::Insert => {
                if self.assigns.is_empty() {
                    return Err(OrmError::EmptyFieldList(self.table.clone()));
                }
                sql.push_str("INSERT INTO ");
                dialect.write_ident(&mut sql, &self.table);
                sql.push_str(" (");
                for (i, (column, _)) in self.assigns.iter().enumerate() {
                    if i > 0 {
                        sql.push_str(", ");
                    }
                    dialect.write_ident(&mut sql, column);
                }
                sql.push_str(") VALUES (");
                for (i, (_, value)) in self.assigns.iter().enumerate() {
                    if i > 0 {
                        sql.push_str(", ");
                    }
                    sql.push_str(&render_value(conn, value));
                }
                sql.push(')');
                // INSERT carries no WHERE/ORDER/LIMIT tail.
                return Ok(sql);
            }
        }

        if !self.conds.is_empty() {
            sql.push_str(" WHERE ");
            for (i, cond) in self.conds.iter().enumerate() {
                if i > 0 {
                    sql.push_str(if cond.or { " OR " } else { " AND " });
                }
                render_cond(conn, cond, &mut sql)?;
            }
        }

        if !self.sorts.is_empty() {
            sql.push_str(" ORDER BY ");
            for (i, sort) in self.sorts.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                sort.column.write_sql(&mut sql, dialect);
                sql.push_str(if sort.descending { " DESC" } else { " ASC" });
            }
        }

        match (self.skip, self.limit) {
            (Some(skip), limit) => {
                let limit = limit.unwrap_or(i64::MAX as u64);
                let _ = write!(sql, " LIMIT {skip}, {limit}");
            }
            (None, Some(limit)) => {
                let _ = write!(sql, " LIMIT {limit}");
            }
            (None, None) => {}
        }

        Ok(sql)
    }

    // ==================== Execution ====================

    /// Render and submit the statement. Consumes the builder: instances are
    /// one-shot.
    pub fn execute(self, conn: &impl Connection) -> OrmResult<ResultSet> {
        let sql = self.render(conn)?;
        tracing::debug!(target: "rowmap::sql", kind = self.kind.as_str(), %sql, "execute");
        conn.execute(&sql)
    }

    /// Execute and return all fetched rows.
    pub fn fetch(self, conn: &impl Connection) -> OrmResult<Vec<Row>> {
        Ok(self.execute(conn)?.into_rows())
    }

    /// Execute and return the first fetched row, if any.
    pub fn fetch_opt(self, conn: &impl Connection) -> OrmResult<Option<Row>> {
        Ok(self.fetch(conn)?.into_iter().next())
    }

    /// Execute, requiring at least `n` matching rows.
    ///
    /// - no rows at all: `Ok(None)`, a defined miss rather than an error;
    /// - fewer than `n`: [`OrmError::InsufficientRows`];
    /// - otherwise the first `n` rows.
    pub fn find(self, n: usize, conn: &impl Connection) -> OrmResult<Option<Vec<Row>>> {
        let mut rows = self.fetch(conn)?;
        if rows.is_empty() {
            return Ok(None);
        }
        if rows.len() < n {
            return Err(OrmError::InsufficientRows {
                expected: n,
                got: rows.len(),
            });
        }
        rows.truncate(n);
        Ok(Some(rows))
    }
}

fn render_cond(conn: &impl Connection, cond: &Cond, out: &mut String) -> OrmResult<()> {
    cond.column.write_sql(out, conn.dialect());
    match (&cond.cmp, &cond.value) {
        (Cmp::In, CondValue::List(values)) => {
            if values.is_empty() {
                return Err(OrmError::malformed_value(
                    cond.column.to_string(),
                    "IN requires a non-empty value list",
                ));
            }
            out.push_str(" IN (");
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(&render_value(conn, value));
            }
            out.push(')');
        }
        (Cmp::In, CondValue::Scalar(_)) => {
            return Err(OrmError::malformed_value(
                cond.column.to_string(),
                "IN requires a value list",
            ));
        }
        (cmp, CondValue::List(_)) => {
            return Err(OrmError::malformed_value(
                cond.column.to_string(),
                format!("value list is not valid with '{}'", cmp.sql()),
            ));
        }
        (Cmp::Eq, CondValue::Scalar(Value::Null)) => out.push_str(" IS NULL"),
        (Cmp::Ne, CondValue::Scalar(Value::Null)) => out.push_str(" IS NOT NULL"),
        (cmp, CondValue::Scalar(value)) => {
            out.push(' ');
            out.push_str(cmp.sql());
            out.push(' ');
            out.push_str(&render_value(conn, value));
        }
    }
    Ok(())
}

fn render_value(conn: &impl Connection, value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => "0".to_string(),
        Value::Int(n) => n.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Text(s) => conn.quote(s),
    }
}
