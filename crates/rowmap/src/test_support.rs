//! Scripted connection fixture shared by the builder and store tests.

use crate::connection::{Connection, ResultSet};
use crate::error::{OrmError, OrmResult};
use crate::ident::Dialect;
use std::cell::RefCell;
use std::collections::VecDeque;

/// A scripted [`Connection`]: queued results are handed out in order and
/// every executed statement is recorded for assertion.
pub struct StubConn {
    results: RefCell<VecDeque<OrmResult<ResultSet>>>,
    executed: RefCell<Vec<String>>,
}

impl StubConn {
    pub fn new() -> Self {
        Self {
            results: RefCell::new(VecDeque::new()),
            executed: RefCell::new(Vec::new()),
        }
    }

    /// Queue the result for the next executed statement.
    pub fn push(&self, result: ResultSet) {
        self.results.borrow_mut().push_back(Ok(result));
    }

    /// Queue a backend failure for the next executed statement.
    pub fn push_err(&self, message: &str) {
        self.results
            .borrow_mut()
            .push_back(Err(OrmError::connection(message)));
    }

    /// Every statement executed so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed.borrow().clone()
    }

    pub fn statement_count(&self) -> usize {
        self.executed.borrow().len()
    }
}

impl Connection for StubConn {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    fn quote(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len() + 2);
        out.push('\'');
        for ch in text.chars() {
            if ch == '\'' {
                out.push('\'');
            }
            out.push(ch);
        }
        out.push('\'');
        out
    }

    fn execute(&self, sql: &str) -> OrmResult<ResultSet> {
        self.executed.borrow_mut().push(sql.to_string());
        self.results
            .borrow_mut()
            .pop_front()
            // Unscripted statements behave like a match on nothing.
            .unwrap_or_else(|| Ok(ResultSet::new(Vec::new())))
    }
}
