//! Identity-map walkthrough against a canned in-memory connection.
//!
//! A real application supplies a `Connection` backed by an actual driver;
//! here a scripted one stands in so the example runs offline.

use rowmap::connection::{Connection, ResultSet, Row};
use rowmap::ident::Dialect;
use rowmap::prelude::*;
use std::cell::RefCell;
use std::collections::VecDeque;

struct CannedConn {
    results: RefCell<VecDeque<ResultSet>>,
}

impl CannedConn {
    fn new(results: Vec<ResultSet>) -> Self {
        Self {
            results: RefCell::new(results.into()),
        }
    }
}

impl Connection for CannedConn {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    fn quote(&self, text: &str) -> String {
        format!("'{}'", text.replace('\'', "''"))
    }

    fn execute(&self, sql: &str) -> OrmResult<ResultSet> {
        println!("sql> {sql}");
        Ok(self
            .results
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| ResultSet::new(Vec::new())))
    }
}

fn main() -> OrmResult<()> {
    let schema = Schema::new()
        .register(
            EntityDescriptor::new("author", "authors", "id")
                .read(&["id", "name"])
                .write(&["name"]),
        )
        .register(
            EntityDescriptor::new("post", "posts", "id")
                .read(&["id", "title", "author"])
                .write(&["title", "author"])
                .reference_field("author", "author"),
        );

    let conn = CannedConn::new(vec![
        // post 1 and its author
        ResultSet::new(vec![Row::new()
            .with("id", 1i64)
            .with("title", "hello")
            .with("author", 7i64)]),
        ResultSet::new(vec![Row::new().with("id", 7i64).with("name", "ann")]),
        // post 2, same author (served from cache, no statement)
        ResultSet::new(vec![Row::new()
            .with("id", 2i64)
            .with("title", "again")
            .with("author", 7i64)]),
        // the flushed UPDATE
        ResultSet::new(Vec::new()).with_affected(1),
    ]);
    let store = Store::new(conn, schema);

    let p1 = store.by_key("post", 1)?.expect("post 1");
    let p2 = store.by_key("post", 2)?.expect("post 2");

    let a1 = p1.get("author")?.as_entity().cloned().expect("resolved");
    let a2 = p2.get("author")?.as_entity().cloned().expect("resolved");
    println!("authors are the same instance: {}", a1.same(&a2));

    // Rename through one path, observe through the other.
    store.set(&a1, "name", "gwen")?;
    let seen = p2.get("author")?;
    let seen = seen.as_entity().unwrap().get("name")?;
    println!("seen through the other post: {:?}", seen.as_text());

    store.save(&a1)?;
    Ok(())
}
