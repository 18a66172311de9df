//! # rowmap
//!
//! A lightweight identity-mapped ORM core for Rust.
//!
//! ## Features
//!
//! - **Fluent SQL builder**: conditions, ordering and pagination assemble into
//!   dialect-specific statement text (use `query::select()` / `update()` /
//!   `delete()` / `insert()`)
//! - **Identity map**: one canonical in-memory instance per (type, primary
//!   key); every path that loads a row shares the same instance
//! - **Change tracking**: field writes accumulate in a pending map, flushed
//!   as a single UPDATE of exactly the touched fields
//! - **Resolved references**: foreign-key fields hold entities, never raw
//!   scalars, resolved recursively through each type's own cache
//! - **Injected connection**: one small trait for quoting and synchronous
//!   execution; the backend driver lives in the surrounding application
//! - **Safe defaults**: values are quoted through the connection, identifiers
//!   are delimiter-escaped, an empty `IN` list fails before reaching the wire
//!
//! ## Query builder
//!
//! ```ignore
//! use rowmap::query::{self, Cmp};
//!
//! let sql = query::select("posts", &["id", "title"])
//!     .eq("status", "published")
//!     .or_filter("pinned", Cmp::Eq, true)
//!     .order_desc("created_at")
//!     .skip(10)
//!     .render(&conn)?;
//! ```
//!
//! ## Entity store
//!
//! ```ignore
//! use rowmap::{EntityDescriptor, Schema, Store};
//!
//! let schema = Schema::new()
//!     .register(EntityDescriptor::new("author", "authors", "id")
//!         .read(&["id", "name"])
//!         .write(&["name"]))
//!     .register(EntityDescriptor::new("post", "posts", "id")
//!         .read(&["id", "title", "author"])
//!         .write(&["title", "author"])
//!         .reference_field("author", "author"));
//!
//! let store = Store::new(conn, schema);
//! let post = store.by_key("post", 1)?.expect("post exists");
//! let author = post.get("author")?.as_entity().cloned().expect("resolved");
//! store.set(&author, "name", "gwen")?;
//! store.save(&author)?;
//! ```
//!
//! ## Concurrency
//!
//! One store, one connection, one thread of control. Entity handles are
//! `Rc`-backed, so a store never crosses threads; concurrent workers each own
//! a store of their own.

pub mod connection;
pub mod entity;
pub mod error;
pub mod ident;
pub mod prelude;
pub mod query;
pub mod schema;
pub mod store;
pub mod value;

pub use connection::{Connection, ResultSet, Row};
pub use entity::{AssignValue, Entity, FieldValue};
pub use error::{OrmError, OrmResult};
pub use ident::{ColumnRef, Dialect};
pub use query::{Cmp, CondValue, Query, QueryKind};
pub use schema::{EntityDescriptor, Schema};
pub use store::{EntityGuard, Store};
pub use value::{Key, Value};

#[cfg(test)]
mod test_support;
