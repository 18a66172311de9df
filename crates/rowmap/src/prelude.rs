//! Convenient imports for typical `rowmap` usage.
//!
//! This module is intentionally small and focused on the most common APIs so
//! examples can start with:
//!
//! ```ignore
//! use rowmap::prelude::*;
//! ```

pub use crate::{
    AssignValue, Cmp, Connection, Dialect, Entity, EntityDescriptor, FieldValue, Key, OrmError,
    OrmResult, Query, QueryKind, ResultSet, Row, Schema, Store, Value,
};
