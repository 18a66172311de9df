//! Entity descriptors and the schema registry.
//!
//! Each table type registers one immutable [`EntityDescriptor`]: table name,
//! primary-key field, readable/writable field sets, and the field-to-type map
//! for reference fields. Descriptors are plain serde types so the surrounding
//! application can declare them in config instead of code.

use crate::error::{OrmError, OrmResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

/// Immutable per-type table declaration, consumed verbatim by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    /// Entity type name, the registry key
    pub entity: String,
    /// Backing table
    pub table: String,
    /// Primary-key field name
    pub key: String,
    /// Fields `get` may return
    #[serde(default)]
    pub readable: BTreeSet<String>,
    /// Fields `set` may touch
    #[serde(default)]
    pub writable: BTreeSet<String>,
    /// Foreign-key field name to referenced entity type
    #[serde(default)]
    pub references: BTreeMap<String, String>,
}

impl EntityDescriptor {
    pub fn new(
        entity: impl Into<String>,
        table: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            entity: entity.into(),
            table: table.into(),
            key: key.into(),
            readable: BTreeSet::new(),
            writable: BTreeSet::new(),
            references: BTreeMap::new(),
        }
    }

    /// Mark fields readable (chainable).
    pub fn read(mut self, fields: &[&str]) -> Self {
        self.readable.extend(fields.iter().map(|f| f.to_string()));
        self
    }

    /// Mark fields writable (chainable).
    pub fn write(mut self, fields: &[&str]) -> Self {
        self.writable.extend(fields.iter().map(|f| f.to_string()));
        self
    }

    /// Declare a foreign-key field and the entity type it resolves to
    /// (chainable).
    pub fn reference_field(mut self, field: &str, target: &str) -> Self {
        self.references.insert(field.to_string(), target.to_string());
        self
    }

    /// The primary key field is always readable, declared or not.
    pub fn is_readable(&self, field: &str) -> bool {
        field == self.key || self.readable.contains(field)
    }

    pub fn is_writable(&self, field: &str) -> bool {
        self.writable.contains(field)
    }

    /// The referenced entity type, if `field` is a foreign-key field.
    pub fn reference_target(&self, field: &str) -> Option<&str> {
        self.references.get(field).map(String::as_str)
    }

    /// The SELECT field list for loading this entity: the readable set with
    /// the primary key folded in, in sorted order.
    pub fn load_fields(&self) -> Vec<String> {
        let mut fields = self.readable.clone();
        fields.insert(self.key.clone());
        fields.into_iter().collect()
    }
}

/// Registry of entity descriptors, keyed by entity type name.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    entities: BTreeMap<String, Rc<EntityDescriptor>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor (chainable). Re-registering a name replaces the
    /// earlier descriptor; entities already materialized keep the one they
    /// were built with.
    pub fn register(mut self, descriptor: EntityDescriptor) -> Self {
        self.entities
            .insert(descriptor.entity.clone(), Rc::new(descriptor));
        self
    }

    /// Build a schema from descriptors deserialized out of application config.
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = EntityDescriptor>) -> Self {
        descriptors
            .into_iter()
            .fold(Self::new(), |schema, d| schema.register(d))
    }

    /// Load a schema from a JSON array of descriptors.
    pub fn from_json(json: &str) -> OrmResult<Self> {
        let descriptors: Vec<EntityDescriptor> = serde_json::from_str(json)?;
        Ok(Self::from_descriptors(descriptors))
    }

    /// Look up a descriptor, failing with [`OrmError::UnknownEntity`].
    pub fn descriptor(&self, entity: &str) -> OrmResult<&Rc<EntityDescriptor>> {
        self.entities
            .get(entity)
            .ok_or_else(|| OrmError::UnknownEntity(entity.to_string()))
    }

    pub fn contains(&self, entity: &str) -> bool {
        self.entities.contains_key(entity)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
