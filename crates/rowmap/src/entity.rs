//! Entity instances: shared handles onto cached rows.
//!
//! An [`Entity`] is a cheap clone of a shared handle; every caller that loads
//! the same (type, key) pair through one store holds the *same* instance, so
//! a mutation seen through one reference path is seen through all of them.
//! Reference fields hold resolved [`Entity`] handles, never raw foreign-key
//! scalars. Field writes land in a pending-change map that the store flushes
//! as a single UPDATE.

use crate::error::{OrmError, OrmResult};
use crate::query::CondValue;
use crate::schema::EntityDescriptor;
use crate::value::{Key, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// A current field value: a scalar, or a resolved reference to another entity.
#[derive(Debug, Clone)]
pub enum FieldValue {
    Scalar(Value),
    Ref(Entity),
}

impl FieldValue {
    /// Borrowing view of the scalar, if this is one.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            FieldValue::Scalar(v) => Some(v),
            FieldValue::Ref(_) => None,
        }
    }

    /// The referenced entity, if this is a reference field.
    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            FieldValue::Scalar(_) => None,
            FieldValue::Ref(e) => Some(e),
        }
    }

    /// Text content, if this is a text scalar.
    pub fn as_text(&self) -> Option<&str> {
        self.as_value().and_then(Value::as_text)
    }

    /// Integer content, if this is an integer scalar.
    pub fn as_int(&self) -> Option<i64> {
        self.as_value().and_then(Value::as_int)
    }
}

struct EntityInner {
    descriptor: Rc<EntityDescriptor>,
    key: Key,
    fields: HashMap<String, FieldValue>,
    /// Insertion-ordered field name to raw value, flushed by `Store::save`
    pending: Vec<(String, Value)>,
}

/// Shared handle to one cached row. Clones alias the same instance.
#[derive(Clone)]
pub struct Entity {
    inner: Rc<RefCell<EntityInner>>,
}

impl Entity {
    pub(crate) fn new(
        descriptor: Rc<EntityDescriptor>,
        key: Key,
        fields: HashMap<String, FieldValue>,
    ) -> Self {
        Self {
            inner: Rc::new(RefCell::new(EntityInner {
                descriptor,
                key,
                fields,
                pending: Vec::new(),
            })),
        }
    }

    /// The primary-key value. Immutable for the life of the instance.
    pub fn key(&self) -> Key {
        self.inner.borrow().key.clone()
    }

    /// The entity type name from the descriptor.
    pub fn entity_type(&self) -> String {
        self.inner.borrow().descriptor.entity.clone()
    }

    pub fn descriptor(&self) -> Rc<EntityDescriptor> {
        self.inner.borrow().descriptor.clone()
    }

    /// Current value of a field.
    ///
    /// Fails with [`OrmError::FieldNotReadable`] when the descriptor does not
    /// mark the field readable, and [`OrmError::UnknownField`] when the loaded
    /// row had no such column.
    pub fn get(&self, field: &str) -> OrmResult<FieldValue> {
        let inner = self.inner.borrow();
        if !inner.descriptor.is_readable(field) {
            return Err(OrmError::FieldNotReadable {
                entity: inner.descriptor.entity.clone(),
                field: field.to_string(),
            });
        }
        inner
            .fields
            .get(field)
            .cloned()
            .ok_or_else(|| OrmError::UnknownField(field.to_string()))
    }

    /// Whether unflushed pending changes exist.
    pub fn is_dirty(&self) -> bool {
        !self.inner.borrow().pending.is_empty()
    }

    /// Identity comparison: true only for handles onto the same instance.
    pub fn same(&self, other: &Entity) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn put_field(&self, field: &str, value: FieldValue) {
        self.inner
            .borrow_mut()
            .fields
            .insert(field.to_string(), value);
    }

    /// Record a pending raw value, replacing an earlier entry for the same
    /// field in place.
    pub(crate) fn record_pending(&self, field: &str, value: Value) {
        let mut inner = self.inner.borrow_mut();
        match inner.pending.iter_mut().find(|(f, _)| f == field) {
            Some(entry) => entry.1 = value,
            None => inner.pending.push((field.to_string(), value)),
        }
    }

    pub(crate) fn pending(&self) -> Vec<(String, Value)> {
        self.inner.borrow().pending.clone()
    }

    pub(crate) fn clear_pending(&self) {
        self.inner.borrow_mut().pending.clear();
    }
}

// Manual Debug: reference fields may form cycles, so only type and key are
// printed, never nested fields.
impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        write!(f, "Entity({} {})", inner.descriptor.entity, inner.key)
    }
}

impl From<&Entity> for CondValue {
    /// An entity on the right-hand side of a condition compares by its key.
    fn from(e: &Entity) -> Self {
        CondValue::Scalar(e.key().to_value())
    }
}

/// A value being assigned to a field: a scalar, or an already-resolved entity
/// for reference fields.
#[derive(Debug, Clone)]
pub enum AssignValue {
    Scalar(Value),
    Entity(Entity),
}

impl From<Value> for AssignValue {
    fn from(v: Value) -> Self {
        AssignValue::Scalar(v)
    }
}

impl From<Entity> for AssignValue {
    fn from(e: Entity) -> Self {
        AssignValue::Entity(e)
    }
}

impl From<&Entity> for AssignValue {
    fn from(e: &Entity) -> Self {
        AssignValue::Entity(e.clone())
    }
}

impl From<bool> for AssignValue {
    fn from(v: bool) -> Self {
        AssignValue::Scalar(v.into())
    }
}

impl From<i32> for AssignValue {
    fn from(v: i32) -> Self {
        AssignValue::Scalar(v.into())
    }
}

impl From<i64> for AssignValue {
    fn from(v: i64) -> Self {
        AssignValue::Scalar(v.into())
    }
}

impl From<f64> for AssignValue {
    fn from(v: f64) -> Self {
        AssignValue::Scalar(v.into())
    }
}

impl From<&str> for AssignValue {
    fn from(v: &str) -> Self {
        AssignValue::Scalar(v.into())
    }
}

impl From<String> for AssignValue {
    fn from(v: String) -> Self {
        AssignValue::Scalar(v.into())
    }
}
