//! The identity-mapped entity store.
//!
//! One [`Store`] owns the connection, the schema, and one cache per entity
//! type keyed by primary key. The cache upholds the core invariant: at most
//! one live instance per (type, key) pair. Entries are created on first
//! successful load and removed only by explicit [`Store::release`] /
//! [`Store::release_all`] / [`Store::clear`]; there is no TTL or LRU.
//!
//! The store is single-threaded by construction: entity handles are
//! `Rc`-backed, so the type system rejects cross-thread sharing. Concurrent
//! workers each own their own store (and their own connection).

use crate::connection::{Connection, Row};
use crate::entity::{AssignValue, Entity, FieldValue};
use crate::error::{OrmError, OrmResult};
use crate::query::{Query, QueryKind};
use crate::schema::{EntityDescriptor, Schema};
use crate::value::{Key, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::ops::Deref;
use std::rc::Rc;

#[cfg(test)]
mod tests;

/// Identity-mapped entity store over one injected connection.
pub struct Store<C: Connection> {
    conn: C,
    schema: Schema,
    caches: RefCell<HashMap<String, HashMap<Key, Entity>>>,
}

impl<C: Connection> Store<C> {
    pub fn new(conn: C, schema: Schema) -> Self {
        Self {
            conn,
            schema,
            caches: RefCell::new(HashMap::new()),
        }
    }

    /// The underlying connection, for executing pre-scoped builders.
    pub fn connection(&self) -> &C {
        &self.conn
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    // ==================== Loading ====================

    /// Fetch the entity with the given primary key.
    ///
    /// A cache hit returns the existing handle without touching the backend.
    /// On a miss the row is selected, materialized (reference fields resolved
    /// recursively through their own type's cache) and registered. A missing
    /// row is a defined miss, `Ok(None)`; connection failures propagate as
    /// errors.
    pub fn by_key(&self, entity: &str, key: impl Into<Key>) -> OrmResult<Option<Entity>> {
        let key = key.into();
        let descriptor = self.schema.descriptor(entity)?.clone();
        if let Some(cached) = self.cached(entity, &key) {
            return Ok(Some(cached));
        }

        tracing::debug!(target: "rowmap::store", entity, key = %key, "cache miss, loading");
        let row = self
            .load_query(&descriptor)
            .eq(descriptor.key.as_str(), key.to_value())
            .limit(1)
            .fetch_opt(&self.conn)?;
        match row {
            Some(row) => self.materialize(&descriptor, row).map(Some),
            None => Ok(None),
        }
    }

    /// A SELECT builder pre-scoped to the entity's table and readable fields.
    /// Add conditions and hand it to [`Store::find`].
    pub fn query(&self, entity: &str) -> OrmResult<Query> {
        let descriptor = self.schema.descriptor(entity)?;
        Ok(self.load_query(descriptor))
    }

    /// Execute a pre-scoped select, requiring at least `n` matching rows.
    ///
    /// Zero matches is `Ok(None)`; fewer than `n` is
    /// [`OrmError::InsufficientRows`]; otherwise the first `n` rows are
    /// materialized through the cache. For a key already cached, the cached
    /// instance wins over the freshly fetched row.
    pub fn find(&self, entity: &str, n: usize, query: Query) -> OrmResult<Option<Vec<Entity>>> {
        let descriptor = self.schema.descriptor(entity)?.clone();
        match query.find(n, &self.conn)? {
            None => Ok(None),
            Some(rows) => rows
                .into_iter()
                .map(|row| self.materialize(&descriptor, row))
                .collect::<OrmResult<Vec<_>>>()
                .map(Some),
        }
    }

    fn load_query(&self, descriptor: &EntityDescriptor) -> Query {
        let fields = descriptor.load_fields();
        let fields: Vec<&str> = fields.iter().map(String::as_str).collect();
        crate::query::select(&descriptor.table, &fields)
    }

    /// Turn a fetched row into the canonical instance for its key.
    ///
    /// The instance is registered in the cache *before* reference fields are
    /// resolved, so cyclic references terminate: a cycle back to this key gets
    /// the handle that is still being filled in. When resolution fails the
    /// entry is evicted again; a failed load must not leave a half-built
    /// instance behind for a later cache hit.
    fn materialize(&self, descriptor: &Rc<EntityDescriptor>, row: Row) -> OrmResult<Entity> {
        let key = Key::try_from(row.try_get(&descriptor.key)?)?;
        if let Some(cached) = self.cached(&descriptor.entity, &key) {
            return Ok(cached);
        }

        let mut fields = HashMap::new();
        let mut deferred: Vec<(String, String, Key)> = Vec::new();
        for (column, value) in row.columns() {
            match descriptor.reference_target(column) {
                // A NULL foreign key stays a NULL scalar.
                Some(target) if !value.is_null() => {
                    deferred.push((column.to_string(), target.to_string(), Key::try_from(value)?));
                }
                _ => {
                    fields.insert(column.to_string(), FieldValue::Scalar(value.clone()));
                }
            }
        }

        let entity = Entity::new(descriptor.clone(), key.clone(), fields);
        self.caches
            .borrow_mut()
            .entry(descriptor.entity.clone())
            .or_default()
            .insert(key.clone(), entity.clone());

        if let Err(err) = self.resolve_references(&entity, deferred) {
            self.caches
                .borrow_mut()
                .get_mut(&descriptor.entity)
                .and_then(|cache| cache.remove(&key));
            return Err(err);
        }
        Ok(entity)
    }

    fn resolve_references(
        &self,
        entity: &Entity,
        deferred: Vec<(String, String, Key)>,
    ) -> OrmResult<()> {
        for (column, target, fk) in deferred {
            let referenced = self
                .by_key(&target, fk.clone())?
                .ok_or_else(|| OrmError::row_not_found(&target, &fk))?;
            entity.put_field(&column, FieldValue::Ref(referenced));
        }
        Ok(())
    }

    fn cached(&self, entity: &str, key: &Key) -> Option<Entity> {
        self.caches
            .borrow()
            .get(entity)
            .and_then(|cache| cache.get(key))
            .cloned()
    }

    // ==================== Invalidation ====================

    /// Drop a cache entry, discarding any unflushed pending changes.
    /// Reports whether an entry existed.
    pub fn release(&self, entity: &str, key: impl Into<Key>) -> OrmResult<bool> {
        self.schema.descriptor(entity)?;
        let removed = self
            .caches
            .borrow_mut()
            .get_mut(entity)
            .and_then(|cache| cache.remove(&key.into()));
        Ok(removed.is_some())
    }

    /// Drop every cache entry for one entity type.
    pub fn release_all(&self, entity: &str) -> OrmResult<()> {
        self.schema.descriptor(entity)?;
        self.caches.borrow_mut().remove(entity);
        Ok(())
    }

    /// Drop every cache entry for every entity type.
    pub fn clear(&self) {
        self.caches.borrow_mut().clear();
    }

    // ==================== Mutation ====================

    /// Assign a field value, recording a pending change for the next flush.
    ///
    /// Reference fields accept either a raw key (resolved now through the
    /// referenced type's cache; a dangling key is [`OrmError::RowNotFound`])
    /// or an already-resolved [`Entity`] of the exact expected type. The
    /// pending map stores the raw key for references and the scalar for
    /// everything else.
    pub fn set(
        &self,
        entity: &Entity,
        field: &str,
        value: impl Into<AssignValue>,
    ) -> OrmResult<()> {
        let descriptor = entity.descriptor();
        if !descriptor.is_writable(field) {
            return Err(OrmError::FieldNotWritable {
                entity: descriptor.entity.clone(),
                field: field.to_string(),
            });
        }

        match descriptor.reference_target(field) {
            Some(target) => {
                let referenced = match value.into() {
                    AssignValue::Entity(e) => {
                        if e.entity_type() != target {
                            return Err(OrmError::type_mismatch(target, e.entity_type()));
                        }
                        e
                    }
                    AssignValue::Scalar(raw) => {
                        let fk = Key::try_from(&raw)?;
                        self.by_key(target, fk.clone())?
                            .ok_or_else(|| OrmError::row_not_found(target, &fk))?
                    }
                };
                let raw = referenced.key().to_value();
                entity.put_field(field, FieldValue::Ref(referenced));
                entity.record_pending(field, raw);
            }
            None => {
                let scalar = match value.into() {
                    AssignValue::Scalar(v) => v,
                    AssignValue::Entity(e) => {
                        return Err(OrmError::type_mismatch("scalar", e.entity_type()));
                    }
                };
                entity.put_field(field, FieldValue::Scalar(scalar.clone()));
                entity.record_pending(field, scalar);
            }
        }
        Ok(())
    }

    /// Flush pending changes as one UPDATE of exactly the touched fields,
    /// filtered by primary key. With nothing pending this executes zero
    /// statements.
    pub fn save(&self, entity: &Entity) -> OrmResult<()> {
        let pending = entity.pending();
        if pending.is_empty() {
            return Ok(());
        }
        let descriptor = entity.descriptor();
        let mut query = Query::new(QueryKind::Update, &descriptor.table);
        for (field, value) in pending {
            query = query.set(&field, value);
        }
        query
            .eq(descriptor.key.as_str(), entity.key().to_value())
            .execute(&self.conn)?;
        entity.clear_pending();
        Ok(())
    }

    /// Acquire an entity for editing with a guaranteed flush on scope exit.
    ///
    /// Call [`EntityGuard::commit`] to flush and observe the result; a guard
    /// dropped without committing still flushes as a safety net, logging (not
    /// panicking on) a failure.
    pub fn checkout(
        &self,
        entity: &str,
        key: impl Into<Key>,
    ) -> OrmResult<Option<EntityGuard<'_, C>>> {
        Ok(self.by_key(entity, key)?.map(|entity| EntityGuard {
            store: self,
            entity,
            committed: false,
        }))
    }

    /// Insert a new row and return its canonical instance.
    ///
    /// Entity values in `fields` collapse to their key (a wrong reference
    /// type is [`OrmError::TypeMismatch`]). The new row is reloaded through
    /// [`Store::by_key`] with the connection's generated key, or with the
    /// explicitly supplied primary key when the backend reports none.
    pub fn insert_row(
        &self,
        entity: &str,
        fields: Vec<(&str, AssignValue)>,
    ) -> OrmResult<Entity> {
        let descriptor = self.schema.descriptor(entity)?.clone();
        let mut query = Query::new(QueryKind::Insert, &descriptor.table);
        let mut supplied_key: Option<Key> = None;
        for (field, value) in fields {
            let raw = match value {
                AssignValue::Scalar(v) => v,
                AssignValue::Entity(e) => match descriptor.reference_target(field) {
                    Some(target) if e.entity_type() == target => e.key().to_value(),
                    Some(target) => {
                        return Err(OrmError::type_mismatch(target, e.entity_type()));
                    }
                    None => return Err(OrmError::type_mismatch("scalar", e.entity_type())),
                },
            };
            if field == descriptor.key {
                supplied_key = Key::try_from(&raw).ok();
            }
            query = query.set(field, raw);
        }

        let result = query.execute(&self.conn)?;
        let key = result
            .last_insert_id()
            .cloned()
            .or(supplied_key)
            .ok_or_else(|| OrmError::connection("INSERT reported no generated key"))?;
        self.by_key(entity, key.clone())?
            .ok_or_else(|| OrmError::row_not_found(entity, &key))
    }

    // ==================== Bulk operations ====================

    /// A pre-scoped bulk-UPDATE builder for ad-hoc multi-row writes.
    ///
    /// Bulk writes bypass the identity cache entirely: cached entries for
    /// affected rows go stale until the caller [`Store::release`]s them.
    pub fn bulk_update<V: Into<Value>>(
        &self,
        entity: &str,
        assigns: impl IntoIterator<Item = (&'static str, V)>,
    ) -> OrmResult<Query> {
        let descriptor = self.schema.descriptor(entity)?;
        Ok(crate::query::update(&descriptor.table, assigns))
    }

    /// A pre-scoped bulk-DELETE builder. Same staleness caveat as
    /// [`Store::bulk_update`].
    pub fn bulk_delete(&self, entity: &str) -> OrmResult<Query> {
        let descriptor = self.schema.descriptor(entity)?;
        Ok(crate::query::delete(&descriptor.table))
    }
}

/// Scoped editing handle: guarantees a flush on every exit path.
pub struct EntityGuard<'a, C: Connection> {
    store: &'a Store<C>,
    entity: Entity,
    committed: bool,
}

impl<C: Connection> EntityGuard<'_, C> {
    /// Assign a field through the owning store.
    pub fn set(&self, field: &str, value: impl Into<AssignValue>) -> OrmResult<()> {
        self.store.set(&self.entity, field, value)
    }

    /// Flush now and report the outcome. Skips the drop-time safety net.
    pub fn commit(mut self) -> OrmResult<()> {
        self.committed = true;
        self.store.save(&self.entity)
    }

    /// The underlying shared handle, outliving the guard.
    pub fn entity(&self) -> Entity {
        self.entity.clone()
    }
}

impl<C: Connection> Deref for EntityGuard<'_, C> {
    type Target = Entity;

    fn deref(&self) -> &Entity {
        &self.entity
    }
}

impl<C: Connection> Drop for EntityGuard<'_, C> {
    fn drop(&mut self) {
        if self.committed || !self.entity.is_dirty() {
            return;
        }
        if let Err(err) = self.store.save(&self.entity) {
            tracing::error!(
                target: "rowmap::store",
                entity = %self.entity.entity_type(),
                key = %self.entity.key(),
                %err,
                "drop-time flush failed; pending changes lost"
            );
        }
    }
}
