//! In-memory repository.
//!
//! Tables are plain row vectors behind one `parking_lot::RwLock`. Every write
//! runs against a cloned draft that replaces the live tables only when the
//! whole plan succeeded.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

use crate::aggregate::{AggregateGroup, AggregateSpec};
use crate::error::{RepositoryError, RepositoryResult, ValidationError};
use crate::filter::{Record, Related, Where};
use crate::mutation::{
    CreatePlan, DeleteManyPlan, DeletePlan, ManyRelationMutation, OneRelationOp, RelationMutation,
    UniqueKey, UpdateManyPlan, UpdatePlan, UpsertPlan, WriteData,
};
use crate::query::args::Window;
use crate::query::{QueryArgs, Selection};
use crate::schema::entities::{Entity, EntityKind};
use crate::schema::field::{DefaultValue, FieldKind, Presence, RelationDef, TableDef};
use crate::schema::value::{FieldValue, Row, coerce};

use super::Repository;

#[derive(Debug, Clone, Default)]
struct Tables {
    rows: BTreeMap<EntityKind, Vec<Row>>,
}

/// Repository over in-process tables. Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert entities with the same checks as a create (defaults, foreign keys, unique fields).
    pub fn seed<E: Entity>(&self, items: impl IntoIterator<Item = E>) -> RepositoryResult<Vec<E>> {
        let rows = self.write(|tables| {
            items
                .into_iter()
                .map(|item| {
                    let data = WriteData {
                        entity: E::KIND,
                        fields: item.to_row(),
                        relations: BTreeMap::new(),
                    };
                    tables.insert(&data, None)
                })
                .collect::<RepositoryResult<Vec<Row>>>()
        })?;
        tracing::debug!(entity = %E::KIND, rows = rows.len(), "Seeded rows");
        rows.iter().map(|row| Ok(E::from_row(row)?)).collect()
    }

    /// Number of rows currently stored for `kind`.
    pub fn row_count(&self, kind: EntityKind) -> usize {
        self.tables.read().rows(kind).len()
    }

    /// Run `f` on a draft copy and commit it only if `f` succeeds.
    fn write<T>(&self, f: impl FnOnce(&mut Tables) -> RepositoryResult<T>) -> RepositoryResult<T> {
        let mut guard = self.tables.write();
        let mut draft = guard.clone();
        let out = f(&mut draft)?;
        *guard = draft;
        Ok(out)
    }
}

// ============================================================================
// Reads
// ============================================================================

/// A stored row that can follow its relations.
struct StoreRecord<'a> {
    tables: &'a Tables,
    kind: EntityKind,
    row: &'a Row,
}

impl Record for StoreRecord<'_> {
    fn value(&self, field: &str) -> Option<&FieldValue> {
        self.row.get(field)
    }

    fn related(&self, relation: &str) -> Related<'_> {
        let Some(def) = self.kind.table().relation(relation) else {
            return Related::NotLoaded;
        };
        let mut records = self.tables.related_rows(self.row, def).into_iter().map(|row| {
            Box::new(StoreRecord {
                tables: self.tables,
                kind: def.target,
                row,
            }) as Box<dyn Record + '_>
        });
        if def.is_many() {
            Related::Many(records.collect())
        } else {
            Related::One(records.next())
        }
    }
}

impl Tables {
    fn rows(&self, kind: EntityKind) -> &[Row] {
        self.rows.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }

    fn rows_mut(&mut self, kind: EntityKind) -> &mut Vec<Row> {
        self.rows.entry(kind).or_default()
    }

    fn records(&self, kind: EntityKind) -> Vec<StoreRecord<'_>> {
        self.rows(kind)
            .iter()
            .map(|row| StoreRecord {
                tables: self,
                kind,
                row,
            })
            .collect()
    }

    fn position(&self, kind: EntityKind, key: &UniqueKey) -> Option<usize> {
        self.rows(kind).iter().position(|row| key.matches(row))
    }

    fn position_by_id(&self, kind: EntityKind, id: &FieldValue) -> Option<usize> {
        self.rows(kind)
            .iter()
            .position(|row| row.get("id").is_some_and(|v| v.loosely_equals(id)))
    }

    fn existing_position(&self, kind: EntityKind, key: &UniqueKey) -> RepositoryResult<usize> {
        self.position(kind, key).ok_or_else(|| RepositoryError::Reference {
            entity: kind.name(),
            field: key.field.clone(),
            value: key.value.to_string(),
        })
    }

    /// Rows on the other side of `def` from `row`.
    fn related_rows(&self, row: &Row, def: &RelationDef) -> Vec<&Row> {
        let target = self.rows(def.target);
        if def.owns_key {
            let Some(fk) = row.get(def.foreign_key) else {
                return Vec::new();
            };
            target
                .iter()
                .filter(|r| r.get("id").is_some_and(|id| id.loosely_equals(fk)))
                .take(1)
                .collect()
        } else {
            let Some(id) = row.get("id") else {
                return Vec::new();
            };
            target
                .iter()
                .filter(|r| r.get(def.foreign_key).is_some_and(|v| v.loosely_equals(id)))
                .collect()
        }
    }

    /// Indices of target rows whose foreign key points at `parent_id`.
    fn linked(&self, def: &RelationDef, parent_id: &FieldValue) -> Vec<usize> {
        self.rows(def.target)
            .iter()
            .enumerate()
            .filter(|(_, row)| {
                row.get(def.foreign_key)
                    .is_some_and(|v| v.loosely_equals(parent_id))
            })
            .map(|(index, _)| index)
            .collect()
    }

    fn linked_position(&self, def: &RelationDef, parent_id: &FieldValue, key: &UniqueKey) -> Option<usize> {
        self.linked(def, parent_id)
            .into_iter()
            .find(|&index| key.matches(&self.rows(def.target)[index]))
    }

    fn matching(&self, kind: EntityKind, filter: &Where) -> Vec<usize> {
        self.records(kind)
            .iter()
            .enumerate()
            .filter(|(_, record)| filter.matches(*record))
            .map(|(index, _)| index)
            .collect()
    }

    fn matching_linked(&self, def: &RelationDef, parent_id: &FieldValue, filter: &Where) -> Vec<usize> {
        let matching = self.matching(def.target, filter);
        self.linked(def, parent_id)
            .into_iter()
            .filter(|index| matching.contains(index))
            .collect()
    }

    /// First relation with rows still pointing at `id`, and how many.
    fn dependents(&self, kind: EntityKind, id: &FieldValue) -> Option<(&'static RelationDef, usize)> {
        kind.table()
            .relations
            .iter()
            .filter(|def| !def.owns_key)
            .map(|def| (def, self.linked(def, id).len()))
            .find(|(_, count)| *count > 0)
    }

    /// JSON for `row` projected to `selection`, relations materialised.
    fn shape(&self, kind: EntityKind, row: &Row, selection: &Selection) -> JsonValue {
        let table = kind.table();
        let mut map: Map<String, JsonValue> = row
            .iter()
            .filter(|(field, _)| selection.includes_field(field))
            .map(|(field, value)| (field.clone(), value.to_json()))
            .collect();

        for (name, nested) in selection.relations().into_iter().flatten() {
            let Some(def) = table.relation(name) else {
                continue;
            };
            let related = self.related_rows(row, def);
            let value: JsonValue = if def.is_many() {
                let records: Vec<StoreRecord<'_>> = related
                    .iter()
                    .map(|row| StoreRecord {
                        tables: self,
                        kind: def.target,
                        row,
                    })
                    .collect();
                Window::of_relation(nested)
                    .select(&records)
                    .into_iter()
                    .map(|index| self.shape(def.target, related[index], &nested.selection))
                    .collect()
            } else {
                related
                    .first()
                    .map_or(JsonValue::Null, |row| self.shape(def.target, row, &nested.selection))
            };
            map.insert(name.clone(), value);
        }
        JsonValue::Object(map)
    }
}

// ============================================================================
// Writes
// ============================================================================

/// Foreign key column and the parent id it must hold.
type Link<'a> = (&'static str, &'a FieldValue);

fn id_of(row: &Row) -> RepositoryResult<FieldValue> {
    row.get("id")
        .cloned()
        .ok_or_else(|| RepositoryError::Backend(anyhow!("stored row has no id")))
}

fn relation_def(table: &TableDef, name: &str) -> RepositoryResult<&'static RelationDef> {
    table.relation(name).ok_or_else(|| {
        ValidationError::single(
            &[name.to_string()],
            format!("unknown relation '{name}' on {}", table.name),
        )
        .into()
    })
}

fn fill_defaults(table: &TableDef, row: &mut Row) {
    for field in table.fields {
        if row.contains_key(field.name) {
            continue;
        }
        match field.default {
            Some(DefaultValue::Uuid) => {
                row.insert(field.name.to_string(), FieldValue::String(Uuid::new_v4().to_string()));
            }
            Some(DefaultValue::Now) => {
                row.insert(field.name.to_string(), FieldValue::DateTime(Utc::now()));
            }
            None => {}
        }
    }
}

fn not_found(kind: EntityKind, key: impl ToString) -> RepositoryError {
    RepositoryError::NotFound {
        entity: kind.name(),
        key: key.to_string(),
    }
}

impl Tables {
    /// Values fit their fields, foreign keys resolve and unique fields stay unique.
    /// `skip` is the row being replaced.
    fn check_row(&self, kind: EntityKind, row: &Row, skip: Option<usize>) -> RepositoryResult<()> {
        let table = kind.table();
        for field in table.fields {
            let Some(value) = row.get(field.name) else {
                continue;
            };
            if let Err(message) = coerce(&field.kind, value.clone()) {
                return Err(ValidationError::single(&[field.name.to_string()], message).into());
            }
            if let FieldKind::ForeignKey(target) = field.kind {
                if self.position_by_id(target, value).is_none() {
                    return Err(RepositoryError::Reference {
                        entity: target.name(),
                        field: field.name.to_string(),
                        value: value.to_string(),
                    });
                }
            }
            if field.unique {
                let clash = self.rows(kind).iter().enumerate().any(|(index, other)| {
                    Some(index) != skip
                        && other.get(field.name).is_some_and(|v| v.loosely_equals(value))
                });
                if clash {
                    return Err(RepositoryError::Constraint {
                        entity: table.name,
                        field: field.name.to_string(),
                        message: format!("a {} with {} = {value} already exists", table.name, field.name),
                    });
                }
            }
        }
        Ok(())
    }

    fn insert(&mut self, data: &WriteData, link: Option<Link<'_>>) -> RepositoryResult<Row> {
        let kind = data.entity;
        let table = kind.table();
        let mut row = data.fields.clone();
        if let Some((fk, parent_id)) = link {
            row.insert(fk.to_string(), parent_id.clone());
        }
        self.resolve_parents(table, &mut row, &data.relations)?;
        fill_defaults(table, &mut row);
        self.check_row(kind, &row, None)?;

        let id = id_of(&row)?;
        self.rows_mut(kind).push(row);
        tracing::debug!(entity = %kind, %id, "Inserted row");

        self.apply_child_writes(table, &id, &data.relations)?;
        self.fetch(kind, &id)
    }

    fn update_at(&mut self, kind: EntityKind, index: usize, data: &WriteData) -> RepositoryResult<Row> {
        let table = kind.table();
        let mut row = self.rows(kind)[index].clone();
        let old_id = id_of(&row)?;
        row.extend(data.fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.resolve_parents(table, &mut row, &data.relations)?;

        let id = id_of(&row)?;
        if !id.loosely_equals(&old_id) {
            if let Some((def, count)) = self.dependents(kind, &old_id) {
                return Err(RepositoryError::Constraint {
                    entity: table.name,
                    field: "id".to_string(),
                    message: format!("{count} {} row(s) in '{}' still reference {old_id}", def.target, def.name),
                });
            }
        }
        self.check_row(kind, &row, Some(index))?;
        self.rows_mut(kind)[index] = row;
        tracing::debug!(entity = %kind, %id, "Updated row");

        self.apply_child_writes(table, &id, &data.relations)?;
        self.fetch(kind, &id)
    }

    fn delete_at(&mut self, kind: EntityKind, index: usize) -> RepositoryResult<Row> {
        let table = kind.table();
        let row = self.rows(kind)[index].clone();
        let id = id_of(&row)?;
        if let Some((def, count)) = self.dependents(kind, &id) {
            return Err(RepositoryError::Constraint {
                entity: table.name,
                field: def.name.to_string(),
                message: format!("{count} related {} row(s) still reference this {}", def.target, table.name),
            });
        }
        self.rows_mut(kind).remove(index);
        tracing::debug!(entity = %kind, %id, "Deleted row");
        Ok(row)
    }

    fn fetch(&self, kind: EntityKind, id: &FieldValue) -> RepositoryResult<Row> {
        self.position_by_id(kind, id)
            .map(|index| self.rows(kind)[index].clone())
            .ok_or_else(|| not_found(kind, format!("id = {id}")))
    }

    /// Point `row`'s own foreign keys at parents named by relation writes.
    fn resolve_parents(
        &mut self,
        table: &TableDef,
        row: &mut Row,
        relations: &BTreeMap<String, RelationMutation>,
    ) -> RepositoryResult<()> {
        for (name, mutation) in relations {
            let def = relation_def(table, name)?;
            let RelationMutation::One(mutation) = mutation else {
                continue;
            };
            if !def.owns_key {
                continue;
            }
            let current = row
                .get(def.foreign_key)
                .and_then(|fk| self.position_by_id(def.target, fk));

            let parent = match &mutation.op {
                OneRelationOp::Create(data) => self.insert(data, None)?,
                OneRelationOp::Connect(key) => {
                    let index = self.existing_position(def.target, key)?;
                    self.rows(def.target)[index].clone()
                }
                OneRelationOp::ConnectOrCreate(op) => match self.position(def.target, &op.key) {
                    Some(index) => self.rows(def.target)[index].clone(),
                    None => self.insert(&op.create, None)?,
                },
                OneRelationOp::Upsert { create, update } => match current {
                    Some(index) => self.update_at(def.target, index, update)?,
                    None => self.insert(create, None)?,
                },
                OneRelationOp::Update(data) => {
                    let index = current.ok_or_else(|| not_found(def.target, def.foreign_key))?;
                    self.update_at(def.target, index, data)?
                }
                OneRelationOp::Delete | OneRelationOp::Disconnect => {
                    return Err(RepositoryError::Constraint {
                        entity: table.name,
                        field: def.name.to_string(),
                        message: format!("relation '{}' is required", def.name),
                    });
                }
            };
            row.insert(def.foreign_key.to_string(), id_of(&parent)?);
        }
        Ok(())
    }

    /// Relation writes that touch rows pointing at `parent_id`.
    fn apply_child_writes(
        &mut self,
        table: &TableDef,
        parent_id: &FieldValue,
        relations: &BTreeMap<String, RelationMutation>,
    ) -> RepositoryResult<()> {
        for (name, mutation) in relations {
            let def = relation_def(table, name)?;
            if def.owns_key {
                continue;
            }
            match mutation {
                RelationMutation::Many(mutation) => self.apply_many(def, parent_id, mutation)?,
                RelationMutation::One(mutation) => self.apply_one(def, parent_id, &mutation.op)?,
            }
        }
        Ok(())
    }

    /// Point an existing target row at `parent_id`.
    fn attach(&mut self, def: &RelationDef, index: usize, parent_id: &FieldValue) -> RepositoryResult<()> {
        let mut row = self.rows(def.target)[index].clone();
        row.insert(def.foreign_key.to_string(), parent_id.clone());
        self.check_row(def.target, &row, Some(index))?;
        self.rows_mut(def.target)[index] = row;
        Ok(())
    }

    /// Clear a target row's foreign key; refused when the key is required.
    fn detach(&mut self, def: &RelationDef, index: usize) -> RepositoryResult<()> {
        let target = def.target.table();
        let required = target
            .field(def.foreign_key)
            .is_some_and(|f| f.presence == Presence::Required);
        if required {
            return Err(RepositoryError::Constraint {
                entity: target.name,
                field: def.foreign_key.to_string(),
                message: format!(
                    "{} cannot exist without its parent; delete it instead of disconnecting '{}'",
                    target.name, def.name
                ),
            });
        }
        self.rows_mut(def.target)[index].remove(def.foreign_key);
        Ok(())
    }

    /// Order: set, disconnect, delete, deleteMany, update, updateMany,
    /// upsert, create, createMany, connect, connectOrCreate.
    fn apply_many(
        &mut self,
        def: &RelationDef,
        parent_id: &FieldValue,
        ops: &ManyRelationMutation,
    ) -> RepositoryResult<()> {
        let target = def.target;
        let link = Some((def.foreign_key, parent_id));

        if let Some(keys) = &ops.set {
            let keep = keys
                .iter()
                .map(|key| self.existing_position(target, key))
                .collect::<RepositoryResult<Vec<usize>>>()?;
            for index in self.linked(def, parent_id) {
                if !keep.contains(&index) {
                    self.detach(def, index)?;
                }
            }
            for index in keep {
                self.attach(def, index, parent_id)?;
            }
        }
        for key in &ops.disconnect {
            if let Some(index) = self.linked_position(def, parent_id, key) {
                self.detach(def, index)?;
            }
        }
        for key in &ops.delete {
            let index = self
                .linked_position(def, parent_id, key)
                .ok_or_else(|| not_found(target, key))?;
            self.delete_at(target, index)?;
        }
        for filter in &ops.delete_many {
            for index in self.matching_linked(def, parent_id, filter).into_iter().rev() {
                self.delete_at(target, index)?;
            }
        }
        for op in &ops.update {
            let index = self
                .linked_position(def, parent_id, &op.key)
                .ok_or_else(|| not_found(target, &op.key))?;
            self.update_at(target, index, &op.data)?;
        }
        for op in &ops.update_many {
            for index in self.matching_linked(def, parent_id, &op.filter) {
                self.update_at(target, index, &op.data)?;
            }
        }
        for op in &ops.upsert {
            match self.linked_position(def, parent_id, &op.key) {
                Some(index) => self.update_at(target, index, &op.update)?,
                None => self.insert(&op.create, link)?,
            };
        }
        for data in &ops.create {
            self.insert(data, link)?;
        }
        if let Some(batch) = &ops.create_many {
            for data in &batch.data {
                match self.insert(data, link) {
                    Err(RepositoryError::Constraint { .. }) if batch.skip_duplicates => continue,
                    other => {
                        other?;
                    }
                }
            }
        }
        for key in &ops.connect {
            let index = self.existing_position(target, key)?;
            self.attach(def, index, parent_id)?;
        }
        for op in &ops.connect_or_create {
            match self.position(target, &op.key) {
                Some(index) => self.attach(def, index, parent_id)?,
                None => {
                    self.insert(&op.create, link)?;
                }
            }
        }
        Ok(())
    }

    /// A to-one relation whose foreign key lives on the target row.
    fn apply_one(&mut self, def: &RelationDef, parent_id: &FieldValue, op: &OneRelationOp) -> RepositoryResult<()> {
        let target = def.target;
        let link = Some((def.foreign_key, parent_id));
        let current = self.linked(def, parent_id).into_iter().next();
        let missing = || not_found(target, format!("{} = {parent_id}", def.foreign_key));

        match op {
            OneRelationOp::Create(data) => {
                self.insert(data, link)?;
            }
            OneRelationOp::Connect(key) => {
                let index = self.existing_position(target, key)?;
                self.replace_link(def, current, index, parent_id)?;
            }
            OneRelationOp::ConnectOrCreate(op) => match self.position(target, &op.key) {
                Some(index) => self.replace_link(def, current, index, parent_id)?,
                None => {
                    self.insert(&op.create, link)?;
                }
            },
            OneRelationOp::Upsert { create, update } => {
                match current {
                    Some(index) => self.update_at(target, index, update)?,
                    None => self.insert(create, link)?,
                };
            }
            OneRelationOp::Update(data) => {
                let index = current.ok_or_else(missing)?;
                self.update_at(target, index, data)?;
            }
            OneRelationOp::Delete => {
                let index = current.ok_or_else(missing)?;
                self.delete_at(target, index)?;
            }
            OneRelationOp::Disconnect => {
                if let Some(index) = current {
                    self.detach(def, index)?;
                }
            }
        }
        Ok(())
    }

    fn replace_link(
        &mut self,
        def: &RelationDef,
        current: Option<usize>,
        index: usize,
        parent_id: &FieldValue,
    ) -> RepositoryResult<()> {
        if let Some(current) = current.filter(|&current| current != index) {
            self.detach(def, current)?;
        }
        self.attach(def, index, parent_id)
    }
}

// ============================================================================
// Repository
// ============================================================================

fn to_entities<E: Entity>(rows: &[&Row]) -> RepositoryResult<Vec<E>> {
    rows.iter().map(|row| Ok(E::from_row(row)?)).collect()
}

#[async_trait]
impl<E: Entity> Repository<E> for InMemoryStore {
    async fn find_many(&self, args: &QueryArgs<E>) -> RepositoryResult<Vec<E>> {
        let tables = self.tables.read();
        let records = tables.records(E::KIND);
        let rows: Vec<&Row> = args
            .select_indices(&records)
            .into_iter()
            .map(|index| records[index].row)
            .collect();
        tracing::debug!(entity = %E::KIND, found = rows.len(), "find_many");
        to_entities(&rows)
    }

    async fn find_unique(&self, key: &UniqueKey) -> RepositoryResult<Option<E>> {
        key.validate::<E>()?;
        let tables = self.tables.read();
        tables
            .position(E::KIND, key)
            .map(|index| E::from_row(&tables.rows(E::KIND)[index]))
            .transpose()
            .map_err(RepositoryError::from)
    }

    async fn count(&self, args: &QueryArgs<E>) -> RepositoryResult<u64> {
        let tables = self.tables.read();
        let records = tables.records(E::KIND);
        Ok(args.select_indices(&records).len() as u64)
    }

    async fn find_many_shaped(&self, args: &QueryArgs<E>) -> RepositoryResult<Vec<JsonValue>> {
        let tables = self.tables.read();
        let records = tables.records(E::KIND);
        Ok(args
            .select_indices(&records)
            .into_iter()
            .map(|index| tables.shape(E::KIND, records[index].row, &args.selection))
            .collect())
    }

    async fn create(&self, plan: CreatePlan<E>) -> RepositoryResult<E> {
        let row = self.write(|tables| tables.insert(&plan.data, None))?;
        Ok(E::from_row(&row)?)
    }

    async fn update(&self, plan: UpdatePlan<E>) -> RepositoryResult<E> {
        let row = self.write(|tables| {
            let index = tables
                .position(E::KIND, &plan.key)
                .ok_or_else(|| not_found(E::KIND, &plan.key))?;
            tables.update_at(E::KIND, index, &plan.data)
        })?;
        Ok(E::from_row(&row)?)
    }

    async fn upsert(&self, plan: UpsertPlan<E>) -> RepositoryResult<E> {
        let row = self.write(|tables| match tables.position(E::KIND, &plan.key) {
            Some(index) => tables.update_at(E::KIND, index, &plan.update),
            None => tables.insert(&plan.create, None),
        })?;
        Ok(E::from_row(&row)?)
    }

    async fn delete(&self, plan: DeletePlan<E>) -> RepositoryResult<E> {
        let row = self.write(|tables| {
            let index = tables
                .position(E::KIND, &plan.key)
                .ok_or_else(|| not_found(E::KIND, &plan.key))?;
            tables.delete_at(E::KIND, index)
        })?;
        Ok(E::from_row(&row)?)
    }

    async fn update_many(&self, plan: UpdateManyPlan<E>) -> RepositoryResult<u64> {
        self.write(|tables| {
            let indices = tables.matching(E::KIND, &plan.filter);
            for &index in &indices {
                tables.update_at(E::KIND, index, &plan.data)?;
            }
            Ok(indices.len() as u64)
        })
    }

    async fn delete_many(&self, plan: DeleteManyPlan<E>) -> RepositoryResult<u64> {
        self.write(|tables| {
            let indices = tables.matching(E::KIND, &plan.filter);
            for &index in indices.iter().rev() {
                tables.delete_at(E::KIND, index)?;
            }
            Ok(indices.len() as u64)
        })
    }

    async fn aggregate(&self, spec: &AggregateSpec<E>) -> RepositoryResult<Vec<AggregateGroup>> {
        let tables = self.tables.read();
        let records = tables.records(E::KIND);
        Ok(spec.evaluate(&records))
    }
}
