//! Nested relation writes.
//!
//! A relation key inside create/update data holds one of these. They only
//! describe intent; whether connect targets exist is decided by the
//! repository when the plan runs.

use serde_json::Value as JsonValue;

use crate::config::ValidationConfig;
use crate::error::{ValidationError, path_with};
use crate::filter::Where;
use crate::filter::parse::parse_where;
use crate::schema::entities::EntityKind;
use crate::schema::field::{Cardinality, RelationDef};
use crate::schema::parse::{DataMode, expect_object};

use super::data::{UniqueKey, WriteContext, WriteData, one_or_many, parse_unique_key, parse_write_data};

#[derive(Debug, Clone, PartialEq)]
pub enum RelationMutation {
    Many(ManyRelationMutation),
    One(OneRelationMutation),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateMany {
    pub data: Vec<WriteData>,
    /// Skip rows that would collide on a unique field instead of failing
    pub skip_duplicates: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectOrCreate {
    pub key: UniqueKey,
    pub create: WriteData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NestedUpsert {
    pub key: UniqueKey,
    pub create: WriteData,
    pub update: WriteData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NestedUpdate {
    pub key: UniqueKey,
    pub data: WriteData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NestedUpdateMany {
    pub filter: Where,
    pub data: WriteData,
}

/// Operations on a to-many relation. Each list may be empty.
#[derive(Debug, Clone, PartialEq)]
pub struct ManyRelationMutation {
    pub target: EntityKind,
    pub create: Vec<WriteData>,
    pub create_many: Option<CreateMany>,
    pub connect: Vec<UniqueKey>,
    pub connect_or_create: Vec<ConnectOrCreate>,
    pub upsert: Vec<NestedUpsert>,
    pub update: Vec<NestedUpdate>,
    pub update_many: Vec<NestedUpdateMany>,
    pub delete: Vec<UniqueKey>,
    pub delete_many: Vec<Where>,
    /// Replace the whole set with exactly these rows
    pub set: Option<Vec<UniqueKey>>,
    pub disconnect: Vec<UniqueKey>,
}

impl ManyRelationMutation {
    pub fn new(target: EntityKind) -> Self {
        Self {
            target,
            create: Vec::new(),
            create_many: None,
            connect: Vec::new(),
            connect_or_create: Vec::new(),
            upsert: Vec::new(),
            update: Vec::new(),
            update_many: Vec::new(),
            delete: Vec::new(),
            delete_many: Vec::new(),
            set: None,
            disconnect: Vec::new(),
        }
    }
}

/// The single operation on a to-one relation.
#[derive(Debug, Clone, PartialEq)]
pub struct OneRelationMutation {
    pub target: EntityKind,
    pub op: OneRelationOp,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OneRelationOp {
    Create(WriteData),
    Connect(UniqueKey),
    ConnectOrCreate(ConnectOrCreate),
    Upsert { create: WriteData, update: WriteData },
    Update(WriteData),
    Delete,
    Disconnect,
}

impl OneRelationOp {
    fn name(&self) -> &'static str {
        match self {
            OneRelationOp::Create(_) => "create",
            OneRelationOp::Connect(_) => "connect",
            OneRelationOp::ConnectOrCreate(_) => "connectOrCreate",
            OneRelationOp::Upsert { .. } => "upsert",
            OneRelationOp::Update(_) => "update",
            OneRelationOp::Delete => "delete",
            OneRelationOp::Disconnect => "disconnect",
        }
    }
}

const CREATE_OPS: &[&str] = &["create", "createMany", "connect", "connectOrCreate"];

pub(crate) fn parse_relation_mutation(
    relation: &RelationDef,
    raw: &JsonValue,
    mode: DataMode,
    config: &ValidationConfig,
    path: &[String],
) -> Result<RelationMutation, ValidationError> {
    if relation.is_many() {
        parse_many(relation, raw, mode, config, path).map(RelationMutation::Many)
    } else {
        parse_one(relation, raw, mode, config, path).map(RelationMutation::One)
    }
}

fn parse_many(
    relation: &RelationDef,
    raw: &JsonValue,
    mode: DataMode,
    config: &ValidationConfig,
    path: &[String],
) -> Result<ManyRelationMutation, ValidationError> {
    let map = expect_object(raw, path)?;
    if map.is_empty() {
        return Err(ValidationError::single(path, "expected at least one relation operation"));
    }

    let target = relation.target.table();
    let child = |mode: DataMode| WriteContext {
        mode,
        implied: Some(relation.foreign_key),
        nested: true,
    };
    let data = |raw: &JsonValue, mode: DataMode, path: &[String]| {
        parse_write_data(target, raw, child(mode), config, path)
    };
    let key = |raw: &JsonValue, path: &[String]| parse_unique_key(target, raw, config, path);

    let mut errors = ValidationError::default();
    let mut out = ManyRelationMutation::new(relation.target);

    for (op, value) in map {
        let op_path = path_with(path, op);
        if mode == DataMode::Create && !CREATE_OPS.contains(&op.as_str()) {
            errors.push(&op_path, format!("'{op}' is not available when creating"));
            continue;
        }

        match op.as_str() {
            "create" => {
                if let Some(items) = errors.absorb(one_or_many(value, &op_path, |raw, p| {
                    data(raw, DataMode::Create, p)
                })) {
                    out.create = items;
                }
            }
            "createMany" => {
                out.create_many = errors.absorb(parse_create_many(value, &op_path, |raw, p| {
                    data(raw, DataMode::Create, p)
                }));
            }
            "connect" => {
                if let Some(keys) = errors.absorb(one_or_many(value, &op_path, key)) {
                    out.connect = keys;
                }
            }
            "connectOrCreate" => {
                let parsed = one_or_many(value, &op_path, |raw, p| {
                    let parts = fields_of(raw, p, &["where", "create"])?;
                    let mut errors = ValidationError::default();
                    let key = errors.absorb(key(parts[0], &path_with(p, "where")));
                    let create = errors.absorb(data(parts[1], DataMode::Create, &path_with(p, "create")));
                    errors.finish(())?;
                    Ok(ConnectOrCreate {
                        key: key.ok_or_else(ValidationError::default)?,
                        create: create.ok_or_else(ValidationError::default)?,
                    })
                });
                if let Some(items) = errors.absorb(parsed) {
                    out.connect_or_create = items;
                }
            }
            "upsert" => {
                let parsed = one_or_many(value, &op_path, |raw, p| {
                    let parts = fields_of(raw, p, &["where", "create", "update"])?;
                    let mut errors = ValidationError::default();
                    let key = errors.absorb(key(parts[0], &path_with(p, "where")));
                    let create = errors.absorb(data(parts[1], DataMode::Create, &path_with(p, "create")));
                    let update = errors.absorb(data(parts[2], DataMode::Update, &path_with(p, "update")));
                    errors.finish(())?;
                    Ok(NestedUpsert {
                        key: key.ok_or_else(ValidationError::default)?,
                        create: create.ok_or_else(ValidationError::default)?,
                        update: update.ok_or_else(ValidationError::default)?,
                    })
                });
                if let Some(items) = errors.absorb(parsed) {
                    out.upsert = items;
                }
            }
            "update" => {
                let parsed = one_or_many(value, &op_path, |raw, p| {
                    let parts = fields_of(raw, p, &["where", "data"])?;
                    let mut errors = ValidationError::default();
                    let key = errors.absorb(key(parts[0], &path_with(p, "where")));
                    let data = errors.absorb(data(parts[1], DataMode::Update, &path_with(p, "data")));
                    errors.finish(())?;
                    Ok(NestedUpdate {
                        key: key.ok_or_else(ValidationError::default)?,
                        data: data.ok_or_else(ValidationError::default)?,
                    })
                });
                if let Some(items) = errors.absorb(parsed) {
                    out.update = items;
                }
            }
            "updateMany" => {
                let parsed = one_or_many(value, &op_path, |raw, p| {
                    let parts = fields_of(raw, p, &["where", "data"])?;
                    let mut errors = ValidationError::default();
                    let filter = errors.absorb(parse_where(target, parts[0], config, &path_with(p, "where")));
                    let data = errors.absorb(data(parts[1], DataMode::Update, &path_with(p, "data")));
                    errors.finish(())?;
                    Ok(NestedUpdateMany {
                        filter: filter.ok_or_else(ValidationError::default)?,
                        data: data.ok_or_else(ValidationError::default)?,
                    })
                });
                if let Some(items) = errors.absorb(parsed) {
                    out.update_many = items;
                }
            }
            "delete" => {
                if let Some(keys) = errors.absorb(one_or_many(value, &op_path, key)) {
                    out.delete = keys;
                }
            }
            "deleteMany" => {
                let parsed = one_or_many(value, &op_path, |raw, p| parse_where(target, raw, config, p));
                if let Some(filters) = errors.absorb(parsed) {
                    out.delete_many = filters;
                }
            }
            "set" => {
                if !value.is_array() {
                    errors.push(&op_path, "expected array of unique keys");
                    continue;
                }
                out.set = errors.absorb(one_or_many(value, &op_path, key));
            }
            "disconnect" => {
                if let Some(keys) = errors.absorb(one_or_many(value, &op_path, key)) {
                    out.disconnect = keys;
                }
            }
            _ => errors.push(&op_path, format!("unknown relation operation '{op}'")),
        }
    }

    errors.finish(out)
}

fn parse_create_many(
    raw: &JsonValue,
    path: &[String],
    mut data: impl FnMut(&JsonValue, &[String]) -> Result<WriteData, ValidationError>,
) -> Result<CreateMany, ValidationError> {
    let map = expect_object(raw, path)?;
    let mut errors = ValidationError::default();
    let mut rows = Vec::new();
    let mut skip_duplicates = false;

    for (key, value) in map {
        let key_path = path_with(path, key);
        match key.as_str() {
            "data" => {
                if let Some(items) = errors.absorb(one_or_many(value, &key_path, &mut data)) {
                    rows = items;
                }
            }
            "skipDuplicates" => match value.as_bool() {
                Some(flag) => skip_duplicates = flag,
                None => errors.push(&key_path, "expected boolean"),
            },
            _ => errors.push(&key_path, format!("unrecognized key '{key}'")),
        }
    }
    if !map.contains_key("data") {
        errors.push(&path_with(path, "data"), "required");
    }

    errors.finish(CreateMany {
        data: rows,
        skip_duplicates,
    })
}

/// Required keys of an operation object, in the order asked for.
fn fields_of<'a>(
    raw: &'a JsonValue,
    path: &[String],
    keys: &[&str],
) -> Result<Vec<&'a JsonValue>, ValidationError> {
    let map = expect_object(raw, path)?;
    let mut errors = ValidationError::default();

    for key in map.keys() {
        if !keys.contains(&key.as_str()) {
            errors.push(&path_with(path, key), format!("unrecognized key '{key}'"));
        }
    }
    let values: Vec<_> = keys
        .iter()
        .filter_map(|key| {
            let value = map.get(*key);
            if value.is_none() {
                errors.push(&path_with(path, key), "required");
            }
            value
        })
        .collect();

    errors.finish(values)
}

fn parse_one(
    relation: &RelationDef,
    raw: &JsonValue,
    mode: DataMode,
    config: &ValidationConfig,
    path: &[String],
) -> Result<OneRelationMutation, ValidationError> {
    let map = expect_object(raw, path)?;
    let mut entries = map.iter();
    let (Some((op, value)), None) = (entries.next(), entries.next()) else {
        return Err(ValidationError::single(
            path,
            "expected exactly one relation operation",
        ));
    };

    let op_path = path_with(path, op);
    if mode == DataMode::Create && !CREATE_OPS.contains(&op.as_str()) {
        return Err(ValidationError::single(
            &op_path,
            format!("'{op}' is not available when creating"),
        ));
    }

    let target = relation.target.table();
    // The parent side fills in the child's key; the child side creates or
    // connects a parent that carries no key back.
    let implied = (!relation.owns_key).then_some(relation.foreign_key);
    let data = |raw: &JsonValue, mode: DataMode, path: &[String]| {
        let ctx = WriteContext {
            mode,
            implied,
            nested: true,
        };
        parse_write_data(target, raw, ctx, config, path)
    };
    let flag = |raw: &JsonValue| {
        if raw.as_bool() == Some(true) {
            Ok(())
        } else {
            Err(ValidationError::single(&op_path, "expected true"))
        }
    };

    let op = match op.as_str() {
        "create" => OneRelationOp::Create(data(value, DataMode::Create, &op_path)?),
        "connect" => OneRelationOp::Connect(parse_unique_key(target, value, config, &op_path)?),
        "connectOrCreate" => {
            let parts = fields_of(value, &op_path, &["where", "create"])?;
            let mut errors = ValidationError::default();
            let key = errors.absorb(parse_unique_key(target, parts[0], config, &path_with(&op_path, "where")));
            let create = errors.absorb(data(parts[1], DataMode::Create, &path_with(&op_path, "create")));
            errors.finish(())?;
            OneRelationOp::ConnectOrCreate(ConnectOrCreate {
                key: key.ok_or_else(ValidationError::default)?,
                create: create.ok_or_else(ValidationError::default)?,
            })
        }
        "upsert" => {
            let parts = fields_of(value, &op_path, &["create", "update"])?;
            let mut errors = ValidationError::default();
            let create = errors.absorb(data(parts[0], DataMode::Create, &path_with(&op_path, "create")));
            let update = errors.absorb(data(parts[1], DataMode::Update, &path_with(&op_path, "update")));
            errors.finish(())?;
            OneRelationOp::Upsert {
                create: create.ok_or_else(ValidationError::default)?,
                update: update.ok_or_else(ValidationError::default)?,
            }
        }
        "update" => OneRelationOp::Update(data(value, DataMode::Update, &op_path)?),
        "delete" => flag(value).map(|_| OneRelationOp::Delete)?,
        "disconnect" => flag(value).map(|_| OneRelationOp::Disconnect)?,
        _ => {
            return Err(ValidationError::single(
                &op_path,
                format!("unknown relation operation '{op}'"),
            ));
        }
    };

    if relation.cardinality == Cardinality::One
        && matches!(op, OneRelationOp::Delete | OneRelationOp::Disconnect)
    {
        return Err(ValidationError::single(
            &op_path,
            format!(
                "relation '{}' is required and does not support '{}'",
                relation.name,
                op.name()
            ),
        ));
    }

    Ok(OneRelationMutation {
        target: relation.target,
        op,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::schema::entities::{PROJECT, UPCOMING_MILESTONE};

    fn relation(table: &crate::schema::field::TableDef, name: &str) -> &'static RelationDef {
        table.relation(name).unwrap()
    }

    #[test]
    fn test_many_create_forbids_parent_key() {
        let raw = json!({"create": [{"total": 100.0, "spent": 1.0, "projectId": "p9"}]});
        let err = parse_relation_mutation(
            relation(&PROJECT, "budget"),
            &raw,
            DataMode::Create,
            &ValidationConfig::default(),
            &["budget".to_string()],
        )
        .unwrap_err();
        assert!(err.has_path(&["budget", "create", "0", "projectId"]));
    }

    #[test]
    fn test_update_only_ops_rejected_on_create() {
        let raw = json!({"set": [], "connect": {"id": "b1"}});
        let err = parse_relation_mutation(
            relation(&PROJECT, "budget"),
            &raw,
            DataMode::Create,
            &ValidationConfig::default(),
            &[],
        )
        .unwrap_err();
        assert!(err.has_path(&["set"]));
        assert_eq!(err.issues.len(), 1);
    }

    #[test]
    fn test_many_update_ops() {
        let raw = json!({
            "updateMany": {"where": {"spent": {"gt": 10}}, "data": {"spent": 0}},
            "deleteMany": [{"total": 0}],
            "set": [{"id": "b1"}, {"id": "b2"}],
            "disconnect": {"id": "b3"}
        });
        let RelationMutation::Many(m) = parse_relation_mutation(
            relation(&PROJECT, "budget"),
            &raw,
            DataMode::Update,
            &ValidationConfig::default(),
            &[],
        )
        .unwrap() else {
            panic!("expected to-many mutation");
        };
        assert_eq!(m.update_many.len(), 1);
        assert_eq!(m.delete_many.len(), 1);
        assert_eq!(m.set.as_ref().map(Vec::len), Some(2));
        assert_eq!(m.disconnect, vec![UniqueKey::id("b3")]);
    }

    #[test]
    fn test_one_relation_requires_single_op() {
        let rel = relation(&PROJECT, "upcomingMilestone");
        let config = ValidationConfig::default();
        let both = json!({"connect": {"id": "m1"}, "disconnect": true});
        assert!(parse_relation_mutation(rel, &both, DataMode::Update, &config, &[]).is_err());

        let ok = parse_relation_mutation(rel, &json!({"disconnect": true}), DataMode::Update, &config, &[]);
        assert!(matches!(
            ok,
            Ok(RelationMutation::One(OneRelationMutation { op: OneRelationOp::Disconnect, .. }))
        ));
    }

    #[test]
    fn test_required_parent_cannot_be_disconnected() {
        let rel = relation(&UPCOMING_MILESTONE, "project");
        let err = parse_relation_mutation(
            rel,
            &json!({"disconnect": true}),
            DataMode::Update,
            &ValidationConfig::default(),
            &[],
        )
        .unwrap_err();
        assert!(err.issues[0].message.contains("required"));
    }
}
