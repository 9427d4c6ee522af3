//! Write payloads and unique keys.

use std::collections::BTreeMap;

use serde_json::{Map, Value as JsonValue};

use crate::config::ValidationConfig;
use crate::error::{ValidationError, path_with};
use crate::schema::entities::{Entity, EntityKind};
use crate::schema::field::{Cardinality, TableDef};
use crate::schema::parse::{DataMode, ObjectRules, expect_object, validate_object};
use crate::schema::value::{self, FieldValue, Row};

use super::relation::{RelationMutation, parse_relation_mutation};

/// Validated data for one row, with nested relation writes.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteData {
    pub entity: EntityKind,
    pub fields: Row,
    pub relations: BTreeMap<String, RelationMutation>,
}

impl WriteData {
    pub fn table(&self) -> &'static TableDef {
        self.entity.table()
    }
}

/// Where a data object sits in the request.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WriteContext<'a> {
    pub mode: DataMode,
    /// Foreign key filled in by the enclosing relation
    pub implied: Option<&'a str>,
    /// Inside a relation operation; further relation writes are rejected
    pub nested: bool,
}

impl WriteContext<'_> {
    pub fn top(mode: DataMode) -> Self {
        Self {
            mode,
            implied: None,
            nested: false,
        }
    }
}

pub(crate) fn parse_write_data(
    table: &TableDef,
    raw: &JsonValue,
    ctx: WriteContext<'_>,
    config: &ValidationConfig,
    path: &[String],
) -> Result<WriteData, ValidationError> {
    let map = expect_object(raw, path)?;
    let mut errors = ValidationError::default();
    let mut scalars = Map::new();
    let mut relations = BTreeMap::new();
    let mut satisfied: Vec<&str> = Vec::new();

    for (key, value) in map {
        let Some(relation) = table.relation(key) else {
            scalars.insert(key.clone(), value.clone());
            continue;
        };
        let key_path = path_with(path, key);

        if ctx.nested {
            errors.push(&key_path, "nested relation writes are limited to one level");
            continue;
        }
        if relation.owns_key && map.contains_key(relation.foreign_key) {
            errors.push(
                &key_path,
                format!(
                    "provide either '{}' or '{}', not both",
                    relation.foreign_key, relation.name
                ),
            );
            continue;
        }

        if let Some(mutation) =
            errors.absorb(parse_relation_mutation(relation, value, ctx.mode, config, &key_path))
        {
            if relation.owns_key && relation.cardinality == Cardinality::One {
                satisfied.push(relation.foreign_key);
            }
            relations.insert(key.clone(), mutation);
        }
    }

    let rules = ObjectRules {
        mode: ctx.mode,
        implied: ctx.implied,
        satisfied: &satisfied,
    };
    let fields = errors.absorb(validate_object(table, &scalars, rules, config, path));

    errors.finish(())?;
    Ok(WriteData {
        entity: table.entity,
        fields: fields.unwrap_or_default(),
        relations,
    })
}

/// Apply `f` to a single value or to each element of an array.
///
/// Array elements get their index appended to the path.
pub(crate) fn one_or_many<T>(
    raw: &JsonValue,
    path: &[String],
    mut f: impl FnMut(&JsonValue, &[String]) -> Result<T, ValidationError>,
) -> Result<Vec<T>, ValidationError> {
    match raw {
        JsonValue::Array(items) => {
            let mut errors = ValidationError::default();
            let mut out = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                if let Some(parsed) = errors.absorb(f(item, &path_with(path, index))) {
                    out.push(parsed);
                }
            }
            errors.finish(out)
        }
        _ => Ok(vec![f(raw, path)?]),
    }
}

// ============================================================================
// Unique keys
// ============================================================================

/// Selects exactly one row by a unique field.
#[derive(Debug, Clone, PartialEq)]
pub struct UniqueKey {
    pub field: String,
    pub value: FieldValue,
}

impl UniqueKey {
    pub fn new(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn id(id: impl Into<String>) -> Self {
        Self::new("id", FieldValue::String(id.into()))
    }

    /// Parse `{ "<unique field>": value }` for `E`.
    pub fn parse<E: Entity>(raw: &JsonValue) -> Result<Self, ValidationError> {
        parse_unique_key(E::table(), raw, &ValidationConfig::default(), &[])
    }

    /// Check a builder-made key against `E`'s table.
    pub fn validate<E: Entity>(&self) -> Result<(), ValidationError> {
        let mut errors = ValidationError::default();
        self.check(E::table(), &[], &mut errors);
        errors.finish(())
    }

    pub(crate) fn check(&self, table: &TableDef, path: &[String], errors: &mut ValidationError) {
        let field_path = path_with(path, &self.field);
        let Some(field) = table.field(&self.field).filter(|f| f.unique) else {
            errors.extend(not_unique(table, &self.field, &field_path));
            return;
        };
        if let Err(message) = value::coerce(&field.kind, self.value.clone()) {
            errors.push(&field_path, message);
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        row.get(&self.field)
            .is_some_and(|v| v.loosely_equals(&self.value))
    }

    pub fn to_json(&self) -> JsonValue {
        let mut map = Map::new();
        map.insert(self.field.clone(), self.value.to_json());
        JsonValue::Object(map)
    }
}

impl std::fmt::Display for UniqueKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} = {}", self.field, self.value)
    }
}

fn not_unique(table: &TableDef, field: &str, path: &[String]) -> ValidationError {
    let unique: Vec<_> = table.unique_fields().map(|f| f.name).collect();
    ValidationError::single(
        path,
        format!(
            "'{field}' is not a unique field of {}, expected one of: {}",
            table.name,
            unique.join(", ")
        ),
    )
}

pub(crate) fn parse_unique_key(
    table: &TableDef,
    raw: &JsonValue,
    config: &ValidationConfig,
    path: &[String],
) -> Result<UniqueKey, ValidationError> {
    let map = expect_object(raw, path)?;
    let mut entries = map.iter();
    let (Some((field_name, raw_value)), None) = (entries.next(), entries.next()) else {
        return Err(ValidationError::single(
            path,
            "expected exactly one unique field",
        ));
    };

    let field_path = path_with(path, field_name);
    let Some(field) = table.field(field_name).filter(|f| f.unique) else {
        return Err(not_unique(table, field_name, &field_path));
    };
    let value = value::convert(&field.kind, raw_value, config)
        .map_err(|message| ValidationError::single(&field_path, message))?;

    Ok(UniqueKey {
        field: field_name.clone(),
        value,
    })
}
