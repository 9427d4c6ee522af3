//! Top-level mutation plans.

use std::marker::PhantomData;

use serde_json::Value as JsonValue;

use crate::config::ValidationConfig;
use crate::error::{ValidationError, path_with};
use crate::filter::Where;
use crate::filter::parse::parse_where;
use crate::schema::entities::Entity;
use crate::schema::parse::{DataMode, expect_object};

use super::builder::WriteInput;
use super::data::{UniqueKey, WriteContext, WriteData, parse_unique_key, parse_write_data};

/// Split a plan argument object into the requested keys, rejecting others.
fn args<'a>(
    raw: &'a JsonValue,
    required: &[&str],
    optional: &[&str],
) -> Result<Vec<Option<&'a JsonValue>>, ValidationError> {
    let map = expect_object(raw, &[])?;
    let mut errors = ValidationError::default();

    for key in map.keys() {
        if !required.contains(&key.as_str()) && !optional.contains(&key.as_str()) {
            errors.push(&[key.clone()], format!("unrecognized key '{key}'"));
        }
    }
    for key in required {
        if !map.contains_key(*key) {
            errors.push(&[key.to_string()], "required");
        }
    }

    errors.finish(required.iter().chain(optional).map(|key| map.get(*key)).collect())
}

fn top_data<E: Entity>(
    raw: &JsonValue,
    mode: DataMode,
    config: &ValidationConfig,
    key: &str,
) -> Result<WriteData, ValidationError> {
    parse_write_data(E::table(), raw, WriteContext::top(mode), config, &[key.to_string()])
}

fn top_key<E: Entity>(raw: &JsonValue, config: &ValidationConfig) -> Result<UniqueKey, ValidationError> {
    parse_unique_key(E::table(), raw, config, &["where".to_string()])
}

fn top_filter<E: Entity>(raw: Option<&JsonValue>, config: &ValidationConfig) -> Result<Where, ValidationError> {
    match raw {
        Some(raw) => parse_where(E::table(), raw, config, &["where".to_string()]),
        None => Ok(Where::all()),
    }
}

// ============================================================================
// Plans
// ============================================================================

/// Create one `E`, with nested relation writes.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatePlan<E> {
    pub data: WriteData,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> CreatePlan<E> {
    pub fn new(data: WriteInput) -> Result<Self, ValidationError> {
        Self::from_data(&data.into(), &ValidationConfig::default())
    }

    /// Parse `{ "data": {...} }`.
    pub fn parse(raw: &JsonValue) -> Result<Self, ValidationError> {
        Self::parse_with(raw, &ValidationConfig::default())
    }

    pub fn parse_with(raw: &JsonValue, config: &ValidationConfig) -> Result<Self, ValidationError> {
        let parts = args(raw, &["data"], &[])?;
        match parts[0] {
            Some(data) => Self::from_data(data, config),
            None => Err(ValidationError::single(&["data".to_string()], "required")),
        }
    }

    fn from_data(raw: &JsonValue, config: &ValidationConfig) -> Result<Self, ValidationError> {
        Ok(Self {
            data: top_data::<E>(raw, DataMode::Create, config, "data")?,
            _entity: PhantomData,
        })
    }
}

/// Update the `E` selected by a unique key.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdatePlan<E> {
    pub key: UniqueKey,
    pub data: WriteData,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> UpdatePlan<E> {
    pub fn new(key: UniqueKey, data: WriteInput) -> Result<Self, ValidationError> {
        Self::parse(&serde_json::json!({"where": key.to_json(), "data": JsonValue::from(data)}))
    }

    /// Parse `{ "where": {unique}, "data": {...} }`.
    pub fn parse(raw: &JsonValue) -> Result<Self, ValidationError> {
        Self::parse_with(raw, &ValidationConfig::default())
    }

    pub fn parse_with(raw: &JsonValue, config: &ValidationConfig) -> Result<Self, ValidationError> {
        let parts = args(raw, &["where", "data"], &[])?;
        let (Some(key), Some(data)) = (parts[0], parts[1]) else {
            return Err(ValidationError::default());
        };

        let mut errors = ValidationError::default();
        let key = errors.absorb(top_key::<E>(key, config));
        let data = errors.absorb(top_data::<E>(data, DataMode::Update, config, "data"));
        errors.finish(())?;

        Ok(Self {
            key: key.ok_or_else(ValidationError::default)?,
            data: data.ok_or_else(ValidationError::default)?,
            _entity: PhantomData,
        })
    }
}

/// Update the `E` selected by a unique key, or create it when absent.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertPlan<E> {
    pub key: UniqueKey,
    pub create: WriteData,
    pub update: WriteData,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> UpsertPlan<E> {
    pub fn new(key: UniqueKey, create: WriteInput, update: WriteInput) -> Result<Self, ValidationError> {
        Self::parse(&serde_json::json!({
            "where": key.to_json(),
            "create": JsonValue::from(create),
            "update": JsonValue::from(update),
        }))
    }

    /// Parse `{ "where": {unique}, "create": {...}, "update": {...} }`.
    pub fn parse(raw: &JsonValue) -> Result<Self, ValidationError> {
        Self::parse_with(raw, &ValidationConfig::default())
    }

    pub fn parse_with(raw: &JsonValue, config: &ValidationConfig) -> Result<Self, ValidationError> {
        let parts = args(raw, &["where", "create", "update"], &[])?;
        let (Some(key), Some(create), Some(update)) = (parts[0], parts[1], parts[2]) else {
            return Err(ValidationError::default());
        };

        let mut errors = ValidationError::default();
        let key = errors.absorb(top_key::<E>(key, config));
        let create = errors.absorb(top_data::<E>(create, DataMode::Create, config, "create"));
        let update = errors.absorb(top_data::<E>(update, DataMode::Update, config, "update"));
        errors.finish(())?;

        Ok(Self {
            key: key.ok_or_else(ValidationError::default)?,
            create: create.ok_or_else(ValidationError::default)?,
            update: update.ok_or_else(ValidationError::default)?,
            _entity: PhantomData,
        })
    }
}

/// Delete the `E` selected by a unique key.
#[derive(Debug, Clone, PartialEq)]
pub struct DeletePlan<E> {
    pub key: UniqueKey,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> DeletePlan<E> {
    pub fn new(key: UniqueKey) -> Result<Self, ValidationError> {
        key.validate::<E>()?;
        Ok(Self {
            key,
            _entity: PhantomData,
        })
    }

    /// Parse `{ "where": {unique} }`.
    pub fn parse(raw: &JsonValue) -> Result<Self, ValidationError> {
        Self::parse_with(raw, &ValidationConfig::default())
    }

    pub fn parse_with(raw: &JsonValue, config: &ValidationConfig) -> Result<Self, ValidationError> {
        let parts = args(raw, &["where"], &[])?;
        let Some(key) = parts[0] else {
            return Err(ValidationError::default());
        };
        Ok(Self {
            key: top_key::<E>(key, config)?,
            _entity: PhantomData,
        })
    }
}

/// Update every `E` matching a filter. Only scalar fields may be written.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateManyPlan<E> {
    pub filter: Where,
    pub data: WriteData,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> UpdateManyPlan<E> {
    pub fn new(filter: Where, data: WriteInput) -> Result<Self, ValidationError> {
        let mut errors = ValidationError::default();
        filter.check(E::table(), &["where".to_string()], &mut errors);
        errors.finish(())?;
        Self::parse(&serde_json::json!({"where": filter.to_json(), "data": JsonValue::from(data)}))
    }

    /// Parse `{ "where"?: {...}, "data": {...} }`.
    pub fn parse(raw: &JsonValue) -> Result<Self, ValidationError> {
        Self::parse_with(raw, &ValidationConfig::default())
    }

    pub fn parse_with(raw: &JsonValue, config: &ValidationConfig) -> Result<Self, ValidationError> {
        let parts = args(raw, &["data"], &["where"])?;
        let Some(data) = parts[0] else {
            return Err(ValidationError::default());
        };

        let mut errors = ValidationError::default();
        let filter = errors.absorb(top_filter::<E>(parts[1], config));
        let data = errors.absorb(top_data::<E>(data, DataMode::Update, config, "data"));
        if let Some(data) = &data {
            for name in data.relations.keys() {
                errors.push(
                    &path_with(&["data".to_string()], name),
                    "relation writes are not available in updateMany",
                );
            }
        }
        errors.finish(())?;

        Ok(Self {
            filter: filter.ok_or_else(ValidationError::default)?,
            data: data.ok_or_else(ValidationError::default)?,
            _entity: PhantomData,
        })
    }
}

/// Delete every `E` matching a filter.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteManyPlan<E> {
    pub filter: Where,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> DeleteManyPlan<E> {
    pub fn new(filter: Where) -> Result<Self, ValidationError> {
        filter.validate::<E>()?;
        Ok(Self {
            filter,
            _entity: PhantomData,
        })
    }

    /// Parse `{ "where"?: {...} }`.
    pub fn parse(raw: &JsonValue) -> Result<Self, ValidationError> {
        Self::parse_with(raw, &ValidationConfig::default())
    }

    pub fn parse_with(raw: &JsonValue, config: &ValidationConfig) -> Result<Self, ValidationError> {
        let parts = args(raw, &[], &["where"])?;
        Ok(Self {
            filter: top_filter::<E>(parts[0], config)?,
            _entity: PhantomData,
        })
    }
}

/// Any write against `E`.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationPlan<E> {
    Create(CreatePlan<E>),
    Update(UpdatePlan<E>),
    Upsert(UpsertPlan<E>),
    Delete(DeletePlan<E>),
    UpdateMany(UpdateManyPlan<E>),
    DeleteMany(DeleteManyPlan<E>),
}

impl<E: Entity> MutationPlan<E> {
    /// Parse the arguments of the named operation.
    pub fn parse(operation: &str, raw: &JsonValue) -> Result<Self, ValidationError> {
        Self::parse_with(operation, raw, &ValidationConfig::default())
    }

    pub fn parse_with(
        operation: &str,
        raw: &JsonValue,
        config: &ValidationConfig,
    ) -> Result<Self, ValidationError> {
        match operation {
            "create" => CreatePlan::parse_with(raw, config).map(MutationPlan::Create),
            "update" => UpdatePlan::parse_with(raw, config).map(MutationPlan::Update),
            "upsert" => UpsertPlan::parse_with(raw, config).map(MutationPlan::Upsert),
            "delete" => DeletePlan::parse_with(raw, config).map(MutationPlan::Delete),
            "updateMany" => UpdateManyPlan::parse_with(raw, config).map(MutationPlan::UpdateMany),
            "deleteMany" => DeleteManyPlan::parse_with(raw, config).map(MutationPlan::DeleteMany),
            other => Err(ValidationError::single(
                &[],
                format!(
                    "unknown operation '{other}', expected one of: create, update, upsert, delete, updateMany, deleteMany"
                ),
            )),
        }
    }

    pub fn operation(&self) -> &'static str {
        match self {
            MutationPlan::Create(_) => "create",
            MutationPlan::Update(_) => "update",
            MutationPlan::Upsert(_) => "upsert",
            MutationPlan::Delete(_) => "delete",
            MutationPlan::UpdateMany(_) => "updateMany",
            MutationPlan::DeleteMany(_) => "deleteMany",
        }
    }
}
