//! Fluent builders for write inputs.
//!
//! Builders only assemble the raw input shape; plans are produced by running
//! that shape through the same parser used for untyped input, so a built plan
//! is validated exactly like a parsed one.

use serde_json::{Map, Value as JsonValue};

use crate::filter::Where;
use crate::schema::value::FieldValue;

use super::data::UniqueKey;

/// Field values and nested relation writes for one row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteInput {
    fields: Map<String, JsonValue>,
}

impl WriteInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(field.into(), value.into().to_json());
        self
    }

    /// Set a field from raw JSON, unchecked until the plan is built.
    pub fn set_raw(mut self, field: impl Into<String>, value: JsonValue) -> Self {
        self.fields.insert(field.into(), value);
        self
    }

    pub fn relation(mut self, name: impl Into<String>, write: NestedWrite) -> Self {
        self.fields.insert(name.into(), write.to_json());
        self
    }

    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(self.fields.clone())
    }
}

impl From<WriteInput> for JsonValue {
    fn from(input: WriteInput) -> Self {
        JsonValue::Object(input.fields)
    }
}

/// Operations for one relation key.
///
/// List operations called more than once accumulate. The `*_one` variants
/// target to-one relations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NestedWrite {
    lists: Vec<(&'static str, Vec<JsonValue>)>,
    values: Map<String, JsonValue>,
}

impl NestedWrite {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, op: &'static str, value: JsonValue) -> Self {
        match self.lists.iter_mut().find(|(name, _)| *name == op) {
            Some((_, items)) => items.push(value),
            None => self.lists.push((op, vec![value])),
        }
        self
    }

    fn put(mut self, op: &str, value: JsonValue) -> Self {
        self.values.insert(op.to_string(), value);
        self
    }

    pub fn create(self, data: WriteInput) -> Self {
        self.push("create", data.into())
    }

    pub fn create_many(self, data: impl IntoIterator<Item = WriteInput>, skip_duplicates: bool) -> Self {
        let rows: Vec<JsonValue> = data.into_iter().map(Into::into).collect();
        self.put(
            "createMany",
            serde_json::json!({"data": rows, "skipDuplicates": skip_duplicates}),
        )
    }

    pub fn connect(self, key: UniqueKey) -> Self {
        self.push("connect", key.to_json())
    }

    pub fn connect_or_create(self, key: UniqueKey, create: WriteInput) -> Self {
        self.push(
            "connectOrCreate",
            serde_json::json!({"where": key.to_json(), "create": JsonValue::from(create)}),
        )
    }

    pub fn upsert(self, key: UniqueKey, create: WriteInput, update: WriteInput) -> Self {
        self.push(
            "upsert",
            serde_json::json!({
                "where": key.to_json(),
                "create": JsonValue::from(create),
                "update": JsonValue::from(update),
            }),
        )
    }

    pub fn upsert_one(self, create: WriteInput, update: WriteInput) -> Self {
        self.put(
            "upsert",
            serde_json::json!({"create": JsonValue::from(create), "update": JsonValue::from(update)}),
        )
    }

    pub fn update(self, key: UniqueKey, data: WriteInput) -> Self {
        self.push(
            "update",
            serde_json::json!({"where": key.to_json(), "data": JsonValue::from(data)}),
        )
    }

    pub fn update_one(self, data: WriteInput) -> Self {
        self.put("update", data.into())
    }

    pub fn update_many(self, filter: &Where, data: WriteInput) -> Self {
        self.push(
            "updateMany",
            serde_json::json!({"where": filter.to_json(), "data": JsonValue::from(data)}),
        )
    }

    pub fn delete(self, key: UniqueKey) -> Self {
        self.push("delete", key.to_json())
    }

    pub fn delete_one(self) -> Self {
        self.put("delete", JsonValue::Bool(true))
    }

    pub fn delete_many(self, filter: &Where) -> Self {
        self.push("deleteMany", filter.to_json())
    }

    /// Replace the related set; an empty iterator clears it.
    pub fn set(self, keys: impl IntoIterator<Item = UniqueKey>) -> Self {
        let keys = keys.into_iter().map(|k| k.to_json()).collect();
        self.put("set", JsonValue::Array(keys))
    }

    pub fn disconnect(self, key: UniqueKey) -> Self {
        self.push("disconnect", key.to_json())
    }

    pub fn disconnect_one(self) -> Self {
        self.put("disconnect", JsonValue::Bool(true))
    }

    pub fn to_json(&self) -> JsonValue {
        let mut map = self.values.clone();
        for (op, items) in &self.lists {
            let value = match items.as_slice() {
                [single] => single.clone(),
                _ => JsonValue::Array(items.clone()),
            };
            map.insert(op.to_string(), value);
        }
        JsonValue::Object(map)
    }
}
