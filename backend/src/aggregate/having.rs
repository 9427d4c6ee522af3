//! Group-level predicates.

use serde_json::{Map, Value as JsonValue};

use crate::config::ValidationConfig;
use crate::error::{ValidationError, path_with};
use crate::filter::Condition;
use crate::filter::parse::parse_condition;
use crate::schema::field::{FieldDef, FieldKind, TableDef};
use crate::schema::parse::expect_object;
use crate::schema::value::received;

use super::AggregateFunction;

/// Predicate over one group: its `by` key values and aggregate results.
#[derive(Debug, Clone, PartialEq)]
pub enum Having {
    And(Vec<Having>),
    Or(Vec<Having>),
    Not(Box<Having>),
    /// Condition on a grouping field
    Field { field: String, condition: Condition },
    /// Condition on an aggregate of `field` over the group
    Aggregate {
        function: AggregateFunction,
        field: String,
        condition: Condition,
    },
}

impl Having {
    pub fn field(field: impl Into<String>, condition: impl Into<Condition>) -> Self {
        Having::Field {
            field: field.into(),
            condition: condition.into(),
        }
    }

    pub fn aggregate(
        function: AggregateFunction,
        field: impl Into<String>,
        condition: impl Into<Condition>,
    ) -> Self {
        Having::Aggregate {
            function,
            field: field.into(),
            condition: condition.into(),
        }
    }

    pub fn and(clauses: impl IntoIterator<Item = Having>) -> Self {
        Having::And(clauses.into_iter().collect())
    }

    pub fn or(clauses: impl IntoIterator<Item = Having>) -> Self {
        Having::Or(clauses.into_iter().collect())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(inner: Having) -> Self {
        Having::Not(Box::new(inner))
    }

    pub(crate) fn check(
        &self,
        table: &TableDef,
        by: &[String],
        path: &[String],
        errors: &mut ValidationError,
    ) {
        match self {
            Having::And(clauses) | Having::Or(clauses) => {
                let key = if matches!(self, Having::And(_)) { "AND" } else { "OR" };
                for (index, clause) in clauses.iter().enumerate() {
                    let mut clause_path = path_with(path, key);
                    clause_path.push(index.to_string());
                    clause.check(table, by, &clause_path, errors);
                }
            }
            Having::Not(inner) => inner.check(table, by, &path_with(path, "NOT"), errors),
            Having::Field { field, condition } => {
                let field_path = path_with(path, field);
                let Some(def) = table.field(field) else {
                    errors.push(&field_path, format!("unknown field '{field}' on {}", table.name));
                    return;
                };
                if !by.contains(field) {
                    errors.push(
                        &field_path,
                        format!("'{field}' must be listed in 'by' to be used in having"),
                    );
                } else if !condition.accepts(&def.kind) {
                    errors.push(&field_path, mismatch(condition, def.kind.type_name(), field));
                } else {
                    condition.check_finite(&field_path, errors);
                }
            }
            Having::Aggregate {
                function,
                field,
                condition,
            } => {
                let agg_path = path_with(&path_with(path, field), function.key());
                match function.result_kind(table, field) {
                    Ok(kind) => {
                        if !condition.accepts(&kind) {
                            errors.push(&agg_path, mismatch(condition, kind.type_name(), field));
                        } else {
                            condition.check_finite(&agg_path, errors);
                        }
                    }
                    Err(message) => errors.push(&agg_path, message),
                }
            }
        }
    }

    pub fn to_json(&self) -> JsonValue {
        let single = |key: &str, value: JsonValue| {
            let mut map = Map::new();
            map.insert(key.to_string(), value);
            JsonValue::Object(map)
        };
        match self {
            Having::And(clauses) => single("AND", clauses.iter().map(Having::to_json).collect()),
            Having::Or(clauses) => single("OR", clauses.iter().map(Having::to_json).collect()),
            Having::Not(inner) => single("NOT", inner.to_json()),
            Having::Field { field, condition } => single(field, condition.to_json()),
            Having::Aggregate {
                function,
                field,
                condition,
            } => single(field, single(function.key(), condition.to_json())),
        }
    }
}

fn mismatch(condition: &Condition, type_name: &str, field: &str) -> String {
    format!(
        "{} cannot filter {type_name} value of '{field}'",
        condition.filter_name()
    )
}

/// Parse a having-input: field keys map to scalar operators and/or
/// `_count`/`_avg`/`_sum`/`_min`/`_max` operator objects.
pub(crate) fn parse_having(
    table: &TableDef,
    raw: &JsonValue,
    config: &ValidationConfig,
    path: &[String],
) -> Result<Having, ValidationError> {
    let map = expect_object(raw, path)?;
    let mut errors = ValidationError::default();
    let mut clauses = Vec::with_capacity(map.len());

    for (key, value) in map {
        let key_path = path_with(path, key);
        match key.as_str() {
            "AND" | "OR" | "NOT" => {
                let items: Vec<(usize, &JsonValue)> = match value {
                    JsonValue::Array(items) => items.iter().enumerate().collect(),
                    other => vec![(0, other)],
                };
                let is_list = value.is_array();
                let mut parsed = Vec::with_capacity(items.len());
                for (index, item) in items {
                    let item_path = if is_list {
                        path_with(&key_path, index)
                    } else {
                        key_path.clone()
                    };
                    if let Some(clause) = errors.absorb(parse_having(table, item, config, &item_path)) {
                        parsed.push(clause);
                    }
                }
                clauses.push(match key.as_str() {
                    "AND" => Having::And(parsed),
                    "OR" => Having::Or(parsed),
                    _ => {
                        let mut negated: Vec<Having> = parsed.into_iter().map(Having::not).collect();
                        if negated.len() == 1 {
                            negated.remove(0)
                        } else {
                            Having::And(negated)
                        }
                    }
                });
            }
            _ => {
                let Some(field) = table.field(key) else {
                    errors.push(&key_path, format!("unknown field '{key}' on {}", table.name));
                    continue;
                };
                if let Some(parsed) = errors.absorb(parse_field_having(table, field, value, config, &key_path)) {
                    clauses.extend(parsed);
                }
            }
        }
    }

    let having = if clauses.len() == 1 {
        clauses.remove(0)
    } else {
        Having::And(clauses)
    };
    errors.finish(having)
}

fn parse_field_having(
    table: &TableDef,
    field: &FieldDef,
    raw: &JsonValue,
    config: &ValidationConfig,
    path: &[String],
) -> Result<Vec<Having>, ValidationError> {
    let Some(map) = raw.as_object() else {
        let condition = parse_condition(field, raw, config, path)?;
        return Ok(vec![Having::field(field.name, condition)]);
    };

    let mut errors = ValidationError::default();
    let mut clauses = Vec::new();
    let mut scalar = Map::new();
    for (key, value) in map {
        if !key.starts_with('_') {
            scalar.insert(key.clone(), value.clone());
            continue;
        }
        let op_path = path_with(path, key);
        let Some(function) = AggregateFunction::from_key(key) else {
            errors.push(&op_path, format!("unknown aggregate '{key}'"));
            continue;
        };
        let kind = match function.result_kind(table, field.name) {
            Ok(kind) => kind,
            Err(message) => {
                errors.push(&op_path, message);
                continue;
            }
        };
        if !value.is_object() {
            errors.push(&op_path, format!("expected object, received {}", received(value)));
            continue;
        }
        let result_field = FieldDef::required(field.name, kind);
        if let Some(condition) = errors.absorb(parse_condition(&result_field, value, config, &op_path)) {
            clauses.push(Having::aggregate(function, field.name, condition));
        }
    }
    if !scalar.is_empty() {
        let scalar = JsonValue::Object(scalar);
        if let Some(condition) = errors.absorb(parse_condition(field, &scalar, config, path)) {
            clauses.push(Having::field(field.name, condition));
        }
    }
    errors.finish(clauses)
}

/// Result kind of an aggregate, used to type conditions on it.
pub(crate) fn aggregate_kind(function: AggregateFunction, kind: FieldKind) -> FieldKind {
    match function {
        AggregateFunction::Count => FieldKind::Int,
        AggregateFunction::Avg => FieldKind::Float,
        AggregateFunction::Sum | AggregateFunction::Min | AggregateFunction::Max => kind,
    }
}
