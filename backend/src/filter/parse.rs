//! Where-input parsing from raw JSON.
//!
//! Accepts the shape produced by [`Where::to_json`]: `AND`/`OR`/`NOT` keys,
//! field keys holding an operator object or a bare value (shorthand for
//! `equals`), and relation keys holding `some`/`every`/`none` or `is`/`isNot`.

use serde_json::{Map, Value as JsonValue};

use crate::config::ValidationConfig;
use crate::error::{ValidationError, path_with};
use crate::schema::entities::Entity;
use crate::schema::field::{FieldDef, FieldKind, RelationDef, TableDef};
use crate::schema::parse::expect_object;
use crate::schema::value::{self, FieldValue, received};

use super::predicate::{RelationCondition, Where};
use super::scalar::{BoolFilter, Condition, EnumFilter, QueryMode, ScalarFilter, StringFilter};

impl Where {
    /// Parse a where-input for `E`.
    pub fn parse<E: Entity>(raw: &JsonValue) -> Result<Where, ValidationError> {
        Self::parse_with::<E>(raw, &ValidationConfig::default())
    }

    pub fn parse_with<E: Entity>(
        raw: &JsonValue,
        config: &ValidationConfig,
    ) -> Result<Where, ValidationError> {
        parse_where(E::table(), raw, config, &[])
    }
}

pub(crate) fn parse_where(
    table: &TableDef,
    raw: &JsonValue,
    config: &ValidationConfig,
    path: &[String],
) -> Result<Where, ValidationError> {
    let map = expect_object(raw, path)?;
    let mut errors = ValidationError::default();
    let mut clauses = Vec::with_capacity(map.len());

    for (key, value) in map {
        let key_path = path_with(path, key);
        let clause = match key.as_str() {
            "AND" => parse_list(table, value, config, &key_path).map(Where::And),
            "OR" => parse_list(table, value, config, &key_path).map(Where::Or),
            "NOT" => parse_list(table, value, config, &key_path).map(|items| {
                let mut negated: Vec<Where> = items.into_iter().map(Where::not).collect();
                if negated.len() == 1 {
                    negated.remove(0)
                } else {
                    Where::And(negated)
                }
            }),
            _ => {
                if let Some(field) = table.field(key) {
                    parse_condition(field, value, config, &key_path).map(|condition| Where::Field {
                        field: key.clone(),
                        condition,
                    })
                } else if let Some(relation) = table.relation(key) {
                    parse_relation(relation, value, config, &key_path)
                } else {
                    Err(ValidationError::single(
                        &key_path,
                        format!("unknown field '{key}' on {}", table.name),
                    ))
                }
            }
        };
        if let Some(clause) = errors.absorb(clause) {
            clauses.push(clause);
        }
    }

    errors.finish(())?;
    Ok(if clauses.len() == 1 {
        clauses.remove(0)
    } else {
        Where::And(clauses)
    })
}

/// `AND`/`OR`/`NOT` accept a single object or an array of objects.
fn parse_list(
    table: &TableDef,
    raw: &JsonValue,
    config: &ValidationConfig,
    path: &[String],
) -> Result<Vec<Where>, ValidationError> {
    match raw {
        JsonValue::Array(items) => {
            let mut errors = ValidationError::default();
            let mut out = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                if let Some(w) = errors.absorb(parse_where(table, item, config, &path_with(path, index))) {
                    out.push(w);
                }
            }
            errors.finish(out)
        }
        JsonValue::Object(_) => Ok(vec![parse_where(table, raw, config, path)?]),
        other => Err(ValidationError::single(
            path,
            format!("expected object or array, received {}", received(other)),
        )),
    }
}

fn parse_relation(
    relation: &RelationDef,
    raw: &JsonValue,
    config: &ValidationConfig,
    path: &[String],
) -> Result<Where, ValidationError> {
    let target = relation.target.table();
    let wrap = |condition| Where::Relation {
        relation: relation.name.to_string(),
        condition,
    };

    if relation.is_many() {
        let map = expect_object(raw, path)?;
        if map.is_empty() {
            return Err(ValidationError::single(path, "expected one of: some, every, none"));
        }
        let mut errors = ValidationError::default();
        let mut clauses = Vec::new();
        for (key, value) in map {
            let key_path = path_with(path, key);
            let inner = match key.as_str() {
                "some" | "every" | "none" => parse_where(target, value, config, &key_path).map(Box::new),
                _ => Err(ValidationError::single(
                    &key_path,
                    format!("unknown operator '{key}' for list relation, expected one of: some, every, none"),
                )),
            };
            if let Some(inner) = errors.absorb(inner) {
                clauses.push(wrap(match key.as_str() {
                    "some" => RelationCondition::Some(inner),
                    "every" => RelationCondition::Every(inner),
                    _ => RelationCondition::None(inner),
                }));
            }
        }
        errors.finish(())?;
        return Ok(single_or_and(clauses));
    }

    // To-one: `null`, `{is: ..}`, `{isNot: ..}` or a bare where-input meaning `is`.
    let map = match raw {
        JsonValue::Null => return Ok(wrap(RelationCondition::Is(None))),
        _ => expect_object(raw, path)?,
    };
    let explicit = !map.is_empty() && map.keys().all(|k| k == "is" || k == "isNot");
    if !explicit {
        let inner = parse_where(target, raw, config, path)?;
        return Ok(wrap(RelationCondition::Is(Some(Box::new(inner)))));
    }

    let mut errors = ValidationError::default();
    let mut clauses = Vec::new();
    for (key, value) in map {
        let key_path = path_with(path, key);
        let inner = match value {
            JsonValue::Null => Ok(None),
            _ => parse_where(target, value, config, &key_path).map(|w| Some(Box::new(w))),
        };
        if let Some(inner) = errors.absorb(inner) {
            clauses.push(wrap(if key == "is" {
                RelationCondition::Is(inner)
            } else {
                RelationCondition::IsNot(inner)
            }));
        }
    }
    errors.finish(())?;
    Ok(single_or_and(clauses))
}

fn single_or_and(mut clauses: Vec<Where>) -> Where {
    if clauses.len() == 1 {
        clauses.remove(0)
    } else {
        Where::And(clauses)
    }
}

// ============================================================================
// Field conditions
// ============================================================================

/// Parse the filter for one field: an operator object or a bare value.
pub(crate) fn parse_condition(
    field: &FieldDef,
    raw: &JsonValue,
    config: &ValidationConfig,
    path: &[String],
) -> Result<Condition, ValidationError> {
    let kind = &field.kind;
    let reader = Operands { kind, config };

    let map = match raw {
        JsonValue::Object(map) => map,
        _ => {
            let value = reader.one(raw, path)?;
            return Ok(equals_condition(kind, value));
        }
    };

    match kind {
        FieldKind::Id | FieldKind::String | FieldKind::ForeignKey(_) => {
            parse_string_filter(&reader, map, path).map(Condition::String)
        }
        FieldKind::Int => parse_scalar_filter(&reader, map, path, FieldValue::as_i64).map(Condition::Int),
        FieldKind::Float => {
            parse_scalar_filter(&reader, map, path, FieldValue::as_f64).map(Condition::Float)
        }
        FieldKind::DateTime => {
            parse_scalar_filter(&reader, map, path, |v| v.as_datetime().copied()).map(Condition::Date)
        }
        FieldKind::Bool => parse_bool_filter(&reader, map, path).map(Condition::Bool),
        FieldKind::Enum(_) => parse_enum_filter(&reader, map, path).map(Condition::Enum),
    }
}

fn equals_condition(kind: &FieldKind, value: FieldValue) -> Condition {
    match (kind, value) {
        (FieldKind::Int, FieldValue::Int(i)) => Condition::Int(ScalarFilter::equals(i)),
        (FieldKind::Float, v) => Condition::Float(ScalarFilter::equals(v.as_f64().unwrap_or_default())),
        (FieldKind::DateTime, FieldValue::DateTime(dt)) => Condition::Date(ScalarFilter::equals(dt)),
        (FieldKind::Bool, FieldValue::Bool(b)) => Condition::Bool(BoolFilter::equals(b)),
        (FieldKind::Enum(_), v) => Condition::Enum(EnumFilter::equals(v.to_string())),
        (_, v) => Condition::String(StringFilter::equals(v.to_string())),
    }
}

/// Converts operator operands to the field's type.
struct Operands<'a> {
    kind: &'a FieldKind,
    config: &'a ValidationConfig,
}

impl Operands<'_> {
    fn one(&self, raw: &JsonValue, path: &[String]) -> Result<FieldValue, ValidationError> {
        value::convert(self.kind, raw, self.config).map_err(|message| ValidationError::single(path, message))
    }

    fn list(&self, raw: &JsonValue, path: &[String]) -> Result<Vec<FieldValue>, ValidationError> {
        let items = raw.as_array().ok_or_else(|| {
            ValidationError::single(path, format!("expected array, received {}", received(raw)))
        })?;
        let mut errors = ValidationError::default();
        let values = items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| errors.absorb(self.one(item, &path_with(path, index))))
            .collect();
        errors.finish(values)
    }

    fn unknown(&self, op: &str, path: &[String]) -> ValidationError {
        ValidationError::single(
            path,
            format!("unknown operator '{op}' for {} field", self.kind.type_name()),
        )
    }
}

fn parse_scalar_filter<T: Copy + PartialOrd>(
    reader: &Operands<'_>,
    map: &Map<String, JsonValue>,
    path: &[String],
    extract: fn(&FieldValue) -> Option<T>,
) -> Result<ScalarFilter<T>, ValidationError> {
    let mut errors = ValidationError::default();
    let mut filter = ScalarFilter::default();

    for (op, raw) in map {
        let op_path = path_with(path, op);
        let one = |errors: &mut ValidationError| {
            errors.absorb(reader.one(raw, &op_path)).and_then(|v| extract(&v))
        };
        match op.as_str() {
            "equals" => filter.equals = one(&mut errors),
            "lt" => filter.lt = one(&mut errors),
            "lte" => filter.lte = one(&mut errors),
            "gt" => filter.gt = one(&mut errors),
            "gte" => filter.gte = one(&mut errors),
            "in" | "notIn" => {
                let values = errors
                    .absorb(reader.list(raw, &op_path))
                    .map(|values| values.iter().filter_map(extract).collect());
                if op == "in" {
                    filter.in_list = values;
                } else {
                    filter.not_in = values;
                }
            }
            "not" => {
                let inner = match raw {
                    JsonValue::Object(inner) => parse_scalar_filter(reader, inner, &op_path, extract),
                    _ => reader
                        .one(raw, &op_path)
                        .map(|v| extract(&v).map(ScalarFilter::equals).unwrap_or_default()),
                };
                filter.not = errors.absorb(inner).map(Box::new);
            }
            _ => errors.extend(reader.unknown(op, &op_path)),
        }
    }

    errors.finish(filter)
}

fn parse_string_filter(
    reader: &Operands<'_>,
    map: &Map<String, JsonValue>,
    path: &[String],
) -> Result<StringFilter, ValidationError> {
    let mut errors = ValidationError::default();
    let mut filter = StringFilter::default();

    for (op, raw) in map {
        let op_path = path_with(path, op);
        let one = |errors: &mut ValidationError| {
            errors.absorb(reader.one(raw, &op_path)).map(|v| v.to_string())
        };
        match op.as_str() {
            "equals" => filter.equals = one(&mut errors),
            "lt" => filter.lt = one(&mut errors),
            "lte" => filter.lte = one(&mut errors),
            "gt" => filter.gt = one(&mut errors),
            "gte" => filter.gte = one(&mut errors),
            "contains" => filter.contains = one(&mut errors),
            "startsWith" => filter.starts_with = one(&mut errors),
            "endsWith" => filter.ends_with = one(&mut errors),
            "in" | "notIn" => {
                let values = errors
                    .absorb(reader.list(raw, &op_path))
                    .map(|values| values.iter().map(ToString::to_string).collect());
                if op == "in" {
                    filter.in_list = values;
                } else {
                    filter.not_in = values;
                }
            }
            "mode" => match raw.as_str() {
                Some("insensitive") => filter.mode = Some(QueryMode::Insensitive),
                Some("default") => filter.mode = Some(QueryMode::Default),
                _ => errors.push(&op_path, "expected one of: default, insensitive"),
            },
            "not" => {
                let inner = match raw {
                    JsonValue::Object(inner) => parse_string_filter(reader, inner, &op_path),
                    _ => reader.one(raw, &op_path).map(|v| StringFilter::equals(v.to_string())),
                };
                filter.not = errors.absorb(inner).map(Box::new);
            }
            _ => errors.extend(reader.unknown(op, &op_path)),
        }
    }

    errors.finish(filter)
}

fn parse_bool_filter(
    reader: &Operands<'_>,
    map: &Map<String, JsonValue>,
    path: &[String],
) -> Result<BoolFilter, ValidationError> {
    let mut errors = ValidationError::default();
    let mut filter = BoolFilter::default();

    for (op, raw) in map {
        let op_path = path_with(path, op);
        match op.as_str() {
            "equals" => filter.equals = errors.absorb(reader.one(raw, &op_path)).and_then(|v| v.as_bool()),
            "not" => {
                let inner = match raw {
                    JsonValue::Object(inner) => parse_bool_filter(reader, inner, &op_path),
                    _ => reader
                        .one(raw, &op_path)
                        .map(|v| v.as_bool().map(BoolFilter::equals).unwrap_or_default()),
                };
                filter.not = errors.absorb(inner).map(Box::new);
            }
            _ => errors.extend(reader.unknown(op, &op_path)),
        }
    }

    errors.finish(filter)
}

fn parse_enum_filter(
    reader: &Operands<'_>,
    map: &Map<String, JsonValue>,
    path: &[String],
) -> Result<EnumFilter, ValidationError> {
    let mut errors = ValidationError::default();
    let mut filter = EnumFilter::default();

    for (op, raw) in map {
        let op_path = path_with(path, op);
        match op.as_str() {
            "equals" => filter.equals = errors.absorb(reader.one(raw, &op_path)).map(|v| v.to_string()),
            "in" | "notIn" => {
                let values = errors
                    .absorb(reader.list(raw, &op_path))
                    .map(|values| values.iter().map(ToString::to_string).collect());
                if op == "in" {
                    filter.in_list = values;
                } else {
                    filter.not_in = values;
                }
            }
            "not" => {
                let inner = match raw {
                    JsonValue::Object(inner) => parse_enum_filter(reader, inner, &op_path),
                    _ => reader.one(raw, &op_path).map(|v| EnumFilter::equals(v.to_string())),
                };
                filter.not = errors.absorb(inner).map(Box::new);
            }
            _ => errors.extend(reader.unknown(op, &op_path)),
        }
    }

    errors.finish(filter)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::filter::scalar::{DateFilter, IntFilter};
    use crate::schema::entities::{CheckList, Project, UpcomingMilestone};
    use crate::schema::enums::Priority;

    #[test]
    fn test_shorthand_and_operator_objects() {
        let parsed = Where::parse::<CheckList>(&json!({
            "priority": "high",
            "completed": {"equals": false}
        }))
        .unwrap();

        assert_eq!(
            parsed,
            Where::and([
                Where::field("completed", BoolFilter::equals(false)),
                Where::field("priority", EnumFilter::equals(Priority::High)),
            ])
        );
    }

    #[test]
    fn test_single_clause_is_unwrapped() {
        let parsed = Where::parse::<Project>(&json!({"progress": {"gte": 10, "lt": 90}})).unwrap();
        assert_eq!(
            parsed,
            Where::field(
                "progress",
                IntFilter {
                    gte: Some(10),
                    lt: Some(90),
                    ..Default::default()
                }
            )
        );
        assert_eq!(Where::parse::<Project>(&json!({})).unwrap(), Where::all());
    }

    #[test]
    fn test_dates_are_normalised() {
        let parsed = Where::parse::<Project>(&json!({"startDate": {"gte": "2020-05-15"}})).unwrap();
        let expected = Utc.with_ymd_and_hms(2020, 5, 15, 0, 0, 0).unwrap();
        assert_eq!(parsed, Where::field("startDate", DateFilter::gte(expected)));
    }

    #[test]
    fn test_logical_keys() {
        let parsed = Where::parse::<Project>(&json!({
            "OR": [{"projectName": {"contains": "Harbor", "mode": "insensitive"}}, {"progress": 100}],
            "NOT": {"location": "Downtown"}
        }))
        .unwrap();
        let Where::And(clauses) = parsed else {
            panic!("expected AND");
        };
        assert_eq!(clauses.len(), 2);
        assert!(matches!(clauses[0], Where::Not(_)));
        assert!(matches!(&clauses[1], Where::Or(items) if items.len() == 2));
    }

    #[test]
    fn test_relation_keys() {
        let parsed = Where::parse::<Project>(&json!({
            "budget": {"some": {"spent": {"gt": 1000}}},
            "upcomingMilestone": null
        }))
        .unwrap();
        assert_eq!(
            parsed,
            Where::and([
                Where::some("budget", Where::field("spent", ScalarFilter::gt(1000.0))),
                Where::is_null("upcomingMilestone"),
            ])
        );

        let shorthand = Where::parse::<UpcomingMilestone>(&json!({"project": {"progress": 50}})).unwrap();
        assert_eq!(
            shorthand,
            Where::is("project", Where::field("progress", IntFilter::equals(50)))
        );
    }

    #[test]
    fn test_errors_are_aggregated_with_paths() {
        let err = Where::parse::<CheckList>(&json!({
            "priority": {"in": ["high", "urgent"]},
            "completed": {"contains": "x"},
            "assignee": {"startsWith": 3},
            "owner": "x",
            "AND": [{"dueDate": "soon"}]
        }))
        .unwrap_err();

        assert!(err.has_path(&["priority", "in", "1"]));
        assert!(err.has_path(&["completed", "contains"]));
        assert!(err.has_path(&["assignee", "startsWith"]));
        assert!(err.has_path(&["owner"]));
        assert!(err.has_path(&["AND", "0", "dueDate"]));
        assert_eq!(err.issues.len(), 5);
    }

    #[test]
    fn test_to_json_parses_back() {
        let tree = Where::and([
            Where::field("projectName", StringFilter::not(StringFilter::in_list(["A", "B"]))),
            Where::none("checkList", Where::field("completed", BoolFilter::equals(true))),
            Where::is_not_null("upcomingMilestone"),
        ]);
        assert_eq!(Where::parse::<Project>(&tree.to_json()).unwrap(), tree);
    }
}
