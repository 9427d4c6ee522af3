//! Predicate trees over entity fields and relations.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value as JsonValue};

use crate::error::{ValidationError, path_with};
use crate::schema::entities::Entity;
use crate::schema::field::{FieldKind, TableDef};
use crate::schema::enums::enum_message;
use crate::schema::value::{FieldValue, Row};

use super::scalar::Condition;

/// A composable boolean filter.
///
/// `And(vec![])` is true and `Or(vec![])` is false.
#[derive(Debug, Clone, PartialEq)]
pub enum Where {
    Field { field: String, condition: Condition },
    And(Vec<Where>),
    Or(Vec<Where>),
    Not(Box<Where>),
    Relation {
        relation: String,
        condition: RelationCondition,
    },
}

/// Condition on related rows.
#[derive(Debug, Clone, PartialEq)]
pub enum RelationCondition {
    /// At least one related row matches (to-many)
    Some(Box<Where>),
    /// All related rows match (to-many)
    Every(Box<Where>),
    /// No related row matches (to-many)
    None(Box<Where>),
    /// The related row matches; `None` means "there is no related row" (to-one)
    Is(Option<Box<Where>>),
    /// The related row does not match; `None` means "there is a related row" (to-one)
    IsNot(Option<Box<Where>>),
}

impl RelationCondition {
    fn key(&self) -> &'static str {
        match self {
            RelationCondition::Some(_) => "some",
            RelationCondition::Every(_) => "every",
            RelationCondition::None(_) => "none",
            RelationCondition::Is(_) => "is",
            RelationCondition::IsNot(_) => "isNot",
        }
    }

    fn is_to_many(&self) -> bool {
        matches!(
            self,
            RelationCondition::Some(_) | RelationCondition::Every(_) | RelationCondition::None(_)
        )
    }

    fn inner(&self) -> Option<&Where> {
        match self {
            RelationCondition::Some(w) | RelationCondition::Every(w) | RelationCondition::None(w) => {
                Some(w)
            }
            RelationCondition::Is(w) | RelationCondition::IsNot(w) => w.as_deref(),
        }
    }
}

/// Related rows as seen by a [`Record`].
pub enum Related<'a> {
    /// The relation was not materialised for this record
    NotLoaded,
    Many(Vec<Box<dyn Record + 'a>>),
    One(Option<Box<dyn Record + 'a>>),
}

/// Anything a predicate can be evaluated against.
pub trait Record {
    fn value(&self, field: &str) -> Option<&FieldValue>;

    fn related(&self, _relation: &str) -> Related<'_> {
        Related::NotLoaded
    }
}

impl Record for Row {
    fn value(&self, field: &str) -> Option<&FieldValue> {
        self.get(field)
    }
}

impl Where {
    pub fn field(field: impl Into<String>, condition: impl Into<Condition>) -> Self {
        Where::Field {
            field: field.into(),
            condition: condition.into(),
        }
    }

    pub fn and(clauses: impl IntoIterator<Item = Where>) -> Self {
        Where::And(clauses.into_iter().collect())
    }

    pub fn or(clauses: impl IntoIterator<Item = Where>) -> Self {
        Where::Or(clauses.into_iter().collect())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(inner: Where) -> Self {
        Where::Not(Box::new(inner))
    }

    /// Matches every record.
    pub fn all() -> Self {
        Where::And(Vec::new())
    }

    pub fn some(relation: impl Into<String>, inner: Where) -> Self {
        Self::relation(relation, RelationCondition::Some(Box::new(inner)))
    }

    pub fn every(relation: impl Into<String>, inner: Where) -> Self {
        Self::relation(relation, RelationCondition::Every(Box::new(inner)))
    }

    pub fn none(relation: impl Into<String>, inner: Where) -> Self {
        Self::relation(relation, RelationCondition::None(Box::new(inner)))
    }

    pub fn is(relation: impl Into<String>, inner: Where) -> Self {
        Self::relation(relation, RelationCondition::Is(Some(Box::new(inner))))
    }

    pub fn is_not(relation: impl Into<String>, inner: Where) -> Self {
        Self::relation(relation, RelationCondition::IsNot(Some(Box::new(inner))))
    }

    /// The to-one relation is absent.
    pub fn is_null(relation: impl Into<String>) -> Self {
        Self::relation(relation, RelationCondition::Is(None))
    }

    /// The to-one relation is present.
    pub fn is_not_null(relation: impl Into<String>) -> Self {
        Self::relation(relation, RelationCondition::IsNot(None))
    }

    fn relation(relation: impl Into<String>, condition: RelationCondition) -> Self {
        Where::Relation {
            relation: relation.into(),
            condition,
        }
    }

    // ------------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------------

    pub fn matches(&self, record: &dyn Record) -> bool {
        match self {
            Where::Field { field, condition } => condition.matches(record.value(field)),
            Where::And(clauses) => clauses.iter().all(|w| w.matches(record)),
            Where::Or(clauses) => clauses.iter().any(|w| w.matches(record)),
            Where::Not(inner) => !inner.matches(record),
            Where::Relation {
                relation,
                condition,
            } => match (condition, record.related(relation)) {
                (_, Related::NotLoaded) => false,
                (RelationCondition::Some(w), Related::Many(rows)) => {
                    rows.iter().any(|r| w.matches(r.as_ref()))
                }
                (RelationCondition::Every(w), Related::Many(rows)) => {
                    rows.iter().all(|r| w.matches(r.as_ref()))
                }
                (RelationCondition::None(w), Related::Many(rows)) => {
                    !rows.iter().any(|r| w.matches(r.as_ref()))
                }
                (RelationCondition::Is(None), Related::One(row)) => row.is_none(),
                (RelationCondition::Is(Some(w)), Related::One(row)) => {
                    row.is_some_and(|r| w.matches(r.as_ref()))
                }
                (RelationCondition::IsNot(None), Related::One(row)) => row.is_some(),
                (RelationCondition::IsNot(Some(w)), Related::One(row)) => {
                    row.is_none_or(|r| !w.matches(r.as_ref()))
                }
                _ => false,
            },
        }
    }

    /// Evaluate against an entity's own scalar fields.
    pub fn matches_entity<E: Entity>(&self, entity: &E) -> bool {
        self.matches(&entity.to_row())
    }

    // ------------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------------

    /// Check a builder-made tree against `E`'s table.
    pub fn validate<E: Entity>(&self) -> Result<(), ValidationError> {
        let mut errors = ValidationError::default();
        self.check(E::table(), &[], &mut errors);
        errors.finish(())
    }

    pub(crate) fn check(&self, table: &TableDef, path: &[String], errors: &mut ValidationError) {
        match self {
            Where::Field { field, condition } => {
                let field_path = path_with(path, field);
                let Some(def) = table.field(field) else {
                    errors.push(&field_path, format!("unknown field '{field}' on {}", table.name));
                    return;
                };
                if !condition.accepts(&def.kind) {
                    errors.push(
                        &field_path,
                        format!(
                            "{} cannot filter {} field '{field}'",
                            condition.filter_name(),
                            def.kind.type_name()
                        ),
                    );
                    return;
                }
                if let (Condition::Enum(filter), FieldKind::Enum(enum_def)) = (condition, def.kind) {
                    for value in filter.mentioned_values() {
                        if !enum_def.contains(value) {
                            errors.push(&field_path, enum_message(enum_def.name, enum_def.values, value));
                        }
                    }
                }
                condition.check_finite(&field_path, errors);
            }
            Where::And(clauses) | Where::Or(clauses) => {
                let key = if matches!(self, Where::And(_)) { "AND" } else { "OR" };
                for (index, clause) in clauses.iter().enumerate() {
                    let mut clause_path = path_with(path, key);
                    clause_path.push(index.to_string());
                    clause.check(table, &clause_path, errors);
                }
            }
            Where::Not(inner) => inner.check(table, &path_with(path, "NOT"), errors),
            Where::Relation {
                relation,
                condition,
            } => {
                let rel_path = path_with(path, relation);
                let Some(def) = table.relation(relation) else {
                    errors.push(&rel_path, format!("unknown relation '{relation}' on {}", table.name));
                    return;
                };
                if condition.is_to_many() != def.is_many() {
                    errors.push(
                        &rel_path,
                        format!("'{}' is not valid on relation '{relation}'", condition.key()),
                    );
                    return;
                }
                if let Some(inner) = condition.inner() {
                    inner.check(def.target.table(), &path_with(&rel_path, condition.key()), errors);
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // JSON form
    // ------------------------------------------------------------------------

    /// Where-input JSON accepted by [`Where::parse`].
    pub fn to_json(&self) -> JsonValue {
        match self {
            Where::Field { field, condition } => single(field, condition.to_json()),
            Where::And(clauses) => single("AND", clauses.iter().map(Where::to_json).collect()),
            Where::Or(clauses) => single("OR", clauses.iter().map(Where::to_json).collect()),
            Where::Not(inner) => single("NOT", inner.to_json()),
            Where::Relation {
                relation,
                condition,
            } => {
                let inner = condition.inner().map_or(JsonValue::Null, Where::to_json);
                single(relation, single(condition.key(), inner))
            }
        }
    }
}

fn single(key: &str, value: JsonValue) -> JsonValue {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    JsonValue::Object(map)
}

impl Serialize for Where {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::filter::scalar::{BoolFilter, EnumFilter, FloatFilter, IntFilter, StringFilter};
    use crate::schema::entities::{Budget, CheckList, Project};
    use crate::schema::enums::Priority;

    fn row(pairs: &[(&str, FieldValue)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_empty_combinators() {
        let record = row(&[("progress", FieldValue::Int(10))]);
        assert!(Where::and([]).matches(&record));
        assert!(!Where::or([]).matches(&record));
    }

    #[test]
    fn test_double_negation() {
        let p = Where::field("progress", IntFilter::gt(40));
        let double = Where::not(Where::not(p.clone()));
        for progress in [0, 40, 41, 100] {
            let record = row(&[("progress", FieldValue::Int(progress))]);
            assert_eq!(double.matches(&record), p.matches(&record));
        }
    }

    #[test]
    fn test_checklist_filter() {
        let filter = Where::and([
            Where::field("priority", EnumFilter::equals(Priority::High)),
            Where::field("completed", BoolFilter::equals(false)),
        ]);
        let open = row(&[
            ("priority", FieldValue::Enum("high".into())),
            ("completed", FieldValue::Bool(false)),
        ]);
        let done = row(&[
            ("priority", FieldValue::Enum("high".into())),
            ("completed", FieldValue::Bool(true)),
        ]);
        assert!(filter.matches(&open));
        assert!(!filter.matches(&done));
        assert!(filter.validate::<CheckList>().is_ok());
    }

    #[test]
    fn test_relation_on_unloaded_record_is_false() {
        let record = row(&[]);
        assert!(!Where::some("budget", Where::all()).matches(&record));
        assert!(!Where::none("budget", Where::all()).matches(&record));
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let filter = Where::and([
            Where::field("progress", StringFilter::equals("fifty")),
            Where::field("owner", StringFilter::equals("x")),
            Where::some("upcomingMilestone", Where::all()),
            Where::some("budget", Where::field("total", IntFilter::gt(5))),
        ]);
        let err = filter.validate::<Project>().unwrap_err();
        assert!(err.has_path(&["AND", "0", "progress"]));
        assert!(err.has_path(&["AND", "1", "owner"]));
        assert!(err.has_path(&["AND", "2", "upcomingMilestone"]));
        assert!(err.has_path(&["AND", "3", "budget", "some", "total"]));
    }

    #[test]
    fn test_enum_values_checked_against_registry() {
        let filter = Where::field("priority", EnumFilter::in_list(["high", "urgent"]));
        let err = filter.validate::<CheckList>().unwrap_err();
        assert_eq!(err.issues.len(), 1);
        assert!(err.issues[0].message.contains("'urgent'"));
    }

    #[test]
    fn test_to_json_shape() {
        let filter = Where::or([
            Where::field("projectName", StringFilter::contains("Harbor")),
            Where::is_null("upcomingMilestone"),
        ]);
        assert_eq!(
            filter.to_json(),
            json!({"OR": [
                {"projectName": {"contains": "Harbor"}},
                {"upcomingMilestone": {"is": null}}
            ]})
        );
    }

    #[test]
    fn test_non_finite_float_operands_are_rejected() {
        let filter = Where::and([
            Where::field("spent", FloatFilter::gt(f64::NAN)),
            Where::field(
                "total",
                FloatFilter {
                    in_list: Some(vec![1.0, f64::INFINITY]),
                    not: Some(Box::new(FloatFilter::lte(f64::NEG_INFINITY))),
                    ..Default::default()
                },
            ),
        ]);
        let err = filter.validate::<Budget>().unwrap_err();
        assert_eq!(err.issues.len(), 3);
        assert!(err.has_path(&["AND", "0", "spent", "gt"]));
        assert!(err.has_path(&["AND", "1", "total", "in", "1"]));
        assert!(err.has_path(&["AND", "1", "total", "not", "lte"]));
        assert!(err.issues.iter().all(|i| i.message.starts_with("expected finite number")));

        assert!(Where::field("spent", FloatFilter::gt(1.5)).validate::<Budget>().is_ok());
    }
}
