//! Ordering specifications and row comparison.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::{ValidationError, path_with};
use crate::filter::Record;
use crate::schema::field::TableDef;
use crate::schema::value::received;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderBy {
    pub field: String,
    pub direction: SortOrder,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortOrder::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortOrder::Desc,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        let mut map = Map::new();
        map.insert(
            self.field.clone(),
            JsonValue::String(self.direction.as_str().to_string()),
        );
        JsonValue::Object(map)
    }
}

/// Compare two records key by key; missing values sort first.
pub fn compare_records(order_by: &[OrderBy], a: &dyn Record, b: &dyn Record) -> Ordering {
    for key in order_by {
        let ordering = match (a.value(&key.field), b.value(&key.field)) {
            (Some(x), Some(y)) => x.compare(y),
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        let ordering = match key.direction {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Check sort keys: scalar fields of `table`, each listed once.
pub(crate) fn check_order_by(
    table: &TableDef,
    order_by: &[OrderBy],
    path: &[String],
    errors: &mut ValidationError,
) {
    for (index, key) in order_by.iter().enumerate() {
        let key_path = path_with(&path_with(path, index), &key.field);
        if table.field(&key.field).is_none() {
            let reason = if table.relation(&key.field).is_some() {
                format!("cannot order by relation '{}'", key.field)
            } else {
                format!("unknown field '{}' on {}", key.field, table.name)
            };
            errors.push(&key_path, reason);
        } else if order_by[..index].iter().any(|k| k.field == key.field) {
            errors.push(&key_path, format!("duplicate orderBy field '{}'", key.field));
        }
    }
}

/// Parse `{field: "asc"}` or `[{field: "asc"}, {other: "desc"}]`.
pub(crate) fn parse_order_by(raw: &JsonValue, path: &[String]) -> Result<Vec<OrderBy>, ValidationError> {
    let items: Vec<(&JsonValue, Vec<String>)> = match raw {
        JsonValue::Array(items) => items
            .iter()
            .enumerate()
            .map(|(index, item)| (item, path_with(path, index)))
            .collect(),
        _ => vec![(raw, path_with(path, 0))],
    };

    let mut errors = ValidationError::default();
    let mut out = Vec::new();
    for (item, item_path) in items {
        let Some(map) = item.as_object() else {
            errors.push(&item_path, format!("expected object, received {}", received(item)));
            continue;
        };
        if map.len() != 1 {
            errors.push(&item_path, "each orderBy entry names exactly one field");
            continue;
        }
        for (field, direction) in map {
            match direction.as_str().and_then(SortOrder::parse) {
                Some(direction) => out.push(OrderBy {
                    field: field.clone(),
                    direction,
                }),
                None => errors.push(&path_with(&item_path, field), "expected 'asc' or 'desc'"),
            }
        }
    }
    errors.finish(out)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::schema::entities::PROJECT;
    use crate::schema::value::{FieldValue, Row};

    fn row(start: i64, id: &str) -> Row {
        [
            ("startDate".to_string(), FieldValue::Int(start)),
            ("id".to_string(), FieldValue::from(id)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_ties_broken_by_next_key() {
        let order = [OrderBy::asc("startDate"), OrderBy::asc("id")];
        let (a, b) = (row(1, "a"), row(1, "b"));
        assert_eq!(compare_records(&order, &a, &b), Ordering::Less);
        let order = [OrderBy::desc("startDate"), OrderBy::desc("id")];
        assert_eq!(compare_records(&order, &a, &b), Ordering::Greater);
    }

    #[test]
    fn test_parse_and_check() {
        let parsed = parse_order_by(&json!([{"progress": "desc"}, {"id": "asc"}]), &[]).unwrap();
        assert_eq!(parsed, vec![OrderBy::desc("progress"), OrderBy::asc("id")]);
        assert!(parse_order_by(&json!({"progress": "up"}), &[]).is_err());

        let mut errors = ValidationError::default();
        check_order_by(
            &PROJECT,
            &[OrderBy::asc("id"), OrderBy::desc("id"), OrderBy::asc("budget")],
            &["orderBy".to_string()],
            &mut errors,
        );
        assert!(errors.has_path(&["orderBy", "1", "id"]));
        assert!(errors.has_path(&["orderBy", "2", "budget"]));
        assert_eq!(errors.issues.len(), 2);
    }
}
