//! Grouping and aggregate computation over in-memory records.

use std::collections::BTreeMap;

use serde_json::{Map, Value as JsonValue};

use crate::filter::Record;
use crate::schema::value::{FieldValue, Row};

use super::having::Having;
use super::AggregateFunction;

/// One result row of an aggregate request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateGroup {
    /// Values of the `by` fields for this group
    pub key: Row,
    /// `_all` and per-field non-null counts
    pub count: BTreeMap<String, u64>,
    pub avg: BTreeMap<String, Option<f64>>,
    pub sum: BTreeMap<String, Option<FieldValue>>,
    pub min: BTreeMap<String, Option<FieldValue>>,
    pub max: BTreeMap<String, Option<FieldValue>>,
}

impl AggregateGroup {
    /// Prisma-style result object: key fields plus `_count`, `_avg`, ... sections.
    pub fn to_json(&self) -> JsonValue {
        let mut map: Map<String, JsonValue> = self
            .key
            .iter()
            .map(|(field, value)| (field.clone(), value.to_json()))
            .collect();
        if !self.count.is_empty() {
            map.insert(
                "_count".to_string(),
                self.count
                    .iter()
                    .map(|(field, n)| (field.clone(), JsonValue::from(*n)))
                    .collect::<Map<_, _>>()
                    .into(),
            );
        }
        if !self.avg.is_empty() {
            map.insert(
                "_avg".to_string(),
                self.avg
                    .iter()
                    .map(|(field, v)| (field.clone(), v.map_or(JsonValue::Null, JsonValue::from)))
                    .collect::<Map<_, _>>()
                    .into(),
            );
        }
        for (key, section) in [("_sum", &self.sum), ("_min", &self.min), ("_max", &self.max)] {
            if !section.is_empty() {
                map.insert(key.to_string(), optional_values(section));
            }
        }
        JsonValue::Object(map)
    }
}

fn optional_values(section: &BTreeMap<String, Option<FieldValue>>) -> JsonValue {
    section
        .iter()
        .map(|(field, v)| (field.clone(), v.as_ref().map_or(JsonValue::Null, FieldValue::to_json)))
        .collect::<Map<_, _>>()
        .into()
}

/// Record indices sharing one `by` key, in first-seen order.
pub(crate) fn group_indices<R: Record>(records: &[R], indices: &[usize], by: &[String]) -> Vec<(Row, Vec<usize>)> {
    let mut groups: Vec<(Vec<Option<FieldValue>>, Vec<usize>)> = Vec::new();
    for &index in indices {
        let key: Vec<Option<FieldValue>> = by.iter().map(|f| records[index].value(f).cloned()).collect();
        match groups.iter_mut().find(|(existing, _)| same_key(existing, &key)) {
            Some((_, members)) => members.push(index),
            None => groups.push((key, vec![index])),
        }
    }
    groups
        .into_iter()
        .map(|(key, members)| {
            let row = by
                .iter()
                .zip(key)
                .filter_map(|(field, value)| Some((field.clone(), value?)))
                .collect();
            (row, members)
        })
        .collect()
}

fn same_key(a: &[Option<FieldValue>], b: &[Option<FieldValue>]) -> bool {
    a.iter().zip(b).all(|pair| match pair {
        (Some(x), Some(y)) => x.loosely_equals(y),
        (None, None) => true,
        _ => false,
    })
}

/// Compute `function` over `field` for the group members.
///
/// `field` is `_all` for a row count. Empty inputs give `None` except for counts.
pub(crate) fn compute<R: Record>(
    function: AggregateFunction,
    field: &str,
    records: &[R],
    members: &[usize],
) -> Option<FieldValue> {
    if function == AggregateFunction::Count && field == "_all" {
        return Some(FieldValue::Int(members.len() as i64));
    }
    let values: Vec<&FieldValue> = members.iter().filter_map(|&i| records[i].value(field)).collect();
    match function {
        AggregateFunction::Count => Some(FieldValue::Int(values.len() as i64)),
        AggregateFunction::Avg => {
            let numbers: Vec<f64> = values.iter().filter_map(|v| v.as_f64()).collect();
            if numbers.is_empty() {
                None
            } else {
                Some(FieldValue::Float(numbers.iter().sum::<f64>() / numbers.len() as f64))
            }
        }
        AggregateFunction::Sum => {
            if values.is_empty() {
                return None;
            }
            if values.iter().all(|v| matches!(v, FieldValue::Int(_))) {
                let total = values
                    .iter()
                    .filter_map(|v| v.as_i64())
                    .fold(0i64, i64::saturating_add);
                Some(FieldValue::Int(total))
            } else {
                Some(FieldValue::Float(values.iter().filter_map(|v| v.as_f64()).sum()))
            }
        }
        AggregateFunction::Min => values.into_iter().min_by(|a, b| a.compare(b)).cloned(),
        AggregateFunction::Max => values.into_iter().max_by(|a, b| a.compare(b)).cloned(),
    }
}

/// Evaluate a having predicate against one group.
pub(crate) fn group_matches<R: Record>(having: &Having, key: &Row, records: &[R], members: &[usize]) -> bool {
    match having {
        Having::And(clauses) => clauses.iter().all(|h| group_matches(h, key, records, members)),
        Having::Or(clauses) => clauses.iter().any(|h| group_matches(h, key, records, members)),
        Having::Not(inner) => !group_matches(inner, key, records, members),
        Having::Field { field, condition } => condition.matches(key.get(field)),
        Having::Aggregate {
            function,
            field,
            condition,
        } => {
            let value = compute(*function, field, records, members);
            condition.matches(value.as_ref())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget(project: &str, total: f64, spent: i64) -> Row {
        [
            ("projectId".to_string(), FieldValue::from(project)),
            ("total".to_string(), FieldValue::Float(total)),
            ("spent".to_string(), FieldValue::Int(spent)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_groups_in_first_seen_order() {
        let rows = vec![budget("b", 1.0, 1), budget("a", 2.0, 2), budget("b", 3.0, 3)];
        let groups = group_indices(&rows, &[0, 1, 2], &["projectId".to_string()]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0.get("projectId"), Some(&FieldValue::from("b")));
        assert_eq!(groups[0].1, vec![0, 2]);
        assert_eq!(groups[1].1, vec![1]);
    }

    #[test]
    fn test_compute_functions() {
        let rows = vec![budget("a", 1.5, 10), budget("a", 2.5, 20)];
        let members = [0, 1];
        assert_eq!(
            compute(AggregateFunction::Count, "_all", &rows, &members),
            Some(FieldValue::Int(2))
        );
        assert_eq!(
            compute(AggregateFunction::Avg, "total", &rows, &members),
            Some(FieldValue::Float(2.0))
        );
        assert_eq!(
            compute(AggregateFunction::Sum, "spent", &rows, &members),
            Some(FieldValue::Int(30))
        );
        assert_eq!(
            compute(AggregateFunction::Sum, "total", &rows, &members),
            Some(FieldValue::Float(4.0))
        );
        assert_eq!(
            compute(AggregateFunction::Max, "spent", &rows, &members),
            Some(FieldValue::Int(20))
        );
        assert_eq!(compute(AggregateFunction::Min, "total", &rows, &[]), None);
    }
}
