//! Validated read arguments and their in-memory application.

use std::collections::BTreeMap;
use std::marker::PhantomData;

use serde_json::{Map, Value as JsonValue};

use crate::config::{CursorPolicy, ValidationConfig};
use crate::error::{ValidationError, path_with};
use crate::filter::parse::parse_where;
use crate::filter::{Record, Where};
use crate::mutation::UniqueKey;
use crate::mutation::data::parse_unique_key;
use crate::schema::entities::Entity;
use crate::schema::field::TableDef;
use crate::schema::parse::expect_object;
use crate::schema::value::{FieldValue, Row, received};

use super::order::{OrderBy, check_order_by, compare_records, parse_order_by};
use super::selection::{RelationSelection, Selection, parse_include, parse_select};

/// Read arguments for entity `E`.
///
/// Only produced by [`QueryArgsBuilder::assemble`] or [`QueryArgs::parse`],
/// so every instance has been checked against `E`'s table.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryArgs<E> {
    pub filter: Where,
    pub order_by: Vec<OrderBy>,
    pub skip: u64,
    pub take: Option<u64>,
    pub cursor: Option<UniqueKey>,
    pub distinct: Vec<String>,
    pub selection: Selection,
    /// Accepted-but-suspicious input, already logged
    pub warnings: Vec<String>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Default for QueryArgs<E> {
    fn default() -> Self {
        Self {
            filter: Where::all(),
            order_by: Vec::new(),
            skip: 0,
            take: None,
            cursor: None,
            distinct: Vec::new(),
            selection: Selection::Default,
            warnings: Vec::new(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> QueryArgs<E> {
    pub fn builder() -> QueryArgsBuilder<E> {
        QueryArgsBuilder::new()
    }

    /// Every row, in insertion order.
    pub fn all() -> Self {
        Self::default()
    }

    /// Parse Prisma-style find arguments for `E`.
    pub fn parse(raw: &JsonValue) -> Result<Self, ValidationError> {
        Self::parse_with(raw, &ValidationConfig::default())
    }

    pub fn parse_with(raw: &JsonValue, config: &ValidationConfig) -> Result<Self, ValidationError> {
        let table = E::table();
        let map = expect_object(raw, &[])?;
        let mut errors = ValidationError::default();
        let mut builder = Self::builder().config(*config);

        if map.contains_key("select") && map.contains_key("include") {
            errors.push(&[], "provide either 'select' or 'include', not both");
        }

        for (key, value) in map {
            let path = vec![key.clone()];
            match key.as_str() {
                "where" => builder.filter = errors.absorb(parse_where(table, value, config, &path)),
                "orderBy" => {
                    builder.order_by = errors.absorb(parse_order_by(value, &path)).unwrap_or_default()
                }
                "skip" => builder.skip = errors.absorb(parse_integer(value, &path)),
                "take" => builder.take = errors.absorb(parse_integer(value, &path)),
                "cursor" => builder.cursor = errors.absorb(parse_unique_key(table, value, config, &path)),
                "distinct" => {
                    builder.distinct = errors.absorb(parse_distinct(value, &path)).unwrap_or_default()
                }
                "select" => builder.selection = errors.absorb(parse_select(table, value, config, &path)),
                "include" => {
                    builder.selection = errors.absorb(parse_include(table, value, config, &path))
                }
                other => errors.push(&path, format!("unrecognized key '{other}' for query arguments")),
            }
        }

        let args = errors.absorb(builder.assemble());
        match args {
            Some(args) if errors.is_empty() => Ok(args),
            _ => Err(errors),
        }
    }

    /// JSON accepted by [`QueryArgs::parse`].
    pub fn to_json(&self) -> JsonValue {
        let mut map = Map::new();
        if self.filter != Where::all() {
            map.insert("where".to_string(), self.filter.to_json());
        }
        if !self.order_by.is_empty() {
            map.insert(
                "orderBy".to_string(),
                self.order_by.iter().map(OrderBy::to_json).collect(),
            );
        }
        if self.skip > 0 {
            map.insert("skip".to_string(), self.skip.into());
        }
        if let Some(take) = self.take {
            map.insert("take".to_string(), take.into());
        }
        if let Some(cursor) = &self.cursor {
            map.insert("cursor".to_string(), cursor.to_json());
        }
        if !self.distinct.is_empty() {
            map.insert("distinct".to_string(), self.distinct.clone().into());
        }
        if let Some((key, value)) = self.selection.to_json() {
            map.insert(key.to_string(), value);
        }
        JsonValue::Object(map)
    }

    pub(crate) fn window(&self) -> Window<'_> {
        Window {
            filter: Some(&self.filter),
            order_by: &self.order_by,
            cursor: self.cursor.as_ref(),
            distinct: &self.distinct,
            skip: self.skip,
            take: self.take,
        }
    }

    /// Indices of `records` selected by these arguments, in result order.
    pub fn select_indices<R: Record>(&self, records: &[R]) -> Vec<usize> {
        self.window().select(records)
    }

    /// Filter, order and paginate entities in memory.
    pub fn apply(&self, items: Vec<E>) -> Vec<E> {
        let rows: Vec<Row> = items.iter().map(E::to_row).collect();
        let indices = self.select_indices(&rows);
        let mut slots: Vec<Option<E>> = items.into_iter().map(Some).collect();
        indices.into_iter().filter_map(|i| slots[i].take()).collect()
    }
}

fn parse_integer(raw: &JsonValue, path: &[String]) -> Result<i64, ValidationError> {
    raw.as_i64().ok_or_else(|| {
        ValidationError::single(path, format!("expected integer, received {}", received(raw)))
    })
}

fn parse_distinct(raw: &JsonValue, path: &[String]) -> Result<Vec<String>, ValidationError> {
    match raw {
        JsonValue::String(field) => Ok(vec![field.clone()]),
        JsonValue::Array(items) => {
            let mut errors = ValidationError::default();
            let mut fields = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                match item.as_str() {
                    Some(field) => fields.push(field.to_string()),
                    None => errors.push(
                        &path_with(path, index),
                        format!("expected string, received {}", received(item)),
                    ),
                }
            }
            errors.finish(fields)
        }
        other => Err(ValidationError::single(
            path,
            format!("expected string or array, received {}", received(other)),
        )),
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Fluent construction of [`QueryArgs`]; nothing is checked until `assemble`.
#[derive(Debug, Clone)]
pub struct QueryArgsBuilder<E> {
    filter: Option<Where>,
    order_by: Vec<OrderBy>,
    skip: Option<i64>,
    take: Option<i64>,
    cursor: Option<UniqueKey>,
    distinct: Vec<String>,
    selection: Option<Selection>,
    conflicting_selection: bool,
    config: ValidationConfig,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> QueryArgsBuilder<E> {
    pub fn new() -> Self {
        Self {
            filter: None,
            order_by: Vec::new(),
            skip: None,
            take: None,
            cursor: None,
            distinct: Vec::new(),
            selection: None,
            conflicting_selection: false,
            config: ValidationConfig::default(),
            _entity: PhantomData,
        }
    }

    pub fn config(mut self, config: ValidationConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the filter; a second call ANDs with the first.
    pub fn filter(mut self, filter: Where) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => Where::and([existing, filter]),
            None => filter,
        });
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn skip(mut self, skip: i64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn take(mut self, take: i64) -> Self {
        self.take = Some(take);
        self
    }

    pub fn cursor(mut self, key: UniqueKey) -> Self {
        self.cursor = Some(key);
        self
    }

    pub fn distinct<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.distinct.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Restrict output to `names`; relation names select the relation with default arguments.
    pub fn select<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        let names = names.into_iter().map(Into::into);
        match &mut self.selection {
            Some(Selection::Select { fields, .. }) => fields.extend(names),
            Some(_) => self.conflicting_selection = true,
            None => {
                self.selection = Some(Selection::Select {
                    fields: names.collect(),
                    relations: BTreeMap::new(),
                })
            }
        }
        self
    }

    /// Select one relation with explicit arguments.
    pub fn select_relation(mut self, name: impl Into<String>, nested: RelationSelection) -> Self {
        match &mut self.selection {
            Some(Selection::Select { relations, .. }) => {
                relations.insert(name.into(), nested);
            }
            Some(_) => self.conflicting_selection = true,
            None => {
                self.selection = Some(Selection::Select {
                    fields: Vec::new(),
                    relations: [(name.into(), nested)].into_iter().collect(),
                })
            }
        }
        self
    }

    pub fn include(mut self, name: impl Into<String>, nested: RelationSelection) -> Self {
        match &mut self.selection {
            Some(Selection::Include(relations)) => {
                relations.insert(name.into(), nested);
            }
            Some(_) => self.conflicting_selection = true,
            None => {
                self.selection = Some(Selection::Include(
                    [(name.into(), nested)].into_iter().collect(),
                ))
            }
        }
        self
    }

    /// Check everything against `E`'s table and produce the arguments.
    pub fn assemble(self) -> Result<QueryArgs<E>, ValidationError> {
        let table = E::table();
        let config = self.config;
        let mut errors = ValidationError::default();

        let filter = self.filter.unwrap_or_else(Where::all);
        filter.check(table, &["where".to_string()], &mut errors);
        check_order_by(table, &self.order_by, &["orderBy".to_string()], &mut errors);

        let skip = non_negative(self.skip, "skip", &mut errors).unwrap_or(0);
        let take = non_negative(self.take, "take", &mut errors).map(|take| {
            if take > config.max_take {
                tracing::debug!(entity = table.name, take, max_take = config.max_take, "Clamping take");
            }
            take.min(config.max_take)
        });

        if let Some(cursor) = &self.cursor {
            cursor.check(table, &["cursor".to_string()], &mut errors);
        }
        check_distinct(table, &self.distinct, &mut errors);

        if self.conflicting_selection {
            errors.push(&[], "provide either 'select' or 'include', not both");
        }
        let selection = self
            .selection
            .unwrap_or_default()
            .normalize(table, &config, &[], &mut errors);

        let mut warnings = Vec::new();
        if self.cursor.is_some() && !has_unique_order(table, &self.order_by) {
            let message = "cursor without an orderBy on a unique field has no stable position";
            match config.cursor_policy {
                CursorPolicy::Warn => warnings.push(message.to_string()),
                CursorPolicy::Reject => errors.push(&["cursor".to_string()], message),
            }
        }

        let args = errors.finish(QueryArgs {
            filter,
            order_by: self.order_by,
            skip,
            take,
            cursor: self.cursor,
            distinct: self.distinct,
            selection,
            warnings,
            _entity: PhantomData,
        })?;

        for warning in &args.warnings {
            tracing::warn!(entity = table.name, "{}", warning);
        }
        tracing::debug!(
            entity = table.name,
            order_keys = args.order_by.len(),
            skip = args.skip,
            take = ?args.take,
            "Assembled query arguments"
        );
        Ok(args)
    }
}

impl<E: Entity> Default for QueryArgsBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

fn non_negative(value: Option<i64>, key: &str, errors: &mut ValidationError) -> Option<u64> {
    let value = value?;
    match u64::try_from(value) {
        Ok(value) => Some(value),
        Err(_) => {
            errors.push(&[key.to_string()], "must not be negative");
            None
        }
    }
}

fn check_distinct(table: &TableDef, distinct: &[String], errors: &mut ValidationError) {
    for (index, field) in distinct.iter().enumerate() {
        if table.field(field).is_none() {
            errors.push(
                &["distinct".to_string(), index.to_string()],
                format!("unknown field '{field}' on {}", table.name),
            );
        }
    }
}

fn has_unique_order(table: &TableDef, order_by: &[OrderBy]) -> bool {
    order_by
        .iter()
        .any(|key| table.field(&key.field).is_some_and(|f| f.unique))
}

// ============================================================================
// In-memory application
// ============================================================================

/// Filter → sort → cursor → distinct → skip → take over borrowed records.
pub(crate) struct Window<'q> {
    pub filter: Option<&'q Where>,
    pub order_by: &'q [OrderBy],
    pub cursor: Option<&'q UniqueKey>,
    pub distinct: &'q [String],
    pub skip: u64,
    pub take: Option<u64>,
}

impl<'q> Window<'q> {
    pub(crate) fn of_relation(selection: &'q RelationSelection) -> Self {
        Window {
            filter: selection.filter.as_ref(),
            order_by: &selection.order_by,
            cursor: None,
            distinct: &[],
            skip: selection.skip,
            take: selection.take,
        }
    }

    pub(crate) fn select<R: Record>(&self, records: &[R]) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..records.len())
            .filter(|&i| self.filter.is_none_or(|f| f.matches(&records[i])))
            .collect();

        // sort_by is stable, so equal keys keep insertion order
        indices.sort_by(|&a, &b| compare_records(self.order_by, &records[a], &records[b]));

        if let Some(cursor) = self.cursor {
            let position = indices.iter().position(|&i| {
                records[i]
                    .value(&cursor.field)
                    .is_some_and(|v| v.loosely_equals(&cursor.value))
            });
            match position {
                Some(position) => {
                    indices.drain(..=position);
                }
                None => return Vec::new(),
            }
        }

        if !self.distinct.is_empty() {
            let mut seen: Vec<Vec<Option<&FieldValue>>> = Vec::new();
            indices.retain(|&i| {
                let key: Vec<Option<&FieldValue>> =
                    self.distinct.iter().map(|f| records[i].value(f)).collect();
                if seen.iter().any(|other| same_key(other, &key)) {
                    false
                } else {
                    seen.push(key);
                    true
                }
            });
        }

        let skip = usize::try_from(self.skip).unwrap_or(usize::MAX);
        let take = self
            .take
            .map_or(usize::MAX, |take| usize::try_from(take).unwrap_or(usize::MAX));
        indices.into_iter().skip(skip).take(take).collect()
    }
}

fn same_key(a: &[Option<&FieldValue>], b: &[Option<&FieldValue>]) -> bool {
    a.iter().zip(b).all(|pair| match pair {
        (Some(x), Some(y)) => x.loosely_equals(y),
        (None, None) => true,
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::filter::{BoolFilter, IntFilter};
    use crate::schema::entities::{CheckList, Project};
    use crate::schema::enums::{Priority, Status};

    fn project(id: &str, name: &str, start_day: u32, progress: i64) -> Project {
        Project {
            id: Some(id.to_string()),
            project_name: name.to_string(),
            client_name: "City".to_string(),
            location: "Harbor".to_string(),
            start_date: Utc.with_ymd_and_hms(2024, 1, start_day, 0, 0, 0).unwrap(),
            due_date: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            progress,
        }
    }

    fn ids(projects: &[Project]) -> Vec<&str> {
        projects.iter().filter_map(|p| p.id.as_deref()).collect()
    }

    #[test]
    fn test_order_ties_broken_by_next_key() {
        let args = QueryArgs::<Project>::builder()
            .order_by(OrderBy::asc("startDate"))
            .order_by(OrderBy::asc("id"))
            .assemble()
            .unwrap();
        let rows = vec![
            project("c", "C", 2, 0),
            project("b", "B", 1, 0),
            project("a", "A", 2, 0),
        ];
        assert_eq!(ids(&args.apply(rows)), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_equal_keys_keep_insertion_order() {
        let args = QueryArgs::<Project>::builder()
            .order_by(OrderBy::desc("startDate"))
            .assemble()
            .unwrap();
        let rows = vec![
            project("x", "X", 1, 0),
            project("y", "Y", 1, 0),
            project("z", "Z", 3, 0),
        ];
        assert_eq!(ids(&args.apply(rows)), vec!["z", "x", "y"]);
    }

    #[test]
    fn test_skip_past_end_is_empty() {
        let args = QueryArgs::<Project>::builder().skip(5).take(10).assemble().unwrap();
        let rows = vec![
            project("a", "A", 1, 0),
            project("b", "B", 2, 0),
            project("c", "C", 3, 0),
        ];
        assert!(args.apply(rows).is_empty());
    }

    #[test]
    fn test_cursor_is_exclusive() {
        let args = QueryArgs::<Project>::builder()
            .order_by(OrderBy::asc("id"))
            .cursor(UniqueKey::id("b"))
            .take(1)
            .assemble()
            .unwrap();
        assert!(args.warnings.is_empty());
        let rows = vec![
            project("c", "C", 1, 0),
            project("a", "A", 1, 0),
            project("b", "B", 1, 0),
        ];
        assert_eq!(ids(&args.apply(rows.clone())), vec!["c"]);

        let missing = QueryArgs::<Project>::builder()
            .order_by(OrderBy::asc("id"))
            .cursor(UniqueKey::id("nope"))
            .assemble()
            .unwrap();
        assert!(missing.apply(rows).is_empty());
    }

    #[test]
    fn test_cursor_policy() {
        let warned = QueryArgs::<Project>::builder()
            .order_by(OrderBy::asc("progress"))
            .cursor(UniqueKey::id("a"))
            .assemble()
            .unwrap();
        assert_eq!(warned.warnings.len(), 1);

        let config = ValidationConfig {
            cursor_policy: CursorPolicy::Reject,
            ..ValidationConfig::default()
        };
        let err = QueryArgs::<Project>::builder()
            .config(config)
            .cursor(UniqueKey::id("a"))
            .assemble()
            .unwrap_err();
        assert!(err.has_path(&["cursor"]));
    }

    #[test]
    fn test_distinct_keeps_first_row() {
        let args = QueryArgs::<Project>::builder()
            .distinct(["progress"])
            .assemble()
            .unwrap();
        let rows = vec![
            project("a", "A", 1, 10),
            project("b", "B", 2, 20),
            project("c", "C", 3, 10),
        ];
        assert_eq!(ids(&args.apply(rows)), vec!["a", "b"]);
    }

    #[test]
    fn test_assemble_collects_every_problem() {
        let err = QueryArgs::<Project>::builder()
            .filter(Where::field("progress", BoolFilter::equals(true)))
            .order_by(OrderBy::asc("budget"))
            .order_by(OrderBy::asc("id"))
            .order_by(OrderBy::desc("id"))
            .take(-1)
            .cursor(UniqueKey::new("location", "Harbor"))
            .distinct(["team"])
            .select(["projectName"])
            .include("budget", RelationSelection::all())
            .assemble()
            .unwrap_err();

        assert!(err.has_path(&["where", "progress"]));
        assert!(err.has_path(&["orderBy", "0", "budget"]));
        assert!(err.has_path(&["orderBy", "2", "id"]));
        assert!(err.has_path(&["take"]));
        assert!(err.has_path(&["cursor", "location"]));
        assert!(err.has_path(&["distinct", "0"]));
        assert!(err.has_path(&[]));
    }

    #[test]
    fn test_take_is_clamped() {
        let args = QueryArgs::<Project>::builder().take(5_000).assemble().unwrap();
        assert_eq!(args.take, Some(ValidationConfig::default().max_take));
    }

    #[test]
    fn test_parse_and_back() {
        let raw = json!({
            "where": {"progress": {"gte": 50}},
            "orderBy": [{"startDate": "desc"}, {"id": "asc"}],
            "skip": 2,
            "take": 10,
            "cursor": {"id": "p1"},
            "include": {"budget": {"where": {"spent": {"gt": 0.0}}, "take": 3}}
        });
        let args = QueryArgs::<Project>::parse(&raw).unwrap();
        assert_eq!(args.filter, Where::field("progress", IntFilter::gte(50)));
        assert_eq!(args.skip, 2);
        assert_eq!(args.cursor, Some(UniqueKey::id("p1")));
        assert!(args.warnings.is_empty());
        assert_eq!(QueryArgs::<Project>::parse(&args.to_json()).unwrap(), args);
    }

    #[test]
    fn test_parse_rejections() {
        let err = QueryArgs::<Project>::parse(&json!({
            "select": {"projectName": true},
            "include": {"budget": true},
            "skip": "two",
            "cursor": {"progress": 5},
            "page": 1
        }))
        .unwrap_err();
        assert!(err.has_path(&[]));
        assert!(err.has_path(&["skip"]));
        assert!(err.has_path(&["cursor", "progress"]));
        assert!(err.has_path(&["page"]));

        let err = QueryArgs::<Project>::parse(&json!({"include": {"progress": true}})).unwrap_err();
        assert!(err.has_path(&["include", "progress"]));
    }

    #[test]
    fn test_check_list_filter() {
        let filter = Where::parse::<CheckList>(&json!({
            "priority": "high",
            "completed": false
        }))
        .unwrap();
        let args = QueryArgs::<CheckList>::builder().filter(filter).assemble().unwrap();

        let item = |id: &str, priority: Priority, completed: bool| CheckList {
            id: Some(id.to_string()),
            task: format!("task {id}"),
            status: Status::OnTrack,
            assignee: "Sam".to_string(),
            due_date: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
            priority,
            completed,
            project_id: "p1".to_string(),
        };
        let rows = vec![
            item("1", Priority::High, false),
            item("2", Priority::High, true),
            item("3", Priority::Low, false),
        ];
        let found = args.apply(rows);
        assert_matches!(found.as_slice(), [only] if only.id.as_deref() == Some("1"));
    }
}
