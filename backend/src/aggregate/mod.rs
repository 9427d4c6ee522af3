//! Aggregation descriptors
//!
//! `AggregateSpec` describes a grouped count/avg/sum/min/max request. It is
//! checked against the entity's table when assembled; a repository executes
//! it, and [`AggregateSpec::evaluate`] does so for in-memory records.

pub mod group;
pub mod having;

use std::marker::PhantomData;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::config::ValidationConfig;
use crate::error::{ValidationError, path_with};
use crate::filter::parse::parse_where;
use crate::filter::{Record, Where};
use crate::query::OrderBy;
use crate::query::order::{check_order_by, compare_records, parse_order_by};
use crate::schema::entities::Entity;
use crate::schema::field::{FieldKind, TableDef};
use crate::schema::parse::expect_object;
use crate::schema::value::{Row, received};

pub use group::AggregateGroup;
pub use having::Having;

use group::{compute, group_indices, group_matches};
use having::{aggregate_kind, parse_having};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFunction {
    Count,
    Avg,
    Sum,
    Min,
    Max,
}

impl AggregateFunction {
    /// Key used in input and result objects.
    pub fn key(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "_count",
            AggregateFunction::Avg => "_avg",
            AggregateFunction::Sum => "_sum",
            AggregateFunction::Min => "_min",
            AggregateFunction::Max => "_max",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "_count" => Some(AggregateFunction::Count),
            "_avg" => Some(AggregateFunction::Avg),
            "_sum" => Some(AggregateFunction::Sum),
            "_min" => Some(AggregateFunction::Min),
            "_max" => Some(AggregateFunction::Max),
            _ => None,
        }
    }

    /// Kind of the aggregate's result over `field`, or why it is not allowed.
    pub(crate) fn result_kind(&self, table: &TableDef, field: &str) -> Result<FieldKind, String> {
        if *self == AggregateFunction::Count && field == "_all" {
            return Ok(FieldKind::Int);
        }
        let Some(def) = table.field(field) else {
            return Err(format!("unknown field '{field}' on {}", table.name));
        };
        let numeric_only = matches!(self, AggregateFunction::Avg | AggregateFunction::Sum);
        if numeric_only && !def.kind.is_numeric() {
            return Err(format!(
                "{} needs a numeric field, '{field}' is {}",
                self.key(),
                def.kind.type_name()
            ));
        }
        Ok(aggregate_kind(*self, def.kind))
    }
}

/// Validated grouping request for entity `E`.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateSpec<E> {
    pub by: Vec<String>,
    pub filter: Where,
    pub having: Option<Having>,
    pub count_all: bool,
    pub count: Vec<String>,
    pub avg: Vec<String>,
    pub sum: Vec<String>,
    pub min: Vec<String>,
    pub max: Vec<String>,
    pub order_by: Vec<OrderBy>,
    pub skip: u64,
    pub take: Option<u64>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> AggregateSpec<E> {
    pub fn builder() -> AggregateSpecBuilder<E> {
        AggregateSpecBuilder::new()
    }

    pub fn parse(raw: &JsonValue) -> Result<Self, ValidationError> {
        Self::parse_with(raw, &ValidationConfig::default())
    }

    /// Parse a Prisma-style `groupBy` / `aggregate` argument object.
    pub fn parse_with(raw: &JsonValue, config: &ValidationConfig) -> Result<Self, ValidationError> {
        let table = E::table();
        let map = expect_object(raw, &[])?;
        let mut errors = ValidationError::default();
        let mut builder = Self::builder().config(*config);

        for (key, value) in map {
            let path = vec![key.clone()];
            match key.as_str() {
                "by" => builder.by = errors.absorb(parse_names(value, &path)).unwrap_or_default(),
                "where" => builder.filter = errors.absorb(parse_where(table, value, config, &path)),
                "having" => builder.having = errors.absorb(parse_having(table, value, config, &path)),
                "orderBy" => {
                    builder.order_by = errors.absorb(parse_order_by(value, &path)).unwrap_or_default()
                }
                "skip" => builder.skip = errors.absorb(parse_integer(value, &path)),
                "take" => builder.take = errors.absorb(parse_integer(value, &path)),
                _ => match AggregateFunction::from_key(key) {
                    Some(function) => {
                        if let Some(fields) = errors.absorb(parse_selected(function, value, &path)) {
                            for field in fields {
                                builder = builder.push(function, field);
                            }
                        }
                    }
                    None => errors.push(&path, format!("unrecognized key '{key}' for aggregate arguments")),
                },
            }
        }

        let spec = errors.absorb(builder.assemble());
        match spec {
            Some(spec) if errors.is_empty() => Ok(spec),
            _ => Err(errors),
        }
    }

    /// Fields requested for `function`, with `_all` for a row count.
    pub fn requested(&self, function: AggregateFunction) -> Vec<&str> {
        let fields = match function {
            AggregateFunction::Count => &self.count,
            AggregateFunction::Avg => &self.avg,
            AggregateFunction::Sum => &self.sum,
            AggregateFunction::Min => &self.min,
            AggregateFunction::Max => &self.max,
        };
        let all = (function == AggregateFunction::Count && self.count_all).then_some("_all");
        all.into_iter().chain(fields.iter().map(String::as_str)).collect()
    }

    /// Group, aggregate, filter groups, order and paginate `records`.
    pub fn evaluate<R: Record>(&self, records: &[R]) -> Vec<AggregateGroup> {
        let matching: Vec<usize> = (0..records.len())
            .filter(|&i| self.filter.matches(&records[i]))
            .collect();

        let mut groups: Vec<AggregateGroup> = group_indices(records, &matching, &self.by)
            .into_iter()
            .filter(|(key, members)| {
                self.having
                    .as_ref()
                    .is_none_or(|having| group_matches(having, key, records, members))
            })
            .map(|(key, members)| self.summarize(key, records, &members))
            .collect();

        groups.sort_by(|a, b| compare_records(&self.order_by, &a.key, &b.key));

        let skip = usize::try_from(self.skip).unwrap_or(usize::MAX);
        let take = self
            .take
            .map_or(usize::MAX, |take| usize::try_from(take).unwrap_or(usize::MAX));
        groups.into_iter().skip(skip).take(take).collect()
    }

    fn summarize<R: Record>(&self, key: Row, records: &[R], members: &[usize]) -> AggregateGroup {
        let mut group = AggregateGroup {
            key,
            ..AggregateGroup::default()
        };
        for field in self.requested(AggregateFunction::Count) {
            let n = compute(AggregateFunction::Count, field, records, members)
                .and_then(|v| v.as_i64())
                .unwrap_or(0);
            group.count.insert(field.to_string(), n.max(0) as u64);
        }
        for field in &self.avg {
            let avg = compute(AggregateFunction::Avg, field, records, members).and_then(|v| v.as_f64());
            group.avg.insert(field.clone(), avg);
        }
        for (function, section) in [
            (AggregateFunction::Sum, &mut group.sum),
            (AggregateFunction::Min, &mut group.min),
            (AggregateFunction::Max, &mut group.max),
        ] {
            for field in self.requested(function) {
                section.insert(field.to_string(), compute(function, field, records, members));
            }
        }
        group
    }

    /// JSON accepted by [`AggregateSpec::parse`].
    pub fn to_json(&self) -> JsonValue {
        let mut map = Map::new();
        if !self.by.is_empty() {
            map.insert("by".to_string(), self.by.clone().into());
        }
        if self.filter != Where::all() {
            map.insert("where".to_string(), self.filter.to_json());
        }
        if let Some(having) = &self.having {
            map.insert("having".to_string(), having.to_json());
        }
        for function in [
            AggregateFunction::Count,
            AggregateFunction::Avg,
            AggregateFunction::Sum,
            AggregateFunction::Min,
            AggregateFunction::Max,
        ] {
            let fields = self.requested(function);
            if !fields.is_empty() {
                let selected: Map<String, JsonValue> = fields
                    .into_iter()
                    .map(|f| (f.to_string(), JsonValue::Bool(true)))
                    .collect();
                map.insert(function.key().to_string(), selected.into());
            }
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
        JsonValue::Object(map)
    }
}

fn parse_integer(raw: &JsonValue, path: &[String]) -> Result<i64, ValidationError> {
    raw.as_i64().ok_or_else(|| {
        ValidationError::single(path, format!("expected integer, received {}", received(raw)))
    })
}

fn parse_names(raw: &JsonValue, path: &[String]) -> Result<Vec<String>, ValidationError> {
    match raw {
        JsonValue::String(name) => Ok(vec![name.clone()]),
        JsonValue::Array(items) => {
            let mut errors = ValidationError::default();
            let names = items
                .iter()
                .enumerate()
                .filter_map(|(index, item)| match item.as_str() {
                    Some(name) => Some(name.to_string()),
                    None => {
                        errors.push(
                            &path_with(path, index),
                            format!("expected string, received {}", received(item)),
                        );
                        None
                    }
                })
                .collect();
            errors.finish(names)
        }
        other => Err(ValidationError::single(
            path,
            format!("expected string or array, received {}", received(other)),
        )),
    }
}

/// `{field: true, ...}`; `_count: true` is shorthand for `{_all: true}`.
fn parse_selected(
    function: AggregateFunction,
    raw: &JsonValue,
    path: &[String],
) -> Result<Vec<String>, ValidationError> {
    if function == AggregateFunction::Count && *raw == JsonValue::Bool(true) {
        return Ok(vec!["_all".to_string()]);
    }
    let map = expect_object(raw, path)?;
    let mut errors = ValidationError::default();
    let mut fields = Vec::new();
    for (field, flag) in map {
        match flag {
            JsonValue::Bool(true) => fields.push(field.clone()),
            JsonValue::Bool(false) => {}
            other => errors.push(
                &path_with(path, field),
                format!("expected boolean, received {}", received(other)),
            ),
        }
    }
    errors.finish(fields)
}

// ============================================================================
// Builder
// ============================================================================

/// Fluent construction of [`AggregateSpec`].
#[derive(Debug, Clone)]
pub struct AggregateSpecBuilder<E> {
    by: Vec<String>,
    filter: Option<Where>,
    having: Option<Having>,
    count_all: bool,
    count: Vec<String>,
    avg: Vec<String>,
    sum: Vec<String>,
    min: Vec<String>,
    max: Vec<String>,
    order_by: Vec<OrderBy>,
    skip: Option<i64>,
    take: Option<i64>,
    config: ValidationConfig,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> AggregateSpecBuilder<E> {
    pub fn new() -> Self {
        Self {
            by: Vec::new(),
            filter: None,
            having: None,
            count_all: false,
            count: Vec::new(),
            avg: Vec::new(),
            sum: Vec::new(),
            min: Vec::new(),
            max: Vec::new(),
            order_by: Vec::new(),
            skip: None,
            take: None,
            config: ValidationConfig::default(),
            _entity: PhantomData,
        }
    }

    pub fn config(mut self, config: ValidationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn by<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.by.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn filter(mut self, filter: Where) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn having(mut self, having: Having) -> Self {
        self.having = Some(having);
        self
    }

    pub fn count_all(mut self) -> Self {
        self.count_all = true;
        self
    }

    pub fn count(self, field: impl Into<String>) -> Self {
        self.push(AggregateFunction::Count, field.into())
    }

    pub fn avg(self, field: impl Into<String>) -> Self {
        self.push(AggregateFunction::Avg, field.into())
    }

    pub fn sum(self, field: impl Into<String>) -> Self {
        self.push(AggregateFunction::Sum, field.into())
    }

    pub fn min(self, field: impl Into<String>) -> Self {
        self.push(AggregateFunction::Min, field.into())
    }

    pub fn max(self, field: impl Into<String>) -> Self {
        self.push(AggregateFunction::Max, field.into())
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

    fn push(mut self, function: AggregateFunction, field: String) -> Self {
        let list = match function {
            AggregateFunction::Count if field == "_all" => {
                self.count_all = true;
                return self;
            }
            AggregateFunction::Count => &mut self.count,
            AggregateFunction::Avg => &mut self.avg,
            AggregateFunction::Sum => &mut self.sum,
            AggregateFunction::Min => &mut self.min,
            AggregateFunction::Max => &mut self.max,
        };
        if !list.contains(&field) {
            list.push(field);
        }
        self
    }

    pub fn assemble(self) -> Result<AggregateSpec<E>, ValidationError> {
        let table = E::table();
        let mut errors = ValidationError::default();

        for (index, field) in self.by.iter().enumerate() {
            let path = vec!["by".to_string(), index.to_string()];
            if table.field(field).is_none() {
                errors.push(&path, format!("unknown field '{field}' on {}", table.name));
            } else if self.by[..index].contains(field) {
                errors.push(&path, format!("duplicate 'by' field '{field}'"));
            }
        }

        let filter = self.filter.unwrap_or_else(Where::all);
        filter.check(table, &["where".to_string()], &mut errors);

        for (function, fields) in [
            (AggregateFunction::Count, &self.count),
            (AggregateFunction::Avg, &self.avg),
            (AggregateFunction::Sum, &self.sum),
            (AggregateFunction::Min, &self.min),
            (AggregateFunction::Max, &self.max),
        ] {
            for field in fields {
                if let Err(message) = function.result_kind(table, field) {
                    errors.push(&[function.key().to_string(), field.clone()], message);
                }
            }
        }

        if let Some(having) = &self.having {
            having.check(table, &self.by, &["having".to_string()], &mut errors);
        }

        check_order_by(table, &self.order_by, &["orderBy".to_string()], &mut errors);
        for (index, key) in self.order_by.iter().enumerate() {
            if table.field(&key.field).is_some() && !self.by.contains(&key.field) {
                errors.push(
                    &["orderBy".to_string(), index.to_string(), key.field.clone()],
                    format!("'{}' must be listed in 'by' to be used in orderBy", key.field),
                );
            }
        }

        let has_aggregate = self.count_all
            || [&self.count, &self.avg, &self.sum, &self.min, &self.max]
                .iter()
                .any(|fields| !fields.is_empty());
        if self.by.is_empty() && !has_aggregate {
            errors.push(&[], "request at least one 'by' field or aggregate");
        }

        let mut non_negative = |value: Option<i64>, key: &str| -> Option<u64> {
            let value = value?;
            u64::try_from(value)
                .map_err(|_| errors.push(&[key.to_string()], "must not be negative"))
                .ok()
        };
        let skip = non_negative(self.skip, "skip").unwrap_or(0);
        let take = non_negative(self.take, "take").map(|take| take.min(self.config.max_take));

        let spec = errors.finish(AggregateSpec {
            by: self.by,
            filter,
            having: self.having,
            count_all: self.count_all,
            count: self.count,
            avg: self.avg,
            sum: self.sum,
            min: self.min,
            max: self.max,
            order_by: self.order_by,
            skip,
            take,
            _entity: PhantomData,
        })?;

        tracing::debug!(entity = table.name, by = ?spec.by, "Assembled aggregate request");
        Ok(spec)
    }
}

impl<E: Entity> Default for AggregateSpecBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}
