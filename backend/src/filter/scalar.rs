//! Per-type field filters.
//!
//! Every operator set on a filter must hold for the filter to match (they are
//! ANDed). A filter with nothing set matches any present value.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value as JsonValue};

use crate::error::{ValidationError, path_with};
use crate::schema::field::FieldKind;
use crate::schema::value::FieldValue;

/// String comparison mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueryMode {
    #[default]
    Default,
    Insensitive,
}

impl QueryMode {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryMode::Default => "default",
            QueryMode::Insensitive => "insensitive",
        }
    }
}

// ============================================================================
// String
// ============================================================================

/// Filter for string fields
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StringFilter {
    pub equals: Option<String>,
    pub in_list: Option<Vec<String>>,
    pub not_in: Option<Vec<String>>,
    pub lt: Option<String>,
    pub lte: Option<String>,
    pub gt: Option<String>,
    pub gte: Option<String>,
    pub contains: Option<String>,
    pub starts_with: Option<String>,
    pub ends_with: Option<String>,
    /// Applies to every operator of this filter, not to `not`
    pub mode: Option<QueryMode>,
    pub not: Option<Box<StringFilter>>,
}

impl StringFilter {
    pub fn equals(value: impl Into<String>) -> Self {
        Self {
            equals: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn in_list<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            in_list: Some(values.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    pub fn not_in<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            not_in: Some(values.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    pub fn contains(value: impl Into<String>) -> Self {
        Self {
            contains: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn starts_with(value: impl Into<String>) -> Self {
        Self {
            starts_with: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn ends_with(value: impl Into<String>) -> Self {
        Self {
            ends_with: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn lt(value: impl Into<String>) -> Self {
        Self {
            lt: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn gt(value: impl Into<String>) -> Self {
        Self {
            gt: Some(value.into()),
            ..Default::default()
        }
    }

    /// Negate another string filter
    pub fn not(inner: StringFilter) -> Self {
        Self {
            not: Some(Box::new(inner)),
            ..Default::default()
        }
    }

    /// Compare case-insensitively
    pub fn insensitive(mut self) -> Self {
        self.mode = Some(QueryMode::Insensitive);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn matches(&self, value: Option<&str>) -> bool {
        let Some(value) = value else {
            return self.is_empty();
        };

        let insensitive = self.mode == Some(QueryMode::Insensitive);
        let fold = |s: &str| {
            if insensitive {
                s.to_lowercase()
            } else {
                s.to_string()
            }
        };
        let subject = fold(value);
        let holds = |op: &Option<String>, test: &dyn Fn(&str, &str) -> bool| {
            op.as_deref()
                .is_none_or(|operand| test(subject.as_str(), fold(operand).as_str()))
        };

        holds(&self.equals, &|s, o| s == o)
            && holds(&self.lt, &|s, o| s < o)
            && holds(&self.lte, &|s, o| s <= o)
            && holds(&self.gt, &|s, o| s > o)
            && holds(&self.gte, &|s, o| s >= o)
            && holds(&self.contains, &|s, o| s.contains(o))
            && holds(&self.starts_with, &|s, o| s.starts_with(o))
            && holds(&self.ends_with, &|s, o| s.ends_with(o))
            && self
                .in_list
                .as_ref()
                .is_none_or(|list| list.iter().any(|v| fold(v) == subject))
            && self
                .not_in
                .as_ref()
                .is_none_or(|list| !list.iter().any(|v| fold(v) == subject))
            && self.not.as_ref().is_none_or(|inner| !inner.matches(Some(value)))
    }
}

// ============================================================================
// Numbers and dates
// ============================================================================

/// Filter for ordered scalars (integers, floats, dates)
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarFilter<T> {
    pub equals: Option<T>,
    pub in_list: Option<Vec<T>>,
    pub not_in: Option<Vec<T>>,
    pub lt: Option<T>,
    pub lte: Option<T>,
    pub gt: Option<T>,
    pub gte: Option<T>,
    pub not: Option<Box<ScalarFilter<T>>>,
}

pub type IntFilter = ScalarFilter<i64>;
pub type FloatFilter = ScalarFilter<f64>;
pub type DateFilter = ScalarFilter<DateTime<Utc>>;

impl<T> Default for ScalarFilter<T> {
    fn default() -> Self {
        Self {
            equals: None,
            in_list: None,
            not_in: None,
            lt: None,
            lte: None,
            gt: None,
            gte: None,
            not: None,
        }
    }
}

impl<T: Copy + PartialOrd> ScalarFilter<T> {
    pub fn equals(value: T) -> Self {
        Self {
            equals: Some(value),
            ..Default::default()
        }
    }

    pub fn in_list(values: impl IntoIterator<Item = T>) -> Self {
        Self {
            in_list: Some(values.into_iter().collect()),
            ..Default::default()
        }
    }

    pub fn not_in(values: impl IntoIterator<Item = T>) -> Self {
        Self {
            not_in: Some(values.into_iter().collect()),
            ..Default::default()
        }
    }

    pub fn lt(value: T) -> Self {
        Self {
            lt: Some(value),
            ..Default::default()
        }
    }

    pub fn lte(value: T) -> Self {
        Self {
            lte: Some(value),
            ..Default::default()
        }
    }

    pub fn gt(value: T) -> Self {
        Self {
            gt: Some(value),
            ..Default::default()
        }
    }

    pub fn gte(value: T) -> Self {
        Self {
            gte: Some(value),
            ..Default::default()
        }
    }

    /// Inclusive range
    pub fn between(low: T, high: T) -> Self {
        Self {
            gte: Some(low),
            lte: Some(high),
            ..Default::default()
        }
    }

    pub fn not(inner: ScalarFilter<T>) -> Self {
        Self {
            not: Some(Box::new(inner)),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.equals.is_none()
            && self.in_list.is_none()
            && self.not_in.is_none()
            && self.lt.is_none()
            && self.lte.is_none()
            && self.gt.is_none()
            && self.gte.is_none()
            && self.not.is_none()
    }

    pub fn matches(&self, value: Option<T>) -> bool {
        let Some(value) = value else {
            return self.is_empty();
        };

        self.equals.is_none_or(|eq| value == eq)
            && self.in_list.as_ref().is_none_or(|list| list.contains(&value))
            && self.not_in.as_ref().is_none_or(|list| !list.contains(&value))
            && self.lt.is_none_or(|b| value < b)
            && self.lte.is_none_or(|b| value <= b)
            && self.gt.is_none_or(|b| value > b)
            && self.gte.is_none_or(|b| value >= b)
            && self.not.as_ref().is_none_or(|inner| !inner.matches(Some(value)))
    }
}

// ============================================================================
// Bool and enum
// ============================================================================

/// Filter for boolean fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoolFilter {
    pub equals: Option<bool>,
    pub not: Option<Box<BoolFilter>>,
}

impl BoolFilter {
    pub fn equals(value: bool) -> Self {
        Self {
            equals: Some(value),
            ..Default::default()
        }
    }

    pub fn not(inner: BoolFilter) -> Self {
        Self {
            not: Some(Box::new(inner)),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.equals.is_none() && self.not.is_none()
    }

    pub fn matches(&self, value: Option<bool>) -> bool {
        let Some(value) = value else {
            return self.is_empty();
        };
        self.equals.is_none_or(|eq| eq == value)
            && self.not.as_ref().is_none_or(|inner| !inner.matches(Some(value)))
    }
}

/// Filter for registry-backed enum fields
///
/// Values are wire strings; `Where::validate` and the where-input parser check
/// them against the field's enum.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnumFilter {
    pub equals: Option<String>,
    pub in_list: Option<Vec<String>>,
    pub not_in: Option<Vec<String>>,
    pub not: Option<Box<EnumFilter>>,
}

impl EnumFilter {
    pub fn equals(value: impl Into<String>) -> Self {
        Self {
            equals: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn in_list<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            in_list: Some(values.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    pub fn not_in<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            not_in: Some(values.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    pub fn not(inner: EnumFilter) -> Self {
        Self {
            not: Some(Box::new(inner)),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Every value mentioned anywhere in the filter, `not` included.
    pub fn mentioned_values(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        out.extend(self.equals.as_deref());
        for list in [&self.in_list, &self.not_in].into_iter().flatten() {
            out.extend(list.iter().map(String::as_str));
        }
        if let Some(inner) = &self.not {
            out.extend(inner.mentioned_values());
        }
        out
    }

    pub fn matches(&self, value: Option<&str>) -> bool {
        let Some(value) = value else {
            return self.is_empty();
        };
        self.equals.as_deref().is_none_or(|eq| eq == value)
            && self
                .in_list
                .as_ref()
                .is_none_or(|list| list.iter().any(|v| v == value))
            && self
                .not_in
                .as_ref()
                .is_none_or(|list| !list.iter().any(|v| v == value))
            && self.not.as_ref().is_none_or(|inner| !inner.matches(Some(value)))
    }
}

// ============================================================================
// Condition
// ============================================================================

/// A filter on one field, tagged by value type.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    String(StringFilter),
    Int(IntFilter),
    Float(FloatFilter),
    Bool(BoolFilter),
    Date(DateFilter),
    Enum(EnumFilter),
}

impl Condition {
    pub fn filter_name(&self) -> &'static str {
        match self {
            Condition::String(_) => "StringFilter",
            Condition::Int(_) => "IntFilter",
            Condition::Float(_) => "FloatFilter",
            Condition::Bool(_) => "BoolFilter",
            Condition::Date(_) => "DateFilter",
            Condition::Enum(_) => "EnumFilter",
        }
    }

    /// Whether this condition can be applied to a field of `kind`.
    pub fn accepts(&self, kind: &FieldKind) -> bool {
        match self {
            Condition::String(_) => kind.is_text(),
            Condition::Int(_) => *kind == FieldKind::Int,
            Condition::Float(_) => kind.is_numeric(),
            Condition::Bool(_) => *kind == FieldKind::Bool,
            Condition::Date(_) => *kind == FieldKind::DateTime,
            Condition::Enum(_) => matches!(kind, FieldKind::Enum(_)),
        }
    }

    pub fn matches(&self, value: Option<&FieldValue>) -> bool {
        match self {
            Condition::String(f) => f.matches(value.and_then(FieldValue::as_str)),
            Condition::Int(f) => f.matches(value.and_then(FieldValue::as_i64)),
            Condition::Float(f) => f.matches(value.and_then(FieldValue::as_f64)),
            Condition::Bool(f) => f.matches(value.and_then(FieldValue::as_bool)),
            Condition::Date(f) => f.matches(value.and_then(FieldValue::as_datetime).copied()),
            Condition::Enum(f) => f.matches(value.and_then(FieldValue::as_str)),
        }
    }

    /// Operator-object JSON accepted by the where-input parser.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Condition::String(f) => f.to_json(),
            Condition::Int(f) => f.to_json(),
            Condition::Float(f) => f.to_json(),
            Condition::Bool(f) => f.to_json(),
            Condition::Date(f) => f.to_json(),
            Condition::Enum(f) => f.to_json(),
        }
    }

    /// Float operands must be finite to have a JSON form.
    pub(crate) fn check_finite(&self, path: &[String], errors: &mut ValidationError) {
        if let Condition::Float(filter) = self {
            filter.check_finite(path, errors);
        }
    }
}

impl Serialize for Condition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<StringFilter> for Condition {
    fn from(filter: StringFilter) -> Self {
        Condition::String(filter)
    }
}

impl From<IntFilter> for Condition {
    fn from(filter: IntFilter) -> Self {
        Condition::Int(filter)
    }
}

impl From<FloatFilter> for Condition {
    fn from(filter: FloatFilter) -> Self {
        Condition::Float(filter)
    }
}

impl From<BoolFilter> for Condition {
    fn from(filter: BoolFilter) -> Self {
        Condition::Bool(filter)
    }
}

impl From<DateFilter> for Condition {
    fn from(filter: DateFilter) -> Self {
        Condition::Date(filter)
    }
}

impl From<EnumFilter> for Condition {
    fn from(filter: EnumFilter) -> Self {
        Condition::Enum(filter)
    }
}

impl FloatFilter {
    pub(crate) fn check_finite(&self, path: &[String], errors: &mut ValidationError) {
        let mut flag = |op_path: Vec<String>, value: f64| {
            if !value.is_finite() {
                errors.push(&op_path, format!("expected finite number, received {value}"));
            }
        };
        for (op, value) in [
            ("equals", self.equals),
            ("lt", self.lt),
            ("lte", self.lte),
            ("gt", self.gt),
            ("gte", self.gte),
        ] {
            if let Some(value) = value {
                flag(path_with(path, op), value);
            }
        }
        for (op, list) in [("in", &self.in_list), ("notIn", &self.not_in)] {
            for (index, value) in list.iter().flatten().enumerate() {
                flag(path_with(&path_with(path, op), index), *value);
            }
        }
        if let Some(inner) = &self.not {
            inner.check_finite(&path_with(path, "not"), errors);
        }
    }
}

// ============================================================================
// JSON form
// ============================================================================

/// Operand as it appears in a where-input.
pub(crate) trait Operand {
    fn to_json(&self) -> JsonValue;
}

impl Operand for String {
    fn to_json(&self) -> JsonValue {
        JsonValue::String(self.clone())
    }
}

impl Operand for i64 {
    fn to_json(&self) -> JsonValue {
        JsonValue::from(*self)
    }
}

impl Operand for f64 {
    fn to_json(&self) -> JsonValue {
        JsonValue::from(*self)
    }
}

impl Operand for bool {
    fn to_json(&self) -> JsonValue {
        JsonValue::Bool(*self)
    }
}

impl Operand for DateTime<Utc> {
    fn to_json(&self) -> JsonValue {
        JsonValue::String(self.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }
}

impl Operand for QueryMode {
    fn to_json(&self) -> JsonValue {
        JsonValue::from(self.as_str())
    }
}

/// Operator object; unset operators are left out.
#[derive(Default)]
struct Operators(Map<String, JsonValue>);

impl Operators {
    fn one<T: Operand>(mut self, op: &str, value: Option<&T>) -> Self {
        if let Some(value) = value {
            self.0.insert(op.to_string(), value.to_json());
        }
        self
    }

    fn list<T: Operand>(mut self, op: &str, values: Option<&Vec<T>>) -> Self {
        if let Some(values) = values {
            self.0
                .insert(op.to_string(), values.iter().map(Operand::to_json).collect());
        }
        self
    }

    fn not(mut self, inner: Option<JsonValue>) -> Self {
        if let Some(inner) = inner {
            self.0.insert("not".to_string(), inner);
        }
        self
    }

    fn into_json(self) -> JsonValue {
        JsonValue::Object(self.0)
    }
}

impl StringFilter {
    pub fn to_json(&self) -> JsonValue {
        Operators::default()
            .one("equals", self.equals.as_ref())
            .list("in", self.in_list.as_ref())
            .list("notIn", self.not_in.as_ref())
            .one("lt", self.lt.as_ref())
            .one("lte", self.lte.as_ref())
            .one("gt", self.gt.as_ref())
            .one("gte", self.gte.as_ref())
            .one("contains", self.contains.as_ref())
            .one("startsWith", self.starts_with.as_ref())
            .one("endsWith", self.ends_with.as_ref())
            .one("mode", self.mode.as_ref())
            .not(self.not.as_ref().map(|inner| inner.to_json()))
            .into_json()
    }
}

impl<T: Operand> ScalarFilter<T> {
    pub(crate) fn to_json(&self) -> JsonValue {
        Operators::default()
            .one("equals", self.equals.as_ref())
            .list("in", self.in_list.as_ref())
            .list("notIn", self.not_in.as_ref())
            .one("lt", self.lt.as_ref())
            .one("lte", self.lte.as_ref())
            .one("gt", self.gt.as_ref())
            .one("gte", self.gte.as_ref())
            .not(self.not.as_ref().map(|inner| inner.to_json()))
            .into_json()
    }
}

impl BoolFilter {
    pub fn to_json(&self) -> JsonValue {
        Operators::default()
            .one("equals", self.equals.as_ref())
            .not(self.not.as_ref().map(|inner| inner.to_json()))
            .into_json()
    }
}

impl EnumFilter {
    pub fn to_json(&self) -> JsonValue {
        Operators::default()
            .one("equals", self.equals.as_ref())
            .list("in", self.in_list.as_ref())
            .list("notIn", self.not_in.as_ref())
            .not(self.not.as_ref().map(|inner| inner.to_json()))
            .into_json()
    }
}
