//! `select` / `include` shapes.

use std::collections::BTreeMap;

use serde_json::{Map, Value as JsonValue};

use crate::config::ValidationConfig;
use crate::error::{ValidationError, path_with};
use crate::filter::Where;
use crate::filter::parse::parse_where;
use crate::schema::field::{RelationDef, TableDef};
use crate::schema::parse::expect_object;
use crate::schema::value::received;

use super::order::{OrderBy, check_order_by, parse_order_by};

/// Which fields and relations a read returns.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Selection {
    /// Every scalar field, no relations
    #[default]
    Default,
    /// Only the listed scalar fields plus the listed relations
    Select {
        fields: Vec<String>,
        relations: BTreeMap<String, RelationSelection>,
    },
    /// Every scalar field plus the listed relations
    Include(BTreeMap<String, RelationSelection>),
}

impl Selection {
    /// Whether scalar `field` is part of the output.
    pub fn includes_field(&self, field: &str) -> bool {
        match self {
            Selection::Select { fields, .. } => fields.iter().any(|f| f == field),
            _ => true,
        }
    }

    /// Relations to materialise, keyed by relation name.
    pub fn relations(&self) -> Option<&BTreeMap<String, RelationSelection>> {
        match self {
            Selection::Default => None,
            Selection::Select { relations, .. } => Some(relations),
            Selection::Include(relations) => Some(relations),
        }
    }

    /// `("select" | "include", value)` for the JSON form; `None` for the default shape.
    pub fn to_json(&self) -> Option<(&'static str, JsonValue)> {
        match self {
            Selection::Default => None,
            Selection::Select { fields, relations } => {
                let mut map: Map<String, JsonValue> = fields
                    .iter()
                    .map(|f| (f.clone(), JsonValue::Bool(true)))
                    .collect();
                for (name, rel) in relations {
                    map.insert(name.clone(), rel.to_json());
                }
                Some(("select", JsonValue::Object(map)))
            }
            Selection::Include(relations) => Some((
                "include",
                JsonValue::Object(
                    relations
                        .iter()
                        .map(|(name, rel)| (name.clone(), rel.to_json()))
                        .collect(),
                ),
            )),
        }
    }

    /// Validate names against `table`, moving relation names listed as
    /// select fields into the relation map.
    pub(crate) fn normalize(
        self,
        table: &TableDef,
        config: &ValidationConfig,
        path: &[String],
        errors: &mut ValidationError,
    ) -> Selection {
        match self {
            Selection::Default => Selection::Default,
            Selection::Select {
                fields: names,
                relations,
            } => {
                let select_path = path_with(path, "select");
                let mut fields = Vec::new();
                let mut moved = BTreeMap::new();
                for name in names {
                    if table.field(&name).is_some() {
                        if !fields.contains(&name) {
                            fields.push(name);
                        }
                    } else if table.relation(&name).is_some() {
                        moved.insert(name, RelationSelection::default());
                    } else {
                        errors.push(
                            &path_with(&select_path, &name),
                            format!("unknown field '{name}' on {}", table.name),
                        );
                    }
                }
                moved.extend(relations);
                let relations = normalize_relations(table, moved, config, &select_path, errors);
                Selection::Select { fields, relations }
            }
            Selection::Include(relations) => {
                let include_path = path_with(path, "include");
                Selection::Include(normalize_relations(
                    table,
                    relations,
                    config,
                    &include_path,
                    errors,
                ))
            }
        }
    }
}

fn normalize_relations(
    table: &TableDef,
    relations: BTreeMap<String, RelationSelection>,
    config: &ValidationConfig,
    path: &[String],
    errors: &mut ValidationError,
) -> BTreeMap<String, RelationSelection> {
    let mut out = BTreeMap::new();
    for (name, selection) in relations {
        let rel_path = path_with(path, &name);
        let Some(def) = table.relation(&name) else {
            let reason = if table.field(&name).is_some() {
                format!("'{name}' is a scalar field of {} and cannot be included", table.name)
            } else {
                format!("unknown relation '{name}' on {}", table.name)
            };
            errors.push(&rel_path, reason);
            continue;
        };
        let selection = selection.normalize(def, config, &rel_path, errors);
        out.insert(name, selection);
    }
    out
}

/// Arguments of one selected relation.
///
/// Filtering, ordering and pagination only apply to to-many relations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationSelection {
    pub filter: Option<Where>,
    pub order_by: Vec<OrderBy>,
    pub skip: u64,
    pub take: Option<u64>,
    pub selection: Selection,
}

impl RelationSelection {
    /// All related rows with their scalar fields.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Where) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    pub fn take(mut self, take: u64) -> Self {
        self.take = Some(take);
        self
    }

    /// Restrict the related rows to `names`; relation names select nested relations.
    pub fn select<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        let relations = match self.selection {
            Selection::Select { relations, .. } => relations,
            _ => BTreeMap::new(),
        };
        self.selection = Selection::Select {
            fields: names.into_iter().map(Into::into).collect(),
            relations,
        };
        self
    }

    pub fn include(mut self, relation: impl Into<String>, nested: RelationSelection) -> Self {
        let mut relations = match self.selection {
            Selection::Include(relations) => relations,
            _ => BTreeMap::new(),
        };
        relations.insert(relation.into(), nested);
        self.selection = Selection::Include(relations);
        self
    }

    fn is_windowed(&self) -> bool {
        self.filter.is_some() || !self.order_by.is_empty() || self.skip > 0 || self.take.is_some()
    }

    fn normalize(
        mut self,
        def: &RelationDef,
        config: &ValidationConfig,
        path: &[String],
        errors: &mut ValidationError,
    ) -> RelationSelection {
        let target = def.target.table();
        if !def.is_many() && self.is_windowed() {
            errors.push(
                path,
                format!(
                    "relation '{}' is to-one; where, orderBy, skip and take need a to-many relation",
                    def.name
                ),
            );
        }
        if let Some(filter) = &self.filter {
            filter.check(target, &path_with(path, "where"), errors);
        }
        check_order_by(target, &self.order_by, &path_with(path, "orderBy"), errors);
        self.take = self.take.map(|take| take.min(config.max_take));
        self.selection = self.selection.normalize(target, config, path, errors);
        self
    }

    pub fn to_json(&self) -> JsonValue {
        if *self == Self::default() {
            return JsonValue::Bool(true);
        }
        let mut map = Map::new();
        if let Some(filter) = &self.filter {
            map.insert("where".to_string(), filter.to_json());
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
        if let Some((key, value)) = self.selection.to_json() {
            map.insert(key.to_string(), value);
        }
        JsonValue::Object(map)
    }
}

// ============================================================================
// JSON parsing
// ============================================================================

/// Names and nested relation arguments from a `select` object.
pub(crate) fn parse_select(
    table: &TableDef,
    raw: &JsonValue,
    config: &ValidationConfig,
    path: &[String],
) -> Result<Selection, ValidationError> {
    let map = expect_object(raw, path)?;
    let mut errors = ValidationError::default();
    let mut fields = Vec::new();
    let mut relations = BTreeMap::new();
    for (name, value) in map {
        let name_path = path_with(path, name);
        match value {
            JsonValue::Bool(true) => fields.push(name.clone()),
            JsonValue::Bool(false) => {}
            JsonValue::Object(_) => match table.relation(name) {
                Some(def) => {
                    if let Some(nested) =
                        errors.absorb(parse_relation_selection(def, value, config, &name_path))
                    {
                        relations.insert(name.clone(), nested);
                    }
                }
                None if table.field(name).is_some() => {
                    errors.push(&name_path, format!("scalar field '{name}' takes true or false"))
                }
                None => errors.push(
                    &name_path,
                    format!("unknown relation '{name}' on {}", table.name),
                ),
            },
            other => errors.push(
                &name_path,
                format!("expected boolean or object, received {}", received(other)),
            ),
        }
    }
    errors.finish(Selection::Select { fields, relations })
}

/// Relation arguments from an `include` object.
pub(crate) fn parse_include(
    table: &TableDef,
    raw: &JsonValue,
    config: &ValidationConfig,
    path: &[String],
) -> Result<Selection, ValidationError> {
    let map = expect_object(raw, path)?;
    let mut errors = ValidationError::default();
    let mut relations = BTreeMap::new();
    for (name, value) in map {
        let name_path = path_with(path, name);
        match (value, table.relation(name)) {
            (JsonValue::Bool(false), _) => {}
            (JsonValue::Bool(true), _) => {
                relations.insert(name.clone(), RelationSelection::default());
            }
            (JsonValue::Object(_), Some(def)) => {
                if let Some(nested) =
                    errors.absorb(parse_relation_selection(def, value, config, &name_path))
                {
                    relations.insert(name.clone(), nested);
                }
            }
            (JsonValue::Object(_), None) => {
                // Let normalisation report scalar or unknown names.
                relations.insert(name.clone(), RelationSelection::default());
            }
            (other, _) => errors.push(
                &name_path,
                format!("expected boolean or object, received {}", received(other)),
            ),
        }
    }
    errors.finish(Selection::Include(relations))
}

fn parse_relation_selection(
    def: &RelationDef,
    raw: &JsonValue,
    config: &ValidationConfig,
    path: &[String],
) -> Result<RelationSelection, ValidationError> {
    let target = def.target.table();
    let map = expect_object(raw, path)?;
    let mut errors = ValidationError::default();
    let mut out = RelationSelection::default();

    if map.contains_key("select") && map.contains_key("include") {
        errors.push(path, "provide either 'select' or 'include', not both");
    }
    for (key, value) in map {
        let key_path = path_with(path, key);
        match key.as_str() {
            "where" => out.filter = errors.absorb(parse_where(target, value, config, &key_path)),
            "orderBy" => {
                out.order_by = errors
                    .absorb(parse_order_by(value, &key_path))
                    .unwrap_or_default()
            }
            "skip" => out.skip = errors.absorb(parse_count(value, &key_path)).unwrap_or(0),
            "take" => out.take = errors.absorb(parse_count(value, &key_path)),
            "select" => {
                if let Some(selection) = errors.absorb(parse_select(target, value, config, &key_path)) {
                    out.selection = selection;
                }
            }
            "include" => {
                if let Some(selection) = errors.absorb(parse_include(target, value, config, &key_path)) {
                    out.selection = selection;
                }
            }
            other => errors.push(
                &key_path,
                format!("unrecognized key '{other}' for relation '{}'", def.name),
            ),
        }
    }
    errors.finish(out)
}

/// A non-negative integer (`skip`, `take`).
fn parse_count(raw: &JsonValue, path: &[String]) -> Result<u64, ValidationError> {
    match raw.as_i64() {
        Some(n) if n >= 0 => Ok(n as u64),
        Some(_) => Err(ValidationError::single(path, "must not be negative")),
        None => Err(ValidationError::single(
            path,
            format!("expected integer, received {}", received(raw)),
        )),
    }
}
