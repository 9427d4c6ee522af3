//! Field and relation descriptors.
//!
//! Every entity is described by one static [`TableDef`]. Parsers, filters,
//! the query assembler and the in-memory store all read the same table, so
//! there is exactly one place that knows which fields an entity has.

use crate::schema::entities::EntityKind;
use crate::schema::enums::EnumDef;

/// Scalar type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Store-assigned string identifier
    Id,
    String,
    Int,
    Float,
    Bool,
    DateTime,
    Enum(EnumDef),
    /// String holding the id of a row in another table
    ForeignKey(EntityKind),
}

impl FieldKind {
    /// Type name used in "expected X, received Y" messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldKind::Id | FieldKind::String | FieldKind::ForeignKey(_) => "string",
            FieldKind::Int => "integer",
            FieldKind::Float => "number",
            FieldKind::Bool => "boolean",
            FieldKind::DateTime => "date",
            FieldKind::Enum(def) => def.name,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldKind::Int | FieldKind::Float)
    }

    /// Whether the kind is textual and supports substring operators.
    pub fn is_text(&self) -> bool {
        matches!(
            self,
            FieldKind::Id | FieldKind::String | FieldKind::ForeignKey(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Required,
    Optional,
}

/// Value the store fills in when a create omits the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultValue {
    Uuid,
    Now,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
    pub presence: Presence,
    pub unique: bool,
    pub default: Option<DefaultValue>,
}

impl FieldDef {
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            presence: Presence::Required,
            unique: false,
            default: None,
        }
    }

    pub const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            presence: Presence::Optional,
            unique: false,
            default: None,
        }
    }

    /// The `id` column every table starts with.
    pub const fn id() -> Self {
        Self::optional("id", FieldKind::Id)
            .unique()
            .default_to(DefaultValue::Uuid)
    }

    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub const fn default_to(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    /// Must be supplied on create.
    pub fn is_required_on_create(&self) -> bool {
        self.presence == Presence::Required && self.default.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// Parent side of a one-to-many relation
    Many,
    /// Parent side of a one-to-one relation that may be absent
    OptionalOne,
    /// Child side: exactly one parent
    One,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationDef {
    pub name: &'static str,
    pub target: EntityKind,
    pub cardinality: Cardinality,
    /// Foreign key column linking the two tables
    pub foreign_key: &'static str,
    /// True when the foreign key lives on this table rather than on the target
    pub owns_key: bool,
}

impl RelationDef {
    pub const fn many(name: &'static str, target: EntityKind, foreign_key: &'static str) -> Self {
        Self {
            name,
            target,
            cardinality: Cardinality::Many,
            foreign_key,
            owns_key: false,
        }
    }

    pub const fn optional_one(
        name: &'static str,
        target: EntityKind,
        foreign_key: &'static str,
    ) -> Self {
        Self {
            name,
            target,
            cardinality: Cardinality::OptionalOne,
            foreign_key,
            owns_key: false,
        }
    }

    pub const fn belongs_to(
        name: &'static str,
        target: EntityKind,
        foreign_key: &'static str,
    ) -> Self {
        Self {
            name,
            target,
            cardinality: Cardinality::One,
            foreign_key,
            owns_key: true,
        }
    }

    pub fn is_many(&self) -> bool {
        self.cardinality == Cardinality::Many
    }
}

/// Static description of one entity's table.
#[derive(Debug)]
pub struct TableDef {
    pub entity: EntityKind,
    pub name: &'static str,
    pub fields: &'static [FieldDef],
    pub relations: &'static [RelationDef],
}

impl TableDef {
    pub fn field(&self, name: &str) -> Option<&'static FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn relation(&self, name: &str) -> Option<&'static RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn unique_fields(&self) -> impl Iterator<Item = &'static FieldDef> {
        self.fields.iter().filter(|f| f.unique)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &'static str> {
        self.fields.iter().map(|f| f.name)
    }

    /// The relation whose foreign key column is `field`, if this table owns it.
    pub fn relation_for_key(&self, field: &str) -> Option<&'static RelationDef> {
        self.relations
            .iter()
            .find(|r| r.owns_key && r.foreign_key == field)
    }

    /// Comma-separated field names, for error messages.
    pub(crate) fn describe_fields(&self) -> String {
        self.field_names().collect::<Vec<_>>().join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_field_defaults() {
        let id = FieldDef::id();
        assert!(id.unique);
        assert_eq!(id.default, Some(DefaultValue::Uuid));
        assert!(!id.is_required_on_create());
    }

    #[test]
    fn test_table_lookups() {
        let table = EntityKind::Budget.table();
        assert_eq!(table.field("total").map(|f| f.kind), Some(FieldKind::Float));
        assert!(table.field("nope").is_none());
        let project = table.relation_for_key("projectId").unwrap();
        assert_eq!(project.name, "project");
        assert_eq!(project.target, EntityKind::Project);
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(FieldKind::Int.type_name(), "integer");
        assert!(FieldKind::Float.is_numeric());
        assert!(FieldKind::ForeignKey(EntityKind::Project).is_text());
    }
}
