//! Domain entities and their field tables.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::ValidationError;
use crate::schema::enums::{
    EnumDef, ImageCategory, IncomingLetterStatus, OutgoingLetterStatus, Priority, ReportStatus,
    ReportType, Status,
};
use crate::schema::field::{DefaultValue, FieldDef, FieldKind, RelationDef, TableDef};
use crate::schema::value::{FieldValue, Row};

/// Every table of the domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Project,
    Budget,
    Team,
    UpcomingMilestone,
    CheckList,
    Documents,
    IncomingLetter,
    OutgoingLetter,
    Report,
    ConstructionSiteImage,
    User,
}

impl EntityKind {
    pub const ALL: &'static [EntityKind] = &[
        EntityKind::Project,
        EntityKind::Budget,
        EntityKind::Team,
        EntityKind::UpcomingMilestone,
        EntityKind::CheckList,
        EntityKind::Documents,
        EntityKind::IncomingLetter,
        EntityKind::OutgoingLetter,
        EntityKind::Report,
        EntityKind::ConstructionSiteImage,
        EntityKind::User,
    ];

    pub fn table(&self) -> &'static TableDef {
        match self {
            EntityKind::Project => &PROJECT,
            EntityKind::Budget => &BUDGET,
            EntityKind::Team => &TEAM,
            EntityKind::UpcomingMilestone => &UPCOMING_MILESTONE,
            EntityKind::CheckList => &CHECK_LIST,
            EntityKind::Documents => &DOCUMENTS,
            EntityKind::IncomingLetter => &INCOMING_LETTER,
            EntityKind::OutgoingLetter => &OUTGOING_LETTER,
            EntityKind::Report => &REPORT,
            EntityKind::ConstructionSiteImage => &CONSTRUCTION_SITE_IMAGE,
            EntityKind::User => &USER,
        }
    }

    pub fn name(&self) -> &'static str {
        self.table().name
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Tables
// ============================================================================

const fn project_key() -> FieldDef {
    FieldDef::required("projectId", FieldKind::ForeignKey(EntityKind::Project))
}

const fn belongs_to_project() -> RelationDef {
    RelationDef::belongs_to("project", EntityKind::Project, "projectId")
}

const fn enum_of(def: EnumDef) -> FieldKind {
    FieldKind::Enum(def)
}

pub static PROJECT: TableDef = TableDef {
    entity: EntityKind::Project,
    name: "Project",
    fields: &[
        FieldDef::id(),
        FieldDef::required("projectName", FieldKind::String),
        FieldDef::required("clientName", FieldKind::String),
        FieldDef::required("location", FieldKind::String),
        FieldDef::required("startDate", FieldKind::DateTime),
        FieldDef::required("dueDate", FieldKind::DateTime),
        FieldDef::required("progress", FieldKind::Int),
    ],
    relations: &[
        RelationDef::many("budget", EntityKind::Budget, "projectId"),
        RelationDef::many("team", EntityKind::Team, "projectId"),
        RelationDef::optional_one(
            "upcomingMilestone",
            EntityKind::UpcomingMilestone,
            "projectId",
        ),
        RelationDef::many("checkList", EntityKind::CheckList, "projectId"),
        RelationDef::many("documents", EntityKind::Documents, "projectId"),
        RelationDef::many("incomingLetter", EntityKind::IncomingLetter, "projectId"),
        RelationDef::many("outgoingLetter", EntityKind::OutgoingLetter, "projectId"),
        RelationDef::many("report", EntityKind::Report, "projectId"),
        RelationDef::many(
            "constructionSiteImage",
            EntityKind::ConstructionSiteImage,
            "projectId",
        ),
    ],
};

pub static BUDGET: TableDef = TableDef {
    entity: EntityKind::Budget,
    name: "Budget",
    fields: &[
        FieldDef::id(),
        FieldDef::required("total", FieldKind::Float),
        FieldDef::required("spent", FieldKind::Float),
        project_key(),
    ],
    relations: &[belongs_to_project()],
};

pub static TEAM: TableDef = TableDef {
    entity: EntityKind::Team,
    name: "Team",
    fields: &[
        FieldDef::id(),
        FieldDef::required("projectManager", FieldKind::String),
        FieldDef::required("siteEngineer", FieldKind::String),
        FieldDef::required("architect", FieldKind::String),
        FieldDef::required("safetyOfficer", FieldKind::String),
        FieldDef::required("foreman", FieldKind::String),
        FieldDef::required("totalWorkers", FieldKind::Int),
        project_key(),
    ],
    relations: &[belongs_to_project()],
};

// One milestone per project: the foreign key itself is unique.
pub static UPCOMING_MILESTONE: TableDef = TableDef {
    entity: EntityKind::UpcomingMilestone,
    name: "UpcomingMilestone",
    fields: &[
        FieldDef::id(),
        FieldDef::required("title", FieldKind::String),
        FieldDef::required("date", FieldKind::DateTime),
        FieldDef::required("status", enum_of(EnumDef::of::<Status>())),
        project_key().unique(),
    ],
    relations: &[belongs_to_project()],
};

pub static CHECK_LIST: TableDef = TableDef {
    entity: EntityKind::CheckList,
    name: "CheckList",
    fields: &[
        FieldDef::id(),
        FieldDef::required("task", FieldKind::String),
        FieldDef::required("status", enum_of(EnumDef::of::<Status>())),
        FieldDef::required("assignee", FieldKind::String),
        FieldDef::required("dueDate", FieldKind::DateTime),
        FieldDef::required("priority", enum_of(EnumDef::of::<Priority>())),
        FieldDef::required("completed", FieldKind::Bool),
        project_key(),
    ],
    relations: &[belongs_to_project()],
};

pub static DOCUMENTS: TableDef = TableDef {
    entity: EntityKind::Documents,
    name: "Documents",
    fields: &[
        FieldDef::id(),
        FieldDef::required("name", FieldKind::String),
        FieldDef::required("date", FieldKind::DateTime),
        FieldDef::required("downloadUrl", FieldKind::String),
        project_key(),
    ],
    relations: &[belongs_to_project()],
};

pub static INCOMING_LETTER: TableDef = TableDef {
    entity: EntityKind::IncomingLetter,
    name: "IncomingLetter",
    fields: &[
        FieldDef::id(),
        FieldDef::required("sender", FieldKind::String),
        FieldDef::required("subject", FieldKind::String),
        FieldDef::required("priority", enum_of(EnumDef::of::<Priority>())),
        FieldDef::required("status", enum_of(EnumDef::of::<IncomingLetterStatus>())),
        FieldDef::required("createdAt", FieldKind::DateTime),
        FieldDef::required("updatedAt", FieldKind::DateTime),
        FieldDef::required("downloadUrl", FieldKind::String),
        project_key(),
    ],
    relations: &[belongs_to_project()],
};

pub static OUTGOING_LETTER: TableDef = TableDef {
    entity: EntityKind::OutgoingLetter,
    name: "OutgoingLetter",
    fields: &[
        FieldDef::id(),
        FieldDef::required("recipient", FieldKind::String),
        FieldDef::required("subject", FieldKind::String),
        FieldDef::required("status", enum_of(EnumDef::of::<OutgoingLetterStatus>())),
        FieldDef::required("priority", enum_of(EnumDef::of::<Priority>())),
        FieldDef::required("createdAt", FieldKind::DateTime),
        FieldDef::required("downloadUrl", FieldKind::String),
        project_key(),
    ],
    relations: &[belongs_to_project()],
};

pub static REPORT: TableDef = TableDef {
    entity: EntityKind::Report,
    name: "Report",
    fields: &[
        FieldDef::id(),
        FieldDef::required("publisher", FieldKind::String),
        FieldDef::required("status", enum_of(EnumDef::of::<ReportStatus>())),
        FieldDef::required("uploadedAt", FieldKind::DateTime),
        FieldDef::required("modifiedAt", FieldKind::DateTime),
        FieldDef::required("version", FieldKind::String),
        FieldDef::required("downloadUrl", FieldKind::String),
        FieldDef::required("reportType", enum_of(EnumDef::of::<ReportType>())),
        project_key(),
    ],
    relations: &[belongs_to_project()],
};

pub static CONSTRUCTION_SITE_IMAGE: TableDef = TableDef {
    entity: EntityKind::ConstructionSiteImage,
    name: "ConstructionSiteImage",
    fields: &[
        FieldDef::id(),
        FieldDef::required("title", FieldKind::String),
        FieldDef::required("imageSrc", FieldKind::String),
        FieldDef::required("location", FieldKind::String),
        FieldDef::required("date", FieldKind::DateTime),
        FieldDef::required("category", enum_of(EnumDef::of::<ImageCategory>())),
        project_key(),
    ],
    relations: &[belongs_to_project()],
};

pub static USER: TableDef = TableDef {
    entity: EntityKind::User,
    name: "User",
    fields: &[
        FieldDef::id(),
        FieldDef::required("name", FieldKind::String),
        FieldDef::required("email", FieldKind::String).unique(),
        FieldDef::required("password", FieldKind::String),
        FieldDef::optional("createdAt", FieldKind::DateTime).default_to(DefaultValue::Now),
        FieldDef::optional("updatedAt", FieldKind::DateTime).default_to(DefaultValue::Now),
    ],
    relations: &[],
};

// ============================================================================
// Entity trait
// ============================================================================

/// A typed record backed by one [`TableDef`].
pub trait Entity:
    Serialize + DeserializeOwned + Clone + PartialEq + std::fmt::Debug + Send + Sync + 'static
{
    const KIND: EntityKind;

    fn table() -> &'static TableDef {
        Self::KIND.table()
    }

    /// Store-assigned id, `None` until persisted.
    fn id(&self) -> Option<&str>;

    /// Scalar fields as typed values; absent optionals are left out.
    fn to_row(&self) -> Row;

    /// Rebuild an entity from a row produced by [`Entity::to_row`] or the store.
    fn from_row(row: &Row) -> Result<Self, ValidationError> {
        serde_json::from_value(row_to_json(row))
            .map_err(|e| ValidationError::single(&[], e.to_string()))
    }
}

/// JSON object with the row's fields.
pub fn row_to_json(row: &Row) -> JsonValue {
    JsonValue::Object(
        row.iter()
            .map(|(key, value)| (key.clone(), value.to_json()))
            .collect::<Map<_, _>>(),
    )
}

/// A struct field as a row value; `None` for an absent optional.
trait ToField {
    fn to_field(&self) -> Option<FieldValue>;
}

impl ToField for String {
    fn to_field(&self) -> Option<FieldValue> {
        Some(FieldValue::String(self.clone()))
    }
}

impl ToField for i64 {
    fn to_field(&self) -> Option<FieldValue> {
        Some(FieldValue::Int(*self))
    }
}

impl ToField for f64 {
    fn to_field(&self) -> Option<FieldValue> {
        Some(FieldValue::Float(*self))
    }
}

impl ToField for bool {
    fn to_field(&self) -> Option<FieldValue> {
        Some(FieldValue::Bool(*self))
    }
}

impl ToField for DateTime<Utc> {
    fn to_field(&self) -> Option<FieldValue> {
        Some(FieldValue::DateTime(*self))
    }
}

impl<T: ToField> ToField for Option<T> {
    fn to_field(&self) -> Option<FieldValue> {
        self.as_ref().and_then(ToField::to_field)
    }
}

macro_rules! enum_fields {
    ($($ty:ident),* $(,)?) => {
        $(
            impl ToField for $ty {
                fn to_field(&self) -> Option<FieldValue> {
                    Some(FieldValue::from(*self))
                }
            }
        )*
    };
}

enum_fields!(
    Status,
    Priority,
    IncomingLetterStatus,
    OutgoingLetterStatus,
    ReportStatus,
    ReportType,
    ImageCategory,
);

macro_rules! impl_entity {
    ($($ty:ident { $($field:ident => $wire:literal),* $(,)? })*) => {
        $(
            impl Entity for $ty {
                const KIND: EntityKind = EntityKind::$ty;

                fn id(&self) -> Option<&str> {
                    self.id.as_deref()
                }

                fn to_row(&self) -> Row {
                    let mut row = Row::new();
                    $(
                        if let Some(value) = self.$field.to_field() {
                            row.insert($wire.to_string(), value);
                        }
                    )*
                    row
                }
            }
        )*
    };
}

impl_entity! {
    Project {
        id => "id",
        project_name => "projectName",
        client_name => "clientName",
        location => "location",
        start_date => "startDate",
        due_date => "dueDate",
        progress => "progress",
    }
    Budget {
        id => "id",
        total => "total",
        spent => "spent",
        project_id => "projectId",
    }
    Team {
        id => "id",
        project_manager => "projectManager",
        site_engineer => "siteEngineer",
        architect => "architect",
        safety_officer => "safetyOfficer",
        foreman => "foreman",
        total_workers => "totalWorkers",
        project_id => "projectId",
    }
    UpcomingMilestone {
        id => "id",
        title => "title",
        date => "date",
        status => "status",
        project_id => "projectId",
    }
    CheckList {
        id => "id",
        task => "task",
        status => "status",
        assignee => "assignee",
        due_date => "dueDate",
        priority => "priority",
        completed => "completed",
        project_id => "projectId",
    }
    Documents {
        id => "id",
        name => "name",
        date => "date",
        download_url => "downloadUrl",
        project_id => "projectId",
    }
    IncomingLetter {
        id => "id",
        sender => "sender",
        subject => "subject",
        priority => "priority",
        status => "status",
        created_at => "createdAt",
        updated_at => "updatedAt",
        download_url => "downloadUrl",
        project_id => "projectId",
    }
    OutgoingLetter {
        id => "id",
        recipient => "recipient",
        subject => "subject",
        status => "status",
        priority => "priority",
        created_at => "createdAt",
        download_url => "downloadUrl",
        project_id => "projectId",
    }
    Report {
        id => "id",
        publisher => "publisher",
        status => "status",
        uploaded_at => "uploadedAt",
        modified_at => "modifiedAt",
        version => "version",
        download_url => "downloadUrl",
        report_type => "reportType",
        project_id => "projectId",
    }
    ConstructionSiteImage {
        id => "id",
        title => "title",
        image_src => "imageSrc",
        location => "location",
        date => "date",
        category => "category",
        project_id => "projectId",
    }
    User {
        id => "id",
        name => "name",
        email => "email",
        password => "password",
        created_at => "createdAt",
        updated_at => "updatedAt",
    }
}

// ============================================================================
// Entity structs
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Project {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub project_name: String,
    pub client_name: String,
    pub location: String,
    pub start_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub progress: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Budget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub total: f64,
    pub spent: f64,
    pub project_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Team {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub project_manager: String,
    pub site_engineer: String,
    pub architect: String,
    pub safety_officer: String,
    pub foreman: String,
    pub total_workers: i64,
    pub project_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpcomingMilestone {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    pub date: DateTime<Utc>,
    pub status: Status,
    pub project_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CheckList {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub task: String,
    pub status: Status,
    pub assignee: String,
    pub due_date: DateTime<Utc>,
    pub priority: Priority,
    pub completed: bool,
    pub project_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Documents {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub date: DateTime<Utc>,
    pub download_url: String,
    pub project_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct IncomingLetter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub sender: String,
    pub subject: String,
    pub priority: Priority,
    pub status: IncomingLetterStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub download_url: String,
    pub project_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OutgoingLetter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub recipient: String,
    pub subject: String,
    pub status: OutgoingLetterStatus,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub download_url: String,
    pub project_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Report {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub publisher: String,
    pub status: ReportStatus,
    pub uploaded_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub version: String,
    pub download_url: String,
    pub report_type: ReportType,
    pub project_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConstructionSiteImage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    pub image_src: String,
    pub location: String,
    pub date: DateTime<Utc>,
    pub category: ImageCategory,
    pub project_id: String,
}

/// Application user. `password` is stored as given; hashing happens upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct User {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}
