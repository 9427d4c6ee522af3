//! Entity schemas: enum registry, field tables, typed values and the
//! generic parser built on them.

pub mod entities;
pub mod enums;
pub mod field;
pub mod parse;
pub mod value;

pub use entities::{
    Budget, CheckList, ConstructionSiteImage, Documents, Entity, EntityKind, IncomingLetter,
    OutgoingLetter, Project, Report, Team, UpcomingMilestone, User,
};
pub use enums::{
    ClosedEnum, EnumDef, ImageCategory, IncomingLetterStatus, OutgoingLetterStatus, Priority,
    ReportStatus, ReportType, Status,
};
pub use field::{Cardinality, FieldDef, FieldKind, Presence, RelationDef, TableDef};
pub use parse::{DataMode, EntitySchema};
pub use value::{FieldValue, Row};
