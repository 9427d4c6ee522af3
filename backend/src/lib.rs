//! sitedocs
//!
//! Typed validation and query-filter layer for construction project records:
//! projects and the budgets, teams, milestones, checklists, documents,
//! letters, reports, site images and users attached to them.
//!
//! Inputs arrive as untyped JSON and leave as validated descriptors:
//!
//! - [`schema`] checks entity, create and update payloads against the field tables
//! - [`filter`] parses and evaluates where-inputs
//! - [`query`] assembles ordering, pagination, cursors and selections
//! - [`mutation`] builds create/update/delete plans with nested relation writes
//! - [`aggregate`] describes group-by requests
//!
//! Nothing here performs I/O except a [`repository::Repository`]; the bundled
//! [`repository::InMemoryStore`] executes descriptors over in-process tables.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod filter;
pub mod logging;
pub mod mutation;
pub mod query;
pub mod repository;
pub mod schema;

pub use aggregate::{AggregateFunction, AggregateGroup, AggregateSpec, Having};
pub use config::{Config, CursorPolicy, ValidationConfig};
pub use error::{RepositoryError, RepositoryResult, ValidationError, ValidationIssue};
pub use filter::{Condition, Record, Where};
pub use mutation::{MutationPlan, UniqueKey, WriteData};
pub use query::{OrderBy, QueryArgs, SortOrder};
pub use repository::{InMemoryStore, MutationOutcome, Repository};
pub use schema::{Entity, EntityKind, FieldValue};
