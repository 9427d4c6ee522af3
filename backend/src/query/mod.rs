//! Query argument assembly
//!
//! Typed read arguments (filter, ordering, pagination, cursor, distinct and
//! select/include shape) validated against an entity's table, plus their
//! in-memory application.

pub mod args;
pub mod order;
pub mod selection;

pub use args::{QueryArgs, QueryArgsBuilder};
pub use order::{OrderBy, SortOrder};
pub use selection::{RelationSelection, Selection};
