//! Filter predicates
//!
//! Scalar filters per value type, predicate trees combining them across
//! fields and relations, where-input parsing, and in-memory evaluation.

pub mod parse;
pub mod predicate;
pub mod scalar;

pub use predicate::{Record, Related, RelationCondition, Where};
pub use scalar::{
    BoolFilter, Condition, DateFilter, EnumFilter, FloatFilter, IntFilter, QueryMode,
    ScalarFilter, StringFilter,
};
