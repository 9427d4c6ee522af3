//! Mutation plans
//!
//! Validated descriptors of create/update/delete intent, including nested
//! relation writes. Building or parsing a plan never touches storage.

pub mod builder;
pub mod data;
pub mod plan;
pub mod relation;

pub use builder::{NestedWrite, WriteInput};
pub use data::{UniqueKey, WriteData};
pub use plan::{
    CreatePlan, DeleteManyPlan, DeletePlan, MutationPlan, UpdateManyPlan, UpdatePlan, UpsertPlan,
};
pub use relation::{
    ConnectOrCreate, CreateMany, ManyRelationMutation, NestedUpdate, NestedUpdateMany,
    NestedUpsert, OneRelationMutation, OneRelationOp, RelationMutation,
};
