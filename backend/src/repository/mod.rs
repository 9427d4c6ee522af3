//! Repository boundary
//!
//! Descriptors produced by this crate are executed by a [`Repository`]. The
//! trait is the seam for a real database; [`InMemoryStore`] implements it
//! over in-process tables and is what the tests run against.

mod memory;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::aggregate::{AggregateGroup, AggregateSpec};
use crate::error::RepositoryResult;
use crate::mutation::{
    CreatePlan, DeleteManyPlan, DeletePlan, MutationPlan, UniqueKey, UpdateManyPlan, UpdatePlan,
    UpsertPlan,
};
use crate::query::QueryArgs;
use crate::schema::entities::Entity;

pub use memory::InMemoryStore;

/// Result of running a [`MutationPlan`].
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome<E> {
    /// The created, updated or deleted row
    Record(E),
    /// Number of rows touched by a bulk operation
    Count(u64),
}

/// Reads and writes for one entity.
///
/// Implementations must apply a write completely or not at all: a plan that
/// fails part way leaves storage unchanged.
#[async_trait]
pub trait Repository<E: Entity>: Send + Sync {
    async fn find_many(&self, args: &QueryArgs<E>) -> RepositoryResult<Vec<E>>;

    /// First row of `find_many`.
    async fn find_first(&self, args: &QueryArgs<E>) -> RepositoryResult<Option<E>> {
        let mut first = args.clone();
        first.take = Some(1);
        Ok(self.find_many(&first).await?.into_iter().next())
    }

    async fn find_unique(&self, key: &UniqueKey) -> RepositoryResult<Option<E>>;

    /// Number of rows `find_many` would return, ignoring the selection.
    async fn count(&self, args: &QueryArgs<E>) -> RepositoryResult<u64>;

    /// Rows projected to the selection, with selected relations materialised.
    async fn find_many_shaped(&self, args: &QueryArgs<E>) -> RepositoryResult<Vec<JsonValue>>;

    async fn create(&self, plan: CreatePlan<E>) -> RepositoryResult<E>;

    async fn update(&self, plan: UpdatePlan<E>) -> RepositoryResult<E>;

    async fn upsert(&self, plan: UpsertPlan<E>) -> RepositoryResult<E>;

    async fn delete(&self, plan: DeletePlan<E>) -> RepositoryResult<E>;

    async fn update_many(&self, plan: UpdateManyPlan<E>) -> RepositoryResult<u64>;

    async fn delete_many(&self, plan: DeleteManyPlan<E>) -> RepositoryResult<u64>;

    async fn aggregate(&self, spec: &AggregateSpec<E>) -> RepositoryResult<Vec<AggregateGroup>>;

    /// Dispatch any plan to the matching operation.
    async fn execute(&self, plan: MutationPlan<E>) -> RepositoryResult<MutationOutcome<E>> {
        let outcome = match plan {
            MutationPlan::Create(plan) => MutationOutcome::Record(self.create(plan).await?),
            MutationPlan::Update(plan) => MutationOutcome::Record(self.update(plan).await?),
            MutationPlan::Upsert(plan) => MutationOutcome::Record(self.upsert(plan).await?),
            MutationPlan::Delete(plan) => MutationOutcome::Record(self.delete(plan).await?),
            MutationPlan::UpdateMany(plan) => MutationOutcome::Count(self.update_many(plan).await?),
            MutationPlan::DeleteMany(plan) => MutationOutcome::Count(self.delete_many(plan).await?),
        };
        Ok(outcome)
    }
}
