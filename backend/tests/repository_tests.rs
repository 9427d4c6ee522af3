//! Integration tests for descriptor execution
//!
//! Validated plans and queries run against the in-memory store:
//! - Reads with ordering, pagination and shaping
//! - Writes with nested relation operations
//! - Referential and uniqueness failures
//! - Grouped aggregates

use assert_matches::assert_matches;
use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use serde_json::{Value as JsonValue, json};

use sitedocs::aggregate::AggregateGroup;
use sitedocs::mutation::{CreatePlan, DeletePlan, UpdateManyPlan, UpdatePlan, UpsertPlan};
use sitedocs::schema::{Budget, EntityKind, Project, Team, UpcomingMilestone, User};
use sitedocs::{
    AggregateSpec, FieldValue, InMemoryStore, MutationOutcome, MutationPlan, QueryArgs, Repository,
    RepositoryError, UniqueKey,
};

fn project(id: &str, name: &str, start: (i32, u32, u32), progress: i64) -> Project {
    Project {
        id: Some(id.to_string()),
        project_name: name.to_string(),
        client_name: "Maria Garcia".to_string(),
        location: "Waterfront District".to_string(),
        start_date: Utc.with_ymd_and_hms(start.0, start.1, start.2, 0, 0, 0).unwrap(),
        due_date: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        progress,
    }
}

fn budget(id: &str, project_id: &str, total: f64, spent: f64) -> Budget {
    Budget {
        id: Some(id.to_string()),
        total,
        spent,
        project_id: project_id.to_string(),
    }
}

/// Three projects, two sharing a start date, with budgets on the first two.
fn seeded() -> InMemoryStore {
    let store = InMemoryStore::new();
    store
        .seed([
            project("p2", "Ridge View", (2020, 5, 15), 20),
            project("p1", "Harbor Heights", (2020, 5, 15), 50),
            project("p3", "Cedar Yard", (2021, 1, 4), 90),
        ])
        .unwrap();
    store
        .seed([
            budget("b1", "p1", 1000.0, 200.0),
            budget("b2", "p1", 3000.0, 400.0),
            budget("b3", "p2", 500.0, 500.0),
        ])
        .unwrap();
    store
}

async fn names(store: &InMemoryStore, raw: JsonValue) -> Vec<String> {
    let args = QueryArgs::<Project>::parse(&raw).unwrap();
    Repository::<Project>::find_many(store, &args)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.project_name)
        .collect()
}

// ============================================================================
// Read Tests
// ============================================================================

mod reads {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_order_with_tie_break() {
        let store = seeded();
        let found = names(&store, json!({"orderBy": [{"startDate": "asc"}, {"id": "asc"}]})).await;
        assert_eq!(found, vec!["Harbor Heights", "Ridge View", "Cedar Yard"]);

        let found = names(&store, json!({"orderBy": [{"startDate": "desc"}, {"id": "desc"}]})).await;
        assert_eq!(found, vec!["Cedar Yard", "Ridge View", "Harbor Heights"]);
    }

    #[tokio::test]
    async fn test_skip_past_end_is_empty() {
        let store = seeded();
        let found = names(&store, json!({"skip": 5, "take": 10})).await;
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_cursor_is_exclusive() {
        let store = seeded();
        let found = names(&store, json!({"orderBy": {"id": "asc"}, "cursor": {"id": "p1"}})).await;
        assert_eq!(found, vec!["Ridge View", "Cedar Yard"]);
    }

    #[tokio::test]
    async fn test_relation_filter() {
        let store = seeded();
        let found = names(
            &store,
            json!({"where": {"budget": {"some": {"spent": {"gte": 400}}}}, "orderBy": {"id": "asc"}}),
        )
        .await;
        assert_eq!(found, vec!["Harbor Heights", "Ridge View"]);

        let found = names(&store, json!({"where": {"budget": {"none": {}}}})).await;
        assert_eq!(found, vec!["Cedar Yard"]);
    }

    #[tokio::test]
    async fn test_find_unique_and_count() {
        let store = seeded();
        let found: Option<Project> = store.find_unique(&UniqueKey::id("p3")).await.unwrap();
        assert_eq!(found.map(|p| p.progress), Some(90));

        let missing: Option<Project> = store.find_unique(&UniqueKey::id("nope")).await.unwrap();
        assert_eq!(missing, None);

        let args = QueryArgs::<Project>::parse(&json!({"where": {"progress": {"gt": 30}}})).unwrap();
        assert_eq!(Repository::<Project>::count(&store, &args).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_find_first() {
        let store = seeded();
        let args = QueryArgs::<Project>::parse(&json!({"orderBy": {"progress": "desc"}})).unwrap();
        let first = Repository::<Project>::find_first(&store, &args).await.unwrap();
        assert_eq!(first.map(|p| p.project_name), Some("Cedar Yard".to_string()));
    }

    #[tokio::test]
    async fn test_shaped_include_and_select() {
        let store = seeded();
        let args = QueryArgs::<Project>::parse(&json!({
            "where": {"id": "p1"},
            "include": {"budget": {"orderBy": {"total": "desc"}, "take": 1}}
        }))
        .unwrap();
        let shaped = Repository::<Project>::find_many_shaped(&store, &args).await.unwrap();
        assert_eq!(shaped.len(), 1);
        assert_eq!(shaped[0]["projectName"], json!("Harbor Heights"));
        let budgets = shaped[0]["budget"].as_array().unwrap();
        assert_eq!(budgets.len(), 1);
        assert_eq!(budgets[0]["id"], json!("b2"));

        let args = QueryArgs::<Project>::parse(&json!({
            "where": {"id": "p3"},
            "select": {"projectName": true, "upcomingMilestone": true}
        }))
        .unwrap();
        let shaped = Repository::<Project>::find_many_shaped(&store, &args).await.unwrap();
        assert_eq!(shaped[0], json!({"projectName": "Cedar Yard", "upcomingMilestone": null}));
    }
}

// ============================================================================
// Write Tests
// ============================================================================

mod writes {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_nested_create() {
        let store = InMemoryStore::new();
        let plan = CreatePlan::<Project>::parse(&json!({
            "data": {
                "projectName": "Harbor Heights",
                "clientName": "Maria Garcia",
                "location": "Waterfront District",
                "startDate": "2020-05-15",
                "dueDate": "2022-08-30",
                "progress": 50,
                "budget": {"create": [{"total": 1000.0, "spent": 0.0}, {"total": 50.0, "spent": 5.0}]},
                "team": {"create": {
                    "projectManager": "Ana",
                    "siteEngineer": "Ben",
                    "architect": "Cleo",
                    "safetyOfficer": "Dev",
                    "foreman": "Eli",
                    "totalWorkers": 40
                }},
                "upcomingMilestone": {"create": {"title": "Topping out", "date": "2021-06-01", "status": "ontrack"}}
            }
        }))
        .unwrap();

        let created = store.create(plan).await.unwrap();
        let project_id = created.id.clone().unwrap();
        assert_eq!(store.row_count(EntityKind::Budget), 2);
        assert_eq!(store.row_count(EntityKind::Team), 1);
        assert_eq!(store.row_count(EntityKind::UpcomingMilestone), 1);

        let args = QueryArgs::<Team>::all();
        let teams = Repository::<Team>::find_many(&store, &args).await.unwrap();
        assert_eq!(teams[0].project_id, project_id);
        assert_eq!(teams[0].total_workers, 40);
    }

    #[tokio::test]
    async fn test_connect_to_missing_row() {
        let store = seeded();
        let plan = CreatePlan::<Budget>::parse(&json!({
            "data": {"total": 10.0, "spent": 0.0, "project": {"connect": {"id": "ghost"}}}
        }))
        .unwrap();
        let err = Repository::<Budget>::create(&store, plan).await.unwrap_err();
        assert_matches!(err, RepositoryError::Reference { entity: "Project", .. });
        assert_eq!(store.row_count(EntityKind::Budget), 3);
    }

    #[tokio::test]
    async fn test_foreign_key_must_exist() {
        let store = seeded();
        let err = store.seed([budget("b9", "ghost", 1.0, 0.0)]).unwrap_err();
        assert_matches!(err, RepositoryError::Reference { .. });
    }

    #[tokio::test]
    async fn test_duplicate_email() {
        let store = InMemoryStore::new();
        let signup = |name: &str| {
            CreatePlan::<User>::parse(&json!({
                "data": {"name": name, "email": "ada@example.com", "password": "hunter22"}
            }))
            .unwrap()
        };
        let first = store.create(signup("Ada")).await.unwrap();
        assert!(first.created_at.is_some());

        let err = store.create(signup("Imposter")).await.unwrap_err();
        assert_matches!(err, RepositoryError::Constraint { ref field, .. } if field == "email");
        assert_eq!(store.row_count(EntityKind::User), 1);
    }

    #[tokio::test]
    async fn test_delete_with_children_is_restricted() {
        let store = seeded();
        let plan = DeletePlan::<Project>::parse(&json!({"where": {"id": "p1"}})).unwrap();
        let err = Repository::<Project>::delete(&store, plan).await.unwrap_err();
        assert_matches!(err, RepositoryError::Constraint { ref field, .. } if field == "budget");
        assert_eq!(store.row_count(EntityKind::Project), 3);

        let plan = DeletePlan::<Project>::parse(&json!({"where": {"id": "p3"}})).unwrap();
        let deleted = Repository::<Project>::delete(&store, plan).await.unwrap();
        assert_eq!(deleted.project_name, "Cedar Yard");
        assert_eq!(store.row_count(EntityKind::Project), 2);
    }

    #[tokio::test]
    async fn test_update_missing_row() {
        let store = seeded();
        let plan = UpdatePlan::<Project>::parse(&json!({"where": {"id": "ghost"}, "data": {"progress": 1}})).unwrap();
        let err = Repository::<Project>::update(&store, plan).await.unwrap_err();
        assert_matches!(err, RepositoryError::NotFound { entity: "Project", .. });
    }

    #[tokio::test]
    async fn test_nested_update_and_delete_many() {
        let store = seeded();
        let plan = UpdatePlan::<Project>::parse(&json!({
            "where": {"id": "p1"},
            "data": {
                "progress": 60,
                "budget": {
                    "update": {"where": {"id": "b1"}, "data": {"spent": 300.0}},
                    "deleteMany": {"total": {"gt": 2000}}
                }
            }
        }))
        .unwrap();
        let updated = Repository::<Project>::update(&store, plan).await.unwrap();
        assert_eq!(updated.progress, 60);

        let budgets = Repository::<Budget>::find_many(&store, &QueryArgs::all()).await.unwrap();
        let ids: Vec<_> = budgets.iter().filter_map(|b| b.id.as_deref()).collect();
        assert_eq!(ids, vec!["b1", "b3"]);
        assert_eq!(budgets[0].spent, 300.0);
    }

    #[tokio::test]
    async fn test_failed_nested_write_rolls_back() {
        let store = seeded();
        let plan = UpdatePlan::<Project>::parse(&json!({
            "where": {"id": "p1"},
            "data": {
                "progress": 99,
                "budget": {"update": {"where": {"id": "b3"}, "data": {"spent": 0.0}}}
            }
        }))
        .unwrap();
        let err = Repository::<Project>::update(&store, plan).await.unwrap_err();
        assert_matches!(err, RepositoryError::NotFound { .. });

        let p1: Option<Project> = store.find_unique(&UniqueKey::id("p1")).await.unwrap();
        assert_eq!(p1.map(|p| p.progress), Some(50));
    }

    #[tokio::test]
    async fn test_one_milestone_per_project() {
        let store = seeded();
        let milestone = |id: &str| UpcomingMilestone {
            id: Some(id.to_string()),
            title: "Handover".to_string(),
            date: Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
            status: sitedocs::schema::Status::OnTrack,
            project_id: "p1".to_string(),
        };
        store.seed([milestone("m1")]).unwrap();
        let err = store.seed([milestone("m2")]).unwrap_err();
        assert_matches!(err, RepositoryError::Constraint { ref field, .. } if field == "projectId");
    }

    #[tokio::test]
    async fn test_upsert_and_update_many() {
        let store = seeded();
        let upsert = |progress: i64| {
            UpsertPlan::<Project>::parse(&json!({
                "where": {"id": "p9"},
                "create": {
                    "id": "p9",
                    "projectName": "Quarry Lane",
                    "clientName": "Jo Park",
                    "location": "North Quarry",
                    "startDate": "2022-02-02",
                    "dueDate": "2023-02-02",
                    "progress": progress
                },
                "update": {"progress": progress}
            }))
            .unwrap()
        };
        let created = Repository::<Project>::upsert(&store, upsert(5)).await.unwrap();
        assert_eq!(created.progress, 5);
        let updated = Repository::<Project>::upsert(&store, upsert(15)).await.unwrap();
        assert_eq!(updated.progress, 15);
        assert_eq!(store.row_count(EntityKind::Project), 4);

        let plan = UpdateManyPlan::<Project>::parse(&json!({
            "where": {"progress": {"lt": 30}},
            "data": {"location": "Relocated"}
        }))
        .unwrap();
        let outcome = store.execute(MutationPlan::UpdateMany(plan)).await.unwrap();
        assert_eq!(outcome, MutationOutcome::Count(2));
    }
}

// ============================================================================
// Aggregate Tests
// ============================================================================

mod aggregates {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_budget_totals_by_project() {
        let store = seeded();
        let spec = AggregateSpec::<Budget>::parse(&json!({
            "by": ["projectId"],
            "_count": {"_all": true},
            "_avg": {"spent": true},
            "_sum": {"total": true}
        }))
        .unwrap();
        let groups: Vec<AggregateGroup> = store.aggregate(&spec).await.unwrap();
        assert_eq!(groups.len(), 2);

        let p1 = groups
            .iter()
            .find(|g| g.key.get("projectId") == Some(&FieldValue::from("p1")))
            .unwrap();
        assert_eq!(p1.count.get("_all"), Some(&2));
        assert_eq!(p1.avg.get("spent"), Some(&Some(300.0)));
        assert_eq!(p1.sum.get("total"), Some(&Some(FieldValue::Float(4000.0))));
    }

    #[tokio::test]
    async fn test_having_filters_groups() {
        let store = seeded();
        let spec = AggregateSpec::<Budget>::parse(&json!({
            "by": ["projectId"],
            "_sum": {"total": true},
            "having": {"total": {"_sum": {"gt": 1000}}}
        }))
        .unwrap();
        let groups = store.aggregate(&spec).await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].to_json()["projectId"], json!("p1"));
    }
}
