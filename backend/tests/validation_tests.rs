//! Integration tests for input validation
//!
//! These tests drive the public parsing surface with raw JSON the way a
//! request handler would:
//! - Entity payloads and enum membership
//! - Where-inputs and their evaluation
//! - Query argument assembly
//! - Mutation plans and aggregate requests

use assert_matches::assert_matches;
use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use serde_json::json;

use sitedocs::filter::{BoolFilter, EnumFilter, IntFilter};
use sitedocs::mutation::{CreatePlan, DeleteManyPlan, RelationMutation, UpdatePlan};
use sitedocs::schema::{
    Budget, CheckList, EntitySchema, FieldValue, Priority, Project, Status, UpcomingMilestone, User,
};
use sitedocs::{
    AggregateSpec, CursorPolicy, MutationPlan, QueryArgs, ValidationConfig, ValidationError, Where,
};

fn harbor_heights() -> serde_json::Value {
    json!({
        "projectName": "Harbor Heights",
        "clientName": "Maria Garcia",
        "location": "Waterfront District",
        "startDate": "2020-05-15",
        "dueDate": "2022-08-30",
        "progress": 50
    })
}

fn paths(err: &ValidationError) -> Vec<String> {
    err.issues.iter().map(|issue| issue.dotted_path()).collect()
}

// ============================================================================
// Entity Payload Tests
// ============================================================================

mod entity_payloads {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_harbor_heights_parses() {
        let project = EntitySchema::<Project>::parse(&harbor_heights()).unwrap();
        assert_eq!(project.project_name, "Harbor Heights");
        assert_eq!(project.client_name, "Maria Garcia");
        assert_eq!(project.due_date, Utc.with_ymd_and_hms(2022, 8, 30, 0, 0, 0).unwrap());
        assert_eq!(project.progress, 50);
    }

    #[test]
    fn test_progress_as_text_is_rejected_at_its_path() {
        let mut raw = harbor_heights();
        raw["progress"] = json!("fifty");
        let err = EntitySchema::<Project>::parse(&raw).unwrap_err();
        assert!(err.has_path(&["progress"]));
        assert_eq!(err.issues.len(), 1);
    }

    #[test]
    fn test_date_offset_shifts_date_only_strings() {
        let config = ValidationConfig {
            date_offset_minutes: 120,
            ..Default::default()
        };
        let project = EntitySchema::<Project>::parse_with(&harbor_heights(), &config).unwrap();
        assert_eq!(project.start_date, Utc.with_ymd_and_hms(2020, 5, 14, 22, 0, 0).unwrap());
    }

    #[test]
    fn test_milestone_status_membership() {
        let milestone = json!({
            "title": "Foundation poured",
            "date": "2021-01-10",
            "status": "ontrack",
            "projectId": "p1"
        });
        let parsed = EntitySchema::<UpcomingMilestone>::parse(&milestone).unwrap();
        assert_eq!(parsed.status, Status::OnTrack);

        let mut done = milestone.clone();
        done["status"] = json!("done");
        let err = EntitySchema::<UpcomingMilestone>::parse(&done).unwrap_err();
        assert!(err.has_path(&["status"]));
        assert!(err.issues[0].message.contains("ontrack"));
    }

    #[test]
    fn test_checklist_enums() {
        let raw = json!({
            "task": "Inspect scaffolding",
            "status": "atrisk",
            "assignee": "Sam Lee",
            "dueDate": "2021-02-01",
            "priority": "urgent",
            "completed": false,
            "projectId": "p1"
        });
        let err = EntitySchema::<CheckList>::parse(&raw).unwrap_err();
        assert_eq!(paths(&err), vec!["priority".to_string()]);
    }

    #[test]
    fn test_user_timestamps_are_optional() {
        let user = EntitySchema::<User>::parse(&json!({
            "name": "Ada",
            "email": "ada@example.com",
            "password": "hunter22"
        }))
        .unwrap();
        assert_eq!(user.created_at, None);
    }

    #[test]
    fn test_every_violation_is_reported() {
        let raw = json!({"total": "lots", "spent": true});
        let err = EntitySchema::<Budget>::parse(&raw).unwrap_err();
        let found = paths(&err);
        for path in ["total", "spent", "projectId"] {
            assert!(found.contains(&path.to_string()), "missing {path} in {found:?}");
        }
    }
}

// ============================================================================
// Where-input Tests
// ============================================================================

mod where_inputs {
    use super::*;
    use pretty_assertions::assert_eq;

    fn checklist(priority: Priority, completed: bool) -> CheckList {
        CheckList {
            id: Some("c1".to_string()),
            task: "Pour slab".to_string(),
            status: Status::OnTrack,
            assignee: "Sam Lee".to_string(),
            due_date: Utc.with_ymd_and_hms(2021, 3, 1, 0, 0, 0).unwrap(),
            priority,
            completed,
            project_id: "p1".to_string(),
        }
    }

    #[test]
    fn test_empty_and_or() {
        let item = checklist(Priority::High, false);
        assert!(Where::and([]).matches_entity(&item));
        assert!(!Where::or([]).matches_entity(&item));
    }

    #[test]
    fn test_double_negation() {
        let item = checklist(Priority::High, false);
        let base = Where::field("completed", BoolFilter::equals(false));
        let twice = Where::not(Where::not(base.clone()));
        assert_eq!(base.matches_entity(&item), twice.matches_entity(&item));
    }

    #[test]
    fn test_high_priority_open_items() {
        let filter = Where::parse::<CheckList>(&json!({
            "priority": "high",
            "completed": false
        }))
        .unwrap();
        assert!(filter.matches_entity(&checklist(Priority::High, false)));
        assert!(!filter.matches_entity(&checklist(Priority::High, true)));
        assert!(!filter.matches_entity(&checklist(Priority::Low, false)));

        let built = Where::and([
            Where::field("priority", EnumFilter::equals("high")),
            Where::field("completed", BoolFilter::equals(false)),
        ]);
        assert!(built.validate::<CheckList>().is_ok());
        assert!(built.matches_entity(&checklist(Priority::High, false)));
    }

    #[test]
    fn test_unknown_enum_value_in_filter() {
        let err = Where::parse::<CheckList>(&json!({"priority": {"in": ["high", "critical"]}})).unwrap_err();
        assert_eq!(err.issues.len(), 1);
        assert!(err.issues[0].dotted_path().starts_with("priority"));
    }

    #[test]
    fn test_operator_must_fit_field_type() {
        let err = Where::parse::<Project>(&json!({"progress": {"contains": "5"}})).unwrap_err();
        assert!(!err.is_empty());

        let bad = Where::field("projectName", IntFilter::gte(3));
        assert!(bad.validate::<Project>().is_err());
    }

    #[test]
    fn test_relation_filters() {
        assert!(Where::parse::<Project>(&json!({"budget": {"some": {"spent": {"gt": 100}}}})).is_ok());
        let err = Where::parse::<Project>(&json!({"budget": {"is": {}}})).unwrap_err();
        assert!(err.has_path(&["budget", "is"]));
    }
}

// ============================================================================
// Query Argument Tests
// ============================================================================

mod query_args {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_full_query_parses() {
        let args = QueryArgs::<Project>::parse(&json!({
            "where": {"progress": {"gte": 25}},
            "orderBy": [{"startDate": "desc"}, {"id": "asc"}],
            "skip": 5,
            "take": 10,
            "include": {"budget": true, "team": {"take": 1}}
        }))
        .unwrap();
        assert_eq!(args.skip, 5);
        assert_eq!(args.take, Some(10));
        assert_eq!(args.order_by.len(), 2);
        assert!(args.warnings.is_empty());
    }

    #[test]
    fn test_errors_are_collected_with_paths() {
        let err = QueryArgs::<Project>::parse(&json!({
            "where": {"progress": "fifty"},
            "orderBy": {"owner": "asc"},
            "take": -1,
            "colour": "blue"
        }))
        .unwrap_err();
        let found = paths(&err);
        assert!(found.iter().any(|p| p.starts_with("where.progress")), "{found:?}");
        assert!(found.iter().any(|p| p.starts_with("orderBy")), "{found:?}");
        assert!(found.contains(&"take".to_string()), "{found:?}");
        assert!(found.contains(&"colour".to_string()), "{found:?}");
    }

    #[test]
    fn test_select_and_include_conflict() {
        let err = QueryArgs::<Project>::parse(&json!({
            "select": {"projectName": true},
            "include": {"budget": true}
        }))
        .unwrap_err();
        assert!(!err.is_empty());
    }

    #[test]
    fn test_cursor_policy() {
        let raw = json!({"cursor": {"id": "p1"}, "orderBy": {"progress": "asc"}});
        let args = QueryArgs::<Project>::parse(&raw).unwrap();
        assert_eq!(args.warnings.len(), 1);

        let strict = ValidationConfig {
            cursor_policy: CursorPolicy::Reject,
            ..Default::default()
        };
        let err = QueryArgs::<Project>::parse_with(&raw, &strict).unwrap_err();
        assert!(err.has_path(&["cursor"]));
    }

    #[test]
    fn test_take_is_clamped() {
        let config = ValidationConfig {
            max_take: 20,
            ..Default::default()
        };
        let args = QueryArgs::<Project>::parse_with(&json!({"take": 500}), &config).unwrap();
        assert_eq!(args.take, Some(20));
    }
}

// ============================================================================
// Mutation Plan Tests
// ============================================================================

mod mutation_plans {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_nested_create() {
        let mut data = harbor_heights();
        data["budget"] = json!({"create": [{"total": 1000.0, "spent": 250.0}]});
        data["upcomingMilestone"] = json!({"create": {"title": "Topping out", "date": "2021-06-01", "status": "ontrack"}});

        let plan = CreatePlan::<Project>::parse(&json!({"data": data})).unwrap();
        assert_eq!(plan.data.fields.get("progress"), Some(&FieldValue::Int(50)));
        assert_matches!(plan.data.relations.get("budget"), Some(RelationMutation::Many(m)) if m.create.len() == 1);
        assert_matches!(plan.data.relations.get("upcomingMilestone"), Some(RelationMutation::One(_)));
    }

    #[test]
    fn test_nested_create_errors_carry_relation_path() {
        let mut data = harbor_heights();
        data["budget"] = json!({"create": [{"total": "a lot", "spent": 0}]});
        let err = CreatePlan::<Project>::parse(&json!({"data": data})).unwrap_err();
        assert!(paths(&err).iter().any(|p| p.starts_with("data.budget.create.0.total")), "{:?}", paths(&err));
    }

    #[test]
    fn test_update_is_partial_and_needs_a_unique_key() {
        let plan = UpdatePlan::<Project>::parse(&json!({
            "where": {"id": "p1"},
            "data": {"progress": 75}
        }))
        .unwrap();
        assert_eq!(plan.data.fields.len(), 1);

        let err = UpdatePlan::<Project>::parse(&json!({
            "where": {"projectName": "Harbor Heights"},
            "data": {"progress": 75}
        }))
        .unwrap_err();
        assert!(!err.is_empty());
    }

    #[test]
    fn test_dispatch_by_operation_name() {
        let plan = MutationPlan::<Budget>::parse("deleteMany", &json!({"where": {"spent": {"gt": 0}}})).unwrap();
        assert_eq!(plan.operation(), "deleteMany");
        assert!(MutationPlan::<Budget>::parse("truncate", &json!({})).is_err());
        assert!(DeleteManyPlan::<Budget>::parse(&json!({})).is_ok());
    }
}

// ============================================================================
// Aggregate Request Tests
// ============================================================================

mod aggregates {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_group_by_project() {
        let spec = AggregateSpec::<Budget>::parse(&json!({
            "by": ["projectId"],
            "_avg": {"spent": true},
            "_sum": {"total": true},
            "having": {"total": {"_sum": {"gt": 1000}}}
        }))
        .unwrap();
        assert_eq!(spec.by, vec!["projectId".to_string()]);
    }

    #[test]
    fn test_average_of_text_is_rejected() {
        let err = AggregateSpec::<Project>::parse(&json!({
            "by": ["location"],
            "_avg": {"projectName": true}
        }))
        .unwrap_err();
        assert!(err.has_path(&["_avg", "projectName"]));
    }
}
