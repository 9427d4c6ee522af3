//! Generic entity parser driven by the field tables.

use std::marker::PhantomData;

use serde_json::{Map, Value as JsonValue};

use crate::config::ValidationConfig;
use crate::error::{ValidationError, path_with};
use crate::schema::entities::{Entity, row_to_json};
use crate::schema::field::{Presence, TableDef};
use crate::schema::value::{self, Row, received};

/// What a raw object is being validated as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataMode {
    /// A complete record
    Entity,
    /// Create input: required fields must be present, defaults may be omitted
    Create,
    /// Update input: every field is optional
    Update,
}

/// Extra rules for one object.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ObjectRules<'a> {
    pub mode: DataMode,
    /// Foreign key implied by the enclosing relation; supplying it is an error
    pub implied: Option<&'a str>,
    /// Keys whose value comes from elsewhere (e.g. a relation operation)
    pub satisfied: &'a [&'a str],
}

impl ObjectRules<'_> {
    pub fn mode(mode: DataMode) -> Self {
        Self {
            mode,
            implied: None,
            satisfied: &[],
        }
    }
}

/// Borrow `raw` as an object or report the mismatch at `path`.
pub(crate) fn expect_object<'a>(
    raw: &'a JsonValue,
    path: &[String],
) -> Result<&'a Map<String, JsonValue>, ValidationError> {
    raw.as_object().ok_or_else(|| {
        ValidationError::single(path, format!("expected object, received {}", received(raw)))
    })
}

/// Validate the scalar keys of `map` against `table`.
///
/// Every violation is collected; the row is only returned when there are none.
pub(crate) fn validate_object(
    table: &TableDef,
    map: &Map<String, JsonValue>,
    rules: ObjectRules<'_>,
    config: &ValidationConfig,
    path: &[String],
) -> Result<Row, ValidationError> {
    let mut errors = ValidationError::default();
    let mut row = Row::new();

    for (key, raw) in map {
        let key_path = path_with(path, key);
        let Some(field) = table.field(key) else {
            errors.push(&key_path, format!("unrecognized key '{key}' for {}", table.name));
            continue;
        };
        if rules.implied == Some(key.as_str()) {
            errors.push(&key_path, format!("'{key}' is set by the enclosing relation"));
            continue;
        }
        match value::convert(&field.kind, raw, config) {
            Ok(value) => {
                row.insert(key.clone(), value);
            }
            Err(message) => errors.push(&key_path, message),
        }
    }

    if rules.mode != DataMode::Update {
        for field in table.fields {
            let supplied = map.contains_key(field.name)
                || rules.implied == Some(field.name)
                || rules.satisfied.contains(&field.name);
            let needed = match rules.mode {
                DataMode::Entity => field.presence == Presence::Required,
                _ => field.is_required_on_create(),
            };
            if needed && !supplied {
                errors.push(&path_with(path, field.name), "required");
            }
        }
    }

    errors.finish(row)
}

/// Parser and serializer for entity `E`.
pub struct EntitySchema<E>(PhantomData<fn() -> E>);

impl<E: Entity> EntitySchema<E> {
    /// Validate `raw` as a complete `E` with default settings.
    pub fn parse(raw: &JsonValue) -> Result<E, ValidationError> {
        Self::parse_with(raw, &ValidationConfig::default())
    }

    pub fn parse_with(raw: &JsonValue, config: &ValidationConfig) -> Result<E, ValidationError> {
        Self::parse_at(raw, config, &[])
    }

    /// Validate an array of records; issue paths start with the element index.
    pub fn parse_many(raw: &JsonValue, config: &ValidationConfig) -> Result<Vec<E>, ValidationError> {
        let items = raw.as_array().ok_or_else(|| {
            ValidationError::single(&[], format!("expected array, received {}", received(raw)))
        })?;

        let mut errors = ValidationError::default();
        let mut out = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            if let Some(entity) = errors.absorb(Self::parse_at(item, config, &[index.to_string()])) {
                out.push(entity);
            }
        }
        errors.finish(out)
    }

    /// Inverse of [`EntitySchema::parse`].
    pub fn serialize(entity: &E) -> JsonValue {
        row_to_json(&entity.to_row())
    }

    fn parse_at(raw: &JsonValue, config: &ValidationConfig, path: &[String]) -> Result<E, ValidationError> {
        let map = expect_object(raw, path)?;
        let row = validate_object(E::table(), map, ObjectRules::mode(DataMode::Entity), config, path)?;
        E::from_row(&row).map_err(|mut err| {
            for issue in &mut err.issues {
                issue.path.splice(0..0, path.iter().cloned());
            }
            err
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::schema::entities::{
        Budget, CheckList, ConstructionSiteImage, Documents, IncomingLetter, OutgoingLetter, Project,
        Report, Team, UpcomingMilestone, User,
    };
    use crate::schema::enums::Status;

    fn harbor_heights() -> JsonValue {
        json!({
            "projectName": "Harbor Heights",
            "clientName": "Maria Garcia",
            "location": "Waterfront District",
            "startDate": "2020-05-15",
            "dueDate": "2022-08-30",
            "progress": 50
        })
    }

    #[test]
    fn test_parse_project() {
        let project = EntitySchema::<Project>::parse(&harbor_heights()).unwrap();
        assert_eq!(project.project_name, "Harbor Heights");
        assert_eq!(project.start_date, Utc.with_ymd_and_hms(2020, 5, 15, 0, 0, 0).unwrap());
        assert_eq!(project.progress, 50);
        assert_eq!(project.id, None);
    }

    #[test]
    fn test_wrong_type_reports_field_path() {
        let mut raw = harbor_heights();
        raw["progress"] = json!("fifty");
        let err = EntitySchema::<Project>::parse(&raw).unwrap_err();
        assert_eq!(err.issues.len(), 1);
        assert_eq!(err.issues[0].path, vec!["progress".to_string()]);
        assert_eq!(err.issues[0].message, "expected integer, received string");
    }

    #[test]
    fn test_collects_every_violation() {
        let raw = json!({
            "projectName": 7,
            "startDate": "someday",
            "progress": 1.5,
            "owner": "nobody"
        });
        let err = EntitySchema::<Project>::parse(&raw).unwrap_err();
        for path in [
            "projectName",
            "startDate",
            "progress",
            "owner",
            "clientName",
            "location",
            "dueDate",
        ] {
            assert!(err.has_path(&[path]), "missing issue for {path}: {err}");
        }
    }

    #[test]
    fn test_enum_membership() {
        let ok = json!({"title": "Topping out", "date": "2024-03-01", "status": "ontrack", "projectId": "p1"});
        let milestone = EntitySchema::<UpcomingMilestone>::parse(&ok).unwrap();
        assert_eq!(milestone.status, Status::OnTrack);

        let mut bad = ok.clone();
        bad["status"] = json!("done");
        let err = EntitySchema::<UpcomingMilestone>::parse(&bad).unwrap_err();
        assert!(err.has_path(&["status"]));
        assert!(err.issues[0].message.contains("ontrack, atrisk"));
    }

    #[test]
    fn test_null_and_non_object_are_rejected() {
        let err = EntitySchema::<Budget>::parse(&json!({"total": null, "spent": 1, "projectId": "p"}))
            .unwrap_err();
        assert_eq!(err.issues[0].message, "expected number, received null");

        let err = EntitySchema::<Budget>::parse(&json!([1, 2])).unwrap_err();
        assert!(err.has_path(&[]));
    }

    #[test]
    fn test_optional_fields_may_be_omitted() {
        let user = EntitySchema::<User>::parse(&json!({
            "name": "Ada",
            "email": "ada@example.com",
            "password": "hash"
        }))
        .unwrap();
        assert_eq!(user.created_at, None);
    }

    #[test]
    fn test_serialize_round_trip() {
        let raw = json!({
            "id": "c1",
            "task": "Inspect rebar",
            "status": "atrisk",
            "assignee": "Lee",
            "dueDate": "2024-02-01T09:30:00Z",
            "priority": "medium",
            "completed": true,
            "projectId": "p1"
        });
        let item = EntitySchema::<CheckList>::parse(&raw).unwrap();
        let again = EntitySchema::<CheckList>::parse(&EntitySchema::serialize(&item)).unwrap();
        assert_eq!(again, item);
    }

    /// Parse, serialize, parse again; both parses must agree.
    fn round_trip<E: Entity>(raw: JsonValue, config: &ValidationConfig) -> E {
        let parsed = EntitySchema::<E>::parse_with(&raw, config)
            .unwrap_or_else(|err| panic!("{} did not parse: {err}", E::table().name));
        let again = EntitySchema::<E>::parse_with(&EntitySchema::serialize(&parsed), config)
            .unwrap_or_else(|err| panic!("{} did not parse back: {err}", E::table().name));
        assert_eq!(again, parsed);
        parsed
    }

    #[test]
    fn test_every_entity_round_trips() {
        let config = ValidationConfig {
            date_offset_minutes: 120,
            ..Default::default()
        };

        let project: Project = round_trip(
            json!({
                "id": "p1",
                "projectName": "Harbor Heights",
                "clientName": "Maria Garcia",
                "location": "Waterfront District",
                "startDate": "2020-05-15",
                "dueDate": "2022-08-30T10:00:00+02:00",
                "progress": 50
            }),
            &config,
        );
        assert_eq!(project.start_date, Utc.with_ymd_and_hms(2020, 5, 14, 22, 0, 0).unwrap());
        assert_eq!(project.due_date, Utc.with_ymd_and_hms(2022, 8, 30, 8, 0, 0).unwrap());

        round_trip::<Budget>(json!({"total": 1250000.5, "spent": 0.25, "projectId": "p1"}), &config);
        round_trip::<Team>(
            json!({
                "projectManager": "Ana",
                "siteEngineer": "Ben",
                "architect": "Cleo",
                "safetyOfficer": "Dev",
                "foreman": "Eli",
                "totalWorkers": 48,
                "projectId": "p1"
            }),
            &config,
        );

        let milestone: UpcomingMilestone = round_trip(
            json!({"title": "Topping out", "date": 1589500800000_i64, "status": "atrisk", "projectId": "p1"}),
            &config,
        );
        assert_eq!(milestone.date, Utc.with_ymd_and_hms(2020, 5, 15, 0, 0, 0).unwrap());

        round_trip::<CheckList>(
            json!({
                "task": "Inspect rebar",
                "status": "ontrack",
                "assignee": "Lee",
                "dueDate": "2022-08-30T10:00:00",
                "priority": "high",
                "completed": false,
                "projectId": "p1"
            }),
            &config,
        );

        let document: Documents = round_trip(
            json!({
                "name": "Permit.pdf",
                "date": "2021-01-10T09:30:00.250Z",
                "downloadUrl": "https://files.example.com/permit.pdf",
                "projectId": "p1"
            }),
            &config,
        );
        assert_eq!(document.date.timestamp_subsec_millis(), 250);

        round_trip::<IncomingLetter>(
            json!({
                "sender": "City Council",
                "subject": "Inspection",
                "priority": "medium",
                "status": "unread",
                "createdAt": "2021-03-01T08:15:30.5-05:00",
                "updatedAt": 1614604530000_i64,
                "downloadUrl": "https://files.example.com/in.pdf",
                "projectId": "p1"
            }),
            &config,
        );
        round_trip::<OutgoingLetter>(
            json!({
                "recipient": "Supplier",
                "subject": "Order",
                "status": "draft",
                "priority": "low",
                "createdAt": "2021-03-02",
                "downloadUrl": "https://files.example.com/out.pdf",
                "projectId": "p1"
            }),
            &config,
        );
        round_trip::<Report>(
            json!({
                "publisher": "QA",
                "status": "approved",
                "uploadedAt": "2021-04-01T12:00:00Z",
                "modifiedAt": "2021-04-02 12:00:00.125",
                "version": "1.2",
                "downloadUrl": "https://files.example.com/r.pdf",
                "reportType": "quarterly",
                "projectId": "p1"
            }),
            &config,
        );
        round_trip::<ConstructionSiteImage>(
            json!({
                "title": "Slab",
                "imageSrc": "/img/slab.jpg",
                "location": "Block A",
                "date": "2021-05-05",
                "category": "foundation",
                "projectId": "p1"
            }),
            &config,
        );

        let user: User = round_trip(
            json!({"name": "Ada", "email": "ada@example.com", "password": "hash", "createdAt": 0}),
            &config,
        );
        assert_eq!(user.created_at, Some(Utc.timestamp_opt(0, 0).unwrap()));
        assert_eq!(user.updated_at, None);
        round_trip::<User>(json!({"name": "Bo", "email": "bo@example.com", "password": "hash"}), &config);
    }

    #[test]
    fn test_unrepresentable_dates_are_rejected_up_front() {
        let mut raw = harbor_heights();
        raw["startDate"] = json!(300_000_000_000_000_i64);
        let err = EntitySchema::<Project>::parse(&raw).unwrap_err();
        assert_eq!(err.issues.len(), 1);
        assert!(err.has_path(&["startDate"]));
        assert!(err.issues[0].message.contains("outside the supported years"));

        raw["startDate"] = json!("10000-01-01");
        assert!(EntitySchema::<Project>::parse(&raw).unwrap_err().has_path(&["startDate"]));
    }

    #[test]
    fn test_parse_many_prefixes_index() {
        let raw = json!([
            {"total": 10.0, "spent": 2.5, "projectId": "p1"},
            {"total": "lots", "spent": 2.5, "projectId": "p1"}
        ]);
        let err = EntitySchema::<Budget>::parse_many(&raw, &ValidationConfig::default()).unwrap_err();
        assert!(err.has_path(&["1", "total"]));
        assert_eq!(err.issues.len(), 1);
    }
}
