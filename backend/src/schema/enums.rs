//! Enum registry
//!
//! Closed sets of valid string values for domain concepts. Each set is a Rust
//! enum generated by `closed_enum!`; the registry indexes them by name so raw
//! input can be checked against a set without knowing its Rust type.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use sitedocs_macros::closed_enum;

use crate::error::ValidationError;

/// Implemented by every `closed_enum!` type.
pub trait ClosedEnum: Copy + Eq + Sized + 'static {
    /// Registry name (e.g. "Priority")
    const NAME: &'static str;
    /// Wire values in declaration order
    const VALUES: &'static [&'static str];

    fn as_str(&self) -> &'static str;

    fn parse(value: &str) -> Option<Self>;
}

closed_enum! {
    /// Health of a milestone or checklist task.
    pub enum Status {
        OnTrack,
        AtRisk,
    }
}

closed_enum! {
    pub enum Priority {
        High,
        Medium,
        Low,
    }
}

closed_enum! {
    /// Read state of an incoming letter.
    pub enum IncomingLetterStatus {
        Read,
        Unread,
    }
}

closed_enum! {
    /// Dispatch state of an outgoing letter.
    pub enum OutgoingLetterStatus {
        Sent,
        Draft,
    }
}

closed_enum! {
    pub enum ReportStatus {
        Approved,
        Rejected,
    }
}

closed_enum! {
    /// Reporting cadence.
    pub enum ReportType {
        Daily,
        Weekly,
        Monthly,
        Annually,
        Quarterly,
    }
}

closed_enum! {
    /// Site photo category.
    pub enum ImageCategory {
        Foundation,
        Structural,
        Electrical,
        Plumbing,
        Exterior,
        Aerial,
    }
}

/// Name and values of one registry entry, usable in const field tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumDef {
    pub name: &'static str,
    pub values: &'static [&'static str],
}

impl EnumDef {
    pub const fn of<E: ClosedEnum>() -> Self {
        Self {
            name: E::NAME,
            values: E::VALUES,
        }
    }

    pub fn contains(&self, value: &str) -> bool {
        self.values.contains(&value)
    }

    /// Return the registry's own `&'static str` for `value`.
    pub fn canonical(&self, value: &str) -> Option<&'static str> {
        self.values.iter().copied().find(|v| *v == value)
    }
}

static REGISTRY: &[EnumDef] = &[
    EnumDef::of::<Status>(),
    EnumDef::of::<Priority>(),
    EnumDef::of::<IncomingLetterStatus>(),
    EnumDef::of::<OutgoingLetterStatus>(),
    EnumDef::of::<ReportStatus>(),
    EnumDef::of::<ReportType>(),
    EnumDef::of::<ImageCategory>(),
];

static INDEX: Lazy<HashMap<&'static str, &'static EnumDef>> =
    Lazy::new(|| REGISTRY.iter().map(|def| (def.name, def)).collect());

/// Registered enum names in registration order.
pub fn names() -> impl Iterator<Item = &'static str> {
    REGISTRY.iter().map(|def| def.name)
}

pub fn lookup(name: &str) -> Option<&'static EnumDef> {
    INDEX.get(name).copied()
}

/// The closed value list of a registered enum.
pub fn values(name: &str) -> Option<&'static [&'static str]> {
    lookup(name).map(|def| def.values)
}

/// Check `value` against the enum registered as `name`.
pub fn validate(name: &str, value: &str) -> Result<&'static str, ValidationError> {
    let def = lookup(name)
        .ok_or_else(|| ValidationError::single(&[], format!("unknown enum '{name}'")))?;
    def.canonical(value)
        .ok_or_else(|| invalid_enum_value(def.name, def.values, value, &[]))
}

/// The error reported for a value outside an enum's closed set.
pub fn invalid_enum_value(
    enum_name: &str,
    values: &[&str],
    value: &str,
    path: &[String],
) -> ValidationError {
    ValidationError::single(path, enum_message(enum_name, values, value))
}

pub(crate) fn enum_message(enum_name: &str, values: &[&str], value: &str) -> String {
    format!(
        "invalid {enum_name} value '{value}', expected one of: {}",
        values.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_values() {
        assert_eq!(Status::VALUES, &["ontrack", "atrisk"]);
        assert_eq!(Priority::High.as_str(), "high");
        assert_eq!(ReportType::parse("quarterly"), Some(ReportType::Quarterly));
        assert_eq!(ReportType::parse("Quarterly"), None);
        assert_eq!(ImageCategory::ALL.len(), 6);
    }

    #[test]
    fn test_serde_uses_wire_values() {
        let json = serde_json::to_string(&OutgoingLetterStatus::Draft).unwrap();
        assert_eq!(json, "\"draft\"");
        let parsed: IncomingLetterStatus = serde_json::from_str("\"unread\"").unwrap();
        assert_eq!(parsed, IncomingLetterStatus::Unread);
        assert!(serde_json::from_str::<ReportStatus>("\"pending\"").is_err());
    }

    #[test]
    fn test_from_str_reports_allowed_values() {
        let err = "done".parse::<Status>().unwrap_err();
        assert_eq!(
            err.issues[0].message,
            "invalid Status value 'done', expected one of: ontrack, atrisk"
        );
    }

    #[test]
    fn test_registry_lookup() {
        assert_eq!(names().count(), 7);
        assert_eq!(values("Priority"), Some(&["high", "medium", "low"][..]));
        assert_eq!(validate("Status", "ontrack").unwrap(), "ontrack");
        assert!(validate("Status", "done").is_err());
        assert!(validate("Mood", "happy").is_err());
    }
}
