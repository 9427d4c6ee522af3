//! Library configuration management

use std::env;

use anyhow::{Context, Result, bail};
use chrono::{FixedOffset, Offset, Utc};

/// Largest accepted offset for date-only strings, in minutes (UTC+14:00).
const MAX_OFFSET_MINUTES: i32 = 14 * 60;

/// What the query assembler does with a cursor that has no well-defined position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CursorPolicy {
    /// Accept the query, record a warning and log it
    #[default]
    Warn,
    /// Reject the query with a validation error
    Reject,
}

impl CursorPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CursorPolicy::Warn => "warn",
            CursorPolicy::Reject => "reject",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warn" => Some(CursorPolicy::Warn),
            "reject" => Some(CursorPolicy::Reject),
            _ => None,
        }
    }
}

/// Settings consumed by schemas and the query assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationConfig {
    /// Offset applied to date-only strings (`2020-05-15` becomes midnight at this offset)
    pub date_offset_minutes: i32,

    /// Upper bound for `take`; larger values are clamped
    pub max_take: u64,

    /// Handling of cursors without a unique orderBy key
    pub cursor_policy: CursorPolicy,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            date_offset_minutes: 0,
            max_take: 100,
            cursor_policy: CursorPolicy::Warn,
        }
    }
}

impl ValidationConfig {
    /// The configured offset, UTC if the stored minutes are out of range.
    pub fn date_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.date_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }
}

/// Configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Default tracing filter directive when RUST_LOG is not set
    pub log_filter: String,

    /// Emit JSON log lines instead of the human readable format
    pub log_json: bool,

    /// Validation and assembly settings
    pub validation: ValidationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: "sitedocs=info".to_string(),
            log_json: false,
            validation: ValidationConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the process environment (and a `.env` file if present)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = ValidationConfig::default();

        let max_take = match lookup("SITEDOCS_MAX_TAKE") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .context("Invalid SITEDOCS_MAX_TAKE")?,
            None => defaults.max_take,
        };
        if max_take == 0 {
            bail!("SITEDOCS_MAX_TAKE must be greater than zero");
        }

        let cursor_policy = match lookup("SITEDOCS_CURSOR_POLICY") {
            Some(raw) => CursorPolicy::parse(&raw)
                .with_context(|| format!("Invalid SITEDOCS_CURSOR_POLICY: {raw}"))?,
            None => defaults.cursor_policy,
        };

        let date_offset_minutes = match lookup("SITEDOCS_DATE_OFFSET_MINUTES") {
            Some(raw) => raw
                .trim()
                .parse::<i32>()
                .context("Invalid SITEDOCS_DATE_OFFSET_MINUTES")?,
            None => defaults.date_offset_minutes,
        };
        if date_offset_minutes.abs() > MAX_OFFSET_MINUTES {
            bail!("SITEDOCS_DATE_OFFSET_MINUTES must be within ±{MAX_OFFSET_MINUTES}");
        }

        Ok(Self {
            log_filter: lookup("SITEDOCS_LOG").unwrap_or_else(|| "sitedocs=info".to_string()),

            log_json: lookup("SITEDOCS_LOG_JSON")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),

            validation: ValidationConfig {
                date_offset_minutes,
                max_take,
                cursor_policy,
            },
        })
    }

    pub fn validation(&self) -> ValidationConfig {
        self.validation
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_set() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.log_filter, "sitedocs=info");
        assert!(!config.log_json);
        assert_eq!(config.validation(), ValidationConfig::default());
    }

    #[test]
    fn test_reads_all_keys() {
        let config = Config::from_lookup(lookup_from(&[
            ("SITEDOCS_LOG", "sitedocs=debug"),
            ("SITEDOCS_LOG_JSON", "1"),
            ("SITEDOCS_MAX_TAKE", "250"),
            ("SITEDOCS_CURSOR_POLICY", "Reject"),
            ("SITEDOCS_DATE_OFFSET_MINUTES", "-300"),
        ]))
        .unwrap();

        assert_eq!(config.log_filter, "sitedocs=debug");
        assert!(config.log_json);
        assert_eq!(config.validation.max_take, 250);
        assert_eq!(config.validation.cursor_policy, CursorPolicy::Reject);
        assert_eq!(config.validation.date_offset().local_minus_utc(), -300 * 60);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Config::from_lookup(lookup_from(&[("SITEDOCS_MAX_TAKE", "lots")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("SITEDOCS_MAX_TAKE", "0")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("SITEDOCS_CURSOR_POLICY", "ignore")])).is_err());
        assert!(
            Config::from_lookup(lookup_from(&[("SITEDOCS_DATE_OFFSET_MINUTES", "9000")])).is_err()
        );
    }
}
