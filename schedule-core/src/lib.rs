//! Core scheduling logic: recurrence rules, occurrence expansion and the
//! merge of generated occurrences with stored appointments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod expand;
mod merge;
mod rule;

pub use expand::{expand, expand_with, occurrence_duration, Series};
pub use merge::{next_appointment, occurrences_for_patient, occurrences_for_patient_with};
pub use rule::{ByDay, Frequency, RecurrenceRule, RecurrenceRuleDraft, Weekday};

/// Default bound on emitted occurrences for rules without a `count`.
pub const DEFAULT_SAFETY_CAP: usize = 500;

/// Tunables for expansion and the derived queries built on top of it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct ExpansionConfig {
    /// Maximum occurrences emitted per call for rules that carry no `count`.
    /// Longer unbounded series are silently truncated at this many entries.
    pub safety_cap: usize,
    /// Consecutive periods without a single matching day after which a walk
    /// gives up. Periods that yield days reset the tally, so neither `count`
    /// nor late windows are limited by it.
    pub scan_limit: u32,
    /// How far ahead (months) `next_appointment` looks.
    pub next_appointment_horizon_months: u32,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            safety_cap: DEFAULT_SAFETY_CAP,
            scan_limit: 100_000,
            next_appointment_horizon_months: 3,
        }
    }
}

/// Back-reference from an appointment to the rule that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RuleRef {
    pub id: String,
}

impl RuleRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// One concrete scheduled event, either generated from a rule or stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: String,
    pub patient_id: String,
    pub start_date_time: DateTime<Utc>,
    pub end_date_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default)]
    pub recurrence_rule: Option<RuleRef>,
    /// Instant the occurrence had before any edit; key for exception matching.
    #[serde(default)]
    pub recurrence_id: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_exception: bool,
}

impl Appointment {
    /// A stored appointment that is not tied to any rule.
    pub fn one_off(
        id: impl Into<String>,
        patient_id: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            patient_id: patient_id.into(),
            start_date_time: start,
            end_date_time: end,
            note: None,
            recurrence_rule: None,
            recurrence_id: None,
            is_exception: false,
        }
    }

    /// A stored record replacing the occurrence of `rule_id` originally at
    /// `recurrence_id`.
    pub fn exception(
        id: impl Into<String>,
        patient_id: impl Into<String>,
        rule_id: impl Into<String>,
        recurrence_id: DateTime<Utc>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            patient_id: patient_id.into(),
            start_date_time: start,
            end_date_time: end,
            note: None,
            recurrence_rule: Some(RuleRef::new(rule_id)),
            recurrence_id: Some(recurrence_id),
            is_exception: true,
        }
    }

    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn rule_id(&self) -> Option<&str> {
        self.recurrence_rule.as_ref().map(|rule| rule.id.as_str())
    }
}

/// Patient record as far as scheduling is concerned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medical_history: Option<String>,
    #[serde(default)]
    pub appointments: Vec<Appointment>,
    #[serde(default)]
    pub recurrence_rules: Vec<RecurrenceRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Patient {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn rule(&self, rule_id: &str) -> Option<&RecurrenceRule> {
        self.recurrence_rules.iter().find(|rule| rule.id() == rule_id)
    }
}

/// Rejected rule or input data. The caller must correct the input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("unknown frequency `{0}`")]
    UnknownFrequency(String),
    #[error("unknown weekday code `{0}`")]
    UnknownWeekday(String),
    #[error("interval must be a positive integer, received {0}")]
    NonPositiveInterval(i64),
    #[error("count must be a positive integer, received {0}")]
    NonPositiveCount(i64),
    #[error("`{field}` must not be empty")]
    Empty { field: &'static str },
    #[error("`{field}` value {value} is outside {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },
    #[error("byMonth and byMonthDay never name an existing date")]
    UnsatisfiableFilters,
    #[error("invalid instant `{value}`: {reason}")]
    InvalidInstant { value: String, reason: String },
    #[error("{instant} is not an occurrence of rule `{rule_id}`")]
    NotAnOccurrence {
        rule_id: String,
        instant: DateTime<Utc>,
    },
    #[error("end {end} precedes start {start}")]
    EndBeforeStart {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// Errors surfaced by the scheduling crates.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{kind} `{id}` not found")]
    NotFound { kind: &'static str, id: String },
    #[error("could not read data: {0}")]
    Parse(String),
    #[error("storage failure: {0}")]
    Storage(String),
}

impl ScheduleError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}
