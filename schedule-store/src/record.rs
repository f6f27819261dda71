//! Wire records: camelCase keys and ISO-8601 instants as plain strings, the
//! shape clients send and the file store keeps on disk.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use schedule_core::{
    occurrence_duration, Appointment, ByDay, Frequency, Patient, RecurrenceRule,
    RecurrenceRuleDraft, RuleRef, ValidationError, Weekday,
};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PatientRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub medical_history: Option<String>,
    #[serde(default)]
    pub appointments: Vec<AppointmentRecord>,
    #[serde(default)]
    pub recurrence_rules: Vec<RuleRecord>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl TryFrom<PatientRecord> for Patient {
    type Error = ValidationError;

    fn try_from(record: PatientRecord) -> Result<Self, Self::Error> {
        let patient_id = record.id;
        let recurrence_rules = record
            .recurrence_rules
            .into_iter()
            .map(|rule| rule.into_rule(None, Some(&patient_id)))
            .collect::<Result<Vec<_>, _>>()?;
        let appointments = record
            .appointments
            .into_iter()
            .map(|appointment| appointment.into_appointment(None, Some(&patient_id)))
            .collect::<Result<Vec<_>, _>>()?;
        let created_at = record.created_at.as_deref().map(parse_instant).transpose()?;
        let updated_at = record.updated_at.as_deref().map(parse_instant).transpose()?;

        Ok(Patient {
            id: patient_id,
            name: record.name,
            phone: record.phone,
            email: record.email,
            address: record.address,
            medical_history: record.medical_history,
            appointments,
            recurrence_rules,
            created_at,
            updated_at,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ByDayRecord {
    #[serde(default)]
    pub ordinal: Option<i32>,
    pub day: String,
}

/// A recurrence rule as received. `id` and `patientId` may be absent on
/// creation requests; they are filled in by whoever stores the rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub patient_id: Option<String>,
    pub frequency: String,
    #[serde(default)]
    pub interval: Option<i64>,
    pub start_date_time: String,
    #[serde(default)]
    pub until: Option<String>,
    #[serde(default)]
    pub count: Option<i64>,
    #[serde(default)]
    pub by_day: Option<Vec<ByDayRecord>>,
    #[serde(default)]
    pub by_month_day: Option<Vec<i64>>,
    #[serde(default)]
    pub by_month: Option<Vec<i64>>,
    #[serde(default)]
    pub week_start: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

impl RuleRecord {
    /// Validate into a rule. `id` and `patient_id` take precedence over the
    /// record's own fields when given.
    pub fn into_rule(
        self,
        id: Option<&str>,
        patient_id: Option<&str>,
    ) -> Result<RecurrenceRule, ValidationError> {
        RecurrenceRule::new(self.into_draft(id, patient_id)?)
    }

    pub fn into_draft(
        self,
        id: Option<&str>,
        patient_id: Option<&str>,
    ) -> Result<RecurrenceRuleDraft, ValidationError> {
        let id = id
            .map(str::to_string)
            .or(self.id)
            .ok_or(ValidationError::Empty { field: "id" })?;
        let patient_id = patient_id
            .map(str::to_string)
            .or(self.patient_id)
            .ok_or(ValidationError::Empty { field: "patientId" })?;

        let frequency: Frequency = self.frequency.parse()?;
        let mut draft =
            RecurrenceRuleDraft::new(id, patient_id, frequency, parse_instant(&self.start_date_time)?);

        if let Some(interval) = self.interval {
            draft.interval = positive(interval, ValidationError::NonPositiveInterval)?;
        }
        if let Some(count) = self.count {
            draft.count = Some(positive(count, ValidationError::NonPositiveCount)?);
        }
        if let Some(until) = self.until.as_deref() {
            draft.until = Some(parse_instant(until)?);
        }
        if let Some(days) = self.by_day {
            draft.by_day = Some(
                days.into_iter()
                    .map(|entry| {
                        Ok(ByDay {
                            ordinal: entry.ordinal,
                            day: entry.day.parse()?,
                        })
                    })
                    .collect::<Result<Vec<_>, ValidationError>>()?,
            );
        }
        if let Some(days) = self.by_month_day {
            draft.by_month_day = Some(bounded("byMonthDay", &days, 1, 31)?);
        }
        if let Some(months) = self.by_month {
            draft.by_month = Some(bounded("byMonth", &months, 1, 12)?);
        }
        if let Some(week_start) = self.week_start.as_deref() {
            draft.week_start = week_start.parse::<Weekday>()?;
        }
        draft.note = self.note;
        Ok(draft)
    }
}

/// An appointment as received: a one-off, or an exception tied to a rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub patient_id: Option<String>,
    pub start_date_time: String,
    #[serde(default)]
    pub end_date_time: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    /// Either the full rule or a bare `{ "id": ... }` reference.
    #[serde(default)]
    pub recurrence_rule: Option<Value>,
    #[serde(default)]
    pub recurrence_id: Option<String>,
    #[serde(default)]
    pub is_exception: bool,
}

impl AppointmentRecord {
    /// Validate into an appointment. A missing end defaults to the standard
    /// occurrence duration.
    pub fn into_appointment(
        self,
        id: Option<&str>,
        patient_id: Option<&str>,
    ) -> Result<Appointment, ValidationError> {
        let id = id
            .map(str::to_string)
            .or(self.id)
            .ok_or(ValidationError::Empty { field: "id" })?;
        let patient_id = patient_id
            .map(str::to_string)
            .or(self.patient_id)
            .ok_or(ValidationError::Empty { field: "patientId" })?;

        let start = parse_instant(&self.start_date_time)?;
        let end = match self.end_date_time.as_deref() {
            Some(end) => parse_instant(end)?,
            None => start + occurrence_duration(),
        };
        if end < start {
            return Err(ValidationError::EndBeforeStart { start, end });
        }

        let recurrence_rule = self
            .recurrence_rule
            .as_ref()
            .and_then(|value| value.get("id"))
            .and_then(Value::as_str)
            .map(RuleRef::new);
        let recurrence_id = self.recurrence_id.as_deref().map(parse_instant).transpose()?;

        if self.is_exception && recurrence_id.is_none() {
            return Err(ValidationError::Empty {
                field: "recurrenceId",
            });
        }

        Ok(Appointment {
            id,
            patient_id,
            start_date_time: start,
            end_date_time: end,
            note: self.note,
            recurrence_rule,
            recurrence_id,
            is_exception: self.is_exception,
        })
    }
}

/// Parse an ISO-8601 instant. Offsets are honoured; date-only and naive
/// values are read as UTC.
pub fn parse_instant(value: &str) -> Result<DateTime<Utc>, ValidationError> {
    let trimmed = value.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(instant.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date.and_time(chrono::NaiveTime::MIN).and_utc());
    }
    Err(ValidationError::InvalidInstant {
        value: value.to_string(),
        reason: "expected an ISO-8601 date or date-time".to_string(),
    })
}

fn positive(value: i64, error: fn(i64) -> ValidationError) -> Result<u32, ValidationError> {
    if value <= 0 {
        return Err(error(value));
    }
    u32::try_from(value).map_err(|_| error(value))
}

fn bounded(field: &'static str, values: &[i64], min: i64, max: i64) -> Result<Vec<u32>, ValidationError> {
    values
        .iter()
        .map(|&value| match u32::try_from(value) {
            Ok(small) if (min..=max).contains(&value) => Ok(small),
            _ => Err(ValidationError::OutOfRange {
                field,
                value,
                min,
                max,
            }),
        })
        .collect()
}
