//! Storage, wire parsing and request handlers around `schedule-core`.

use schedule_core::{Patient, RecurrenceRule, ScheduleError};
use serde::Deserialize;
use serde_json::Value;

mod ids;
mod record;
mod service;
mod store;

pub use ids::{IdGenerator, IdKind, SequentialIds, UuidIds};
pub use record::{parse_instant, AppointmentRecord, ByDayRecord, PatientRecord, RuleRecord};
pub use service::{
    parse_window, CalendarEntry, NewException, NewOneTimeAppointment, NewPatient, PatientPatch,
    PatientSummary, ScheduleService,
};
pub use store::{JsonFileStore, MemoryStore, PatientStore};

/// Parse a patient document from a JSON string.
pub fn parse_patients_str(json: &str) -> Result<Vec<Patient>, ScheduleError> {
    let value: Value =
        serde_json::from_str(json).map_err(|err| ScheduleError::Parse(err.to_string()))?;
    parse_patients_value(&value)
}

/// Parse a patient document: either a bare array of patients or an object
/// with a `patients` array.
pub fn parse_patients_value(document: &Value) -> Result<Vec<Patient>, ScheduleError> {
    let entries = match document {
        Value::Array(entries) => entries,
        Value::Object(map) => map
            .get("patients")
            .and_then(Value::as_array)
            .ok_or_else(|| ScheduleError::Parse("expected a `patients` array".to_string()))?,
        other => {
            return Err(ScheduleError::Parse(format!(
                "expected an array or object, received {}",
                json_kind(other)
            )))
        }
    };

    entries.iter().map(parse_patient_value).collect()
}

/// Parse and validate one patient record.
pub fn parse_patient_value(value: &Value) -> Result<Patient, ScheduleError> {
    let record = PatientRecord::deserialize(value).map_err(|err| {
        let id = value.get("id").and_then(Value::as_str).unwrap_or("?");
        ScheduleError::Parse(format!("patient `{id}`: {err}"))
    })?;
    Ok(Patient::try_from(record)?)
}

/// Parse and validate one recurrence rule. The rule must carry its own `id`
/// and `patientId`.
pub fn parse_rule_value(value: &Value) -> Result<RecurrenceRule, ScheduleError> {
    let record =
        RuleRecord::deserialize(value).map_err(|err| ScheduleError::Parse(err.to_string()))?;
    Ok(record.into_rule(None, None)?)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
