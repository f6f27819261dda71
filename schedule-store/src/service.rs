//! Query and mutation handlers over a [`PatientStore`]: the operations the
//! clinic front end calls, with ISO-8601 strings at the boundary.

use chrono::{DateTime, Utc};
use schedule_core::{
    expand_with, next_appointment, occurrence_duration, occurrences_for_patient_with, Appointment,
    ExpansionConfig, Patient, RecurrenceRule, RuleRef, ScheduleError, ValidationError,
};
use serde::{Deserialize, Serialize};

use crate::ids::{IdGenerator, IdKind};
use crate::record::{parse_instant, RuleRecord};
use crate::store::PatientStore;

/// Input for a new patient. Blank contact fields are stored as absent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPatient {
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub medical_history: Option<String>,
}

impl NewPatient {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Partial update of a patient's details. Absent fields are left alone; a
/// blank contact field clears the stored value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub medical_history: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PatientSummary {
    pub id: String,
    pub name: String,
}

/// An appointment together with whom it is for, as the calendar shows it.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CalendarEntry {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub patient: PatientSummary,
}

/// Input for a stored appointment not tied to any rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOneTimeAppointment {
    pub patient_id: String,
    pub start_date_time: String,
    #[serde(default)]
    pub end_date_time: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Input for editing one occurrence of a rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewException {
    pub rule_id: String,
    /// The occurrence's unmodified start.
    pub original_start_date_time: String,
    #[serde(default)]
    pub new_start_date_time: Option<String>,
    #[serde(default)]
    pub new_end_date_time: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

pub struct ScheduleService<S, G> {
    store: S,
    ids: G,
    config: ExpansionConfig,
}

impl<S: PatientStore, G: IdGenerator> ScheduleService<S, G> {
    pub fn new(store: S, ids: G) -> Self {
        Self::with_config(store, ids, ExpansionConfig::default())
    }

    pub fn with_config(store: S, ids: G, config: ExpansionConfig) -> Self {
        Self { store, ids, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn all_patients(&self) -> Result<Vec<Patient>, ScheduleError> {
        self.store.load_all()
    }

    pub fn patient(&self, patient_id: &str) -> Result<Patient, ScheduleError> {
        self.store.load(patient_id)
    }

    /// Merged appointments of one patient in `[from, to]`.
    pub fn appointments_by_patient(
        &self,
        patient_id: &str,
        from: &str,
        to: &str,
    ) -> Result<Vec<Appointment>, ScheduleError> {
        let (from, to) = parse_window(from, to)?;
        let patient = self.store.load(patient_id)?;
        Ok(occurrences_for_patient_with(&patient, from, to, &self.config))
    }

    /// Merged appointments of every patient in `[from, to]`, each tagged
    /// with its patient, for calendar views.
    pub fn appointments_in_range(&self, from: &str, to: &str) -> Result<Vec<CalendarEntry>, ScheduleError> {
        let (from, to) = parse_window(from, to)?;
        let mut entries: Vec<CalendarEntry> = self
            .store
            .load_all()?
            .iter()
            .flat_map(|patient| {
                occurrences_for_patient_with(patient, from, to, &self.config)
                    .into_iter()
                    .map(|appointment| CalendarEntry {
                        appointment,
                        patient: PatientSummary {
                            id: patient.id.clone(),
                            name: patient.name.clone(),
                        },
                    })
            })
            .collect();
        entries.sort_by(|a, b| {
            a.appointment
                .start_date_time
                .cmp(&b.appointment.start_date_time)
                .then_with(|| a.appointment.id.cmp(&b.appointment.id))
        });
        Ok(entries)
    }

    pub fn next_appointment(
        &self,
        patient_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Appointment>, ScheduleError> {
        let patient = self.store.load(patient_id)?;
        Ok(next_appointment(&patient, now, &self.config))
    }

    pub fn create_patient(&mut self, input: NewPatient) -> Result<Patient, ScheduleError> {
        let name = required_name(&input.name)?;
        let now = Utc::now();
        let patient = Patient {
            phone: non_blank(input.phone),
            email: non_blank(input.email),
            address: non_blank(input.address),
            medical_history: non_blank(input.medical_history),
            created_at: Some(now),
            updated_at: Some(now),
            ..Patient::new(self.ids.next_id(IdKind::Patient), name)
        };
        self.store.save(patient.clone())?;
        tracing::info!(patient_id = %patient.id, "created patient");
        Ok(patient)
    }

    pub fn update_patient(&mut self, patient_id: &str, patch: PatientPatch) -> Result<Patient, ScheduleError> {
        let mut patient = self.store.load(patient_id)?;
        if let Some(name) = patch.name.as_deref() {
            patient.name = required_name(name)?;
        }
        if let Some(phone) = patch.phone {
            patient.phone = non_blank(Some(phone));
        }
        if let Some(email) = patch.email {
            patient.email = non_blank(Some(email));
        }
        if let Some(address) = patch.address {
            patient.address = non_blank(Some(address));
        }
        if let Some(history) = patch.medical_history {
            patient.medical_history = non_blank(Some(history));
        }
        patient.updated_at = Some(Utc::now());
        self.store.save(patient.clone())?;

        tracing::info!(patient_id, "updated patient");
        Ok(patient)
    }

    /// Remove a patient with all of their rules and appointments.
    pub fn delete_patient(&mut self, patient_id: &str) -> Result<(), ScheduleError> {
        self.store.delete(patient_id)?;
        tracing::info!(patient_id, "deleted patient");
        Ok(())
    }

    /// Store a new rule under the patient named by `input.patient_id`.
    pub fn create_recurrence_rule(&mut self, input: RuleRecord) -> Result<RecurrenceRule, ScheduleError> {
        let patient_id = input
            .patient_id
            .clone()
            .ok_or(ValidationError::Empty { field: "patientId" })?;
        let mut patient = self.store.load(&patient_id)?;

        let rule_id = self.ids.next_id(IdKind::Rule);
        let rule = input.into_rule(Some(&rule_id), Some(&patient_id))?;
        patient.recurrence_rules.push(rule.clone());
        self.store.save(patient)?;

        tracing::info!(rule_id = %rule.id(), patient_id = %patient_id, rrule = %rule, "created recurrence rule");
        Ok(rule)
    }

    /// Replace the definition of an existing rule, keeping its id and owner.
    pub fn update_recurrence_rule(
        &mut self,
        rule_id: &str,
        input: RuleRecord,
    ) -> Result<RecurrenceRule, ScheduleError> {
        let mut patient = self.owner_of_rule(rule_id)?;
        let rule = input.into_rule(Some(rule_id), Some(&patient.id))?;

        if let Some(existing) = patient
            .recurrence_rules
            .iter_mut()
            .find(|existing| existing.id() == rule_id)
        {
            *existing = rule.clone();
        }
        self.store.save(patient)?;

        tracing::info!(rule_id, rrule = %rule, "updated recurrence rule");
        Ok(rule)
    }

    /// Remove a rule. Exceptions created for it stay as standalone records.
    pub fn delete_recurrence_rule(&mut self, rule_id: &str) -> Result<(), ScheduleError> {
        let mut patient = self.owner_of_rule(rule_id)?;
        patient.recurrence_rules.retain(|rule| rule.id() != rule_id);
        self.store.save(patient)?;
        tracing::info!(rule_id, "deleted recurrence rule");
        Ok(())
    }

    pub fn create_one_time_appointment(
        &mut self,
        input: NewOneTimeAppointment,
    ) -> Result<Appointment, ScheduleError> {
        let mut patient = self.store.load(&input.patient_id)?;
        let start = parse_instant(&input.start_date_time)?;
        let end = resolve_end(start, input.end_date_time.as_deref())?;

        let mut appointment =
            Appointment::one_off(self.ids.next_id(IdKind::Appointment), &patient.id, start, end);
        appointment.note = input.note;
        patient.appointments.push(appointment.clone());
        self.store.save(patient)?;

        tracing::info!(appointment_id = %appointment.id, "created one-time appointment");
        Ok(appointment)
    }

    /// Store an edit of one occurrence. A second edit of the same occurrence
    /// replaces the first one.
    pub fn create_exception_for_rule(&mut self, input: NewException) -> Result<Appointment, ScheduleError> {
        let mut patient = self.owner_of_rule(&input.rule_id)?;
        let original = parse_instant(&input.original_start_date_time)?;

        let is_occurrence = patient
            .rule(&input.rule_id)
            .map(|rule| !expand_with(rule, original, original, &self.config).is_empty())
            .unwrap_or(false);
        if !is_occurrence {
            return Err(ValidationError::NotAnOccurrence {
                rule_id: input.rule_id,
                instant: original,
            }
            .into());
        }

        let start = match input.new_start_date_time.as_deref() {
            Some(start) => parse_instant(start)?,
            None => original,
        };
        let end = resolve_end(start, input.new_end_date_time.as_deref())?;

        let previous = patient.appointments.iter().position(|appointment| {
            appointment.is_exception
                && appointment.recurrence_id == Some(original)
                && appointment.rule_id() == Some(input.rule_id.as_str())
        });
        let id = match previous {
            Some(position) => patient.appointments.remove(position).id,
            None => self.ids.next_id(IdKind::Appointment),
        };

        let exception = Appointment {
            id,
            patient_id: patient.id.clone(),
            start_date_time: start,
            end_date_time: end,
            note: input.note,
            recurrence_rule: Some(RuleRef::new(&input.rule_id)),
            recurrence_id: Some(original),
            is_exception: true,
        };
        patient.appointments.push(exception.clone());
        self.store.save(patient)?;

        tracing::info!(
            appointment_id = %exception.id,
            rule_id = %input.rule_id,
            recurrence_id = %original,
            "stored exception"
        );
        Ok(exception)
    }

    /// Delete a stored one-off or exception.
    pub fn delete_appointment(&mut self, appointment_id: &str) -> Result<(), ScheduleError> {
        let mut patient = self
            .store
            .load_all()?
            .into_iter()
            .find(|patient| patient.appointments.iter().any(|a| a.id == appointment_id))
            .ok_or_else(|| ScheduleError::not_found("appointment", appointment_id))?;
        patient.appointments.retain(|a| a.id != appointment_id);
        self.store.save(patient)?;
        tracing::info!(appointment_id, "deleted appointment");
        Ok(())
    }

    fn owner_of_rule(&self, rule_id: &str) -> Result<Patient, ScheduleError> {
        self.store
            .load_all()?
            .into_iter()
            .find(|patient| patient.rule(rule_id).is_some())
            .ok_or_else(|| ScheduleError::not_found("rule", rule_id))
    }
}

/// Parse a `[from, to]` query window. A reversed window is not an error; it
/// simply matches nothing.
pub fn parse_window(from: &str, to: &str) -> Result<(DateTime<Utc>, DateTime<Utc>), ValidationError> {
    Ok((parse_instant(from)?, parse_instant(to)?))
}

fn required_name(name: &str) -> Result<String, ValidationError> {
    match name.trim() {
        "" => Err(ValidationError::Empty { field: "name" }),
        trimmed => Ok(trimmed.to_string()),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn resolve_end(start: DateTime<Utc>, end: Option<&str>) -> Result<DateTime<Utc>, ValidationError> {
    let end = match end {
        Some(end) => parse_instant(end)?,
        None => start + occurrence_duration(),
    };
    if end < start {
        return Err(ValidationError::EndBeforeStart { start, end });
    }
    Ok(end)
}
