//! Merge of generated occurrences with a patient's stored appointments.

use std::collections::HashSet;

use chrono::{DateTime, Months, Utc};

use crate::{expand_with, Appointment, ExpansionConfig, Patient};

/// All appointments of `patient` in the inclusive window, with the default
/// configuration.
pub fn occurrences_for_patient(
    patient: &Patient,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Vec<Appointment> {
    occurrences_for_patient_with(patient, window_start, window_end, &ExpansionConfig::default())
}

/// All appointments of `patient` in the inclusive window: stored one-offs,
/// occurrences of every rule, and stored exceptions replacing the occurrence
/// they were created for. Sorted by start, ties by id.
///
/// An exception is returned when its own start lies in the window or when it
/// replaced an occurrence generated for this window.
pub fn occurrences_for_patient_with(
    patient: &Patient,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    config: &ExpansionConfig,
) -> Vec<Appointment> {
    if window_end < window_start {
        return Vec::new();
    }
    let in_window = |instant: DateTime<Utc>| instant >= window_start && instant <= window_end;

    let (exceptions, one_offs): (Vec<&Appointment>, Vec<&Appointment>) = patient
        .appointments
        .iter()
        .partition(|appointment| appointment.is_exception);

    let mut merged: Vec<Appointment> = one_offs
        .into_iter()
        .filter(|appointment| in_window(appointment.start_date_time))
        .cloned()
        .collect();

    let mut replacing = HashSet::new();
    for rule in &patient.recurrence_rules {
        for occurrence in expand_with(rule, window_start, window_end, config) {
            let matching: Vec<usize> = exceptions
                .iter()
                .enumerate()
                .filter(|(_, exception)| overrides(exception, rule.id(), occurrence.recurrence_id))
                .map(|(position, _)| position)
                .collect();

            if matching.is_empty() {
                merged.push(occurrence);
            } else {
                replacing.extend(matching);
            }
        }
    }

    merged.extend(
        exceptions
            .iter()
            .enumerate()
            .filter(|(position, exception)| {
                replacing.contains(position) || in_window(exception.start_date_time)
            })
            .map(|(_, exception)| (*exception).clone()),
    );

    merged.sort_by(|a, b| {
        a.start_date_time
            .cmp(&b.start_date_time)
            .then_with(|| a.id.cmp(&b.id))
    });
    merged
}

/// An exception overrides the occurrence with the same original instant. When
/// the exception names its rule, the rule must match too.
fn overrides(exception: &Appointment, rule_id: &str, recurrence_id: Option<DateTime<Utc>>) -> bool {
    exception.recurrence_id.is_some()
        && exception.recurrence_id == recurrence_id
        && exception.rule_id().map_or(true, |id| id == rule_id)
}

/// Earliest appointment of `patient` starting at or after `now`, looking
/// `config.next_appointment_horizon_months` ahead.
pub fn next_appointment(
    patient: &Patient,
    now: DateTime<Utc>,
    config: &ExpansionConfig,
) -> Option<Appointment> {
    let horizon = now
        .checked_add_months(Months::new(config.next_appointment_horizon_months))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    // An exception moved before `now` still comes back with the occurrence it
    // replaced.
    occurrences_for_patient_with(patient, now, horizon, config)
        .into_iter()
        .find(|appointment| appointment.start_date_time >= now)
}
