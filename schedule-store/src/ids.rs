//! Identifier generation for newly stored records.

use schedule_core::Patient;
use uuid::Uuid;

/// Kind of record an identifier is requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    Patient,
    Rule,
    Appointment,
}

/// Hands out unique identifiers. Injected into whatever creates records.
pub trait IdGenerator {
    fn next_id(&mut self, kind: IdKind) -> String;
}

/// Readable counters: patients `1`, `2`, …, rules `rule1`, …, appointments
/// `app1`, …. Counters live in the instance.
#[derive(Debug, Clone, Default)]
pub struct SequentialIds {
    patients: u64,
    rules: u64,
    appointments: u64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters positioned after the highest id already used by `patients`.
    pub fn after(patients: &[Patient]) -> Self {
        let mut ids = Self::new();
        for patient in patients {
            ids.patients = ids.patients.max(numeric_suffix(&patient.id, "").unwrap_or(0));
            for rule in &patient.recurrence_rules {
                ids.rules = ids.rules.max(numeric_suffix(rule.id(), "rule").unwrap_or(0));
            }
            for appointment in &patient.appointments {
                ids.appointments = ids
                    .appointments
                    .max(numeric_suffix(&appointment.id, "app").unwrap_or(0));
            }
        }
        ids
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&mut self, kind: IdKind) -> String {
        match kind {
            IdKind::Patient => {
                self.patients += 1;
                self.patients.to_string()
            }
            IdKind::Rule => {
                self.rules += 1;
                format!("rule{}", self.rules)
            }
            IdKind::Appointment => {
                self.appointments += 1;
                format!("app{}", self.appointments)
            }
        }
    }
}

fn numeric_suffix(id: &str, prefix: &str) -> Option<u64> {
    id.strip_prefix(prefix)?.parse().ok()
}

/// Random v4 UUIDs, for stores shared between several writers.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn next_id(&mut self, _kind: IdKind) -> String {
        Uuid::new_v4().to_string()
    }
}
