//! Storage port for patient records and its two implementations.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use schedule_core::{Patient, ScheduleError};

use crate::parse_patients_str;

/// Loads and saves whole patient records. Expansion never touches storage;
/// callers load, expand, and persist what they choose.
pub trait PatientStore {
    /// Fails with [`ScheduleError::NotFound`] for an unknown id.
    fn load(&self, patient_id: &str) -> Result<Patient, ScheduleError>;

    fn load_all(&self) -> Result<Vec<Patient>, ScheduleError>;

    /// Insert or replace the record with the same id.
    fn save(&mut self, patient: Patient) -> Result<(), ScheduleError>;

    /// Fails with [`ScheduleError::NotFound`] for an unknown id.
    fn delete(&mut self, patient_id: &str) -> Result<(), ScheduleError>;
}

/// Keeps everything in memory, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    patients: Vec<Patient>,
}

impl MemoryStore {
    pub fn new(patients: Vec<Patient>) -> Self {
        Self { patients }
    }
}

impl PatientStore for MemoryStore {
    fn load(&self, patient_id: &str) -> Result<Patient, ScheduleError> {
        self.patients
            .iter()
            .find(|patient| patient.id == patient_id)
            .cloned()
            .ok_or_else(|| ScheduleError::not_found("patient", patient_id))
    }

    fn load_all(&self) -> Result<Vec<Patient>, ScheduleError> {
        Ok(self.patients.clone())
    }

    fn save(&mut self, patient: Patient) -> Result<(), ScheduleError> {
        upsert(&mut self.patients, patient);
        Ok(())
    }

    fn delete(&mut self, patient_id: &str) -> Result<(), ScheduleError> {
        remove(&mut self.patients, patient_id)
    }
}

/// One JSON document holding every patient. A missing file reads as an
/// empty clinic.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_all(&self, patients: &[Patient]) -> Result<(), ScheduleError> {
        let json = serde_json::to_string_pretty(patients)
            .map_err(|err| ScheduleError::Storage(err.to_string()))?;
        fs::write(&self.path, json).map_err(|err| {
            ScheduleError::Storage(format!("cannot write {}: {err}", self.path.display()))
        })
    }
}

impl PatientStore for JsonFileStore {
    fn load(&self, patient_id: &str) -> Result<Patient, ScheduleError> {
        self.load_all()?
            .into_iter()
            .find(|patient| patient.id == patient_id)
            .ok_or_else(|| ScheduleError::not_found("patient", patient_id))
    }

    fn load_all(&self) -> Result<Vec<Patient>, ScheduleError> {
        match fs::read_to_string(&self.path) {
            Ok(data) => parse_patients_str(&data),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(ScheduleError::Storage(format!(
                "cannot read {}: {err}",
                self.path.display()
            ))),
        }
    }

    fn save(&mut self, patient: Patient) -> Result<(), ScheduleError> {
        let mut patients = self.load_all()?;
        upsert(&mut patients, patient);
        self.write_all(&patients)?;
        tracing::debug!(path = %self.path.display(), patients = patients.len(), "saved patient store");
        Ok(())
    }

    fn delete(&mut self, patient_id: &str) -> Result<(), ScheduleError> {
        let mut patients = self.load_all()?;
        remove(&mut patients, patient_id)?;
        self.write_all(&patients)?;
        tracing::debug!(path = %self.path.display(), patient_id, "removed patient from store");
        Ok(())
    }
}

fn upsert(patients: &mut Vec<Patient>, patient: Patient) {
    match patients.iter_mut().find(|existing| existing.id == patient.id) {
        Some(existing) => *existing = patient,
        None => patients.push(patient),
    }
}

fn remove(patients: &mut Vec<Patient>, patient_id: &str) -> Result<(), ScheduleError> {
    let position = patients
        .iter()
        .position(|patient| patient.id == patient_id)
        .ok_or_else(|| ScheduleError::not_found("patient", patient_id))?;
    patients.remove(position);
    Ok(())
}
