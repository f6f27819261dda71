use chrono::{TimeZone, Utc};
use schedule_core::{ScheduleError, ValidationError};
use schedule_store::{
    parse_patients_str, MemoryStore, NewException, NewOneTimeAppointment, NewPatient,
    PatientPatch, PatientStore, RuleRecord, ScheduleService, SequentialIds,
};
use serde_json::json;

fn fixture_path(name: &str) -> String {
    format!("{}/tests/data/{name}", env!("CARGO_MANIFEST_DIR"))
}

fn clinic() -> ScheduleService<MemoryStore, SequentialIds> {
    let data = std::fs::read_to_string(fixture_path("clinic_patients.json"))
        .expect("could not read the patient fixture");
    let patients = parse_patients_str(&data).expect("fixture does not parse");
    let ids = SequentialIds::after(&patients);
    ScheduleService::new(MemoryStore::new(patients), ids)
}

fn rule_record(value: serde_json::Value) -> RuleRecord {
    serde_json::from_value(value).expect("rule record does not deserialize")
}

fn ids_of(appointments: &[schedule_core::Appointment]) -> Vec<&str> {
    appointments.iter().map(|a| a.id.as_str()).collect()
}

#[test]
fn unknown_patient_is_not_found() {
    let service = clinic();
    let err = service
        .appointments_by_patient("99", "2026-01-01", "2026-02-01")
        .unwrap_err();
    assert!(matches!(err, ScheduleError::NotFound { kind: "patient", .. }));
}

#[test]
fn invalid_window_is_a_validation_error() {
    let service = clinic();
    let err = service
        .appointments_by_patient("1", "next tuesday", "2026-02-01")
        .unwrap_err();
    assert!(matches!(
        err,
        ScheduleError::Validation(ValidationError::InvalidInstant { .. })
    ));
}

#[test]
fn reversed_window_returns_nothing() {
    let service = clinic();
    let appointments = service
        .appointments_by_patient("1", "2026-02-01", "2026-01-01")
        .unwrap();
    assert!(appointments.is_empty());
}

#[test]
fn created_rule_is_expanded_for_its_patient() {
    let mut service = clinic();
    let rule = service
        .create_recurrence_rule(rule_record(json!({
            "patientId": "3",
            "frequency": "WEEKLY",
            "startDateTime": "2026-02-02T09:00:00Z",
            "byDay": [{ "day": "MO" }, { "day": "TH" }],
            "count": 3,
            "note": "Post-op follow up"
        })))
        .unwrap();
    assert_eq!(rule.id(), "rule5");
    assert_eq!(rule.patient_id(), "3");

    let appointments = service
        .appointments_by_patient("3", "2026-02-01T00:00:00Z", "2026-03-01T00:00:00Z")
        .unwrap();
    assert_eq!(ids_of(&appointments), ["gen-rule5-0", "gen-rule5-1", "gen-rule5-2"]);
    assert_eq!(
        appointments[2].start_date_time,
        Utc.with_ymd_and_hms(2026, 2, 9, 9, 0, 0).unwrap()
    );
}

#[test]
fn rule_without_patient_is_rejected() {
    let mut service = clinic();
    let err = service
        .create_recurrence_rule(rule_record(json!({
            "frequency": "DAILY",
            "startDateTime": "2026-02-02T09:00:00Z"
        })))
        .unwrap_err();
    assert!(matches!(
        err,
        ScheduleError::Validation(ValidationError::Empty { field: "patientId" })
    ));
}

#[test]
fn invalid_rule_is_rejected_before_storing() {
    let mut service = clinic();
    let err = service
        .create_recurrence_rule(rule_record(json!({
            "patientId": "3",
            "frequency": "HOURLY",
            "startDateTime": "2026-02-02T09:00:00Z"
        })))
        .unwrap_err();
    assert!(matches!(
        err,
        ScheduleError::Validation(ValidationError::UnknownFrequency(_))
    ));
    assert_eq!(service.patient("3").unwrap().recurrence_rules.len(), 1);
}

#[test]
fn updated_rule_keeps_id_and_owner() {
    let mut service = clinic();
    let rule = service
        .update_recurrence_rule(
            "rule2",
            rule_record(json!({
                "patientId": "1",
                "frequency": "DAILY",
                "interval": 2,
                "startDateTime": "2025-12-23T02:00:00Z",
                "count": 2
            })),
        )
        .unwrap();
    assert_eq!(rule.id(), "rule2");
    assert_eq!(rule.patient_id(), "2");

    let appointments = service
        .appointments_by_patient("2", "2025-12-20T00:00:00Z", "2026-01-10T00:00:00Z")
        .unwrap();
    assert_eq!(ids_of(&appointments), ["gen-rule2-0", "gen-rule2-1", "app1"]);
}

#[test]
fn exception_replaces_the_generated_occurrence() {
    let mut service = clinic();
    let exception = service
        .create_exception_for_rule(NewException {
            rule_id: "rule1".to_string(),
            original_start_date_time: "2026-01-13T03:00:00Z".to_string(),
            new_start_date_time: Some("2026-01-13T08:00:00Z".to_string()),
            new_end_date_time: None,
            note: Some("Afternoon slot".to_string()),
        })
        .unwrap();
    assert_eq!(exception.id, "app3");
    assert!(exception.is_exception);
    assert_eq!(
        exception.end_date_time,
        Utc.with_ymd_and_hms(2026, 1, 13, 9, 0, 0).unwrap()
    );

    let appointments = service
        .appointments_by_patient("1", "2026-01-12T00:00:00Z", "2026-01-14T00:00:00Z")
        .unwrap();
    assert_eq!(ids_of(&appointments), ["app3"]);
    assert_eq!(appointments[0].note.as_deref(), Some("Afternoon slot"));
}

#[test]
fn editing_an_occurrence_twice_keeps_one_exception() {
    let mut service = clinic();
    let edit = |note: &str| NewException {
        rule_id: "rule1".to_string(),
        original_start_date_time: "2025-12-30T03:00:00Z".to_string(),
        new_start_date_time: None,
        new_end_date_time: None,
        note: Some(note.to_string()),
    };

    let exception = service.create_exception_for_rule(edit("Back on Tuesday")).unwrap();
    assert_eq!(exception.id, "app2");

    let patient = service.patient("1").unwrap();
    assert_eq!(patient.appointments.len(), 1);
    assert_eq!(patient.appointments[0].note.as_deref(), Some("Back on Tuesday"));
}

#[test]
fn exception_must_name_a_real_occurrence() {
    let mut service = clinic();
    let err = service
        .create_exception_for_rule(NewException {
            rule_id: "rule1".to_string(),
            original_start_date_time: "2026-01-14T03:00:00Z".to_string(),
            new_start_date_time: None,
            new_end_date_time: None,
            note: None,
        })
        .unwrap_err();
    assert!(matches!(
        err,
        ScheduleError::Validation(ValidationError::NotAnOccurrence { .. })
    ));

    let err = service
        .create_exception_for_rule(NewException {
            rule_id: "rule9".to_string(),
            original_start_date_time: "2026-01-13T03:00:00Z".to_string(),
            new_start_date_time: None,
            new_end_date_time: None,
            note: None,
        })
        .unwrap_err();
    assert!(matches!(err, ScheduleError::NotFound { kind: "rule", .. }));
}

#[test]
fn one_time_appointment_defaults_to_one_hour() {
    let mut service = clinic();
    let appointment = service
        .create_one_time_appointment(NewOneTimeAppointment {
            patient_id: "4".to_string(),
            start_date_time: "2026-02-10T10:00:00Z".to_string(),
            end_date_time: None,
            note: Some("Whitening".to_string()),
        })
        .unwrap();
    assert_eq!(appointment.id, "app3");
    assert_eq!(
        appointment.end_date_time,
        Utc.with_ymd_and_hms(2026, 2, 10, 11, 0, 0).unwrap()
    );

    let err = service
        .create_one_time_appointment(NewOneTimeAppointment {
            patient_id: "4".to_string(),
            start_date_time: "2026-02-10T10:00:00Z".to_string(),
            end_date_time: Some("2026-02-10T09:00:00Z".to_string()),
            note: None,
        })
        .unwrap_err();
    assert!(matches!(
        err,
        ScheduleError::Validation(ValidationError::EndBeforeStart { .. })
    ));
}

#[test]
fn deleting_a_rule_keeps_its_exceptions() {
    let mut service = clinic();
    service.delete_recurrence_rule("rule1").unwrap();

    let appointments = service
        .appointments_by_patient("1", "2025-12-20T00:00:00Z", "2026-01-10T00:00:00Z")
        .unwrap();
    assert_eq!(ids_of(&appointments), ["app2"]);

    assert!(matches!(
        service.delete_recurrence_rule("rule1"),
        Err(ScheduleError::NotFound { kind: "rule", .. })
    ));
}

#[test]
fn deleted_appointment_disappears() {
    let mut service = clinic();
    service.delete_appointment("app1").unwrap();
    assert!(service.patient("2").unwrap().appointments.is_empty());
    assert!(matches!(
        service.delete_appointment("app1"),
        Err(ScheduleError::NotFound { kind: "appointment", .. })
    ));
}

#[test]
fn next_appointment_skips_past_occurrences() {
    let service = clinic();
    let now = Utc.with_ymd_and_hms(2025, 12, 26, 5, 0, 0).unwrap();

    let next = service.next_appointment("2", now).unwrap().unwrap();
    assert_eq!(next.id, "app1");

    let next = service.next_appointment("1", now).unwrap().unwrap();
    assert_eq!(next.id, "app2");

    let later = Utc.with_ymd_and_hms(2026, 3, 24, 0, 0, 0).unwrap();
    assert!(service.next_appointment("1", later).unwrap().is_none());
}

#[test]
fn created_patient_gets_the_next_id_and_contact_details() {
    let mut service = clinic();
    let patient = service
        .create_patient(NewPatient {
            name: "  Dimas Arya ".to_string(),
            phone: Some("555-9876".to_string()),
            email: Some("  ".to_string()),
            address: None,
            medical_history: Some("Braces since 2024.".to_string()),
        })
        .unwrap();
    assert_eq!(patient.id, "5");
    assert_eq!(patient.name, "Dimas Arya");
    assert_eq!(patient.phone.as_deref(), Some("555-9876"));
    assert_eq!(patient.email, None);
    assert_eq!(patient.medical_history.as_deref(), Some("Braces since 2024."));
    assert!(patient.created_at.is_some());
    assert_eq!(patient.created_at, patient.updated_at);
    assert_eq!(service.store().load_all().unwrap().len(), 5);

    assert!(matches!(
        service.create_patient(NewPatient::named("   ")),
        Err(ScheduleError::Validation(ValidationError::Empty { field: "name" }))
    ));
}

#[test]
fn patient_update_touches_only_given_fields() {
    let mut service = clinic();
    let before = service.patient("1").unwrap();
    assert_eq!(
        before.created_at,
        Some(Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap())
    );

    let patch: PatientPatch = serde_json::from_value(json!({
        "phone": "555-0000",
        "address": ""
    }))
    .unwrap();
    let updated = service.update_patient("1", patch).unwrap();

    assert_eq!(updated.name, "Jessica Novia");
    assert_eq!(updated.phone.as_deref(), Some("555-0000"));
    assert_eq!(updated.address, None);
    assert_eq!(updated.email, before.email);
    assert_eq!(updated.medical_history, before.medical_history);
    assert_eq!(updated.created_at, before.created_at);
    assert!(updated.updated_at > before.updated_at);
    assert_eq!(updated.recurrence_rules, before.recurrence_rules);
    assert_eq!(service.patient("1").unwrap(), updated);

    let blank_name = PatientPatch {
        name: Some(" ".to_string()),
        ..PatientPatch::default()
    };
    assert!(matches!(
        service.update_patient("1", blank_name),
        Err(ScheduleError::Validation(ValidationError::Empty { field: "name" }))
    ));
    assert!(matches!(
        service.update_patient("99", PatientPatch::default()),
        Err(ScheduleError::NotFound { kind: "patient", .. })
    ));
}

#[test]
fn deleted_patient_is_gone_with_their_schedule() {
    let mut service = clinic();
    service.delete_patient("2").unwrap();

    assert!(matches!(
        service.patient("2"),
        Err(ScheduleError::NotFound { kind: "patient", .. })
    ));
    let entries = service
        .appointments_in_range("2025-12-20T00:00:00Z", "2026-01-10T00:00:00Z")
        .unwrap();
    assert!(entries.iter().all(|entry| entry.patient.id != "2"));
    assert!(matches!(
        service.delete_patient("2"),
        Err(ScheduleError::NotFound { kind: "patient", .. })
    ));
}

#[test]
fn calendar_entries_name_their_patient() {
    let service = clinic();
    let entries = service
        .appointments_in_range("2026-01-01T00:00:00Z", "2026-01-01T23:59:59Z")
        .unwrap();

    let labels: Vec<(&str, &str)> = entries
        .iter()
        .map(|entry| (entry.appointment.id.as_str(), entry.patient.name.as_str()))
        .collect();
    assert_eq!(
        labels,
        [("gen-rule2-3", "Melrose Burhan"), ("gen-rule3-2", "Novira Veronica")]
    );
}
