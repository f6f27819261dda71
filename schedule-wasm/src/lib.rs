//! Framework-neutral WASM <-> JavaScript bridge for the scheduling engine.
//!
//! Records cross the boundary as plain JS objects in the wire shape
//! (camelCase keys, ISO-8601 strings); results come back the same way.

use chrono::{DateTime, Utc};
use schedule_core::{ExpansionConfig, ScheduleError};
use serde::{Deserialize, Serialize};
use serde_wasm_bindgen::from_value;
use wasm_bindgen::prelude::*;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsExpansionConfig {
    #[serde(default)]
    safety_cap: Option<usize>,
    #[serde(default)]
    scan_limit: Option<u32>,
    #[serde(default)]
    next_appointment_horizon_months: Option<u32>,
}

impl From<JsExpansionConfig> for ExpansionConfig {
    fn from(cfg: JsExpansionConfig) -> Self {
        let mut base = ExpansionConfig::default();
        if let Some(cap) = cfg.safety_cap {
            base.safety_cap = cap;
        }
        if let Some(limit) = cfg.scan_limit {
            base.scan_limit = limit;
        }
        if let Some(months) = cfg.next_appointment_horizon_months {
            base.next_appointment_horizon_months = months;
        }
        base
    }
}

/// Occurrences of one recurrence rule in the inclusive window `[from, to]`.
#[wasm_bindgen(js_name = expand)]
pub fn expand_rule(
    rule: JsValue,
    from: &str,
    to: &str,
    config: Option<JsValue>,
) -> Result<JsValue, JsValue> {
    init();
    let rule = schedule_store::parse_rule_value(&read_json(rule, "rule")?)
        .map_err(|err| JsValue::from_str(&format_schedule_error(err)))?;
    let (from, to) = read_window(from, to)?;
    let cfg = read_config(config)?;

    write_json(&schedule_core::expand_with(&rule, from, to, &cfg))
}

/// Merged appointments of one patient record in the inclusive window.
#[wasm_bindgen(js_name = occurrencesForPatient)]
pub fn occurrences_for_patient(
    patient: JsValue,
    from: &str,
    to: &str,
    config: Option<JsValue>,
) -> Result<JsValue, JsValue> {
    init();
    let patient = schedule_store::parse_patient_value(&read_json(patient, "patient")?)
        .map_err(|err| JsValue::from_str(&format_schedule_error(err)))?;
    let (from, to) = read_window(from, to)?;
    let cfg = read_config(config)?;

    write_json(&schedule_core::occurrences_for_patient_with(
        &patient, from, to, &cfg,
    ))
}

/// The patient's next appointment at or after `now`, or `null`.
#[wasm_bindgen(js_name = nextAppointment)]
pub fn next_appointment(
    patient: JsValue,
    now: &str,
    config: Option<JsValue>,
) -> Result<JsValue, JsValue> {
    init();
    let patient = schedule_store::parse_patient_value(&read_json(patient, "patient")?)
        .map_err(|err| JsValue::from_str(&format_schedule_error(err)))?;
    let now = read_instant(now)?;
    let cfg = read_config(config)?;

    write_json(&schedule_core::next_appointment(&patient, now, &cfg))
}

/// Render a rule as RFC 5545 `RRULE` text.
#[wasm_bindgen(js_name = toRrule)]
pub fn to_rrule(rule: JsValue) -> Result<String, JsValue> {
    init();
    schedule_store::parse_rule_value(&read_json(rule, "rule")?)
        .map(|rule| rule.rrule_string())
        .map_err(|err| JsValue::from_str(&format_schedule_error(err)))
}

fn init() {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();
}

fn read_json(value: JsValue, what: &str) -> Result<serde_json::Value, JsValue> {
    from_value::<serde_json::Value>(value)
        .map_err(|err| JsValue::from_str(&format!("cannot read {what}: {err}")))
}

fn read_config(config: Option<JsValue>) -> Result<ExpansionConfig, JsValue> {
    match config {
        Some(js_cfg) if !js_cfg.is_undefined() && !js_cfg.is_null() => {
            let cfg: JsExpansionConfig = from_value(js_cfg)
                .map_err(|err| JsValue::from_str(&format!("cannot read config: {err}")))?;
            Ok(ExpansionConfig::from(cfg))
        }
        _ => Ok(ExpansionConfig::default()),
    }
}

fn read_window(from: &str, to: &str) -> Result<(DateTime<Utc>, DateTime<Utc>), JsValue> {
    schedule_store::parse_window(from, to)
        .map_err(|err| JsValue::from_str(&format_schedule_error(err.into())))
}

fn read_instant(value: &str) -> Result<DateTime<Utc>, JsValue> {
    schedule_store::parse_instant(value)
        .map_err(|err| JsValue::from_str(&format_schedule_error(err.into())))
}

fn write_json<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    // Plain objects instead of JS `Map`s, so callers can read fields directly.
    let serializer = serde_wasm_bindgen::Serializer::json_compatible();
    value
        .serialize(&serializer)
        .map_err(|err| JsValue::from_str(&format!("cannot serialize result: {err}")))
}

fn format_schedule_error(err: ScheduleError) -> String {
    format!("Schedule error: {err}")
}
