use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use schedule_core::ExpansionConfig;
use schedule_store::{CalendarEntry, JsonFileStore, PatientSummary, ScheduleService, SequentialIds};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "schedule-cli",
    about = "List clinic appointments, recurring ones expanded, over a time window."
)]
struct Args {
    /// Path to the patient store JSON file.
    #[arg(short, long)]
    input: PathBuf,

    /// Window start (ISO-8601, inclusive).
    #[arg(long)]
    from: String,

    /// Window end (ISO-8601, inclusive).
    #[arg(long)]
    to: String,

    /// Only this patient's appointments.
    #[arg(short, long)]
    patient: Option<String>,

    /// Per-rule limit for rules without a count.
    #[arg(long)]
    safety_cap: Option<usize>,

    /// Print JSON instead of one line per appointment.
    #[arg(long)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();

    let args = Args::parse();
    anyhow::ensure!(
        args.input.exists(),
        "patient store {:?} does not exist",
        args.input
    );

    let mut config = ExpansionConfig::default();
    if let Some(cap) = args.safety_cap {
        config.safety_cap = cap;
    }

    let store = JsonFileStore::new(args.input.clone());
    let service = ScheduleService::with_config(store, SequentialIds::new(), config);

    let entries = match &args.patient {
        Some(patient_id) => {
            let patient = service
                .patient(patient_id)
                .with_context(|| format!("cannot load patient {patient_id}"))?;
            service
                .appointments_by_patient(patient_id, &args.from, &args.to)
                .with_context(|| format!("cannot list appointments of patient {patient_id}"))?
                .into_iter()
                .map(|appointment| CalendarEntry {
                    appointment,
                    patient: PatientSummary {
                        id: patient.id.clone(),
                        name: patient.name.clone(),
                    },
                })
                .collect()
        }
        None => service
            .appointments_in_range(&args.from, &args.to)
            .with_context(|| format!("cannot list appointments in {:?}", args.input))?,
    };
    tracing::info!(count = entries.len(), "listed appointments");

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        for entry in &entries {
            println!("{}", describe(entry));
        }
        println!("Appointments: {}", entries.len());
    }

    Ok(())
}

fn describe(entry: &CalendarEntry) -> String {
    let appointment = &entry.appointment;
    let kind = match (appointment.rule_id(), appointment.is_exception) {
        (Some(rule), true) => format!("edited {rule}"),
        (Some(rule), false) => rule.to_string(),
        (None, _) => "one-off".to_string(),
    };
    format!(
        "{} - {}  {}  [{kind}] {}{}",
        appointment.start_date_time.format("%Y-%m-%d %H:%M"),
        appointment.end_date_time.format("%H:%M"),
        entry.patient.name,
        appointment.id,
        appointment
            .note
            .as_deref()
            .map(|note| format!("  {note}"))
            .unwrap_or_default()
    )
}
