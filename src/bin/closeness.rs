//! Closeness CLI - Command-line interface for the IOS closeness core
//!
//! Commands:
//! - record: Append a measurement to a session store
//! - list: List stored sessions
//! - export: Export stored sessions to CSV, TSV, or JSON
//! - label: Show the descriptor for a value
//! - next-position: Preview the reset behavior
//! - doctor: Diagnose store and settings files

use clap::{Parser, Subcommand, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use chrono::Local;
use ios_closeness::export::{prepare_export, ExportScope};
use ios_closeness::labels::{label_for, proximity_description};
use ios_closeness::store::{JsonFileStore, SessionStore};
use ios_closeness::types::{Modality, Scale, SliderPosition};
use ios_closeness::{
    CoreError, DecimalSeparator, ExitAction, ExportError, ExportFormat, ExportOptions,
    MeasurementRecorder, PersistenceError, ResetBehavior, SettingsStore, CORE_VERSION,
    PRODUCER_NAME,
};

/// Closeness - IOS scale measurement core
#[derive(Parser)]
#[command(name = "closeness")]
#[command(version = CORE_VERSION)]
#[command(about = "Record, label, and export IOS closeness measurements", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Append one measurement to a new session in the store
    Record {
        /// Session store file
        #[arg(long)]
        store: PathBuf,

        /// Settings file
        #[arg(long)]
        settings: Option<PathBuf>,

        /// Measurement modality
        #[arg(long, value_enum, default_value = "basic")]
        modality: ModalityArg,

        /// Primary value (clamped into 0..=1)
        #[arg(long)]
        value: f64,

        /// Relative size of the "self" circle (advanced)
        #[arg(long, default_value = "1.0")]
        self_scale: f64,

        /// Relative size of the "other" circle (advanced)
        #[arg(long, default_value = "1.0")]
        other_scale: f64,

        /// Normalized position of the "self" figure (proximity)
        #[arg(long)]
        self_position: Option<f64>,

        /// Normalized position of the "other" figure (proximity)
        #[arg(long)]
        other_position: Option<f64>,

        /// Session label
        #[arg(long)]
        label: Option<String>,
    },

    /// List stored sessions, newest first
    List {
        /// Session store file
        #[arg(long)]
        store: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Export stored sessions
    Export {
        /// Session store file
        #[arg(long)]
        store: PathBuf,

        /// Settings file supplying export defaults
        #[arg(long)]
        settings: Option<PathBuf>,

        /// Output file path (use - for stdout). Defaults to the generated filename.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Export format (overrides settings)
        #[arg(long, value_enum)]
        format: Option<FormatArg>,

        /// Omit timestamps and labels
        #[arg(long)]
        no_metadata: bool,

        /// Decimal separator (overrides settings)
        #[arg(long, value_enum)]
        decimal_separator: Option<SeparatorArg>,

        /// Export only this session
        #[arg(long)]
        session: Option<uuid::Uuid>,
    },

    /// Show the descriptor for a value
    Label {
        /// Value in 0..=1
        value: f64,

        /// Which scale to use
        #[arg(long, value_enum, default_value = "overlap")]
        scale: ScaleArg,

        /// Include the descriptive sentence (proximity only)
        #[arg(long)]
        describe: bool,
    },

    /// Preview the next slider position for a reset behavior
    NextPosition {
        #[arg(long, value_enum, default_value = "basic")]
        modality: ModalityArg,

        #[arg(long, value_enum, default_value = "default")]
        behavior: BehaviorArg,

        /// Last saved value (for keep)
        #[arg(long)]
        last: Option<f64>,

        /// Seed for the random source
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Diagnose store and settings files
    Doctor {
        /// Check a session store file
        #[arg(long)]
        store: Option<PathBuf>,

        /// Check a settings file
        #[arg(long)]
        settings: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModalityArg {
    Basic,
    Advanced,
    Proximity,
}

impl From<ModalityArg> for Modality {
    fn from(arg: ModalityArg) -> Self {
        match arg {
            ModalityArg::Basic => Modality::BasicIos,
            ModalityArg::Advanced => Modality::AdvancedIos,
            ModalityArg::Proximity => Modality::Proximity,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Csv,
    Tsv,
    Json,
}

impl From<FormatArg> for ExportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Csv => ExportFormat::Csv,
            FormatArg::Tsv => ExportFormat::Tsv,
            FormatArg::Json => ExportFormat::Json,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum SeparatorArg {
    Period,
    Comma,
}

impl From<SeparatorArg> for DecimalSeparator {
    fn from(arg: SeparatorArg) -> Self {
        match arg {
            SeparatorArg::Period => DecimalSeparator::Period,
            SeparatorArg::Comma => DecimalSeparator::Comma,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ScaleArg {
    Overlap,
    Proximity,
}

#[derive(Clone, Copy, ValueEnum)]
enum BehaviorArg {
    Keep,
    Default,
    Random,
}

impl From<BehaviorArg> for ResetBehavior {
    fn from(arg: BehaviorArg) -> Self {
        match arg {
            BehaviorArg::Keep => ResetBehavior::KeepPosition,
            BehaviorArg::Default => ResetBehavior::ResetToDefault,
            BehaviorArg::Random => ResetBehavior::RandomPosition,
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), ClosenessCliError> {
    match cli.command {
        Commands::Record {
            store,
            settings,
            modality,
            value,
            self_scale,
            other_scale,
            self_position,
            other_position,
            label,
        } => cmd_record(
            &store,
            settings.as_deref(),
            modality.into(),
            SliderPosition {
                self_position,
                other_position,
                ..SliderPosition::with_scales(value, self_scale, other_scale)
            },
            label,
        ),

        Commands::List { store, json } => cmd_list(&store, json),

        Commands::Export {
            store,
            settings,
            output,
            format,
            no_metadata,
            decimal_separator,
            session,
        } => {
            let mut options = match settings.as_deref() {
                Some(path) => ExportOptions::from_settings(&SettingsStore::new(path).snapshot()),
                None => ExportOptions::default(),
            };
            if let Some(format) = format {
                options.format = format.into();
            }
            if no_metadata {
                options.include_metadata = false;
            }
            if let Some(separator) = decimal_separator {
                options.decimal_separator = separator.into();
            }
            let scope = session.map(ExportScope::Single).unwrap_or(ExportScope::All);
            cmd_export(&store, output.as_deref(), scope, &options)
        }

        Commands::Label {
            value,
            scale,
            describe,
        } => {
            cmd_label(value, scale, describe);
            Ok(())
        }

        Commands::NextPosition {
            modality,
            behavior,
            last,
            seed,
        } => cmd_next_position(modality.into(), behavior.into(), last, seed),

        Commands::Doctor {
            store,
            settings,
            json,
        } => cmd_doctor(store.as_deref(), settings.as_deref(), json),
    }
}

fn cmd_record(
    store_path: &Path,
    settings_path: Option<&Path>,
    modality: Modality,
    position: SliderPosition,
    label: Option<String>,
) -> Result<(), ClosenessCliError> {
    let store = JsonFileStore::open(store_path)?;
    let settings = Arc::new(match settings_path {
        Some(path) => SettingsStore::new(path),
        None => SettingsStore::in_memory(),
    });

    let mut recorder = MeasurementRecorder::open(store, settings, modality);
    recorder.set_label(label);
    recorder.set_pending(position);
    recorder.exit(ExitAction::SaveAndExit)?;

    let session = recorder.session();
    if let Some(measurement) = session.last_measurement() {
        println!(
            "Recorded {:.3} ({}) in session {}",
            measurement.value(),
            label_for(modality.scale(), measurement.value()),
            session.id
        );
    }
    Ok(())
}

fn cmd_list(store_path: &Path, json: bool) -> Result<(), ClosenessCliError> {
    let store = JsonFileStore::open(store_path)?;
    let sessions = store.sessions();

    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }

    if sessions.is_empty() {
        println!("No sessions");
        return Ok(());
    }
    for session in &sessions {
        let last = session
            .last_measurement()
            .map(|m| format!("{:.3} {}", m.value(), label_for(session.modality.scale(), m.value())))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  {}  {:<12}  {:>3} measurements  last: {}{}",
            session.id,
            session.created_at.format("%Y-%m-%d %H:%M"),
            session.modality.as_str(),
            session.len(),
            last,
            session
                .label
                .as_deref()
                .map(|l| format!("  [{}]", l))
                .unwrap_or_default()
        );
    }
    Ok(())
}

fn cmd_export(
    store_path: &Path,
    output: Option<&Path>,
    scope: ExportScope,
    options: &ExportOptions,
) -> Result<(), ClosenessCliError> {
    let store = JsonFileStore::open(store_path)?;
    let today = Local::now().date_naive();
    let file = prepare_export(&store.sessions(), scope, options, today)?;

    match output {
        Some(path) if path.to_string_lossy() == "-" => {
            io::stdout().write_all(&file.content)?;
        }
        Some(path) => {
            fs::write(path, &file.content)?;
            eprintln!("Wrote {}", path.display());
        }
        None => {
            let path = PathBuf::from(&file.filename);
            fs::write(&path, &file.content)?;
            eprintln!("Wrote {}", path.display());
        }
    }
    Ok(())
}

fn cmd_label(value: f64, scale: ScaleArg, describe: bool) {
    let scale = match scale {
        ScaleArg::Overlap => Scale::Overlap,
        ScaleArg::Proximity => Scale::Proximity,
    };
    println!("{}", label_for(scale, value));
    if describe && scale == Scale::Proximity {
        println!("{}", proximity_description(value));
    }
}

fn cmd_next_position(
    modality: Modality,
    behavior: ResetBehavior,
    last: Option<f64>,
    seed: Option<u64>,
) -> Result<(), ClosenessCliError> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let last = last.map(SliderPosition::new);
    let next = behavior.next_position(modality, last.as_ref(), &mut rng);
    println!("{}", serde_json::to_string_pretty(&next)?);
    Ok(())
}

fn cmd_doctor(
    store: Option<&Path>,
    settings: Option<&Path>,
    json: bool,
) -> Result<(), ClosenessCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "core_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Core version {}", CORE_VERSION),
    });

    if let Some(store_path) = store {
        let check = if !store_path.exists() {
            DoctorCheck {
                name: "store".to_string(),
                status: CheckStatus::Warning,
                message: "Store file does not exist (will be created on first save)".to_string(),
            }
        } else {
            match JsonFileStore::open(store_path) {
                Ok(store) => {
                    let sessions = store.sessions();
                    let measurements: usize = sessions.iter().map(|s| s.len()).sum();
                    let empty = sessions.iter().filter(|s| s.is_empty()).count();
                    DoctorCheck {
                        name: "store".to_string(),
                        status: if empty > 0 {
                            CheckStatus::Warning
                        } else {
                            CheckStatus::Ok
                        },
                        message: format!(
                            "{} sessions, {} measurements, {} empty",
                            sessions.len(),
                            measurements,
                            empty
                        ),
                    }
                }
                Err(e) => DoctorCheck {
                    name: "store".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Cannot read store: {}", e),
                },
            }
        };
        checks.push(check);
    }

    if let Some(settings_path) = settings {
        let check = if !settings_path.exists() {
            DoctorCheck {
                name: "settings".to_string(),
                status: CheckStatus::Warning,
                message: "Settings file does not exist (defaults in use)".to_string(),
            }
        } else {
            match fs::read_to_string(settings_path)
                .map_err(PersistenceError::from)
                .and_then(|c| {
                    serde_json::from_str::<ios_closeness::Settings>(&c)
                        .map_err(PersistenceError::from)
                }) {
                Ok(s) => DoctorCheck {
                    name: "settings".to_string(),
                    status: CheckStatus::Ok,
                    message: format!(
                        "reset={}, export={}, metadata={}",
                        s.reset_behavior.as_str(),
                        s.export_format.extension(),
                        s.include_metadata
                    ),
                },
                Err(e) => DoctorCheck {
                    name: "settings".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Invalid settings: {}", e),
                },
            }
        };
        checks.push(check);
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe".to_string(),
        }
    };
    checks.push(stdin_check);

    let failed = checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: CORE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Closeness Doctor Report");
        println!("=======================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");
        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "✓",
                CheckStatus::Warning => "⚠",
                CheckStatus::Error => "✗",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    if failed {
        Err(ClosenessCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Error types

#[derive(Debug)]
enum ClosenessCliError {
    Io(io::Error),
    Core(CoreError),
    Json(serde_json::Error),
    DoctorFailed,
}

impl From<io::Error> for ClosenessCliError {
    fn from(e: io::Error) -> Self {
        ClosenessCliError::Io(e)
    }
}

impl From<CoreError> for ClosenessCliError {
    fn from(e: CoreError) -> Self {
        ClosenessCliError::Core(e)
    }
}

impl From<PersistenceError> for ClosenessCliError {
    fn from(e: PersistenceError) -> Self {
        ClosenessCliError::Core(e.into())
    }
}

impl From<ExportError> for ClosenessCliError {
    fn from(e: ExportError) -> Self {
        ClosenessCliError::Core(e.into())
    }
}

impl From<serde_json::Error> for ClosenessCliError {
    fn from(e: serde_json::Error) -> Self {
        ClosenessCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<ClosenessCliError> for CliError {
    fn from(e: ClosenessCliError) -> Self {
        match e {
            ClosenessCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            ClosenessCliError::Core(CoreError::Export(ExportError::NoData)) => CliError {
                code: "NO_DATA".to_string(),
                message: "No data to export".to_string(),
                hint: Some("Record a measurement or check the --session id".to_string()),
            },
            ClosenessCliError::Core(CoreError::Persistence(e)) => CliError {
                code: "PERSISTENCE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'closeness doctor --store <file>' for details".to_string()),
            },
            ClosenessCliError::Core(e) => CliError {
                code: "CORE_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            ClosenessCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            ClosenessCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ios_closeness::types::{OTHER_POSITION, SELF_POSITION};

    #[test]
    fn test_record_writes_proximity_positions() {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("sessions.json");

        let cli = Cli::parse_from([
            "closeness",
            "record",
            "--store",
            store_path.to_str().unwrap(),
            "--modality",
            "proximity",
            "--value",
            "0.4",
            "--self-position",
            "0.25",
            "--other-position",
            "0.75",
        ]);
        run(cli).unwrap();

        let store = JsonFileStore::open(&store_path).unwrap();
        let sessions = store.sessions();
        assert_eq!(sessions.len(), 1);
        let measurement = &sessions[0].measurements()[0];
        assert_eq!(measurement.value(), 0.4);
        assert_eq!(measurement.secondary_value(SELF_POSITION), Some(0.25));
        assert_eq!(measurement.secondary_value(OTHER_POSITION), Some(0.75));
    }
}
