//! Stress CLI - Command-line interface for stress-ensemble
//!
//! Commands:
//! - train: Fit an artifact from a labeled dataset
//! - predict: Classify vitals with a trained artifact
//! - validate: Validate dataset records
//! - doctor: Diagnose artifact health and configuration
//! - schema: Print input, sample and artifact schema information

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use stress_ensemble::artifact::{Artifact, ARTIFACT_SCHEMA_VERSION};
use stress_ensemble::config::TrainingConfig;
use stress_ensemble::features::FEATURE_NAMES;
use stress_ensemble::inference::InferenceService;
use stress_ensemble::pipeline::{TrainingPipeline, TrainingReport};
use stress_ensemble::schema::{parse_blood_pressure, DatasetAdapter, DatasetRecord};
use stress_ensemble::types::{PredictionResult, VitalSample};
use stress_ensemble::{StressError, PRODUCER_NAME, VERSION};

/// Stress - relaxed/stressed classification from five vitals
#[derive(Parser)]
#[command(name = "stress")]
#[command(author = "Synheart AI Inc")]
#[command(version = VERSION)]
#[command(about = "Train and run the vitals stress ensemble", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train an artifact from a labeled dataset
    Train {
        /// Dataset file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Artifact output path
        #[arg(short, long)]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Training configuration JSON file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the random seed
        #[arg(long)]
        seed: Option<u64>,

        /// Override the number of selected features
        #[arg(long)]
        top_k: Option<usize>,

        /// Override the number of cross-validation folds (0 disables)
        #[arg(long)]
        cv_folds: Option<usize>,

        /// Write the training report to this file
        #[arg(long)]
        report: Option<PathBuf>,

        /// Print the training report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Classify vitals with a trained artifact
    Predict {
        /// Artifact file path
        #[arg(short, long)]
        artifact: PathBuf,

        /// NDJSON samples (hrv, heart_rate, systolic, diastolic, spo2); use - for stdin
        #[arg(short, long, conflicts_with_all = ["hrv", "heart_rate", "blood_pressure", "spo2"])]
        input: Option<PathBuf>,

        /// Heart rate variability (ms)
        #[arg(long)]
        hrv: Option<f64>,

        /// Heart rate (BPM)
        #[arg(long)]
        heart_rate: Option<f64>,

        /// Blood pressure as "systolic/diastolic"
        #[arg(long)]
        blood_pressure: Option<String>,

        /// Oxygen saturation (%)
        #[arg(long)]
        spo2: Option<f64>,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,
    },

    /// Validate dataset records
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose artifact health and configuration
    Doctor {
        /// Check an artifact file
        #[arg(long)]
        artifact: Option<PathBuf>,

        /// Check a training configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print schema information
    Schema {
        /// Schema to print
        #[arg(value_enum)]
        schema_type: SchemaType,

        /// Output as JSON schema
        #[arg(long)]
        json_schema: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array of records
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one prediction per line)
    Ndjson,
    /// JSON array of predictions
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    /// Training dataset record
    Input,
    /// Inference sample
    Sample,
    /// Trained artifact (stress.artifact.v1)
    Artifact,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string()));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), StressCliError> {
    match cli.command {
        Commands::Train {
            input,
            output,
            input_format,
            config,
            seed,
            top_k,
            cv_folds,
            report,
            json,
        } => {
            let mut training = match config {
                Some(path) => TrainingConfig::from_file(path)?,
                None => TrainingConfig::default(),
            };
            if let Some(seed) = seed {
                training.seed = seed;
            }
            if let Some(top_k) = top_k {
                training.top_k = top_k;
            }
            if let Some(cv_folds) = cv_folds {
                training.cv_folds = cv_folds;
            }
            cmd_train(&input, &output, input_format, training, report.as_deref(), json)
        }

        Commands::Predict {
            artifact,
            input,
            hrv,
            heart_rate,
            blood_pressure,
            spo2,
            output_format,
        } => {
            let samples = match input {
                Some(path) => read_samples(&path)?,
                None => vec![sample_from_flags(hrv, heart_rate, blood_pressure.as_deref(), spo2)?],
            };
            cmd_predict(&artifact, &samples, &output_format)
        }

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Doctor {
            artifact,
            config,
            json,
        } => cmd_doctor(artifact.as_deref(), config.as_deref(), json),

        Commands::Schema {
            schema_type,
            json_schema,
        } => cmd_schema(schema_type, json_schema),
    }
}

fn cmd_train(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    config: TrainingConfig,
    report_path: Option<&Path>,
    json: bool,
) -> Result<(), StressCliError> {
    let records = parse_records(&read_input(input)?, input_format)?;
    if records.is_empty() {
        return Err(StressCliError::NoRecords);
    }

    let pipeline = TrainingPipeline::new(config);
    let (artifact, report) = pipeline.train_records(&records)?;
    artifact.save(output)?;

    if let Some(path) = report_path {
        fs::write(path, serde_json::to_string_pretty(&report)?)?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_training_summary(&artifact, &report, output);
    }

    Ok(())
}

fn print_training_summary(artifact: &Artifact, report: &TrainingReport, output: &Path) {
    println!("Training Report");
    println!("===============");
    println!("Artifact:       {}", output.display());
    println!("Artifact ID:    {}", artifact.artifact_id());
    println!("Train samples:  {}", report.train_samples);
    println!("Test samples:   {}", report.test_samples);
    println!("Accuracy:       {:.4}", report.accuracy);
    match report.auc {
        Some(auc) => println!("ROC AUC:        {:.4}", auc),
        None => println!("ROC AUC:        n/a"),
    }
    if let Some(cv) = &report.cross_validation {
        println!(
            "CV accuracy:    {:.4} (+/- {:.4}) over {} folds",
            cv.mean_accuracy,
            cv.std_accuracy * 2.0,
            cv.fold_accuracies.len()
        );
    }

    println!("\nSelected features:");
    for (i, feature) in report.ranking.ranked.iter().take(report.selected_features.len()).enumerate() {
        println!("  {:2}. {}: {:.4}", i + 1, feature.name, feature.score);
    }

    println!("\nModel accuracy:");
    for score in &report.member_scores {
        println!("  {}: {:.4}", score.model, score.accuracy);
    }

    let m = &report.confusion_matrix;
    println!("\nConfusion matrix (rows: actual, cols: predicted):");
    println!("  Relaxed   {:5} {:5}", m.true_negative, m.false_positive);
    println!("  Stressed  {:5} {:5}", m.false_negative, m.true_positive);
}

fn cmd_predict(
    artifact_path: &Path,
    samples: &[VitalSample],
    output_format: &OutputFormat,
) -> Result<(), StressCliError> {
    let service = InferenceService::load(artifact_path)?;
    let predictions = service.predict_batch(samples)?;
    print!("{}", format_output(&predictions, output_format)?);
    Ok(())
}

fn cmd_validate(input: &Path, input_format: InputFormat, json: bool) -> Result<(), StressCliError> {
    let records = parse_records(&read_input(input)?, input_format)?;
    let errors = DatasetAdapter::validate_records(&records);
    let excluded = records.iter().filter(|r| r.state.label().is_none()).count();

    let report = ValidationReport {
        total_records: records.len(),
        valid_records: records.len() - excluded - errors.len(),
        excluded_records: excluded,
        invalid_records: errors.len(),
        errors,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total records:    {}", report.total_records);
        println!("Valid records:    {}", report.valid_records);
        println!("Excluded records: {}", report.excluded_records);
        println!("Invalid records:  {}", report.invalid_records);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!("  - {}", err);
            }
        }
    }

    if report.invalid_records > 0 {
        Err(StressCliError::ValidationFailed(report.invalid_records))
    } else {
        Ok(())
    }
}

fn cmd_doctor(artifact: Option<&Path>, config: Option<&Path>, json: bool) -> Result<(), StressCliError> {
    let mut checks: Vec<DoctorCheck> = vec![
        DoctorCheck {
            name: "version".to_string(),
            status: CheckStatus::Ok,
            message: format!("{} version {}", PRODUCER_NAME, VERSION),
        },
        DoctorCheck {
            name: "artifact_schema".to_string(),
            status: CheckStatus::Ok,
            message: format!("Artifact schema: {}", ARTIFACT_SCHEMA_VERSION),
        },
        DoctorCheck {
            name: "features".to_string(),
            status: CheckStatus::Ok,
            message: format!("{} derived features available", FEATURE_NAMES.len()),
        },
    ];

    if let Some(path) = artifact {
        checks.push(match Artifact::load(path) {
            Ok(artifact) => DoctorCheck {
                name: "artifact".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "Artifact {} valid ({} features, trained {}, accuracy {:.4})",
                    artifact.artifact_id(),
                    artifact.features().len(),
                    artifact.trained_at().to_rfc3339(),
                    artifact.metadata().accuracy
                ),
            },
            Err(e) if !path.exists() => DoctorCheck {
                name: "artifact".to_string(),
                status: CheckStatus::Warning,
                message: format!("Artifact file does not exist: {}", e),
            },
            Err(e) => DoctorCheck {
                name: "artifact".to_string(),
                status: CheckStatus::Error,
                message: format!("Invalid artifact: {}", e),
            },
        });
    }

    if let Some(path) = config {
        checks.push(match TrainingConfig::from_file(path) {
            Ok(config) => DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "Config valid (top_k {}, cv_folds {}, seed {})",
                    config.top_k, config.cv_folds, config.seed
                ),
            },
            Err(e) => DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: format!("Invalid config: {}", e),
            },
        });
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
            message: "stdin is a pipe (ready for --input -)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Stress Doctor Report");
        println!("====================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(StressCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn cmd_schema(schema_type: SchemaType, json_schema: bool) -> Result<(), StressCliError> {
    match schema_type {
        SchemaType::Input => {
            if json_schema {
                println!("{}", get_input_json_schema());
            } else {
                println!("Input Schema: dataset record");
                println!();
                println!("One JSON object per record (NDJSON) or a JSON array of records:");
                println!();
                println!("- \"HRV (ms)\": number");
                println!("- \"Heart Rate (BPM)\": number");
                println!("- \"Blood Pressure (mmHg)\": string, \"systolic/diastolic\"");
                println!("- \"Oxygen Saturation (%)\": number");
                println!("- \"Psychological State\": string");
                println!();
                println!("Only Relaxed and Stressed records are used; other states are excluded.");
                println!("Additional columns are ignored.");
            }
        }
        SchemaType::Sample => {
            if json_schema {
                println!("{}", get_sample_json_schema());
            } else {
                println!("Sample Schema");
                println!();
                println!("- hrv: heart rate variability in ms (> 0)");
                println!("- heart_rate: beats per minute (> 0)");
                println!("- systolic, diastolic: blood pressure in mmHg (> 0)");
                println!("- spo2: oxygen saturation in percent (0, 100]");
            }
        }
        SchemaType::Artifact => {
            if json_schema {
                println!("{}", get_artifact_json_schema());
            } else {
                println!("Artifact Schema: {}", ARTIFACT_SCHEMA_VERSION);
                println!();
                println!("- schema_version, artifact_id, trained_at");
                println!("- producer: {{ name, version }}");
                println!("- features: {{ names }} (frozen selection, in model order)");
                println!("- scaler: {{ stats: [{{ mean, std }}] }}");
                println!("- ensemble: {{ combination, members }}");
                println!("  members: random_forest, gradient_boosting, mlp, svm_rbf, svm_linear");
                println!("- metadata: {{ accuracy, auc, cv_mean_accuracy, cv_std_accuracy, train_samples, test_samples }}");
                println!();
                println!("Derivable features:");
                for name in FEATURE_NAMES {
                    println!("  - {}", name);
                }
            }
        }
    }

    Ok(())
}

// Helper functions

fn read_input(input: &Path) -> Result<String, StressCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn parse_records(input: &str, format: InputFormat) -> Result<Vec<DatasetRecord>, StressCliError> {
    Ok(match format {
        InputFormat::Ndjson => DatasetAdapter::parse_ndjson(input)?,
        InputFormat::Json => DatasetAdapter::parse_array(input)?,
    })
}

fn read_samples(input: &Path) -> Result<Vec<VitalSample>, StressCliError> {
    let data = read_input(input)?;
    let mut samples = Vec::new();
    for (line_num, line) in data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let sample: VitalSample = serde_json::from_str(trimmed).map_err(|e| {
            StressCliError::ParseError(format!("Failed to parse sample on line {}: {}", line_num + 1, e))
        })?;
        sample.validate()?;
        samples.push(sample);
    }
    if samples.is_empty() {
        return Err(StressCliError::NoRecords);
    }
    Ok(samples)
}

fn sample_from_flags(
    hrv: Option<f64>,
    heart_rate: Option<f64>,
    blood_pressure: Option<&str>,
    spo2: Option<f64>,
) -> Result<VitalSample, StressCliError> {
    let (Some(hrv), Some(heart_rate), Some(blood_pressure), Some(spo2)) =
        (hrv, heart_rate, blood_pressure, spo2)
    else {
        return Err(StressCliError::ParseError(
            "Provide --input, or all of --hrv, --heart-rate, --blood-pressure and --spo2".to_string(),
        ));
    };
    let (systolic, diastolic) = parse_blood_pressure(blood_pressure)?;
    let sample = VitalSample::new(hrv, heart_rate, systolic, diastolic, spo2);
    sample.validate()?;
    Ok(sample)
}

fn format_output(predictions: &[PredictionResult], format: &OutputFormat) -> Result<String, StressCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for prediction in predictions {
                lines.push(serde_json::to_string(prediction)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(predictions)? + "\n"),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(predictions)? + "\n"),
    }
}

fn get_input_json_schema() -> String {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "stress.dataset_record",
        "description": "Labeled vitals record used for training",
        "type": "object",
        "required": [
            "HRV (ms)",
            "Heart Rate (BPM)",
            "Blood Pressure (mmHg)",
            "Oxygen Saturation (%)",
            "Psychological State"
        ],
        "properties": {
            "HRV (ms)": { "type": "number", "exclusiveMinimum": 0 },
            "Heart Rate (BPM)": { "type": "number", "exclusiveMinimum": 0 },
            "Blood Pressure (mmHg)": { "type": "string", "pattern": "^\\s*[0-9.]+\\s*/\\s*[0-9.]+\\s*$" },
            "Oxygen Saturation (%)": { "type": "number", "exclusiveMinimum": 0, "maximum": 100 },
            "Psychological State": { "type": "string" }
        }
    })
    .to_string()
}

fn get_sample_json_schema() -> String {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "stress.sample",
        "description": "Vitals for a single inference",
        "type": "object",
        "required": ["hrv", "heart_rate", "systolic", "diastolic", "spo2"],
        "properties": {
            "hrv": { "type": "number", "exclusiveMinimum": 0 },
            "heart_rate": { "type": "number", "exclusiveMinimum": 0 },
            "systolic": { "type": "number", "exclusiveMinimum": 0 },
            "diastolic": { "type": "number", "exclusiveMinimum": 0 },
            "spo2": { "type": "number", "exclusiveMinimum": 0, "maximum": 100 }
        }
    })
    .to_string()
}

fn get_artifact_json_schema() -> String {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": ARTIFACT_SCHEMA_VERSION,
        "description": "Trained stress ensemble artifact",
        "type": "object",
        "required": [
            "schema_version", "artifact_id", "trained_at", "producer",
            "features", "scaler", "ensemble", "metadata"
        ],
        "properties": {
            "schema_version": { "type": "string", "const": ARTIFACT_SCHEMA_VERSION },
            "artifact_id": { "type": "string", "format": "uuid" },
            "trained_at": { "type": "string", "format": "date-time" },
            "producer": {
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "version": { "type": "string" }
                }
            },
            "features": {
                "type": "object",
                "properties": {
                    "names": { "type": "array", "items": { "enum": FEATURE_NAMES } }
                }
            },
            "scaler": { "type": "object" },
            "ensemble": { "type": "object" },
            "metadata": {
                "type": "object",
                "properties": {
                    "accuracy": { "type": "number" },
                    "auc": { "type": ["number", "null"] },
                    "cv_mean_accuracy": { "type": ["number", "null"] },
                    "cv_std_accuracy": { "type": ["number", "null"] },
                    "train_samples": { "type": "integer" },
                    "test_samples": { "type": "integer" }
                }
            }
        }
    })
    .to_string()
}

// Error types

#[derive(Debug)]
enum StressCliError {
    Io(io::Error),
    Stress(StressError),
    Json(serde_json::Error),
    NoRecords,
    ValidationFailed(usize),
    DoctorFailed,
    ParseError(String),
}

impl From<io::Error> for StressCliError {
    fn from(e: io::Error) -> Self {
        StressCliError::Io(e)
    }
}

impl From<StressError> for StressCliError {
    fn from(e: StressError) -> Self {
        StressCliError::Stress(e)
    }
}

impl From<serde_json::Error> for StressCliError {
    fn from(e: serde_json::Error) -> Self {
        StressCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<StressCliError> for CliError {
    fn from(e: StressCliError) -> Self {
        match e {
            StressCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            StressCliError::Stress(e) => {
                let hint = match &e {
                    StressError::Validation(_) => "Run 'stress validate' for details",
                    StressError::NumericDomain(_) => "Check that HRV, heart rate and diastolic pressure are non-zero",
                    StressError::ArtifactMismatch(_) => "Retrain the artifact with this version of stress",
                    StressError::Json(_) => "Check JSON syntax",
                    StressError::Io(_) => "Check file paths and permissions",
                };
                CliError {
                    code: e.code().to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            StressCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            StressCliError::NoRecords => CliError {
                code: "NO_RECORDS".to_string(),
                message: "No records found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            StressCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} records failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            StressCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            StressCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Check input format".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_records: usize,
    valid_records: usize,
    excluded_records: usize,
    invalid_records: usize,
    errors: Vec<String>,
}

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
