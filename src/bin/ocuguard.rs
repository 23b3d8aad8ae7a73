//! Ocuguard CLI - Command-line driver for the eye strain engine
//!
//! Commands:
//! - replay: Process recorded frames into per-frame outputs (batch mode)
//! - simulate: Generate synthetic frames and run them through the pipeline
//! - doctor: Diagnose engine configuration and model artifacts

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{Duration, Utc};
use ocuguard::classifier::FatigueClassifier;
use ocuguard::features::StandardScaler;
use ocuguard::pipeline::{FrameInput, FrameOutput, StrainProcessor};
use ocuguard::types::EyeSample;
use ocuguard::{EngineConfig, ENGINE_VERSION};

/// Ocuguard - On-device eye strain and fatigue decision engine
#[derive(Parser)]
#[command(name = "ocuguard")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Turn eye landmark frames into strain signals", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process recorded frames into per-frame outputs (batch mode)
    Replay {
        /// Input file path (use - for stdin), one frame JSON per line
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// User name attached to the session
        #[arg(long, default_value = "cli")]
        user: String,

        /// Load a trained classifier from a JSON model file
        #[arg(long)]
        model: Option<PathBuf>,

        /// Load feature scaler parameters from a JSON file
        #[arg(long)]
        scaler: Option<PathBuf>,

        /// Print the session summary to stderr when the replay ends
        #[arg(long)]
        summary: bool,
    },

    /// Generate synthetic frames and run them through the pipeline
    Simulate {
        /// Number of frames to generate
        #[arg(long, default_value = "1800")]
        frames: u64,

        /// Frames per second of the synthetic stream
        #[arg(long, default_value = "30")]
        fps: u32,

        /// Seconds between synthetic blinks
        #[arg(long, default_value = "4")]
        blink_every_secs: u32,

        /// Open-eye aspect ratio
        #[arg(long, default_value = "0.3")]
        open_ear: f64,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,

        /// Load a trained classifier from a JSON model file
        #[arg(long)]
        model: Option<PathBuf>,
    },

    /// Diagnose engine configuration and model artifacts
    Doctor {
        /// Check a classifier model file
        #[arg(long)]
        model: Option<PathBuf>,

        /// Check a scaler file
        #[arg(long)]
        scaler: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one output per line)
    Ndjson,
    /// JSON array of outputs
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    env_logger::init();
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

fn run(cli: Cli) -> Result<(), OcuguardCliError> {
    match cli.command {
        Commands::Replay {
            input,
            output,
            output_format,
            user,
            model,
            scaler,
            summary,
        } => cmd_replay(
            &input,
            &output,
            output_format,
            &user,
            model.as_deref(),
            scaler.as_deref(),
            summary,
        ),

        Commands::Simulate {
            frames,
            fps,
            blink_every_secs,
            open_ear,
            output_format,
            model,
        } => cmd_simulate(frames, fps, blink_every_secs, open_ear, output_format, model.as_deref()),

        Commands::Doctor { model, scaler, json } => {
            cmd_doctor(model.as_deref(), scaler.as_deref(), json)
        }
    }
}

fn build_processor(
    model: Option<&std::path::Path>,
    scaler: Option<&std::path::Path>,
) -> Result<StrainProcessor, OcuguardCliError> {
    let mut processor = StrainProcessor::new(EngineConfig::default());
    if let Some(model_path) = model {
        processor = processor.with_classifier(FatigueClassifier::load(model_path)?);
    }
    if let Some(scaler_path) = scaler {
        processor = processor.with_scaler(StandardScaler::load(scaler_path)?)?;
    }
    Ok(processor)
}

fn cmd_replay(
    input: &PathBuf,
    output: &PathBuf,
    output_format: OutputFormat,
    user: &str,
    model: Option<&std::path::Path>,
    scaler: Option<&std::path::Path>,
    summary: bool,
) -> Result<(), OcuguardCliError> {
    let input_data = if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    let mut frames: Vec<FrameInput> = Vec::new();
    for (idx, line) in input_data.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let frame: FrameInput = serde_json::from_str(line).map_err(|e| {
            OcuguardCliError::ParseError(format!("line {}: {}", idx + 1, e))
        })?;
        frames.push(frame);
    }

    if frames.is_empty() {
        return Err(OcuguardCliError::NoFrames);
    }

    let mut processor = build_processor(model, scaler)?;
    let started_at = frames[0].observed_at;
    processor.start_session(user, started_at);

    let mut outputs: Vec<FrameOutput> = Vec::with_capacity(frames.len());
    let mut last_at = started_at;
    for frame in frames {
        last_at = frame.observed_at;
        outputs.push(processor.process_frame(frame));
    }

    let session_summary = processor.end_session(last_at);

    let output_data = format_output(&outputs, &output_format)?;
    if output.to_string_lossy() == "-" {
        print!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }

    if summary {
        if let Some(s) = session_summary {
            eprintln!("{}", serde_json::to_string_pretty(&s)?);
        }
    }

    Ok(())
}

fn cmd_simulate(
    frames: u64,
    fps: u32,
    blink_every_secs: u32,
    open_ear: f64,
    output_format: OutputFormat,
    model: Option<&std::path::Path>,
) -> Result<(), OcuguardCliError> {
    if fps == 0 || blink_every_secs == 0 {
        return Err(OcuguardCliError::ParseError(
            "fps and blink-every-secs must be nonzero".to_string(),
        ));
    }

    let mut processor = build_processor(model, None)?;
    let start = Utc::now();
    processor.start_session("simulate", start);

    let frame_ms = 1000 / fps as i64;
    let blink_period = (fps * blink_every_secs) as u64;
    let mut outputs: Vec<FrameOutput> = Vec::with_capacity(frames as usize);

    for i in 0..frames {
        // Three closed frames at the start of each blink period
        let ear = if i % blink_period < 3 { open_ear / 2.0 } else { open_ear };
        let input = FrameInput {
            observed_at: start + Duration::milliseconds(frame_ms * i as i64),
            eye: Some(EyeSample::from_ear(ear)),
        };
        outputs.push(processor.process_frame(input));
    }

    let ended_at = start + Duration::milliseconds(frame_ms * frames as i64);
    let summary = processor.end_session(ended_at);

    match output_format {
        OutputFormat::Ndjson | OutputFormat::Json => {
            if let Some(s) = &summary {
                println!("{}", serde_json::to_string(s)?);
            }
        }
        OutputFormat::JsonPretty => {
            if let Some(s) = &summary {
                println!("{}", serde_json::to_string_pretty(s)?);
            }
        }
    }

    let blinks = outputs.iter().filter(|o| o.blink_detected).count();
    let alerts: usize = outputs.iter().map(|o| o.new_alerts.len()).sum();
    eprintln!("simulated {frames} frames: {blinks} blinks, {alerts} alerts");

    Ok(())
}

fn cmd_doctor(
    model: Option<&std::path::Path>,
    scaler: Option<&std::path::Path>,
    json: bool,
) -> Result<(), OcuguardCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "engine_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Ocuguard version {}", ENGINE_VERSION),
    });

    let config = EngineConfig::default();
    checks.push(DoctorCheck {
        name: "config".to_string(),
        status: CheckStatus::Ok,
        message: format!(
            "closure threshold {}, break interval {} min",
            config.blink.closure_threshold, config.alerts.break_interval_minutes
        ),
    });

    if let Some(model_path) = model {
        if model_path.exists() {
            match FatigueClassifier::load(model_path) {
                Ok(classifier) => checks.push(DoctorCheck {
                    name: "model".to_string(),
                    status: CheckStatus::Ok,
                    message: format!("Model valid ({} inputs)", classifier.input_dim()),
                }),
                Err(e) => checks.push(DoctorCheck {
                    name: "model".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Invalid model: {}", e),
                }),
            }
        } else {
            checks.push(DoctorCheck {
                name: "model".to_string(),
                status: CheckStatus::Warning,
                message: "Model file does not exist (pipeline degrades to Normal)".to_string(),
            });
        }
    }

    if let Some(scaler_path) = scaler {
        match StandardScaler::load(scaler_path) {
            Ok(s) => checks.push(DoctorCheck {
                name: "scaler".to_string(),
                status: CheckStatus::Ok,
                message: format!("Scaler valid ({} dimensions)", s.mean.len()),
            }),
            Err(e) => checks.push(DoctorCheck {
                name: "scaler".to_string(),
                status: CheckStatus::Error,
                message: format!("Cannot load scaler: {}", e),
            }),
        }
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
            message: "stdin is a pipe (replay mode ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: "ocuguard".to_string(),
        version: ENGINE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Ocuguard Doctor Report");
        println!("======================");
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

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(OcuguardCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn format_output(
    outputs: &[FrameOutput],
    format: &OutputFormat,
) -> Result<String, OcuguardCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for out in outputs {
                lines.push(serde_json::to_string(out)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(outputs)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(outputs)?),
    }
}

// Error types

#[derive(Debug)]
enum OcuguardCliError {
    Io(io::Error),
    Engine(ocuguard::EngineError),
    Json(serde_json::Error),
    NoFrames,
    DoctorFailed,
    ParseError(String),
}

impl From<io::Error> for OcuguardCliError {
    fn from(e: io::Error) -> Self {
        OcuguardCliError::Io(e)
    }
}

impl From<ocuguard::EngineError> for OcuguardCliError {
    fn from(e: ocuguard::EngineError) -> Self {
        OcuguardCliError::Engine(e)
    }
}

impl From<serde_json::Error> for OcuguardCliError {
    fn from(e: serde_json::Error) -> Self {
        OcuguardCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<OcuguardCliError> for CliError {
    fn from(e: OcuguardCliError) -> Self {
        match e {
            OcuguardCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            OcuguardCliError::Engine(e) => CliError {
                code: "ENGINE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'ocuguard doctor' to check model artifacts".to_string()),
            },
            OcuguardCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            OcuguardCliError::NoFrames => CliError {
                code: "NO_FRAMES".to_string(),
                message: "No frames found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            OcuguardCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            OcuguardCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Each input line must be one frame JSON object".to_string()),
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
