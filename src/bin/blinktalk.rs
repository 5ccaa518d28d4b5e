//! BlinkTalk CLI - Command-line interface for the blink session engine
//!
//! Commands:
//! - serve: Answer protocol requests from stdin (NDJSON in, NDJSON out)
//! - replay: Run a recorded EAR trace through a session on a replay clock
//! - doctor: Diagnose configuration and environment
//! - schema: Print request/response schema

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use blinktalk::clock::{secs_to_duration, ManualClock};
use blinktalk::protocol::{handle_line, sample_from_wire, FrameId, PROTOCOL_VERSION};
use blinktalk::{EngineConfig, SessionRegistry, ENGINE_VERSION, PRODUCER_NAME};

/// BlinkTalk - blink session engine for live EAR streams
#[derive(Parser)]
#[command(name = "blinktalk")]
#[command(author = "BlinkTalk")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Turn Eye Aspect Ratio streams into blink sequences", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Clone)]
struct ConfigArgs {
    /// Engine configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// EAR at or below which the eye counts as closed
    #[arg(long)]
    ear_threshold: Option<f64>,

    /// Close sessions idle for this many seconds
    #[arg(long)]
    idle_timeout_secs: Option<f64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer protocol requests from stdin (one JSON request per line)
    Serve {
        #[command(flatten)]
        config: ConfigArgs,

        /// Flush output after each response
        #[arg(long, default_value = "true")]
        flush: bool,
    },

    /// Replay a recorded EAR trace through one session
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        #[command(flatten)]
        config: ConfigArgs,

        /// End the session at this offset (seconds) instead of the last sample
        #[arg(long)]
        end_at: Option<f64>,

        /// Output format
        #[arg(long, default_value = "json")]
        output_format: OutputFormat,
    },

    /// Diagnose configuration and environment
    Doctor {
        #[command(flatten)]
        config: ConfigArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print protocol schema information
    Schema {
        /// Schema to print (request or response)
        #[arg(value_enum)]
        schema_type: SchemaType,

        /// Output as JSON schema
        #[arg(long)]
        json_schema: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Compact JSON summary
    Json,
    /// Pretty-printed JSON summary
    JsonPretty,
    /// Blink sequence only
    Sequence,
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    /// Request envelope
    Request,
    /// Response envelope
    Response,
}

/// One line of a recorded trace
#[derive(Debug, Deserialize)]
struct TraceSample {
    /// Offset from session start in seconds
    t: f64,
    #[serde(default)]
    ear: Option<f64>,
    #[serde(default)]
    no_face: bool,
    #[serde(default)]
    frame_id: Option<FrameId>,
}

fn main() -> ExitCode {
    let _ = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blinktalk=info".into()),
        )
        .try_init();

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

fn run(cli: Cli) -> Result<(), BlinkCliError> {
    match cli.command {
        Commands::Serve { config, flush } => cmd_serve(&config, flush),

        Commands::Replay {
            input,
            config,
            end_at,
            output_format,
        } => cmd_replay(&input, &config, end_at, output_format),

        Commands::Doctor { config, json } => cmd_doctor(&config, json),

        Commands::Schema {
            schema_type,
            json_schema,
        } => cmd_schema(schema_type, json_schema),
    }
}

fn load_config(args: &ConfigArgs) -> Result<EngineConfig, BlinkCliError> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_json(&fs::read_to_string(path)?)?,
        None => EngineConfig::default(),
    };

    if let Some(threshold) = args.ear_threshold {
        config = config.with_ear_threshold(threshold);
    }
    if let Some(timeout) = args.idle_timeout_secs {
        config = config.with_idle_timeout(timeout);
    }

    config.validate()?;
    Ok(config)
}

fn cmd_serve(args: &ConfigArgs, flush: bool) -> Result<(), BlinkCliError> {
    let config = load_config(args)?;
    let registry = SessionRegistry::new(config)?;

    info!(protocol = PROTOCOL_VERSION, "Serving requests on stdin");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = line?;
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }

        registry.sweep_idle();

        let response = handle_line(&registry, trimmed);
        writeln!(stdout, "{}", response)?;
        if flush {
            stdout.flush()?;
        }
    }

    stdout.flush()?;

    let stats = registry.stats();
    info!(
        received = stats.total_received,
        accepted = stats.total_accepted,
        rejected = stats.total_rejected,
        "Input closed"
    );
    Ok(())
}

fn cmd_replay(
    input: &Path,
    args: &ConfigArgs,
    end_at: Option<f64>,
    output_format: OutputFormat,
) -> Result<(), BlinkCliError> {
    let input_data = if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    let mut samples = Vec::new();
    for (index, line) in input_data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let sample: TraceSample = serde_json::from_str(trimmed).map_err(|e| {
            BlinkCliError::ParseError(format!("Line {}: {}", index + 1, e))
        })?;
        samples.push(sample);
    }

    if samples.is_empty() {
        return Err(BlinkCliError::NoSamples);
    }

    let epoch = Utc.timestamp_opt(0, 0).single().unwrap_or_else(Utc::now);
    let clock = Arc::new(ManualClock::new(epoch));
    let registry = SessionRegistry::with_clock(load_config(args)?, clock.clone())?;
    let session_id = registry.start_session()?;

    let mut last_t = 0.0_f64;
    let mut rejected = 0usize;

    for sample in samples {
        clock.set(epoch + secs_to_duration(sample.t));
        last_t = last_t.max(sample.t);

        let result = sample_from_wire(sample.ear, sample.no_face, sample.frame_id)
            .and_then(|s| registry.submit(&session_id, s));

        match result {
            Ok(ack) => {
                if let Some(blink) = ack.blink {
                    debug!(
                        t = sample.t,
                        duration_seconds = blink.duration_seconds,
                        category = %blink.category,
                        "Blink"
                    );
                }
            }
            Err(_) => rejected += 1,
        }
    }

    clock.set(epoch + secs_to_duration(end_at.unwrap_or(last_t)));
    let summary = registry.end_session(&session_id)?;

    if rejected > 0 {
        info!(rejected, "Some trace samples were rejected");
    }

    match output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string(&summary)?),
        OutputFormat::JsonPretty => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Sequence => println!("{}", summary.blink_sequence),
    }

    Ok(())
}

fn cmd_doctor(args: &ConfigArgs, json: bool) -> Result<(), BlinkCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "engine_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Engine version {}", ENGINE_VERSION),
    });

    checks.push(DoctorCheck {
        name: "protocol_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Protocol: {}", PROTOCOL_VERSION),
    });

    match load_config(args) {
        Ok(config) => {
            let symbols: String = blinktalk::DurationClassifier::from_config(&config)
                .symbols()
                .into_iter()
                .collect();
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "EAR threshold {}, categories {}, idle timeout {}",
                    config.ear_threshold,
                    symbols,
                    config
                        .idle_timeout_secs
                        .map(|t| format!("{}s", t))
                        .unwrap_or_else(|| "disabled".to_string())
                ),
            });
        }
        Err(e) => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: CliError::from(e).message,
            });
        }
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Warning,
            message: "stdin is a TTY (serve expects piped requests)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (serve mode ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: ENGINE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("BlinkTalk Doctor Report");
        println!("=======================");
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
        Err(BlinkCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn cmd_schema(schema_type: SchemaType, json_schema: bool) -> Result<(), BlinkCliError> {
    match schema_type {
        SchemaType::Request => {
            if json_schema {
                println!("{}", get_request_json_schema());
            } else {
                println!("Request Schema: {}", PROTOCOL_VERSION);
                println!();
                println!("One JSON object per line, selected by \"op\":");
                println!();
                println!("1. start_session");
                println!("2. submit_measurement");
                println!("   - session_id (string, required)");
                println!("   - ear (number) or no_face (true), exactly one");
                println!("   - frame_id (string or integer, optional)");
                println!("3. end_session");
                println!("   - session_id (string, required)");
                println!("4. health");
            }
        }
        SchemaType::Response => {
            if json_schema {
                println!("{}", get_response_json_schema());
            } else {
                println!("Response Schema: {}", PROTOCOL_VERSION);
                println!();
                println!("- start_session:      {{ session_id }}");
                println!("- submit_measurement: {{ accepted, duplicate?, blink?, abandoned? }}");
                println!("- end_session:        {{ blink_sequence, session_duration, started_at, ended_at, ... }}");
                println!("- health:             {{ status, producer, version, active_session, stats }}");
                println!("- on failure:         {{ error: {{ code, message }} }}");
                println!();
                println!("Error codes: SESSION_ALREADY_ACTIVE, UNKNOWN_SESSION, SESSION_CLOSED, INVALID_MEASUREMENT");
            }
        }
    }

    Ok(())
}

fn get_request_json_schema() -> String {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": PROTOCOL_VERSION,
        "description": "BlinkTalk session request",
        "type": "object",
        "required": ["op"],
        "properties": {
            "op": {
                "type": "string",
                "enum": ["start_session", "submit_measurement", "end_session", "health"]
            },
            "session_id": { "type": "string" },
            "ear": { "type": "number" },
            "no_face": { "type": "boolean" },
            "frame_id": { "type": ["string", "integer"] }
        }
    })
    .to_string()
}

fn get_response_json_schema() -> String {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": PROTOCOL_VERSION,
        "description": "BlinkTalk session response",
        "type": "object",
        "properties": {
            "session_id": { "type": "string" },
            "accepted": { "type": "boolean" },
            "duplicate": { "type": "boolean" },
            "abandoned": { "type": "boolean" },
            "blink": {
                "type": "object",
                "properties": {
                    "duration_seconds": { "type": "number" },
                    "category": { "type": "string" }
                }
            },
            "blink_sequence": { "type": "string" },
            "session_duration": { "type": "number" },
            "error": {
                "type": "object",
                "properties": {
                    "code": { "type": "string" },
                    "message": { "type": "string" }
                }
            }
        }
    })
    .to_string()
}

// Error types

#[derive(Debug)]
enum BlinkCliError {
    Io(io::Error),
    Engine(blinktalk::BlinkError),
    Json(serde_json::Error),
    NoSamples,
    DoctorFailed,
    ParseError(String),
}

impl From<io::Error> for BlinkCliError {
    fn from(e: io::Error) -> Self {
        BlinkCliError::Io(e)
    }
}

impl From<blinktalk::BlinkError> for BlinkCliError {
    fn from(e: blinktalk::BlinkError) -> Self {
        BlinkCliError::Engine(e)
    }
}

impl From<serde_json::Error> for BlinkCliError {
    fn from(e: serde_json::Error) -> Self {
        BlinkCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<BlinkCliError> for CliError {
    fn from(e: BlinkCliError) -> Self {
        match e {
            BlinkCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            BlinkCliError::Engine(e) => CliError {
                code: e.code().to_string(),
                message: e.to_string(),
                hint: Some("Run 'blinktalk doctor' to check the configuration".to_string()),
            },
            BlinkCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            BlinkCliError::NoSamples => CliError {
                code: "NO_SAMPLES".to_string(),
                message: "No samples found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            BlinkCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            BlinkCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Each line must be {\"t\": secs, \"ear\": x} or {\"t\": secs, \"no_face\": true}".to_string()),
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
