//! CLI entry point for the VSL fundamental-diagram tool.
//!
//! Provides subcommands for inspecting a detector CSV, classifying its
//! points against activation/deactivation thresholds, emitting the region
//! overlays, animating through the points, and submitting survey responses.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use clap::{Args, Parser, Subcommand};
use std::ffi::OsStr;
use std::path::Path;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use vsl_diagram::{
    classify::classify,
    config::{AnimationSpeed, ClassifierConfig, LogicMode},
    diagram::Diagram,
    fetch::{BasicClient, is_remote, read_source},
    loader::{ColumnMapping, Extraction, RowFilter, Table, parse_datetime},
    output::{append_points, point_rows, print_json, print_pretty},
    region::build_regions,
    session::SessionState,
    survey::{
        Answers, Survey,
        s3::S3ResponseStore,
        store::{LocalCsvStore, ResponseStore, SubmitOutcome, submit},
    },
};

#[derive(Parser)]
#[command(name = "vsl_diagram")]
#[command(about = "Speed-occupancy fundamental diagram with VSL activation thresholds", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the headers of a CSV and the columns that would be picked by default
    Columns {
        /// Path to file or URL to fetch
        #[arg(value_name = "FILE_OR_URL")]
        source: String,
    },
    /// Classify every point of a CSV and print the diagram as JSON
    Classify {
        #[command(flatten)]
        data: DataArgs,

        #[command(flatten)]
        thresholds: ThresholdArgs,

        /// CSV file to append classified points to
        #[arg(short, long)]
        output: Option<String>,

        /// Write the diagram JSON to this file instead of logging it
        #[arg(long)]
        diagram: Option<String>,
    },
    /// Print the activation/deactivation region polygons as JSON
    Regions {
        #[command(flatten)]
        thresholds: ThresholdArgs,
    },
    /// Step through the points one at a time, as the Play control does
    Animate {
        #[command(flatten)]
        data: DataArgs,

        #[command(flatten)]
        thresholds: ThresholdArgs,

        /// Seconds between points (0.1 - 5.0)
        #[arg(short = 's', long, default_value_t = 0.5)]
        speed: f64,
    },
    /// Validate survey answers and append them to the response store
    Survey {
        /// Survey definition (JSON)
        #[arg(long)]
        schema: String,

        /// Answers keyed by question id (JSON)
        #[arg(long)]
        answers: String,

        /// S3 bucket holding the shared responses file
        #[arg(long, env = "SURVEY_S3_BUCKET")]
        s3_bucket: Option<String>,

        /// Object key of the shared responses file
        #[arg(long, default_value = "survey/responses.csv")]
        s3_key: String,

        /// Local CSV used when the bucket is unset or unreachable
        #[arg(long, default_value = "responses.csv")]
        fallback: String,
    },
}

#[derive(Args)]
struct DataArgs {
    /// Path to file or URL to fetch
    #[arg(value_name = "FILE_OR_URL")]
    source: String,

    /// DateTime column (default: first header containing "time" or "date")
    #[arg(long)]
    datetime_col: Option<String>,

    /// Speed column (default: first header containing "speed")
    #[arg(long)]
    speed_col: Option<String>,

    /// Occupancy column (default: first header containing "occup")
    #[arg(long)]
    occupancy_col: Option<String>,

    /// Flow column; pass "none" to ignore a guessed one
    #[arg(long)]
    flow_col: Option<String>,

    /// Detector column; pass "none" to ignore a guessed one
    #[arg(long)]
    detector_col: Option<String>,

    /// Only keep rows from this detector
    #[arg(long)]
    detector: Option<String>,

    /// Start of the date range (default: earliest in data)
    #[arg(long, value_parser = parse_bound)]
    start: Option<NaiveDateTime>,

    /// End of the date range (default: latest in data)
    #[arg(long, value_parser = parse_bound)]
    end: Option<NaiveDateTime>,
}

#[derive(Args)]
struct ThresholdArgs {
    /// JSON threshold file; flags below override its values
    #[arg(long)]
    config: Option<String>,

    /// Activation speed (km/h, 0-80)
    #[arg(long)]
    activation_speed: Option<f64>,

    /// Activation occupancy (%, 0-50)
    #[arg(long)]
    activation_occupancy: Option<f64>,

    /// Deactivation speed (km/h, 0-80)
    #[arg(long)]
    deactivation_speed: Option<f64>,

    /// Deactivation occupancy (%, 0-50)
    #[arg(long)]
    deactivation_occupancy: Option<f64>,

    /// AND: both conditions must be met; OR: either condition must be met
    #[arg(long)]
    activation_logic: Option<LogicMode>,

    /// AND: both conditions must be met; OR: either condition must be met
    #[arg(long)]
    deactivation_logic: Option<LogicMode>,

    /// Consecutive activating intervals before full activation
    #[arg(long)]
    consecutive_intervals: Option<u32>,
}

fn parse_bound(value: &str) -> Result<NaiveDateTime, String> {
    parse_datetime(value).ok_or_else(|| format!("unrecognised datetime '{value}'"))
}

impl ThresholdArgs {
    fn resolve(&self) -> Result<ClassifierConfig> {
        let mut config = match &self.config {
            Some(path) => ClassifierConfig::load(path)?,
            None => ClassifierConfig::default(),
        };

        if let Some(v) = self.activation_speed {
            config.activation.speed = v;
        }
        if let Some(v) = self.activation_occupancy {
            config.activation.occupancy = v;
        }
        if let Some(v) = self.deactivation_speed {
            config.deactivation.speed = v;
        }
        if let Some(v) = self.deactivation_occupancy {
            config.deactivation.occupancy = v;
        }
        if let Some(v) = self.activation_logic {
            config.activation_logic = v;
        }
        if let Some(v) = self.deactivation_logic {
            config.deactivation_logic = v;
        }
        if let Some(v) = self.consecutive_intervals {
            config.consecutive_intervals = v;
        }

        config.validate()?;
        debug!(?config, "Threshold configuration resolved");
        Ok(config)
    }
}

fn optional_column(arg: &Option<String>, guessed: Option<String>) -> Option<String> {
    match arg.as_deref() {
        Some(v) if v.eq_ignore_ascii_case("none") => None,
        Some(v) => Some(v.to_string()),
        None => guessed,
    }
}

impl DataArgs {
    fn mapping(&self, table: &Table) -> Result<ColumnMapping> {
        let guessed = ColumnMapping::guess(table.headers())?;
        Ok(ColumnMapping {
            datetime: self.datetime_col.clone().unwrap_or(guessed.datetime),
            speed: self.speed_col.clone().unwrap_or(guessed.speed),
            occupancy: self.occupancy_col.clone().unwrap_or(guessed.occupancy),
            flow: optional_column(&self.flow_col, guessed.flow),
            detector: optional_column(&self.detector_col, guessed.detector),
        })
    }

    fn filter(&self) -> RowFilter {
        RowFilter {
            start: self.start,
            end: self.end,
            detector: self.detector.clone(),
        }
    }

    /// Loads the source table and extracts the selected records.
    async fn extract(&self) -> Result<Extraction> {
        let table = load_table(&self.source).await?;
        let mapping = self.mapping(&table)?;
        info!(
            datetime = %mapping.datetime,
            speed = %mapping.speed,
            occupancy = %mapping.occupancy,
            flow = ?mapping.flow,
            detector = ?mapping.detector,
            "Column selection"
        );

        let extraction = table.extract(&mapping, &self.filter())?;
        for warning in &extraction.warnings {
            warn!("{warning}");
        }
        for rejected in &extraction.rejected {
            warn!(error = %rejected, "Record excluded");
        }
        info!(
            records = extraction.records.len(),
            dropped_datetime = extraction.dropped_datetime,
            rejected = extraction.rejected.len(),
            "Records extracted"
        );
        Ok(extraction)
    }
}

async fn load_table(source: &str) -> Result<Table> {
    let table = if is_remote(source) {
        let client = BasicClient::new()?;
        let bytes = read_source(&client, source).await?;
        Table::from_bytes(&bytes)
    } else {
        Table::from_path(source)
    };
    table.with_context(|| format!("error loading file '{source}'"))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/vsl_diagram.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("vsl_diagram.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    let result = run(cli.command).await;
    if let Err(e) = &result {
        error!("Command failed: {e:#}");
    }
    result
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Columns { source } => {
            let table = load_table(&source).await?;
            let mapping = ColumnMapping::guess(table.headers())?;

            info!(headers = ?table.headers(), rows = table.len(), "Table loaded");
            print_json(&mapping)?;

            if let Some((min, max)) = table.datetime_bounds(&mapping)? {
                info!(start = %min, end = %max, "Datetime range");
            }
            if let Some(column) = &mapping.detector {
                let detectors = table.detectors(column)?;
                info!(column = %column, count = detectors.len(), ?detectors, "Detectors");
            }
        }
        Commands::Classify {
            data,
            thresholds,
            output,
            diagram,
        } => {
            let config = thresholds.resolve()?;
            let extraction = data.extract().await?;
            let records = &extraction.records;

            let classification = classify(records, &config);
            print_pretty(&classification);
            let counts = classification.counts();
            info!(
                points = classification.points.len(),
                none = counts.none,
                partial = counts.partial_activation,
                full = counts.full_activation,
                deactivation = counts.deactivation,
                max_streak = classification.max_streak(),
                "Classification complete"
            );

            if let Some(path) = output {
                append_points(&path, &point_rows(records, &classification))?;
                info!(path = %path, "Classified points written");
            }

            let current = records.len().checked_sub(1);
            let payload = Diagram::build(records, &config, current);
            match diagram {
                Some(path) => {
                    std::fs::write(&path, serde_json::to_vec_pretty(&payload)?)
                        .with_context(|| format!("failed to write diagram '{path}'"))?;
                    info!(path = %path, "Diagram written");
                }
                None => print_json(&payload)?,
            }
        }
        Commands::Regions { thresholds } => {
            let config = thresholds.resolve()?;
            print_json(&build_regions(&config))?;
        }
        Commands::Animate {
            data,
            thresholds,
            speed,
        } => {
            let config = thresholds.resolve()?;
            let speed = AnimationSpeed::new(speed)?;
            let extraction = data.extract().await?;
            animate(SessionState::new(extraction.records).with_animation_speed(speed), &config)
                .await;
        }
        Commands::Survey {
            schema,
            answers,
            s3_bucket,
            s3_key,
            fallback,
        } => {
            let survey = Survey::load(&schema)?;
            let content = std::fs::read_to_string(&answers)
                .with_context(|| format!("failed to read answers '{answers}'"))?;
            let answers: Answers = serde_json::from_str(&content)
                .with_context(|| format!("failed to parse answers '{answers}'"))?;
            let response = survey.assemble(&answers)?;
            info!(survey = %survey.title, columns = response.columns.len(), "Response assembled");

            let local = LocalCsvStore::new(&fallback);
            let outcome = match s3_bucket.filter(|b| !b.is_empty()) {
                Some(bucket) => {
                    let remote = S3ResponseStore::from_env(&bucket, &s3_key).await;
                    submit(&remote, &local, &response).await?
                }
                None => {
                    info!("S3 bucket not specified, writing response locally");
                    local.append(&response).await?;
                    SubmitOutcome::Stored {
                        location: local.location(),
                    }
                }
            };

            match outcome {
                SubmitOutcome::Stored { location } => {
                    info!(location = %location, "Response saved");
                }
                SubmitOutcome::FellBack { location, reason } => {
                    warn!(location = %location, reason = %reason, "Response saved to local fallback");
                }
            }
        }
    }

    Ok(())
}

/// Plays the session from the first point until the last one, or until
/// Ctrl-C is pressed.
#[tracing::instrument(skip_all, fields(records = session.records().len()))]
async fn animate(mut session: SessionState, config: &ClassifierConfig) {
    session.toggle_play();

    loop {
        let frame = session.frame(config);
        match frame.points.last() {
            Some(point) => info!(
                position = %session.position_label(),
                occupancy = point.occupancy,
                speed = point.speed,
                state = ?point.state,
                activating = point.state.is_activating(),
                streak = point.streak,
                colour = point.colour,
                "Frame"
            ),
            None => info!(position = %session.position_label(), "Frame"),
        }

        if !session.is_playing() {
            break;
        }
        if session.at_last() {
            session = session.advance();
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(session.delay()) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Playback stopped");
                session.toggle_play();
                break;
            }
        }
        session = session.advance();
    }

    info!(position = %session.position_label(), "Playback finished");
}
