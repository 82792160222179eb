//! Command-line front end.
//!
//! Usage:
//!   platetrack track --detections dets.jsonl --output test.csv [--interpolated test_interpolated.csv]
//!   platetrack interpolate --input test.csv --output test_interpolated.csv

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use platetrack_rs::persist::{CsvResultWriter, read_csv_path, write_csv_path};
use platetrack_rs::{
    FrameResult, FrameResults, PipelineConfig, PlatePipeline, Recording, ResultSink, interpolate_gaps,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "platetrack")]
#[command(about = "Track vehicles and attach license plate readings", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline over recorded detections and write per-frame results
    Track {
        /// JSON Lines file with per-frame vehicle and plate detections
        #[arg(long)]
        detections: PathBuf,

        /// Result CSV
        #[arg(long, default_value = "test.csv")]
        output: PathBuf,

        /// Also write a gap-filled copy of the results here
        #[arg(long)]
        interpolated: Option<PathBuf>,

        /// Pipeline configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Overrides the tracker's max_age
        #[arg(long)]
        max_age: Option<u32>,

        /// Overrides the tracker's min_hits
        #[arg(long)]
        min_hits: Option<u32>,

        /// Overrides the tracker's IoU threshold
        #[arg(long)]
        iou_threshold: Option<f32>,

        /// Record tracked vehicles without an associated plate
        #[arg(long)]
        record_unplated: bool,
    },

    /// Fill per-vehicle gaps in an existing result CSV
    Interpolate {
        /// Result CSV to read
        #[arg(long, default_value = "test.csv")]
        input: PathBuf,

        /// Gap-filled CSV to write
        #[arg(long, default_value = "test_interpolated.csv")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("platetrack=info,platetrack_rs=info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Track {
            detections,
            output,
            interpolated,
            config,
            max_age,
            min_hits,
            iou_threshold,
            record_unplated,
        } => {
            let mut config = match config {
                Some(path) => PipelineConfig::from_json_file(&path)
                    .with_context(|| format!("loading config {}", path.display()))?,
                None => PipelineConfig::default(),
            };
            if let Some(v) = max_age {
                config.tracker.max_age = v;
            }
            if let Some(v) = min_hits {
                config.tracker.min_hits = v;
            }
            if let Some(v) = iou_threshold {
                config.tracker.iou_threshold = v;
            }
            config.record_unplated_vehicles |= record_unplated;

            track(&detections, &output, interpolated.as_deref(), config)
        }
        Commands::Interpolate { input, output } => interpolate(&input, &output),
    }
}

fn track(
    detections: &Path,
    output: &Path,
    interpolated: Option<&Path>,
    config: PipelineConfig,
) -> Result<()> {
    let recording = Recording::from_path(detections)
        .with_context(|| format!("loading detections {}", detections.display()))?;
    let (vehicles, plates, mut frames) = recording.into_sources();
    let mut pipeline = PlatePipeline::new(vehicles, plates, config).context("invalid configuration")?;

    let abort = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&abort);
    ctrlc::set_handler(move || handler_flag.store(true, Ordering::SeqCst))
        .context("installing interrupt handler")?;

    let mut writer = CsvResultWriter::create(output)
        .with_context(|| format!("creating {}", output.display()))?;

    match interpolated {
        None => {
            let summary = pipeline.run(&mut frames, &mut writer, &abort)?;
            info!(path = %output.display(), rows = writer.rows(), frames = summary.frames, "wrote results");
        }
        Some(interpolated) => {
            // Keep everything in memory too, for the gap-filling pass.
            let mut results = FrameResults::new();
            let mut tee = Tee {
                csv: &mut writer,
                memory: &mut results,
            };
            let summary = pipeline.run(&mut frames, &mut tee, &abort)?;
            info!(path = %output.display(), rows = writer.rows(), frames = summary.frames, "wrote results");

            let filled = interpolate_gaps(&results);
            write_csv_path(&filled, interpolated)
                .with_context(|| format!("writing {}", interpolated.display()))?;
            log_best_readings(&filled);
        }
    }
    Ok(())
}

fn interpolate(input: &Path, output: &Path) -> Result<()> {
    let results =
        read_csv_path(input).with_context(|| format!("reading {}", input.display()))?;
    let filled = interpolate_gaps(&results);
    write_csv_path(&filled, output).with_context(|| format!("writing {}", output.display()))?;
    log_best_readings(&filled);
    Ok(())
}

fn log_best_readings(results: &FrameResults) {
    for (vehicle_id, best) in results.best_readings() {
        info!(
            vehicle_id,
            text = %best.text,
            score = best.text_score,
            frame = best.frame,
            "best plate reading"
        );
    }
}

struct Tee<'a, A, B> {
    csv: &'a mut A,
    memory: &'a mut B,
}

impl<A: ResultSink, B: ResultSink> ResultSink for Tee<'_, A, B> {
    fn append(&mut self, result: FrameResult) -> platetrack_rs::Result<()> {
        self.csv.append(result.clone())?;
        self.memory.append(result)
    }

    fn flush(&mut self) -> platetrack_rs::Result<()> {
        self.csv.flush()?;
        self.memory.flush()
    }
}
