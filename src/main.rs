use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{ArgGroup, Parser};
use log::info;
use serde::Serialize;

use plate_reader::batch::{self, BatchEntry};
use plate_reader::debug::DebugOutput;
use plate_reader::{DetectionPipeline, DetectorConfig, ImageLocation, OcrsRecognizer};

#[derive(Parser)]
#[command(name = "plate-reader")]
#[command(about = "Read licence plate text from images")]
#[command(group(ArgGroup::new("input").required(true).args(["source", "dir"])))]
struct Cli {
    /// Image URL or file path
    #[arg(value_name = "SOURCE")]
    source: Option<String>,

    /// Process every .jpg/.jpeg/.png/.webp file in a directory
    #[arg(long, value_name = "DIR")]
    dir: Option<PathBuf>,

    /// TOML file overriding detector settings
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory containing the ocrs .rten models
    #[arg(long, value_name = "DIR")]
    models_dir: Option<PathBuf>,

    /// Save debug outputs to directory (must be empty)
    #[arg(long, value_name = "DIR")]
    debug_out: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Serialize)]
struct SingleReport<'a> {
    source: &'a str,
    text: Option<String>,
    confidence: f32,
}

#[derive(Serialize)]
struct BatchSummary<'a> {
    entries: &'a [BatchEntry],
    detections: usize,
    misses: usize,
    failures: usize,
    average_confidence: Option<f32>,
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let mut config = match &args.config {
        Some(path) => DetectorConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => DetectorConfig::default(),
    };
    if let Some(dir) = &args.models_dir {
        config.recognition.models_dir = Some(dir.clone());
    }

    let recognizer = OcrsRecognizer::from_config(&config.recognition)
        .context("initializing OCR engine")?;
    let mut pipeline = DetectionPipeline::new(config, Arc::new(recognizer))?;
    if let Some(dir) = args.debug_out {
        let debug_out = DebugOutput::new(dir)?;
        info!("Writing debug images to {}", debug_out.dir().display());
        pipeline = pipeline.with_debug(debug_out);
    }

    match (&args.dir, &args.source) {
        (Some(dir), _) => run_directory(&pipeline, dir, args.json),
        (None, Some(source)) => run_single(&pipeline, source, args.json),
        (None, None) => anyhow::bail!("either SOURCE or --dir is required"),
    }
}

fn run_single(pipeline: &DetectionPipeline, source: &str, json: bool) -> anyhow::Result<()> {
    let location = ImageLocation::parse(source);
    let result = pipeline
        .detect(&location)
        .with_context(|| format!("processing {}", location))?;
    let (text, confidence) = result.into_pair();

    if json {
        let report = SingleReport {
            source,
            text,
            confidence,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    match text {
        Some(text) => {
            println!("Detected Text: {}", text);
            println!("Confidence: {:.2}", confidence);
        }
        None => println!("No license plate detected"),
    }
    Ok(())
}

fn run_directory(pipeline: &DetectionPipeline, dir: &Path, json: bool) -> anyhow::Result<()> {
    let on_start = |path: &Path| {
        if !json {
            println!("\nProcessing {}...", path.display());
        }
    };
    let report = batch::run_batch(pipeline, dir, on_start, |entry| {
        if json {
            return;
        }
        match (&entry.text, &entry.error) {
            (_, Some(error)) => println!("Error processing {}: {}", entry.path.display(), error),
            (Some(text), None) => {
                println!("Detected Text: {}", text);
                println!("Confidence: {:.2}", entry.confidence);
            }
            (None, None) => println!("No license plate detected"),
        }
    })
    .with_context(|| format!("scanning {}", dir.display()))?;

    if json {
        let summary = BatchSummary {
            entries: &report.entries,
            detections: report.detections(),
            misses: report.misses(),
            failures: report.failures(),
            average_confidence: report.average_confidence(),
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    match report.average_confidence() {
        Some(avg) => println!(
            "\nAverage Confidence: {:.2} over {} detections",
            avg,
            report.detections()
        ),
        None => println!("\nNo valid license plates detected in any image."),
    }
    println!(
        "Files without detection: {}, failed: {}",
        report.misses(),
        report.failures()
    );
    Ok(())
}
