use anyhow::{bail, Context as AnyhowContext, Result};
use clap::Parser;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use indicatif::ProgressStyle;
use tracing::info_span;
use tracing::Span;
use tracing_indicatif::span_ext::IndicatifSpanExt;
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::{filter::LevelFilter, prelude::*};

use satori_rust::config::TrackerConfig;
use satori_rust::dataset::*;
use satori_rust::pipeline::Satori;
use satori_rust::visualization::{save_png, visualize_report};

/// Visually track a moving object without user input using optical flow and
/// color-based motion segmentation.
#[derive(Parser)]
#[clap(name = "satori")]
pub struct Args {
    /// Directory of input frames
    #[clap(short, default_value = "images")]
    pub input_folder: PathBuf,

    /// Extension of the frames to read
    #[clap(short, default_value = "png")]
    pub file_format: String,

    /// Directory for annotated frames, nothing is written without it
    #[clap(short, long)]
    pub output_folder: Option<PathBuf>,

    /// JSON lines file receiving one report per frame
    #[clap(long)]
    pub report: Option<PathBuf>,

    /// JSON file with tracker options, replaces the option flags below
    #[clap(long = "config")]
    pub config_file: Option<PathBuf>,

    /// Stamp frames at this rate instead of the wall clock
    #[clap(long)]
    pub fps: Option<f64>,

    /// Only print warnings and errors
    #[clap(short, long)]
    pub silent: bool,

    #[clap(flatten)]
    pub config: TrackerConfig,
}

fn load_config(args: &Args) -> Result<TrackerConfig> {
    let Some(path) = &args.config_file else {
        return Ok(args.config.clone());
    };
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let config = serde_json::from_reader(file)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(config)
}

fn create_output_folder(path: &Path) -> Result<()> {
    if path.exists() && !path.is_dir() {
        bail!("Invalid output directory {}", path.display());
    }
    std::fs::create_dir_all(path).with_context(|| format!("Failed to create {}", path.display()))
}

fn main() -> Result<()> {
    let args = Args::parse();

    // setup logging
    let level = if args.silent {
        LevelFilter::WARN
    } else {
        LevelFilter::INFO
    };
    let indicatif_layer = IndicatifLayer::new();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(indicatif_layer.get_stdout_writer())
                .with_filter(level),
        )
        .with(indicatif_layer)
        .init();

    let config = load_config(&args)?;
    let mut satori = Satori::new(&config)?;

    if let Some(fps) = args.fps {
        if fps <= 0. {
            bail!("fps must be positive, got {fps}");
        }
    }
    if let Some(folder) = &args.output_folder {
        create_output_folder(folder)?;
    }
    let mut report_writer = match &args.report {
        Some(path) => Some(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => None,
    };

    // load dataset
    let mut dataset = Dataset::new(&args.input_folder, &args.file_format)?;
    if dataset.length == 0 {
        bail!("No images to process in {}", args.input_folder.display());
    }

    let header_span = info_span!("header");
    header_span.pb_set_style(&ProgressStyle::default_bar());
    header_span.pb_set_length(dataset.length);
    let header_span_enter = header_span.enter();

    while let Some(input) = dataset.next()? {
        let report = match args.fps {
            Some(fps) => satori.process_at(&input.frame, input.index as f64 / fps),
            None => satori.process(&input.frame),
        }
        .with_context(|| format!("Failed to process {}", input.path.display()))?;

        if let Some(writer) = report_writer.as_mut() {
            serde_json::to_writer(&mut *writer, &report)?;
            writeln!(writer)?;
        }
        if let Some(folder) = &args.output_folder {
            let annotated = visualize_report(&input.frame, &report);
            save_png(&annotated, &folder.join(format!("{:03}.png", input.index)))?;
        }

        Span::current().pb_inc(1);
    }

    if let Some(mut writer) = report_writer {
        writer.flush()?;
    }

    std::mem::drop(header_span_enter);
    std::mem::drop(header_span);

    Ok(())
}
