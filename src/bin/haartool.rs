use clap::{Parser, Subcommand};
use haar_cascade::tools::{annotate, cascade_summary, detection_report, gray_stats, load_gray};
use haar_cascade::{CascadeModel, Detection, Detector, DetectorConfig, PixelBuffer, face_tiles};
use image::GrayImage;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "haartool", version, about = "Haar cascade detection tools")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct SearchArgs {
    /// Grayscale or color image to scan
    #[arg(long)]
    image: PathBuf,
    /// OpenCV cascade XML
    #[arg(long)]
    cascade: PathBuf,
    /// Growth factor between window sizes
    #[arg(long, default_value_t = 1.1)]
    scale_factor: f64,
    /// Hits a group needs to be reported
    #[arg(long, default_value_t = 5)]
    min_neighbors: u32,
    #[arg(long, default_value_t = 30)]
    min_size: u32,
    #[arg(long)]
    max_size: Option<u32>,
    /// Stride as a fraction of the window width
    #[arg(long, default_value_t = 0.1)]
    step_ratio: f64,
}

impl SearchArgs {
    fn config(&self) -> DetectorConfig {
        let config = DetectorConfig::default()
            .with_scale_factor(self.scale_factor)
            .with_min_neighbors(self.min_neighbors)
            .with_min_size(self.min_size)
            .with_step_ratio(self.step_ratio);
        match self.max_size {
            Some(max) => config.with_max_size(max),
            None => config,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Run detection on a single image
    Detect {
        #[command(flatten)]
        args: SearchArgs,
        /// Print a JSON report instead of text
        #[arg(long)]
        json: bool,
        /// Write a copy of the image with detections outlined
        #[arg(long)]
        annotate: Option<PathBuf>,
    },
    /// Report which cells of a grid hold detections
    Tiles {
        #[command(flatten)]
        args: SearchArgs,
        #[arg(long, default_value_t = 8)]
        grid: u32,
    },
    /// Print the shape of a cascade file
    Inspect {
        #[arg(long)]
        cascade: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let outcome = match cli.command {
        Command::Detect {
            args,
            json,
            annotate,
        } => detect_cmd(&args, json, annotate.as_deref()),
        Command::Tiles { args, grid } => tiles_cmd(&args, grid),
        Command::Inspect { cascade } => inspect_cmd(&cascade),
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{}", message);
            ExitCode::FAILURE
        }
    }
}

fn load_inputs(args: &SearchArgs) -> Result<(CascadeModel, GrayImage), String> {
    let model = CascadeModel::from_path(&args.cascade)
        .map_err(|e| format!("Failed to load cascade {}: {}", args.cascade.display(), e))?;
    let image = load_gray(&args.image)
        .map_err(|e| format!("Failed to load image {}: {}", args.image.display(), e))?;
    Ok((model, image))
}

fn run_detection(args: &SearchArgs) -> Result<(GrayImage, Vec<Detection>), String> {
    let (model, image) = load_inputs(args)?;
    let detector = Detector::with_config(args.config());
    let detections = detector
        .detect_image(&model, &image)
        .map_err(|e| format!("Detection failed: {}", e))?;
    Ok((image, detections))
}

fn detect_cmd(args: &SearchArgs, json: bool, annotate_to: Option<&Path>) -> Result<(), String> {
    let (model, image) = load_inputs(args)?;
    let detector = Detector::with_config(args.config());
    let pixels = PixelBuffer::from(&image);
    let start = Instant::now();
    let (detections, telemetry) = detector
        .detect_with_telemetry(&model, &pixels)
        .map_err(|e| format!("Detection failed: {}", e))?;
    let elapsed = start.elapsed();

    if let Some(out) = annotate_to {
        annotate(&image, &detections)
            .save(out)
            .map_err(|e| format!("Failed to write {}: {}", out.display(), e))?;
    }

    if json {
        let report = detection_report(image.width(), image.height(), &detections, &[]);
        println!("{}", report);
        return Ok(());
    }

    let stats = gray_stats(image.as_raw());
    println!(
        "Image: {} ({}x{}), grayscale range {}-{}, average {}",
        args.image.display(),
        image.width(),
        image.height(),
        stats.min,
        stats.max,
        stats.avg
    );
    println!(
        "Scanned {} windows over {} scales in {:.1} ms, {} accepted",
        telemetry.windows,
        telemetry.scales,
        elapsed.as_secs_f64() * 1000.0,
        telemetry.accepted
    );
    println!("Found {} detections", detections.len());
    for (i, d) in detections.iter().enumerate() {
        println!(
            "  Detection {}: x={} y={} w={} h={} hits={}",
            i, d.x, d.y, d.width, d.height, d.hit_count
        );
    }
    Ok(())
}

fn tiles_cmd(args: &SearchArgs, grid: u32) -> Result<(), String> {
    let (image, detections) = run_detection(args)?;
    let tiles = face_tiles(&detections, image.width(), image.height(), grid)
        .map_err(|e| format!("Tile mapping failed: {}", e))?;
    let report = detection_report(image.width(), image.height(), &detections, &tiles);
    println!("{}", report);
    Ok(())
}

fn inspect_cmd(cascade: &Path) -> Result<(), String> {
    let model = CascadeModel::from_path(cascade)
        .map_err(|e| format!("Failed to load cascade {}: {}", cascade.display(), e))?;
    let summary = cascade_summary(&model);
    let pretty = serde_json::to_string_pretty(&summary).map_err(|e| e.to_string())?;
    println!("{}", pretty);
    Ok(())
}
