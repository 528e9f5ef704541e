use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facegrade_core::{
    ComparisonResult, DescriptorTag, FaceLocator, HandcraftedExtractor, Metric, ModelProfile,
    OnnxEmbeddingExtractor, Pipeline, SsdFaceLocator, ThresholdBook,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

mod config;
mod engine;

use config::Config;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp", "tif", "tiff"];

#[derive(Parser)]
#[command(name = "facegrade", about = "Rate photos by face similarity to reference images")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rate images against one or more reference faces
    Rate {
        /// Reference face image (repeatable)
        #[arg(short, long = "benchmark", required = true)]
        benchmarks: Vec<PathBuf>,
        /// Images or directories to rate
        #[arg(required = true)]
        targets: Vec<PathBuf>,
        /// Extraction strategy: "handcrafted" or "embedding:<model>"
        #[arg(long, default_value = "handcrafted")]
        strategy: String,
        /// Similarity metric: cosine, euclidean, euclidean_l2, correlation
        #[arg(long, default_value = "cosine")]
        metric: Metric,
        /// Emit results as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Locate the face in a single image (diagnostics)
    Detect {
        /// Image to inspect
        image: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Commands::Rate {
            benchmarks,
            targets,
            strategy,
            metric,
            json,
        } => rate(&config, benchmarks, targets, &strategy, metric, json).await,
        Commands::Detect { image } => detect(&config, &image),
    }
}

async fn rate(
    config: &Config,
    benchmarks: Vec<PathBuf>,
    targets: Vec<PathBuf>,
    strategy: &str,
    metric: Metric,
    json: bool,
) -> Result<()> {
    let tag = DescriptorTag::parse(strategy)
        .with_context(|| format!("invalid strategy {strategy:?} (expected \"handcrafted\" or \"embedding:<model>\")"))?;

    let paths = collect_images(&targets)?;
    if paths.is_empty() {
        bail!("no images found under the given targets");
    }

    // Fail fast: load models before spawning the worker thread.
    let pipeline = build_pipeline(config, &tag, metric)?;

    let cancel = Arc::new(AtomicBool::new(false));
    let handle = engine::spawn_engine(pipeline, cancel.clone());

    // Ctrl-C requests cooperative cancellation; the batch finishes the
    // in-flight item and returns the partial results.
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("cancellation requested, finishing current item");
                cancel.store(true, Ordering::Relaxed);
            }
        });
    }

    let mut enrolled = 0usize;
    for path in &benchmarks {
        let label = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("benchmark-{}", enrolled + 1));
        if handle.add_benchmark(path.clone(), label).await? {
            enrolled += 1;
        } else {
            eprintln!("warning: no face found in reference image {}", path.display());
        }
    }
    if enrolled == 0 {
        bail!("none of the reference images contained a detectable face");
    }

    let (progress_tx, mut progress_rx) = mpsc::channel::<engine::ProgressEvent>(16);
    let printer = tokio::spawn(async move {
        while let Some(event) = progress_rx.recv().await {
            eprintln!("[{}/{}] {}", event.index, event.total, event.name);
        }
    });

    let results = handle.rate_batch(paths, progress_tx).await?;
    let _ = printer.await;

    if json {
        let by_path: std::collections::BTreeMap<String, &ComparisonResult> = results
            .iter()
            .map(|(path, result)| (path.display().to_string(), result))
            .collect();
        println!("{}", serde_json::to_string_pretty(&by_path)?);
    } else {
        for (path, result) in &results {
            match result {
                ComparisonResult::Rated(report) => println!(
                    "{} {:<40} sim {:.3}  best match: {}",
                    stars(report.rating),
                    path.display(),
                    report.best_similarity,
                    report.best_match
                ),
                ComparisonResult::Unrated(reason) => {
                    println!("{} {:<40} ({reason})", stars(0), path.display())
                }
            }
        }
    }

    Ok(())
}

fn detect(config: &Config, image_path: &Path) -> Result<()> {
    let mut locator = SsdFaceLocator::load(
        &config.detector_model_path(),
        config.confidence_threshold,
    )?;

    let image = image::open(image_path)
        .with_context(|| format!("failed to decode {}", image_path.display()))?;

    match locator.locate(&image)? {
        Some(region) => println!("{}", serde_json::to_string_pretty(&region)?),
        None => println!("no face detected"),
    }

    Ok(())
}

fn build_pipeline(config: &Config, tag: &DescriptorTag, metric: Metric) -> Result<Pipeline> {
    let locator = SsdFaceLocator::load(
        &config.detector_model_path(),
        config.confidence_threshold,
    )?;

    let extractor: Box<dyn facegrade_core::DescriptorExtractor + Send> = match tag {
        DescriptorTag::Handcrafted => Box::new(HandcraftedExtractor::new()),
        DescriptorTag::Embedding(model) => Box::new(OnnxEmbeddingExtractor::load(
            &config.embedding_model_path(model),
            ModelProfile::for_name(model),
        )?),
    };

    let thresholds = match &config.thresholds_path {
        Some(path) => {
            let doc = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read thresholds file {}", path.display()))?;
            ThresholdBook::from_toml_str(&doc)?
        }
        None => ThresholdBook::builtin(),
    };

    Ok(Pipeline::new(Box::new(locator), extractor, metric, thresholds))
}

/// Expand files and directories into a sorted list of image paths.
fn collect_images(targets: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();

    for target in targets {
        if target.is_dir() {
            for entry in std::fs::read_dir(target)
                .with_context(|| format!("failed to read directory {}", target.display()))?
            {
                let path = entry?.path();
                if path.is_file() && has_image_extension(&path) {
                    paths.push(path);
                }
            }
        } else {
            paths.push(target.clone());
        }
    }

    paths.sort();
    Ok(paths)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn stars(rating: u8) -> String {
    let filled = rating.min(5) as usize;
    format!("[{}{}]", "*".repeat(filled), " ".repeat(5 - filled))
}
