//! Hub vision CLI tool
//!
//! Command-line interface for fetching hub models, inspecting the local
//! cache and running the preprocessing pipeline or a full classification
//! against a cached model.

use crate::backends::{BackendKind, DefaultBackendFactory};
use crate::config::LoadOptions;
use crate::error::{HubVisionError, Result};
use crate::hub::{HubClient, ModelCache, ProgressIndicator};
use crate::models::ImageClassifier;
use crate::processing::{ImageProcessor, PreprocessOptions, TensorFormat};
use crate::transforms::ChannelDimension;
use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use std::path::PathBuf;

/// Hub vision adapter CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "hubvision")]
pub struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging (-v: INFO, -vv: DEBUG, -vvv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Override the model cache directory
    #[arg(long, global = true, value_name = "DIR")]
    cache_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Download a model's config and weights into the cache
    Fetch {
        /// Hub model ID (e.g. "acme/vit-tiny")
        model_id: String,

        /// Git revision to fetch files from
        #[arg(long, default_value = "main")]
        revision: String,

        /// Re-download even when the model is already cached
        #[arg(long)]
        force: bool,

        /// Bearer token for gated or private repositories
        #[arg(long)]
        token: Option<String>,
    },

    /// List models in the local cache
    List,

    /// Run the preprocessing pipeline on an image and report tensor stats
    Preprocess {
        /// Hub model ID whose preprocessing recipe to use
        model_id: String,

        /// Input image file
        image: PathBuf,

        /// Never hit the network; fail on a cache miss
        #[arg(long)]
        offline: bool,

        /// Output channel layout
        #[arg(long, value_enum, default_value_t = CliChannelFormat::First)]
        data_format: CliChannelFormat,
    },

    /// Classify an image with a hub model
    Classify {
        /// Hub model ID
        model_id: String,

        /// Input image file
        image: PathBuf,

        /// Inference backend to run
        #[arg(long, value_enum, default_value_t = CliBackend::Onnx)]
        backend: CliBackend,

        /// Never hit the network; fail on a cache miss
        #[arg(long)]
        offline: bool,

        /// Number of top classes to print
        #[arg(long, default_value_t = 5)]
        top: usize,
    },
}

/// Channel layout choice exposed on the command line
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliChannelFormat {
    First,
    Last,
}

impl From<CliChannelFormat> for ChannelDimension {
    fn from(format: CliChannelFormat) -> Self {
        match format {
            CliChannelFormat::First => Self::First,
            CliChannelFormat::Last => Self::Last,
        }
    }
}

/// Backend choice exposed on the command line
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliBackend {
    Onnx,
    Tract,
}

impl From<CliBackend> for BackendKind {
    fn from(backend: CliBackend) -> Self {
        match backend {
            CliBackend::Onnx => Self::Onnx,
            CliBackend::Tract => Self::Tract,
        }
    }
}

/// CLI entry point
///
/// # Errors
/// Propagates hub, preprocessing and inference failures from the selected
/// subcommand.
pub async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Fetch {
            model_id,
            revision,
            force,
            token,
        } => {
            let mut options = LoadOptions::default()
                .with_revision(revision)
                .with_force_download(force);
            if let Some(dir) = cli.cache_dir {
                options = options.with_cache_dir(dir);
            }
            if let Some(token) = token {
                options = options.with_token(token);
            }
            fetch_model(&model_id, &options).await
        },
        Command::List => list_models(cli.cache_dir),
        Command::Preprocess {
            model_id,
            image,
            offline,
            data_format,
        } => {
            let mut options = LoadOptions::default().with_local_files_only(offline);
            if let Some(dir) = cli.cache_dir {
                options = options.with_cache_dir(dir);
            }
            preprocess_image(&model_id, &image, options, data_format.into()).await
        },
        Command::Classify {
            model_id,
            image,
            backend,
            offline,
            top,
        } => {
            let mut options = LoadOptions::default().with_local_files_only(offline);
            if let Some(dir) = cli.cache_dir {
                options = options.with_cache_dir(dir);
            }
            classify_image(&model_id, &image, options, backend.into(), top).await
        },
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("hubvision={level}")));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn fetch_model(model_id: &str, options: &LoadOptions) -> Result<()> {
    let client = HubClient::new(options)?;
    info!("Fetching '{model_id}' (revision {})", options.revision);

    let (_dict, model_dir) = client.load_config(model_id, options).await?;

    let progress = ProgressIndicator::new();
    progress.set_message(format!("Downloading weights for {model_id}"));
    client
        .ensure_model_file_with_progress(model_id, options, Some(&progress))
        .await?;
    progress.finish_with_message(format!("Fetched {model_id}"));

    println!("Model cached at {}", model_dir.display());
    Ok(())
}

fn list_models(cache_dir: Option<PathBuf>) -> Result<()> {
    let cache = match cache_dir {
        Some(dir) => ModelCache::with_dir(dir)?,
        None => ModelCache::new()?,
    };
    let models = cache.scan_cached_models()?;
    if models.is_empty() {
        println!("No cached models.");
        return Ok(());
    }

    for model in models {
        let weights = if model.has_weights { "weights" } else { "no weights" };
        let config = if model.has_config { "config" } else { "no config" };
        println!(
            "{}  ({config}, {weights}, {})",
            model.model_id,
            format_size(model.size_bytes)
        );
    }
    Ok(())
}

async fn preprocess_image(
    model_id: &str,
    image_path: &PathBuf,
    options: LoadOptions,
    data_format: ChannelDimension,
) -> Result<()> {
    let processor = ImageProcessor::from_pretrained(model_id, options).await?;
    let image = image::open(image_path)?;

    let preprocess_options = PreprocessOptions::default()
        .with_data_format(data_format)
        .with_return_tensors(TensorFormat::Ndarray);
    let batch = processor.preprocess_one(image, &preprocess_options)?;
    let tensor = batch
        .pixel_values
        .as_stacked()
        .ok_or_else(|| HubVisionError::internal("stacked tensor missing after preprocess"))?;

    let len = tensor.len() as f32;
    let mean = tensor.sum() / len;
    let min = tensor.iter().copied().fold(f32::INFINITY, f32::min);
    let max = tensor.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    println!("shape: {:?}", tensor.shape());
    println!("layout: {data_format}");
    println!("min: {min:.4}  max: {max:.4}  mean: {mean:.4}");
    Ok(())
}

async fn classify_image(
    model_id: &str,
    image_path: &PathBuf,
    options: LoadOptions,
    backend: BackendKind,
    top: usize,
) -> Result<()> {
    let processor = ImageProcessor::from_pretrained(model_id, options.clone()).await?;
    let mut model =
        ImageClassifier::from_pretrained(model_id, options, &DefaultBackendFactory, backend)
            .await?;

    let image = image::open(image_path)?;
    let preprocess_options =
        PreprocessOptions::default().with_return_tensors(TensorFormat::Ndarray);
    let batch = processor.preprocess_one(image, &preprocess_options)?;
    let pixel_values = batch
        .pixel_values
        .as_stacked()
        .ok_or_else(|| HubVisionError::internal("stacked tensor missing after preprocess"))?;

    let output = model.forward(Some(pixel_values), None)?;
    let logits = output.logits.row(0);

    // Softmax over the single row, then top-k report.
    let max_logit = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exp: Vec<f32> = logits.iter().map(|&x| (x - max_logit).exp()).collect();
    let denom: f32 = exp.iter().sum();

    let mut ranked: Vec<(usize, f32)> = exp
        .iter()
        .map(|&e| e / denom)
        .enumerate()
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    println!("Top {} classes for {}:", top.min(ranked.len()), image_path.display());
    for (class, probability) in ranked.into_iter().take(top) {
        println!("  class {class:>5}  p={probability:.4}");
    }
    Ok(())
}

/// Human-readable byte size
fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}
