#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # hubvision
//!
//! Adapter library for hub-hosted pretrained vision backbones. Exposes the
//! generic interface contemporary ML pipelines expect (a translated model
//! config, an image processor and task-level model wrappers) over backbone
//! repositories that describe themselves with their own config dialect and
//! ship ONNX-exported weights.
//!
//! ## Features
//!
//! - **Config translation**: registry dicts (`num_classes`, `input_size`,
//!   `hf_hub_id`, ...) become a generic [`ModelConfig`] with untranslated
//!   fields preserved in `extra`
//! - **Preprocessing**: resize, rescale, normalize and channel-layout
//!   conversion with per-call overrides, matching the hub's preprocessing
//!   recipes ([`ImageProcessor`])
//! - **Model wrappers**: [`VisionBackbone`] for feature extraction and
//!   [`ImageClassifier`] with regression / single-label / multi-label loss
//!   selection
//! - **Multiple backends**: ONNX Runtime (feature `onnx`) and pure-Rust
//!   Tract (feature `tract`), selected at runtime through
//!   [`DefaultBackendFactory`]
//! - **Hub caching**: async downloads into an XDG-compliant cache with
//!   offline mode, forced refresh, revisions and token auth
//! - **CLI Integration**: optional command-line interface (enable with the
//!   `cli` feature)
//!
//! ## Quick Start
//!
//! ```no_run
//! use hubvision::{
//!     BackendKind, DefaultBackendFactory, ImageClassifier, ImageProcessor, LoadOptions,
//!     PreprocessOptions, TensorFormat,
//! };
//!
//! #[tokio::main]
//! async fn main() -> hubvision::Result<()> {
//!     let options = LoadOptions::default();
//!     let processor = ImageProcessor::from_pretrained("acme/vit-tiny", options.clone()).await?;
//!     let mut model = ImageClassifier::from_pretrained(
//!         "acme/vit-tiny",
//!         options,
//!         &DefaultBackendFactory,
//!         BackendKind::Onnx,
//!     )
//!     .await?;
//!
//!     let image = image::open("cat.jpg")?;
//!     let options = PreprocessOptions::default().with_return_tensors(TensorFormat::Ndarray);
//!     let batch = processor.preprocess(vec![image.into()], &options)?;
//!     let pixel_values = batch.pixel_values.as_stacked().expect("stacked batch");
//!     let output = model.forward(Some(pixel_values), None)?;
//!     println!("logits: {:?}", output.logits);
//!     Ok(())
//! }
//! ```

pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod hub;
pub mod loss;
pub mod models;
pub mod processing;
pub mod transforms;

// Re-export main types for convenience
pub use backends::{BackendFactory, BackendKind, Backbone, DefaultBackendFactory};
pub use config::{LoadOptions, ModelConfig, ProblemType};
pub use error::{HubVisionError, Result};
pub use hub::{CachedModelInfo, HubClient, ModelCache, ProgressIndicator};
pub use loss::{bce_with_logits_loss, cross_entropy_loss, mse_loss};
pub use models::{
    BaseModelOutput, ImageClassifier, ImageClassifierOutput, Labels, VisionBackbone,
};
pub use processing::{
    BatchFeature, ImageInput, ImageProcessor, PixelValues, PreprocessOptions, Size, TensorFormat,
};
pub use transforms::{
    infer_channel_dimension, normalize, rescale, resize, to_channel_dimension_format,
    ChannelDimension, IMAGENET_DEFAULT_MEAN, IMAGENET_DEFAULT_STD, IMAGENET_STANDARD_MEAN,
    IMAGENET_STANDARD_STD,
};
