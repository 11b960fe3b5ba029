//! End-to-end workflow tests against a seeded local cache
//!
//! These tests exercise the public API the way an application would: seed a
//! model config into a temporary cache, build the processor and config from
//! it in offline mode, run the preprocessing pipeline and feed the result
//! through a classifier backed by a fixed-logits test backbone.

use hubvision::{
    Backbone, ChannelDimension, ImageClassifier, ImageProcessor, Labels, LoadOptions, ModelCache,
    ModelConfig, PreprocessOptions, ProblemType, TensorFormat,
};
use image::{DynamicImage, ImageBuffer, Rgb};
use ndarray::{arr1, array, Array, Array2, Array4, Axis};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

/// Test backbone returning the same logits row for every example
struct FixedLogits {
    logits: Vec<f32>,
    initialized: bool,
}

impl FixedLogits {
    fn new(logits: Vec<f32>) -> Self {
        Self {
            logits,
            initialized: true,
        }
    }
}

impl Backbone for FixedLogits {
    fn initialize(
        &mut self,
        _config: &ModelConfig,
        _model_dir: &Path,
    ) -> hubvision::Result<Option<Duration>> {
        self.initialized = true;
        Ok(None)
    }

    fn infer(&mut self, pixel_values: &Array4<f32>) -> hubvision::Result<Array2<f32>> {
        let batch = pixel_values.len_of(Axis(0));
        Ok(Array2::from_shape_fn(
            (batch, self.logits.len()),
            |(_, col)| self.logits[col],
        ))
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

fn seed_config(cache_root: &Path, model_id: &str, config: &Value) {
    let cache = ModelCache::with_dir(cache_root.to_path_buf()).expect("cache");
    let model_dir = cache.model_path(model_id);
    fs::create_dir_all(&model_dir).expect("model dir");
    fs::write(
        model_dir.join("config.json"),
        serde_json::to_string_pretty(config).expect("serialize config"),
    )
    .expect("write config");
}

fn offline_options(cache_root: &Path) -> LoadOptions {
    LoadOptions::default()
        .with_cache_dir(cache_root)
        .with_local_files_only(true)
}

fn red_image(width: u32, height: u32) -> DynamicImage {
    let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
        ImageBuffer::from_pixel(width, height, Rgb([255, 0, 0]));
    DynamicImage::ImageRgb8(img)
}

fn vit_tiny_config() -> Value {
    json!({
        "architecture": "vit_tiny_patch16_224",
        "num_classes": 3,
        "input_size": [3, 32, 32],
        "hf_hub_id": "acme/vit-tiny",
        "mean": [0.5, 0.5, 0.5],
        "std": [0.5, 0.5, 0.5]
    })
}

#[tokio::test]
async fn test_config_and_processor_from_seeded_cache() {
    let cache = TempDir::new().unwrap();
    seed_config(cache.path(), "acme/vit-tiny", &vit_tiny_config());
    let options = offline_options(cache.path());

    let config = ModelConfig::from_pretrained("acme/vit-tiny", options.clone())
        .await
        .expect("config from cache");
    assert_eq!(config.num_labels, 3);
    assert_eq!(config.image_size, 32);
    assert_eq!(config.hf_hub_id, "acme/vit-tiny");
    assert!(config.problem_type.is_none());

    let processor = ImageProcessor::from_pretrained("acme/vit-tiny", options)
        .await
        .expect("processor from cache");
    assert_eq!(processor.size.map(|s| s.height), Some(32));
    assert_eq!(processor.image_mean, Some(vec![0.5, 0.5, 0.5]));
}

#[tokio::test]
async fn test_preprocess_then_classify_workflow() {
    let cache = TempDir::new().unwrap();
    seed_config(cache.path(), "acme/vit-tiny", &vit_tiny_config());
    let options = offline_options(cache.path());

    let processor = ImageProcessor::from_pretrained("acme/vit-tiny", options.clone())
        .await
        .unwrap();
    let config = ModelConfig::from_pretrained("acme/vit-tiny", options)
        .await
        .unwrap();

    let preprocess_options =
        PreprocessOptions::default().with_return_tensors(TensorFormat::Ndarray);
    let batch = processor
        .preprocess(
            vec![red_image(64, 64).into(), red_image(16, 48).into()],
            &preprocess_options,
        )
        .unwrap();
    let pixel_values = batch.pixel_values.as_stacked().expect("stacked batch");
    assert_eq!(pixel_values.shape(), &[2, 3, 32, 32]);

    // Red pixels normalize to exactly (1, -1, -1) with 0.5/0.5 stats.
    assert!((pixel_values[[0, 0, 0, 0]] - 1.0).abs() < 1e-5);
    assert!((pixel_values[[0, 1, 0, 0]] + 1.0).abs() < 1e-5);

    let mut model = ImageClassifier::new(
        config,
        Box::new(FixedLogits::new(vec![0.0, 0.0, 0.0])),
    );
    let labels = Labels::Int(arr1(&[1_i64, 2]));
    let output = model
        .forward(Some(pixel_values), Some(&labels))
        .expect("forward");

    assert_eq!(output.logits.dim(), (2, 3));
    // Uniform logits over three classes: cross-entropy is ln(3).
    assert!((output.loss.unwrap() - 3.0_f32.ln()).abs() < 1e-5);
}

#[tokio::test]
async fn test_loss_selection_matrix() {
    let cache = TempDir::new().unwrap();
    let mut config_json = vit_tiny_config();
    config_json["num_classes"] = json!(1);
    seed_config(cache.path(), "acme/reg-model", &config_json);
    let options = offline_options(cache.path());

    // num_labels == 1 resolves to regression.
    let config = ModelConfig::from_pretrained("acme/reg-model", options)
        .await
        .unwrap();
    let mut model = ImageClassifier::new(config, Box::new(FixedLogits::new(vec![2.0])));
    let pixels = Array4::<f32>::zeros((1, 3, 32, 32));
    let labels = Labels::Float(array![3.0_f32].into_dyn());
    let output = model.forward(Some(&pixels), Some(&labels)).unwrap();
    // MSE of a single (2.0, 3.0) pair.
    assert!((output.loss.unwrap() - 1.0).abs() < 1e-5);

    // Several labels with float targets resolve to multi-label BCE.
    let cache = TempDir::new().unwrap();
    seed_config(cache.path(), "acme/vit-tiny", &vit_tiny_config());
    let config = ModelConfig::from_pretrained("acme/vit-tiny", offline_options(cache.path()))
        .await
        .unwrap();
    let mut model = ImageClassifier::new(config, Box::new(FixedLogits::new(vec![0.0; 3])));
    let labels = Labels::Float(array![[1.0_f32, 0.0, 1.0]].into_dyn());
    let output = model.forward(Some(&pixels), Some(&labels)).unwrap();
    assert!((output.loss.unwrap() - 2.0_f32.ln()).abs() < 1e-5);
}

#[tokio::test]
async fn test_explicit_problem_type_from_config() {
    let cache = TempDir::new().unwrap();
    let mut config_json = vit_tiny_config();
    config_json["problem_type"] = json!("multi_label_classification");
    seed_config(cache.path(), "acme/multi", &config_json);

    let config = ModelConfig::from_pretrained("acme/multi", offline_options(cache.path()))
        .await
        .unwrap();
    assert_eq!(
        config.problem_type,
        Some(ProblemType::MultiLabelClassification)
    );
}

#[test]
fn test_grayscale_input_broadcasts_to_three_channels() {
    let processor = ImageProcessor::default();
    let grayscale = Array::from_shape_fn((16, 20), |(y, x)| (y * 20 + x) as f32).into_dyn();

    let batch = processor
        .preprocess_one(grayscale, &PreprocessOptions::default())
        .unwrap();
    let image = &batch.pixel_values.as_list().unwrap()[0];
    assert_eq!(image.shape(), &[3, 224, 224]);

    // All three channels carry the same data.
    let first = image.index_axis(Axis(0), 0);
    for channel in 1..3 {
        assert_eq!(image.index_axis(Axis(0), channel), first);
    }
}

#[test]
fn test_identity_preprocess_is_pure_layout_change() {
    let processor = ImageProcessor::default();
    let original = Array::from_shape_fn((5, 7, 3), |(y, x, c)| (y * 100 + x * 10 + c) as f32);

    let batch = processor
        .preprocess_one(original.clone(), &PreprocessOptions::identity())
        .unwrap();
    let converted = batch.pixel_values.as_list().unwrap()[0].clone();
    assert_eq!(converted.shape(), &[3, 5, 7]);

    let restored = hubvision::to_channel_dimension_format(
        converted,
        ChannelDimension::Last,
        Some(ChannelDimension::First),
    )
    .unwrap();
    assert_eq!(restored, original.into_dyn());
}

#[test]
fn test_channels_last_end_to_end() {
    let processor = ImageProcessor::default();
    let options = PreprocessOptions::default()
        .with_data_format(ChannelDimension::Last)
        .with_return_tensors(TensorFormat::Ndarray);
    let batch = processor
        .preprocess(vec![red_image(8, 8).into()], &options)
        .unwrap();
    let stacked = batch.pixel_values.as_stacked().unwrap();
    assert_eq!(stacked.shape(), &[1, 224, 224, 3]);
    // Red channel is last-axis index 0 in channels-last layout.
    assert!((stacked[[0, 0, 0, 0]] - 1.0).abs() < 1e-5);
}
