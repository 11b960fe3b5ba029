//! ONNX Runtime backbone runner
//!
//! Loads the exported model from the cache and runs it through `ort`. Uses
//! positional inputs and outputs, so the backbone's tensor names never
//! matter.

use crate::backends::{Backbone, MODEL_WEIGHTS_FILE};
use crate::config::ModelConfig;
use crate::error::{HubVisionError, Result};
use instant::{Duration, Instant};
use ndarray::{Array2, Array4};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use std::fs;
use std::path::Path;

/// ONNX Runtime backbone
pub struct OnnxBackbone {
    session: Option<Session>,
    initialized: bool,
}

impl OnnxBackbone {
    #[must_use]
    pub fn new() -> Self {
        Self {
            session: None,
            initialized: false,
        }
    }
}

impl Default for OnnxBackbone {
    fn default() -> Self {
        Self::new()
    }
}

impl Backbone for OnnxBackbone {
    fn initialize(&mut self, config: &ModelConfig, model_dir: &Path) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }

        let load_start = Instant::now();
        let weights_path = model_dir.join(MODEL_WEIGHTS_FILE);
        let model_data = fs::read(&weights_path)
            .map_err(|e| HubVisionError::file_io_error("read model weights", &weights_path, &e))?;

        log::info!(
            "Loading ONNX backbone '{}' ({} labels, {} bytes)",
            config.hf_hub_id,
            config.num_labels,
            model_data.len()
        );

        let session = Session::builder()
            .map_err(|e| {
                HubVisionError::inference(format!("Failed to create session builder: {e}"))
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                HubVisionError::inference(format!("Failed to set optimization level: {e}"))
            })?
            .commit_from_memory(&model_data)
            .map_err(|e| {
                HubVisionError::inference(format!("Failed to create session from model data: {e}"))
            })?;

        self.session = Some(session);
        self.initialized = true;

        let load_time = load_start.elapsed();
        log::debug!(
            "ONNX backbone initialized in {:.1}ms",
            load_time.as_secs_f64() * 1000.0
        );
        Ok(Some(load_time))
    }

    fn infer(&mut self, pixel_values: &Array4<f32>) -> Result<Array2<f32>> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| HubVisionError::internal("ONNX session not initialized"))?;

        log::debug!("Running ONNX inference on {:?}", pixel_values.dim());
        let input_value = Value::from_array(pixel_values.clone()).map_err(|e| {
            HubVisionError::inference(format!("Failed to convert input tensor: {e}"))
        })?;

        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| HubVisionError::inference(format!("ONNX inference failed: {e}")))?;

        // Positional output access: the first output holds the logits.
        let keys: Vec<_> = outputs.keys().collect();
        let first_key = keys
            .first()
            .ok_or_else(|| HubVisionError::inference("No output tensors found"))?;
        let logits = outputs
            .get(first_key)
            .ok_or_else(|| HubVisionError::inference("First output tensor not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| {
                HubVisionError::inference(format!("Failed to extract output tensor: {e}"))
            })?;

        let shape = logits.shape().to_vec();
        if shape.len() != 2 {
            return Err(HubVisionError::inference(format!(
                "Expected 2D logits tensor, got {}D",
                shape.len()
            )));
        }
        let (rows, cols) = (shape[0], shape[1]);
        Array2::from_shape_vec(
            (rows, cols),
            logits.view().to_owned().into_raw_vec_and_offset().0,
        )
        .map_err(|e| HubVisionError::inference(format!("Failed to reshape logits tensor: {e}")))
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}
