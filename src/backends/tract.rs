//! Tract backbone runner
//!
//! Pure Rust inference via `tract-onnx`. Slower to warm up than ONNX
//! Runtime but carries no native dependencies, which keeps it usable in
//! constrained or cross-compiled environments.

use crate::backends::{Backbone, MODEL_WEIGHTS_FILE};
use crate::config::ModelConfig;
use crate::error::{HubVisionError, Result};
use instant::{Duration, Instant};
use ndarray::{Array2, Array4};
use std::fs;
use std::path::Path;
use tract_onnx::prelude::*;

/// Type alias for the runnable Tract model type
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Pure Rust backbone runner
pub struct TractBackbone {
    model: Option<TractModel>,
    initialized: bool,
}

impl TractBackbone {
    #[must_use]
    pub fn new() -> Self {
        Self {
            model: None,
            initialized: false,
        }
    }
}

impl Default for TractBackbone {
    fn default() -> Self {
        Self::new()
    }
}

impl Backbone for TractBackbone {
    fn initialize(&mut self, config: &ModelConfig, model_dir: &Path) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }

        let load_start = Instant::now();
        let weights_path = model_dir.join(MODEL_WEIGHTS_FILE);
        let model_data = fs::read(&weights_path)
            .map_err(|e| HubVisionError::file_io_error("read model weights", &weights_path, &e))?;

        log::info!(
            "Loading Tract backbone '{}' ({} labels, {} bytes)",
            config.hf_hub_id,
            config.num_labels,
            model_data.len()
        );

        let model = onnx()
            .model_for_read(&mut std::io::Cursor::new(model_data))
            .map_err(|e| HubVisionError::model(format!("Failed to load ONNX model: {e}")))?
            .into_optimized()
            .map_err(|e| HubVisionError::model(format!("Failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| HubVisionError::model(format!("Failed to create runnable model: {e}")))?;

        self.model = Some(model);
        self.initialized = true;

        let load_time = load_start.elapsed();
        log::debug!(
            "Tract backbone initialized in {:.1}ms",
            load_time.as_secs_f64() * 1000.0
        );
        Ok(Some(load_time))
    }

    fn infer(&mut self, pixel_values: &Array4<f32>) -> Result<Array2<f32>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| HubVisionError::internal("Tract model not initialized"))?;

        log::debug!("Running Tract inference on {:?}", pixel_values.dim());
        let input_tensor = Tensor::from(pixel_values.clone());

        let outputs = model
            .run(tvec![input_tensor.into()])
            .map_err(|e| HubVisionError::inference(format!("Tract inference failed: {e}")))?;

        let logits = outputs
            .into_iter()
            .next()
            .ok_or_else(|| HubVisionError::inference("No output tensor found"))?
            .into_arc_tensor();
        let logits = logits
            .to_array_view::<f32>()
            .map_err(|e| {
                HubVisionError::inference(format!("Failed to convert output tensor: {e}"))
            })?;

        let shape = logits.shape().to_vec();
        if shape.len() != 2 {
            return Err(HubVisionError::inference(format!(
                "Expected 2D logits tensor, got {}D",
                shape.len()
            )));
        }
        Array2::from_shape_vec(
            (shape[0], shape[1]),
            logits.to_owned().into_raw_vec_and_offset().0,
        )
        .map_err(|e| HubVisionError::inference(format!("Failed to reshape logits tensor: {e}")))
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}
