//! Mock backbone for testing model wrappers without real model files

use crate::backends::Backbone;
use crate::config::ModelConfig;
use crate::error::{HubVisionError, Result};
use instant::Duration;
use ndarray::{Array2, Array4, Axis};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Mock backbone producing deterministic logits
///
/// Each example's logits are `base_logits` shifted by the example index, so
/// tests can tell batch rows apart. Initialization is optional: the mock is
/// usable straight after construction.
#[derive(Debug, Clone)]
pub struct MockBackbone {
    num_labels: usize,
    base_logits: Vec<f32>,
    initialized: bool,
    should_fail_inference: bool,
    call_history: Arc<Mutex<Vec<String>>>,
}

impl MockBackbone {
    /// Create a mock emitting zeros for `num_labels` classes
    #[must_use]
    pub fn new(num_labels: usize) -> Self {
        Self {
            num_labels,
            base_logits: vec![0.0; num_labels],
            initialized: true,
            should_fail_inference: false,
            call_history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock emitting the given logits for every example
    #[must_use]
    pub fn with_logits(base_logits: Vec<f32>) -> Self {
        Self {
            num_labels: base_logits.len(),
            base_logits,
            initialized: true,
            should_fail_inference: false,
            call_history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock whose `infer` always fails
    #[must_use]
    pub fn new_failing_inference(num_labels: usize) -> Self {
        Self {
            should_fail_inference: true,
            ..Self::new(num_labels)
        }
    }

    /// Calls recorded so far (method name plus input shape)
    #[must_use]
    pub fn call_history(&self) -> Vec<String> {
        self.call_history.lock().map(|h| h.clone()).unwrap_or_default()
    }
}

impl Backbone for MockBackbone {
    fn initialize(&mut self, _config: &ModelConfig, _model_dir: &Path) -> Result<Option<Duration>> {
        if let Ok(mut history) = self.call_history.lock() {
            history.push("initialize".to_string());
        }
        self.initialized = true;
        Ok(Some(Duration::from_millis(1)))
    }

    fn infer(&mut self, pixel_values: &Array4<f32>) -> Result<Array2<f32>> {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(format!("infer {:?}", pixel_values.dim()));
        }
        if self.should_fail_inference {
            return Err(HubVisionError::inference("Mock inference failure"));
        }
        let batch = pixel_values.len_of(Axis(0));
        Ok(Array2::from_shape_fn(
            (batch, self.num_labels),
            |(row, col)| self.base_logits[col] + row as f32,
        ))
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}
