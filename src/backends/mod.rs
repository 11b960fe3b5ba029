//! Inference backend abstraction for hub vision backbones
//!
//! A backbone is the external network that turns a preprocessed pixel batch
//! into logits. Concrete runners live behind Cargo features (`onnx`,
//! `tract`); [`DefaultBackendFactory`] is the capability check that turns a
//! request for a compiled-out backend into a descriptive error instead of a
//! runtime stand-in type.

#[cfg(feature = "onnx")]
pub mod onnx;
#[cfg(test)]
pub mod test_utils;
#[cfg(feature = "tract")]
pub mod tract;

#[cfg(feature = "onnx")]
pub use onnx::OnnxBackbone;
#[cfg(feature = "tract")]
pub use tract::TractBackbone;

use crate::config::ModelConfig;
use crate::error::Result;
use instant::Duration;
use ndarray::{Array2, Array4};
use std::path::Path;

/// Relative path of the exported weights inside a cached model directory
pub const MODEL_WEIGHTS_FILE: &str = "onnx/model.onnx";

/// Trait for backbone runners
pub trait Backbone: Send {
    /// Load the exported model from `model_dir` and prepare it for inference
    ///
    /// # Errors
    /// - Weight file missing or unreadable
    /// - Model parsing or session construction failures
    fn initialize(&mut self, config: &ModelConfig, model_dir: &Path) -> Result<Option<Duration>>;

    /// Run the backbone on a preprocessed `(N, C, H, W)` pixel batch
    ///
    /// Returns `(N, num_labels)` logits.
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Inference or tensor conversion failures
    fn infer(&mut self, pixel_values: &Array4<f32>) -> Result<Array2<f32>>;

    /// Check whether the backbone has been initialized
    fn is_initialized(&self) -> bool;
}

impl std::fmt::Debug for dyn Backbone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backbone")
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

/// Backend type enumeration for runtime selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// ONNX Runtime (native, GPU-capable)
    Onnx,
    /// Tract (pure Rust)
    Tract,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Onnx => write!(f, "onnx"),
            Self::Tract => write!(f, "tract"),
        }
    }
}

/// Factory trait for creating backbone runners
pub trait BackendFactory: Send + Sync {
    /// Create an uninitialized backbone of the requested kind
    ///
    /// # Errors
    /// - Backend not compiled into this build (`MissingBackend`)
    fn create_backend(&self, kind: BackendKind) -> Result<Box<dyn Backbone>>;

    /// List the backend kinds compiled into this build
    fn available_backends(&self) -> Vec<BackendKind>;
}

/// Default factory wiring backend kinds to the feature-gated implementations
///
/// Requesting a backend whose feature is disabled fails immediately with an
/// error naming the Cargo feature and its crates; nothing is partially
/// constructed.
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create_backend(&self, kind: BackendKind) -> Result<Box<dyn Backbone>> {
        match kind {
            BackendKind::Onnx => {
                #[cfg(feature = "onnx")]
                {
                    Ok(Box::new(OnnxBackbone::new()))
                }
                #[cfg(not(feature = "onnx"))]
                {
                    Err(crate::error::HubVisionError::MissingBackend {
                        backend: "ONNX Runtime",
                        feature: "onnx",
                        crates: "ort",
                    })
                }
            },
            BackendKind::Tract => {
                #[cfg(feature = "tract")]
                {
                    Ok(Box::new(TractBackbone::new()))
                }
                #[cfg(not(feature = "tract"))]
                {
                    Err(crate::error::HubVisionError::MissingBackend {
                        backend: "Tract",
                        feature: "tract",
                        crates: "tract-onnx and tract-core",
                    })
                }
            },
        }
    }

    fn available_backends(&self) -> Vec<BackendKind> {
        let mut kinds = Vec::new();
        #[cfg(feature = "onnx")]
        kinds.push(BackendKind::Onnx);
        #[cfg(feature = "tract")]
        kinds.push(BackendKind::Tract);
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_available_backends_match_features() {
        let factory = DefaultBackendFactory;
        let available = factory.available_backends();
        assert_eq!(
            available.contains(&BackendKind::Onnx),
            cfg!(feature = "onnx")
        );
        assert_eq!(
            available.contains(&BackendKind::Tract),
            cfg!(feature = "tract")
        );
    }

    #[test]
    fn test_factory_result_matches_availability() {
        let factory = DefaultBackendFactory;
        for kind in [BackendKind::Onnx, BackendKind::Tract] {
            let result = factory.create_backend(kind);
            if factory.available_backends().contains(&kind) {
                assert!(result.is_ok(), "{kind} should be constructible");
            } else {
                let err = result.unwrap_err();
                let msg = err.to_string();
                assert!(msg.contains("feature"), "missing-backend message: {msg}");
            }
        }
    }
}
