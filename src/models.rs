//! Model wrappers around hub-hosted vision backbones
//!
//! [`VisionBackbone`] is the bare feature-extraction wrapper;
//! [`ImageClassifier`] adds label handling and loss computation on top. Both
//! pair a translated [`ModelConfig`] with a [`Backbone`] runner created by a
//! [`BackendFactory`], so the same wrapper code serves every compiled-in
//! inference backend.

use crate::backends::{Backbone, BackendFactory, BackendKind, DefaultBackendFactory};
use crate::config::{LoadOptions, ModelConfig, ProblemType};
use crate::error::{HubVisionError, Result};
use crate::hub::HubClient;
use crate::loss::{bce_with_logits_loss, cross_entropy_loss, mse_loss};
use ndarray::{Array1, Array2, Array4, ArrayD, ArrayView1, Axis};

/// Classification targets, with the dtype driving loss selection
///
/// Integer labels are class indices; float labels are regression targets or
/// per-label binary indicators.
#[derive(Debug, Clone)]
pub enum Labels {
    /// Class indices, one per example
    Int(Array1<i64>),
    /// Continuous targets, shape depends on the problem type
    Float(ArrayD<f32>),
}

impl From<Array1<i64>> for Labels {
    fn from(targets: Array1<i64>) -> Self {
        Self::Int(targets)
    }
}

impl From<ArrayD<f32>> for Labels {
    fn from(targets: ArrayD<f32>) -> Self {
        Self::Float(targets)
    }
}

/// Raw backbone output without a task head interpretation
#[derive(Debug, Clone)]
pub struct BaseModelOutput {
    /// Final feature map of the backbone, `(N, features)`
    pub last_hidden_state: Array2<f32>,
    /// Intermediate feature maps when the backbone exposes them
    pub hidden_states: Option<Vec<Array2<f32>>>,
}

/// Classification output: logits plus an optional loss
#[derive(Debug, Clone)]
pub struct ImageClassifierOutput {
    /// Loss against the supplied labels, absent when no labels were given
    pub loss: Option<f32>,
    /// Raw classification scores, `(N, num_labels)`
    pub logits: Array2<f32>,
    /// Intermediate feature maps when the backbone exposes them
    pub hidden_states: Option<Vec<Array2<f32>>>,
}

/// Feature-extraction wrapper over a hub backbone
pub struct VisionBackbone {
    config: ModelConfig,
    backbone: Box<dyn Backbone>,
}

impl VisionBackbone {
    /// Wrap an already-initialized backbone
    #[must_use]
    pub fn new(config: ModelConfig, backbone: Box<dyn Backbone>) -> Self {
        Self { config, backbone }
    }

    /// Fetch config and weights from the hub and initialize a backend
    ///
    /// # Errors
    /// - Hub lookup or download failures
    /// - Requested backend not compiled in
    /// - Backend initialization failures
    pub async fn from_pretrained(
        model_id: &str,
        options: LoadOptions,
        factory: &dyn BackendFactory,
        kind: BackendKind,
    ) -> Result<Self> {
        let (config, backbone) = load_pretrained(model_id, options, factory, kind).await?;
        Ok(Self::new(config, backbone))
    }

    /// The translated configuration this wrapper was built from
    #[must_use]
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Run the backbone on a preprocessed pixel batch
    ///
    /// # Errors
    /// - `pixel_values` is `None`
    /// - Backend inference failures
    pub fn forward(&mut self, pixel_values: Option<&Array4<f32>>) -> Result<BaseModelOutput> {
        let pixel_values = pixel_values
            .ok_or_else(|| HubVisionError::invalid_input("You have to specify pixel_values"))?;
        let last_hidden_state = self.backbone.infer(pixel_values)?;
        Ok(BaseModelOutput {
            last_hidden_state,
            hidden_states: None,
        })
    }
}

/// Image classification wrapper with loss computation
///
/// The loss is selected from the problem type, which is resolved fresh on
/// every call: an explicit `problem_type` in the config wins, otherwise the
/// type is inferred from `num_labels` and the label dtype. The resolution is
/// never written back into the config.
#[derive(Debug)]
pub struct ImageClassifier {
    config: ModelConfig,
    backbone: Box<dyn Backbone>,
}

impl ImageClassifier {
    /// Wrap an already-initialized backbone
    #[must_use]
    pub fn new(config: ModelConfig, backbone: Box<dyn Backbone>) -> Self {
        Self { config, backbone }
    }

    /// Fetch config and weights from the hub and initialize a backend
    ///
    /// # Errors
    /// - Hub lookup or download failures
    /// - Requested backend not compiled in
    /// - Backend initialization failures
    pub async fn from_pretrained(
        model_id: &str,
        options: LoadOptions,
        factory: &dyn BackendFactory,
        kind: BackendKind,
    ) -> Result<Self> {
        let (config, backbone) = load_pretrained(model_id, options, factory, kind).await?;
        Ok(Self::new(config, backbone))
    }

    /// Convenience constructor using [`DefaultBackendFactory`]
    ///
    /// # Errors
    /// Same as [`ImageClassifier::from_pretrained`].
    pub async fn from_pretrained_with_default_backend(
        model_id: &str,
        options: LoadOptions,
        kind: BackendKind,
    ) -> Result<Self> {
        Self::from_pretrained(model_id, options, &DefaultBackendFactory, kind).await
    }

    /// The translated configuration this wrapper was built from
    #[must_use]
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Run the classifier, computing a loss when labels are supplied
    ///
    /// # Errors
    /// - `pixel_values` is `None`
    /// - Backend inference failures
    /// - Labels incompatible with the resolved problem type
    pub fn forward(
        &mut self,
        pixel_values: Option<&Array4<f32>>,
        labels: Option<&Labels>,
    ) -> Result<ImageClassifierOutput> {
        let pixel_values = pixel_values
            .ok_or_else(|| HubVisionError::invalid_input("You have to specify pixel_values"))?;
        let logits = self.backbone.infer(pixel_values)?;

        let loss = match labels {
            Some(labels) => {
                let problem_type = self.resolve_problem_type(labels);
                tracing::debug!(%problem_type, num_labels = self.config.num_labels, "computing loss");
                Some(compute_loss(
                    problem_type,
                    &logits,
                    labels,
                    self.config.num_labels,
                )?)
            },
            None => None,
        };

        Ok(ImageClassifierOutput {
            loss,
            logits,
            hidden_states: None,
        })
    }

    fn resolve_problem_type(&self, labels: &Labels) -> ProblemType {
        if let Some(problem_type) = self.config.problem_type {
            return problem_type;
        }
        if self.config.num_labels == 1 {
            ProblemType::Regression
        } else if matches!(labels, Labels::Int(_)) {
            ProblemType::SingleLabelClassification
        } else {
            ProblemType::MultiLabelClassification
        }
    }
}

async fn load_pretrained(
    model_id: &str,
    options: LoadOptions,
    factory: &dyn BackendFactory,
    kind: BackendKind,
) -> Result<(ModelConfig, Box<dyn Backbone>)> {
    // Capability check first: a compiled-out backend fails before any
    // hub traffic or cache writes happen.
    let mut backbone = factory.create_backend(kind)?;

    let client = HubClient::new(&options)?;
    let (dict, _config_dir) = client.load_config(model_id, &options).await?;
    let config = ModelConfig::from_dict(dict, model_id, options)?;

    // Weights live in the repository the config's hf_hub_id points at,
    // which may differ from the requested model ID.
    client
        .ensure_model_file(&config.hf_hub_id, &config.load_options)
        .await?;
    let weights_dir = client.cache().model_path(&config.hf_hub_id);

    if let Some(load_time) = backbone.initialize(&config, &weights_dir)? {
        log::info!(
            "Initialized {kind} backend for '{}' in {:.1}ms",
            config.hf_hub_id,
            load_time.as_secs_f64() * 1000.0
        );
    }
    Ok((config, backbone))
}

fn compute_loss(
    problem_type: ProblemType,
    logits: &Array2<f32>,
    labels: &Labels,
    num_labels: usize,
) -> Result<f32> {
    match problem_type {
        ProblemType::Regression => {
            let targets = match labels {
                Labels::Float(targets) => targets,
                Labels::Int(_) => {
                    return Err(HubVisionError::invalid_input(
                        "Regression loss requires float labels",
                    ));
                },
            };
            if num_labels == 1 {
                // Both sides squeeze to a flat vector of batch size.
                let predictions = logits.index_axis(Axis(1), 0);
                let target_values: Vec<f32> = targets.iter().copied().collect();
                let target_view = ArrayView1::from(&target_values);
                mse_loss(predictions.into_dyn(), target_view.into_dyn())
            } else {
                mse_loss(logits.view().into_dyn(), targets.view())
            }
        },
        ProblemType::SingleLabelClassification => {
            let targets = match labels {
                Labels::Int(targets) => targets,
                Labels::Float(_) => {
                    return Err(HubVisionError::invalid_input(
                        "Single-label classification requires integer class labels",
                    ));
                },
            };
            cross_entropy_loss(logits.view(), targets.view())
        },
        ProblemType::MultiLabelClassification => {
            let targets = match labels {
                Labels::Float(targets) => targets,
                Labels::Int(_) => {
                    return Err(HubVisionError::invalid_input(
                        "Multi-label classification requires float label indicators",
                    ));
                },
            };
            bce_with_logits_loss(logits.view().into_dyn(), targets.view())
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::MockBackbone;
    use ndarray::{arr1, array};
    use serde_json::json;

    fn test_config(num_labels: usize) -> ModelConfig {
        let dict = match json!({
            "num_classes": num_labels,
            "input_size": [3, 224, 224],
        }) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        ModelConfig::from_dict(dict, "acme/test-model", LoadOptions::default()).unwrap()
    }

    fn pixel_batch(batch: usize) -> Array4<f32> {
        Array4::zeros((batch, 3, 8, 8))
    }

    #[test]
    fn test_backbone_requires_pixel_values() {
        let mut model = VisionBackbone::new(test_config(5), Box::new(MockBackbone::new(5)));
        let err = model.forward(None).unwrap_err();
        assert!(err.to_string().contains("pixel_values"));
    }

    #[test]
    fn test_backbone_forward_shape() {
        let mut model = VisionBackbone::new(test_config(5), Box::new(MockBackbone::new(5)));
        let output = model.forward(Some(&pixel_batch(2))).unwrap();
        assert_eq!(output.last_hidden_state.dim(), (2, 5));
        assert!(output.hidden_states.is_none());
    }

    #[test]
    fn test_classifier_requires_pixel_values() {
        let mut model = ImageClassifier::new(test_config(5), Box::new(MockBackbone::new(5)));
        let err = model.forward(None, None).unwrap_err();
        assert!(err.to_string().contains("pixel_values"));
    }

    #[test]
    fn test_no_labels_no_loss() {
        let mut model = ImageClassifier::new(test_config(5), Box::new(MockBackbone::new(5)));
        let output = model.forward(Some(&pixel_batch(2)), None).unwrap();
        assert!(output.loss.is_none());
        assert_eq!(output.logits.dim(), (2, 5));
    }

    #[test]
    fn test_single_label_infers_regression() {
        // num_labels == 1 resolves to regression even with float labels.
        let backbone = MockBackbone::with_logits(vec![1.5]);
        let mut model = ImageClassifier::new(test_config(1), Box::new(backbone));
        let labels = Labels::Float(array![1.5_f32].into_dyn());
        let output = model.forward(Some(&pixel_batch(1)), Some(&labels)).unwrap();
        assert!((output.loss.unwrap() - 0.0).abs() < 1e-6);
    }

    #[test]
    fn test_int_labels_infer_single_label_classification() {
        // Uniform logits over 5 classes: cross-entropy is ln(5).
        let backbone = MockBackbone::with_logits(vec![0.0; 5]);
        let mut model = ImageClassifier::new(test_config(5), Box::new(backbone));
        let labels = Labels::Int(arr1(&[2_i64]));
        let output = model.forward(Some(&pixel_batch(1)), Some(&labels)).unwrap();
        assert!((output.loss.unwrap() - 5.0_f32.ln()).abs() < 1e-5);
    }

    #[test]
    fn test_float_labels_infer_multi_label_classification() {
        // Zero logits: BCE with logits is ln(2) per element.
        let backbone = MockBackbone::with_logits(vec![0.0; 3]);
        let mut model = ImageClassifier::new(test_config(3), Box::new(backbone));
        let labels = Labels::Float(array![[1.0_f32, 0.0, 1.0]].into_dyn());
        let output = model.forward(Some(&pixel_batch(1)), Some(&labels)).unwrap();
        assert!((output.loss.unwrap() - 2.0_f32.ln()).abs() < 1e-5);
    }

    #[test]
    fn test_explicit_problem_type_wins_over_inference() {
        let mut config = test_config(3);
        config.problem_type = Some(ProblemType::MultiLabelClassification);
        let backbone = MockBackbone::with_logits(vec![0.0; 3]);
        let mut model = ImageClassifier::new(config, Box::new(backbone));
        // Int labels would normally infer single-label; the explicit config
        // value forces multi-label, which rejects integer labels.
        let labels = Labels::Int(arr1(&[1_i64]));
        let err = model
            .forward(Some(&pixel_batch(1)), Some(&labels))
            .unwrap_err();
        assert!(err.to_string().contains("float label"));
    }

    #[test]
    fn test_resolution_does_not_mutate_config() {
        let mut model = ImageClassifier::new(test_config(5), Box::new(MockBackbone::new(5)));
        let labels = Labels::Int(arr1(&[0_i64, 1]));
        model.forward(Some(&pixel_batch(2)), Some(&labels)).unwrap();
        assert!(model.config().problem_type.is_none());
    }

    #[test]
    fn test_inference_failure_propagates() {
        let backbone = MockBackbone::new_failing_inference(5);
        let mut model = ImageClassifier::new(test_config(5), Box::new(backbone));
        let err = model.forward(Some(&pixel_batch(1)), None).unwrap_err();
        assert!(err.to_string().contains("Mock inference failure"));
    }

    #[test]
    fn test_regression_with_multiple_outputs() {
        let backbone = MockBackbone::with_logits(vec![1.0, 2.0]);
        let mut config = test_config(2);
        config.problem_type = Some(ProblemType::Regression);
        let mut model = ImageClassifier::new(config, Box::new(backbone));
        let labels = Labels::Float(array![[1.0_f32, 2.0]].into_dyn());
        let output = model.forward(Some(&pixel_batch(1)), Some(&labels)).unwrap();
        assert!((output.loss.unwrap() - 0.0).abs() < 1e-6);
    }
}
