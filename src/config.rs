//! Generic model configuration and hub config translation
//!
//! A hub registry describes each pretrained backbone with a raw JSON config
//! dict. [`ModelConfig`] translates that dict into the generic shape the rest
//! of the crate consumes: `num_classes` becomes `num_labels`, `image_size` is
//! derived from the trailing dimension of `input_size`, and every other field
//! passes through untouched in [`ModelConfig::extra`].

use crate::error::{HubVisionError, Result};
use crate::hub::HubClient;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Problem type determining which loss a classification head computes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemType {
    /// Mean-squared-error regression
    Regression,
    /// Cross-entropy over mutually exclusive classes
    SingleLabelClassification,
    /// Binary cross-entropy with logits, one independent decision per label
    MultiLabelClassification,
}

impl std::fmt::Display for ProblemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Regression => write!(f, "regression"),
            Self::SingleLabelClassification => write!(f, "single_label_classification"),
            Self::MultiLabelClassification => write!(f, "multi_label_classification"),
        }
    }
}

/// Options controlling how hub artifacts are fetched
///
/// These are merged into the resulting [`ModelConfig`] so later weight
/// downloads reuse the same cache directory, revision and credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOptions {
    /// Override for the model cache directory (default: XDG cache dir)
    pub cache_dir: Option<PathBuf>,

    /// Re-download files even when they are already cached
    pub force_download: bool,

    /// Never hit the network; fail if the model is not cached
    pub local_files_only: bool,

    /// Bearer token for gated or private repositories
    pub token: Option<String>,

    /// Git revision to resolve files against
    pub revision: String,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            cache_dir: None,
            force_download: false,
            local_files_only: false,
            token: None,
            revision: "main".to_string(),
        }
    }
}

impl LoadOptions {
    #[must_use]
    pub fn with_cache_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_force_download(mut self, force: bool) -> Self {
        self.force_download = force;
        self
    }

    #[must_use]
    pub fn with_local_files_only(mut self, offline: bool) -> Self {
        self.local_files_only = offline;
        self
    }

    #[must_use]
    pub fn with_token<S: Into<String>>(mut self, token: S) -> Self {
        self.token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_revision<S: Into<String>>(mut self, revision: S) -> Self {
        self.revision = revision.into();
        self
    }
}

/// Generic configuration for a hub-hosted vision backbone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Hub repository identifier of the pretrained weights
    pub hf_hub_id: String,

    /// Number of output classes (hub configs call this `num_classes`)
    pub num_labels: usize,

    /// Input spatial size, the trailing dimension of the hub `input_size` triple
    pub image_size: u32,

    /// Loss selection override; inferred from labels on each call when unset
    pub problem_type: Option<ProblemType>,

    /// All hub config fields that are not translated into a typed field
    pub extra: Map<String, Value>,

    /// Fetch options this config was loaded with
    pub load_options: LoadOptions,
}

impl ModelConfig {
    /// Translate a raw hub config dict into a [`ModelConfig`]
    ///
    /// Performs the three translations the generic interface requires:
    /// `num_classes` is renamed to `num_labels`, `image_size` is read from the
    /// last element of the `input_size` sequence (`[channels, height, width]`),
    /// and all remaining fields pass through into [`ModelConfig::extra`]. The
    /// supplied `load_options` are merged into the result.
    ///
    /// # Errors
    /// - `num_classes` or `input_size` missing from the dict
    /// - `input_size` empty or holding non-integer entries
    /// - `problem_type` present but not one of the recognized names
    pub fn from_dict(
        mut dict: Map<String, Value>,
        model_id: &str,
        load_options: LoadOptions,
    ) -> Result<Self> {
        let num_labels = dict
            .remove("num_classes")
            .ok_or_else(|| HubVisionError::missing_config_key("num_classes", model_id))?
            .as_u64()
            .ok_or_else(|| {
                HubVisionError::invalid_config(format!(
                    "Hub config for '{model_id}': `num_classes` is not an integer"
                ))
            })? as usize;

        // The last element of [C, H, W]; input_size itself stays in `extra`.
        let image_size = dict
            .get("input_size")
            .ok_or_else(|| HubVisionError::missing_config_key("input_size", model_id))?
            .as_array()
            .and_then(|dims| dims.last())
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                HubVisionError::invalid_config(format!(
                    "Hub config for '{model_id}': `input_size` is not a non-empty integer sequence"
                ))
            })? as u32;

        let hf_hub_id = match dict.remove("hf_hub_id") {
            Some(Value::String(id)) => id,
            _ => model_id.to_string(),
        };

        let problem_type = match dict.remove("problem_type") {
            Some(Value::Null) | None => None,
            Some(value) => Some(serde_json::from_value(value).map_err(|e| {
                HubVisionError::invalid_config(format!(
                    "Hub config for '{model_id}': unrecognized `problem_type`: {e}"
                ))
            })?),
        };

        Ok(Self {
            hf_hub_id,
            num_labels,
            image_size,
            problem_type,
            extra: dict,
            load_options,
        })
    }

    /// Fetch a hub config and translate it
    ///
    /// The registry fetch is delegated to [`HubClient`]; registry failures
    /// propagate unmodified.
    ///
    /// # Errors
    /// - Hub lookup or download failures
    /// - Translation failures from [`ModelConfig::from_dict`]
    pub async fn from_pretrained(model_id: &str, options: LoadOptions) -> Result<Self> {
        let client = HubClient::new(&options)?;
        let (dict, _model_dir) = client.load_config(model_id, &options).await?;
        Self::from_dict(dict, model_id, options)
    }

    /// Look up an untranslated hub config field
    #[must_use]
    pub fn get_extra(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}
