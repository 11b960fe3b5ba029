//! Image preprocessing for hub vision backbones
//!
//! [`ImageProcessor`] runs the fixed four-stage pipeline expected by
//! pretrained backbones: resize, rescale, normalize, channel-layout
//! conversion. Every stage can be toggled per call, and per-call options
//! fall back to the instance defaults configured at construction. A disabled
//! stage is skipped entirely; its parameters are never read or validated.

use crate::config::LoadOptions;
use crate::error::{HubVisionError, Result};
use crate::hub::HubClient;
use crate::transforms::{
    self, ChannelDimension, IMAGENET_DEFAULT_MEAN, IMAGENET_DEFAULT_STD, IMAGENET_STANDARD_MEAN,
    IMAGENET_STANDARD_STD,
};
use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::{Array4, ArrayD, Axis, Ix3, IxDyn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Target spatial size of the resize stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub height: u32,
    pub width: u32,
}

impl Size {
    #[must_use]
    pub fn square(edge: u32) -> Self {
        Self {
            height: edge,
            width: edge,
        }
    }

    /// Parse a size from a hub config value
    ///
    /// Accepts `{"height": h, "width": w}` objects, a bare integer (square),
    /// or a two-element `[height, width]` sequence. An object missing either
    /// key is a hard validation failure, never a silent default.
    ///
    /// # Errors
    /// - Object without both `height` and `width` integer entries
    /// - Any other JSON shape
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Object(map) => {
                let read = |key: &str| -> Result<u32> {
                    map.get(key).and_then(Value::as_u64).map(|v| v as u32).ok_or_else(|| {
                        HubVisionError::invalid_input(format!(
                            "`size` must contain integer `height` and `width` keys, missing `{key}`"
                        ))
                    })
                };
                Ok(Self {
                    height: read("height")?,
                    width: read("width")?,
                })
            },
            Value::Number(n) => n.as_u64().map(|edge| Self::square(edge as u32)).ok_or_else(
                || HubVisionError::invalid_input("`size` must be a positive integer"),
            ),
            Value::Array(dims) if dims.len() == 2 => {
                let edge = |value: &Value, name: &str| -> Result<u32> {
                    value.as_u64().map(|v| v as u32).ok_or_else(|| {
                        HubVisionError::invalid_input(format!("`size` {name} is not an integer"))
                    })
                };
                Ok(Self {
                    height: edge(&dims[0], "height")?,
                    width: edge(&dims[1], "width")?,
                })
            },
            other => Err(HubVisionError::invalid_input(format!(
                "Unrecognized `size` value: {other}"
            ))),
        }
    }
}

/// One element of a preprocessing batch
///
/// Accepted forms mirror the generic interface: an already-decoded array, a
/// decoded image, or a raw interleaved pixel buffer. Anything else is not
/// representable, and malformed raw buffers reject the whole batch.
#[derive(Debug, Clone)]
pub enum ImageInput {
    /// 2-D grayscale or 3-D image array, values in whatever range the caller uses
    Array(ArrayD<f32>),
    /// Decoded image; converted to a channel-last `f32` array with 0-255 values
    Image(DynamicImage),
    /// Raw interleaved pixel buffer in channel-last order
    Raw {
        data: Vec<u8>,
        width: u32,
        height: u32,
        channels: u32,
    },
}

impl From<DynamicImage> for ImageInput {
    fn from(image: DynamicImage) -> Self {
        Self::Image(image)
    }
}

impl From<ArrayD<f32>> for ImageInput {
    fn from(array: ArrayD<f32>) -> Self {
        Self::Array(array)
    }
}

impl From<ndarray::Array3<f32>> for ImageInput {
    fn from(array: ndarray::Array3<f32>) -> Self {
        Self::Array(array.into_dyn())
    }
}

impl ImageInput {
    /// Convert the input into a numeric array
    ///
    /// # Errors
    /// - Array input that is neither 2- nor 3-dimensional
    /// - Raw buffer whose length does not match `width * height * channels`
    /// - Raw buffer with an unsupported channel count
    fn into_array(self) -> Result<ArrayD<f32>> {
        match self {
            Self::Array(array) => {
                if !matches!(array.ndim(), 2 | 3) {
                    return Err(HubVisionError::invalid_input(format!(
                        "Image arrays must be 2- or 3-dimensional, got {} dimensions",
                        array.ndim()
                    )));
                }
                Ok(array)
            },
            Self::Image(image) => {
                let rgb = image.to_rgb8();
                let (width, height) = rgb.dimensions();
                let data: Vec<f32> = rgb.into_raw().into_iter().map(f32::from).collect();
                ArrayD::from_shape_vec(IxDyn(&[height as usize, width as usize, 3]), data)
                    .map_err(|e| {
                        HubVisionError::internal(format!("Image to array conversion failed: {e}"))
                    })
            },
            Self::Raw {
                data,
                width,
                height,
                channels,
            } => {
                if !matches!(channels, 1 | 3) {
                    return Err(HubVisionError::invalid_input(format!(
                        "Raw pixel buffers must have 1 or 3 channels, got {channels}"
                    )));
                }
                let expected = (width as usize) * (height as usize) * (channels as usize);
                if data.len() != expected {
                    return Err(HubVisionError::invalid_input(format!(
                        "Raw pixel buffer length {} does not match {}x{}x{} = {expected}",
                        data.len(),
                        height,
                        width,
                        channels
                    )));
                }
                let data: Vec<f32> = data.into_iter().map(f32::from).collect();
                ArrayD::from_shape_vec(
                    IxDyn(&[height as usize, width as usize, channels as usize]),
                    data,
                )
                .map_err(|e| {
                    HubVisionError::internal(format!("Raw buffer to array conversion failed: {e}"))
                })
            },
        }
    }
}

/// Output tensor representation selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorFormat {
    /// Stack the batch into a single `Array4<f32>` (requires uniform shapes)
    Ndarray,
}

/// Processed pixel values, as a list or stacked into one batch tensor
#[derive(Debug, Clone, PartialEq)]
pub enum PixelValues {
    List(Vec<ArrayD<f32>>),
    Stacked(Array4<f32>),
}

impl PixelValues {
    /// Number of images in the batch
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::List(images) => images.len(),
            Self::Stacked(batch) => batch.len_of(Axis(0)),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The underlying list form, if not stacked
    #[must_use]
    pub fn as_list(&self) -> Option<&[ArrayD<f32>]> {
        match self {
            Self::List(images) => Some(images),
            Self::Stacked(_) => None,
        }
    }

    /// The stacked batch tensor, if requested at preprocess time
    #[must_use]
    pub fn as_stacked(&self) -> Option<&Array4<f32>> {
        match self {
            Self::List(_) => None,
            Self::Stacked(batch) => Some(batch),
        }
    }
}

/// Batch container produced by [`ImageProcessor::preprocess`]
#[derive(Debug, Clone, PartialEq)]
pub struct BatchFeature {
    pub pixel_values: PixelValues,
}

/// Per-call preprocessing overrides
///
/// Every field is an unset sentinel that falls back to the corresponding
/// [`ImageProcessor`] default during merging. `data_format` selects the
/// output channel layout and always applies.
#[derive(Debug, Clone)]
pub struct PreprocessOptions {
    pub do_resize: Option<bool>,
    pub size: Option<Size>,
    pub resample: Option<FilterType>,
    pub do_rescale: Option<bool>,
    pub rescale_factor: Option<f32>,
    pub do_normalize: Option<bool>,
    pub image_mean: Option<Vec<f32>>,
    pub image_std: Option<Vec<f32>>,
    pub return_tensors: Option<TensorFormat>,
    pub data_format: ChannelDimension,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            do_resize: None,
            size: None,
            resample: None,
            do_rescale: None,
            rescale_factor: None,
            do_normalize: None,
            image_mean: None,
            image_std: None,
            return_tensors: None,
            data_format: ChannelDimension::First,
        }
    }
}

impl PreprocessOptions {
    #[must_use]
    pub fn with_data_format(mut self, format: ChannelDimension) -> Self {
        self.data_format = format;
        self
    }

    #[must_use]
    pub fn with_return_tensors(mut self, format: TensorFormat) -> Self {
        self.return_tensors = Some(format);
        self
    }

    /// Disable all four transform stages; only layout conversion applies
    #[must_use]
    pub fn identity() -> Self {
        Self {
            do_resize: Some(false),
            do_rescale: Some(false),
            do_normalize: Some(false),
            ..Self::default()
        }
    }
}

/// Image preprocessor with instance-level defaults
///
/// Defaults match the generic interface: all stages enabled, 224x224
/// bilinear resize, 1/255 rescale, standard ImageNet normalization.
#[derive(Debug, Clone)]
pub struct ImageProcessor {
    pub do_resize: bool,
    pub size: Option<Size>,
    pub resample: FilterType,
    pub do_rescale: bool,
    pub rescale_factor: Option<f32>,
    pub do_normalize: bool,
    pub image_mean: Option<Vec<f32>>,
    pub image_std: Option<Vec<f32>>,
}

impl Default for ImageProcessor {
    fn default() -> Self {
        Self {
            do_resize: true,
            size: Some(Size::square(224)),
            resample: FilterType::Triangle,
            do_rescale: true,
            rescale_factor: Some(1.0 / 255.0),
            do_normalize: true,
            image_mean: Some(IMAGENET_STANDARD_MEAN.to_vec()),
            image_std: Some(IMAGENET_STANDARD_STD.to_vec()),
        }
    }
}

impl ImageProcessor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a processor from a raw hub config dict
    ///
    /// An explicit `size` entry (object, bare integer or `[h, w]` pair) wins;
    /// otherwise the target size derives from `input_size`
    /// (`[channels, height, width]`). Normalization statistics come from the
    /// config's `mean`/`std`, falling back to the default ImageNet values hub
    /// checkpoints assume when a config omits them. Hub checkpoints are
    /// exported with bicubic resampling, so that is the resample default here.
    ///
    /// # Errors
    /// - `size` present but malformed (see [`Size::from_value`])
    /// - `input_size` present but not an integer triple
    /// - `mean`/`std` present but not numeric sequences
    pub fn from_hub_dict(dict: &Map<String, Value>) -> Result<Self> {
        let size = match (dict.get("size"), dict.get("input_size")) {
            (Some(value), _) => Size::from_value(value)?,
            (None, Some(value)) => {
                let dims = value
                    .as_array()
                    .filter(|dims| dims.len() == 3)
                    .ok_or_else(|| {
                        HubVisionError::invalid_config(
                            "`input_size` must be a [channels, height, width] triple",
                        )
                    })?;
                let dim = |idx: usize| -> Result<u32> {
                    dims[idx].as_u64().map(|v| v as u32).ok_or_else(|| {
                        HubVisionError::invalid_config("`input_size` entries must be integers")
                    })
                };
                Size {
                    height: dim(1)?,
                    width: dim(2)?,
                }
            },
            (None, None) => Size::square(224),
        };

        let stats = |key: &str, fallback: [f32; 3]| -> Result<Vec<f32>> {
            match dict.get(key) {
                Some(value) => value
                    .as_array()
                    .map(|values| {
                        values
                            .iter()
                            .map(|v| {
                                v.as_f64().map(|v| v as f32).ok_or_else(|| {
                                    HubVisionError::invalid_config(format!(
                                        "`{key}` entries must be numbers"
                                    ))
                                })
                            })
                            .collect::<Result<Vec<f32>>>()
                    })
                    .unwrap_or_else(|| {
                        Err(HubVisionError::invalid_config(format!(
                            "`{key}` must be a sequence of numbers"
                        )))
                    }),
                None => Ok(fallback.to_vec()),
            }
        };

        Ok(Self {
            size: Some(size),
            resample: FilterType::CatmullRom,
            image_mean: Some(stats("mean", IMAGENET_DEFAULT_MEAN)?),
            image_std: Some(stats("std", IMAGENET_DEFAULT_STD)?),
            ..Self::default()
        })
    }

    /// Fetch a hub config and build a processor from it
    ///
    /// # Errors
    /// - Hub lookup or download failures
    /// - Config parsing failures from [`ImageProcessor::from_hub_dict`]
    pub async fn from_pretrained(model_id: &str, options: LoadOptions) -> Result<Self> {
        let client = HubClient::new(&options)?;
        let (dict, _model_dir) = client.load_config(model_id, &options).await?;
        Self::from_hub_dict(&dict)
    }

    /// Preprocess a batch of images
    ///
    /// Inputs are first converted to numeric arrays (a malformed element
    /// rejects the entire batch), then the enabled stages run in fixed
    /// order: resize, rescale, normalize. Finally every image is converted
    /// to `options.data_format`. When `return_tensors` is set the batch is
    /// stacked into a single tensor, otherwise the arrays are returned
    /// as-is in a list.
    ///
    /// # Errors
    /// - Invalid batch elements
    /// - `do_resize` enabled with no `size` resolved
    /// - `do_rescale` enabled with no `rescale_factor` resolved
    /// - `do_normalize` enabled with no `image_mean`/`image_std` resolved
    /// - Stacking requested for non-uniform or non-3D outputs
    pub fn preprocess(
        &self,
        images: Vec<ImageInput>,
        options: &PreprocessOptions,
    ) -> Result<BatchFeature> {
        let do_resize = options.do_resize.unwrap_or(self.do_resize);
        let do_rescale = options.do_rescale.unwrap_or(self.do_rescale);
        let do_normalize = options.do_normalize.unwrap_or(self.do_normalize);

        // All transforms expect numeric arrays; validate the whole batch up
        // front so a bad element never leaves partial work behind.
        let mut arrays = images
            .into_iter()
            .map(ImageInput::into_array)
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            batch = arrays.len(),
            do_resize,
            do_rescale,
            do_normalize,
            data_format = %options.data_format,
            "preprocessing image batch"
        );

        if do_resize {
            let size = options.size.or(self.size).ok_or_else(|| {
                HubVisionError::invalid_input("`size` must be specified when `do_resize` is enabled")
            })?;
            let resample = options.resample.unwrap_or(self.resample);
            arrays = arrays
                .into_iter()
                .map(|image| transforms::resize(&image, size.height, size.width, resample, None))
                .collect::<Result<Vec<_>>>()?;
        }

        if do_rescale {
            let factor = options
                .rescale_factor
                .or(self.rescale_factor)
                .ok_or_else(|| {
                    HubVisionError::invalid_input(
                        "`rescale_factor` must be specified when `do_rescale` is enabled",
                    )
                })?;
            arrays = arrays
                .into_iter()
                .map(|image| transforms::rescale(&image, factor))
                .collect();
        }

        if do_normalize {
            let mean = options
                .image_mean
                .clone()
                .or_else(|| self.image_mean.clone())
                .ok_or_else(|| {
                    HubVisionError::invalid_input(
                        "`image_mean` must be specified when `do_normalize` is enabled",
                    )
                })?;
            let std = options
                .image_std
                .clone()
                .or_else(|| self.image_std.clone())
                .ok_or_else(|| {
                    HubVisionError::invalid_input(
                        "`image_std` must be specified when `do_normalize` is enabled",
                    )
                })?;
            arrays = arrays
                .into_iter()
                .map(|image| transforms::normalize(&image, &mean, &std))
                .collect::<Result<Vec<_>>>()?;
        }

        let arrays = arrays
            .into_iter()
            .map(|image| {
                transforms::to_channel_dimension_format(image, options.data_format, None)
            })
            .collect::<Result<Vec<_>>>()?;

        let pixel_values = match options.return_tensors {
            Some(TensorFormat::Ndarray) => PixelValues::Stacked(stack_batch(&arrays)?),
            None => PixelValues::List(arrays),
        };
        Ok(BatchFeature { pixel_values })
    }

    /// Preprocess a single image
    ///
    /// # Errors
    /// See [`ImageProcessor::preprocess`].
    pub fn preprocess_one(
        &self,
        image: impl Into<ImageInput>,
        options: &PreprocessOptions,
    ) -> Result<BatchFeature> {
        self.preprocess(vec![image.into()], options)
    }
}

/// Stack uniform 3-D image arrays into one `(N, ..)` batch tensor
fn stack_batch(arrays: &[ArrayD<f32>]) -> Result<Array4<f32>> {
    let views = arrays
        .iter()
        .map(|image| {
            image.view().into_dimensionality::<Ix3>().map_err(|_| {
                HubVisionError::invalid_input(format!(
                    "Batch stacking requires 3-dimensional images, got shape {:?}",
                    image.shape()
                ))
            })
        })
        .collect::<Result<Vec<_>>>()?;
    ndarray::stack(Axis(0), &views).map_err(|e| {
        HubVisionError::invalid_input(format!(
            "Batch stacking requires uniform image shapes: {e}"
        ))
    })
}
