//! Standalone image array transforms
//!
//! Building blocks for the preprocessing pipeline: channel-layout handling,
//! resizing, rescaling and normalization over `ndarray` image arrays. Each
//! transform is independent so callers can compose their own pipelines.
//!
//! Images are 3-D `f32` arrays in either channel-first (`C, H, W`) or
//! channel-last (`H, W, C`) layout; 2-D arrays are treated as grayscale.

use crate::error::{HubVisionError, Result};
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma, Rgb};
use ndarray::{ArrayD, Axis, IxDyn};
use serde::{Deserialize, Serialize};

/// Standard ImageNet normalization mean (the generic interface default)
pub const IMAGENET_STANDARD_MEAN: [f32; 3] = [0.5, 0.5, 0.5];
/// Standard ImageNet normalization std (the generic interface default)
pub const IMAGENET_STANDARD_STD: [f32; 3] = [0.5, 0.5, 0.5];
/// Default ImageNet normalization mean carried by most hub configs
pub const IMAGENET_DEFAULT_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// Default ImageNet normalization std carried by most hub configs
pub const IMAGENET_DEFAULT_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Placement of the channel axis in an image array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelDimension {
    /// `(num_channels, height, width)`
    #[serde(rename = "channels_first")]
    First,
    /// `(height, width, num_channels)`
    #[serde(rename = "channels_last")]
    Last,
}

impl std::fmt::Display for ChannelDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::First => write!(f, "channels_first"),
            Self::Last => write!(f, "channels_last"),
        }
    }
}

/// Infer the channel layout of a 3-D image array
///
/// An axis of extent 1 or 3 is taken as the channel axis, checking the
/// leading axis first. Arrays where neither end looks like a channel axis
/// are rejected.
///
/// # Errors
/// - Array is not 3-dimensional
/// - Neither the leading nor the trailing axis has extent 1 or 3
pub fn infer_channel_dimension(image: &ArrayD<f32>) -> Result<ChannelDimension> {
    let shape = image.shape();
    if shape.len() != 3 {
        return Err(HubVisionError::invalid_input(format!(
            "Expected a 3-dimensional image array, got {} dimensions",
            shape.len()
        )));
    }
    if matches!(shape[0], 1 | 3) {
        Ok(ChannelDimension::First)
    } else if matches!(shape[2], 1 | 3) {
        Ok(ChannelDimension::Last)
    } else {
        Err(HubVisionError::invalid_input(format!(
            "Unable to infer channel layout from shape {shape:?}"
        )))
    }
}

/// Convert an image array to the requested channel layout
///
/// A pure axis permutation; converting first→last→first reproduces the
/// original array exactly. `input_format` overrides layout inference when
/// the caller already knows the layout (e.g. for ambiguous 3x3 images).
///
/// # Errors
/// - Layout inference fails and `input_format` is unset
pub fn to_channel_dimension_format(
    image: ArrayD<f32>,
    target: ChannelDimension,
    input_format: Option<ChannelDimension>,
) -> Result<ArrayD<f32>> {
    let source = match input_format {
        Some(format) => format,
        None => infer_channel_dimension(&image)?,
    };
    if source == target {
        return Ok(image);
    }
    let permuted = match target {
        ChannelDimension::First => image.permuted_axes(IxDyn(&[2, 0, 1])),
        ChannelDimension::Last => image.permuted_axes(IxDyn(&[1, 2, 0])),
    };
    Ok(permuted.as_standard_layout().to_owned())
}

/// Resize an image array to `(height, width)`
///
/// 2-D grayscale input is broadcast to three identical channels before
/// resizing. The spatial resample runs in channel-last layout via the
/// `image` crate; the result is converted to `data_format`, or kept in the
/// input layout when unset. Supports 1- and 3-channel images.
///
/// # Errors
/// - Unsupported channel count or undeterminable layout
/// - Array data does not form a valid pixel buffer
pub fn resize(
    image: &ArrayD<f32>,
    height: u32,
    width: u32,
    filter: FilterType,
    data_format: Option<ChannelDimension>,
) -> Result<ArrayD<f32>> {
    let (hwc, input_format) = if image.ndim() == 2 {
        // Broadcast (H, W) to (H, W, 3) with identical channels.
        let expanded = image.clone().insert_axis(Axis(2));
        let stacked = ndarray::concatenate(
            Axis(2),
            &[expanded.view(), expanded.view(), expanded.view()],
        )
        .map_err(|e| {
            HubVisionError::invalid_input(format!("Failed to broadcast grayscale image: {e}"))
        })?;
        (stacked, ChannelDimension::Last)
    } else {
        let input_format = infer_channel_dimension(image)?;
        let hwc =
            to_channel_dimension_format(image.clone(), ChannelDimension::Last, Some(input_format))?;
        (hwc, input_format)
    };

    let shape = hwc.shape();
    let (src_height, src_width, channels) = (shape[0] as u32, shape[1] as u32, shape[2]);
    let raw: Vec<f32> = hwc.as_standard_layout().iter().copied().collect();

    let resized: ArrayD<f32> = match channels {
        3 => {
            let buffer = ImageBuffer::<Rgb<f32>, Vec<f32>>::from_raw(src_width, src_height, raw)
                .ok_or_else(|| {
                    HubVisionError::invalid_input("Image array does not form a valid RGB buffer")
                })?;
            let resized = imageops::resize(&buffer, width, height, filter);
            ArrayD::from_shape_vec(
                IxDyn(&[height as usize, width as usize, 3]),
                resized.into_raw(),
            )
            .map_err(|e| HubVisionError::internal(format!("Resize output reshape failed: {e}")))?
        },
        1 => {
            let buffer = ImageBuffer::<Luma<f32>, Vec<f32>>::from_raw(src_width, src_height, raw)
                .ok_or_else(|| {
                    HubVisionError::invalid_input(
                        "Image array does not form a valid grayscale buffer",
                    )
                })?;
            let resized = imageops::resize(&buffer, width, height, filter);
            ArrayD::from_shape_vec(
                IxDyn(&[height as usize, width as usize, 1]),
                resized.into_raw(),
            )
            .map_err(|e| HubVisionError::internal(format!("Resize output reshape failed: {e}")))?
        },
        other => {
            return Err(HubVisionError::invalid_input(format!(
                "Resize supports 1- or 3-channel images, got {other} channels"
            )))
        },
    };

    let target = data_format.unwrap_or(input_format);
    to_channel_dimension_format(resized, target, Some(ChannelDimension::Last))
}

/// Multiply every element by `factor`
#[must_use]
pub fn rescale(image: &ArrayD<f32>, factor: f32) -> ArrayD<f32> {
    image * factor
}

/// Normalize an image per channel: `(x - mean) / std`
///
/// `mean` and `std` are either a single value (applied to every channel) or
/// one value per channel.
///
/// # Errors
/// - Layout inference fails
/// - `mean`/`std` length matches neither 1 nor the channel count
/// - Any std entry is zero
pub fn normalize(image: &ArrayD<f32>, mean: &[f32], std: &[f32]) -> Result<ArrayD<f32>> {
    let format = infer_channel_dimension(image)?;
    let channel_axis = match format {
        ChannelDimension::First => Axis(0),
        ChannelDimension::Last => Axis(2),
    };
    let num_channels = image.len_of(channel_axis);

    let expand = |stats: &[f32], name: &str| -> Result<Vec<f32>> {
        match stats.len() {
            1 => Ok(vec![stats[0]; num_channels]),
            n if n == num_channels => Ok(stats.to_vec()),
            n => Err(HubVisionError::invalid_input(format!(
                "`{name}` must have 1 or {num_channels} values, got {n}"
            ))),
        }
    };
    let mean = expand(mean, "image_mean")?;
    let std = expand(std, "image_std")?;
    if let Some(zero) = std.iter().position(|&s| s == 0.0) {
        return Err(HubVisionError::invalid_input(format!(
            "`image_std` must be non-zero (channel {zero})"
        )));
    }

    let mut output = image.clone();
    for (channel, mut lane) in output.axis_iter_mut(channel_axis).enumerate() {
        lane.mapv_inplace(|x| (x - mean[channel]) / std[channel]);
    }
    Ok(output)
}
