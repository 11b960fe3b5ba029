//! Scalar loss functions over model logits
//!
//! Mean-reduced losses matching the classification head's three problem
//! types: mean-squared-error for regression, cross-entropy for single-label
//! classification and binary cross-entropy with logits for multi-label
//! classification. All formulas use numerically stable forms.

use crate::error::{HubVisionError, Result};
use ndarray::{ArrayView1, ArrayView2, ArrayViewD};

/// Mean-squared-error loss
///
/// # Errors
/// - Shape mismatch between predictions and targets
/// - Empty inputs
pub fn mse_loss(predictions: ArrayViewD<'_, f32>, targets: ArrayViewD<'_, f32>) -> Result<f32> {
    if predictions.shape() != targets.shape() {
        return Err(HubVisionError::invalid_input(format!(
            "MSE loss shape mismatch: predictions {:?} vs targets {:?}",
            predictions.shape(),
            targets.shape()
        )));
    }
    if predictions.is_empty() {
        return Err(HubVisionError::invalid_input(
            "MSE loss requires at least one element",
        ));
    }
    let sum: f32 = predictions
        .iter()
        .zip(targets.iter())
        .map(|(p, t)| (p - t) * (p - t))
        .sum();
    Ok(sum / predictions.len() as f32)
}

/// Cross-entropy loss over `(N, num_labels)` logits and `(N,)` class indices
///
/// Computed per example as `logsumexp(logits) - logits[target]`, then
/// averaged over the batch.
///
/// # Errors
/// - Batch size mismatch between logits and targets
/// - Empty batch or a target index out of range
pub fn cross_entropy_loss(logits: ArrayView2<'_, f32>, targets: ArrayView1<'_, i64>) -> Result<f32> {
    let (batch, num_labels) = logits.dim();
    if targets.len() != batch {
        return Err(HubVisionError::invalid_input(format!(
            "Cross-entropy batch mismatch: {batch} logit rows vs {} targets",
            targets.len()
        )));
    }
    if batch == 0 {
        return Err(HubVisionError::invalid_input(
            "Cross-entropy loss requires at least one example",
        ));
    }

    let mut total = 0.0_f32;
    for (row, &target) in logits.outer_iter().zip(targets.iter()) {
        if target < 0 || target as usize >= num_labels {
            return Err(HubVisionError::invalid_input(format!(
                "Class index {target} out of range for {num_labels} labels"
            )));
        }
        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let log_sum_exp = max + row.iter().map(|&x| (x - max).exp()).sum::<f32>().ln();
        total += log_sum_exp - row[target as usize];
    }
    Ok(total / batch as f32)
}

/// Binary cross-entropy with logits, elementwise and mean-reduced
///
/// Uses the stable form `max(x, 0) - x * z + ln(1 + exp(-|x|))`.
///
/// # Errors
/// - Shape mismatch between logits and targets
/// - Empty inputs
pub fn bce_with_logits_loss(
    logits: ArrayViewD<'_, f32>,
    targets: ArrayViewD<'_, f32>,
) -> Result<f32> {
    if logits.shape() != targets.shape() {
        return Err(HubVisionError::invalid_input(format!(
            "BCE loss shape mismatch: logits {:?} vs targets {:?}",
            logits.shape(),
            targets.shape()
        )));
    }
    if logits.is_empty() {
        return Err(HubVisionError::invalid_input(
            "BCE loss requires at least one element",
        ));
    }
    let sum: f32 = logits
        .iter()
        .zip(targets.iter())
        .map(|(&x, &z)| x.max(0.0) - x * z + (-x.abs()).exp().ln_1p())
        .sum();
    Ok(sum / logits.len() as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2, array};

    #[test]
    fn test_mse_known_value() {
        let predictions = array![1.0_f32, 2.0].into_dyn();
        let targets = array![0.0_f32, 0.0].into_dyn();
        let loss = mse_loss(predictions.view(), targets.view()).unwrap();
        assert!((loss - 2.5).abs() < 1e-6);
    }

    #[test]
    fn test_mse_zero_for_identical_inputs() {
        let values = array![[0.25_f32, -1.5], [3.0, 0.0]].into_dyn();
        let loss = mse_loss(values.view(), values.view()).unwrap();
        assert_eq!(loss, 0.0);
    }

    #[test]
    fn test_mse_shape_mismatch() {
        let predictions = array![1.0_f32, 2.0].into_dyn();
        let targets = array![1.0_f32].into_dyn();
        assert!(mse_loss(predictions.view(), targets.view()).is_err());
    }

    #[test]
    fn test_cross_entropy_uniform_logits() {
        // Uniform logits over C classes give loss ln(C) regardless of target.
        let logits = arr2(&[[0.0_f32, 0.0, 0.0]]);
        let targets = arr1(&[1_i64]);
        let loss = cross_entropy_loss(logits.view(), targets.view()).unwrap();
        assert!((loss - 3.0_f32.ln()).abs() < 1e-6);
    }

    #[test]
    fn test_cross_entropy_confident_correct_prediction() {
        let logits = arr2(&[[20.0_f32, 0.0], [0.0, 20.0]]);
        let targets = arr1(&[0_i64, 1]);
        let loss = cross_entropy_loss(logits.view(), targets.view()).unwrap();
        assert!(loss < 1e-6);
    }

    #[test]
    fn test_cross_entropy_is_stable_for_large_logits() {
        let logits = arr2(&[[1000.0_f32, 0.0]]);
        let targets = arr1(&[0_i64]);
        let loss = cross_entropy_loss(logits.view(), targets.view()).unwrap();
        assert!(loss.is_finite());
        assert!(loss < 1e-6);
    }

    #[test]
    fn test_cross_entropy_rejects_out_of_range_target() {
        let logits = arr2(&[[0.0_f32, 0.0]]);
        let targets = arr1(&[2_i64]);
        assert!(cross_entropy_loss(logits.view(), targets.view()).is_err());
    }

    #[test]
    fn test_bce_known_value() {
        // x = 0 gives ln(2) for either target value.
        let logits = array![0.0_f32].into_dyn();
        let targets = array![1.0_f32].into_dyn();
        let loss = bce_with_logits_loss(logits.view(), targets.view()).unwrap();
        assert!((loss - 2.0_f32.ln()).abs() < 1e-6);
    }

    #[test]
    fn test_bce_confident_correct_prediction() {
        let logits = array![10.0_f32, -10.0].into_dyn();
        let targets = array![1.0_f32, 0.0].into_dyn();
        let loss = bce_with_logits_loss(logits.view(), targets.view()).unwrap();
        assert!(loss < 1e-3);
    }

    #[test]
    fn test_bce_is_stable_for_large_logits() {
        let logits = array![1000.0_f32, -1000.0].into_dyn();
        let targets = array![0.0_f32, 1.0].into_dyn();
        let loss = bce_with_logits_loss(logits.view(), targets.view()).unwrap();
        assert!(loss.is_finite());
        assert!((loss - 1000.0).abs() < 1.0);
    }
}
