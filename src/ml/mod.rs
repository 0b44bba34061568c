//! Machine Learning Module
//!
//! - Min-max scaling fitted at training time and reused at serving time
//! - Tensor assembly of feature windows
//! - Regressors consuming `[batch, WINDOW_SIZE, NUM_FEATURES]` tensors
//! - Offline training pipeline and experiment tracking

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod experiment;
pub mod models;
pub mod scaler;
pub mod tensor;
pub mod training;

pub use models::{ModelArtifact, Regressor};
pub use scaler::{MinMaxScaler, ScalerSet};
pub use tensor::assemble;

/// ML Model Type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    WindowedLinear,
    Lstm,
}

/// ML Model Metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelMetadata {
    pub model_id: String,
    pub model_type: ModelType,
    pub version: String,
    pub trained_at: DateTime<Utc>,
    pub training_samples: usize,
    pub validation_metrics: ValidationMetrics,
    pub feature_names: Vec<String>,
    pub feature_set_version: u32,
    pub window_size: usize,
}

/// Validation Metrics
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ValidationMetrics {
    pub mae: f64,  // Mean Absolute Error
    pub rmse: f64, // Root Mean Square Error
    pub mape: f64, // Mean Absolute Percentage Error
    pub r2: f64,   // R-squared
}

impl ValidationMetrics {
    pub fn new(mae: f64, rmse: f64, mape: f64, r2: f64) -> Self {
        Self {
            mae,
            rmse,
            mape,
            r2,
        }
    }

    /// Calculate metrics of `predictions` against `targets` (same units)
    pub fn calculate(predictions: &[f64], targets: &[f64]) -> Result<Self> {
        if predictions.len() != targets.len() {
            anyhow::bail!(
                "Prediction and target count mismatch: {} predictions, {} targets",
                predictions.len(),
                targets.len()
            );
        }

        if predictions.is_empty() {
            anyhow::bail!("No predictions to evaluate");
        }

        let n = predictions.len() as f64;
        let pairs = || predictions.iter().zip(targets.iter());

        let mae = pairs().map(|(p, t)| (p - t).abs()).sum::<f64>() / n;
        let rmse = (pairs().map(|(p, t)| (p - t).powi(2)).sum::<f64>() / n).sqrt();

        // Zero targets carry no percentage error
        let nonzero: Vec<f64> = pairs()
            .filter(|(_, t)| t.abs() > 1e-10)
            .map(|(p, t)| ((t - p) / t).abs())
            .collect();
        let mape = if nonzero.is_empty() {
            0.0
        } else {
            nonzero.iter().sum::<f64>() / nonzero.len() as f64 * 100.0
        };

        let mean_target = targets.iter().sum::<f64>() / n;
        let ss_tot: f64 = targets.iter().map(|t| (t - mean_target).powi(2)).sum();
        let ss_res: f64 = pairs().map(|(p, t)| (t - p).powi(2)).sum();
        let r2 = if ss_tot.abs() < 1e-10 {
            0.0
        } else {
            1.0 - (ss_res / ss_tot)
        };

        Ok(Self::new(mae, rmse, mape, r2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_metrics() {
        let predictions = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let targets = vec![1.1, 2.1, 2.9, 4.2, 4.8];

        let metrics = ValidationMetrics::calculate(&predictions, &targets).unwrap();

        assert!(metrics.mae < 0.3);
        assert!(metrics.rmse < 0.4);
        assert!(metrics.r2 > 0.9);
        assert!(metrics.mape > 0.0 && metrics.mape < 10.0);
    }

    #[test]
    fn test_perfect_predictions() {
        let values = vec![400.0, 420.0, 390.0];
        let metrics = ValidationMetrics::calculate(&values, &values).unwrap();

        assert_eq!(metrics.mae, 0.0);
        assert_eq!(metrics.rmse, 0.0);
        assert_eq!(metrics.mape, 0.0);
        assert_eq!(metrics.r2, 1.0);
    }

    #[test]
    fn test_metrics_reject_bad_input() {
        assert!(ValidationMetrics::calculate(&[], &[]).is_err());
        assert!(ValidationMetrics::calculate(&[1.0], &[1.0, 2.0]).is_err());
    }
}
