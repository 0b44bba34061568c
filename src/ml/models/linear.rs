use anyhow::Result;
use chrono::Utc;
use ndarray::{Array2, Array3, ArrayView2};
use serde::{Deserialize, Serialize};

use super::{check_input, Regressor};
use crate::features::{feature_names, FEATURE_SET_VERSION, NUM_FEATURES, WINDOW_SIZE};
use crate::ml::{ModelMetadata, ModelType, ValidationMetrics};

/// Linear regression over the whole window: one weight per (day, feature)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowedLinearRegressor {
    pub metadata: ModelMetadata,
    /// `[WINDOW_SIZE, NUM_FEATURES]`
    pub weights: Array2<f64>,
    pub intercept: f64,
}

impl WindowedLinearRegressor {
    pub fn new(weights: Array2<f64>, intercept: f64, metadata: ModelMetadata) -> Self {
        Self {
            metadata,
            weights,
            intercept,
        }
    }

    /// Untrained model with zero weights
    pub fn zeros(intercept: f64) -> Self {
        let metadata = ModelMetadata {
            model_id: format!("windowed_linear_{}", uuid::Uuid::new_v4()),
            model_type: ModelType::WindowedLinear,
            version: env!("CARGO_PKG_VERSION").to_string(),
            trained_at: Utc::now(),
            training_samples: 0,
            validation_metrics: ValidationMetrics::default(),
            feature_names: feature_names(),
            feature_set_version: FEATURE_SET_VERSION,
            window_size: WINDOW_SIZE,
        };

        Self::new(Array2::zeros((WINDOW_SIZE, NUM_FEATURES)), intercept, metadata)
    }

    pub fn validate(&self) -> Result<()> {
        if self.weights.dim() != (WINDOW_SIZE, NUM_FEATURES) {
            anyhow::bail!(
                "Weight shape mismatch: expected [{}, {}], got {:?}",
                WINDOW_SIZE,
                NUM_FEATURES,
                self.weights.shape()
            );
        }
        Ok(())
    }

    /// Prediction for one `[WINDOW_SIZE, NUM_FEATURES]` sequence
    pub fn predict_sequence(&self, sequence: ArrayView2<f64>) -> f64 {
        (&sequence * &self.weights).sum() + self.intercept
    }
}

impl Regressor for WindowedLinearRegressor {
    fn predict(&self, input: &Array3<f64>) -> Result<Array2<f64>> {
        check_input(input)?;

        let values: Vec<f64> = input
            .outer_iter()
            .map(|sequence| self.predict_sequence(sequence))
            .collect();

        Ok(Array2::from_shape_vec((values.len(), 1), values)?)
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }
}
