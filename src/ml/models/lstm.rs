//! Single-layer LSTM regressor (inference only)
//!
//! Forward pass of `LSTM(units, activation=relu) -> Dense(1)` with weights
//! laid out the Keras way: gate blocks ordered input, forget, cell, output;
//! `kernel` is `[n_features, 4*units]`, `recurrent_kernel` `[units, 4*units]`.
//! Dropout is inactive at inference and therefore not represented.

use anyhow::Result;
use ndarray::{s, Array1, Array2, Array3, ArrayView2};
use serde::{Deserialize, Serialize};

use super::{check_input, Regressor};
use crate::features::NUM_FEATURES;
use crate::ml::ModelMetadata;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LstmRegressor {
    pub metadata: ModelMetadata,
    pub units: usize,
    pub kernel: Array2<f64>,
    pub recurrent_kernel: Array2<f64>,
    pub bias: Array1<f64>,
    /// Dense head `[units]`
    pub dense_kernel: Array1<f64>,
    pub dense_bias: f64,
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn relu(x: f64) -> f64 {
    x.max(0.0)
}

impl LstmRegressor {
    /// Weight shapes against `units`; run once by [`super::ModelArtifact::load`]
    pub fn validate(&self) -> Result<()> {
        let gates = 4 * self.units;
        if self.units == 0 {
            anyhow::bail!("LSTM must have at least one unit");
        }
        if self.kernel.dim() != (NUM_FEATURES, gates) {
            anyhow::bail!(
                "kernel shape {:?}, expected [{}, {}]",
                self.kernel.shape(),
                NUM_FEATURES,
                gates
            );
        }
        if self.recurrent_kernel.dim() != (self.units, gates) {
            anyhow::bail!(
                "recurrent kernel shape {:?}, expected [{}, {}]",
                self.recurrent_kernel.shape(),
                self.units,
                gates
            );
        }
        if self.bias.len() != gates || self.dense_kernel.len() != self.units {
            anyhow::bail!(
                "bias/dense sizes ({}, {}) do not match {} units",
                self.bias.len(),
                self.dense_kernel.len(),
                self.units
            );
        }
        Ok(())
    }

    fn forward(&self, sequence: ArrayView2<f64>) -> f64 {
        let u = self.units;
        let mut h = Array1::<f64>::zeros(u);
        let mut c = Array1::<f64>::zeros(u);

        for x_t in sequence.outer_iter() {
            let z = x_t.dot(&self.kernel) + h.dot(&self.recurrent_kernel) + &self.bias;

            let i = z.slice(s![0..u]).mapv(sigmoid);
            let f = z.slice(s![u..2 * u]).mapv(sigmoid);
            let g = z.slice(s![2 * u..3 * u]).mapv(relu);
            let o = z.slice(s![3 * u..4 * u]).mapv(sigmoid);

            c = &f * &c + &i * &g;
            h = &o * &c.mapv(relu);
        }

        h.dot(&self.dense_kernel) + self.dense_bias
    }
}

impl Regressor for LstmRegressor {
    fn predict(&self, input: &Array3<f64>) -> Result<Array2<f64>> {
        check_input(input)?;

        let values: Vec<f64> = input.outer_iter().map(|seq| self.forward(seq)).collect();
        Ok(Array2::from_shape_vec((values.len(), 1), values)?)
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::models::ModelArtifact;
    use crate::features::{feature_names, FEATURE_SET_VERSION, WINDOW_SIZE};
    use crate::ml::{ModelType, ValidationMetrics};

    fn model(units: usize) -> LstmRegressor {
        LstmRegressor {
            metadata: ModelMetadata {
                model_id: "lstm_test".to_string(),
                model_type: ModelType::Lstm,
                version: "1.0.0".to_string(),
                trained_at: chrono::Utc::now(),
                training_samples: 0,
                validation_metrics: ValidationMetrics::default(),
                feature_names: feature_names(),
                feature_set_version: FEATURE_SET_VERSION,
                window_size: WINDOW_SIZE,
            },
            units,
            kernel: Array2::zeros((NUM_FEATURES, 4 * units)),
            recurrent_kernel: Array2::zeros((units, 4 * units)),
            bias: Array1::zeros(4 * units),
            dense_kernel: Array1::ones(units),
            dense_bias: 0.3,
        }
    }

    #[test]
    fn test_zero_weights_yield_dense_bias() {
        let out = model(4)
            .predict(&Array3::from_elem((1, WINDOW_SIZE, NUM_FEATURES), 0.7))
            .unwrap();
        assert_eq!(out.shape(), &[1, 1]);
        assert_eq!(out[[0, 0]], 0.3);
    }

    #[test]
    fn test_single_step_cell_update() {
        let mut m = model(1);
        // input gate and output gate saturated open, candidate = x_0
        m.bias[0] = 50.0;
        m.bias[1] = -50.0;
        m.bias[3] = 50.0;
        m.kernel[[0, 2]] = 1.0;
        m.dense_bias = 0.0;

        let mut input = Array3::zeros((1, WINDOW_SIZE, NUM_FEATURES));
        input[[0, WINDOW_SIZE - 1, 0]] = 0.5;

        let out = m.predict(&input).unwrap();
        assert!((out[[0, 0]] - 0.5).abs() < 1e-6, "got {}", out[[0, 0]]);
    }

    #[test]
    fn test_validate_rejects_mismatched_shapes() {
        let mut m = model(3);
        m.recurrent_kernel = Array2::zeros((2, 12));
        assert!(m.validate().is_err());

        let mut m = model(3);
        m.dense_kernel = Array1::zeros(2);
        assert!(m.validate().is_err());
    }

    #[test]
    fn test_weight_shapes_are_checked_when_loading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lstm.json");

        let mut broken = model(3);
        broken.bias = Array1::zeros(5);
        ModelArtifact::Lstm(broken).save(&path).unwrap();
        assert!(ModelArtifact::load(&path).is_err());

        ModelArtifact::Lstm(model(3)).save(&path).unwrap();
        let regressor = ModelArtifact::load(&path).unwrap().into_regressor();
        let input = Array3::from_elem((2, WINDOW_SIZE, NUM_FEATURES), 0.1);
        for _ in 0..3 {
            let out = regressor.predict(&input).unwrap();
            assert_eq!(out.shape(), &[2, 1]);
            assert_eq!(out[[1, 0]], 0.3);
        }
    }
}
