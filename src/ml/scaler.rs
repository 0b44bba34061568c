//! Min-max scaling to `[0, 1]`
//!
//! Fitted once on the training split and immutable afterwards. Columns with
//! a zero range use a scale of 1 so that `inverse_transform(transform(v)) == v`
//! holds for every column.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ForecastError, ForecastResult};
use crate::features::{feature_names, FEATURE_SET_VERSION, NUM_FEATURES};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    feature_names: Vec<String>,
    data_min: Vec<f64>,
    data_range: Vec<f64>,
}

impl MinMaxScaler {
    /// Fit per-column min/max over `rows`
    pub fn fit<R: AsRef<[f64]>>(feature_names: Vec<String>, rows: &[R]) -> Result<Self> {
        if rows.is_empty() {
            anyhow::bail!("Cannot fit scaler on an empty matrix");
        }

        let n = feature_names.len();
        let mut min = vec![f64::INFINITY; n];
        let mut max = vec![f64::NEG_INFINITY; n];

        for (r, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != n {
                anyhow::bail!("Row {} has {} columns, expected {}", r, row.len(), n);
            }
            for (i, value) in row.iter().enumerate() {
                if !value.is_finite() {
                    anyhow::bail!("Non-finite value in row {}, column {}", r, feature_names[i]);
                }
                min[i] = min[i].min(*value);
                max[i] = max[i].max(*value);
            }
        }

        let data_range = min
            .iter()
            .zip(max.iter())
            .map(|(lo, hi)| if hi - lo == 0.0 { 1.0 } else { hi - lo })
            .collect();

        Ok(Self {
            feature_names,
            data_min: min,
            data_range,
        })
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn check_len(&self, len: usize) -> ForecastResult<()> {
        if len != self.n_features() {
            return Err(ForecastError::ScalerMismatch {
                expected: len,
                found: self.n_features(),
                detail: "row length differs from fitted column count".to_string(),
            });
        }
        Ok(())
    }

    pub fn transform(&self, row: &[f64]) -> ForecastResult<Vec<f64>> {
        self.check_len(row.len())?;
        Ok(row
            .iter()
            .zip(self.data_min.iter().zip(self.data_range.iter()))
            .map(|(x, (min, range))| (x - min) / range)
            .collect())
    }

    pub fn inverse_transform(&self, row: &[f64]) -> ForecastResult<Vec<f64>> {
        self.check_len(row.len())?;
        Ok(row
            .iter()
            .zip(self.data_min.iter().zip(self.data_range.iter()))
            .map(|(x, (min, range))| x * range + min)
            .collect())
    }

    /// Scale a single value with a one-column scaler
    pub fn transform_scalar(&self, value: f64) -> ForecastResult<f64> {
        Ok(self.transform(&[value])?[0])
    }

    pub fn inverse_transform_scalar(&self, value: f64) -> ForecastResult<f64> {
        Ok(self.inverse_transform(&[value])?[0])
    }
}

/// The feature and target scalers of one training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerSet {
    pub feature_set_version: u32,
    pub features: MinMaxScaler,
    pub target: MinMaxScaler,
}

impl ScalerSet {
    pub fn new(features: MinMaxScaler, target: MinMaxScaler) -> Self {
        Self {
            feature_set_version: FEATURE_SET_VERSION,
            features,
            target,
        }
    }

    /// Reject scalers fitted on another feature contract
    pub fn validate(&self) -> ForecastResult<()> {
        if self.feature_set_version != FEATURE_SET_VERSION {
            return Err(ForecastError::ScalerMismatch {
                expected: NUM_FEATURES,
                found: self.features.n_features(),
                detail: format!(
                    "feature set version {} (expected {})",
                    self.feature_set_version, FEATURE_SET_VERSION
                ),
            });
        }
        check_feature_order(&self.features)?;
        if self.target.n_features() != 1 {
            return Err(ForecastError::ScalerMismatch {
                expected: 1,
                found: self.target.n_features(),
                detail: "target scaler must have exactly one column".to_string(),
            });
        }
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scalers from {}", path.display()))?;
        let set: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse scalers in {}", path.display()))?;
        set.validate()?;
        Ok(set)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write scalers to {}", path.display()))?;
        Ok(())
    }
}

/// Check that a feature scaler was fitted on the published feature order
pub fn check_feature_order(scaler: &MinMaxScaler) -> ForecastResult<()> {
    if scaler.n_features() != NUM_FEATURES {
        return Err(ForecastError::ScalerMismatch {
            expected: NUM_FEATURES,
            found: scaler.n_features(),
            detail: "feature count".to_string(),
        });
    }

    let expected = feature_names();
    if let Some((i, (want, got))) = expected
        .iter()
        .zip(scaler.feature_names())
        .enumerate()
        .find(|(_, (want, got))| want != got)
    {
        return Err(ForecastError::ScalerMismatch {
            expected: NUM_FEATURES,
            found: scaler.n_features(),
            detail: format!("position {i}: expected '{want}', scaler has '{got}'"),
        });
    }

    Ok(())
}
