//! Regressors
//!
//! Every model consumes a `[batch, WINDOW_SIZE, NUM_FEATURES]` tensor of
//! scaled features and returns `[batch, 1]` scaled consumption.
//! - Windowed linear regression, trainable by [`crate::ml::training`]
//! - Single-layer LSTM, inference only, weights exported by an external trainer

use anyhow::{Context, Result};
use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use super::ModelMetadata;
use crate::features::{feature_names, FEATURE_SET_VERSION, NUM_FEATURES, WINDOW_SIZE};

pub mod linear;
pub mod lstm;

pub use linear::WindowedLinearRegressor;
pub use lstm::LstmRegressor;

/// A model mapping feature windows to a scaled prediction
pub trait Regressor: Send + Sync {
    /// Predict `[batch, 1]` from `[batch, WINDOW_SIZE, NUM_FEATURES]`
    fn predict(&self, input: &Array3<f64>) -> Result<Array2<f64>>;

    /// Get model metadata
    fn metadata(&self) -> &ModelMetadata;
}

/// Reject inputs that are not `[batch, WINDOW_SIZE, NUM_FEATURES]`
pub(crate) fn check_input(input: &Array3<f64>) -> Result<()> {
    let shape = input.shape();
    if shape[1] != WINDOW_SIZE || shape[2] != NUM_FEATURES {
        anyhow::bail!(
            "Input shape mismatch: expected [_, {}, {}], got {:?}",
            WINDOW_SIZE,
            NUM_FEATURES,
            shape
        );
    }
    Ok(())
}

/// Serialized model, tagged by kind
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelArtifact {
    WindowedLinear(WindowedLinearRegressor),
    Lstm(LstmRegressor),
}

impl ModelArtifact {
    pub fn metadata(&self) -> &ModelMetadata {
        match self {
            Self::WindowedLinear(m) => m.metadata(),
            Self::Lstm(m) => m.metadata(),
        }
    }

    /// Check the artefact targets the current feature contract
    pub fn validate(&self) -> Result<()> {
        let meta = self.metadata();
        if meta.feature_set_version != FEATURE_SET_VERSION {
            anyhow::bail!(
                "Model {} was trained on feature set v{}, current is v{}",
                meta.model_id,
                meta.feature_set_version,
                FEATURE_SET_VERSION
            );
        }
        if meta.feature_names != feature_names() {
            anyhow::bail!("Model {} feature names differ from the published order", meta.model_id);
        }
        if meta.window_size != WINDOW_SIZE {
            anyhow::bail!(
                "Model {} expects a {}-day window, current is {}",
                meta.model_id,
                meta.window_size,
                WINDOW_SIZE
            );
        }
        match self {
            Self::WindowedLinear(m) => m.validate(),
            Self::Lstm(m) => m.validate(),
        }
    }

    pub fn into_regressor(self) -> Arc<dyn Regressor> {
        match self {
            Self::WindowedLinear(m) => Arc::new(m),
            Self::Lstm(m) => Arc::new(m),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read model from {}", path.display()))?;
        let artifact: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse model in {}", path.display()))?;
        artifact.validate()?;
        Ok(artifact)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string(self)?)
            .with_context(|| format!("Failed to write model to {}", path.display()))?;
        Ok(())
    }
}
