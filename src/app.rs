use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::config::{Config, ModelConfig};
use crate::forecast::ForecastService;
use crate::ml::{ModelArtifact, ScalerSet};
use crate::repo::Repositories;

#[derive(Clone)]
pub struct AppState {
    pub service: ForecastService,
}

impl AppState {
    pub async fn new(cfg: &Config) -> Result<Self> {
        let repos = Repositories::new(cfg).await?;
        let service = load_service(&cfg.model, &repos)?;
        Ok(Self { service })
    }

    pub fn with_service(service: ForecastService) -> Self {
        Self { service }
    }
}

/// Load scalers and model once, failing fast on a feature contract mismatch
pub fn load_service(model: &ModelConfig, repos: &Repositories) -> Result<ForecastService> {
    let scalers = ScalerSet::load(&model.scaler_path)?;
    let artifact = ModelArtifact::load(&model.model_path)?;
    info!(
        model_id = %artifact.metadata().model_id,
        model_type = ?artifact.metadata().model_type,
        "loaded model"
    );

    ForecastService::new(
        repos.history.clone(),
        repos.forecasts.clone(),
        Arc::new(scalers),
        artifact.into_regressor(),
    )
    .context("Scalers do not match the published feature order")
}
