use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::{ForecastOutcome, ForecastRecord, Persistence};
use crate::error::{ForecastError, ForecastResult};
use crate::features::{build_window, FeatureWindow};
use crate::ml::{assemble, Regressor, ScalerSet};
use crate::repo::{ForecastStore, HistorySource};

/// Serves one-day-ahead forecasts.
///
/// Scalers and regressor are loaded once and shared read-only by every request.
#[derive(Clone)]
pub struct ForecastService {
    history: Arc<dyn HistorySource>,
    store: Arc<dyn ForecastStore>,
    scalers: Arc<ScalerSet>,
    regressor: Arc<dyn Regressor>,
}

impl ForecastService {
    /// Fails if the scalers do not match the published feature contract
    pub fn new(
        history: Arc<dyn HistorySource>,
        store: Arc<dyn ForecastStore>,
        scalers: Arc<ScalerSet>,
        regressor: Arc<dyn Regressor>,
    ) -> ForecastResult<Self> {
        scalers.validate()?;
        Ok(Self {
            history,
            store,
            scalers,
            regressor,
        })
    }

    pub fn history(&self) -> &Arc<dyn HistorySource> {
        &self.history
    }

    pub fn regressor(&self) -> &Arc<dyn Regressor> {
        &self.regressor
    }

    /// Compute the forecast for `target_date` without storing it
    pub async fn predict(&self, target_date: NaiveDate) -> ForecastResult<ForecastRecord> {
        let (start, end) = FeatureWindow::history_range(target_date)?;
        let last = end.pred_opt().unwrap_or(start);
        let history = self
            .history
            .fetch_range(start, last)
            .await
            .map_err(|e| ForecastError::data_source(target_date, format!("{e:#}")))?;

        let window = build_window(target_date, &history)?;
        let tensor = assemble(&window, &self.scalers.features)?;

        let output = self
            .regressor
            .predict(&tensor)
            .map_err(|e| ForecastError::regressor(format!("{e:#}")))?;
        if output.shape() != [1, 1] {
            return Err(ForecastError::regressor(format!(
                "expected output shape [1, 1], got {:?}",
                output.shape()
            )));
        }

        let scaled = output[[0, 0]];
        if !scaled.is_finite() {
            return Err(ForecastError::regressor(format!("non-finite prediction {scaled}")));
        }

        let value = self.scalers.target.inverse_transform_scalar(scaled)?;
        debug!(%target_date, scaled, value, "computed forecast");
        Ok(ForecastRecord::new(target_date, value))
    }

    /// Compute and upsert the forecast for `target_date`.
    ///
    /// A failed upsert still returns the computed value, marked
    /// [`Persistence::Failed`].
    pub async fn forecast(&self, target_date: NaiveDate) -> ForecastResult<ForecastOutcome> {
        let record = self.predict(target_date).await?;

        let persistence = match self.store.upsert_forecast(record).await {
            Ok(()) => Persistence::Saved,
            Err(e) => {
                let err = ForecastError::Persistence {
                    date: target_date,
                    reason: format!("{e:#}"),
                };
                warn!(%target_date, error = %err, "forecast computed but not persisted");
                Persistence::Failed(err.to_string())
            }
        };

        info!(%target_date, value = record.value, persisted = persistence.is_saved(), "forecast served");
        Ok(ForecastOutcome {
            record,
            persistence,
        })
    }
}
