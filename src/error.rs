//! Error taxonomy of the forecasting core.
//!
//! Plumbing (config, ETL, training binaries) uses `anyhow`; everything a
//! forecast request can fail with is a [`ForecastError`] so the API layer can
//! tell client-visible failures from deployment bugs.

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForecastError {
    /// Fewer than the required number of contiguous days precede the target.
    #[error(
        "insufficient history for {target_date}: expected {expected} contiguous days, \
         found {found}; missing {missing_from}..={missing_to}"
    )]
    InsufficientHistory {
        target_date: NaiveDate,
        expected: usize,
        found: usize,
        missing_from: NaiveDate,
        missing_to: NaiveDate,
    },

    /// The fitted scaler does not match the published feature order.
    #[error("scaler mismatch: expected {expected} features, scaler has {found} ({detail})")]
    ScalerMismatch {
        expected: usize,
        found: usize,
        detail: String,
    },

    #[error("history source failed for {target_date}: {reason}")]
    DataSource {
        target_date: NaiveDate,
        reason: String,
    },

    #[error("failed to persist forecast for {date}: {reason}")]
    Persistence { date: NaiveDate, reason: String },

    #[error("regressor failed: {reason}")]
    Regressor { reason: String },
}

impl ForecastError {
    pub fn data_source(target_date: NaiveDate, err: impl std::fmt::Display) -> Self {
        Self::DataSource {
            target_date,
            reason: err.to_string(),
        }
    }

    pub fn regressor(err: impl std::fmt::Display) -> Self {
        Self::Regressor {
            reason: err.to_string(),
        }
    }

    /// Whether the failure is caused by the request rather than the deployment.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InsufficientHistory { .. })
    }
}

pub type ForecastResult<T> = std::result::Result<T, ForecastError>;
