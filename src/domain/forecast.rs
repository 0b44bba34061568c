use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::DailyObservation;

/// Model name the J-1 persistence baseline is stored under
pub const BASELINE_J1_MODEL: &str = "baseline_j-1";

/// A point forecast for one date. Upserted: the latest prediction for a date wins.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastRecord {
    pub date: NaiveDate,
    /// Predicted mean consumption (MW)
    pub value: f64,
}

impl ForecastRecord {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        Self { date, value }
    }
}

/// Persistence baseline for one date: yesterday's consumption as today's forecast
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaselineRecord {
    pub date: NaiveDate,
    pub actual: f64,
    /// Consumption of the preceding stored day; `None` for the first one
    pub predicted: Option<f64>,
}

impl BaselineRecord {
    /// Pair each observation with the one before it.
    ///
    /// `observations` must be ascending. The previous row is used even across
    /// a gap in dates.
    pub fn j1_series<'a>(observations: impl IntoIterator<Item = &'a DailyObservation>) -> Vec<Self> {
        let mut previous = None;
        observations
            .into_iter()
            .map(|o| {
                let record = Self {
                    date: o.date,
                    actual: o.consumption,
                    predicted: previous,
                };
                previous = Some(o.consumption);
                record
            })
            .collect()
    }
}

/// Whether a computed forecast reached the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum Persistence {
    Saved,
    Failed(String),
}

impl Persistence {
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved)
    }
}

/// Result of a forecast request: the computed value and its persistence status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastOutcome {
    pub record: ForecastRecord,
    pub persistence: Persistence,
}
