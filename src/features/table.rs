//! Training-time feature table
//!
//! Built over the whole history with [`LagMode::ShiftAndDrop`]: the history
//! is cut into date-contiguous runs and rows whose shifts are undefined (the
//! first 7 days and the last day of each run) are dropped.

use anyhow::Result;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{formula, FeatureVector, LagMode, NUM_FEATURES};
use crate::domain::DailyObservation;

/// One training row: the date's features and its observed consumption
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub features: FeatureVector,
    pub target: f64,
}

impl FeatureRow {
    pub fn date(&self) -> NaiveDate {
        self.features.date
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable {
    pub rows: Vec<FeatureRow>,
}

impl FeatureTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows with `from <= date <= to`
    pub fn between(&self, from: NaiveDate, to: NaiveDate) -> FeatureTable {
        FeatureTable {
            rows: self
                .rows
                .iter()
                .filter(|r| r.date() >= from && r.date() <= to)
                .copied()
                .collect(),
        }
    }

    pub fn feature_matrix(&self) -> Vec<[f64; NUM_FEATURES]> {
        self.rows.iter().map(|r| *r.features.values()).collect()
    }

    pub fn targets(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.target).collect()
    }
}

/// Split ascending observations into runs of consecutive dates
pub fn contiguous_runs(observations: &[DailyObservation]) -> Vec<&[DailyObservation]> {
    let mut runs = Vec::new();
    let mut start = 0;

    for i in 1..=observations.len() {
        let breaks = i == observations.len()
            || observations[i].date != observations[i - 1].date + Duration::days(1);
        if breaks {
            runs.push(&observations[start..i]);
            start = i;
        }
    }

    runs
}

/// Build the full historical feature table.
///
/// Observations are sorted by date first; duplicate dates are rejected.
pub fn build_feature_table(observations: &[DailyObservation]) -> Result<FeatureTable> {
    let mut sorted = observations.to_vec();
    sorted.sort_by_key(|o| o.date);

    if let Some(pair) = sorted.windows(2).find(|w| w[0].date == w[1].date) {
        anyhow::bail!("duplicate observation for {}", pair[0].date);
    }

    let runs = contiguous_runs(&sorted);
    let rows: Vec<FeatureRow> = runs
        .iter()
        .flat_map(|run| {
            (0..run.len()).filter_map(move |i| {
                formula::compute(run, i, LagMode::ShiftAndDrop).map(|features| FeatureRow {
                    features,
                    target: run[i].consumption,
                })
            })
        })
        .collect();

    debug!(
        observations = sorted.len(),
        runs = runs.len(),
        rows = rows.len(),
        "built feature table"
    );

    Ok(FeatureTable { rows })
}
