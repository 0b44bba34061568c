//! Serving-time feature window
//!
//! The window for a target date covers the `WINDOW_SIZE` days of
//! `[target - WINDOW_SIZE, target)`. It is built with
//! [`LagMode::TruncateAndFallback`], so lags never reach outside the window.

use chrono::{Days, Duration, NaiveDate};
use serde::Serialize;

use super::{formula, FeatureVector, LagMode, WINDOW_SIZE};
use crate::domain::DailyObservation;
use crate::error::{ForecastError, ForecastResult};

/// Exactly `WINDOW_SIZE` feature vectors, ascending, ending the day before the target
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureWindow {
    target_date: NaiveDate,
    vectors: Vec<FeatureVector>,
}

impl FeatureWindow {
    /// Half-open history range `[start, end)` needed to forecast `target_date`.
    ///
    /// Targets closer than `WINDOW_SIZE` days to the first representable date
    /// can never have a full window and are reported as
    /// [`ForecastError::InsufficientHistory`].
    pub fn history_range(target_date: NaiveDate) -> ForecastResult<(NaiveDate, NaiveDate)> {
        target_date
            .checked_sub_days(Days::new(WINDOW_SIZE as u64))
            .map(|start| (start, target_date))
            .ok_or_else(|| ForecastError::InsufficientHistory {
                target_date,
                expected: WINDOW_SIZE,
                found: 0,
                missing_from: NaiveDate::MIN,
                missing_to: target_date.pred_opt().unwrap_or(NaiveDate::MIN),
            })
    }

    pub fn target_date(&self) -> NaiveDate {
        self.target_date
    }

    pub fn vectors(&self) -> &[FeatureVector] {
        &self.vectors
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

/// Build the feature window for `target_date`.
///
/// `observations` must be sorted ascending without duplicate dates;
/// observations outside the history range are ignored. Missing days are an
/// [`ForecastError::InsufficientHistory`], never padded.
pub fn build_window(
    target_date: NaiveDate,
    observations: &[DailyObservation],
) -> ForecastResult<FeatureWindow> {
    let (start, end) = FeatureWindow::history_range(target_date)?;

    let in_range: Vec<DailyObservation> = observations
        .iter()
        .filter(|o| o.date >= start && o.date < end)
        .copied()
        .collect();

    if let Some(pair) = in_range.windows(2).find(|w| w[0].date >= w[1].date) {
        return Err(ForecastError::DataSource {
            target_date,
            reason: format!(
                "history not strictly ascending: {} followed by {}",
                pair[0].date, pair[1].date
            ),
        });
    }

    let missing: Vec<NaiveDate> = (0..WINDOW_SIZE as i64)
        .map(|offset| start + Duration::days(offset))
        .filter(|day| in_range.binary_search_by_key(day, |o| o.date).is_err())
        .collect();

    if let (Some(&missing_from), Some(&missing_to)) = (missing.first(), missing.last()) {
        return Err(ForecastError::InsufficientHistory {
            target_date,
            expected: WINDOW_SIZE,
            found: in_range.len(),
            missing_from,
            missing_to,
        });
    }

    let vectors = (0..in_range.len())
        .filter_map(|i| formula::compute(&in_range, i, LagMode::TruncateAndFallback))
        .collect::<Vec<_>>();

    debug_assert_eq!(vectors.len(), WINDOW_SIZE);

    Ok(FeatureWindow {
        target_date,
        vectors,
    })
}
