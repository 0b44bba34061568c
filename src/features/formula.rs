//! Per-date feature formulas shared by training and inference
//!
//! Both paths compute the same 19 features from a date-contiguous run of
//! observations. They differ only at the edges of the run, selected by
//! [`LagMode`]:
//!
//! | feature                          | `TruncateAndFallback` (serving) | `ShiftAndDrop` (training)      |
//! |----------------------------------|---------------------------------|--------------------------------|
//! | `conso_obs_j-k`, weather `_j-1`  | current day when `i < k`        | row dropped when `i < k`       |
//! | `temp_prev_j+1`                  | same-day temperature            | next day's temperature, or drop|
//! | `is_holiday_prev` / `_next`      | always 0                        | next / previous day's flag     |
//!
//! The holiday columns keep the naming the model was trained with:
//! `is_holiday_prev` holds the *following* day's flag and `is_holiday_next`
//! the *preceding* day's.

use super::{flag, Feature, FeatureVector, NUM_FEATURES};
use crate::domain::DailyObservation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LagMode {
    /// Lags that reach before the run start repeat the current day
    TruncateAndFallback,
    /// Lags use true shifted values; rows without them are dropped
    ShiftAndDrop,
}

/// Compute the feature vector of `run[i]`.
///
/// `run` must be sorted ascending with one observation per consecutive date.
/// Returns `None` only in [`LagMode::ShiftAndDrop`] when a shift is undefined.
pub fn compute(run: &[DailyObservation], i: usize, mode: LagMode) -> Option<FeatureVector> {
    let current = run.get(i)?;

    let lagged = |k: usize| -> Option<&DailyObservation> {
        match i.checked_sub(k) {
            Some(j) => run.get(j),
            None => match mode {
                LagMode::TruncateAndFallback => Some(current),
                LagMode::ShiftAndDrop => None,
            },
        }
    };

    let j1 = lagged(1)?;
    let j2 = lagged(2)?;
    let j7 = lagged(7)?;

    let next_day_temp = match mode {
        // no next-day weather forecast is available at serving time
        LagMode::TruncateAndFallback => current.temp_moy,
        LagMode::ShiftAndDrop => run.get(i + 1)?.temp_moy,
    };

    // TODO: serve real shifted holiday flags once the model is retrained on them
    let (holiday_prev, holiday_next) = match mode {
        LagMode::TruncateAndFallback => (0.0, 0.0),
        LagMode::ShiftAndDrop => (
            run.get(i + 1).map_or(0.0, |o| flag(o.is_holiday)),
            i.checked_sub(1)
                .and_then(|j| run.get(j))
                .map_or(0.0, |o| flag(o.is_holiday)),
        ),
    };

    let mut values = [0.0; NUM_FEATURES];
    let mut set = |feature: Feature, value: f64| values[feature.index()] = value;

    set(Feature::ConsoObsJ1, j1.consumption);
    set(Feature::ConsoObsJ2, j2.consumption);
    set(Feature::ConsoObsJ7, j7.consumption);
    set(Feature::TempMoy, current.temp_moy);
    set(Feature::Humidity, current.humidity);
    set(Feature::VentVitesse, current.vent_vitesse);
    set(Feature::RayonnementMoyen, current.rayonnement_moyen);
    set(Feature::TempObsJ1, j1.temp_moy);
    set(Feature::HumidityJ1, j1.humidity);
    set(Feature::RayonnementMoyenJ1, j1.rayonnement_moyen);
    set(Feature::VentVitesseJ1, j1.vent_vitesse);
    set(Feature::TempPrevJ, current.temp_moy);
    set(Feature::TempPrevJ1, next_day_temp);
    set(Feature::DayOfWeek, current.day_of_week as f64);
    set(Feature::Month, current.month as f64);
    set(Feature::IsWeekend, flag(current.is_weekend));
    set(Feature::IsHoliday, flag(current.is_holiday));
    set(Feature::IsHolidayPrev, holiday_prev);
    set(Feature::IsHolidayNext, holiday_next);

    Some(FeatureVector::new(current.date, values))
}
