//! Feature engineering for the daily consumption model
//!
//! The 19-feature order defined by [`Feature`] is the contract between the
//! training pipeline and the forecast service. Scaler and model artefacts
//! record [`FEATURE_SET_VERSION`] and the feature names they were fitted on;
//! reordering the enum requires retraining and a version bump.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum::{EnumCount, EnumIter, IntoEnumIterator, IntoStaticStr};

pub mod formula;
pub mod table;
pub mod window;

pub use formula::LagMode;
pub use table::{build_feature_table, contiguous_runs, FeatureRow, FeatureTable};
pub use window::{build_window, FeatureWindow};

/// Number of consecutive days fed to the regressor per prediction
pub const WINDOW_SIZE: usize = 30;

pub const NUM_FEATURES: usize = Feature::COUNT;

pub const FEATURE_SET_VERSION: u32 = 1;

/// Model input features, in their published order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount, IntoStaticStr)]
pub enum Feature {
    #[strum(serialize = "conso_obs_j-1")]
    ConsoObsJ1,
    #[strum(serialize = "conso_obs_j-2")]
    ConsoObsJ2,
    #[strum(serialize = "conso_obs_j-7")]
    ConsoObsJ7,
    #[strum(serialize = "temp_moy")]
    TempMoy,
    #[strum(serialize = "humidity")]
    Humidity,
    #[strum(serialize = "vent_vitesse")]
    VentVitesse,
    #[strum(serialize = "rayonnement_moyen")]
    RayonnementMoyen,
    #[strum(serialize = "temp_obs_j-1")]
    TempObsJ1,
    #[strum(serialize = "humidity_j-1")]
    HumidityJ1,
    #[strum(serialize = "rayonnement_moyen_j-1")]
    RayonnementMoyenJ1,
    #[strum(serialize = "vent_vitesse_j-1")]
    VentVitesseJ1,
    #[strum(serialize = "temp_prev_j")]
    TempPrevJ,
    #[strum(serialize = "temp_prev_j+1")]
    TempPrevJ1,
    #[strum(serialize = "day_of_week")]
    DayOfWeek,
    #[strum(serialize = "month")]
    Month,
    #[strum(serialize = "is_weekend")]
    IsWeekend,
    #[strum(serialize = "is_holiday")]
    IsHoliday,
    #[strum(serialize = "is_holiday_prev")]
    IsHolidayPrev,
    #[strum(serialize = "is_holiday_next")]
    IsHolidayNext,
}

impl Feature {
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        self.into()
    }
}

/// Feature names in published order
pub fn feature_names() -> Vec<String> {
    Feature::iter().map(|f| f.name().to_string()).collect()
}

/// The 19 features of one date, in published order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub date: NaiveDate,
    values: [f64; NUM_FEATURES],
}

impl FeatureVector {
    pub fn new(date: NaiveDate, values: [f64; NUM_FEATURES]) -> Self {
        Self { date, values }
    }

    pub fn get(&self, feature: Feature) -> f64 {
        self.values[feature.index()]
    }

    pub fn values(&self) -> &[f64; NUM_FEATURES] {
        &self.values
    }
}

pub(crate) fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}
