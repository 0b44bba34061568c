use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::CalendarFlags;

/// Daily mean weather for one date
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyWeather {
    pub date: NaiveDate,
    /// Mean air temperature at 2 m (°C)
    pub temp_moy: f64,
    /// Mean relative humidity (%)
    pub humidity: f64,
    /// Mean wind speed at 10 m (km/h)
    pub vent_vitesse: f64,
    /// Mean shortwave radiation (W/m²)
    pub rayonnement_moyen: f64,
}

/// One day of consumption joined with weather and calendar attributes.
///
/// At most one observation exists per date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyObservation {
    pub date: NaiveDate,
    /// Mean consumption of the day (MW)
    pub consumption: f64,
    pub temp_moy: f64,
    pub humidity: f64,
    pub vent_vitesse: f64,
    pub rayonnement_moyen: f64,
    pub day_of_week: u32,
    pub month: u32,
    pub is_weekend: bool,
    pub is_holiday: bool,
}

impl DailyObservation {
    /// Join a day's consumption with its weather, deriving calendar flags from the date
    pub fn from_parts(consumption: f64, weather: DailyWeather) -> Self {
        let calendar = CalendarFlags::for_date(weather.date);
        Self {
            date: weather.date,
            consumption,
            temp_moy: weather.temp_moy,
            humidity: weather.humidity,
            vent_vitesse: weather.vent_vitesse,
            rayonnement_moyen: weather.rayonnement_moyen,
            day_of_week: calendar.day_of_week,
            month: calendar.month,
            is_weekend: calendar.is_weekend,
            is_holiday: calendar.is_holiday,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_parts_derives_calendar() {
        let weather = DailyWeather {
            date: NaiveDate::from_ymd_opt(2024, 12, 25).unwrap(),
            temp_moy: 7.5,
            humidity: 88.0,
            vent_vitesse: 21.0,
            rayonnement_moyen: 31.0,
        };

        let obs = DailyObservation::from_parts(412.0, weather);
        assert_eq!(obs.consumption, 412.0);
        assert_eq!(obs.month, 12);
        assert_eq!(obs.day_of_week, 2); // Wednesday
        assert!(obs.is_holiday);
        assert!(!obs.is_weekend);
        assert_eq!(obs.date, weather.date);
        assert_eq!(obs.rayonnement_moyen, 31.0);
    }
}
