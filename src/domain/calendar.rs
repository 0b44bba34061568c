//! Calendar flags for daily observations
//!
//! Day-of-week, month, weekend and French public holiday flags. The holiday
//! list covers metropolitan France: fixed dates plus the Easter-based Monday,
//! Ascension and Whit Monday.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Calendar attributes of a single date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarFlags {
    /// Day of week (0=Monday, 6=Sunday)
    pub day_of_week: u32,
    /// Month (1-12)
    pub month: u32,
    pub is_weekend: bool,
    pub is_holiday: bool,
}

impl CalendarFlags {
    pub fn for_date(date: NaiveDate) -> Self {
        let day_of_week = date.weekday().num_days_from_monday();
        Self {
            day_of_week,
            month: date.month(),
            is_weekend: matches!(date.weekday(), Weekday::Sat | Weekday::Sun),
            is_holiday: is_french_holiday(date),
        }
    }
}

/// Check if a date is a French public holiday
pub fn is_french_holiday(date: NaiveDate) -> bool {
    let fixed = matches!(
        (date.month(), date.day()),
        (1, 1)     // Jour de l'an
        | (5, 1)   // Fête du Travail
        | (5, 8)   // Victoire 1945
        | (7, 14)  // Fête nationale
        | (8, 15)  // Assomption
        | (11, 1)  // Toussaint
        | (11, 11) // Armistice
        | (12, 25) // Noël
    );
    if fixed {
        return true;
    }

    let Some(easter) = easter_sunday(date.year()) else {
        return false;
    };
    [1, 39, 50]
        .iter()
        .any(|offset| easter + Duration::days(*offset) == date)
}

/// Gregorian Easter Sunday (anonymous Gregorian algorithm)
pub fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;

    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}
