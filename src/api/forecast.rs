use axum::{
    extract::{Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use crate::app::AppState;
use crate::domain::{ForecastOutcome, Persistence};

#[derive(Debug, Deserialize)]
pub struct PredictQuery {
    /// Target date, `YYYY-MM-DD`
    pub d: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct PredictResponse {
    pub date: NaiveDate,
    pub prediction: f64,
    pub persisted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistence_error: Option<String>,
}

impl From<ForecastOutcome> for PredictResponse {
    fn from(outcome: ForecastOutcome) -> Self {
        let (persisted, persistence_error) = match outcome.persistence {
            Persistence::Saved => (true, None),
            Persistence::Failed(reason) => (false, Some(reason)),
        };
        Self {
            date: outcome.record.date,
            prediction: outcome.record.value,
            persisted,
            persistence_error,
        }
    }
}

fn parse_date(raw: Option<&str>) -> Result<NaiveDate, ApiError> {
    let raw = raw.ok_or_else(|| ApiError::BadRequest("missing query parameter d".to_string()))?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| ApiError::BadRequest(format!("invalid date {raw:?}: {e}")))
}

/// GET /predict?d=YYYY-MM-DD
pub async fn predict(
    State(state): State<AppState>,
    Query(q): Query<PredictQuery>,
) -> Result<Json<PredictResponse>, ApiError> {
    let target_date = parse_date(q.d.as_deref())?;
    let outcome = state.service.forecast(target_date).await?;
    Ok(Json(outcome.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ForecastRecord;

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date(Some("2025-06-01")).unwrap(),
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
        );
        assert!(matches!(parse_date(None), Err(ApiError::BadRequest(_))));
        assert!(matches!(parse_date(Some("01/06/2025")), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_response_reports_persistence_failure() {
        let outcome = ForecastOutcome {
            record: ForecastRecord::new(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(), 180.0),
            persistence: Persistence::Failed("timeout".to_string()),
        };
        let json = serde_json::to_value(PredictResponse::from(outcome)).unwrap();
        assert_eq!(json["date"], "2025-06-01");
        assert_eq!(json["prediction"], 180.0);
        assert_eq!(json["persisted"], false);
        assert_eq!(json["persistence_error"], "timeout");
    }
}
