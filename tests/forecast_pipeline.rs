//! End-to-end forecasting through the public API: in-memory history,
//! fitted scalers, a windowed linear regressor and the HTTP router.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, NaiveDate};
use daily_load_forecaster::api;
use daily_load_forecaster::app::AppState;
use daily_load_forecaster::config::Config;
use daily_load_forecaster::domain::{DailyObservation, DailyWeather, Persistence};
use daily_load_forecaster::features::{build_feature_table, build_window, Feature, WINDOW_SIZE};
use daily_load_forecaster::forecast::ForecastService;
use daily_load_forecaster::ml::models::WindowedLinearRegressor;
use daily_load_forecaster::ml::training::fit_scalers;
use daily_load_forecaster::ml::{assemble, ScalerSet};
use daily_load_forecaster::repo::{ForecastStore, InMemoryStore, Repositories};
use daily_load_forecaster::ForecastError;
use tower::ServiceExt;

fn target() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
}

fn observation(date: NaiveDate, consumption: f64, temp: f64) -> DailyObservation {
    DailyObservation::from_parts(
        consumption,
        DailyWeather {
            date,
            temp_moy: temp,
            humidity: 85.0,
            vent_vitesse: 20.0,
            rayonnement_moyen: 60.0,
        },
    )
}

/// 30 days of constant consumption and temperature before the target
fn constant_history(days: usize) -> Vec<DailyObservation> {
    let start = target() - Duration::days(WINDOW_SIZE as i64);
    (0..days)
        .map(|i| observation(start + Duration::days(i as i64), 1000.0, 12.0))
        .collect()
}

/// A year of varied history to fit the scalers on
fn scalers() -> Arc<ScalerSet> {
    let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
    let history: Vec<DailyObservation> = (0..365)
        .map(|i| {
            let t = i as f64;
            let mut o = observation(
                start + Duration::days(i),
                800.0 + 400.0 * (t / 58.0).sin().abs(),
                2.0 + 20.0 * (t / 365.0),
            );
            o.humidity = 60.0 + (i % 30) as f64;
            o.vent_vitesse = 5.0 + (i % 25) as f64;
            o.rayonnement_moyen = 10.0 + (i % 200) as f64;
            o
        })
        .collect();
    Arc::new(fit_scalers(&build_feature_table(&history).unwrap()).unwrap())
}

fn service(store: Arc<InMemoryStore>) -> ForecastService {
    let repos = Repositories::from_store(store);
    ForecastService::new(
        repos.history,
        repos.forecasts,
        scalers(),
        Arc::new(WindowedLinearRegressor::zeros(0.5)),
    )
    .unwrap()
}

#[test]
fn scenario_a_constant_history_features() {
    let window = build_window(target(), &constant_history(WINDOW_SIZE)).unwrap();
    assert_eq!(window.len(), WINDOW_SIZE);

    for v in window.vectors() {
        assert_eq!(v.get(Feature::ConsoObsJ1), 1000.0);
        assert_eq!(v.get(Feature::ConsoObsJ2), 1000.0);
        assert_eq!(v.get(Feature::ConsoObsJ7), 1000.0);
        assert_eq!(v.get(Feature::TempPrevJ), 12.0);
        assert_eq!(v.get(Feature::TempPrevJ1), 12.0);
        assert_eq!(v.get(Feature::IsHoliday), 0.0);
        assert_eq!(v.get(Feature::IsHolidayPrev), 0.0);
        assert_eq!(v.get(Feature::IsHolidayNext), 0.0);
    }

    let tensor = assemble(&window, &scalers().features).unwrap();
    assert_eq!(tensor.shape(), &[1, WINDOW_SIZE, 19]);
    assert!(tensor.iter().all(|x| x.is_finite()));
}

#[tokio::test]
async fn scenario_b_short_history_is_rejected_without_writes() {
    let store = Arc::new(InMemoryStore::with_observations(constant_history(WINDOW_SIZE - 1)));
    let svc = service(store.clone());

    let err = svc.forecast(target()).await.unwrap_err();
    match err {
        ForecastError::InsufficientHistory {
            expected,
            found,
            missing_from,
            missing_to,
            ..
        } => {
            assert_eq!(expected, WINDOW_SIZE);
            assert_eq!(found, WINDOW_SIZE - 1);
            assert_eq!(missing_from, target() - Duration::days(1));
            assert_eq!(missing_to, target() - Duration::days(1));
        }
        other => panic!("expected InsufficientHistory, got {other:?}"),
    }
    assert_eq!(store.forecast_count(), 0);
}

#[tokio::test]
async fn scenario_c_repeated_forecast_is_idempotent() {
    let store = Arc::new(InMemoryStore::with_observations(constant_history(WINDOW_SIZE)));
    let svc = service(store.clone());

    let first = svc.forecast(target()).await.unwrap();
    let second = svc.forecast(target()).await.unwrap();

    assert_eq!(first.record.value, second.record.value);
    assert_eq!(first.persistence, Persistence::Saved);
    assert_eq!(store.forecast_count(), 1);
    assert_eq!(
        store.get_forecast(target()).await.unwrap(),
        Some(second.record)
    );
}

fn app(store: Arc<InMemoryStore>) -> axum::Router {
    let state = AppState::with_service(service(store));
    api::router(state, &Config::default())
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn http_predict_returns_forecast() {
    let store = Arc::new(InMemoryStore::with_observations(constant_history(WINDOW_SIZE)));
    let (status, body) = get(app(store.clone()), "/api/v1/predict?d=2025-03-01").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["date"], "2025-03-01");
    assert_eq!(body["persisted"], true);
    assert!(body["prediction"].as_f64().unwrap().is_finite());
    assert_eq!(store.forecast_count(), 1);
}

#[tokio::test]
async fn http_predict_maps_errors() {
    let store = Arc::new(InMemoryStore::with_observations(constant_history(WINDOW_SIZE - 1)));

    let (status, body) = get(app(store.clone()), "/api/v1/predict?d=2025-03-01").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "InsufficientHistory");
    assert!(body["message"].as_str().unwrap().contains("2025-02-28"));

    let (status, body) = get(app(store.clone()), "/api/v1/predict?d=tomorrow").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadRequest");

    let (status, _) = get(app(store), "/api/v1/predict").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn http_predict_near_min_date_is_unprocessable() {
    let store = Arc::new(InMemoryStore::with_observations(constant_history(WINDOW_SIZE)));
    let (status, body) = get(app(store.clone()), "/api/v1/predict?d=-262143-01-05").await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "InsufficientHistory");
    assert_eq!(store.forecast_count(), 0);

    let (status, _) = get(app(store), "/api/v1/predict?d=2025-03-01").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn http_health_reports_model() {
    let store = Arc::new(InMemoryStore::new());
    let (status, body) = get(app(store), "/api/v1/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["model"]["model_type"], "windowed_linear");
    assert_eq!(body["model"]["feature_set_version"], 1);
}
