//! ETL: daily consumption and weather for the metropole
//!
//! - [`ElectricityClient`]: half-hourly consumption from the ODRE eco2mix export
//! - [`WeatherClient`]: hourly Open-Meteo archive, resampled to daily means
//! - [`aggregate_daily`] and [`merge_daily`]: daily join with calendar flags
//! - the J-1 baseline is refreshed once the observations are stored
//!
//! Retries live here, on the HTTP clients. The forecast service never retries.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

use crate::config::IngestConfig;
use crate::domain::{DailyObservation, DailyWeather};
use crate::repo::ObservationStore;

pub mod electricity;
pub mod weather;

pub use electricity::{ConsumptionPoint, ElectricityClient};
pub use weather::WeatherClient;

/// Inclusive date range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            anyhow::bail!("Invalid date range {start}..={end}");
        }
        Ok(Self { start, end })
    }
}

/// HTTP client retrying transient failures with exponential backoff
pub fn http_client(timeout_secs: u64, max_retries: u32) -> Result<ClientWithMiddleware> {
    let inner = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .context("Failed to build HTTP client")?;

    let policy = ExponentialBackoff::builder()
        .retry_bounds(
            std::time::Duration::from_millis(200),
            std::time::Duration::from_secs(30),
        )
        .build_with_max_retries(max_retries);

    Ok(ClientBuilder::new(inner)
        .with(RetryTransientMiddleware::new_with_policy(policy))
        .build())
}

/// Mean consumption per UTC day. Days missing between the first and last
/// observed day are linearly interpolated.
pub fn aggregate_daily(points: &[ConsumptionPoint]) -> Vec<(NaiveDate, f64)> {
    let mut sums: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    for p in points {
        let entry = sums.entry(p.timestamp.date_naive()).or_insert((0.0, 0));
        entry.0 += p.consommation;
        entry.1 += 1;
    }

    let known: Vec<(NaiveDate, f64)> = sums
        .into_iter()
        .map(|(date, (sum, n))| (date, sum / n as f64))
        .collect();

    let mut daily = Vec::with_capacity(known.len());
    for pair in known.windows(2) {
        let ((d0, v0), (d1, v1)) = (pair[0], pair[1]);
        daily.push((d0, v0));

        let span = (d1 - d0).num_days();
        for k in 1..span {
            let t = k as f64 / span as f64;
            daily.push((d0 + Duration::days(k), v0 + t * (v1 - v0)));
        }
    }
    if let Some(last) = known.last() {
        daily.push(*last);
    }
    daily
}

/// Inner join of daily consumption and weather on date
pub fn merge_daily(consumption: &[(NaiveDate, f64)], weather: &[DailyWeather]) -> Vec<DailyObservation> {
    let by_date: HashMap<NaiveDate, f64> = consumption.iter().copied().collect();
    let mut merged: Vec<DailyObservation> = weather
        .iter()
        .filter_map(|w| by_date.get(&w.date).map(|c| DailyObservation::from_parts(*c, *w)))
        .collect();
    merged.sort_by_key(|o| o.date);
    merged
}

#[derive(Debug, Clone, Serialize)]
pub struct EtlReport {
    pub consumption_points: usize,
    pub consumption_days: usize,
    pub weather_days: usize,
    pub observations: usize,
    pub baseline_rows: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub finished_at: DateTime<Utc>,
}

/// Fetch both sources, join them by day, upsert into `store` and refresh the baseline
pub async fn run_etl(cfg: &IngestConfig, store: &dyn ObservationStore) -> Result<EtlReport> {
    let range = DateRange::new(cfg.start_date, cfg.end_date)?;
    let client = http_client(cfg.http_timeout_secs, cfg.max_retries)?;

    let electricity = ElectricityClient::new(client.clone(), &cfg.electricity_url, &cfg.metropole);
    let weather = WeatherClient::new(
        client,
        &cfg.weather_url,
        cfg.latitude,
        cfg.longitude,
        &cfg.timezone,
    );

    let (points, daily_weather) = tokio::try_join!(electricity.fetch(range), weather.fetch(range))?;
    let daily_consumption = aggregate_daily(&points);
    let observations = merge_daily(&daily_consumption, &daily_weather);

    if observations.is_empty() {
        warn!(%range.start, %range.end, "no overlapping consumption and weather days");
    }

    let written = store.upsert_observations(&observations).await?;
    let baseline_rows = store.refresh_baseline().await?;

    let report = EtlReport {
        consumption_points: points.len(),
        consumption_days: daily_consumption.len(),
        weather_days: daily_weather.len(),
        observations: written,
        baseline_rows,
        first_date: observations.first().map(|o| o.date),
        last_date: observations.last().map(|o| o.date),
        finished_at: Utc::now(),
    };
    info!(
        points = report.consumption_points,
        consumption_days = report.consumption_days,
        weather_days = report.weather_days,
        observations = report.observations,
        baseline_rows = report.baseline_rows,
        "ETL finished"
    );
    Ok(report)
}
