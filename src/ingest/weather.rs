use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;

use super::DateRange;
use crate::domain::DailyWeather;

const HOURLY_VARIABLES: &str = "temperature_2m,relative_humidity_2m,wind_speed_10m,shortwave_radiation";

#[derive(Debug, Deserialize)]
struct ArchiveResponse {
    hourly: Hourly,
}

#[derive(Debug, Deserialize)]
struct Hourly {
    time: Vec<String>,
    temperature_2m: Vec<Option<f64>>,
    relative_humidity_2m: Vec<Option<f64>>,
    wind_speed_10m: Vec<Option<f64>>,
    shortwave_radiation: Vec<Option<f64>>,
}

#[derive(Debug, Default)]
struct Mean {
    sum: f64,
    n: usize,
}

impl Mean {
    fn add(&mut self, value: Option<f64>) {
        if let Some(v) = value {
            self.sum += v;
            self.n += 1;
        }
    }

    fn get(&self) -> Option<f64> {
        (self.n > 0).then(|| self.sum / self.n as f64)
    }
}

/// Client for the Open-Meteo historical archive
pub struct WeatherClient {
    client: ClientWithMiddleware,
    base_url: String,
    latitude: f64,
    longitude: f64,
    timezone: String,
}

impl WeatherClient {
    pub fn new(
        client: ClientWithMiddleware,
        base_url: &str,
        latitude: f64,
        longitude: f64,
        timezone: &str,
    ) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
            latitude,
            longitude,
            timezone: timezone.to_string(),
        }
    }

    /// Daily mean weather over `range`, by local date
    pub async fn fetch(&self, range: DateRange) -> Result<Vec<DailyWeather>> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("latitude", self.latitude.to_string()),
                ("longitude", self.longitude.to_string()),
                ("start_date", range.start.to_string()),
                ("end_date", range.end.to_string()),
                ("hourly", HOURLY_VARIABLES.to_string()),
                ("timezone", self.timezone.clone()),
            ])
            .send()
            .await
            .context("Failed to send request to the weather API")?;

        if !response.status().is_success() {
            anyhow::bail!("Weather API error: {}", response.status());
        }

        let archive: ArchiveResponse = response
            .json()
            .await
            .context("Failed to parse weather archive")?;

        daily_means(archive.hourly)
    }
}

fn daily_means(hourly: Hourly) -> Result<Vec<DailyWeather>> {
    let n = hourly.time.len();
    if [
        hourly.temperature_2m.len(),
        hourly.relative_humidity_2m.len(),
        hourly.wind_speed_10m.len(),
        hourly.shortwave_radiation.len(),
    ]
    .iter()
    .any(|len| *len != n)
    {
        anyhow::bail!("Hourly weather series have different lengths");
    }

    let mut days: BTreeMap<NaiveDate, [Mean; 4]> = BTreeMap::new();
    for (i, time) in hourly.time.iter().enumerate() {
        let ts = NaiveDateTime::parse_from_str(time, "%Y-%m-%dT%H:%M")
            .with_context(|| format!("Invalid hourly timestamp {time}"))?;
        let day = days.entry(ts.date()).or_default();
        day[0].add(hourly.temperature_2m[i]);
        day[1].add(hourly.relative_humidity_2m[i]);
        day[2].add(hourly.wind_speed_10m[i]);
        day[3].add(hourly.shortwave_radiation[i]);
    }

    let daily: Vec<DailyWeather> = days
        .into_iter()
        .filter_map(|(date, [t, h, w, r])| {
            Some(DailyWeather {
                date,
                temp_moy: t.get()?,
                humidity: h.get()?,
                vent_vitesse: w.get()?,
                rayonnement_moyen: r.get()?,
            })
        })
        .collect();

    debug!(hours = n, days = daily.len(), "resampled hourly weather");
    Ok(daily)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::http_client;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_resamples_to_daily_means() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("latitude", "48.3904"))
            .and(query_param("longitude", "-4.4861"))
            .and(query_param("hourly", HOURLY_VARIABLES))
            .and(query_param("timezone", "Europe/Berlin"))
            .and(query_param("start_date", "2024-01-01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "latitude": 48.39,
                "hourly": {
                    "time": ["2024-01-01T00:00", "2024-01-01T01:00", "2024-01-02T00:00", "2024-01-03T00:00"],
                    "temperature_2m": [4.0, 6.0, 8.0, null],
                    "relative_humidity_2m": [80.0, 90.0, 70.0, 75.0],
                    "wind_speed_10m": [10.0, null, 12.0, 13.0],
                    "shortwave_radiation": [0.0, 20.0, 50.0, 60.0]
                }
            })))
            .mount(&server)
            .await;

        let client = WeatherClient::new(
            http_client(5, 0).unwrap(),
            &server.uri(),
            48.3904,
            -4.4861,
            "Europe/Berlin",
        );
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
        )
        .unwrap();
        let daily = client.fetch(range).await.unwrap();

        // 2024-01-03 has no temperature and is dropped
        assert_eq!(daily.len(), 2);
        assert_eq!(daily[0].temp_moy, 5.0);
        assert_eq!(daily[0].humidity, 85.0);
        assert_eq!(daily[0].vent_vitesse, 10.0);
        assert_eq!(daily[0].rayonnement_moyen, 10.0);
        assert_eq!(daily[1].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
    }

    #[test]
    fn test_daily_means_rejects_ragged_series() {
        let hourly = Hourly {
            time: vec!["2024-01-01T00:00".to_string()],
            temperature_2m: vec![],
            relative_humidity_2m: vec![Some(1.0)],
            wind_speed_10m: vec![Some(1.0)],
            shortwave_radiation: vec![Some(1.0)],
        };
        assert!(daily_means(hourly).is_err());
    }
}
