use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use tracing::debug;

use super::DateRange;

/// One consumption measurement (MW)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsumptionPoint {
    pub timestamp: DateTime<Utc>,
    pub consommation: f64,
}

#[derive(Debug, Deserialize)]
struct ExportRecord {
    date_heure: DateTime<Utc>,
    consommation: Option<f64>,
}

/// Client for the ODRE eco2mix metropoles export
pub struct ElectricityClient {
    client: ClientWithMiddleware,
    base_url: String,
    metropole: String,
}

impl ElectricityClient {
    pub fn new(client: ClientWithMiddleware, base_url: &str, metropole: &str) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
            metropole: metropole.to_string(),
        }
    }

    fn where_clause(&self, range: DateRange) -> String {
        format!(
            "libelle_metropole='{}' AND date_heure >= '{}' AND date_heure < '{}'",
            self.metropole.replace('\'', "''"),
            range.start,
            range.end + Duration::days(1)
        )
    }

    /// Measurements in `range`, ascending; null consumptions are dropped
    pub async fn fetch(&self, range: DateRange) -> Result<Vec<ConsumptionPoint>> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("where", self.where_clause(range).as_str()),
                ("order_by", "date_heure ASC"),
                ("timezone", "UTC"),
            ])
            .send()
            .await
            .context("Failed to send request to the electricity API")?;

        if !response.status().is_success() {
            anyhow::bail!("Electricity API error: {}", response.status());
        }

        let records: Vec<ExportRecord> = response
            .json()
            .await
            .context("Failed to parse electricity export")?;
        let total = records.len();

        let mut points: Vec<ConsumptionPoint> = records
            .into_iter()
            .filter_map(|r| {
                r.consommation.map(|consommation| ConsumptionPoint {
                    timestamp: r.date_heure,
                    consommation,
                })
            })
            .collect();
        points.sort_by_key(|p| p.timestamp);

        debug!(total, kept = points.len(), "fetched consumption records");
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::http_client;
    use chrono::{NaiveDate, TimeZone};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn range() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_filters_by_metropole_and_drops_nulls() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/exports/json"))
            .and(query_param(
                "where",
                "libelle_metropole='Brest Métropole' AND date_heure >= '2024-01-01' AND date_heure < '2024-02-01'",
            ))
            .and(query_param("timezone", "UTC"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"date_heure": "2024-01-01T00:30:00+00:00", "consommation": 210.0, "libelle_metropole": "Brest Métropole"},
                {"date_heure": "2024-01-01T00:00:00+00:00", "consommation": 200.0},
                {"date_heure": "2024-01-01T01:00:00+00:00", "consommation": null}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let client = ElectricityClient::new(
            http_client(5, 0).unwrap(),
            &format!("{}/exports/json", server.uri()),
            "Brest Métropole",
        );
        let points = client.fetch(range()).await.unwrap();

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].timestamp, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(points[1].consommation, 210.0);
    }

    #[tokio::test]
    async fn test_fetch_retries_transient_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"date_heure": "2024-01-02T00:00:00+00:00", "consommation": 190.5}
            ])))
            .with_priority(2)
            .mount(&server)
            .await;

        let client = ElectricityClient::new(http_client(5, 2).unwrap(), &server.uri(), "Brest Métropole");
        let points = client.fetch(range()).await.unwrap();
        assert_eq!(points.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_surfaces_client_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let client = ElectricityClient::new(http_client(5, 2).unwrap(), &server.uri(), "Brest Métropole");
        let err = client.fetch(range()).await.unwrap_err();
        assert!(err.to_string().contains("400"));
    }
}
