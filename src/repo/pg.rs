//! Postgres store over the `consommation`, `meteo`, `prediction` and
//! `prediction_baseline` tables

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{ForecastStore, HistorySource, ObservationStore};
use crate::config::DbConfig;
use crate::domain::{
    BaselineRecord, DailyObservation, DailyWeather, ForecastRecord, BASELINE_J1_MODEL,
};

/// Consumption joined with weather for one date
#[derive(Debug, Clone, FromRow)]
struct ObservationRow {
    date_mesure: NaiveDate,
    consommation_mw: f64,
    temperature_moyenne: f64,
    humidite_relative: f64,
    vitesse_vent: f64,
    rayonnement_moyen: f64,
}

impl From<ObservationRow> for DailyObservation {
    fn from(row: ObservationRow) -> Self {
        DailyObservation::from_parts(
            row.consommation_mw,
            DailyWeather {
                date: row.date_mesure,
                temp_moy: row.temperature_moyenne,
                humidity: row.humidite_relative,
                vent_vitesse: row.vitesse_vent,
                rayonnement_moyen: row.rayonnement_moyen,
            },
        )
    }
}

#[derive(Debug, Clone, FromRow)]
struct PredictionRow {
    date_prediction: NaiveDate,
    valeur_predite: f64,
}

#[derive(Debug, Clone, FromRow)]
struct BaselineRow {
    date_prediction: NaiveDate,
    valeur_reelle: f64,
    valeur_predite: Option<f64>,
}

impl From<BaselineRow> for BaselineRecord {
    fn from(row: BaselineRow) -> Self {
        BaselineRecord {
            date: row.date_prediction,
            actual: row.valeur_reelle,
            predicted: row.valeur_predite,
        }
    }
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(config: &DbConfig) -> Result<Self> {
        let url = config
            .url
            .as_deref()
            .context("db.url is required for the Postgres store")?;

        info!("Initializing database connection pool");
        let pool = Self::connect_with_retry(config, url).await?;
        let store = Self { pool };
        store.health_check().await?;
        Ok(store)
    }

    /// Connect with exponential backoff
    async fn connect_with_retry(config: &DbConfig, url: &str) -> Result<PgPool> {
        let max_attempts = config.connect_attempts.max(1);
        let mut attempt = 0;
        let mut delay = Duration::from_secs(1);

        loop {
            attempt += 1;
            let result = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
                .connect(url)
                .await;

            match result {
                Ok(pool) => return Ok(pool),
                Err(e) if attempt >= max_attempts => {
                    return Err(e).context(format!(
                        "Failed to connect to database after {} attempts",
                        max_attempts
                    ));
                }
                Err(e) => {
                    warn!(
                        "Database connection attempt {}/{} failed: {}. Retrying in {:?}",
                        attempt, max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;
        Ok(())
    }
}

#[async_trait]
impl HistorySource for PgStore {
    async fn fetch_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<DailyObservation>> {
        let rows = sqlx::query_as::<_, ObservationRow>(
            r#"
            SELECT c.date_mesure, c.consommation_mw,
                   m.temperature_moyenne, m.humidite_relative,
                   m.vitesse_vent, m.rayonnement_moyen
            FROM consommation c
            JOIN meteo m ON m.date_mesure = c.date_mesure
            WHERE c.date_mesure >= $1 AND c.date_mesure <= $2
            ORDER BY c.date_mesure ASC
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to fetch observations {start}..={end}"))?;

        debug!(rows = rows.len(), %start, %end, "fetched observations");
        Ok(rows.into_iter().map(DailyObservation::from).collect())
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("Database health check failed")?;
        Ok(())
    }
}

#[async_trait]
impl ForecastStore for PgStore {
    async fn upsert_forecast(&self, record: ForecastRecord) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to start transaction")?;

        sqlx::query(
            r#"
            INSERT INTO prediction (date_prediction, valeur_predite)
            VALUES ($1, $2)
            ON CONFLICT (date_prediction)
            DO UPDATE SET valeur_predite = EXCLUDED.valeur_predite, created_at = now()
            "#,
        )
        .bind(record.date)
        .bind(record.value)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to upsert prediction for {}", record.date))?;

        tx.commit().await.context("Failed to commit transaction")?;
        Ok(())
    }

    async fn get_forecast(&self, date: NaiveDate) -> Result<Option<ForecastRecord>> {
        let row = sqlx::query_as::<_, PredictionRow>(
            "SELECT date_prediction, valeur_predite FROM prediction WHERE date_prediction = $1",
        )
        .bind(date)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to read prediction for {date}"))?;

        Ok(row.map(|r| ForecastRecord::new(r.date_prediction, r.valeur_predite)))
    }
}

#[async_trait]
impl ObservationStore for PgStore {
    async fn upsert_observations(&self, observations: &[DailyObservation]) -> Result<usize> {
        if observations.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.context("Failed to start transaction")?;

        for o in observations {
            sqlx::query(
                r#"
                INSERT INTO consommation (date_mesure, consommation_mw)
                VALUES ($1, $2)
                ON CONFLICT (date_mesure) DO UPDATE SET consommation_mw = EXCLUDED.consommation_mw
                "#,
            )
            .bind(o.date)
            .bind(o.consumption)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to upsert consumption for {}", o.date))?;

            sqlx::query(
                r#"
                INSERT INTO meteo (date_mesure, temperature_moyenne, humidite_relative, vitesse_vent, rayonnement_moyen)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (date_mesure) DO UPDATE SET
                    temperature_moyenne = EXCLUDED.temperature_moyenne,
                    humidite_relative = EXCLUDED.humidite_relative,
                    vitesse_vent = EXCLUDED.vitesse_vent,
                    rayonnement_moyen = EXCLUDED.rayonnement_moyen
                "#,
            )
            .bind(o.date)
            .bind(o.temp_moy)
            .bind(o.humidity)
            .bind(o.vent_vitesse)
            .bind(o.rayonnement_moyen)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to upsert weather for {}", o.date))?;
        }

        tx.commit().await.context("Failed to commit transaction")?;
        info!("Upserted {} observations", observations.len());
        Ok(observations.len())
    }

    async fn refresh_baseline(&self) -> Result<usize> {
        let result = sqlx::query(
            r#"
            INSERT INTO prediction_baseline (date_prediction, modele, valeur_reelle, valeur_predite)
            SELECT c.date_mesure,
                   $1,
                   c.consommation_mw,
                   LAG(c.consommation_mw, 1) OVER (ORDER BY c.date_mesure)
            FROM consommation c
            ON CONFLICT (date_prediction, modele) DO UPDATE SET
                valeur_reelle = EXCLUDED.valeur_reelle,
                valeur_predite = EXCLUDED.valeur_predite
            "#,
        )
        .bind(BASELINE_J1_MODEL)
        .execute(&self.pool)
        .await
        .context("Failed to refresh the J-1 baseline")?;

        let written = result.rows_affected() as usize;
        info!("Refreshed {} baseline rows", written);
        Ok(written)
    }

    async fn baseline(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<BaselineRecord>> {
        let rows = sqlx::query_as::<_, BaselineRow>(
            r#"
            SELECT date_prediction, valeur_reelle, valeur_predite
            FROM prediction_baseline
            WHERE modele = $1 AND date_prediction >= $2 AND date_prediction <= $3
            ORDER BY date_prediction ASC
            "#,
        )
        .bind(BASELINE_J1_MODEL)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to fetch baseline {start}..={end}"))?;

        Ok(rows.into_iter().map(BaselineRecord::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observation_row_derives_calendar() {
        let row = ObservationRow {
            date_mesure: NaiveDate::from_ymd_opt(2025, 7, 14).unwrap(),
            consommation_mw: 210.0,
            temperature_moyenne: 19.5,
            humidite_relative: 77.0,
            vitesse_vent: 14.0,
            rayonnement_moyen: 240.0,
        };

        let obs = DailyObservation::from(row);
        assert_eq!(obs.consumption, 210.0);
        assert_eq!(obs.day_of_week, 0);
        assert!(obs.is_holiday);
        assert!(!obs.is_weekend);
    }

    #[test]
    fn test_baseline_row_keeps_missing_prediction() {
        let row = BaselineRow {
            date_prediction: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            valeur_reelle: 230.0,
            valeur_predite: None,
        };

        let record = BaselineRecord::from(row);
        assert_eq!(record.actual, 230.0);
        assert_eq!(record.predicted, None);
    }
}
