//! Storage seams
//!
//! - [`HistorySource`]: read-only daily observations for the window builder
//! - [`ForecastStore`]: forecast upserts keyed by date, last write wins
//! - [`ObservationStore`]: ETL loads, upserted by date, plus the J-1 baseline
//!
//! The Postgres store is used when `db.url` is configured and the `db`
//! feature is enabled; otherwise an in-memory store backed by a JSON snapshot.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::domain::{BaselineRecord, DailyObservation, ForecastRecord};

pub mod memory;
#[cfg(feature = "db")]
pub mod pg;

pub use memory::InMemoryStore;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Observations with `start <= date <= end`, ascending
    async fn fetch_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<DailyObservation>>;

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ForecastStore: Send + Sync {
    async fn upsert_forecast(&self, record: ForecastRecord) -> Result<()>;

    async fn get_forecast(&self, date: NaiveDate) -> Result<Option<ForecastRecord>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObservationStore: Send + Sync {
    /// Insert or replace observations by date, returning the number written
    async fn upsert_observations(&self, observations: &[DailyObservation]) -> Result<usize>;

    /// Recompute the J-1 baseline over every stored day, returning the rows written
    async fn refresh_baseline(&self) -> Result<usize>;

    /// Baseline rows with `start <= date <= end`, ascending
    async fn baseline(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<BaselineRecord>>;
}

/// Store handles shared by the service, the ETL and the API
#[derive(Clone)]
pub struct Repositories {
    pub history: Arc<dyn HistorySource>,
    pub forecasts: Arc<dyn ForecastStore>,
    pub observations: Arc<dyn ObservationStore>,
}

impl Repositories {
    pub async fn new(cfg: &Config) -> Result<Self> {
        #[cfg(feature = "db")]
        {
            if cfg.db.url.is_some() {
                let store = pg::PgStore::connect(&cfg.db).await?;
                store.migrate().await?;
                return Ok(Self::from_store(Arc::new(store)));
            }
        }

        let store = match &cfg.history.snapshot_path {
            Some(path) if path.exists() => InMemoryStore::load_snapshot(path)?,
            _ => InMemoryStore::default(),
        };
        info!(observations = store.observation_count(), "using in-memory store");
        Ok(Self::from_store(Arc::new(store)))
    }

    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: HistorySource + ForecastStore + ObservationStore + 'static,
    {
        Self {
            history: store.clone(),
            forecasts: store.clone(),
            observations: store,
        }
    }
}
