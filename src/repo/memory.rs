use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::{ForecastStore, HistorySource, ObservationStore};
use crate::domain::{BaselineRecord, DailyObservation, ForecastRecord};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    observations: Vec<DailyObservation>,
    #[serde(default)]
    forecasts: Vec<ForecastRecord>,
    #[serde(default)]
    baseline: Vec<BaselineRecord>,
}

/// Date-keyed store held in memory
#[derive(Debug, Default)]
pub struct InMemoryStore {
    observations: RwLock<BTreeMap<NaiveDate, DailyObservation>>,
    forecasts: RwLock<BTreeMap<NaiveDate, ForecastRecord>>,
    baseline: RwLock<BTreeMap<NaiveDate, BaselineRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_observations(observations: impl IntoIterator<Item = DailyObservation>) -> Self {
        let store = Self::default();
        store
            .observations
            .write()
            .extend(observations.into_iter().map(|o| (o.date, o)));
        store
    }

    pub fn observation_count(&self) -> usize {
        self.observations.read().len()
    }

    pub fn forecast_count(&self) -> usize {
        self.forecasts.read().len()
    }

    pub fn baseline_count(&self) -> usize {
        self.baseline.read().len()
    }

    pub fn load_snapshot(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
        let snapshot: Snapshot = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse snapshot {}", path.display()))?;

        let store = Self::with_observations(snapshot.observations);
        store
            .forecasts
            .write()
            .extend(snapshot.forecasts.into_iter().map(|f| (f.date, f)));
        store
            .baseline
            .write()
            .extend(snapshot.baseline.into_iter().map(|b| (b.date, b)));
        Ok(store)
    }

    pub fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let snapshot = Snapshot {
            observations: self.observations.read().values().copied().collect(),
            forecasts: self.forecasts.read().values().copied().collect(),
            baseline: self.baseline.read().values().copied().collect(),
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string(&snapshot)?)
            .with_context(|| format!("Failed to write snapshot {}", path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl HistorySource for InMemoryStore {
    async fn fetch_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<DailyObservation>> {
        if start > end {
            return Ok(Vec::new());
        }
        Ok(self
            .observations
            .read()
            .range(start..=end)
            .map(|(_, o)| *o)
            .collect())
    }
}

#[async_trait]
impl ForecastStore for InMemoryStore {
    async fn upsert_forecast(&self, record: ForecastRecord) -> Result<()> {
        self.forecasts.write().insert(record.date, record);
        Ok(())
    }

    async fn get_forecast(&self, date: NaiveDate) -> Result<Option<ForecastRecord>> {
        Ok(self.forecasts.read().get(&date).copied())
    }
}

#[async_trait]
impl ObservationStore for InMemoryStore {
    async fn upsert_observations(&self, observations: &[DailyObservation]) -> Result<usize> {
        let mut map = self.observations.write();
        for o in observations {
            map.insert(o.date, *o);
        }
        Ok(observations.len())
    }

    async fn refresh_baseline(&self) -> Result<usize> {
        let series = BaselineRecord::j1_series(self.observations.read().values());
        let written = series.len();
        self.baseline
            .write()
            .extend(series.into_iter().map(|b| (b.date, b)));
        Ok(written)
    }

    async fn baseline(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<BaselineRecord>> {
        if start > end {
            return Ok(Vec::new());
        }
        Ok(self
            .baseline
            .read()
            .range(start..=end)
            .map(|(_, b)| *b)
            .collect())
    }
}
