//! File-based experiment tracking
//!
//! Each run lives under `<root>/<experiment>/<run_id>/` with a `run.json`
//! holding params and metrics, plus any artefacts saved next to it.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

use super::ValidationMetrics;

#[derive(Debug, Clone)]
pub struct ExperimentTracker {
    root: PathBuf,
    experiment: String,
}

impl ExperimentTracker {
    pub fn new(root: impl Into<PathBuf>, experiment: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            experiment: experiment.into(),
        }
    }

    pub fn experiment_dir(&self) -> PathBuf {
        self.root.join(&self.experiment)
    }

    pub fn start_run(&self, run_name: &str) -> Result<ExperimentRun> {
        let run_id = Uuid::new_v4();
        let dir = self.experiment_dir().join(run_id.to_string());
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create run directory {}", dir.display()))?;

        info!(experiment = %self.experiment, run_name, %run_id, "started run");

        Ok(ExperimentRun {
            dir,
            record: RunRecord {
                run_id,
                run_name: run_name.to_string(),
                experiment: self.experiment.clone(),
                started_at: Utc::now(),
                finished_at: None,
                params: BTreeMap::new(),
                metrics: BTreeMap::new(),
                artifacts: Vec::new(),
            },
        })
    }

    /// All finished runs of the experiment, oldest first
    pub fn runs(&self) -> Result<Vec<RunRecord>> {
        let dir = self.experiment_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path().join("run.json");
            if path.is_file() {
                let raw = std::fs::read_to_string(&path)?;
                runs.push(serde_json::from_str::<RunRecord>(&raw)?);
            }
        }
        runs.sort_by_key(|r| r.started_at);
        Ok(runs)
    }
}

/// Persisted summary of a run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub run_name: String,
    pub experiment: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub params: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, f64>,
    pub artifacts: Vec<String>,
}

#[derive(Debug)]
pub struct ExperimentRun {
    dir: PathBuf,
    record: RunRecord,
}

impl ExperimentRun {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn log_param(&mut self, key: &str, value: impl ToString) {
        self.record.params.insert(key.to_string(), value.to_string());
    }

    pub fn log_metric(&mut self, key: &str, value: f64) {
        self.record.metrics.insert(key.to_string(), value);
    }

    pub fn log_metrics(&mut self, prefix: &str, metrics: &ValidationMetrics) {
        self.log_metric(&format!("{prefix}mae"), metrics.mae);
        self.log_metric(&format!("{prefix}rmse"), metrics.rmse);
        self.log_metric(&format!("{prefix}mape"), metrics.mape);
        self.log_metric(&format!("{prefix}r2"), metrics.r2);
    }

    /// Write `value` as JSON into the run directory
    pub fn save_artifact<T: Serialize>(&mut self, name: &str, value: &T) -> Result<PathBuf> {
        let path = self.dir.join(name);
        std::fs::write(&path, serde_json::to_string_pretty(value)?)
            .with_context(|| format!("Failed to write artifact {}", path.display()))?;
        self.record.artifacts.push(name.to_string());
        Ok(path)
    }

    /// Write `run.json` and close the run
    pub fn finish(mut self) -> Result<RunRecord> {
        self.record.finished_at = Some(Utc::now());
        let path = self.dir.join("run.json");
        std::fs::write(&path, serde_json::to_string_pretty(&self.record)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        info!(run_id = %self.record.run_id, metrics = ?self.record.metrics, "finished run");
        Ok(self.record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_is_written_under_experiment() {
        let root = tempfile::tempdir().unwrap();
        let tracker = ExperimentTracker::new(root.path(), "brest_consumption_forecast");

        let mut run = tracker.start_run("lstm_brest_consumption").unwrap();
        run.log_param("epochs", 200);
        run.log_metrics("test_", &ValidationMetrics::new(1.0, 2.0, 3.0, 0.5));
        let artifact = run.save_artifact("scalers.json", &vec![1.0, 2.0]).unwrap();
        let run_dir = run.dir().to_path_buf();
        let record = run.finish().unwrap();

        assert!(artifact.is_file());
        assert!(run_dir.join("run.json").is_file());
        assert_eq!(record.params["epochs"], "200");
        assert_eq!(record.metrics["test_rmse"], 2.0);
        assert_eq!(record.artifacts, vec!["scalers.json".to_string()]);
        assert!(record.finished_at.is_some());

        let runs = tracker.runs().unwrap();
        assert_eq!(runs, vec![record]);
    }

    #[test]
    fn test_unfinished_runs_are_not_listed() {
        let root = tempfile::tempdir().unwrap();
        let tracker = ExperimentTracker::new(root.path(), "exp");
        let _open = tracker.start_run("open").unwrap();

        assert!(tracker.runs().unwrap().is_empty());
        assert!(ExperimentTracker::new(root.path(), "missing").runs().unwrap().is_empty());
    }
}
