//! ML Model Training Pipeline
//!
//! Historical observations -> feature table (shift-and-drop) -> date split ->
//! scalers fitted on the train split -> 30-day sequences -> regressor fit ->
//! evaluation in original units against the naive J-1 baseline.

use anyhow::Result;
use chrono::{Duration, NaiveDate, Utc};
use ndarray::{Array1, Array2, Array3, Axis};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

use super::experiment::{ExperimentTracker, RunRecord};
use super::models::{ModelArtifact, WindowedLinearRegressor};
use super::scaler::{MinMaxScaler, ScalerSet};
use super::tensor::stack;
use super::ValidationMetrics;
use crate::domain::DailyObservation;
use crate::features::{
    build_feature_table, feature_names, Feature, FeatureTable, FeatureVector, NUM_FEATURES,
    WINDOW_SIZE,
};

/// Training Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub train_start: NaiveDate,
    pub train_end: NaiveDate,
    pub test_start: NaiveDate,
    pub test_end: NaiveDate,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub validation_split: f64,
    pub early_stopping_patience: usize,
    pub experiments_dir: PathBuf,
    pub experiment_name: String,
    pub run_name: String,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            train_start: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default(),
            train_end: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap_or_default(),
            test_start: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap_or_default(),
            test_end: NaiveDate::from_ymd_opt(2025, 12, 31).unwrap_or_default(),
            epochs: 200,
            batch_size: 32,
            learning_rate: 0.5,
            validation_split: 0.1,
            early_stopping_patience: 30,
            experiments_dir: PathBuf::from("mlruns"),
            experiment_name: "brest_consumption_forecast".to_string(),
            run_name: "windowed_linear_brest_consumption".to_string(),
        }
    }
}

/// Scaled `(window, target)` pairs
#[derive(Debug, Clone)]
pub struct SequenceDataset {
    /// `[n, WINDOW_SIZE, NUM_FEATURES]`
    pub x: Array3<f64>,
    /// `[n]`, scaled
    pub y: Array1<f64>,
    /// Target date of each sequence
    pub dates: Vec<NaiveDate>,
}

impl SequenceDataset {
    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    /// Split off the trailing `fraction` of sequences
    pub fn split_tail(&self, fraction: f64) -> Result<(SequenceDataset, SequenceDataset)> {
        if !(0.0..1.0).contains(&fraction) {
            anyhow::bail!("Validation split must be in [0, 1)");
        }

        let split_idx = self.len() - (self.len() as f64 * fraction).floor() as usize;
        let head = SequenceDataset {
            x: self.x.slice(ndarray::s![..split_idx, .., ..]).to_owned(),
            y: self.y.slice(ndarray::s![..split_idx]).to_owned(),
            dates: self.dates[..split_idx].to_vec(),
        };
        let tail = SequenceDataset {
            x: self.x.slice(ndarray::s![split_idx.., .., ..]).to_owned(),
            y: self.y.slice(ndarray::s![split_idx..]).to_owned(),
            dates: self.dates[split_idx..].to_vec(),
        };
        Ok((head, tail))
    }
}

/// Build sequences whose 30 feature rows cover the 30 days before the target row.
///
/// Rows must be ascending by date. Sequences spanning a gap are skipped.
pub fn create_sequences(
    table: &FeatureTable,
    scalers: &ScalerSet,
) -> Result<SequenceDataset> {
    let vectors: Vec<FeatureVector> = table.rows.iter().map(|r| r.features).collect();
    let scaled = stack(&vectors, &scalers.features)?;

    let mut blocks = Vec::new();
    let mut y = Vec::new();
    let mut dates = Vec::new();

    for i in WINDOW_SIZE..table.rows.len() {
        let target = table.rows[i].date();
        let first = table.rows[i - WINDOW_SIZE].date();
        let last = table.rows[i - 1].date();
        if first != target - Duration::days(WINDOW_SIZE as i64) || last != target - Duration::days(1) {
            continue;
        }

        blocks.push(scaled.slice(ndarray::s![i - WINDOW_SIZE..i, ..]));
        y.push(scalers.target.transform_scalar(table.rows[i].target)?);
        dates.push(target);
    }

    let x = if blocks.is_empty() {
        Array3::zeros((0, WINDOW_SIZE, NUM_FEATURES))
    } else {
        ndarray::stack(Axis(0), &blocks)?
    };

    Ok(SequenceDataset {
        x,
        y: Array1::from(y),
        dates,
    })
}

/// Fit feature and target scalers on the training rows
pub fn fit_scalers(train: &FeatureTable) -> Result<ScalerSet> {
    let features = MinMaxScaler::fit(feature_names(), &train.feature_matrix())?;
    let targets: Vec<[f64; 1]> = train.targets().into_iter().map(|t| [t]).collect();
    let target = MinMaxScaler::fit(vec!["consommation".to_string()], &targets)?;
    Ok(ScalerSet::new(features, target))
}

fn mse(model: &WindowedLinearRegressor, data: &SequenceDataset) -> f64 {
    if data.is_empty() {
        return f64::NAN;
    }
    data.x
        .outer_iter()
        .zip(data.y.iter())
        .map(|(seq, y)| (model.predict_sequence(seq) - y).powi(2))
        .sum::<f64>()
        / data.len() as f64
}

/// Outcome of fitting the regressor
#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub model: WindowedLinearRegressor,
    pub epochs_run: usize,
    pub final_train_loss: f64,
    pub final_val_loss: Option<f64>,
}

/// Model Trainer
pub struct ModelTrainer {
    config: TrainingConfig,
}

impl ModelTrainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    /// Mini-batch gradient descent on MSE with early stopping on the
    /// validation tail. The best weights seen are restored.
    pub fn fit(&self, dataset: &SequenceDataset) -> Result<FitOutcome> {
        if dataset.is_empty() {
            anyhow::bail!("Cannot train on empty dataset");
        }

        let (train, val) = dataset.split_tail(self.config.validation_split)?;
        if train.is_empty() {
            anyhow::bail!("Validation split leaves no training sequences");
        }

        let batch_size = self.config.batch_size.max(1);
        // step relative to the mean squared input norm keeps descent stable
        // whatever the window size
        let mean_sq_norm = train.x.mapv(|v| v * v).sum() / train.len() as f64;
        let lr = self.config.learning_rate / (1.0 + mean_sq_norm);

        let mut model = WindowedLinearRegressor::zeros(train.y.mean().unwrap_or(0.0));
        let mut best = (model.weights.clone(), model.intercept, f64::INFINITY);
        let mut stale_epochs = 0;
        let mut epochs_run = 0;

        for epoch in 0..self.config.epochs {
            epochs_run = epoch + 1;

            for start in (0..train.len()).step_by(batch_size) {
                let end = (start + batch_size).min(train.len());
                let n = (end - start) as f64;

                let mut grad_w = Array2::<f64>::zeros((WINDOW_SIZE, NUM_FEATURES));
                let mut grad_b = 0.0;
                for i in start..end {
                    let seq = train.x.index_axis(Axis(0), i);
                    let error = model.predict_sequence(seq) - train.y[i];
                    grad_w.scaled_add(error / n, &seq);
                    grad_b += error / n;
                }

                model.weights.scaled_add(-lr, &grad_w);
                model.intercept -= lr * grad_b;
            }

            let monitored = if val.is_empty() {
                mse(&model, &train)
            } else {
                mse(&model, &val)
            };

            if monitored < best.2 {
                best = (model.weights.clone(), model.intercept, monitored);
                stale_epochs = 0;
            } else {
                stale_epochs += 1;
                if stale_epochs >= self.config.early_stopping_patience {
                    debug!(epoch, "early stopping");
                    break;
                }
            }
        }

        model.weights = best.0;
        model.intercept = best.1;
        model.metadata.trained_at = Utc::now();
        model.metadata.training_samples = train.len();

        Ok(FitOutcome {
            final_train_loss: mse(&model, &train),
            final_val_loss: (!val.is_empty()).then(|| mse(&model, &val)),
            epochs_run,
            model,
        })
    }
}

/// Everything produced by one training run
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub scalers: ScalerSet,
    pub model: WindowedLinearRegressor,
    pub metrics: ValidationMetrics,
    pub baseline_metrics: ValidationMetrics,
    pub final_val_loss: Option<f64>,
    pub epochs_run: usize,
    pub train_sequences: usize,
    pub test_sequences: usize,
}

/// Naive forecast: tomorrow equals today (`conso_obs_j-1`)
pub fn baseline_metrics(table: &FeatureTable) -> Result<ValidationMetrics> {
    let predictions: Vec<f64> = table
        .rows
        .iter()
        .map(|r| r.features.get(Feature::ConsoObsJ1))
        .collect();
    ValidationMetrics::calculate(&predictions, &table.targets())
}

/// Run the full training pipeline over the historical observations
pub fn train(observations: &[DailyObservation], config: &TrainingConfig) -> Result<TrainingReport> {
    let table = build_feature_table(observations)?;
    let train_table = table.between(config.train_start, config.train_end);
    let test_table = table.between(config.test_start, config.test_end);

    if train_table.is_empty() || test_table.is_empty() {
        anyhow::bail!(
            "Empty split: {} train rows in {}..={}, {} test rows in {}..={}",
            train_table.len(),
            config.train_start,
            config.train_end,
            test_table.len(),
            config.test_start,
            config.test_end
        );
    }

    let scalers = fit_scalers(&train_table)?;
    let train_seq = create_sequences(&train_table, &scalers)?;
    let test_seq = create_sequences(&test_table, &scalers)?;
    info!(
        train_rows = train_table.len(),
        test_rows = test_table.len(),
        train_sequences = train_seq.len(),
        test_sequences = test_seq.len(),
        "prepared training tensors"
    );

    if test_seq.is_empty() {
        anyhow::bail!("Test split is shorter than one {}-day window", WINDOW_SIZE);
    }

    let trainer = ModelTrainer::new(config.clone());
    let fit = trainer.fit(&train_seq)?;

    let predictions = test_seq
        .x
        .outer_iter()
        .map(|seq| scalers.target.inverse_transform_scalar(fit.model.predict_sequence(seq)))
        .collect::<Result<Vec<f64>, _>>()?;
    let actuals = test_seq
        .y
        .iter()
        .map(|y| scalers.target.inverse_transform_scalar(*y))
        .collect::<Result<Vec<f64>, _>>()?;

    let metrics = ValidationMetrics::calculate(&predictions, &actuals)?;
    let baseline = baseline_metrics(&test_table)?;

    let mut model = fit.model;
    model.metadata.validation_metrics = metrics;

    info!(
        mae = metrics.mae,
        rmse = metrics.rmse,
        mape = metrics.mape,
        baseline_mape = baseline.mape,
        epochs = fit.epochs_run,
        "training finished"
    );

    Ok(TrainingReport {
        scalers,
        model,
        metrics,
        baseline_metrics: baseline,
        final_val_loss: fit.final_val_loss,
        epochs_run: fit.epochs_run,
        train_sequences: train_seq.len(),
        test_sequences: test_seq.len(),
    })
}

/// Train, then record params, metrics and artefacts as an experiment run
pub fn train_and_track(
    observations: &[DailyObservation],
    config: &TrainingConfig,
) -> Result<(TrainingReport, RunRecord)> {
    let tracker = ExperimentTracker::new(&config.experiments_dir, &config.experiment_name);
    let mut run = tracker.start_run(&config.run_name)?;

    run.log_param("train_start", config.train_start);
    run.log_param("train_end", config.train_end);
    run.log_param("test_start", config.test_start);
    run.log_param("test_end", config.test_end);
    run.log_param("epochs", config.epochs);
    run.log_param("batch_size", config.batch_size);
    run.log_param("learning_rate", config.learning_rate);
    run.log_param("validation_split", config.validation_split);
    run.log_param("early_stopping_patience", config.early_stopping_patience);
    run.log_param("window_size", WINDOW_SIZE);
    run.log_param("features", feature_names().join(","));

    let report = train(observations, config)?;

    run.log_metrics("", &report.metrics);
    run.log_metrics("baseline_", &report.baseline_metrics);
    if let Some(loss) = report.final_val_loss {
        run.log_metric("final_val_loss", loss);
    }
    run.log_metric("epochs_run", report.epochs_run as f64);

    run.save_artifact("scalers.json", &report.scalers)?;
    run.save_artifact(
        "model.json",
        &ModelArtifact::WindowedLinear(report.model.clone()),
    )?;

    let record = run.finish()?;
    Ok((report, record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DailyWeather;
    use crate::features::formula::tests::ramp;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    /// Weekly-seasonal consumption driven by temperature
    fn seasonal_history(start: NaiveDate, days: usize) -> Vec<DailyObservation> {
        (0..days)
            .map(|i| {
                let t = i as f64;
                let temp = 12.0 + 8.0 * (t * 2.0 * std::f64::consts::PI / 365.0).sin();
                let weekly = 30.0 * (t * 2.0 * std::f64::consts::PI / 7.0).cos();
                let weather = DailyWeather {
                    date: start + Duration::days(i as i64),
                    temp_moy: temp,
                    humidity: 80.0,
                    vent_vitesse: 18.0,
                    rayonnement_moyen: 120.0 + 2.0 * temp,
                };
                DailyObservation::from_parts(500.0 - 6.0 * temp + weekly, weather)
            })
            .collect()
    }

    #[test]
    fn test_create_sequences_align_with_serving_window() {
        let table = build_feature_table(&ramp(d(2024, 1, 1), 60)).unwrap();
        let scalers = fit_scalers(&table).unwrap();

        let data = create_sequences(&table, &scalers).unwrap();
        assert_eq!(table.len(), 52);
        assert_eq!(data.len(), 22);
        assert_eq!(data.x.shape(), &[22, WINDOW_SIZE, NUM_FEATURES]);

        // first target is the 31st table row; its window is the 30 rows before it
        assert_eq!(data.dates[0], table.rows[30].date());
        let expected_y = scalers.target.transform_scalar(table.rows[30].target).unwrap();
        assert_eq!(data.y[0], expected_y);
    }

    #[test]
    fn test_create_sequences_skip_gaps() {
        let mut history = ramp(d(2024, 1, 1), 80);
        history.remove(50);
        let table = build_feature_table(&history).unwrap();
        let scalers = fit_scalers(&table).unwrap();

        // the run after the gap is shorter than a window
        let data = create_sequences(&table, &scalers).unwrap();
        assert_eq!(data.len(), 12);
        assert!(data.dates.iter().all(|t| *t <= d(2024, 2, 18)));
    }

    #[test]
    fn test_split_tail() {
        let table = build_feature_table(&ramp(d(2024, 1, 1), 60)).unwrap();
        let data = create_sequences(&table, &fit_scalers(&table).unwrap()).unwrap();

        let (head, tail) = data.split_tail(0.1).unwrap();
        assert_eq!(head.len() + tail.len(), data.len());
        assert_eq!(tail.len(), 2);
        assert!(data.split_tail(1.0).is_err());
    }

    #[test]
    fn test_baseline_is_previous_day() {
        let table = build_feature_table(&ramp(d(2024, 1, 1), 20)).unwrap();
        let metrics = baseline_metrics(&table).unwrap();
        assert!((metrics.mae - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_fit_reduces_loss() {
        let history = seasonal_history(d(2023, 1, 1), 200);
        let table = build_feature_table(&history).unwrap();
        let scalers = fit_scalers(&table).unwrap();
        let data = create_sequences(&table, &scalers).unwrap();

        let config = TrainingConfig {
            epochs: 50,
            batch_size: 16,
            ..TrainingConfig::default()
        };
        let untrained = WindowedLinearRegressor::zeros(data.y.mean().unwrap());
        let initial = mse(&untrained, &data);

        let fit = ModelTrainer::new(config).fit(&data).unwrap();
        assert!(fit.final_train_loss < initial);
        assert!(fit.final_val_loss.is_some());
        assert!(fit.epochs_run >= 1);
    }

    #[test]
    fn test_train_pipeline_end_to_end() {
        let history = seasonal_history(d(2023, 1, 1), 455);
        let config = TrainingConfig {
            train_start: d(2023, 1, 1),
            train_end: d(2023, 12, 31),
            test_start: d(2024, 1, 1),
            test_end: d(2024, 3, 31),
            epochs: 10,
            ..TrainingConfig::default()
        };

        let report = train(&history, &config).unwrap();
        assert!(report.train_sequences > 300);
        assert!(report.test_sequences > 0);
        assert!(report.metrics.mae.is_finite());
        assert!(report.baseline_metrics.mae > 0.0);
        assert!(report.scalers.validate().is_ok());
        assert_eq!(report.model.metadata.validation_metrics, report.metrics);
    }

    #[test]
    fn test_train_rejects_empty_split() {
        let history = seasonal_history(d(2023, 1, 1), 100);
        let config = TrainingConfig {
            train_start: d(2023, 1, 1),
            train_end: d(2023, 12, 31),
            test_start: d(2025, 1, 1),
            test_end: d(2025, 12, 31),
            ..TrainingConfig::default()
        };
        assert!(train(&history, &config).is_err());
    }

    #[test]
    fn test_train_and_track_writes_run() {
        let dir = tempfile::tempdir().unwrap();
        let history = seasonal_history(d(2023, 1, 1), 455);
        let config = TrainingConfig {
            train_start: d(2023, 1, 1),
            train_end: d(2023, 12, 31),
            test_start: d(2024, 1, 1),
            test_end: d(2024, 3, 31),
            epochs: 3,
            experiments_dir: dir.path().to_path_buf(),
            ..TrainingConfig::default()
        };

        let (report, record) = train_and_track(&history, &config).unwrap();
        let run_dir = dir
            .path()
            .join("brest_consumption_forecast")
            .join(record.run_id.to_string());

        assert_eq!(record.metrics["mae"], report.metrics.mae);
        assert!(record.metrics.contains_key("baseline_mape"));
        assert_eq!(record.params["epochs"], "3");
        assert!(ModelArtifact::load(run_dir.join("model.json")).is_ok());
        assert!(ScalerSet::load(run_dir.join("scalers.json")).is_ok());
    }
}
