//! Daily electricity consumption forecasting for a metropole.
//!
//! A forecast for date D is computed from the 30 days before D: the feature
//! window builder turns daily observations into 19 features per day, the
//! tensor assembler scales them into a `[1, 30, 19]` tensor, and a
//! [`ml::Regressor`] maps it to the day's mean consumption.

pub mod api;
pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod features;
pub mod forecast;
pub mod ingest;
pub mod ml;
pub mod repo;
pub mod telemetry;

pub use error::{ForecastError, ForecastResult};
