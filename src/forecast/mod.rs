//! Forecast service: history -> window -> tensor -> regressor -> store

pub mod service;

pub use service::ForecastService;
