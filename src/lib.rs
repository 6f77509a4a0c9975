//! Proof of Insight
//!
//! Users stake on multi-period price forecasts for a crypto pair. Once every forecast
//! period has closed on the exchange, the submission is scored against realized prices
//! and a tiered reward is computed.

pub mod api;
pub mod error;
pub mod middleware;
pub mod models;
pub mod predictions;
pub mod scoring;
pub mod scrapers;

pub use error::{PoiError, PoiResult};
