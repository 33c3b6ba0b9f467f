//! # Riskscore
//! Calibrated risk scoring and aggregation for crypto assets.
//!
//! A price is mapped onto a per-symbol log-linear risk curve, weighted by how
//! rarely the asset has historically sat in that risk band, and combined with
//! a calibrated blend of independent endpoint scores. The resulting advisory
//! is cached with a TTL that shrinks when the market moves fast.

pub use crate::utils::error::{Error, Result};

pub mod cache;
pub mod config;
pub mod engine;
pub mod fusion;
pub mod market_data;
pub mod risk;
pub mod signal;
pub mod utils;

pub use crate::cache::AdaptiveAnalysisCache;
pub use crate::config::EngineConfig;
pub use crate::engine::{RiskScoringEngine, ScoreRequest};
pub use crate::fusion::{Advisory, ComponentAggregator, ComponentScore};
pub use crate::risk::RiskCurve;
pub use crate::signal::EndpointCalibrationEngine;
