//! Volatility- and confidence-adaptive time to live.
//!
//! | 24h move          | volatility factor                      |
//! |-------------------|----------------------------------------|
//! | ≤ low             | 1.0                                    |
//! | low .. high       | linear from 1.0 down to `medium_floor` |
//! | > high            | `medium_floor · (high / v)²`           |
//!
//! The confidence factor runs linearly from `confidence_floor_factor` at zero
//! confidence to `confidence_floor_factor + confidence_span` at full confidence.
//! The product with the base TTL never goes below `min_ttl_secs`.

use crate::config::CacheConfig;
use crate::utils::types::Confidence;

#[derive(Debug, Clone)]
pub struct TtlPolicy {
    config: CacheConfig,
}

impl TtlPolicy {
    pub fn new(config: CacheConfig) -> Self {
        Self { config }
    }

    pub fn volatility_factor(&self, volatility_pct: f64) -> f64 {
        let v = if volatility_pct.is_nan() { self.config.high_volatility_pct } else { volatility_pct.abs() };
        let low = self.config.low_volatility_pct;
        let high = self.config.high_volatility_pct;
        let floor = self.config.medium_floor_factor;
        if v <= low {
            1.0
        } else if v <= high {
            1.0 - (1.0 - floor) * (v - low) / (high - low)
        } else {
            floor * (high / v).powi(2)
        }
    }

    pub fn confidence_factor(&self, confidence: Confidence) -> f64 {
        self.config.confidence_floor_factor + self.config.confidence_span * confidence.value()
    }

    pub fn ttl_seconds(&self, volatility_pct: f64, confidence: Confidence) -> u64 {
        let raw = self.config.base_ttl_secs as f64
            * self.volatility_factor(volatility_pct)
            * self.confidence_factor(confidence);
        (raw.max(0.0).round() as u64).max(self.config.min_ttl_secs)
    }
}
