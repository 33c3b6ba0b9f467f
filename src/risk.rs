//! Price-to-risk mapping and historical band rarity.
//! Everything in this module is pure and synchronous so it can run inline in
//! a scoring request without touching the async runtime.

pub mod curve;
pub mod rarity;
pub mod scorer;

pub use curve::{price_from_bounds, risk_from_bounds, RiskCurve, SymbolRiskBounds};
pub use rarity::{
    band_of, BandRarityCoefficient, BandTransition, OccupancyTracker, RiskBandHistogram, BAND_COUNT,
};
pub use scorer::RiskBandScorer;

use crate::utils::error::Result;

/// Source of per-symbol price bounds.
pub trait BoundsProvider: Send + Sync {
    /// Return the bounds for `symbol`, or `Error::MissingBounds` if none are configured.
    fn get_bounds(&self, symbol: &str) -> Result<SymbolRiskBounds>;
}

/// Source of per-symbol occupancy histograms.
pub trait HistogramProvider: Send + Sync {
    /// Return the current histogram snapshot for `symbol`.
    ///
    /// Unknown symbols yield `Error::InsufficientData`.
    fn get_histogram(&self, symbol: &str) -> Result<RiskBandHistogram>;
}
