//! Market data consumed by the scoring engine: current price and 24h change.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::utils::error::{Error, Result};

/// Latest market state for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub price: f64,
    /// Signed 24h price change in percent
    pub change_24h_pct: f64,
}

impl MarketSnapshot {
    /// Absolute 24h percentage change.
    pub fn volatility(&self) -> f64 {
        self.change_24h_pct.abs()
    }
}

/// Source of current price and recent volatility.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn snapshot(&self, symbol: &str) -> Result<MarketSnapshot>;
}

/// Fixed snapshots keyed by upper-case symbol.
#[derive(Debug, Clone, Default)]
pub struct StaticMarketData {
    snapshots: HashMap<String, MarketSnapshot>,
}

impl StaticMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, symbol: &str, price: f64, change_24h_pct: f64) -> Self {
        self.insert(symbol, MarketSnapshot { price, change_24h_pct });
        self
    }

    pub fn insert(&mut self, symbol: &str, snapshot: MarketSnapshot) {
        self.snapshots.insert(symbol.to_uppercase(), snapshot);
    }
}

#[async_trait]
impl MarketDataSource for StaticMarketData {
    async fn snapshot(&self, symbol: &str) -> Result<MarketSnapshot> {
        self.snapshots
            .get(&symbol.to_uppercase())
            .copied()
            .ok_or_else(|| Error::DataError(format!("no market data for {symbol}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_snapshot_lookup() {
        let md = StaticMarketData::new().with("btc", 95_509.0, -12.5);
        let snap = md.snapshot("BTC").await.unwrap();
        assert_eq!(snap.price, 95_509.0);
        assert_eq!(snap.volatility(), 12.5);
        assert!(md.snapshot("ETH").await.is_err());
    }
}
