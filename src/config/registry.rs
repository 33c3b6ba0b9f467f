//! In-memory symbol registries built from configuration.
//! Symbols are keyed upper-case so lookups are case-insensitive.

use std::collections::HashMap;

use crate::risk::{BoundsProvider, HistogramProvider, RiskBandHistogram, SymbolRiskBounds};
use crate::utils::error::{Error, Result};

/// Price bounds per symbol.
#[derive(Debug, Clone, Default)]
pub struct BoundsRegistry {
    bounds: HashMap<String, SymbolRiskBounds>,
}

impl BoundsRegistry {
    /// Build from validated bounds. Later duplicates replace earlier ones.
    pub fn from_bounds<I: IntoIterator<Item = SymbolRiskBounds>>(items: I) -> Result<Self> {
        let mut registry = Self::default();
        for b in items {
            registry.insert(b)?;
        }
        Ok(registry)
    }

    /// Insert or replace bounds between scoring calls.
    pub fn insert(&mut self, mut bounds: SymbolRiskBounds) -> Result<()> {
        bounds.validate()?;
        bounds.symbol = bounds.symbol.to_uppercase();
        self.bounds.insert(bounds.symbol.clone(), bounds);
        Ok(())
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.bounds.contains_key(&symbol.to_uppercase())
    }

    pub fn symbols(&self) -> Vec<String> {
        let mut out: Vec<String> = self.bounds.keys().cloned().collect();
        out.sort();
        out
    }
}

impl BoundsProvider for BoundsRegistry {
    fn get_bounds(&self, symbol: &str) -> Result<SymbolRiskBounds> {
        let key = symbol.to_uppercase();
        self.bounds.get(&key).cloned().ok_or(Error::MissingBounds(key))
    }
}

/// Occupancy histograms per symbol.
#[derive(Debug, Clone, Default)]
pub struct HistogramRegistry {
    histograms: HashMap<String, RiskBandHistogram>,
}

impl HistogramRegistry {
    pub fn from_histograms<I: IntoIterator<Item = RiskBandHistogram>>(items: I) -> Self {
        let mut registry = Self::default();
        for h in items {
            registry.insert(h);
        }
        registry
    }

    pub fn insert(&mut self, mut histogram: RiskBandHistogram) {
        histogram.symbol = histogram.symbol.to_uppercase();
        self.histograms.insert(histogram.symbol.clone(), histogram);
    }

    pub fn len(&self) -> usize {
        self.histograms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histograms.is_empty()
    }
}

impl HistogramProvider for HistogramRegistry {
    fn get_histogram(&self, symbol: &str) -> Result<RiskBandHistogram> {
        let key = symbol.to_uppercase();
        self.histograms
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::InsufficientData(format!("no occupancy history for {key}")))
    }
}
