//! Log-linear price ↔ risk mapping.
//!
//! A symbol's risk is the position of the log of its price between the logs of
//! its configured floor and ceiling prices:
//!
//! `risk = (ln p − ln min) / (ln max − ln min)`, clamped to [0, 1].

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::BoundsProvider;
use crate::utils::error::{Error, Result};
use crate::utils::types::Risk;

/// Floor and ceiling prices used to normalise a symbol's price into risk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolRiskBounds {
    pub symbol: String,
    pub min_price: f64,
    pub max_price: f64,
}

impl SymbolRiskBounds {
    /// Build validated bounds. The symbol is upper-cased.
    pub fn new(symbol: &str, min_price: f64, max_price: f64) -> Result<Self> {
        let bounds = Self { symbol: symbol.to_uppercase(), min_price, max_price };
        bounds.validate()?;
        Ok(bounds)
    }

    /// `0 < min_price < max_price`, both finite.
    pub fn validate(&self) -> Result<()> {
        let ok = self.min_price.is_finite()
            && self.max_price.is_finite()
            && self.min_price > 0.0
            && self.min_price < self.max_price;
        if ok {
            Ok(())
        } else {
            Err(Error::InvalidBounds {
                symbol: self.symbol.clone(),
                min_price: self.min_price,
                max_price: self.max_price,
            })
        }
    }
}

/// Map `price` to risk given already validated bounds.
///
/// Non-positive and NaN prices sit below the floor and map to 0.
pub fn risk_from_bounds(bounds: &SymbolRiskBounds, price: f64) -> Risk {
    if price.is_nan() || price <= bounds.min_price {
        return Risk::clamped(0.0);
    }
    if price >= bounds.max_price {
        return Risk::clamped(1.0);
    }
    let lo = bounds.min_price.ln();
    let hi = bounds.max_price.ln();
    Risk::clamped((price.ln() - lo) / (hi - lo))
}

/// Inverse of [`risk_from_bounds`] on the [0, 1] domain.
pub fn price_from_bounds(bounds: &SymbolRiskBounds, risk: Risk) -> f64 {
    let r = risk.value();
    if r <= 0.0 {
        return bounds.min_price;
    }
    if r >= 1.0 {
        return bounds.max_price;
    }
    let lo = bounds.min_price.ln();
    let hi = bounds.max_price.ln();
    (lo + r * (hi - lo)).exp()
}

/// Risk curve over a bounds provider.
#[derive(Clone)]
pub struct RiskCurve {
    provider: Arc<dyn BoundsProvider>,
}

impl RiskCurve {
    pub fn new(provider: Arc<dyn BoundsProvider>) -> Self {
        Self { provider }
    }

    /// Validated bounds for `symbol`.
    pub fn bounds(&self, symbol: &str) -> Result<SymbolRiskBounds> {
        let bounds = self.provider.get_bounds(symbol)?;
        bounds.validate()?;
        Ok(bounds)
    }

    /// Risk of `price` for `symbol`.
    pub fn risk_of(&self, symbol: &str, price: f64) -> Result<Risk> {
        let bounds = self.bounds(symbol)?;
        Ok(risk_from_bounds(&bounds, price))
    }

    /// Price at which `symbol` reaches `risk`.
    pub fn price_of(&self, symbol: &str, risk: Risk) -> Result<f64> {
        let bounds = self.bounds(symbol)?;
        Ok(price_from_bounds(&bounds, risk))
    }

    /// Prices at every band boundary 0.0, 0.1, …, 1.0.
    pub fn band_price_table(&self, symbol: &str) -> Result<Vec<(Risk, f64)>> {
        let bounds = self.bounds(symbol)?;
        Ok((0..=super::BAND_COUNT)
            .map(|i| {
                let risk = Risk::clamped(i as f64 / super::BAND_COUNT as f64);
                (risk, price_from_bounds(&bounds, risk))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BoundsRegistry;
    use assert_matches::assert_matches;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rstest::rstest;

    fn btc_curve() -> RiskCurve {
        let registry =
            BoundsRegistry::from_bounds(vec![SymbolRiskBounds::new("BTC", 15_000.0, 738_965.0).unwrap()])
                .unwrap();
        RiskCurve::new(Arc::new(registry))
    }

    #[test]
    fn reference_btc_price() {
        let risk = btc_curve().risk_of("BTC", 95_509.0).unwrap();
        assert!((risk.value() - 0.475).abs() < 0.001, "risk = {}", risk);
    }

    #[rstest]
    #[case(15_000.0, 0.0)]
    #[case(1.0, 0.0)]
    #[case(-5.0, 0.0)]
    #[case(738_965.0, 1.0)]
    #[case(5_000_000.0, 1.0)]
    fn clamps_outside_bounds(#[case] price: f64, #[case] expected: f64) {
        assert_eq!(btc_curve().risk_of("BTC", price).unwrap().value(), expected);
    }

    #[test]
    fn price_of_is_inverse() {
        let curve = btc_curve();
        for i in 0..=100 {
            let r = Risk::new(i as f64 / 100.0).unwrap();
            let price = curve.price_of("BTC", r).unwrap();
            let back = curve.risk_of("BTC", price).unwrap();
            assert!((back.value() - r.value()).abs() < 1e-9);
        }
    }

    #[test]
    fn risk_rises_with_price() {
        let mut rng = StdRng::seed_from_u64(41);
        for _ in 0..100 {
            let min_price = 10f64.powf(rng.gen_range(-4.0..4.0));
            let max_price = min_price * 10f64.powf(rng.gen_range(0.01..6.0));
            let bounds = SymbolRiskBounds::new("RND", min_price, max_price).unwrap();

            // log-uniform prices from a decade below the floor to a decade above the ceiling
            let (lo, hi) = ((min_price / 10.0).ln(), (max_price * 10.0).ln());
            let mut prices: Vec<f64> = (0..500).map(|_| rng.gen_range(lo..hi).exp()).collect();
            prices.extend([0.0, min_price, max_price]);
            prices.sort_by(f64::total_cmp);

            let risks: Vec<f64> = prices.iter().map(|p| risk_from_bounds(&bounds, *p).value()).collect();
            assert!(risks.windows(2).all(|w| w[0] <= w[1]), "{:?}", bounds);
            assert_eq!(risks[0], 0.0);
            assert_eq!(risks[risks.len() - 1], 1.0);
        }
    }

    #[test]
    fn missing_symbol() {
        assert_matches!(btc_curve().risk_of("DOGE", 0.1), Err(Error::MissingBounds(s)) if s == "DOGE");
    }

    #[test]
    fn invalid_bounds() {
        assert_matches!(SymbolRiskBounds::new("ETH", 10.0, 10.0), Err(Error::InvalidBounds { .. }));
        assert_matches!(SymbolRiskBounds::new("ETH", 0.0, 10.0), Err(Error::InvalidBounds { .. }));
    }

    #[test]
    fn band_table_spans_bounds() {
        let table = btc_curve().band_price_table("BTC").unwrap();
        assert_eq!(table.len(), 11);
        assert_eq!(table[0].1, 15_000.0);
        assert_eq!(table[10].1, 738_965.0);
        assert!(table.windows(2).all(|w| w[0].1 < w[1].1));
    }
}
