//! Band rarity coefficients.
//!
//! The risk domain is cut into ten equal bands. A symbol's occupancy history
//! (days spent in each band) turns into one coefficient per band: the most
//! visited band gets `coef_min`, the least visited gets `coef_max`. Between
//! band starts the coefficient is interpolated with a smoothstep that leans
//! early toward rarer neighbours and late toward more common ones.

use chrono::NaiveDate;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::config::RarityConfig;
use crate::utils::error::{Error, Result};
use crate::utils::types::Risk;

/// Number of equal-width risk bands.
pub const BAND_COUNT: usize = 10;

const BAND_WIDTH: f64 = 1.0 / BAND_COUNT as f64;

/// Index (0..=9) of the band containing `risk`. Risk 1.0 belongs to the last band.
pub fn band_of(risk: Risk) -> usize {
    ((risk.value() * BAND_COUNT as f64).floor() as usize).min(BAND_COUNT - 1)
}

/// Days spent by a symbol in each risk band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskBandHistogram {
    pub symbol: String,
    pub band_days: [u64; BAND_COUNT],
    pub total_days: u64,
}

impl RiskBandHistogram {
    pub fn new(symbol: &str, band_days: [u64; BAND_COUNT]) -> Self {
        Self { symbol: symbol.to_uppercase(), band_days, total_days: band_days.iter().sum() }
    }

    /// Share of total days spent in each band.
    pub fn percentages(&self) -> Result<[f64; BAND_COUNT]> {
        let total: u64 = self.band_days.iter().sum();
        if self.total_days == 0 || total != self.total_days {
            return Err(Error::InsufficientData(format!(
                "histogram for {} has {} recorded days (bands sum to {})",
                self.symbol, self.total_days, total
            )));
        }
        let mut pct = [0.0; BAND_COUNT];
        for (p, days) in pct.iter_mut().zip(self.band_days.iter()) {
            *p = *days as f64 / self.total_days as f64;
        }
        Ok(pct)
    }
}

/// Continuous rarity coefficient over the risk domain for one histogram.
#[derive(Debug, Clone)]
pub struct BandRarityCoefficient {
    config: RarityConfig,
    percentages: [f64; BAND_COUNT],
    coefficients: [f64; BAND_COUNT],
}

impl BandRarityCoefficient {
    pub fn from_histogram(histogram: &RiskBandHistogram, config: &RarityConfig) -> Result<Self> {
        let percentages = histogram.percentages()?;
        let coefficients = band_coefficients(&percentages, config.coef_min, config.coef_max);
        debug!("rarity coefficients for {}: {:?}", histogram.symbol, coefficients);
        Ok(Self { config: config.clone(), percentages, coefficients })
    }

    pub fn band_percentages(&self) -> &[f64; BAND_COUNT] {
        &self.percentages
    }

    /// Flat coefficient of band `band` (clamped to the last band).
    pub fn band_coefficient(&self, band: usize) -> f64 {
        self.coefficients[band.min(BAND_COUNT - 1)]
    }

    pub fn coefficients(&self) -> &[f64; BAND_COUNT] {
        &self.coefficients
    }

    /// Interpolated coefficient at `risk`.
    ///
    /// Band `i` runs from `c_i` at its lower edge to `c_{i+1}` at its upper edge.
    /// The last band has no successor and stays flat at `c_9`.
    pub fn coefficient_at(&self, risk: Risk) -> f64 {
        let r = risk.value();
        let band = (r * BAND_COUNT as f64).floor() as usize;
        if band >= BAND_COUNT - 1 {
            return self.coefficients[BAND_COUNT - 1];
        }
        let x = ((r - band as f64 * BAND_WIDTH) / BAND_WIDTH).clamp(0.0, 1.0);

        let from = self.coefficients[band];
        let to = self.coefficients[band + 1];
        let gamma = if to > from { self.config.gamma_up } else { self.config.gamma_down };
        let smooth = x * x * (3.0 - 2.0 * x);
        let blend = self.config.blend.clamp(0.0, 1.0);
        let shape = (1.0 - blend) * smooth + blend * x.powf(gamma);

        (from + (to - from) * shape).clamp(self.config.coef_min, self.config.coef_max)
    }

    /// Coefficient with the band-transition rule applied.
    ///
    /// On the day the band changed, the flat coefficient of the new band is used,
    /// and it never falls below the flat coefficient of the band just left.
    /// The new band is the one recorded by `transition`.
    pub fn coefficient_stabilized(&self, risk: Risk, transition: &BandTransition, today: NaiveDate) -> f64 {
        match transition.previous_band_if_changed_on(today) {
            | Some(previous) => {
                let current = transition.current_band;
                if current != band_of(risk) {
                    warn!(
                        "transition records band {} but risk {} falls in band {}",
                        current,
                        risk,
                        band_of(risk)
                    );
                }
                let stabilized = self.band_coefficient(current).max(self.band_coefficient(previous));
                debug!("band transition {} -> {} on {}: coefficient {:.4}", previous, current, today, stabilized);
                stabilized
            }
            | None => self.coefficient_at(risk),
        }
    }
}

/// Inverse-linear map from occupancy share to coefficient.
fn band_coefficients(pct: &[f64; BAND_COUNT], coef_min: f64, coef_max: f64) -> [f64; BAND_COUNT] {
    let most = pct.iter().cloned().fold(f64::MIN, f64::max);
    let least = pct.iter().cloned().fold(f64::MAX, f64::min);
    let spread = most - least;

    let mut out = [(coef_min + coef_max) / 2.0; BAND_COUNT];
    if spread <= f64::EPSILON {
        return out;
    }
    for (c, p) in out.iter_mut().zip(pct.iter()) {
        *c = coef_max - (p - least) / spread * (coef_max - coef_min);
    }
    out
}

/// Caller-tracked record of the last band change for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandTransition {
    pub current_band: usize,
    pub previous_band: Option<usize>,
    pub last_transition: Option<NaiveDate>,
}

impl BandTransition {
    /// Start tracking at `risk` with no recorded transition.
    pub fn start(risk: Risk) -> Self {
        Self { current_band: band_of(risk), previous_band: None, last_transition: None }
    }

    /// Record today's risk. Returns true if the band changed.
    pub fn observe(&mut self, risk: Risk, date: NaiveDate) -> bool {
        let band = band_of(risk);
        if band == self.current_band {
            return false;
        }
        self.previous_band = Some(self.current_band);
        self.current_band = band;
        self.last_transition = Some(date);
        true
    }

    /// Band left on `date`, if the transition happened that day.
    pub fn previous_band_if_changed_on(&self, date: NaiveDate) -> Option<usize> {
        match (self.previous_band, self.last_transition) {
            | (Some(prev), Some(day)) if day == date && prev != self.current_band => Some(prev),
            | _ => None,
        }
    }
}

/// Accumulates one band observation per day into a histogram.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OccupancyTracker {
    symbol: String,
    band_days: [u64; BAND_COUNT],
    last_day: Option<NaiveDate>,
}

impl OccupancyTracker {
    pub fn new(symbol: &str) -> Self {
        Self { symbol: symbol.to_uppercase(), band_days: [0; BAND_COUNT], last_day: None }
    }

    /// Continue counting on top of an existing snapshot.
    pub fn resume(histogram: &RiskBandHistogram, last_day: Option<NaiveDate>) -> Self {
        Self { symbol: histogram.symbol.clone(), band_days: histogram.band_days, last_day }
    }

    /// Count `date` in the band of `risk`. Days at or before the last recorded day are ignored.
    pub fn record(&mut self, date: NaiveDate, risk: Risk) -> bool {
        if matches!(self.last_day, Some(last) if date <= last) {
            return false;
        }
        self.band_days[band_of(risk)] += 1;
        self.last_day = Some(date);
        true
    }

    pub fn histogram(&self) -> RiskBandHistogram {
        RiskBandHistogram::new(&self.symbol, self.band_days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const BTC_DAYS: [u64; BAND_COUNT] = [134, 721, 840, 1131, 1102, 943, 369, 135, 79, 19];

    fn btc() -> BandRarityCoefficient {
        let hist = RiskBandHistogram::new("BTC", BTC_DAYS);
        BandRarityCoefficient::from_histogram(&hist, &RarityConfig::default()).unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn risk(r: f64) -> Risk {
        Risk::new(r).unwrap()
    }

    #[test]
    fn reference_histogram_percentages() {
        let hist = RiskBandHistogram::new("BTC", BTC_DAYS);
        assert_eq!(hist.total_days, 5473);
        let pct = hist.percentages().unwrap();
        assert!((pct[5] - 0.1723).abs() < 1e-3);
        assert!((pct[9] - 0.00347).abs() < 1e-4);
    }

    #[test]
    fn reference_histogram_coefficients() {
        let coef = btc();
        // band [0.3,0.4) is the most visited (1131 days)
        assert!((coef.band_coefficient(3) - 1.0).abs() < 1e-9);
        assert!((coef.band_coefficient(9) - 1.6).abs() < 1e-9);
        assert!((coef.band_coefficient(5) - 1.10).abs() < 0.01);
        assert!(coef.band_coefficient(4) < coef.band_coefficient(5));
    }

    #[test]
    fn empty_histogram_is_insufficient() {
        let hist = RiskBandHistogram::new("NEW", [0; BAND_COUNT]);
        assert_matches!(
            BandRarityCoefficient::from_histogram(&hist, &RarityConfig::default()),
            Err(Error::InsufficientData(_))
        );
    }

    #[test]
    fn inconsistent_total_is_insufficient() {
        let mut hist = RiskBandHistogram::new("BAD", BTC_DAYS);
        hist.total_days += 1;
        assert_matches!(hist.percentages(), Err(Error::InsufficientData(_)));
    }

    #[test]
    fn uniform_histogram_uses_midpoint() {
        let hist = RiskBandHistogram::new("FLAT", [10; BAND_COUNT]);
        let coef = BandRarityCoefficient::from_histogram(&hist, &RarityConfig::default()).unwrap();
        for i in 0..=100 {
            assert!((coef.coefficient_at(risk(i as f64 / 100.0)) - 1.3).abs() < 1e-12);
        }
    }

    #[test]
    fn band_edges_hit_band_coefficients() {
        let coef = btc();
        for band in 0..BAND_COUNT {
            let at = coef.coefficient_at(risk(band as f64 / 10.0));
            assert!((at - coef.band_coefficient(band)).abs() < 1e-9, "band {}", band);
        }
        assert_eq!(coef.coefficient_at(risk(1.0)), coef.band_coefficient(9));
        assert_eq!(coef.coefficient_at(risk(0.95)), coef.band_coefficient(9));
    }

    #[test]
    fn rising_toward_rarer_band_is_front_loaded() {
        let coef = btc();
        // band 5 -> band 6 gets rarer
        let from = coef.band_coefficient(5);
        let to = coef.band_coefficient(6);
        assert!(to > from);
        let quarter = coef.coefficient_at(risk(0.525));
        let pure_smoothstep = from + (to - from) * (0.25 * 0.25 * (3.0 - 0.5));
        assert!(quarter > pure_smoothstep);
    }

    #[test]
    fn falling_toward_common_band_is_delayed() {
        let coef = btc();
        // band 2 -> band 3 gets more common
        let from = coef.band_coefficient(2);
        let to = coef.band_coefficient(3);
        assert!(to < from);
        let quarter = coef.coefficient_at(risk(0.225));
        let pure_smoothstep = from + (to - from) * (0.25 * 0.25 * (3.0 - 0.5));
        assert!(quarter > pure_smoothstep);
    }

    #[test]
    fn transition_day_never_drops() {
        let coef = btc();
        // leaving rare band 7 for the more common band 6
        let mut t = BandTransition::start(risk(0.75));
        assert!(t.observe(risk(0.65), day(2)));
        let on_day = coef.coefficient_stabilized(risk(0.65), &t, day(2));
        assert_eq!(on_day, coef.band_coefficient(7));

        let next_day = coef.coefficient_stabilized(risk(0.65), &t, day(3));
        assert_eq!(next_day, coef.coefficient_at(risk(0.65)));
    }

    #[test]
    fn transition_day_into_rarer_band_is_flat() {
        let coef = btc();
        let mut t = BandTransition::start(risk(0.55));
        t.observe(risk(0.67), day(4));
        let on_day = coef.coefficient_stabilized(risk(0.67), &t, day(4));
        assert_eq!(on_day, coef.band_coefficient(6));
    }

    #[test]
    fn transition_day_follows_recorded_band() {
        let coef = btc();
        // recorded move 8 -> 4 while today's risk already sits in band 5
        let t = BandTransition { current_band: 4, previous_band: Some(8), last_transition: Some(day(6)) };
        let on_day = coef.coefficient_stabilized(risk(0.55), &t, day(6));
        assert_eq!(on_day, coef.band_coefficient(8));

        // recorded move 4 -> 9 while today's risk reads band 3
        let t = BandTransition { current_band: 9, previous_band: Some(4), last_transition: Some(day(6)) };
        let on_day = coef.coefficient_stabilized(risk(0.35), &t, day(6));
        assert_eq!(on_day, coef.band_coefficient(9));
        assert!(on_day > coef.band_coefficient(band_of(risk(0.35))));
    }

    fn random_coefficient(rng: &mut StdRng) -> BandRarityCoefficient {
        let mut band_days = [0u64; BAND_COUNT];
        for days in band_days.iter_mut() {
            *days = if rng.gen_bool(0.15) { 0 } else { rng.gen_range(1..2_000) };
        }
        band_days[rng.gen_range(0..BAND_COUNT)] += 1;
        let config = RarityConfig {
            blend: rng.gen_range(0.0..=1.0),
            gamma_up: rng.gen_range(0.2..1.0),
            gamma_down: rng.gen_range(1.0..4.0),
            ..RarityConfig::default()
        };
        BandRarityCoefficient::from_histogram(&RiskBandHistogram::new("RND", band_days), &config).unwrap()
    }

    #[test]
    fn coefficient_stays_within_configured_range() {
        let mut rng = StdRng::seed_from_u64(17);
        let config = RarityConfig::default();
        for _ in 0..200 {
            let coef = random_coefficient(&mut rng);
            for i in 0..=1_000 {
                let c = coef.coefficient_at(risk(i as f64 / 1_000.0));
                assert!(c >= config.coef_min - 1e-12 && c <= config.coef_max + 1e-12, "{} at {}", c, i);
            }
            for _ in 0..200 {
                let c = coef.coefficient_at(risk(rng.gen_range(0.0..=1.0)));
                assert!((config.coef_min..=config.coef_max).contains(&c));
            }
        }
    }

    #[test]
    fn coefficient_is_continuous_across_band_starts() {
        let mut rng = StdRng::seed_from_u64(29);
        for _ in 0..200 {
            let coef = random_coefficient(&mut rng);
            for band in 1..BAND_COUNT {
                let edge = band as f64 / 10.0;
                let left = coef.coefficient_at(risk(edge - 1e-9));
                let at = coef.coefficient_at(risk(edge));
                assert!((left - at).abs() < 1e-6, "band {}: {} vs {}", band, left, at);
            }
        }
    }

    #[test]
    fn observe_same_band_keeps_state() {
        let mut t = BandTransition::start(risk(0.41));
        assert!(!t.observe(risk(0.49), day(1)));
        assert_eq!(t.previous_band, None);
        assert_eq!(t.previous_band_if_changed_on(day(1)), None);
    }

    #[test]
    fn occupancy_tracker_counts_once_per_day() {
        let mut tracker = OccupancyTracker::new("eth");
        assert!(tracker.record(day(1), risk(0.15)));
        assert!(!tracker.record(day(1), risk(0.95)));
        assert!(tracker.record(day(2), risk(0.95)));
        assert!(!tracker.record(day(1), risk(0.5)));
        let hist = tracker.histogram();
        assert_eq!(hist.symbol, "ETH");
        assert_eq!(hist.total_days, 2);
        assert_eq!(hist.band_days[1], 1);
        assert_eq!(hist.band_days[9], 1);
    }
}
