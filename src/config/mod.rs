//! Configuration module for the scoring engine

mod registry;

use crate::risk::{RiskBandHistogram, SymbolRiskBounds};
use crate::utils::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub use registry::{BoundsRegistry, HistogramRegistry};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Separate level for the analysis cache, which logs every read and write
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_log_level: Option<String>,

    /// Optional path of the durable cache database
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_path: Option<String>,

    /// Risk-band component settings
    #[serde(default)]
    pub risk: RiskBandConfig,

    /// Rarity coefficient settings
    #[serde(default)]
    pub rarity: RarityConfig,

    /// Endpoint calibration settings
    #[serde(default)]
    pub calibration: CalibrationConfig,

    /// Endpoint collection settings
    #[serde(default)]
    pub collector: CollectorConfig,

    /// Analysis cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Per-symbol price bounds
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bounds: Vec<SymbolRiskBounds>,

    /// Per-symbol occupancy histograms
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub histograms: Vec<HistogramConfig>,
}

/// Settings that turn a risk value into a component score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskBandConfig {
    /// Risk below which the component leans long
    #[serde(default = "default_long_below")]
    pub long_below: f64,

    /// Risk above which the component leans short
    #[serde(default = "default_short_above")]
    pub short_above: f64,

    /// Histogram length (days) at which the component reaches full confidence
    #[serde(default = "default_full_history_days")]
    pub full_history_days: u64,
}

/// Rarity coefficient range and interpolation shape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RarityConfig {
    /// Coefficient assigned to the most common band
    #[serde(default = "default_coef_min")]
    pub coef_min: f64,

    /// Coefficient assigned to the rarest band
    #[serde(default = "default_coef_max")]
    pub coef_max: f64,

    /// Share of the asymmetric term in the in-band blend (0..1)
    #[serde(default = "default_blend")]
    pub blend: f64,

    /// Exponent used when moving toward a rarer band (< 1)
    #[serde(default = "default_gamma_up")]
    pub gamma_up: f64,

    /// Exponent used when moving toward a more common band (> 1)
    #[serde(default = "default_gamma_down")]
    pub gamma_down: f64,
}

/// Endpoint calibration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Total weight the successful endpoints are re-normalized to
    #[serde(default = "default_weight_scale")]
    pub weight_scale: f64,

    /// Exponent of the calibration power curve (> 1 makes high scores rare)
    #[serde(default = "default_exponent")]
    pub exponent: f64,

    /// Raw scores below this imply SHORT
    #[serde(default = "default_neutral_low")]
    pub neutral_low: f64,

    /// Raw scores above this imply LONG
    #[serde(default = "default_neutral_high")]
    pub neutral_high: f64,

    /// Calibrated scores at or above this require near-perfect agreement
    #[serde(default = "default_elite_threshold")]
    pub elite_threshold: f64,

    /// Minimum raw-score agreement (0..1) needed to reach the elite range
    #[serde(default = "default_elite_agreement")]
    pub elite_agreement: f64,
}

/// Endpoint collection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Maximum number of endpoints queried at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Per-endpoint timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Analysis cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL for calm markets at neutral confidence scaling
    #[serde(default = "default_base_ttl_secs")]
    pub base_ttl_secs: u64,

    /// TTL never drops below this
    #[serde(default = "default_min_ttl_secs")]
    pub min_ttl_secs: u64,

    /// Absolute 24h change (%) up to which the full base TTL applies
    #[serde(default = "default_low_volatility_pct")]
    pub low_volatility_pct: f64,

    /// Absolute 24h change (%) above which TTL shrinks sharply
    #[serde(default = "default_high_volatility_pct")]
    pub high_volatility_pct: f64,

    /// Volatility factor reached at `high_volatility_pct`
    #[serde(default = "default_medium_floor_factor")]
    pub medium_floor_factor: f64,

    /// Confidence factor at zero confidence
    #[serde(default = "default_confidence_floor_factor")]
    pub confidence_floor_factor: f64,

    /// Added to the confidence factor at full confidence
    #[serde(default = "default_confidence_span")]
    pub confidence_span: f64,

    /// Maximum number of entries before LRU eviction
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Volatility assumed for symbols never observed
    #[serde(default = "default_volatility_pct")]
    pub default_volatility_pct: f64,
}

/// Histogram as written in the configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramConfig {
    pub symbol: String,
    pub band_days: [u64; 10],
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            cache_log_level: None,
            cache_path: None,
            risk: RiskBandConfig::default(),
            rarity: RarityConfig::default(),
            calibration: CalibrationConfig::default(),
            collector: CollectorConfig::default(),
            cache: CacheConfig::default(),
            bounds: Vec::new(),
            histograms: Vec::new(),
        }
    }
}

impl Default for RiskBandConfig {
    fn default() -> Self {
        Self {
            long_below: default_long_below(),
            short_above: default_short_above(),
            full_history_days: default_full_history_days(),
        }
    }
}

impl Default for RarityConfig {
    fn default() -> Self {
        Self {
            coef_min: default_coef_min(),
            coef_max: default_coef_max(),
            blend: default_blend(),
            gamma_up: default_gamma_up(),
            gamma_down: default_gamma_down(),
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            weight_scale: default_weight_scale(),
            exponent: default_exponent(),
            neutral_low: default_neutral_low(),
            neutral_high: default_neutral_high(),
            elite_threshold: default_elite_threshold(),
            elite_agreement: default_elite_agreement(),
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self { max_concurrency: default_max_concurrency(), timeout_ms: default_timeout_ms() }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            base_ttl_secs: default_base_ttl_secs(),
            min_ttl_secs: default_min_ttl_secs(),
            low_volatility_pct: default_low_volatility_pct(),
            high_volatility_pct: default_high_volatility_pct(),
            medium_floor_factor: default_medium_floor_factor(),
            confidence_floor_factor: default_confidence_floor_factor(),
            confidence_span: default_confidence_span(),
            capacity: default_capacity(),
            default_volatility_pct: default_volatility_pct(),
        }
    }
}

// --------- Helper default functions for serde ---------
fn default_log_level() -> String {
    "info".to_string()
}
fn default_long_below() -> f64 {
    0.4
}
fn default_short_above() -> f64 {
    0.6
}
fn default_full_history_days() -> u64 {
    1_460
}
fn default_coef_min() -> f64 {
    1.0
}
fn default_coef_max() -> f64 {
    1.6
}
fn default_blend() -> f64 {
    0.3
}
fn default_gamma_up() -> f64 {
    0.7
}
fn default_gamma_down() -> f64 {
    1.5
}
fn default_weight_scale() -> f64 {
    100.0
}
fn default_exponent() -> f64 {
    1.3
}
fn default_neutral_low() -> f64 {
    45.0
}
fn default_neutral_high() -> f64 {
    55.0
}
fn default_elite_threshold() -> f64 {
    95.0
}
fn default_elite_agreement() -> f64 {
    0.9
}
fn default_max_concurrency() -> usize {
    8
}
fn default_timeout_ms() -> u64 {
    5_000
}
fn default_base_ttl_secs() -> u64 {
    900
}
fn default_min_ttl_secs() -> u64 {
    240
}
fn default_low_volatility_pct() -> f64 {
    5.0
}
fn default_high_volatility_pct() -> f64 {
    10.0
}
fn default_medium_floor_factor() -> f64 {
    0.6
}
fn default_confidence_floor_factor() -> f64 {
    0.75
}
fn default_confidence_span() -> f64 {
    0.5
}
fn default_capacity() -> usize {
    1_024
}
fn default_volatility_pct() -> f64 {
    5.0
}

impl EngineConfig {
    /// Load configuration from a TOML file and validate it
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration as a TOML string
    pub fn default_toml() -> Result<String> {
        Ok(toml::to_string_pretty(&Self::default())?)
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<()> {
        for b in &self.bounds {
            b.validate()?;
        }
        for h in &self.histograms {
            if h.band_days.iter().sum::<u64>() == 0 {
                return Err(Error::ConfigError(format!("histogram for {} has no days", h.symbol)));
            }
        }

        let r = &self.rarity;
        if !(r.coef_min < r.coef_max) {
            return Err(Error::ConfigError(format!(
                "rarity.coef_min ({}) must be below rarity.coef_max ({})",
                r.coef_min, r.coef_max
            )));
        }
        if !(0.0..=1.0).contains(&r.blend) {
            return Err(Error::ConfigError(format!("rarity.blend must be in [0,1], got {}", r.blend)));
        }
        if !(r.gamma_up > 0.0 && r.gamma_up < 1.0) || r.gamma_down <= 1.0 {
            return Err(Error::ConfigError(
                "rarity.gamma_up must be in (0,1) and rarity.gamma_down above 1".to_string(),
            ));
        }

        let c = &self.calibration;
        if c.weight_scale <= 0.0 || c.exponent <= 0.0 {
            return Err(Error::ConfigError(
                "calibration.weight_scale and calibration.exponent must be positive".to_string(),
            ));
        }
        if c.neutral_low > c.neutral_high {
            return Err(Error::ConfigError(
                "calibration.neutral_low must not exceed calibration.neutral_high".to_string(),
            ));
        }

        if self.risk.long_below > self.risk.short_above {
            return Err(Error::ConfigError(
                "risk.long_below must not exceed risk.short_above".to_string(),
            ));
        }
        if self.collector.max_concurrency == 0 {
            return Err(Error::ConfigError("collector.max_concurrency must be at least 1".to_string()));
        }

        let k = &self.cache;
        if k.min_ttl_secs > k.base_ttl_secs {
            return Err(Error::ConfigError(
                "cache.min_ttl_secs must not exceed cache.base_ttl_secs".to_string(),
            ));
        }
        if k.low_volatility_pct >= k.high_volatility_pct {
            return Err(Error::ConfigError(
                "cache.low_volatility_pct must be below cache.high_volatility_pct".to_string(),
            ));
        }
        if k.capacity == 0 {
            return Err(Error::ConfigError("cache.capacity must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Registry of the configured bounds
    pub fn bounds_registry(&self) -> Result<BoundsRegistry> {
        BoundsRegistry::from_bounds(self.bounds.iter().cloned())
    }

    /// Registry of the configured histograms
    pub fn histogram_registry(&self) -> HistogramRegistry {
        HistogramRegistry::from_histograms(
            self.histograms.iter().map(|h| RiskBandHistogram::new(&h.symbol, h.band_days)),
        )
    }
}
