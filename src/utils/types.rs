//! Common types used throughout the scoring engine.
//!
//! Numeric quantities live on different scales (risk and confidence on 0..1,
//! scores and weights on 0..100), so each gets its own validated wrapper.

use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use std::fmt;
use std::str::FromStr;

use super::error::{Error, Result};

macro_rules! bounded_value {
    ($(#[$meta:meta])* $name:ident, $label:literal, $lo:expr, $hi:expr, lower_open = $open:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
        #[serde(try_from = "f64", into = "f64")]
        pub struct $name(f64);

        impl $name {
            pub const MIN: f64 = $lo;
            pub const MAX: f64 = $hi;
            /// Smallest value a valid instance can hold.
            pub const FLOOR: f64 = if $open { $lo + f64::MIN_POSITIVE } else { $lo };

            /// Validate `value` against the allowed range.
            pub fn new(value: f64) -> Result<Self> {
                let below = if $open { value <= Self::MIN } else { value < Self::MIN };
                if !value.is_finite() || below || value > Self::MAX {
                    return Err(Error::OutOfRange { name: $label, value });
                }
                Ok(Self(value))
            }

            /// Saturate `value` into the allowed range. NaN maps to [`Self::FLOOR`].
            pub fn clamped(value: f64) -> Self {
                if value.is_nan() {
                    return Self(Self::FLOOR);
                }
                Self(value.clamp(Self::FLOOR, Self::MAX))
            }

            pub fn value(self) -> f64 {
                self.0
            }
        }

        impl TryFrom<f64> for $name {
            type Error = Error;

            fn try_from(value: f64) -> Result<Self> {
                Self::new(value)
            }
        }

        impl From<$name> for f64 {
            fn from(v: $name) -> f64 {
                v.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:.4}", self.0)
            }
        }
    };
}

bounded_value!(
    /// Position of a price between its configured bounds, 0 = cheapest, 1 = most expensive.
    Risk, "risk", 0.0, 1.0, lower_open = false
);
bounded_value!(
    /// Score on the 0..100 scale.
    Score, "score", 0.0, 100.0, lower_open = false
);
bounded_value!(
    /// Probability-like value on the 0..1 scale (confidence, win rate).
    Confidence, "confidence", 0.0, 1.0, lower_open = false
);
bounded_value!(
    /// Static endpoint weight in (0, 100].
    Weight, "weight", 0.0, 100.0, lower_open = true
);

/// Trade direction implied by a score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
    Neutral,
}

impl Direction {
    /// +1 for long, -1 for short, 0 for neutral.
    pub fn sign(self) -> f64 {
        match self {
            | Direction::Long => 1.0,
            | Direction::Short => -1.0,
            | Direction::Neutral => 0.0,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            | Direction::Long => "LONG",
            | Direction::Short => "SHORT",
            | Direction::Neutral => "NEUTRAL",
        };
        f.write_str(s)
    }
}

/// Identifies the engine that produced a [`ComponentScore`](crate::fusion::ComponentScore).
///
/// Serialized as a bare string so it can key a JSON object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, SerializeDisplay, DeserializeFromStr)]
pub enum ComponentId {
    /// Price position between bounds weighted by band rarity
    RiskBand,
    /// Calibrated blend of independent endpoint signals
    EndpointCalibration,
    /// Any other independently scored component
    Custom(String),
}

impl ComponentId {
    pub fn as_str(&self) -> &str {
        match self {
            | ComponentId::RiskBand => "risk_band",
            | ComponentId::EndpointCalibration => "endpoint_calibration",
            | ComponentId::Custom(name) => name,
        }
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComponentId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            | "risk_band" => ComponentId::RiskBand,
            | "endpoint_calibration" => ComponentId::EndpointCalibration,
            | other => ComponentId::Custom(other.to_string()),
        })
    }
}
