//! Endpoint signals: independent weighted sub-scores for one symbol.

pub mod calibration;
pub mod collector;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::utils::error::{Error, Result};
use crate::utils::types::{Confidence, Direction, Score, Weight};

pub use calibration::{EndpointCalibrationEngine, Redistribution};
pub use collector::SignalCollector;

/// What an endpoint returns on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointReading {
    pub raw_score: Score,
    pub confidence: Confidence,
    #[serde(default)]
    pub patterns: Vec<String>,
}

/// One endpoint's contribution to a scoring request, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointSignal {
    pub endpoint_id: String,
    pub weight: Weight,
    pub raw_score: Score,
    pub confidence: Confidence,
    pub success: bool,
    #[serde(default)]
    pub patterns: Vec<String>,
    /// Why the endpoint failed; kept for diagnostics only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl EndpointSignal {
    pub fn succeeded(endpoint_id: &str, weight: Weight, reading: EndpointReading) -> Self {
        Self {
            endpoint_id: endpoint_id.to_string(),
            weight,
            raw_score: reading.raw_score,
            confidence: reading.confidence,
            success: true,
            patterns: reading.patterns,
            failure: None,
        }
    }

    pub fn failed(endpoint_id: &str, weight: Weight, reason: impl Into<String>) -> Self {
        Self {
            endpoint_id: endpoint_id.to_string(),
            weight,
            raw_score: Score::clamped(0.0),
            confidence: Confidence::clamped(0.0),
            success: false,
            patterns: Vec::new(),
            failure: Some(reason.into()),
        }
    }

    /// Direction implied by the raw score relative to the neutral band.
    pub fn implied_direction(&self, neutral_low: f64, neutral_high: f64) -> Direction {
        let s = self.raw_score.value();
        if s > neutral_high {
            Direction::Long
        } else if s < neutral_low {
            Direction::Short
        } else {
            Direction::Neutral
        }
    }
}

/// An independent source of raw score for a symbol.
#[async_trait]
pub trait EndpointProvider: Send + Sync {
    fn id(&self) -> &str;

    /// Static weight of this endpoint in the calibrated blend.
    fn weight(&self) -> Weight;

    async fn query(&self, symbol: &str) -> Result<EndpointReading>;
}

/// Endpoint with a fixed answer, for offline runs and tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticEndpoint {
    pub id: String,
    pub weight: Weight,
    #[serde(default)]
    pub reading: Option<EndpointReading>,
    /// Artificial latency in milliseconds
    #[serde(default)]
    pub delay_ms: u64,
}

impl StaticEndpoint {
    pub fn ok(id: &str, weight: Weight, reading: EndpointReading) -> Self {
        Self { id: id.to_string(), weight, reading: Some(reading), delay_ms: 0 }
    }

    pub fn failing(id: &str, weight: Weight) -> Self {
        Self { id: id.to_string(), weight, reading: None, delay_ms: 0 }
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}

#[async_trait]
impl EndpointProvider for StaticEndpoint {
    fn id(&self) -> &str {
        &self.id
    }

    fn weight(&self) -> Weight {
        self.weight
    }

    async fn query(&self, _symbol: &str) -> Result<EndpointReading> {
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        self.reading.clone().ok_or_else(|| Error::EndpointFailure {
            endpoint: self.id.clone(),
            reason: "no reading configured".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn signal(score: f64) -> EndpointSignal {
        EndpointSignal::succeeded(
            "rsi",
            Weight::new(10.0).unwrap(),
            EndpointReading {
                raw_score: Score::new(score).unwrap(),
                confidence: Confidence::new(0.8).unwrap(),
                patterns: vec!["divergence".into()],
            },
        )
    }

    #[rstest]
    #[case(70.0, Direction::Long)]
    #[case(55.0, Direction::Neutral)]
    #[case(45.0, Direction::Neutral)]
    #[case(20.0, Direction::Short)]
    fn implied_direction(#[case] score: f64, #[case] expected: Direction) {
        assert_eq!(signal(score).implied_direction(45.0, 55.0), expected);
    }

    #[test]
    fn failed_signal_keeps_reason() {
        let s = EndpointSignal::failed("macd", Weight::new(5.0).unwrap(), "timeout");
        assert!(!s.success);
        assert_eq!(s.failure.as_deref(), Some("timeout"));
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["failure"], "timeout");
    }

    #[tokio::test]
    async fn static_endpoint_answers() {
        let ok = StaticEndpoint::ok("a", Weight::new(1.0).unwrap(), signal(60.0).into_reading());
        assert_eq!(ok.query("BTC").await.unwrap().raw_score.value(), 60.0);
        let bad = StaticEndpoint::failing("b", Weight::new(1.0).unwrap());
        assert!(bad.query("BTC").await.is_err());
    }

    impl EndpointSignal {
        fn into_reading(self) -> EndpointReading {
            EndpointReading { raw_score: self.raw_score, confidence: self.confidence, patterns: self.patterns }
        }
    }
}
