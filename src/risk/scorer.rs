//! Turns a risk reading and its rarity coefficient into the `risk_band` component.
//!
//! Low risk leans long, high risk leans short. Strength grows with the distance
//! from the middle of the range and is amplified by how rare the current band
//! has historically been.

use chrono::Utc;
use serde_json::json;

use super::rarity::{band_of, RiskBandHistogram};
use crate::config::{RarityConfig, RiskBandConfig};
use crate::fusion::ComponentScore;
use crate::utils::types::{ComponentId, Confidence, Direction, Risk, Score};

#[derive(Debug, Clone)]
pub struct RiskBandScorer {
    config: RiskBandConfig,
    coef_max: f64,
}

impl RiskBandScorer {
    pub fn new(config: RiskBandConfig, rarity: &RarityConfig) -> Self {
        Self { config, coef_max: rarity.coef_max }
    }

    pub fn direction(&self, risk: Risk) -> Direction {
        let r = risk.value();
        if r < self.config.long_below {
            Direction::Long
        } else if r > self.config.short_above {
            Direction::Short
        } else {
            Direction::Neutral
        }
    }

    /// Build the component score for one reading.
    pub fn score(
        &self,
        price: f64,
        risk: Risk,
        coefficient: f64,
        histogram: &RiskBandHistogram,
    ) -> ComponentScore {
        let strength = ((risk.value() - 0.5).abs() / 0.5).clamp(0.0, 1.0);
        let score = Score::clamped(100.0 * strength * coefficient / self.coef_max);
        let win_rate = Confidence::clamped(0.5 + 0.45 * score.value() / 100.0);
        let history = self.config.full_history_days.max(1) as f64;
        let confidence = Confidence::clamped(histogram.total_days as f64 / history);

        ComponentScore {
            component_id: ComponentId::RiskBand,
            score,
            win_rate,
            direction: self.direction(risk),
            confidence,
            analysis_details: json!({
                "price": price,
                "risk": risk.value(),
                "band": band_of(risk),
                "rarity_coefficient": coefficient,
                "history_days": histogram.total_days,
            }),
            timestamp: Utc::now(),
        }
    }
}
