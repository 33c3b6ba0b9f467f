//! Calibrated blend of endpoint signals.
//!
//! Failed endpoints drop out of the weight pool and the remaining weights are
//! scaled back up to `weight_scale`. The weighted raw average is then pushed
//! through a convex power curve so that high calibrated scores stay rare:
//! with the default exponent of 1.3 a uniform spread of raw averages lands at
//! or above 80 about 16% of the time and at or above 95 about 4% of the time.
//! Scores in the top range additionally require the endpoints to agree.

use chrono::Utc;
use log::{debug, info};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeSet;

use super::EndpointSignal;
use crate::config::CalibrationConfig;
use crate::fusion::{direction_vote, ComponentScore};
use crate::utils::error::{Error, Result};
use crate::utils::types::{ComponentId, Confidence, Direction, Score};

/// Weight pool after dropping failed endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct Redistribution {
    /// Sum of weights of every endpoint attempted
    pub attempted_weight: f64,
    /// Sum of weights of the endpoints that answered
    pub successful_weight: f64,
    /// `weight_scale / successful_weight`
    pub factor: f64,
    /// Redistributed weight per successful endpoint
    pub weights: Vec<(String, f64)>,
}

impl Redistribution {
    pub fn total(&self) -> f64 {
        self.weights.iter().map(|(_, w)| w).sum()
    }

    /// Share of attempted weight that answered.
    pub fn coverage(&self) -> f64 {
        if self.attempted_weight <= 0.0 {
            0.0
        } else {
            (self.successful_weight / self.attempted_weight).min(1.0)
        }
    }
}

#[derive(Debug, Clone)]
pub struct EndpointCalibrationEngine {
    config: CalibrationConfig,
}

impl EndpointCalibrationEngine {
    pub fn new(config: CalibrationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    /// Re-normalise the successful endpoints' weights to `weight_scale`.
    pub fn redistribute(&self, signals: &[EndpointSignal]) -> Result<Redistribution> {
        let attempted_weight: f64 = signals.iter().map(|s| s.weight.value()).sum();
        let successful_weight: f64 =
            signals.iter().filter(|s| s.success).map(|s| s.weight.value()).sum();
        if successful_weight <= 0.0 {
            return Err(Error::InsufficientData(format!(
                "all {} endpoint(s) failed",
                signals.len()
            )));
        }
        let factor = self.config.weight_scale / successful_weight;
        let weights = signals
            .iter()
            .filter(|s| s.success)
            .map(|s| (s.endpoint_id.clone(), s.weight.value() * factor))
            .collect();
        Ok(Redistribution { attempted_weight, successful_weight, factor, weights })
    }

    /// Monotone map from a raw 0..100 average to a calibrated 0..100 score.
    pub fn calibration_transform(&self, raw: f64) -> Score {
        let x = (raw / 100.0).clamp(0.0, 1.0);
        Score::clamped(100.0 * x.powf(self.config.exponent))
    }

    /// Blend the signals into the `endpoint_calibration` component.
    pub fn calibrate(&self, signals: &[EndpointSignal]) -> Result<ComponentScore> {
        let redistribution = self.redistribute(signals)?;
        let successful: Vec<&EndpointSignal> = signals.iter().filter(|s| s.success).collect();
        let failed: Vec<&EndpointSignal> = signals.iter().filter(|s| !s.success).collect();

        let scale = redistribution.total();
        let raw_average = successful
            .iter()
            .zip(redistribution.weights.iter())
            .map(|(s, (_, w))| w * s.raw_score.value())
            .sum::<f64>()
            / scale;

        let variance = successful
            .iter()
            .zip(redistribution.weights.iter())
            .map(|(s, (_, w))| w * (s.raw_score.value() - raw_average).powi(2))
            .sum::<f64>()
            / scale;
        let agreement = (1.0 - variance.sqrt() / 50.0).clamp(0.0, 1.0);

        let mut score = self.calibration_transform(raw_average);
        let elite = self.config.elite_threshold;
        if score.value() >= elite && agreement < self.config.elite_agreement {
            debug!(
                "capping calibrated score {:.2}: endpoint agreement {:.3} below {:.3}",
                score.value(),
                agreement,
                self.config.elite_agreement
            );
            score = Score::clamped(elite - 1.0);
        }

        let vote = direction_vote(
            successful
                .iter()
                .map(|s| s.implied_direction(self.config.neutral_low, self.config.neutral_high)),
        );
        let (direction, camp_share) = match vote {
            | Some(v) => (v.direction, v.leading as f64 / v.total as f64),
            | None => (Direction::Neutral, 0.0),
        };
        let coverage = redistribution.coverage();
        let confidence = Confidence::clamped(coverage * (0.5 + 0.5 * camp_share));

        let mean_endpoint_confidence =
            successful.iter().map(|s| s.confidence.value()).sum::<f64>() / successful.len() as f64;
        let patterns: BTreeSet<&str> =
            successful.iter().flat_map(|s| s.patterns.iter().map(String::as_str)).collect();

        info!(
            "calibrated {}/{} endpoints: raw {:.2} -> {:.2} {} (confidence {:.3}, factor {:.4})",
            successful.len(),
            signals.len(),
            raw_average,
            score.value(),
            direction,
            confidence.value(),
            redistribution.factor
        );

        Ok(ComponentScore {
            component_id: ComponentId::EndpointCalibration,
            score,
            win_rate: Confidence::clamped(score.value() / 100.0),
            direction,
            confidence,
            analysis_details: json!({
                "raw_average": raw_average,
                "agreement": agreement,
                "coverage": coverage,
                "redistribution_factor": redistribution.factor,
                "successful_weight": redistribution.successful_weight,
                "attempted_weight": redistribution.attempted_weight,
                "successful": successful.iter().map(|s| s.endpoint_id.as_str()).collect::<Vec<_>>(),
                "failed": failed
                    .iter()
                    .map(|s| json!({ "endpoint": s.endpoint_id, "reason": s.failure }))
                    .collect::<Vec<_>>(),
                "patterns": patterns,
                "mean_endpoint_confidence": mean_endpoint_confidence,
            }),
            timestamp: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::EndpointReading;
    use crate::utils::types::Weight;
    use assert_matches::assert_matches;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn engine() -> EndpointCalibrationEngine {
        EndpointCalibrationEngine::new(CalibrationConfig::default())
    }

    fn ok(id: &str, weight: f64, score: f64) -> EndpointSignal {
        EndpointSignal::succeeded(
            id,
            Weight::new(weight).unwrap(),
            EndpointReading {
                raw_score: Score::new(score).unwrap(),
                confidence: Confidence::new(0.7).unwrap(),
                patterns: vec![format!("{id}_pattern")],
            },
        )
    }

    fn failed(id: &str, weight: f64) -> EndpointSignal {
        EndpointSignal::failed(id, Weight::new(weight).unwrap(), "timeout")
    }

    #[test]
    fn reference_redistribution_factor() {
        // 17 endpoints worth 122, the 14 that answer are worth 98
        let mut signals: Vec<EndpointSignal> = (0..14)
            .map(|i| ok(&format!("ok{i}"), 7.0, 60.0))
            .collect();
        signals.push(failed("f1", 8.0));
        signals.push(failed("f2", 8.0));
        signals.push(failed("f3", 8.0));
        let r = engine().redistribute(&signals).unwrap();
        assert_eq!(r.attempted_weight, 122.0);
        assert_eq!(r.successful_weight, 98.0);
        assert!((r.factor - 1.0204).abs() < 1e-4);
        assert!((r.total() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn redistributed_weights_always_sum_to_scale() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let signals: Vec<EndpointSignal> = (0..rng.gen_range(1..20))
                .map(|i| {
                    let w = rng.gen_range(0.5..40.0);
                    if i == 0 || rng.gen_bool(0.7) {
                        ok(&format!("e{i}"), w, rng.gen_range(0.0..100.0))
                    } else {
                        failed(&format!("e{i}"), w)
                    }
                })
                .collect();
            let r = engine().redistribute(&signals).unwrap();
            assert!((r.total() - 100.0).abs() < 1e-9);
        }
    }

    #[test]
    fn all_failed_is_insufficient() {
        let signals = vec![failed("a", 10.0), failed("b", 20.0)];
        assert_matches!(engine().calibrate(&signals), Err(Error::InsufficientData(_)));
        assert_matches!(engine().calibrate(&[]), Err(Error::InsufficientData(_)));
    }

    #[test]
    fn high_scores_are_rare() {
        let e = engine();
        let mut rng = StdRng::seed_from_u64(42);
        let n = 20_000;
        let mut above_80 = 0;
        let mut above_95 = 0;
        for _ in 0..n {
            let s = e.calibration_transform(rng.gen_range(0.0..=100.0)).value();
            if s >= 80.0 {
                above_80 += 1;
            }
            if s >= 95.0 {
                above_95 += 1;
            }
        }
        assert!((above_80 as f64 / n as f64) <= 0.20);
        assert!((above_95 as f64 / n as f64) <= 0.05);
    }

    #[test]
    fn transform_is_monotone_and_centered() {
        let e = engine();
        let mut prev = -1.0;
        for i in 0..=1000 {
            let s = e.calibration_transform(i as f64 / 10.0).value();
            assert!(s >= prev);
            prev = s;
        }
        let mid = e.calibration_transform(55.0).value();
        assert!((40.0..=70.0).contains(&mid), "mid = {mid}");
    }

    #[test]
    fn failure_lowers_confidence_not_score() {
        let all = vec![ok("a", 50.0, 70.0), ok("b", 50.0, 70.0)];
        let partial = vec![ok("a", 50.0, 70.0), failed("b", 50.0)];
        let full = engine().calibrate(&all).unwrap();
        let half = engine().calibrate(&partial).unwrap();
        assert!((full.score.value() - half.score.value()).abs() < 1e-9);
        assert!(half.confidence < full.confidence);
        assert_eq!(half.analysis_details["failed"][0]["endpoint"], "b");
        assert_eq!(half.analysis_details["failed"][0]["reason"], "timeout");
    }

    #[test]
    fn direction_majority_and_tie() {
        let long = engine()
            .calibrate(&[ok("a", 10.0, 80.0), ok("b", 10.0, 70.0), ok("c", 10.0, 20.0)])
            .unwrap();
        assert_eq!(long.direction, Direction::Long);

        let tie = engine().calibrate(&[ok("a", 10.0, 80.0), ok("b", 10.0, 20.0)]).unwrap();
        assert_eq!(tie.direction, Direction::Neutral);
    }

    #[test]
    fn disagreement_scales_confidence_down() {
        let agree = engine().calibrate(&[ok("a", 10.0, 80.0), ok("b", 10.0, 75.0)]).unwrap();
        let split = engine().calibrate(&[ok("a", 10.0, 80.0), ok("b", 10.0, 20.0)]).unwrap();
        assert_eq!(agree.confidence.value(), 1.0);
        assert!((split.confidence.value() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn elite_range_needs_agreement() {
        let unanimous = engine().calibrate(&[ok("a", 10.0, 99.0), ok("b", 10.0, 98.0)]).unwrap();
        assert!(unanimous.score.value() >= 95.0);

        // average ~98 but one endpoint far away
        let e = EndpointCalibrationEngine::new(CalibrationConfig { exponent: 1.0, ..Default::default() });
        let mut signals = vec![ok("far", 2.0, 40.0)];
        signals.extend((0..49).map(|i| ok(&format!("e{i}"), 2.0, 100.0)));
        let mixed = e.calibrate(&signals).unwrap();
        assert!(mixed.score.value() < 95.0);
    }

    #[test]
    fn details_report_patterns_and_factor() {
        let out = engine().calibrate(&[ok("a", 40.0, 60.0), failed("b", 10.0)]).unwrap();
        assert_eq!(out.component_id, ComponentId::EndpointCalibration);
        assert_eq!(out.analysis_details["patterns"][0], "a_pattern");
        assert!((out.analysis_details["redistribution_factor"].as_f64().unwrap() - 2.5).abs() < 1e-9);
    }
}
