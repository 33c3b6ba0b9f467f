//! Pluggable fusion strategies over an [`Advisory`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{direction_vote, Advisory};
use crate::utils::types::{ComponentId, Confidence, Direction, Score};

/// Single fused view of an advisory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusedScore {
    pub score: Score,
    pub direction: Direction,
    pub confidence: Confidence,
}

/// Strategy that reduces an advisory to one score. `None` when it has nothing to work with.
pub trait FusionPolicy: Send + Sync {
    fn name(&self) -> &str;
    fn fuse(&self, advisory: &Advisory) -> Option<FusedScore>;
}

/// Weighted mean over the components present; weights renormalise over what is available.
#[derive(Debug, Clone)]
pub struct WeightedMean {
    weights: HashMap<ComponentId, f64>,
    default_weight: f64,
}

impl WeightedMean {
    pub fn new(default_weight: f64) -> Self {
        Self { weights: HashMap::new(), default_weight: default_weight.max(0.0) }
    }

    pub fn with_weight(mut self, id: ComponentId, weight: f64) -> Self {
        self.weights.insert(id, weight.max(0.0));
        self
    }

    fn weight(&self, id: &ComponentId) -> f64 {
        self.weights.get(id).copied().unwrap_or(self.default_weight)
    }
}

impl Default for WeightedMean {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl FusionPolicy for WeightedMean {
    fn name(&self) -> &str {
        "weighted_mean"
    }

    fn fuse(&self, advisory: &Advisory) -> Option<FusedScore> {
        let mut total = 0.0;
        let mut score = 0.0;
        let mut confidence = 0.0;
        let mut lean = 0.0;
        for (id, c) in &advisory.component_scores {
            let w = self.weight(id);
            total += w;
            score += w * c.score.value();
            confidence += w * c.confidence.value();
            lean += w * c.direction.sign() * c.confidence.value();
        }
        if total <= 0.0 {
            return None;
        }
        let lean = lean / total;
        let direction = if lean > 1e-9 {
            Direction::Long
        } else if lean < -1e-9 {
            Direction::Short
        } else {
            Direction::Neutral
        };
        Some(FusedScore {
            score: Score::clamped(score / total),
            direction,
            confidence: Confidence::clamped(confidence / total),
        })
    }
}

/// Direction by majority; score and confidence from the components on the winning side.
#[derive(Debug, Clone, Copy, Default)]
pub struct MajorityVote;

impl FusionPolicy for MajorityVote {
    fn name(&self) -> &str {
        "majority_vote"
    }

    fn fuse(&self, advisory: &Advisory) -> Option<FusedScore> {
        let vote = direction_vote(advisory.component_scores.values().map(|c| c.direction))?;
        let camp: Vec<_> =
            advisory.component_scores.values().filter(|c| c.direction == vote.direction).collect();
        if camp.is_empty() {
            // tie between directional camps with no neutral component
            return Some(FusedScore {
                score: Score::clamped(0.0),
                direction: Direction::Neutral,
                confidence: Confidence::clamped(0.0),
            });
        }
        let n = camp.len() as f64;
        let score = camp.iter().map(|c| c.score.value()).sum::<f64>() / n;
        let confidence = camp.iter().map(|c| c.confidence.value()).sum::<f64>() / n;
        Some(FusedScore {
            score: Score::clamped(score),
            direction: vote.direction,
            confidence: Confidence::clamped(confidence * vote.share()),
        })
    }
}

/// The most confident component wins outright.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxConfidence;

impl FusionPolicy for MaxConfidence {
    fn name(&self) -> &str {
        "max_confidence"
    }

    fn fuse(&self, advisory: &Advisory) -> Option<FusedScore> {
        advisory.highest_confidence_component().map(|c| FusedScore {
            score: c.score,
            direction: c.direction,
            confidence: c.confidence,
        })
    }
}
