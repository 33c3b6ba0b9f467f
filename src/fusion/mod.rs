//! Component scores and the advisory that carries them.
//!
//! The aggregator does not blend. It checks that every component was scored
//! on its own, stamps the advisory and offers accessors; numeric fusion is a
//! [`FusionPolicy`] chosen by the caller.

pub mod policy;

use chrono::{DateTime, Utc};
use log::debug;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::utils::error::{Error, Result};
use crate::utils::types::{ComponentId, Confidence, Direction, Score};

pub use policy::{FusedScore, FusionPolicy, MajorityVote, MaxConfidence, WeightedMean};

/// Output contract shared by every scoring engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentScore {
    pub component_id: ComponentId,
    pub score: Score,
    pub win_rate: Confidence,
    pub direction: Direction,
    pub confidence: Confidence,
    #[serde(default)]
    pub analysis_details: Value,
    pub timestamp: DateTime<Utc>,
}

/// Result of the direction vote across components.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionAgreement {
    pub direction: Direction,
    /// Votes for `direction`
    pub agreeing: usize,
    /// Votes for the largest camp (differs from `agreeing` only on a tie)
    pub leading: usize,
    pub total: usize,
}

impl DirectionAgreement {
    pub fn share(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.agreeing as f64 / self.total as f64
        }
    }
}

/// Multi-component result for one symbol at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advisory {
    pub symbol: String,
    pub component_scores: BTreeMap<ComponentId, ComponentScore>,
    pub timestamp: DateTime<Utc>,
}

impl Advisory {
    pub fn available_scores(&self) -> Vec<&ComponentScore> {
        self.component_scores.values().collect()
    }

    pub fn get(&self, id: &ComponentId) -> Option<&ComponentScore> {
        self.component_scores.get(id)
    }

    pub fn len(&self) -> usize {
        self.component_scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.component_scores.is_empty()
    }

    /// Direction shared by the most components. A tie for first place is NEUTRAL.
    pub fn best_direction_agreement(&self) -> Option<DirectionAgreement> {
        direction_vote(self.component_scores.values().map(|c| c.direction))
    }

    pub fn highest_confidence_component(&self) -> Option<&ComponentScore> {
        self.component_scores.values().max_by_key(|c| OrderedFloat(c.confidence.value()))
    }

    /// Highest confidence carried by any component (0 when empty).
    pub fn max_confidence(&self) -> Confidence {
        self.highest_confidence_component()
            .map(|c| c.confidence)
            .unwrap_or_else(|| Confidence::clamped(0.0))
    }

    pub fn fuse(&self, policy: &dyn FusionPolicy) -> Option<FusedScore> {
        policy.fuse(self)
    }

    /// Boundary representation for UI and alerting consumers.
    pub fn to_payload(&self) -> AdvisoryPayload {
        AdvisoryPayload {
            symbol: self.symbol.clone(),
            components: self
                .component_scores
                .iter()
                .map(|(id, c)| {
                    (
                        id.clone(),
                        ComponentSummary {
                            score: c.score,
                            win_rate: c.win_rate,
                            direction: c.direction,
                            confidence: c.confidence,
                        },
                    )
                })
                .collect(),
            timestamp: self.timestamp,
        }
    }
}

/// Count votes per direction; ties for the top count resolve to NEUTRAL.
pub(crate) fn direction_vote<I: IntoIterator<Item = Direction>>(votes: I) -> Option<DirectionAgreement> {
    let mut counts: BTreeMap<Direction, usize> = BTreeMap::new();
    let mut total = 0;
    for d in votes {
        *counts.entry(d).or_insert(0) += 1;
        total += 1;
    }
    let top = *counts.values().max()?;
    let leaders: Vec<Direction> =
        counts.iter().filter(|(_, n)| **n == top).map(|(d, _)| *d).collect();
    let direction = if leaders.len() == 1 { leaders[0] } else { Direction::Neutral };
    let agreeing = counts.get(&direction).copied().unwrap_or(0);
    Some(DirectionAgreement { direction, agreeing, leading: top, total })
}

/// Per-component summary in the boundary payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSummary {
    pub score: Score,
    pub win_rate: Confidence,
    pub direction: Direction,
    pub confidence: Confidence,
}

/// JSON shape exposed to collaborators outside the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryPayload {
    pub symbol: String,
    pub components: BTreeMap<ComponentId, ComponentSummary>,
    pub timestamp: DateTime<Utc>,
}

/// Assembles advisories from independently computed component scores.
#[derive(Debug, Clone, Default)]
pub struct ComponentAggregator;

impl ComponentAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Build the advisory for `symbol`.
    ///
    /// Missing components are simply absent. Every entry must be keyed by its own
    /// `component_id`, and at least one entry is required.
    pub fn aggregate(&self, symbol: &str, scores: HashMap<ComponentId, ComponentScore>) -> Result<Advisory> {
        if scores.is_empty() {
            return Err(Error::InsufficientData(format!("no component could be scored for {symbol}")));
        }
        let mut component_scores = BTreeMap::new();
        let mut latest = Utc::now();
        for (id, score) in scores {
            if score.component_id != id {
                return Err(Error::InvalidArgument(format!(
                    "component keyed as {id} reports id {}",
                    score.component_id
                )));
            }
            latest = latest.max(score.timestamp);
            component_scores.insert(id, score);
        }
        debug!("aggregated {} component(s) for {}", component_scores.len(), symbol);
        Ok(Advisory { symbol: symbol.to_uppercase(), component_scores, timestamp: latest })
    }

    /// Same as [`aggregate`](Self::aggregate), keyed by each score's own id.
    pub fn aggregate_components<I>(&self, symbol: &str, scores: I) -> Result<Advisory>
    where
        I: IntoIterator<Item = ComponentScore>,
    {
        let mut map = HashMap::new();
        for score in scores {
            let id = score.component_id.clone();
            if map.insert(id.clone(), score).is_some() {
                return Err(Error::InvalidArgument(format!("component {id} scored twice")));
            }
        }
        self.aggregate(symbol, map)
    }
}
