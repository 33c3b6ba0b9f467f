//! End-to-end scoring: config, market data, endpoints, aggregation, cache.

use std::sync::Arc;

use riskscore::engine::ADVISORY_CATEGORY;
use riskscore::fusion::{FusionPolicy, MajorityVote, MaxConfidence, WeightedMean};
use riskscore::market_data::StaticMarketData;
use riskscore::signal::{EndpointProvider, EndpointReading, StaticEndpoint};
use riskscore::utils::types::{ComponentId, Confidence, Direction, Score, Weight};
use riskscore::{Advisory, EngineConfig, Error, RiskScoringEngine};

const CONFIG: &str = r#"
log_level = "info"

[[bounds]]
symbol = "BTC"
min_price = 15000.0
max_price = 738965.0

[[histograms]]
symbol = "BTC"
band_days = [134, 721, 840, 1131, 1102, 943, 369, 135, 79, 19]
"#;

fn endpoint(id: &str, weight: f64, score: Option<f64>) -> Arc<dyn EndpointProvider> {
    let weight = Weight::new(weight).unwrap();
    match score {
        | Some(s) => Arc::new(StaticEndpoint::ok(
            id,
            weight,
            EndpointReading {
                raw_score: Score::new(s).unwrap(),
                confidence: Confidence::new(0.6).unwrap(),
                patterns: vec![],
            },
        )),
        | None => Arc::new(StaticEndpoint::failing(id, weight)),
    }
}

fn engine(price: f64, change: f64) -> RiskScoringEngine {
    let config = EngineConfig::from_toml_str(CONFIG).unwrap();
    RiskScoringEngine::builder(config)
        .market_data(Arc::new(StaticMarketData::new().with("BTC", price, change)))
        .endpoint(endpoint("onchain", 40.0, Some(30.0)))
        .endpoint(endpoint("sentiment", 35.0, Some(38.0)))
        .endpoint(endpoint("flows", 25.0, None))
        .build()
        .unwrap()
}

#[tokio::test]
async fn cheap_price_scores_long_and_is_cached() {
    riskscore::utils::init_test_logging();
    let engine = engine(18_000.0, 2.5);
    let advisory = engine.score("BTC").await.unwrap();

    let risk = advisory.get(&ComponentId::RiskBand).unwrap();
    assert_eq!(risk.direction, Direction::Long);
    assert!(risk.score.value() > 50.0);

    let endpoints = advisory.get(&ComponentId::EndpointCalibration).unwrap();
    assert_eq!(endpoints.direction, Direction::Short);
    assert!((endpoints.confidence.value() - 0.75).abs() < 1e-9);

    assert!(advisory.timestamp >= risk.timestamp);
    assert!(advisory.timestamp >= endpoints.timestamp);

    let cached: Advisory = engine.cache().get_as("BTC", ADVISORY_CATEGORY).unwrap();
    assert_eq!(cached, advisory);
    let info = engine.cache().info(Some("BTC"));
    assert_eq!(info.entries[0].volatility, 2.5);
}

#[tokio::test]
async fn fusion_policies_work_on_the_advisory() {
    let advisory = engine(18_000.0, 0.0).score("BTC").await.unwrap();
    let policies: Vec<Box<dyn FusionPolicy>> =
        vec![Box::new(WeightedMean::default()), Box::new(MajorityVote), Box::new(MaxConfidence)];
    for policy in policies {
        let fused = advisory.fuse(policy.as_ref()).unwrap();
        assert!((0.0..=100.0).contains(&fused.score.value()), "{}", policy.name());
    }
}

#[tokio::test]
async fn unknown_symbol_falls_back_to_endpoints() {
    let advisory = engine(18_000.0, 0.0).score("ETH").await.unwrap();
    assert!(advisory.get(&ComponentId::RiskBand).is_none());
    assert_eq!(advisory.available_scores().len(), 1);
}

#[tokio::test]
async fn invalidate_forces_recompute() {
    let engine = engine(18_000.0, 0.0);
    engine.score("BTC").await.unwrap();
    assert!(engine.cache().invalidate("btc"));
    assert!(engine.cache().get("BTC", ADVISORY_CATEGORY).is_none());
    engine.score("BTC").await.unwrap();
    assert!(engine.cache().get("BTC", ADVISORY_CATEGORY).is_some());
}

#[tokio::test]
async fn engine_without_any_source_reports_error() {
    let config = EngineConfig::from_toml_str(CONFIG).unwrap();
    let engine = RiskScoringEngine::builder(config)
        .market_data(Arc::new(StaticMarketData::new()))
        .build()
        .unwrap();
    assert!(matches!(engine.score("BTC").await, Err(Error::InsufficientData(_))));
    assert!(matches!(engine.score("DOGE").await, Err(Error::MissingBounds(_))));
}

#[tokio::test]
async fn zero_price_feed_drops_risk_component() {
    let engine = engine(0.0, 0.0);
    let advisory = engine.score("BTC").await.unwrap();
    assert!(advisory.get(&ComponentId::RiskBand).is_none());
    let endpoints = advisory.get(&ComponentId::EndpointCalibration).unwrap();
    assert_eq!(endpoints.direction, Direction::Short);
}
