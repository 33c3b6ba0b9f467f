//! Request orchestration: cache lookup, component scoring, aggregation, cache write.
//!
//! The risk-band component and the endpoint collection run concurrently. A
//! component that cannot be computed is logged and left out of the advisory;
//! the request only fails when nothing could be scored.

use chrono::{NaiveDate, Utc};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::cache::{AdaptiveAnalysisCache, SledCacheStore};
use crate::config::{EngineConfig, RarityConfig};
use crate::fusion::{Advisory, ComponentAggregator, ComponentScore};
use crate::market_data::MarketDataSource;
use crate::risk::{
    risk_from_bounds, BandRarityCoefficient, BandTransition, BoundsProvider, HistogramProvider, RiskBandScorer,
    RiskCurve,
};
use crate::signal::{EndpointCalibrationEngine, EndpointProvider, SignalCollector};
use crate::utils::error::{Error, Result};

/// Cache category under which advisories are stored.
pub const ADVISORY_CATEGORY: &str = "advisory";

/// One scoring request.
#[derive(Debug, Clone, Default)]
pub struct ScoreRequest {
    pub symbol: String,
    /// Caller-tracked band transition, enables the transition-day rule
    pub transition: Option<BandTransition>,
    /// Day the transition rule is evaluated against (defaults to today, UTC)
    pub today: Option<NaiveDate>,
    /// Skip the cache read and recompute
    pub refresh: bool,
}

impl ScoreRequest {
    pub fn new(symbol: &str) -> Self {
        Self { symbol: symbol.to_uppercase(), ..Default::default() }
    }

    pub fn with_transition(mut self, transition: BandTransition, today: NaiveDate) -> Self {
        self.transition = Some(transition);
        self.today = Some(today);
        self
    }

    pub fn refresh(mut self) -> Self {
        self.refresh = true;
        self
    }
}

pub struct RiskScoringEngine {
    curve: RiskCurve,
    histograms: Arc<dyn HistogramProvider>,
    market: Arc<dyn MarketDataSource>,
    endpoints: Vec<Arc<dyn EndpointProvider>>,
    scorer: RiskBandScorer,
    rarity: RarityConfig,
    calibration: EndpointCalibrationEngine,
    collector: SignalCollector,
    aggregator: ComponentAggregator,
    cache: Arc<AdaptiveAnalysisCache>,
}

impl std::fmt::Debug for RiskScoringEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskScoringEngine").finish_non_exhaustive()
    }
}

/// Builder for [`RiskScoringEngine`]. Only the market data source is mandatory.
pub struct EngineBuilder {
    config: EngineConfig,
    bounds: Option<Arc<dyn BoundsProvider>>,
    histograms: Option<Arc<dyn HistogramProvider>>,
    market: Option<Arc<dyn MarketDataSource>>,
    endpoints: Vec<Arc<dyn EndpointProvider>>,
    cache: Option<Arc<AdaptiveAnalysisCache>>,
}

impl EngineBuilder {
    pub fn bounds(mut self, provider: Arc<dyn BoundsProvider>) -> Self {
        self.bounds = Some(provider);
        self
    }

    pub fn histograms(mut self, provider: Arc<dyn HistogramProvider>) -> Self {
        self.histograms = Some(provider);
        self
    }

    pub fn market_data(mut self, source: Arc<dyn MarketDataSource>) -> Self {
        self.market = Some(source);
        self
    }

    pub fn endpoint(mut self, endpoint: Arc<dyn EndpointProvider>) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    pub fn endpoints<I: IntoIterator<Item = Arc<dyn EndpointProvider>>>(mut self, endpoints: I) -> Self {
        self.endpoints.extend(endpoints);
        self
    }

    pub fn cache(mut self, cache: Arc<AdaptiveAnalysisCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Validate the configuration and assemble the engine.
    ///
    /// Bounds and histograms fall back to the ones in the configuration. When
    /// `cache_path` is set and no cache was supplied, a sled-backed cache is
    /// opened and warmed.
    pub fn build(self) -> Result<RiskScoringEngine> {
        let config = self.config;
        config.validate()?;

        let market = self
            .market
            .ok_or_else(|| Error::ConfigError("a market data source is required".to_string()))?;
        let bounds: Arc<dyn BoundsProvider> = match self.bounds {
            | Some(b) => b,
            | None => Arc::new(config.bounds_registry()?),
        };
        let histograms: Arc<dyn HistogramProvider> = match self.histograms {
            | Some(h) => h,
            | None => Arc::new(config.histogram_registry()),
        };
        let cache = match (self.cache, &config.cache_path) {
            | (Some(cache), _) => cache,
            | (None, Some(path)) => {
                let store = Arc::new(SledCacheStore::open(path)?);
                let cache = AdaptiveAnalysisCache::with_store(config.cache.clone(), store);
                cache.warm()?;
                Arc::new(cache)
            }
            | (None, None) => Arc::new(AdaptiveAnalysisCache::new(config.cache.clone())),
        };

        info!(
            "scoring engine ready: {} endpoint(s), cache capacity {}",
            self.endpoints.len(),
            config.cache.capacity
        );

        Ok(RiskScoringEngine {
            curve: RiskCurve::new(bounds),
            histograms,
            market,
            endpoints: self.endpoints,
            scorer: RiskBandScorer::new(config.risk.clone(), &config.rarity),
            rarity: config.rarity.clone(),
            calibration: EndpointCalibrationEngine::new(config.calibration.clone()),
            collector: SignalCollector::new(&config.collector),
            aggregator: ComponentAggregator::new(),
            cache,
        })
    }
}

impl RiskScoringEngine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder { config, bounds: None, histograms: None, market: None, endpoints: Vec::new(), cache: None }
    }

    pub fn cache(&self) -> &Arc<AdaptiveAnalysisCache> {
        &self.cache
    }

    pub fn curve(&self) -> &RiskCurve {
        &self.curve
    }

    /// Score `symbol` with default options.
    pub async fn score(&self, symbol: &str) -> Result<Advisory> {
        self.score_with(ScoreRequest::new(symbol)).await
    }

    pub async fn score_with(&self, request: ScoreRequest) -> Result<Advisory> {
        self.score_cancellable(request, CancellationToken::new()).await
    }

    /// Score a request, giving up with `Error::Cancelled` if `token` fires
    /// before the advisory is written to the cache.
    pub async fn score_cancellable(&self, request: ScoreRequest, token: CancellationToken) -> Result<Advisory> {
        let symbol = request.symbol.to_uppercase();
        if symbol.is_empty() {
            return Err(Error::InvalidArgument("empty symbol".to_string()));
        }

        if !request.refresh {
            if let Some(advisory) = self.cache.get_as::<Advisory>(&symbol, ADVISORY_CATEGORY) {
                debug!("serving cached advisory for {}", symbol);
                return Ok(advisory);
            }
        }

        let advisory = tokio::select! {
            biased;
            _ = token.cancelled() => {
                info!("scoring {} cancelled", symbol);
                return Err(Error::Cancelled);
            }
            result = self.compute(&symbol, &request) => result?,
        };

        if token.is_cancelled() {
            info!("scoring {} cancelled before cache write", symbol);
            return Err(Error::Cancelled);
        }
        self.cache.set(&symbol, ADVISORY_CATEGORY, &advisory, advisory.max_confidence());
        Ok(advisory)
    }

    async fn compute(&self, symbol: &str, request: &ScoreRequest) -> Result<Advisory> {
        let (risk, endpoints) = tokio::join!(self.risk_component(symbol, request), self.endpoint_component(symbol));

        let mut components = HashMap::new();
        let mut config_error = None;
        match risk {
            | Ok(score) => {
                components.insert(score.component_id.clone(), score);
            }
            | Err(e) => {
                warn!("risk_band component unavailable for {}: {}", symbol, e);
                if e.is_configuration() {
                    config_error = Some(e);
                }
            }
        }
        match endpoints {
            | Some(Ok(score)) => {
                components.insert(score.component_id.clone(), score);
            }
            | Some(Err(e)) => warn!("endpoint_calibration component unavailable for {}: {}", symbol, e),
            | None => debug!("no endpoints configured, skipping calibration for {}", symbol),
        }

        if components.is_empty() {
            if let Some(e) = config_error {
                return Err(e);
            }
        }
        let advisory = self.aggregator.aggregate(symbol, components)?;
        info!("scored {} with {} component(s)", advisory.symbol, advisory.len());
        Ok(advisory)
    }

    async fn risk_component(&self, symbol: &str, request: &ScoreRequest) -> Result<ComponentScore> {
        let bounds = self.curve.bounds(symbol)?;
        let snapshot = self.market.snapshot(symbol).await?;
        if !(snapshot.price.is_finite() && snapshot.price > 0.0) {
            return Err(Error::DataError(format!("unusable price {} for {}", snapshot.price, symbol)));
        }
        self.cache.observe_volatility(symbol, snapshot.volatility());

        let risk = risk_from_bounds(&bounds, snapshot.price);
        let histogram = self.histograms.get_histogram(symbol)?;
        let rarity = BandRarityCoefficient::from_histogram(&histogram, &self.rarity)?;
        let coefficient = match &request.transition {
            | Some(transition) => {
                let today = request.today.unwrap_or_else(|| Utc::now().date_naive());
                rarity.coefficient_stabilized(risk, transition, today)
            }
            | None => rarity.coefficient_at(risk),
        };
        debug!("{} at {} -> risk {:.4}, coefficient {:.4}", symbol, snapshot.price, risk.value(), coefficient);
        Ok(self.scorer.score(snapshot.price, risk, coefficient, &histogram))
    }

    async fn endpoint_component(&self, symbol: &str) -> Option<Result<ComponentScore>> {
        if self.endpoints.is_empty() {
            return None;
        }
        let signals = self.collector.collect(symbol, &self.endpoints).await;
        Some(self.calibration.calibrate(&signals))
    }
}
