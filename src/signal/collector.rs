//! Concurrent endpoint collection.
//!
//! All providers are queried at once (bounded by `max_concurrency`), each
//! under its own timeout. A slow or failing endpoint becomes a failed
//! [`EndpointSignal`]; collection itself never fails. Dropping the returned
//! future abandons whatever queries are still in flight.

use futures::stream::{self, StreamExt};
use log::{debug, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{EndpointProvider, EndpointSignal};
use crate::config::CollectorConfig;
use crate::utils::error::Error;

#[derive(Debug, Clone)]
pub struct SignalCollector {
    max_concurrency: usize,
    timeout: Duration,
}

impl SignalCollector {
    pub fn new(config: &CollectorConfig) -> Self {
        Self {
            max_concurrency: config.max_concurrency.max(1),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Query every provider for `symbol`. Output follows provider order.
    pub async fn collect(&self, symbol: &str, providers: &[Arc<dyn EndpointProvider>]) -> Vec<EndpointSignal> {
        let timeout = self.timeout;
        let tasks = providers.iter().cloned().enumerate().map(|(idx, provider)| {
            let symbol = symbol.to_string();
            async move {
                let started = Instant::now();
                let signal = match tokio::time::timeout(timeout, provider.query(&symbol)).await {
                    | Ok(Ok(reading)) => {
                        debug!(
                            "endpoint {} answered for {} in {:?}",
                            provider.id(),
                            symbol,
                            started.elapsed()
                        );
                        EndpointSignal::succeeded(provider.id(), provider.weight(), reading)
                    }
                    | Ok(Err(e)) => {
                        let err = match e {
                            | Error::EndpointFailure { .. } | Error::EndpointTimeout { .. } => e,
                            | other => Error::EndpointFailure {
                                endpoint: provider.id().to_string(),
                                reason: other.to_string(),
                            },
                        };
                        warn!("{} ({})", err, symbol);
                        EndpointSignal::failed(provider.id(), provider.weight(), err.to_string())
                    }
                    | Err(_) => {
                        let err = Error::EndpointTimeout {
                            endpoint: provider.id().to_string(),
                            after_ms: timeout.as_millis() as u64,
                        };
                        warn!("{} ({})", err, symbol);
                        EndpointSignal::failed(provider.id(), provider.weight(), err.to_string())
                    }
                };
                (idx, signal)
            }
        });

        let mut results: Vec<(usize, EndpointSignal)> =
            stream::iter(tasks).buffer_unordered(self.max_concurrency).collect().await;
        results.sort_by_key(|(idx, _)| *idx);

        let ok = results.iter().filter(|(_, s)| s.success).count();
        debug!("collected {}/{} endpoint signals for {}", ok, results.len(), symbol);
        results.into_iter().map(|(_, s)| s).collect()
    }
}
