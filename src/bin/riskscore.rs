//! Command-line front end for the risk scoring engine.
//! Works fully offline: market data and endpoint answers come from arguments or JSON files.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use riskscore::config::EngineConfig;
use riskscore::fusion::{FusionPolicy, MajorityVote, MaxConfidence, WeightedMean};
use riskscore::market_data::StaticMarketData;
use riskscore::risk::{BandRarityCoefficient, HistogramProvider};
use riskscore::signal::{EndpointCalibrationEngine, EndpointProvider, EndpointSignal, StaticEndpoint};
use riskscore::utils::init_logging;
use riskscore::utils::types::Risk;
use riskscore::RiskScoringEngine;

#[derive(Debug, Parser)]
#[command(name = "riskscore", author, version, about = "Calibrated risk scoring CLI", long_about = None)]
struct Args {
    /// Path to the configuration file (TOML)
    #[arg(short, long, env = "RISKSCORE_CONFIG", default_value = "riskscore.toml")]
    config: PathBuf,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Policy {
    Weighted,
    Majority,
    MaxConfidence,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Risk of a price on the symbol's curve
    Risk {
        symbol: String,
        price: f64,
    },
    /// Band boundary prices and rarity coefficients for a symbol
    Bands {
        symbol: String,
    },
    /// Calibrate a JSON array of endpoint signals
    Calibrate {
        #[arg(long, value_name = "JSON")]
        signals: PathBuf,
    },
    /// Score a symbol end to end
    Score {
        symbol: String,
        /// Current price
        #[arg(long)]
        price: f64,
        /// Signed 24h change in percent
        #[arg(long, default_value_t = 0.0)]
        change: f64,
        /// JSON array of static endpoint definitions
        #[arg(long, value_name = "JSON")]
        endpoints: Option<PathBuf>,
        /// Also print a fused score using this policy
        #[arg(long, value_enum)]
        fuse: Option<Policy>,
    },
    /// Print the default configuration and exit
    PrintDefaultConfig,
}

fn load_config(path: &Path) -> Result<EngineConfig> {
    if path.exists() {
        EngineConfig::from_file(path).with_context(|| format!("loading {}", path.display()))
    } else {
        Ok(EngineConfig::default())
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Command::PrintDefaultConfig = args.command {
        println!("{}", EngineConfig::default_toml()?);
        return Ok(());
    }

    let config = load_config(&args.config)?;
    init_logging(
        args.log_level.as_deref().unwrap_or(&config.log_level),
        config.cache_log_level.as_deref(),
    );

    match args.command {
        | Command::Risk { symbol, price } => {
            if !(price.is_finite() && price > 0.0) {
                bail!("price must be positive, got {price}");
            }
            let curve = riskscore::RiskCurve::new(Arc::new(config.bounds_registry()?));
            let risk = curve.risk_of(&symbol, price)?;
            println!("{} @ {} -> risk {:.4}", symbol.to_uppercase(), price, risk.value());
        }
        | Command::Bands { symbol } => {
            let curve = riskscore::RiskCurve::new(Arc::new(config.bounds_registry()?));
            let table = curve.band_price_table(&symbol)?;
            let rarity = config
                .histogram_registry()
                .get_histogram(&symbol)
                .and_then(|h| BandRarityCoefficient::from_histogram(&h, &config.rarity))
                .ok();
            for (i, pair) in table.windows(2).enumerate() {
                let (lo, lo_price) = pair[0];
                let (hi, hi_price) = pair[1];
                match &rarity {
                    | Some(r) => println!(
                        "[{:.1}, {:.1})  {:>14.2} .. {:<14.2} {:>6.2}%  coef {:.4}",
                        lo.value(),
                        hi.value(),
                        lo_price,
                        hi_price,
                        r.band_percentages()[i] * 100.0,
                        r.band_coefficient(i)
                    ),
                    | None => println!(
                        "[{:.1}, {:.1})  {:>14.2} .. {:<14.2}",
                        lo.value(),
                        hi.value(),
                        lo_price,
                        hi_price
                    ),
                }
            }
            if let Some(r) = &rarity {
                let mid = Risk::clamped(0.5);
                println!("coefficient at risk 0.5: {:.4}", r.coefficient_at(mid));
            }
        }
        | Command::Calibrate { signals } => {
            let signals: Vec<EndpointSignal> = read_json(&signals)?;
            let engine = EndpointCalibrationEngine::new(config.calibration.clone());
            let component = engine.calibrate(&signals)?;
            println!("{}", serde_json::to_string_pretty(&component)?);
        }
        | Command::Score { symbol, price, change, endpoints, fuse } => {
            let endpoints: Vec<StaticEndpoint> = match endpoints {
                | Some(path) => read_json(&path)?,
                | None => Vec::new(),
            };
            let engine = RiskScoringEngine::builder(config)
                .market_data(Arc::new(StaticMarketData::new().with(&symbol, price, change)))
                .endpoints(endpoints.into_iter().map(|e| Arc::new(e) as Arc<dyn EndpointProvider>))
                .build()?;
            let advisory = engine.score(&symbol).await?;
            println!("{}", serde_json::to_string_pretty(&advisory.to_payload())?);

            if let Some(policy) = fuse {
                let policy: Box<dyn FusionPolicy> = match policy {
                    | Policy::Weighted => Box::new(WeightedMean::default()),
                    | Policy::Majority => Box::new(MajorityVote),
                    | Policy::MaxConfidence => Box::new(MaxConfidence),
                };
                if let Some(fused) = advisory.fuse(policy.as_ref()) {
                    println!(
                        "{}: {:.2} {} (confidence {:.3})",
                        policy.name(),
                        fused.score.value(),
                        fused.direction,
                        fused.confidence.value()
                    );
                }
            }
        }
        | Command::PrintDefaultConfig => {}
    }
    Ok(())
}
