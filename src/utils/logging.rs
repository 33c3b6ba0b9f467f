//! Log setup for the CLI and tests.
//!
//! The configured level applies to the whole process. `sled` is held at warn,
//! and the cache may be given its own level since it logs every read and write.
//! `RISKSCORE_LOG` directives are applied last and win.

use chrono::Utc;
use env_logger::{Builder, Env, Target};
use log::{info, LevelFilter};
use std::io::Write;

const CACHE_TARGET: &str = "riskscore::cache";

/// Parse a level name, falling back to info on anything unrecognized.
pub(crate) fn parse_level(level: &str) -> LevelFilter {
    level.trim().parse().unwrap_or(LevelFilter::Info)
}

/// Filter directives for `level` with an optional cache override.
pub(crate) fn filter_spec(level: &str, cache_level: Option<&str>) -> String {
    let mut spec = format!("{},sled=warn", parse_level(level));
    if let Some(cache) = cache_level {
        spec.push_str(&format!(",{}={}", CACHE_TARGET, parse_level(cache)));
    }
    spec.to_lowercase()
}

/// Install the process logger. Later calls are ignored.
pub fn init_logging(level: &str, cache_level: Option<&str>) {
    let spec = filter_spec(level, cache_level);
    let installed = Builder::new()
        .parse_filters(&spec)
        .parse_env(Env::new().filter("RISKSCORE_LOG").write_style("RISKSCORE_LOG_STYLE"))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {:<5} {}: {}",
                Utc::now().format("%H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(Target::Stderr)
        .try_init()
        .is_ok();

    if installed {
        info!("logging with filters {}", spec);
    }
}

/// Capture debug output in tests.
pub fn init_test_logging() {
    let _ = Builder::new().is_test(true).filter_level(LevelFilter::Debug).try_init();
}
