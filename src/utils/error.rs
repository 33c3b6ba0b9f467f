//! Error handling for the scoring engine.

use thiserror::Error;

/// Main error type for the scoring engine
#[derive(Debug, Error)]
pub enum Error {
    /// No price bounds are configured for the symbol
    #[error("Missing bounds for symbol: {0}")]
    MissingBounds(String),

    /// Configured bounds are unusable (min >= max, non-positive or non-finite)
    #[error("Invalid bounds for {symbol}: min_price={min_price}, max_price={max_price}")]
    InvalidBounds {
        symbol: String,
        min_price: f64,
        max_price: f64,
    },

    /// Not enough data to compute a score (empty histogram, all endpoints failed, ...)
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// An endpoint did not answer within its timeout
    #[error("Endpoint {endpoint} timed out after {after_ms} ms")]
    EndpointTimeout { endpoint: String, after_ms: u64 },

    /// An endpoint answered with an error
    #[error("Endpoint {endpoint} failed: {reason}")]
    EndpointFailure { endpoint: String, reason: String },

    /// A numeric value fell outside its allowed range
    #[error("{name} out of range: {value}")]
    OutOfRange { name: &'static str, value: f64 },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Market data errors
    #[error("Data error: {0}")]
    DataError(String),

    /// Cache storage errors
    #[error("Cache error: {0}")]
    CacheError(String),

    /// The scoring request was cancelled before completion
    #[error("Scoring request cancelled")]
    Cancelled,

    /// I/O errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    /// Invalid argument errors
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Whether the error points at a setup problem rather than a transient condition.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::MissingBounds(_) | Error::InvalidBounds { .. } | Error::ConfigError(_)
        )
    }
}

impl From<sled::Error> for Error {
    fn from(err: sled::Error) -> Self {
        Error::CacheError(err.to_string())
    }
}

/// Result type for the scoring engine
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::MissingBounds("BTC".to_string());
        assert_eq!(err.to_string(), "Missing bounds for symbol: BTC");

        let err = Error::InvalidBounds { symbol: "ETH".into(), min_price: 10.0, max_price: 5.0 };
        assert!(err.to_string().contains("min_price=10"));

        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let wrapped_io_error = Error::from(io_error);
        assert!(wrapped_io_error.to_string().contains("I/O error"));
    }

    #[test]
    fn test_configuration_classification() {
        assert!(Error::MissingBounds("SOL".into()).is_configuration());
        assert!(!Error::InsufficientData("empty".into()).is_configuration());
        assert!(!Error::Cancelled.is_configuration());
    }
}
