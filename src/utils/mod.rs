//! Utility functions and types for the scoring engine.

pub mod error;
mod logging;
pub mod types;

pub use error::{Error, Result};
pub use logging::{init_logging, init_test_logging};
pub use types::*;

/// Re-export of commonly used types
pub mod prelude {
    pub use super::{
        error::{Error, Result},
        logging::init_logging,
        types::*,
    };
}
