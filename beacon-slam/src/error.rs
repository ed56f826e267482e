//! Error types for beacon-slam

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, LocalizeError>;

/// Localization error types.
///
/// Every variant is recoverable at the engine boundary.
#[derive(Error, Debug)]
pub enum LocalizeError {
    /// Malformed or out-of-range observation. Particle state is unchanged.
    #[error("Invalid measurement: {reason}")]
    InvalidMeasurement {
        /// Why the measurement was rejected
        reason: String,
    },

    /// Total weight of a particle set became zero or non-finite.
    /// The affected set has been reset to uniform weights.
    #[error("Filter degenerate: {set} weights collapsed (total {total})")]
    FilterDegenerate {
        /// Which particle set collapsed ("tag" or a beacon identifier)
        set: String,
        /// Offending total weight
        total: f64,
    },

    /// Query for a beacon identifier that was never observed.
    #[error("Unknown beacon: {0}")]
    UnknownBeacon(String),

    /// Frame query before the first tracking sample.
    #[error("Frame reconciler has no tracking sample yet")]
    ReconcilerUninitialized,

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Measurement log could not be read or written.
    #[error("CSV error: {0}")]
    Csv(String),
}

impl LocalizeError {
    /// Shorthand for [`LocalizeError::InvalidMeasurement`].
    pub fn invalid(reason: impl Into<String>) -> Self {
        LocalizeError::InvalidMeasurement {
            reason: reason.into(),
        }
    }
}

impl From<toml::de::Error> for LocalizeError {
    fn from(e: toml::de::Error) -> Self {
        LocalizeError::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for LocalizeError {
    fn from(e: toml::ser::Error) -> Self {
        LocalizeError::Config(e.to_string())
    }
}

impl From<csv::Error> for LocalizeError {
    fn from(e: csv::Error) -> Self {
        LocalizeError::Csv(e.to_string())
    }
}
