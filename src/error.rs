//! Error types for the engine lifecycle and configuration loading.

use thiserror::Error;

/// Errors raised by an [`AudioEngine`](crate::engine::AudioEngine).
#[derive(Error, Debug)]
pub enum EngineError {
    /// The audio resource does not exist
    #[error("Audio resource not found: {0}")]
    ResourceNotFound(String),

    /// The resource exists but could not be decoded
    #[error("Failed to read audio resource {resource}: {reason}")]
    UnreadableResource { resource: String, reason: String },

    /// Operation needs a loaded resource
    #[error("Audio engine has no loaded resource")]
    NotLoaded,

    /// Pitch correction requested from an engine without a pitch shifter
    #[error("Audio engine has no pitch shift stage")]
    PitchShiftUnsupported,

    /// Sending to an external synthesis host failed
    #[error("Engine transport error: {0}")]
    Transport(String),

    /// The load did not resolve in time
    #[error("Audio engine load timed out after {0} ms")]
    LoadTimeout(u64),

    /// The load worker vanished before reporting
    #[error("Audio engine load worker exited without a result")]
    LoadAbandoned,
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised while reading or validating a [`Config`](crate::config::Config).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
