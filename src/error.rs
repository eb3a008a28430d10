//! Error types for Ratekeeper.

use thiserror::Error;

/// Main error type for Ratekeeper operations.
///
/// Steady-state admission never produces an error: rejections are reported
/// as [`RateLimitDecision::Rejected`](crate::ratelimit::RateLimitDecision)
/// values. Everything here surfaces at construction or startup time.
#[derive(Error, Debug)]
pub enum RatekeeperError {
    /// A rate or other value was constructed with an invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Command line options could not be parsed or validated
    #[error("Error in command line options: {0}")]
    InvalidCommandLine(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The cleanup scheduler could not be started
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Ratekeeper operations.
pub type Result<T> = std::result::Result<T, RatekeeperError>;
