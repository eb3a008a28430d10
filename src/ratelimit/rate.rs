//! Rate definition: how many requests fit in a time window.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{RatekeeperError, Result};

/// Maximum number of requests admitted within a sliding window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawRate", into = "RawRate")]
pub struct Rate {
    requests: u64,
    window: Duration,
}

impl Rate {
    /// Create a new rate.
    ///
    /// Fails with [`RatekeeperError::InvalidArgument`] when `window` is zero.
    pub fn new(requests: u64, window: Duration) -> Result<Self> {
        if window.is_zero() {
            return Err(RatekeeperError::InvalidArgument(
                "Time duration should be positive".to_string(),
            ));
        }
        Ok(Self { requests, window })
    }

    /// Create a rate from signed values, as they arrive from text input.
    pub fn per_millis(requests: i64, window_ms: i64) -> Result<Self> {
        if requests < 0 {
            return Err(RatekeeperError::InvalidArgument(format!(
                "Requests should not be negative, got {}",
                requests
            )));
        }
        if window_ms <= 0 {
            return Err(RatekeeperError::InvalidArgument(format!(
                "Time duration should be positive, got {}ms",
                window_ms
            )));
        }
        Self::new(requests as u64, Duration::from_millis(window_ms as u64))
    }

    /// Maximum requests admitted per window.
    pub fn requests(&self) -> u64 {
        self.requests
    }

    /// Length of the sliding window.
    pub fn window(&self) -> Duration {
        self.window
    }
}

impl std::fmt::Display for Rate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} requests per {:?}", self.requests, self.window)
    }
}

/// Wire form used by configuration files.
#[derive(Serialize, Deserialize)]
struct RawRate {
    requests: u64,
    window_ms: u64,
}

impl TryFrom<RawRate> for Rate {
    type Error = RatekeeperError;

    fn try_from(raw: RawRate) -> Result<Self> {
        Rate::new(raw.requests, Duration::from_millis(raw.window_ms))
    }
}

impl From<Rate> for RawRate {
    fn from(rate: Rate) -> Self {
        RawRate {
            requests: rate.requests,
            window_ms: rate.window.as_millis() as u64,
        }
    }
}
