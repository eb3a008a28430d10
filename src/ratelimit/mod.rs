//! Rate limiting logic and state management.

mod backend;
pub mod builders;
mod clock;
mod keyed;
mod rate;
mod sliding_log;

pub use backend::{RateLimitDecision, RateLimiter};
pub use clock::{Clock, ManualClock, SystemClock};
pub use keyed::{KeyedRateLimiter, DEFAULT_SWEEP_INTERVAL};
pub use rate::Rate;
pub use sliding_log::SlidingLogRateLimiter;
