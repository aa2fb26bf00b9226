//! Distributed sliding-window admission counter (spec §4.2, component C2).
//!
//! Generalizes `tower_resilience_ratelimiter`'s permit-refill state machines
//! from a single process-local limiter into one keyed by `(Provider, UserId)`
//! and backed by [`mediation_core::KvStore`], so the admit decision is shared
//! across every worker process fronting a provider rather than scoped to one.

mod config;
mod error;
mod events;
mod limiter;

pub use config::{RateLimiterConfig, RateLimiterConfigBuilder, WindowType};
pub use error::RateLimitError;
pub use events::RateLimitEvent;
pub use limiter::{AdmitOutcome, SlidingWindowLimiter};
