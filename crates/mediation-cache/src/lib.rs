//! Content-keyed response cache with negative caching and per-fingerprint
//! single-flight deduplication (spec §4.4, component C4).

mod cache;
mod error;
mod events;
mod single_flight;

pub use cache::{CacheLookup, ResponseCache};
pub use error::CacheError;
pub use events::CacheEvent;
pub use single_flight::SingleFlight;
