//! Background recommendation-cache prefetch warming (spec §4.7, component
//! C7), guarded by a distributed lease distinct from the single-flight lease
//! `mediation-cache` uses for foreground cache misses.

mod error;
mod events;
mod lease;
mod orchestrator;
mod target;

pub use error::PrefetchError;
pub use events::PrefetchEvent;
pub use lease::PrefetchLease;
pub use orchestrator::PrefetchOrchestrator;
pub use target::{PrefetchTarget, TargetRegistry};
