//! Metrics collection and alert evaluation (spec §4.9, component C9).
//!
//! `mediation-metrics` never calls into C2–C8 directly — it is a pub/sub
//! *consumer* of the event bus each of those crates already exposes
//! (`mediation_core::EventListeners<_>`), per the REDESIGN FLAGS note that
//! the cyclic reference between middleware, limiter, and monitor is broken
//! by making the monitor a listener rather than a callee. [`MetricsCollector`]
//! implements [`mediation_core::EventListener`] for every event type in the
//! workspace and keeps the running aggregates the threshold [`AlertEvaluator`]
//! needs; it also unconditionally forwards to the `metrics` crate (this
//! crate's entire purpose is metrics, so unlike the leaf crates there is no
//! `metrics` cargo feature gating it).

mod aggregate;
mod alerts;
mod collector;

pub use aggregate::MetricsSnapshot;
pub use alerts::{AlertEvaluator, AlertEvent, AlertSeverity};
pub use collector::MetricsCollector;
