//! Bounded per-user priority request queue (spec §4.6, component C6).
//!
//! Entries are ordered `(priority desc, enqueued_at asc)` and persisted in
//! the shared store so the queue survives a process restart; a round-robin
//! scheduler drains each user's head item through a caller-supplied
//! [`DrainHandler`], keeping this crate free of a dependency on
//! `mediation-coordinator` (spec §9 REDESIGN FLAGS, breaking cyclic
//! references).

mod error;
mod events;
mod queue;
mod request;
mod scheduler;

pub use error::QueueError;
pub use events::QueueEvent;
pub use queue::{EnqueueOutcome, RequestQueue};
pub use request::{DrainHandler, DrainOutcome, QueuedRequest};
pub use scheduler::QueueScheduler;
