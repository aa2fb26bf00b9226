//! The rate-limit coordinator (spec §4.5, component C5): the admission
//! authority that composes the response cache, sliding-window limiter, quota
//! ledger, and request queue into one `admit`/`complete` decision surface.

mod coordinator;
mod decision;
mod error;
mod events;

pub use coordinator::RateLimitCoordinator;
pub use decision::{AdmitRequest, CompletionOutcome, Decision, RejectReason, UpstreamLease};
pub use error::CoordinatorError;
pub use events::CoordinatorEvent;
