//! Day-bucketed quota ledger (spec §4.3, component C3).
//!
//! Charges go through [`mediation_core::KvStore::increment_by`] as a single
//! composed-atomicity operation, the same idiom `mediation-ratelimit` uses
//! for admits, applied here to a UTC-day-bucketed counter instead of a
//! sliding log.

mod error;
mod events;
mod ledger;

pub use error::QuotaError;
pub use events::QuotaEvent;
pub use ledger::{ChargeOutcome, QuotaLedger};
