//! Shared domain types, error taxonomy, event bus, and KV store abstraction
//! for the mediation layer. Every other crate in this workspace depends on
//! `mediation-core` and nothing else in the workspace.

pub mod adapter;
pub mod cooldown;
pub mod domain;
pub mod error;
pub mod events;
pub mod kv;

#[cfg(feature = "redis-backend")]
pub mod redis_store;

pub use adapter::{UpstreamAdapter, UpstreamDispatchError, UpstreamResponse, UpstreamStatus};
pub use cooldown::{CooldownConfig, CooldownController};
pub use domain::{Cost, Deadline, DispatchOutcome, Fingerprint, Operation, Priority, Provider, Tier, UserId};
pub use error::{MediationError, StoreError};
pub use events::{BoxedEventListener, EventListener, EventListeners, FnListener, MediationEvent};
pub use kv::{IncrementOutcome, InMemoryStore, KvStore};

#[cfg(feature = "redis-backend")]
pub use redis_store::RedisStore;
