//! Layered configuration document for the mediation layer (spec §4.10,
//! component C10).
//!
//! Every nested table uses `#[serde(deny_unknown_fields)]` so a typo in an
//! operator's TOML file fails at load time instead of being silently
//! ignored, matching spec.md §4.10's "unknown keys are rejected at load
//! time". Per-section builders mirror the teacher's `*Config`/`*ConfigBuilder`
//! pairs (`RateLimiterConfigBuilder`, `CircuitBreakerConfigBuilder`) even
//! though most operators will simply deserialize a TOML document rather than
//! build one in code.

mod document;
mod error;
mod sections;

pub use document::MediationConfig;
pub use error::ConfigError;
pub use sections::{
    AlertThresholds, AlertsConfig, CacheTtlConfig, CacheTtlEntry, FailurePolicy, LeaseExpiryPolicy,
    PerProviderCaps, PrefetchConfig, ProviderConfig, ProviderOperationCosts, ProviderRateLimit,
    ProvidersConfig, QueueConfig, RateLimitsConfig, SingleFlightConfig, StoreConfig, TiersConfig,
};
