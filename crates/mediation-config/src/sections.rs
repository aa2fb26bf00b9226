//! Leaf sections of the configuration document. Each mirrors one bullet of
//! spec.md §4.10; providers are modeled as named struct fields (`video`,
//! `music`, `chat`, `gaming`) rather than a `HashMap<Provider, _>` so TOML's
//! string-keyed tables round-trip through `serde` without a custom
//! `Deserialize` for the `Provider` enum as a map key.

use std::collections::HashMap;
use std::time::Duration;

use mediation_core::Provider;
use serde::{Deserialize, Serialize};

/// Daily cost budget per provider for one tier.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PerProviderCaps {
    #[serde(default)]
    pub video: u32,
    #[serde(default)]
    pub music: u32,
    #[serde(default)]
    pub chat: u32,
    #[serde(default)]
    pub gaming: u32,
}

impl PerProviderCaps {
    pub fn get(&self, provider: Provider) -> u32 {
        match provider {
            Provider::Video => self.video,
            Provider::Music => self.music,
            Provider::Chat => self.chat,
            Provider::Gaming => self.gaming,
        }
    }
}

/// `tiers.{free|premium|enterprise}.{provider}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TiersConfig {
    #[serde(default)]
    pub free: PerProviderCaps,
    #[serde(default)]
    pub premium: PerProviderCaps,
    #[serde(default)]
    pub enterprise: PerProviderCaps,
}

/// `operation_costs.{provider}.{operation}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderOperationCosts {
    #[serde(default)]
    pub video: HashMap<String, u32>,
    #[serde(default)]
    pub music: HashMap<String, u32>,
    #[serde(default)]
    pub chat: HashMap<String, u32>,
    #[serde(default)]
    pub gaming: HashMap<String, u32>,
}

impl ProviderOperationCosts {
    pub fn get(&self, provider: Provider, operation: &str) -> Option<u32> {
        let table = match provider {
            Provider::Video => &self.video,
            Provider::Music => &self.music,
            Provider::Chat => &self.chat,
            Provider::Gaming => &self.gaming,
        };
        table.get(operation).copied()
    }
}

/// `cache_ttl.{provider}.{operation}` — positive and negative TTL in seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheTtlEntry {
    pub positive_seconds: u64,
    pub negative_seconds: u64,
}

impl CacheTtlEntry {
    pub fn positive(&self) -> Duration {
        Duration::from_secs(self.positive_seconds)
    }

    pub fn negative(&self) -> Duration {
        Duration::from_secs(self.negative_seconds)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheTtlConfig {
    #[serde(default)]
    pub video: HashMap<String, CacheTtlEntry>,
    #[serde(default)]
    pub music: HashMap<String, CacheTtlEntry>,
    #[serde(default)]
    pub chat: HashMap<String, CacheTtlEntry>,
    #[serde(default)]
    pub gaming: HashMap<String, CacheTtlEntry>,
}

impl CacheTtlConfig {
    pub fn get(&self, provider: Provider, operation: &str) -> Option<CacheTtlEntry> {
        let table = match provider {
            Provider::Video => &self.video,
            Provider::Music => &self.music,
            Provider::Chat => &self.chat,
            Provider::Gaming => &self.gaming,
        };
        table.get(operation).copied()
    }
}

/// `rate_limits.{provider}` — requests-per-window and window seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderRateLimit {
    pub requests_per_window: usize,
    pub window_seconds: u64,
}

impl ProviderRateLimit {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

impl Default for ProviderRateLimit {
    fn default() -> Self {
        Self {
            requests_per_window: 60,
            window_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitsConfig {
    #[serde(default)]
    pub video: ProviderRateLimit,
    #[serde(default)]
    pub music: ProviderRateLimit,
    #[serde(default)]
    pub chat: ProviderRateLimit,
    #[serde(default)]
    pub gaming: ProviderRateLimit,
    /// Whether a cache hit still consumes a rate-limit admission slot.
    /// Spec §9 Open Questions: default bypass (`false`).
    #[serde(default)]
    pub count_cache_hits: bool,
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            video: ProviderRateLimit::default(),
            music: ProviderRateLimit::default(),
            chat: ProviderRateLimit::default(),
            gaming: ProviderRateLimit::default(),
            count_cache_hits: false,
        }
    }
}

impl RateLimitsConfig {
    pub fn get(&self, provider: Provider) -> ProviderRateLimit {
        match provider {
            Provider::Video => self.video,
            Provider::Music => self.music,
            Provider::Chat => self.chat,
            Provider::Gaming => self.gaming,
        }
    }
}

/// `queue.*`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    pub max_depth_per_user: usize,
    pub default_deadline_seconds: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_depth_per_user: 50,
            default_deadline_seconds: 30,
        }
    }
}

/// `singleflight.*`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SingleFlightConfig {
    pub lease_ttl_seconds: u64,
    pub poll_slack_seconds: u64,
    /// Race policy when a lease expires mid-wait. Spec §9: default `Proceed`.
    #[serde(default)]
    pub on_lease_expiry: LeaseExpiryPolicy,
}

impl Default for SingleFlightConfig {
    fn default() -> Self {
        Self {
            lease_ttl_seconds: 10,
            poll_slack_seconds: 2,
            on_lease_expiry: LeaseExpiryPolicy::Proceed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseExpiryPolicy {
    #[default]
    Proceed,
    Contention,
}

/// `prefetch.*`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrefetchConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
    pub lease_ttl_seconds: u64,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 60,
            lease_ttl_seconds: 120,
        }
    }
}

/// `alerts.thresholds.{warning|critical}` — fractions in `[0, 1]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlertThresholds {
    pub warning: f64,
    pub critical: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            warning: 0.8,
            critical: 0.95,
        }
    }
}

/// `alerts.*`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlertsConfig {
    #[serde(default)]
    pub thresholds: AlertThresholds,
    pub queue_depth_high: usize,
    pub cache_hit_rate_low: f64,
    pub api_error_rate_high: f64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            thresholds: AlertThresholds::default(),
            queue_depth_high: 100,
            cache_hit_rate_low: 0.3,
            api_error_rate_high: 0.1,
        }
    }
}

/// `store.*`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    pub connection: String,
    pub health_check_interval_seconds: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            connection: "memory://local".to_string(),
            health_check_interval_seconds: 30,
        }
    }
}

/// Fail-open vs. fail-closed behavior when the KV store is unavailable
/// (spec §7). Billing-sensitive providers should stay `Closed` (the default).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    #[default]
    Closed,
    Open,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    #[serde(default)]
    pub on_store_unavailable: FailurePolicy,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            on_store_unavailable: FailurePolicy::Closed,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub video: ProviderConfig,
    #[serde(default)]
    pub music: ProviderConfig,
    #[serde(default)]
    pub chat: ProviderConfig,
    #[serde(default)]
    pub gaming: ProviderConfig,
}

impl ProvidersConfig {
    pub fn get(&self, provider: Provider) -> ProviderConfig {
        match provider {
            Provider::Video => self.video,
            Provider::Music => self.music,
            Provider::Chat => self.chat,
            Provider::Gaming => self.gaming,
        }
    }
}
