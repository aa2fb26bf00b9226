//! The top-level configuration document (spec §4.10) plus environment-name
//! resolution (`MEDIATION_ENV`, with a builder override) and the `validate()`
//! pass every teacher `*ConfigBuilder::build()` performs before handing back
//! a usable value.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use mediation_core::{Operation, Provider, Tier};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::sections::{
    AlertsConfig, CacheTtlConfig, CacheTtlEntry, PrefetchConfig, ProviderOperationCosts,
    ProviderRateLimit, ProvidersConfig, QueueConfig, RateLimitsConfig, SingleFlightConfig,
    StoreConfig, TiersConfig,
};

/// A partial overlay applied on top of the base document for one environment
/// name. Each present field *replaces* the corresponding base section
/// wholesale rather than deep-merging individual leaves — a deliberate
/// simplification (see `DESIGN.md`'s Open Question decisions) that keeps an
/// environment's overrides visible as one self-contained block in the TOML
/// file instead of scattered partial overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentOverlay {
    pub tiers: Option<TiersConfig>,
    pub operation_costs: Option<ProviderOperationCosts>,
    pub cache_ttl: Option<CacheTtlConfig>,
    pub rate_limits: Option<RateLimitsConfig>,
    pub queue: Option<QueueConfig>,
    pub singleflight: Option<SingleFlightConfig>,
    pub prefetch: Option<PrefetchConfig>,
    pub alerts: Option<AlertsConfig>,
    pub store: Option<StoreConfig>,
    pub providers: Option<ProvidersConfig>,
}

/// The full layered configuration document (spec §4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MediationConfig {
    #[serde(default)]
    pub tiers: TiersConfig,
    #[serde(default)]
    pub operation_costs: ProviderOperationCosts,
    #[serde(default)]
    pub cache_ttl: CacheTtlConfig,
    #[serde(default)]
    pub rate_limits: RateLimitsConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub singleflight: SingleFlightConfig,
    #[serde(default)]
    pub prefetch: PrefetchConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub environments: HashMap<String, EnvironmentOverlay>,
}

impl Default for MediationConfig {
    fn default() -> Self {
        Self {
            tiers: TiersConfig::default(),
            operation_costs: ProviderOperationCosts::default(),
            cache_ttl: CacheTtlConfig::default(),
            rate_limits: RateLimitsConfig::default(),
            queue: QueueConfig::default(),
            singleflight: SingleFlightConfig::default(),
            prefetch: PrefetchConfig::default(),
            alerts: AlertsConfig::default(),
            store: StoreConfig::default(),
            providers: ProvidersConfig::default(),
            environments: HashMap::new(),
        }
    }
}

impl MediationConfig {
    /// Parses a TOML document and applies the named environment overlay, if
    /// any. `env_name = None` resolves to the base document only.
    pub fn from_toml_str(raw: &str, env_name: Option<&str>) -> Result<Self, ConfigError> {
        let mut config: MediationConfig = toml::from_str(raw)?;
        if let Some(name) = env_name {
            let overlay = config
                .environments
                .remove(name)
                .ok_or_else(|| ConfigError::UnknownEnvironment(name.to_string()))?;
            config.apply_overlay(overlay);
        }
        config.validate()?;
        Ok(config)
    }

    /// Resolves the environment name from an explicit override, falling back
    /// to the `MEDIATION_ENV` process environment variable, then loads.
    pub fn load(raw: &str, env_override: Option<&str>) -> Result<Self, ConfigError> {
        let resolved = env_override
            .map(str::to_string)
            .or_else(|| env::var("MEDIATION_ENV").ok());
        Self::from_toml_str(raw, resolved.as_deref())
    }

    fn apply_overlay(&mut self, overlay: EnvironmentOverlay) {
        if let Some(v) = overlay.tiers {
            self.tiers = v;
        }
        if let Some(v) = overlay.operation_costs {
            self.operation_costs = v;
        }
        if let Some(v) = overlay.cache_ttl {
            self.cache_ttl = v;
        }
        if let Some(v) = overlay.rate_limits {
            self.rate_limits = v;
        }
        if let Some(v) = overlay.queue {
            self.queue = v;
        }
        if let Some(v) = overlay.singleflight {
            self.singleflight = v;
        }
        if let Some(v) = overlay.prefetch {
            self.prefetch = v;
        }
        if let Some(v) = overlay.alerts {
            self.alerts = v;
        }
        if let Some(v) = overlay.store {
            self.store = v;
        }
        if let Some(v) = overlay.providers {
            self.providers = v;
        }
    }

    /// Asserts non-negativity and reasonable upper bounds (spec §4.10),
    /// returning `ConfigError::Invalid` rather than panicking.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.max_depth_per_user == 0 {
            return Err(ConfigError::Invalid("queue.max_depth_per_user must be positive".into()));
        }
        if self.queue.max_depth_per_user > 100_000 {
            return Err(ConfigError::Invalid("queue.max_depth_per_user is unreasonably large".into()));
        }
        if self.singleflight.lease_ttl_seconds == 0 {
            return Err(ConfigError::Invalid("singleflight.lease_ttl_seconds must be positive".into()));
        }
        if self.prefetch.interval_seconds == 0 {
            return Err(ConfigError::Invalid("prefetch.interval_seconds must be positive".into()));
        }
        for (name, threshold) in [
            ("alerts.thresholds.warning", self.alerts.thresholds.warning),
            ("alerts.thresholds.critical", self.alerts.thresholds.critical),
            ("alerts.cache_hit_rate_low", self.alerts.cache_hit_rate_low),
            ("alerts.api_error_rate_high", self.alerts.api_error_rate_high),
        ] {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(ConfigError::Invalid(format!("{name} must be within [0, 1], got {threshold}")));
            }
        }
        if self.alerts.thresholds.warning > self.alerts.thresholds.critical {
            return Err(ConfigError::Invalid(
                "alerts.thresholds.warning must not exceed alerts.thresholds.critical".into(),
            ));
        }
        for provider in Provider::ALL {
            let rl = self.rate_limits.get(provider);
            if rl.requests_per_window == 0 {
                return Err(ConfigError::Invalid(format!("rate_limits.{provider}.requests_per_window must be positive")));
            }
            if rl.window_seconds == 0 {
                return Err(ConfigError::Invalid(format!("rate_limits.{provider}.window_seconds must be positive")));
            }
        }
        for (provider, table) in [
            (Provider::Video, &self.cache_ttl.video),
            (Provider::Music, &self.cache_ttl.music),
            (Provider::Chat, &self.cache_ttl.chat),
            (Provider::Gaming, &self.cache_ttl.gaming),
        ] {
            for (operation, entry) in table {
                if entry.negative_seconds > entry.positive_seconds && entry.positive_seconds > 0 {
                    return Err(ConfigError::Invalid(format!(
                        "cache_ttl.{provider}.{operation}: negative_seconds must not exceed positive_seconds"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Resolves the daily cost cap for `(tier, provider)`.
    pub fn tier_cap(&self, tier: Tier, provider: Provider) -> u32 {
        match tier {
            Tier::Free => self.tiers.free.get(provider),
            Tier::Premium => self.tiers.premium.get(provider),
            Tier::Enterprise => self.tiers.enterprise.get(provider),
        }
    }

    /// Resolves the cost of `(provider, operation)`, or `None` if undefined.
    pub fn operation_cost(&self, provider: Provider, operation: &Operation) -> Option<u32> {
        self.operation_costs.get(provider, &operation.0)
    }

    /// Resolves the positive/negative cache TTL pair for `(provider, operation)`.
    pub fn cache_ttl(&self, provider: Provider, operation: &Operation) -> Option<CacheTtlEntry> {
        self.cache_ttl.get(provider, &operation.0)
    }

    pub fn rate_limit(&self, provider: Provider) -> ProviderRateLimit {
        self.rate_limits.get(provider)
    }

    pub fn queue_deadline(&self) -> Duration {
        Duration::from_secs(self.queue.default_deadline_seconds)
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.singleflight.lease_ttl_seconds)
    }

    pub fn poll_slack(&self) -> Duration {
        Duration::from_secs(self.singleflight.poll_slack_seconds)
    }
}
