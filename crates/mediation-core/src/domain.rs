//! Shared domain types used by every crate in the mediation layer.

use std::fmt;
use std::time::Duration;

/// A quota-limited upstream provider.
///
/// The enumeration is fixed by design: adding a new provider is a code change,
/// not a configuration change, because each provider's operation set and cost
/// table are compiled into [`mediation-config`](../mediation_config/index.html).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Video,
    Music,
    Chat,
    Gaming,
}

impl Provider {
    pub const ALL: [Provider; 4] = [Provider::Video, Provider::Music, Provider::Chat, Provider::Gaming];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Video => "video",
            Provider::Music => "music",
            Provider::Chat => "chat",
            Provider::Gaming => "gaming",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User tier. Determines per-provider daily cost budget and queue priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    Premium,
    Enterprise,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Premium => "premium",
            Tier::Enterprise => "enterprise",
        }
    }

    /// Base queue priority for this tier (higher drains first).
    pub fn base_priority(&self) -> u8 {
        match self {
            Tier::Free => 0,
            Tier::Premium => 5,
            Tier::Enterprise => 10,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque external user identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        UserId(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        UserId(s)
    }
}

/// A provider-specific operation name, e.g. `search`, `details`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Operation(pub String);

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Operation {
    fn from(s: &str) -> Self {
        Operation(s.to_string())
    }
}

/// Positive integer cost of an operation in provider-specific units.
pub type Cost = u32;

/// Deterministic content-addressable key for a cacheable request.
///
/// Hashes `(provider, operation, normalized params, tier-if-response-varies,
/// schema_version)` with blake3 and renders to a fixed-width hex string, so
/// format migrations (schema_version bumps) invalidate automatically without
/// an explicit flush.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(
        provider: Provider,
        operation: &Operation,
        normalized_params: &str,
        tier_if_varies: Option<Tier>,
        schema_version: u32,
    ) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(provider.as_str().as_bytes());
        hasher.update(b"\0");
        hasher.update(operation.0.as_bytes());
        hasher.update(b"\0");
        hasher.update(normalized_params.as_bytes());
        hasher.update(b"\0");
        if let Some(tier) = tier_if_varies {
            hasher.update(tier.as_str().as_bytes());
        }
        hasher.update(b"\0");
        hasher.update(&schema_version.to_le_bytes());
        Fingerprint(hasher.finalize().to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Priority used for queue ordering; higher drains first.
pub type Priority = u8;

/// A deadline carried by every admission and every upstream dispatch.
#[derive(Debug, Clone, Copy)]
pub struct Deadline(tokio::time::Instant);

impl Deadline {
    pub fn after(duration: Duration) -> Self {
        Deadline(tokio::time::Instant::now() + duration)
    }

    pub fn is_expired(&self) -> bool {
        tokio::time::Instant::now() >= self.0
    }

    pub fn remaining(&self) -> Duration {
        self.0.saturating_duration_since(tokio::time::Instant::now())
    }
}

/// Outcome of an upstream dispatch, as reported back to the coordinator via
/// `complete(lease, outcome)`.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    Success,
    ProviderError,
    ProviderThrottled,
    AbortedBeforeDispatch,
}

/// Normalizes request parameters into a stable, deterministically ordered
/// string suitable for fingerprinting. Keys are sorted; values are used
/// verbatim (callers are expected to have already normalized casing).
pub fn normalize_params(params: &[(&str, &str)]) -> String {
    let mut pairs: Vec<(&str, &str)> = params.to_vec();
    pairs.sort_unstable_by_key(|(k, _)| *k);
    let mut out = String::new();
    for (k, v) in pairs {
        out.push_str(k);
        out.push('=');
        out.push_str(v);
        out.push('&');
    }
    out
}
