//! The five response headers spec §4.8 requires on every mediated response.

use http::HeaderValue;

pub const X_RATE_LIMIT_LIMIT: &str = "x-rate-limit-limit";
pub const X_RATE_LIMIT_REMAINING: &str = "x-rate-limit-remaining";
pub const X_RATE_LIMIT_USED: &str = "x-rate-limit-used";
pub const X_RATE_LIMIT_RESET: &str = "x-rate-limit-reset";
pub const X_CACHE_STATUS: &str = "x-cache-status";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
    Negative,
    Bypass,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
            CacheStatus::Negative => "NEGATIVE",
            CacheStatus::Bypass => "BYPASS",
        }
    }
}

/// Values for the four `X-Rate-Limit-*` headers; `reset_epoch` is a unix
/// timestamp (seconds), matching the quota ledger's `reset_epoch` (spec
/// §4.3's "next midnight UTC").
#[derive(Debug, Clone, Copy)]
pub struct RateLimitHeaders {
    pub limit: u32,
    pub used: u32,
    pub reset_epoch: i64,
}

impl RateLimitHeaders {
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.used)
    }

    pub fn apply(&self, headers: &mut http::HeaderMap, cache_status: CacheStatus) {
        headers.insert(X_RATE_LIMIT_LIMIT, header_value(self.limit));
        headers.insert(X_RATE_LIMIT_REMAINING, header_value(self.remaining()));
        headers.insert(X_RATE_LIMIT_USED, header_value(self.used));
        headers.insert(X_RATE_LIMIT_RESET, header_value(self.reset_epoch));
        headers.insert(X_CACHE_STATUS, HeaderValue::from_static(cache_status.as_str()));
    }
}

fn header_value(value: impl std::fmt::Display) -> HeaderValue {
    HeaderValue::from_str(&value.to_string()).unwrap_or_else(|_| HeaderValue::from_static("0"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_saturates_rather_than_underflows() {
        let headers = RateLimitHeaders { limit: 10, used: 15, reset_epoch: 0 };
        assert_eq!(headers.remaining(), 0);
    }

    #[test]
    fn apply_sets_all_five_headers() {
        let headers = RateLimitHeaders { limit: 100, used: 40, reset_epoch: 1700000000 };
        let mut map = http::HeaderMap::new();
        headers.apply(&mut map, CacheStatus::Hit);

        assert_eq!(map.get(X_RATE_LIMIT_LIMIT).unwrap(), "100");
        assert_eq!(map.get(X_RATE_LIMIT_REMAINING).unwrap(), "60");
        assert_eq!(map.get(X_RATE_LIMIT_USED).unwrap(), "40");
        assert_eq!(map.get(X_RATE_LIMIT_RESET).unwrap(), "1700000000");
        assert_eq!(map.get(X_CACHE_STATUS).unwrap(), "HIT");
    }

    #[test]
    fn cache_status_as_str_matches_spec_vocabulary() {
        assert_eq!(CacheStatus::Hit.as_str(), "HIT");
        assert_eq!(CacheStatus::Miss.as_str(), "MISS");
        assert_eq!(CacheStatus::Negative.as_str(), "NEGATIVE");
        assert_eq!(CacheStatus::Bypass.as_str(), "BYPASS");
    }
}
