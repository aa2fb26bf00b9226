use crate::events::RateLimitEvent;
use mediation_core::{EventListeners, FnListener};
use std::time::Duration;

/// Which window algorithm the counter uses. Spec §4.2 mandates sliding-log
/// semantics for correctness; `Fixed` and `SlidingCounter` are retained,
/// feature-complete, for operators who accept approximate limits in exchange
/// for O(1) per-key memory instead of O(limit) sorted-set entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowType {
    /// Resets the full permit budget at fixed interval boundaries.
    Fixed,
    /// Exact sliding window over a log of request timestamps (spec default).
    SlidingLog,
    /// Weighted average of two adjacent fixed buckets; approximate, O(1).
    SlidingCounter,
}

/// Configuration for a [`crate::SlidingWindowLimiter`].
pub struct RateLimiterConfig {
    pub(crate) name: String,
    pub(crate) window_type: WindowType,
    pub(crate) limit_for_period: usize,
    pub(crate) window: Duration,
    pub(crate) event_listeners: EventListeners<RateLimitEvent>,
}

/// Builder for [`RateLimiterConfig`].
pub struct RateLimiterConfigBuilder {
    name: String,
    window_type: WindowType,
    limit_for_period: usize,
    window: Duration,
    event_listeners: EventListeners<RateLimitEvent>,
}

impl Default for RateLimiterConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiterConfigBuilder {
    /// Defaults: 60 requests per 60-second sliding-log window, unnamed.
    pub fn new() -> Self {
        Self {
            name: "<unnamed>".to_string(),
            window_type: WindowType::SlidingLog,
            limit_for_period: 60,
            window: Duration::from_secs(60),
            event_listeners: EventListeners::new(),
        }
    }

    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    pub fn window_type(mut self, window_type: WindowType) -> Self {
        self.window_type = window_type;
        self
    }

    /// `rpm_limit` in spec terms: the number of admits allowed per window.
    pub fn limit_for_period(mut self, limit: usize) -> Self {
        self.limit_for_period = limit;
        self
    }

    /// `W` in spec terms: the window duration.
    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn on_admitted<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RateLimitEvent::Admitted { wait_duration, .. } = event {
                f(*wait_duration);
            }
        }));
        self
    }

    pub fn on_denied<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RateLimitEvent::Denied { retry_after, .. } = event {
                f(*retry_after);
            }
        }));
        self
    }

    /// Registers a raw listener that sees every [`RateLimitEvent`] variant,
    /// for consumers (e.g. `mediation-metrics`) that implement
    /// `EventListener<RateLimitEvent>` directly rather than reacting to a
    /// single field via [`Self::on_admitted`]/[`Self::on_denied`].
    pub fn with_event_listener<L>(mut self, listener: L) -> Self
    where
        L: mediation_core::EventListener<RateLimitEvent> + 'static,
    {
        self.event_listeners.add(listener);
        self
    }

    pub fn build(self) -> RateLimiterConfig {
        RateLimiterConfig {
            name: self.name,
            window_type: self.window_type,
            limit_for_period: self.limit_for_period,
            window: self.window,
            event_listeners: self.event_listeners,
        }
    }
}

impl RateLimiterConfig {
    pub fn builder() -> RateLimiterConfigBuilder {
        RateLimiterConfigBuilder::new()
    }
}
