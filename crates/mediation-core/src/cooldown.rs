//! AIMD (Additive Increase Multiplicative Decrease) cool-down controller.
//!
//! Repurposes `tower_resilience_core::aimd`'s concurrency-limit controller as
//! a provider-wide *effective rate budget* controller: on `UpstreamThrottled`
//! the limit is halved (the default `decrease_factor`) and a cool-down window
//! starts; while in cool-down the rate-limit coordinator (C5) treats the
//! reduced limit as the provider's ceiling instead of the configured one. On
//! sustained success the limit climbs back up additively, a self-correcting
//! sawtooth rather than a hand-rolled decay timer.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Configuration for an AIMD cool-down controller.
#[derive(Debug, Clone)]
pub struct CooldownConfig {
    pub initial_limit: usize,
    pub min_limit: usize,
    pub max_limit: usize,
    pub increase_by: usize,
    pub decrease_factor: f64,
    pub cooldown_duration: Duration,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            initial_limit: 100,
            min_limit: 1,
            max_limit: 100,
            increase_by: 5,
            decrease_factor: 0.5,
            cooldown_duration: Duration::from_secs(300),
        }
    }
}

impl CooldownConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initial_limit(mut self, limit: usize) -> Self {
        self.initial_limit = limit;
        self
    }

    pub fn with_min_limit(mut self, limit: usize) -> Self {
        self.min_limit = limit;
        self
    }

    pub fn with_max_limit(mut self, limit: usize) -> Self {
        self.max_limit = limit;
        self
    }

    pub fn with_increase_by(mut self, amount: usize) -> Self {
        self.increase_by = amount;
        self
    }

    pub fn with_decrease_factor(mut self, factor: f64) -> Self {
        self.decrease_factor = factor;
        self
    }

    pub fn with_cooldown_duration(mut self, duration: Duration) -> Self {
        self.cooldown_duration = duration;
        self
    }
}

/// Thread-safe AIMD cool-down controller, one per provider.
pub struct CooldownController {
    limit: AtomicUsize,
    cooldown_until: Mutex<Option<Instant>>,
    config: CooldownConfig,
}

impl CooldownController {
    pub fn new(config: CooldownConfig) -> Self {
        let initial = config.initial_limit.clamp(config.min_limit, config.max_limit);
        Self {
            limit: AtomicUsize::new(initial),
            cooldown_until: Mutex::new(None),
            config,
        }
    }

    /// Current effective limit (already reduced if in cool-down).
    pub fn effective_limit(&self) -> usize {
        self.limit.load(Ordering::Relaxed)
    }

    pub fn is_in_cooldown(&self) -> bool {
        match *self.cooldown_until.lock().unwrap() {
            Some(until) => Instant::now() < until,
            None => false,
        }
    }

    /// Record a provider-throttled response: halve the limit and (re)start
    /// the cool-down window.
    pub fn on_provider_throttled(&self) {
        let current = self.limit.load(Ordering::Relaxed);
        let decreased = ((current as f64) * self.config.decrease_factor) as usize;
        let new_limit = decreased.max(self.config.min_limit);
        self.limit.store(new_limit, Ordering::Relaxed);

        let mut cooldown = self.cooldown_until.lock().unwrap();
        *cooldown = Some(Instant::now() + self.config.cooldown_duration);
    }

    /// Record a successful dispatch: additively restore capacity.
    pub fn on_success(&self) {
        let current = self.limit.load(Ordering::Relaxed);
        let new_limit = current
            .saturating_add(self.config.increase_by)
            .min(self.config.max_limit);
        self.limit.store(new_limit, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        let initial = self.config.initial_limit.clamp(self.config.min_limit, self.config.max_limit);
        self.limit.store(initial, Ordering::Relaxed);
        *self.cooldown_until.lock().unwrap() = None;
    }

    pub fn config(&self) -> &CooldownConfig {
        &self.config
    }
}

impl std::fmt::Debug for CooldownController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CooldownController")
            .field("effective_limit", &self.effective_limit())
            .field("in_cooldown", &self.is_in_cooldown())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_halving() {
        let config = CooldownConfig::default();
        assert!((config.decrease_factor - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.cooldown_duration, Duration::from_secs(300));
    }

    #[test]
    fn throttle_halves_limit_and_enters_cooldown() {
        let controller = CooldownController::new(CooldownConfig::default().with_initial_limit(100));
        assert_eq!(controller.effective_limit(), 100);
        assert!(!controller.is_in_cooldown());

        controller.on_provider_throttled();
        assert_eq!(controller.effective_limit(), 50);
        assert!(controller.is_in_cooldown());
    }

    #[test]
    fn limit_never_drops_below_floor() {
        let controller = CooldownController::new(
            CooldownConfig::default().with_initial_limit(2).with_min_limit(1),
        );
        controller.on_provider_throttled();
        controller.on_provider_throttled();
        controller.on_provider_throttled();
        assert_eq!(controller.effective_limit(), 1);
    }

    #[test]
    fn success_additively_restores_capacity() {
        let controller = CooldownController::new(
            CooldownConfig::default()
                .with_initial_limit(100)
                .with_increase_by(10)
                .with_max_limit(100),
        );
        controller.on_provider_throttled();
        assert_eq!(controller.effective_limit(), 50);

        controller.on_success();
        assert_eq!(controller.effective_limit(), 60);
    }

    #[test]
    fn cooldown_expires_after_duration() {
        let controller = CooldownController::new(
            CooldownConfig::default().with_cooldown_duration(Duration::from_millis(10)),
        );
        controller.on_provider_throttled();
        assert!(controller.is_in_cooldown());
        std::thread::sleep(Duration::from_millis(30));
        assert!(!controller.is_in_cooldown());
    }
}
