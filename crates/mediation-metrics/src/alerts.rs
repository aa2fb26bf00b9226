//! Threshold evaluator (spec §4.9): compares the running aggregates against
//! `alerts.*` from [`mediation_config::AlertsConfig`] and publishes
//! `AlertRaised`/`AlertCleared` on the store's pub/sub channel. No alert
//! *delivery* lives here — spec §4.9 is explicit that delivery is an
//! external collaborator; this evaluator only decides and announces state
//! transitions.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use mediation_config::AlertsConfig;
use mediation_core::{KvStore, Provider};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::collector::MetricsCollector;

pub const ALERTS_CHANNEL: &str = "alerts";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertSeverity {
    Warning,
    Critical,
}

/// Published on [`ALERTS_CHANNEL`]. `metric`/`dimension` identify which
/// tracked series tripped (or cleared), matching spec §3's
/// `MetricSample(metric, dimensions…, timestamp, value)` shape closely
/// enough that a subscriber can correlate the two.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AlertEvent {
    Raised { metric: String, dimension: String, value: f64, threshold: f64, severity: AlertSeverity, timestamp_ms: i64 },
    Cleared { metric: String, dimension: String, timestamp_ms: i64 },
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before unix epoch").as_millis() as i64
}

/// One tracked alert key, e.g. `("cache_hit_rate_low", "video")` or
/// `("queue_depth_high", "u1")`.
type AlertKey = (&'static str, String);

/// Periodically diffs the collector's snapshot against `alerts.*`
/// thresholds, raising on a fresh breach and clearing once the metric
/// recovers — tracked via `currently_raised` so a sustained breach doesn't
/// re-publish `Raised` every tick.
pub struct AlertEvaluator<S: KvStore> {
    store: Arc<S>,
    collector: MetricsCollector,
    config: AlertsConfig,
    currently_raised: Mutex<HashSet<AlertKey>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<S: KvStore> AlertEvaluator<S> {
    pub fn new(store: Arc<S>, collector: MetricsCollector, config: AlertsConfig) -> Self {
        Self { store, collector, config, currently_raised: Mutex::new(HashSet::new()), task: Mutex::new(None) }
    }

    /// Spawns the periodic evaluation loop. Mirrors
    /// `mediation_queue::QueueScheduler`'s start/stop-a-`JoinHandle` shape.
    pub fn start(self: &Arc<Self>, interval: Duration) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                this.evaluate_once().await;
            }
        });
        *self.task.lock() = Some(handle);
    }

    pub fn stop(&self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
    }

    /// Runs a single evaluation pass; exposed separately so tests can drive
    /// it without waiting on the interval.
    pub async fn evaluate_once(&self) {
        let snapshot = self.collector.snapshot();

        for provider in Provider::ALL {
            if let Some(&rate) = snapshot.cache_hit_rate.get(&provider) {
                self.check("cache_hit_rate_low", provider.as_str(), rate, self.config.cache_hit_rate_low, Direction::Below, AlertSeverity::Warning)
                    .await;
            }
            if let Some(&rate) = snapshot.api_error_rate.get(&provider) {
                self.check(
                    "api_error_rate_high",
                    provider.as_str(),
                    rate,
                    self.config.api_error_rate_high,
                    Direction::Above,
                    AlertSeverity::Critical,
                )
                .await;
            }
        }

        for (user, depth) in &snapshot.queue_depth {
            self.check("queue_depth_high", user, *depth as f64, self.config.queue_depth_high as f64, Direction::Above, AlertSeverity::Warning)
                .await;
        }

        for ((provider, user), (current, cap)) in &snapshot.quota_usage {
            if *cap == 0 {
                continue;
            }
            let fraction = *current as f64 / *cap as f64;
            let dimension = format!("{provider}:{user}");
            self.check("quota_utilization", &dimension, fraction, self.config.thresholds.critical, Direction::Above, AlertSeverity::Critical)
                .await;
            self.check("quota_utilization", &dimension, fraction, self.config.thresholds.warning, Direction::Above, AlertSeverity::Warning)
                .await;
        }
    }

    async fn check(&self, metric: &'static str, dimension: &str, value: f64, threshold: f64, direction: Direction, severity: AlertSeverity) {
        let breached = match direction {
            Direction::Above => value >= threshold,
            Direction::Below => value <= threshold,
        };
        let key: AlertKey = (metric, dimension.to_string());

        let was_raised = self.currently_raised.lock().contains(&key);
        if breached && !was_raised {
            self.currently_raised.lock().insert(key.clone());
            self.publish(AlertEvent::Raised {
                metric: metric.to_string(),
                dimension: dimension.to_string(),
                value,
                threshold,
                severity,
                timestamp_ms: now_ms(),
            })
            .await;
        } else if !breached && was_raised {
            self.currently_raised.lock().remove(&key);
            self.publish(AlertEvent::Cleared { metric: metric.to_string(), dimension: dimension.to_string(), timestamp_ms: now_ms() }).await;
        }
    }

    async fn publish(&self, event: AlertEvent) {
        if let Ok(payload) = serde_json::to_vec(&event) {
            let _ = self.store.publish(ALERTS_CHANNEL, payload).await;
        }
        #[cfg(feature = "tracing")]
        tracing::warn!(?event, "alert state change");
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Above,
    Below,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediation_core::{EventListener, InMemoryStore};

    #[tokio::test]
    async fn raises_and_clears_queue_depth_alert() {
        let store = InMemoryStore::new();
        let collector = MetricsCollector::new();
        let config = AlertsConfig { queue_depth_high: 5, ..AlertsConfig::default() };
        let evaluator = AlertEvaluator::new(store.clone(), collector.clone(), config);

        let mut rx = store.subscribe(ALERTS_CHANNEL).await.unwrap();

        collector.on_event(&mediation_queue::QueueEvent::Enqueued {
            provider: Provider::Video,
            user: "u1".into(),
            timestamp: std::time::Instant::now(),
            position: 10,
        });
        evaluator.evaluate_once().await;

        let raised = rx.try_recv().expect("alert published");
        let event: AlertEvent = serde_json::from_slice(&raised).unwrap();
        assert!(matches!(event, AlertEvent::Raised { .. }));

        collector.on_event(&mediation_queue::QueueEvent::Drained {
            provider: Provider::Video,
            user: "u1".into(),
            timestamp: std::time::Instant::now(),
            wait: Duration::from_secs(1),
        });
        evaluator.evaluate_once().await;

        let cleared = rx.try_recv().expect("clear published");
        let event: AlertEvent = serde_json::from_slice(&cleared).unwrap();
        assert!(matches!(event, AlertEvent::Cleared { .. }));
    }
}
