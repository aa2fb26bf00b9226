//! Background drain scheduler, grounded on
//! `tower_resilience_healthcheck::wrapper::HealthCheckWrapper`'s
//! start/stop-a-`JoinHandle` shape: a periodic `tokio::time::interval` loop
//! that sweeps a set of tracked keys (there: resources; here: users with
//! queued items) each tick.

use std::sync::Arc;
use std::time::Duration;

use mediation_core::KvStore;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::events::QueueEvent;
use crate::queue::RequestQueue;
use crate::request::{DrainHandler, DrainOutcome};

/// Round-robin drain loop for [`RequestQueue`]. Each tick visits every
/// active user once, in order, and attempts to drain that user's head item
/// through the injected [`DrainHandler`]; continued denial leaves the item
/// in place and moves on to the next user (spec §4.6).
pub struct QueueScheduler<S: KvStore> {
    queue: Arc<RequestQueue<S>>,
    handler: Arc<dyn DrainHandler>,
    tick_interval: Duration,
    task: RwLock<Option<JoinHandle<()>>>,
}

impl<S: KvStore> QueueScheduler<S> {
    pub fn new(queue: Arc<RequestQueue<S>>, handler: Arc<dyn DrainHandler>, tick_interval: Duration) -> Self {
        Self {
            queue,
            handler,
            tick_interval,
            task: RwLock::new(None),
        }
    }

    pub async fn start(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(this.tick_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                this.sweep_once().await;
            }
        });
        *self.task.write().await = Some(handle);
    }

    pub async fn stop(&self) {
        if let Some(handle) = self.task.write().await.take() {
            handle.abort();
        }
    }

    /// Runs exactly one round-robin pass; exposed separately from
    /// [`start`]/[`stop`] so tests and callers that prefer to drive their
    /// own tick can invoke it directly.
    pub async fn sweep_once(&self) {
        let users = match self.queue.active_users().await {
            Ok(users) => users,
            Err(_) => return,
        };

        for user in users {
            let mut requests = match self.queue.list_user(&user).await {
                Ok(r) => r,
                Err(_) => continue,
            };
            let Some(head) = requests.first_mut() else { continue };

            if head.is_expired() {
                self.queue.event_listeners().emit(&QueueEvent::Expired {
                    provider: head.provider,
                    user: user.to_string(),
                    timestamp: std::time::Instant::now(),
                });
                let _ = self.queue.remove(head).await;
                continue;
            }

            match self.handler.try_admit(head).await {
                DrainOutcome::Dispatched => {
                    self.queue.event_listeners().emit(&QueueEvent::Drained {
                        provider: head.provider,
                        user: user.to_string(),
                        timestamp: std::time::Instant::now(),
                        wait: head.age(),
                    });
                    let _ = self.queue.remove(head).await;
                }
                DrainOutcome::StillDenied => {}
            }
        }
    }
}
