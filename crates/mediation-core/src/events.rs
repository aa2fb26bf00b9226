//! Event bus shared by every component.
//!
//! This is the pub/sub primitive that lets [`mediation-metrics`] consume
//! component events without being called directly by C2–C8 — breaking the
//! cyclic reference the spec's REDESIGN FLAGS calls out between middleware,
//! limiter, and monitor.

#[cfg(feature = "tracing")]
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Trait for events emitted by mediation components.
pub trait MediationEvent: Send + Sync + fmt::Debug {
    /// Event kind, e.g. `"permit_acquired"`, `"cache_hit"`, `"quota_charged"`.
    fn event_type(&self) -> &'static str;
    /// When this event occurred.
    fn timestamp(&self) -> Instant;
    /// Name of the component instance that emitted this event.
    fn component(&self) -> &str;
}

/// Trait for listening to mediation events.
pub trait EventListener<E: MediationEvent>: Send + Sync {
    fn on_event(&self, event: &E);
}

pub type BoxedEventListener<E> = Arc<dyn EventListener<E>>;

/// A collection of event listeners for one event type.
#[derive(Clone)]
pub struct EventListeners<E: MediationEvent> {
    listeners: Vec<BoxedEventListener<E>>,
}

impl<E: MediationEvent> EventListeners<E> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    pub fn add<L>(&mut self, listener: L)
    where
        L: EventListener<E> + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    /// Emits an event to all registered listeners. A panicking listener is
    /// caught so it cannot take down the others; with `tracing` enabled the
    /// panic is logged, with `metrics` enabled a counter records it.
    pub fn emit(&self, event: &E) {
        for (index, listener) in self.listeners.iter().enumerate() {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.on_event(event);
            }));

            if let Err(_panic_payload) = result {
                #[cfg(feature = "tracing")]
                log_listener_panic(index, event, _panic_payload.as_ref());

                #[cfg(feature = "metrics")]
                record_listener_panic_metric(event);

                #[cfg(not(feature = "tracing"))]
                let _ = index;

                #[cfg(not(any(feature = "tracing", feature = "metrics")))]
                let _ = _panic_payload;
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }
}

impl<E: MediationEvent> Default for EventListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// A simple function-based event listener.
pub struct FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    f: F,
    _phantom: std::marker::PhantomData<E>,
}

impl<E, F> FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<E, F> EventListener<E> for FnListener<E, F>
where
    E: MediationEvent,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.f)(event)
    }
}

#[cfg(feature = "tracing")]
fn log_listener_panic<E: MediationEvent>(index: usize, event: &E, panic_payload: &(dyn Any + Send)) {
    let panic_message = panic_payload
        .downcast_ref::<&'static str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic_payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());

    tracing::warn!(
        listener_index = index,
        component = event.component(),
        event_type = event.event_type(),
        panic_message = %panic_message,
        "mediation event listener panicked"
    );
}

#[cfg(feature = "metrics")]
fn record_listener_panic_metric<E: MediationEvent>(event: &E) {
    metrics::counter!(
        "mediation_event_listener_panics_total",
        "component" => event.component().to_string(),
        "event_type" => event.event_type().to_string()
    )
    .increment(1);
}
