//! Integration test verifying that registry operations open spans and emit
//! the diagnostic events operators rely on.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::Duration as ChronoDuration;
use ticket_registry::{
    TicketRegistry,
    testutil::{epoch_plus, expiring_ticket, lease_lock, memory_registry},
};
use ticket_registry_storage::{Clock, ManualClock, MemoryBackend, testutil::manual_backend};
use tracing::{
    Level, Subscriber,
    field::{Field, Visit},
};
use tracing_subscriber::{layer::SubscriberExt, registry::LookupSpan};

// ---------------------------------------------------------------------------
// Collecting layer: span names and event messages
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct Collector {
    spans: Arc<Mutex<Vec<String>>>,
    events: Arc<Mutex<Vec<(Level, String)>>>,
}

struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

impl<S> tracing_subscriber::Layer<S> for Collector
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(
        &self,
        _attrs: &tracing::span::Attributes<'_>,
        id: &tracing::span::Id,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        if let Some(span) = ctx.span(id) {
            self.spans.lock().expect("lock poisoned").push(span.name().to_owned());
        }
    }

    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let mut visitor = MessageVisitor(String::new());
        event.record(&mut visitor);
        self.events
            .lock()
            .expect("lock poisoned")
            .push((*event.metadata().level(), visitor.0));
    }
}

impl Collector {
    fn has_span(&self, name: &str) -> bool {
        self.spans.lock().expect("lock poisoned").iter().any(|s| s == name)
    }

    fn has_event(&self, level: Level, message: &str) -> bool {
        self.events
            .lock()
            .expect("lock poisoned")
            .iter()
            .any(|(l, m)| *l == level && m == message)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn lease_acquire_and_release_create_spans() {
    let collector = Collector::default();
    let subscriber = tracing_subscriber::registry().with(collector.clone());
    let _guard = tracing::subscriber::set_default(subscriber);

    let (backend, clock) = manual_backend();
    let lock = lease_lock(backend, &clock);
    lock.acquire("cleaner", "node-a", Duration::from_secs(30)).await.unwrap();
    lock.release("cleaner", "node-a").await.unwrap();

    assert!(collector.has_span("acquire"));
    assert!(collector.has_span("release"));
    assert!(collector.has_event(Level::INFO, "lease granted"));
}

#[tokio::test]
async fn denied_lease_is_debug_not_error() {
    let collector = Collector::default();
    let subscriber = tracing_subscriber::registry().with(collector.clone());
    let _guard = tracing::subscriber::set_default(subscriber);

    let (backend, clock) = manual_backend();
    let lock = lease_lock(backend, &clock);
    lock.acquire("cleaner", "node-a", Duration::from_secs(30)).await.unwrap();
    let denied = lock.acquire("cleaner", "node-b", Duration::from_secs(30)).await.unwrap();
    assert!(!denied.granted);

    assert!(collector.has_event(Level::DEBUG, "lease held by another owner"));
    let events = collector.events.lock().expect("lock poisoned");
    assert!(events.iter().all(|(level, _)| *level != Level::ERROR), "got: {events:?}");
}

#[tokio::test]
async fn clock_skew_is_warned() {
    let collector = Collector::default();
    let subscriber = tracing_subscriber::registry().with(collector.clone());
    let _guard = tracing::subscriber::set_default(subscriber);

    let (backend, store_clock) = manual_backend();
    let local_clock = ManualClock::new(epoch_plus(0));
    local_clock.advance(ChronoDuration::seconds(60));
    let lock = lease_lock(backend, &local_clock);

    let result = lock.acquire("cleaner", "node-a", Duration::from_secs(30)).await.unwrap();
    assert!(result.granted, "skew is diagnostic only");
    assert_eq!(result.expires_at, store_clock.now() + ChronoDuration::seconds(30));
    assert!(collector.has_event(Level::WARN, "clock skew suspected"));
}

#[tokio::test]
async fn registry_operations_create_spans() {
    let collector = Collector::default();
    let subscriber = tracing_subscriber::registry().with(collector.clone());
    let _guard = tracing::subscriber::set_default(subscriber);

    let registry = memory_registry(MemoryBackend::new());
    registry.insert(&expiring_ticket("ST-1", "ST", epoch_plus(1))).await.unwrap();
    registry.get("ST-1").await.unwrap();
    registry.delete_expired(epoch_plus(5)).await.unwrap();

    for name in ["insert", "get", "delete_expired", "commit"] {
        assert!(collector.has_span(name), "expected a '{name}' span");
    }
}
