//! Tests for observation fan-out.

use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

fn context() -> ObservationContext {
    ObservationContext {
        provider: "github".to_string(),
        event_type: Some("push".to_string()),
        delivery_id: Some("d-1".to_string()),
        raw_body_bytes: 2,
        received_at: Utc::now(),
        started_at: Instant::now(),
    }
}

#[derive(Default)]
struct RecordingObserver {
    kinds: Mutex<Vec<&'static str>>,
}

impl Observer for RecordingObserver {
    fn on_request_received(&self, event: &ObservationEvent) {
        self.kinds.lock().unwrap().push(event.kind());
    }

    fn on_completed(&self, event: &ObservationEvent) {
        self.kinds.lock().unwrap().push(event.kind());
    }
}

struct PanickingObserver;

impl Observer for PanickingObserver {
    fn on_request_received(&self, _event: &ObservationEvent) {
        panic!("observer bug");
    }
}

struct CountingObserver {
    calls: AtomicUsize,
}

impl Observer for CountingObserver {
    fn on_request_received(&self, _event: &ObservationEvent) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn events_dispatch_to_matching_method() {
    let recorder = Arc::new(RecordingObserver::default());
    let set = ObserverSet::new().with(recorder.clone());

    set.emit(&ObservationEvent::RequestReceived { context: context() });
    set.emit(&ObservationEvent::Completed {
        context: context(),
        status: 200,
        success: true,
        duration: Duration::from_millis(3),
    });
    // No method override for this kind: silently ignored.
    set.emit(&ObservationEvent::EventUnhandled { context: context() });

    assert_eq!(
        *recorder.kinds.lock().unwrap(),
        vec!["request_received", "completed"]
    );
}

#[test]
fn observer_panic_does_not_stop_fan_out() {
    let counter = Arc::new(CountingObserver {
        calls: AtomicUsize::new(0),
    });
    let set = ObserverSet::new()
        .with(Arc::new(PanickingObserver))
        .with(counter.clone());

    set.emit(&ObservationEvent::RequestReceived { context: context() });

    // The observer after the panicking one still ran.
    assert_eq!(counter.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn with_returns_a_new_set_leaving_original_unchanged() {
    let original = ObserverSet::new();
    let extended = original.with(Arc::new(PanickingObserver));

    assert!(original.is_empty());
    assert_eq!(extended.len(), 1);
}

#[test]
fn with_all_appends_in_order() {
    let recorder = Arc::new(RecordingObserver::default());
    let counter = Arc::new(CountingObserver {
        calls: AtomicUsize::new(0),
    });
    let set = ObserverSet::new().with_all(vec![
        recorder.clone() as Arc<dyn Observer>,
        counter.clone() as Arc<dyn Observer>,
    ]);

    assert_eq!(set.len(), 2);
    set.emit(&ObservationEvent::RequestReceived { context: context() });
    assert_eq!(counter.calls.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.kinds.lock().unwrap().len(), 1);
}

#[test]
fn log_observer_never_panics_across_all_kinds() {
    let set = ObserverSet::new().with(Arc::new(LogObserver));
    let events = vec![
        ObservationEvent::RequestReceived { context: context() },
        ObservationEvent::BodyTooLarge {
            context: context(),
            limit: 1,
            actual: 2,
        },
        ObservationEvent::JsonParseFailed {
            context: context(),
            error: "bad".to_string(),
        },
        ObservationEvent::VerificationFailed {
            context: context(),
            reason: "nope".to_string(),
        },
        ObservationEvent::HandlerFailed {
            context: context(),
            index: 0,
            total: 2,
            error: "boom".to_string(),
        },
        ObservationEvent::ReplayDuplicate {
            context: context(),
            key: "k".to_string(),
        },
        ObservationEvent::Completed {
            context: context(),
            status: 200,
            success: true,
            duration: Duration::from_millis(1),
        },
    ];

    for event in &events {
        set.emit(event);
    }
}

#[test]
fn kind_names_are_stable() {
    let cases: Vec<(ObservationEvent, &str)> = vec![
        (
            ObservationEvent::BodyTooLarge {
                context: context(),
                limit: 10,
                actual: 11,
            },
            "body_too_large",
        ),
        (
            ObservationEvent::ReplayFreshnessRejected {
                context: context(),
                skew_secs: 600,
            },
            "replay_freshness_rejected",
        ),
        (
            ObservationEvent::SecretFallbackUsed { context: context() },
            "secret_fallback_used",
        ),
        (
            ObservationEvent::HandlerFailed {
                context: context(),
                index: 0,
                total: 1,
                error: "boom".to_string(),
            },
            "handler_failed",
        ),
    ];

    for (event, expected) in cases {
        assert_eq!(event.kind(), expected);
    }
}
