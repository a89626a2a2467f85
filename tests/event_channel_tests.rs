// Integration tests for event channels and the dispatch gate

use speech_session::events::{DispatchGate, EventCategory, EventChannel};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

fn counter_listener(
    channel: &EventChannel<String>,
    counter: &Arc<AtomicUsize>,
) -> speech_session::SubscriptionToken {
    let counter = Arc::clone(counter);
    channel.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn test_unsubscribed_listener_never_invoked() {
    let channel = EventChannel::new(EventCategory::FinalResult);
    let removed = Arc::new(AtomicUsize::new(0));
    let kept = Arc::new(AtomicUsize::new(0));

    let token = counter_listener(&channel, &removed);
    counter_listener(&channel, &kept);
    assert!(channel.unsubscribe(token));

    channel.fire(&"hello".to_string());
    channel.fire(&"again".to_string());

    assert_eq!(removed.load(Ordering::SeqCst), 0);
    assert_eq!(kept.load(Ordering::SeqCst), 2);
    assert_eq!(channel.listener_count(), 1);
}

#[test]
fn test_listener_registered_twice_runs_twice() {
    let channel = EventChannel::new(EventCategory::Session);
    let calls = Arc::new(AtomicUsize::new(0));

    let first = counter_listener(&channel, &calls);
    let second = counter_listener(&channel, &calls);
    assert_ne!(first, second);

    channel.fire(&"event".to_string());
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // Removing one registration leaves the other
    channel.unsubscribe(first);
    channel.fire(&"event".to_string());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_panicking_listener_does_not_stop_delivery() {
    let channel = EventChannel::new(EventCategory::Error);
    let calls = Arc::new(AtomicUsize::new(0));

    channel.subscribe(|_: &String| panic!("listener failure"));
    counter_listener(&channel, &calls);

    channel.fire(&"event".to_string());
    channel.fire(&"event".to_string());

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_subscription_churn_during_fire() {
    let channel = Arc::new(EventChannel::<String>::new(EventCategory::IntermediateResult));
    let stable = Arc::new(AtomicUsize::new(0));
    counter_listener(&channel, &stable);

    let churn: Vec<_> = (0..4)
        .map(|_| {
            let channel = Arc::clone(&channel);
            thread::spawn(move || {
                let scratch = Arc::new(AtomicUsize::new(0));
                for _ in 0..200 {
                    let token = counter_listener(&channel, &scratch);
                    assert!(channel.unsubscribe(token));
                }
            })
        })
        .collect();

    for _ in 0..500 {
        channel.fire(&"partial".to_string());
    }

    for handle in churn {
        handle.join().expect("churn thread panicked");
    }

    assert_eq!(stable.load(Ordering::SeqCst), 500);
    assert_eq!(channel.listener_count(), 1);
}

#[test]
fn test_gate_close_waits_for_inflight_delivery() {
    let gate = Arc::new(DispatchGate::new());
    let finished = Arc::new(AtomicUsize::new(0));
    let (entered_tx, entered_rx) = mpsc::channel();

    let delivery = {
        let gate = Arc::clone(&gate);
        let finished = Arc::clone(&finished);
        thread::spawn(move || {
            let guard = gate.enter().expect("gate open");
            entered_tx.send(()).expect("test thread alive");
            thread::sleep(Duration::from_millis(100));
            finished.fetch_add(1, Ordering::SeqCst);
            drop(guard);
        })
    };

    entered_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("delivery entered the gate");

    gate.close();
    assert_eq!(finished.load(Ordering::SeqCst), 1);
    assert!(gate.is_closed());
    assert!(gate.enter().is_none());

    delivery.join().expect("delivery thread panicked");
}
