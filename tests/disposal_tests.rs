// Integration tests for session disposal
// Covers idempotent teardown and notification delivery racing with dispose

use anyhow::Result;
use speech_session::engine::EngineCall;
use speech_session::{
    EngineListener, EngineScript, OutputFormat, RawReason, RawResult, ScriptStep, ScriptedEngine,
    SessionConfig, SessionError, SessionState, SpeechSession,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

fn new_session() -> Result<(Arc<ScriptedEngine>, SpeechSession)> {
    let engine = Arc::new(ScriptedEngine::default());
    let session = SpeechSession::new(engine.clone(), &SessionConfig::default())?;
    Ok((engine, session))
}

#[test]
fn test_no_delivery_after_dispose_returns() -> Result<()> {
    for _ in 0..50 {
        let (engine, session) = new_session()?;

        let disposed = Arc::new(AtomicBool::new(false));
        let late = Arc::new(AtomicUsize::new(0));

        for_each_channel(&session, &disposed, &late);

        // Captured before dispose unregisters it, as an engine thread would hold it
        let listener = engine.listener().expect("listener registered");
        let barrier = Arc::new(Barrier::new(2));

        let emitter = {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..200u64 {
                    listener.session_started("race");
                    listener.speech_start_detected("race", i);
                    listener.result("race", RawResult::new(RawReason::Recognizing, "par"));
                    listener.result("race", RawResult::new(RawReason::Recognized, "final"));
                    listener.result("race", RawResult::new(RawReason::NoMatch, ""));
                    listener.activity_received("race", "{}", None);
                }
            })
        };

        barrier.wait();
        thread::yield_now();
        assert!(session.dispose());
        disposed.store(true, Ordering::SeqCst);

        emitter.join().expect("emitter thread panicked");
        assert_eq!(late.load(Ordering::SeqCst), 0);
        assert_eq!(engine.call_count(EngineCall::Release), 1);
    }

    Ok(())
}

fn for_each_channel(session: &SpeechSession, disposed: &Arc<AtomicBool>, late: &Arc<AtomicUsize>) {
    macro_rules! watch {
        ($channel:expr) => {{
            let disposed = Arc::clone(disposed);
            let late = Arc::clone(late);
            $channel.subscribe(move |_| {
                if disposed.load(Ordering::SeqCst) {
                    late.fetch_add(1, Ordering::SeqCst);
                }
            });
        }};
    }

    watch!(session.session_events());
    watch!(session.intermediate_results());
    watch!(session.final_results());
    watch!(session.errors());
    watch!(session.activities());
}

#[test]
fn test_concurrent_dispose_releases_once() -> Result<()> {
    for _ in 0..20 {
        let (engine, session) = new_session()?;
        let session = Arc::new(session);
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let session = Arc::clone(&session);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    session.dispose()
                })
            })
            .collect();

        let outcomes: Vec<bool> = handles
            .into_iter()
            .map(|h| h.join().expect("dispose thread panicked"))
            .collect();

        assert_eq!(outcomes.iter().filter(|disposed| **disposed).count(), 1);
        assert_eq!(engine.call_count(EngineCall::Release), 1);
        assert_eq!(engine.call_count(EngineCall::UnregisterListener), 1);
        assert!(engine.is_released());
    }

    Ok(())
}

#[test]
fn test_dispose_is_idempotent_and_runs_on_drop() -> Result<()> {
    let (engine, session) = new_session()?;

    assert!(session.dispose());
    assert!(!session.dispose());
    drop(session);

    assert_eq!(engine.call_count(EngineCall::Release), 1);

    let (engine, session) = new_session()?;
    drop(session);
    assert!(engine.is_released());
    assert!(engine.listener().is_none());

    Ok(())
}

#[tokio::test]
async fn test_operations_fail_after_dispose() -> Result<()> {
    let (engine, session) = new_session()?;
    session.dispose();

    assert!(session.is_disposed());
    assert_eq!(session.state(), SessionState::Disposed);

    assert!(matches!(session.recognize_once(), Err(SessionError::Closed)));
    assert!(matches!(
        session.start_continuous_recognition(),
        Err(SessionError::Closed)
    ));
    assert!(matches!(
        session.start_keyword_recognition("computer"),
        Err(SessionError::Closed)
    ));
    assert!(matches!(session.connect(), Err(SessionError::Closed)));
    assert!(matches!(
        session.send_activity(serde_json::json!({})),
        Err(SessionError::Closed)
    ));

    assert!(matches!(session.language(), Err(SessionError::Closed)));
    assert!(matches!(
        session.set_output_format(OutputFormat::Detailed),
        Err(SessionError::Closed)
    ));
    assert!(matches!(
        session.set_parameter("Custom-Flag", true),
        Err(SessionError::Closed)
    ));

    // Nothing reached the engine after release
    assert_eq!(engine.call_count(EngineCall::RecognizeOnce), 0);
    assert_eq!(engine.call_count(EngineCall::Connect), 0);

    Ok(())
}

#[tokio::test]
async fn test_dispose_during_inflight_operation() -> Result<()> {
    let engine = Arc::new(ScriptedEngine::new(EngineScript {
        recognize_once: vec![ScriptStep::Result {
            session_id: "s1".to_string(),
            result: RawResult::new(RawReason::Recognized, "too late"),
        }],
        ..Default::default()
    }));
    engine.set_call_delay(Duration::from_millis(200));
    let session = SpeechSession::new(engine.clone(), &SessionConfig::default())?;

    let finals = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&finals);
    session.final_results().subscribe(move |_| {
        sink.fetch_add(1, Ordering::SeqCst);
    });

    let operation = session.recognize_once()?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(session.dispose());

    assert!(matches!(operation.wait().await, Err(SessionError::Closed)));
    assert_eq!(finals.load(Ordering::SeqCst), 0);
    assert_eq!(session.state(), SessionState::Disposed);

    Ok(())
}

#[tokio::test]
async fn test_queued_operation_never_reaches_released_engine() -> Result<()> {
    let engine = Arc::new(ScriptedEngine::default());
    engine.set_call_delay(Duration::from_millis(200));
    let config = SessionConfig {
        max_blocking_threads: 1,
        ..Default::default()
    };
    let session = SpeechSession::new(engine.clone(), &config)?;

    // Occupies the only work slot so the activity stays queued
    let recognition = session.recognize_once()?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let activity = session.send_activity(serde_json::json!({ "type": "message" }))?;

    assert!(session.dispose());
    assert!(engine.is_released());

    assert!(matches!(activity.wait().await, Err(SessionError::Closed)));
    assert!(matches!(recognition.wait().await, Err(SessionError::Closed)));
    assert_eq!(engine.call_count(EngineCall::SendActivity), 0);
    assert_eq!(engine.calls_after_release(), 0);

    Ok(())
}

#[tokio::test]
async fn test_queued_stop_never_reaches_released_engine() -> Result<()> {
    let (engine, session) = new_session()?;
    engine.set_call_delay(Duration::from_millis(200));

    let start = session.start_continuous_recognition()?;
    tokio::time::sleep(Duration::from_millis(20)).await;
    let stop = session.stop_continuous_recognition()?;

    // Waits for the start call, which the stop is queued behind
    assert!(session.dispose());

    assert!(matches!(start.wait().await, Err(SessionError::Closed)));
    assert!(matches!(stop.wait().await, Err(SessionError::Closed)));
    assert_eq!(engine.call_count(EngineCall::StartContinuous), 1);
    assert_eq!(engine.call_count(EngineCall::StopContinuous), 0);
    assert_eq!(engine.calls_after_release(), 0);

    Ok(())
}

#[tokio::test]
async fn test_dispose_from_inside_listener() -> Result<()> {
    let engine = Arc::new(ScriptedEngine::new(EngineScript {
        start_continuous: vec![
            ScriptStep::SessionStarted {
                session_id: "s1".to_string(),
            },
            ScriptStep::SessionStopped {
                session_id: "s1".to_string(),
            },
        ],
        ..Default::default()
    }));
    let session = Arc::new(SpeechSession::new(engine.clone(), &SessionConfig::default())?);

    let deliveries = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&deliveries);
    let inner = Arc::clone(&session);
    session.session_events().subscribe(move |_| {
        sink.fetch_add(1, Ordering::SeqCst);
        inner.dispose();
    });

    let outcome = session.start_continuous_recognition()?.wait().await;

    assert!(matches!(outcome, Err(SessionError::Closed)));
    assert!(session.is_disposed());
    // The stop notification after disposal is dropped
    assert_eq!(deliveries.load(Ordering::SeqCst), 1);
    assert_eq!(session.stats().dropped_notifications, 1);
    assert_eq!(engine.call_count(EngineCall::Release), 1);

    Ok(())
}
