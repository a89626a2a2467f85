// Integration tests for the background executor and operation handles

use anyhow::Result;
use speech_session::operation::Executor;
use speech_session::SessionError;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

#[tokio::test]
async fn test_submit_returns_value() -> Result<()> {
    let executor = Executor::new(1, 4)?;

    let operation = executor.submit("answer", |_| Ok(42));
    assert_eq!(operation.name(), "answer");
    assert_eq!(operation.wait().await?, 42);
    assert!(operation.is_completed());

    // Waiting again yields the same outcome
    assert_eq!(operation.wait().await?, 42);
    assert_eq!(operation.clone().try_outcome().transpose()?, Some(42));

    Ok(())
}

#[tokio::test]
async fn test_failure_is_captured_not_raised() -> Result<()> {
    let executor = Executor::new(1, 4)?;
    let (release, gate) = mpsc::channel::<()>();

    let operation = executor.submit("failing", move |_| -> speech_session::Result<()> {
        let _ = gate.recv();
        Err(SessionError::InvalidArgument("bad input".to_string()))
    });

    assert!(operation.try_outcome().is_none());
    assert!(!operation.is_completed());

    release.send(())?;
    let outcome = operation.wait().await;
    assert!(matches!(outcome, Err(SessionError::InvalidArgument(ref m)) if m == "bad input"));

    Ok(())
}

#[tokio::test]
async fn test_cancel_before_start_skips_work_and_rolls_back() -> Result<()> {
    let executor = Executor::new(1, 1)?;
    let (release, gate) = mpsc::channel::<()>();
    let (started_tx, started_rx) = mpsc::channel::<()>();

    let blocker = executor.submit("blocker", move |_| {
        let _ = started_tx.send(());
        let _ = gate.recv();
        Ok(())
    });
    started_rx.recv_timeout(Duration::from_secs(5))?;

    let ran = Arc::new(AtomicBool::new(false));
    let rolled_back = Arc::new(AtomicBool::new(false));
    let queued = {
        let ran = Arc::clone(&ran);
        let rolled_back = Arc::clone(&rolled_back);
        executor.submit_with_rollback(
            "queued",
            move |_| {
                ran.store(true, Ordering::SeqCst);
                Ok(())
            },
            move || rolled_back.store(true, Ordering::SeqCst),
        )
    };

    assert!(queued.cancel());
    // A second request changes nothing
    assert!(!queued.cancel());

    release.send(())?;
    blocker.wait().await?;

    assert!(matches!(queued.wait().await, Err(SessionError::Cancelled)));
    assert!(!ran.load(Ordering::SeqCst));
    assert!(rolled_back.load(Ordering::SeqCst));

    Ok(())
}

#[tokio::test]
async fn test_cancel_after_start_is_observable_but_not_forced() -> Result<()> {
    let executor = Executor::new(1, 2)?;
    let (release, gate) = mpsc::channel::<()>();
    let (started_tx, started_rx) = mpsc::channel::<()>();

    let operation = executor.submit("running", move |ctx| {
        let _ = started_tx.send(());
        let _ = gate.recv();
        Ok(ctx.is_cancel_requested())
    });
    started_rx.recv_timeout(Duration::from_secs(5))?;

    assert!(!operation.cancel());
    assert!(operation.is_cancel_requested());

    release.send(())?;
    assert!(operation.wait().await?);

    Ok(())
}

#[tokio::test]
async fn test_panicking_work_completes_with_error() -> Result<()> {
    let executor = Executor::new(1, 2)?;

    let operation = executor.submit("explodes", |_| -> speech_session::Result<()> {
        panic!("boom");
    });

    assert!(matches!(operation.wait().await, Err(SessionError::Engine(_))));

    // The executor keeps working
    assert_eq!(executor.submit("after", |_| Ok("ok")).wait().await?, "ok");

    Ok(())
}

#[test]
fn test_wait_blocking_outside_runtime() -> Result<()> {
    let executor = Executor::new(1, 4)?;
    let counter = Arc::new(AtomicUsize::new(0));

    let operations: Vec<_> = (0..8)
        .map(|_| {
            let counter = Arc::clone(&counter);
            executor.submit("count", move |_| {
                Ok(counter.fetch_add(1, Ordering::SeqCst))
            })
        })
        .collect();

    let mut seen: Vec<usize> = operations
        .iter()
        .map(|op| op.wait_blocking())
        .collect::<speech_session::Result<_>>()?;
    seen.sort_unstable();

    assert_eq!(seen, (0..8).collect::<Vec<_>>());

    // Every operation got its own id
    let ids: HashSet<_> = operations.iter().map(|op| op.id()).collect();
    assert_eq!(ids.len(), 8);

    Ok(())
}
