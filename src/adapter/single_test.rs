use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures::future::FusedFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::time::sleep;
use tracing_test::traced_test;

use super::*;
use crate::errors::CommandError;
use crate::DispatchRegistrationError;
use crate::Error;
use crate::ResultCode;

#[tokio::test]
async fn test_success_resolves_with_value() {
    let single = Single::from_registration(|sink: ValueSink<u32>| {
        sink.success(7);
        Ok(())
    });

    assert_eq!(single.await.unwrap(), Some(7));
}

#[tokio::test]
async fn test_empty_completion_resolves_with_none() {
    let single = Single::from_registration(|sink: ValueSink<u32>| {
        sink.empty();
        Ok(())
    });

    assert_eq!(single.await.unwrap(), None);
}

#[tokio::test]
async fn test_asynchronous_error_is_delivered() {
    let single = Single::from_registration(|sink: ValueSink<u32>| {
        tokio::spawn(async move {
            sleep(Duration::from_millis(5)).await;
            sink.error(CommandError::new(ResultCode::Timeout, "late").into());
        });
        Ok(())
    });

    match single.await {
        Err(Error::Command(e)) => assert_eq!(e.code, ResultCode::Timeout),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn test_registration_is_deferred_until_first_poll() {
    let registered = Arc::new(AtomicBool::new(false));
    let flag = registered.clone();
    let single = Single::from_registration(move |sink: ValueSink<u32>| {
        flag.store(true, Ordering::SeqCst);
        sink.success(1);
        Ok(())
    });

    assert!(!registered.load(Ordering::SeqCst));
    assert_eq!(single.await.unwrap(), Some(1));
    assert!(registered.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_dropping_before_poll_never_registers() {
    let registered = Arc::new(AtomicBool::new(false));
    let flag = registered.clone();
    let single = Single::from_registration(move |sink: ValueSink<u32>| {
        flag.store(true, Ordering::SeqCst);
        sink.empty();
        Ok(())
    });

    drop(single);
    assert!(!registered.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_registration_error_becomes_the_output() {
    let single = Single::from_registration(|_sink: ValueSink<u32>| {
        Err(DispatchRegistrationError::EventLoopExhausted { in_flight: 4, limit: 4 }.into())
    });

    assert!(matches!(
        single.await,
        Err(Error::Dispatch(DispatchRegistrationError::EventLoopExhausted { .. }))
    ));
}

#[tokio::test]
#[traced_test]
async fn test_dropped_sink_surfaces_as_abandoned() {
    let single = Single::from_registration(|sink: ValueSink<u32>| {
        drop(sink);
        Ok(())
    });

    assert!(matches!(single.await, Err(Error::Abandoned)));
}

#[tokio::test]
async fn test_dropping_pending_handle_cancels_the_sink() {
    let parked: Arc<Mutex<Option<ValueSink<u32>>>> = Arc::new(Mutex::new(None));
    let slot = parked.clone();
    let mut single = Single::from_registration(move |sink: ValueSink<u32>| {
        *slot.lock() = Some(sink);
        Ok(())
    });

    assert!((&mut single).now_or_never().is_none());
    let token = parked.lock().as_ref().unwrap().cancellation();
    assert!(!token.is_cancelled());

    drop(single);
    assert!(token.is_cancelled());

    // late delivery after cancellation is silently suppressed
    let sink = parked.lock().take().unwrap();
    assert!(sink.is_cancelled());
    sink.success(9);
}

#[tokio::test]
async fn test_completed_handle_is_fused() {
    let mut single = Single::from_registration(|sink: ValueSink<u32>| {
        sink.success(3);
        Ok(())
    });

    assert_eq!((&mut single).await.unwrap(), Some(3));
    assert!(single.is_terminated());
    assert!((&mut single).now_or_never().is_none());
}

#[tokio::test]
async fn test_adapted_sink_maps_and_filters() {
    let single = Single::from_registration(|sink: ValueSink<String>| {
        let inner: ValueSink<u32> = sink.adapt(|n: u32| (n > 0).then(|| format!("#{n}")));
        inner.success(5);
        Ok(())
    });
    assert_eq!(single.await.unwrap(), Some("#5".to_string()));

    let filtered = Single::from_registration(|sink: ValueSink<String>| {
        let inner: ValueSink<u32> = sink.adapt(|n: u32| (n > 0).then(|| format!("#{n}")));
        inner.success(0);
        Ok(())
    });
    assert_eq!(filtered.await.unwrap(), None);
}

#[tokio::test]
async fn test_map_leaves_errors_untouched() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let single = Single::from_registration(|sink: ValueSink<u32>| {
        sink.error(Error::InvalidInput("bad".into()));
        Ok(())
    })
    .map(move |n| {
        counter.fetch_add(1, Ordering::SeqCst);
        n * 2
    });

    assert!(matches!(single.await, Err(Error::InvalidInput(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
