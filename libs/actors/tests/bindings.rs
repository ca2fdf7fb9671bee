//! Binding Strategy Integration Tests
//!
//! End-to-end behavior of the public binding API:
//! - listener delivery on dedicated and foreign-loop threads
//! - failure description and envelope recycling
//! - blocking results of calls that crash their worker

mod common;

use actor_threads::{
    actor_interface, ActorError, ActorThread, ActorThreads, CrashEarlyFailureHandler,
    DirectActorThread, FailureHandler, LoggingFailureHandler, MainLoop, Promise,
};
use common::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

actor_interface! {
    trait Divider {
        fn divide(&self, a: i64, b: i64) -> Promise<i64>;
    }
}

struct Checked;

impl Divider for Checked {
    fn divide(&self, a: i64, b: i64) -> Promise<i64> {
        if b == 0 {
            panic!("division by zero");
        }
        Promise::wrap(a / b)
    }
}

#[test]
fn test_listener_fires_exactly_once() {
    init_tracing();
    let threads = ActorThreads::with_failure_handler(Arc::new(LoggingFailureHandler));
    let echo = threads.create_thread("echo").bind::<dyn Echo>(Arc::new(EchoImpl));
    let calls = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = mpsc::channel();

    let counter = Arc::clone(&calls);
    let tx = Mutex::new(tx);
    let _handle = echo.tell().say("hi".to_string()).then(move |result| {
        counter.fetch_add(1, Ordering::SeqCst);
        let _ = tx.lock().send(result);
    });

    let result = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(result.as_deref(), Some("hi"));
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_failure_described_and_envelope_recycled() {
    init_tracing();
    let handler = Arc::new(RecordingFailureHandler::default());
    let threads = ActorThreads::with_failure_handler(Arc::clone(&handler) as Arc<dyn FailureHandler>);
    let echo = threads.create_thread("failing").bind::<dyn Echo>(Arc::new(EchoImpl));

    echo.tell().fail("boom".to_string());

    assert!(wait_for(|| !handler.failures.lock().is_empty()));
    let failures = handler.failures.lock().clone();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].actor, "EchoImpl");
    assert_eq!(failures[0].message, ".fail(\"boom\")");
    assert_eq!(failures[0].signature, "EchoImpl.fail(\"boom\")");
    assert_eq!(failures[0].cause, "boom");

    assert!(wait_for(|| threads.transaction_pool().stats().pooled == 1));

    // The worker survives a failure reported to a non-crashing handler
    assert_eq!(echo.tell().say("after".to_string()).get().unwrap().as_deref(), Some("after"));
    assert_eq!(threads.transaction_pool().stats().reused, 1);
}

#[test]
fn test_crashed_worker_abandons_result_and_recovers() {
    init_tracing();
    let threads = ActorThreads::with_failure_handler(Arc::new(CrashEarlyFailureHandler));
    let thread = threads.create_thread("divider");
    let divider = thread.bind::<dyn Divider>(Arc::new(Checked));

    let error = divider.tell().divide(1, 0).get().unwrap_err();
    assert!(matches!(error, ActorError::ResultAbandoned { .. }));
    assert!(error.to_string().contains(".divide(1, 0)"));

    assert!(wait_for(|| thread.current_worker().is_none()));
    assert_eq!(divider.tell().divide(9, 3).get().unwrap(), Some(3));
}

#[test]
fn test_logged_failure_abandons_blocking_get() {
    let threads = ActorThreads::with_failure_handler(Arc::new(LoggingFailureHandler));
    let divider = threads.create_thread("logged").bind::<dyn Divider>(Arc::new(Checked));

    let error = divider.tell().divide(4, 0).get().unwrap_err();
    assert_eq!(error.category(), "result_abandoned");
    assert_eq!(divider.tell().divide(4, 2).get().unwrap(), Some(2));
}

#[test]
fn test_results_hop_to_foreign_loop() {
    let threads = ActorThreads::with_failure_handler(Arc::new(LoggingFailureHandler));
    let (mut main_loop, handle) = MainLoop::new();
    let ui = threads.create_looper_thread(Arc::new(handle));
    let echo = threads.create_thread("background").bind::<dyn Echo>(Arc::new(EchoImpl));
    let seen = Arc::new(Mutex::new(Vec::new()));

    for text in ["a", "b", "c"] {
        let seen = Arc::clone(&seen);
        let _handle = echo.tell().say(text.to_string()).then_on(&ui, move |result| {
            seen.lock().push((result, std::thread::current().id()));
        });
    }

    let mut turns = 0;
    while seen.lock().len() < 3 && turns < 500 {
        main_loop.run_until_idle();
        std::thread::sleep(Duration::from_millis(10));
        turns += 1;
    }

    let seen = seen.lock();
    let texts: Vec<_> = seen.iter().map(|(text, _)| text.clone().unwrap_or_default()).collect();
    assert_eq!(texts, vec!["a", "b", "c"]);
    assert!(seen.iter().all(|(_, thread)| *thread == std::thread::current().id()));
}

#[test]
fn test_direct_thread_panics_reach_caller() {
    let echo = DirectActorThread::new().bind::<dyn Echo>(Arc::new(EchoImpl));

    assert_eq!(echo.tell().say("now".to_string()).get().unwrap().as_deref(), Some("now"));
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| echo.tell().fail("direct".to_string())));
    assert!(outcome.is_err());
}
