//! Common Test Utilities for Actor Bindings
//!
//! Shared interfaces, recording failure handlers and wait helpers.

#![allow(dead_code)]

use actor_threads::{actor_interface, ActorInvokeError, FailureHandler, Promise};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Once;
use std::time::Duration;

static TRACING: Once = Once::new();

/// Route runtime logs to the test output, filtered by `RUST_LOG`
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

actor_interface! {
    /// Answers with what it was told
    pub trait Echo {
        fn say(&self, text: String) -> Promise<String>;
        fn fail(&self, reason: String);
    }
}

pub struct EchoImpl;

impl Echo for EchoImpl {
    fn say(&self, text: String) -> Promise<String> {
        Promise::wrap(text)
    }

    fn fail(&self, reason: String) {
        panic!("{}", reason);
    }
}

/// Failure recorded by [`RecordingFailureHandler`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded {
    pub actor: &'static str,
    pub message: String,
    pub signature: String,
    pub cause: String,
}

/// Keeps every reported failure
#[derive(Default)]
pub struct RecordingFailureHandler {
    pub failures: Mutex<Vec<Recorded>>,
}

impl FailureHandler for RecordingFailureHandler {
    fn on_uncaught_exception(&self, actor: &'static str, message: &dyn fmt::Display, error: ActorInvokeError) {
        self.failures.lock().push(Recorded {
            actor,
            message: message.to_string(),
            signature: error.signature(),
            cause: error.cause().to_string(),
        });
    }
}

/// Poll `condition` for up to five seconds
pub fn wait_for(condition: impl Fn() -> bool) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}
