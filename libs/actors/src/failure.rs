//! Failure Handlers
//!
//! Sink for panics raised while an actor method runs. The execution boundary
//! catches the panic, describes the failed call and hands it here exactly once.

use crate::error::ActorInvokeError;
use std::fmt;
use tracing::error;

/// Receives described invocation failures
pub trait FailureHandler: Send + Sync + 'static {
    /// Called once per failing invocation, on the thread that ran it.
    ///
    /// `actor` is the simple type name of the implementation and `message` the
    /// description of the call that failed.
    fn on_uncaught_exception(&self, actor: &'static str, message: &dyn fmt::Display, error: ActorInvokeError);
}

/// Default policy: rethrow on the executing thread.
///
/// The described error becomes the panic payload, so whoever observes the
/// unwinding thread can downcast it back to [`ActorInvokeError`].
#[derive(Debug, Default, Clone, Copy)]
pub struct CrashEarlyFailureHandler;

impl FailureHandler for CrashEarlyFailureHandler {
    fn on_uncaught_exception(&self, actor: &'static str, message: &dyn fmt::Display, error: ActorInvokeError) {
        error!(
            actor = actor,
            call = %message,
            call_site = %error.call_site(),
            cause = error.cause(),
            "Actor method failed, crashing executing thread"
        );
        std::panic::resume_unwind(Box::new(error));
    }
}

/// Logs the failure and lets the executing thread carry on
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingFailureHandler;

impl FailureHandler for LoggingFailureHandler {
    fn on_uncaught_exception(&self, actor: &'static str, message: &dyn fmt::Display, error: ActorInvokeError) {
        error!(
            actor = actor,
            call = %message,
            call_site = %error.call_site(),
            cause = error.cause(),
            "Actor method failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe, Location};

    fn failure() -> ActorInvokeError {
        ActorInvokeError::new("Impl", ".a()".to_string(), Location::caller(), "boom".to_string())
    }

    #[test]
    fn test_crash_early_rethrows_same_error() {
        let handler = CrashEarlyFailureHandler;
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            handler.on_uncaught_exception("Impl", &".a()", failure());
        }));

        let payload = outcome.unwrap_err();
        let error = payload.downcast_ref::<ActorInvokeError>().unwrap();
        assert_eq!(error.signature(), "Impl.a()");
        assert_eq!(error.cause(), "boom");
    }

    #[test]
    fn test_logging_handler_returns() {
        LoggingFailureHandler.on_uncaught_exception("Impl", &".a()", failure());
    }
}
