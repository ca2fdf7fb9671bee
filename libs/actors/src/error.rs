//! Runtime Error Types
//!
//! Errors that can reach a caller of the runtime. Delivery rejections are not
//! part of this taxonomy: bindings recover from them internally.

use std::any::Any;
use std::fmt;
use std::panic::Location;
use thiserror::Error;

/// Main runtime error type
#[derive(Error, Debug)]
pub enum ActorError {
    /// Backing OS thread could not be started
    #[error("Failed to spawn thread '{thread}': {source}")]
    Spawn {
        thread: String,
        source: std::io::Error,
    },

    /// Tokio runtime backing a worker or a pool could not be built
    #[error("Failed to build runtime for '{thread}': {source}")]
    Runtime {
        thread: String,
        source: std::io::Error,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Out-of-process peer could not be started
    #[error("Service launch failed for job {job_id}: {message}")]
    Launch { job_id: u32, message: String },

    /// The call behind a blocking `get()` was dropped without producing a result
    #[error("Result abandoned: {call}")]
    ResultAbandoned { call: String },
}

/// Result type alias for runtime operations
pub type Result<T> = std::result::Result<T, ActorError>;

impl ActorError {
    /// Create a spawn error
    pub fn spawn(thread: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            thread: thread.into(),
            source,
        }
    }

    /// Create a runtime construction error
    pub fn runtime(thread: impl Into<String>, source: std::io::Error) -> Self {
        Self::Runtime {
            thread: thread.into(),
            source,
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(str::to_string),
        }
    }

    /// Create a launch error
    pub fn launch(job_id: u32, message: impl Into<String>) -> Self {
        Self::Launch {
            job_id,
            message: message.into(),
        }
    }

    /// Create a result-abandoned error
    pub fn result_abandoned(call: impl Into<String>) -> Self {
        Self::ResultAbandoned { call: call.into() }
    }

    /// Short category label for structured logs
    pub fn category(&self) -> &'static str {
        match self {
            Self::Spawn { .. } => "spawn",
            Self::Runtime { .. } => "runtime",
            Self::Configuration { .. } => "configuration",
            Self::Launch { .. } => "launch",
            Self::ResultAbandoned { .. } => "result_abandoned",
        }
    }
}

/// Described failure of one actor method invocation.
///
/// Built on the executing thread from the panic raised by the implementation
/// and handed to the [`FailureHandler`](crate::FailureHandler). The display
/// form reads `EchoImpl.say("hi") failed: boom (called at src/main.rs:10:5)`.
#[derive(Debug, Clone)]
pub struct ActorInvokeError {
    actor: &'static str,
    call: String,
    call_site: &'static Location<'static>,
    cause: String,
}

impl ActorInvokeError {
    pub(crate) fn new(
        actor: &'static str,
        call: String,
        call_site: &'static Location<'static>,
        cause: String,
    ) -> Self {
        Self {
            actor,
            call,
            call_site,
            cause,
        }
    }

    /// Build from a panic payload caught at the execution boundary
    pub(crate) fn from_panic(
        actor: &'static str,
        call: String,
        call_site: &'static Location<'static>,
        payload: &(dyn Any + Send),
    ) -> Self {
        Self::new(actor, call, call_site, panic_message(payload))
    }

    /// Simple type name of the implementation the message was sent to
    pub fn actor(&self) -> &'static str {
        self.actor
    }

    /// Message description, e.g. `.say("hi")`
    pub fn call(&self) -> &str {
        &self.call
    }

    /// Where the proxy method was called
    pub fn call_site(&self) -> &'static Location<'static> {
        self.call_site
    }

    /// Text of the original panic
    pub fn cause(&self) -> &str {
        &self.cause
    }

    /// Full method signature: implementation name followed by the message description
    pub fn signature(&self) -> String {
        format!("{}{}", self.actor, self.call)
    }
}

impl fmt::Display for ActorInvokeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{} failed: {} (called at {})",
            self.actor, self.call, self.cause, self.call_site
        )
    }
}

impl std::error::Error for ActorInvokeError {}

/// Extract readable text from a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else if let Some(error) = payload.downcast_ref::<ActorInvokeError>() {
        error.to_string()
    } else {
        "non-string panic payload".to_string()
    }
}
