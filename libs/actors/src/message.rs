//! Actor Messages
//!
//! A message is one pending call against an actor implementation: the method
//! closure with its captured arguments, a printable description used for
//! diagnostics and the call site of the proxy method that produced it.
//!
//! Messages are produced by proxies generated with
//! [`actor_interface!`](crate::actor_interface) and consumed exactly once by
//! whatever execution context the binding routes them to.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::panic::Location;

/// One pending call against an implementation of `T`
pub trait Message<T: ?Sized>: Send + fmt::Display {
    /// Run the call against `target`.
    ///
    /// Invoking a message a second time is a no-op: the captured call is
    /// consumed by the first invocation.
    fn invoke(&mut self, target: &T);

    /// Where the proxy method producing this message was called
    fn call_site(&self) -> &'static Location<'static>;
}

/// Boxed method closure of a fire-and-forget call
pub type Call<T> = Box<dyn FnOnce(&T) + Send>;

/// Message for a method that returns nothing
pub struct CallMessage<T: ?Sized> {
    method: &'static str,
    args: String,
    call_site: &'static Location<'static>,
    call: Option<Call<T>>,
}

impl<T: ?Sized> CallMessage<T> {
    /// Create a message from an already formatted argument list
    pub fn new(
        method: &'static str,
        args: String,
        call_site: &'static Location<'static>,
        call: impl FnOnce(&T) + Send + 'static,
    ) -> Self {
        Self {
            method,
            args,
            call_site,
            call: Some(Box::new(call)),
        }
    }

    /// Method name this message calls
    pub fn method(&self) -> &'static str {
        self.method
    }
}

impl<T: ?Sized> Message<T> for CallMessage<T> {
    fn invoke(&mut self, target: &T) {
        if let Some(call) = self.call.take() {
            call(target);
        }
    }

    fn call_site(&self) -> &'static Location<'static> {
        self.call_site
    }
}

impl<T: ?Sized> fmt::Display for CallMessage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ".{}({})", self.method, self.args)
    }
}

/// How much of an argument value may appear in a message description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Redaction {
    /// Full `Debug` rendering
    #[default]
    Full,
    /// Only the fact that a value was passed
    Presence,
    /// Nothing at all
    Hidden,
}

/// Argument wrapper applying a [`Redaction`] level to its `Debug` output.
///
/// Actor interfaces use it as the declared argument type for sensitive data:
///
/// ```rust
/// use actor_threads::{Redacted, Redaction};
///
/// let token = Redacted::new("secret".to_string(), Redaction::Presence);
/// assert_eq!(format!("{:?}", token), "<present>");
/// assert_eq!(token.as_str(), "secret");
/// ```
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Redacted<T> {
    value: T,
    redaction: Redaction,
}

impl<T> Redacted<T> {
    pub fn new(value: T, redaction: Redaction) -> Self {
        Self { value, redaction }
    }

    /// Shorthand for [`Redaction::Presence`]
    pub fn presence(value: T) -> Self {
        Self::new(value, Redaction::Presence)
    }

    /// Shorthand for [`Redaction::Hidden`]
    pub fn hidden(value: T) -> Self {
        Self::new(value, Redaction::Hidden)
    }

    pub fn redaction(&self) -> Redaction {
        self.redaction
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> Deref for Redacted<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for Redacted<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T: fmt::Debug> fmt::Debug for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.redaction {
            Redaction::Full => self.value.fmt(f),
            Redaction::Presence => f.write_str("<present>"),
            Redaction::Hidden => f.write_str("<hidden>"),
        }
    }
}

/// Render a call's argument list the way message descriptions show it
pub fn describe_args(args: &[&dyn fmt::Debug]) -> String {
    let mut out = String::new();
    for (index, arg) in args.iter().enumerate() {
        if index > 0 {
            out.push_str(", ");
        }
        out.push_str(&format!("{:?}", arg));
    }
    out
}

/// Strip module paths from a type name: `app::db::Store<u8>` becomes `Store<u8>`
#[doc(hidden)]
pub fn simple_type_name(full: &'static str) -> &'static str {
    let base = match full.find('<') {
        Some(generics) => &full[..generics],
        None => full,
    };
    match base.rfind("::") {
        Some(separator) => &full[separator + 2..],
        None => full,
    }
}
