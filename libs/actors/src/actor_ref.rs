//! Actor References and Binding Contract
//!
//! An [`ActorThread`] turns an implementation into an [`ActorRef`]: a handle
//! exposing the same interface whose every method call is packed into a
//! message and delivered through a [`MessageSender`] instead of being run in
//! place. The proxy side of the interface is generated by
//! [`actor_interface!`](crate::actor_interface) as [`ActorProxy`].

use crate::message::{simple_type_name, CallMessage, Message};
use crate::promise::{Promise, PromiseCall};
use std::fmt;
use std::ops::Deref;
use std::panic::Location;
use std::sync::Arc;

/// Delivery target for messages addressed to one bound implementation of `T`
pub trait MessageSender<T: ?Sized>: Send + Sync {
    /// Route `message` towards the implementation. Never blocks and never fails
    /// at the call site; rejections are recovered by the binding.
    fn deliver(&self, message: Box<dyn Message<T>>);
}

/// Interface that can be bound to an actor thread.
///
/// Implemented for `dyn Trait` by [`actor_interface!`](crate::actor_interface).
pub trait ActorInterface: Send + Sync + 'static {
    /// Proxy implementing the interface by sending through `sender`
    fn proxy(sender: Arc<dyn MessageSender<Self>>) -> Arc<Self>;

    /// Name of the interface trait
    fn interface_name() -> &'static str;

    /// Simple type name of the concrete implementation behind `self`
    fn actor_name(&self) -> &'static str;
}

/// Binding strategy of implementations to an execution context
pub trait ActorThread: Send + Sync {
    /// Sender delivering messages to `actor` on this thread, reported as
    /// `actor_name` in diagnostics
    fn sender_named<T>(&self, actor: Arc<T>, actor_name: &'static str) -> Arc<dyn MessageSender<T>>
    where
        T: ?Sized + Send + Sync + 'static;

    /// Sender delivering messages to `actor` on this thread
    fn sender<T: Send + Sync + 'static>(&self, actor: Arc<T>) -> Arc<dyn MessageSender<T>> {
        self.sender_named(actor, simple_type_name(std::any::type_name::<T>()))
    }

    /// Bind `actor` and return a reference whose calls run on this thread
    fn bind<T: ActorInterface + ?Sized>(&self, actor: Arc<T>) -> ActorRef<T> {
        let name = T::actor_name(&actor);
        ActorRef::new(T::proxy(self.sender_named(actor, name)))
    }
}

/// Reference to a bound actor
pub struct ActorRef<T: ?Sized> {
    target: Arc<T>,
}

impl<T: ?Sized> ActorRef<T> {
    pub fn new(target: Arc<T>) -> Self {
        Self { target }
    }

    /// Interface to send messages through
    pub fn tell(&self) -> &T {
        &self.target
    }
}

impl<T: ?Sized> Clone for ActorRef<T> {
    fn clone(&self) -> Self {
        Self {
            target: Arc::clone(&self.target),
        }
    }
}

impl<T: ?Sized> Deref for ActorRef<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.target
    }
}

impl<T: ActorInterface + ?Sized> fmt::Debug for ActorRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorRef")
            .field("interface", &T::interface_name())
            .finish()
    }
}

/// Message-producing implementation of an actor interface.
///
/// Generated interface impls call [`ActorProxy::send`] for methods without a
/// result and [`ActorProxy::request`] for methods returning a [`Promise`].
pub struct ActorProxy<T: ?Sized> {
    sender: Arc<dyn MessageSender<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> ActorProxy<T> {
    pub fn new(sender: Arc<dyn MessageSender<T>>) -> Self {
        Self { sender }
    }

    /// Deliver a fire-and-forget call
    pub fn send(
        &self,
        method: &'static str,
        args: String,
        call_site: &'static Location<'static>,
        call: impl FnOnce(&T) + Send + 'static,
    ) {
        self.sender
            .deliver(Box::new(CallMessage::new(method, args, call_site, call)));
    }

    /// Promise of a call producing a value, sent once the promise is demanded
    pub fn request<R: Send + 'static>(
        &self,
        method: &'static str,
        args: String,
        call_site: &'static Location<'static>,
        call: impl FnOnce(&T) -> Promise<R> + Send + 'static,
    ) -> Promise<R> {
        Promise::request(
            Arc::clone(&self.sender),
            PromiseCall::new(method, args, call_site, call),
        )
    }
}
