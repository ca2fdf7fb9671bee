//! Promises and Result Delivery
//!
//! Proxy methods that produce a value return a [`Promise`]. Nothing is sent to
//! the actor until the caller says what should happen with the result:
//!
//! - [`Promise::then_nothing`] runs the call and discards the result
//! - [`Promise::then`] hands the result to a listener on the actor's thread
//! - [`Promise::then_on`] hands it to a listener on another actor thread
//! - [`Promise::get`] blocks the caller until the result arrives
//!
//! Implementations answer with an already resolved promise built by
//! [`Promise::wrap`], [`Promise::wrap_with_cleaner`] or [`Promise::empty`].
//!
//! # Cleaners
//!
//! A resolved value paired with a cleaner is passed to exactly one of the
//! listener or the cleaner. The cleaner runs when the value is dropped
//! unclaimed: no listener was attached, the listener was forgotten before
//! delivery, or the promise itself was forgotten. An empty result never
//! reaches the cleaner.

use crate::actor_ref::{ActorThread, MessageSender};
use crate::error::{ActorError, Result};
use crate::message::Message;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Disposal function for a result nobody claimed
pub type Cleaner<R> = Box<dyn FnOnce(R) + Send>;

/// Receives the result of a call, `None` for an empty result
pub type Listener<R> = Box<dyn FnOnce(Option<R>) + Send>;

/// Resolved value that still owes its cleaner a call unless claimed
pub(crate) struct Unclaimed<R> {
    result: Option<R>,
    cleaner: Option<Cleaner<R>>,
}

impl<R> Unclaimed<R> {
    fn new(result: Option<R>, cleaner: Option<Cleaner<R>>) -> Self {
        Self { result, cleaner }
    }

    fn claim(mut self) -> Option<R> {
        self.cleaner = None;
        self.result.take()
    }
}

impl<R> Drop for Unclaimed<R> {
    fn drop(&mut self) {
        if let (Some(result), Some(cleaner)) = (self.result.take(), self.cleaner.take()) {
            cleaner(result);
        }
    }
}

/// Single-use listener holder shared between a call and its [`ActionHandle`]
pub struct ListenerSlot<R> {
    listener: Mutex<Option<Listener<R>>>,
}

impl<R: Send + 'static> ListenerSlot<R> {
    fn new(listener: Option<Listener<R>>) -> Arc<Self> {
        Arc::new(Self {
            listener: Mutex::new(listener),
        })
    }

    /// Hand the value to the listener, or drop it unclaimed when there is none
    pub(crate) fn deliver_result(&self, unclaimed: Unclaimed<R>) {
        let listener = self.listener.lock().take();
        match listener {
            Some(listener) => listener(unclaimed.claim()),
            None => drop(unclaimed),
        }
    }
}

trait Forget: Send + Sync {
    fn forget(&self);
}

impl<R: Send + 'static> Forget for ListenerSlot<R> {
    fn forget(&self) {
        let listener = self.listener.lock().take();
        drop(listener);
    }
}

/// Handle to a call whose result is awaited by a listener
#[derive(Clone, Default)]
pub struct ActionHandle {
    slot: Option<Arc<dyn Forget>>,
}

impl ActionHandle {
    fn attached<R: Send + 'static>(slot: Arc<ListenerSlot<R>>) -> Self {
        Self { slot: Some(slot) }
    }

    /// Handle of a result that was already delivered
    pub fn done() -> Self {
        Self::default()
    }

    /// Drop the listener so it, and whatever it captured, can be released.
    ///
    /// Advisory: a delivery already running is not interrupted. A result that
    /// arrives afterwards is treated as unclaimed and goes to its cleaner.
    pub fn forget(&self) {
        if let Some(slot) = &self.slot {
            slot.forget();
        }
    }
}

impl fmt::Debug for ActionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionHandle")
            .field("attached", &self.slot.is_some())
            .finish()
    }
}

/// Where a produced result goes
pub(crate) enum ResultTarget<R> {
    /// Straight into the slot, on the thread that produced the result
    Direct(Arc<ListenerSlot<R>>),
    /// As a message to the slot bound on another actor thread
    Redirect(Arc<dyn MessageSender<ListenerSlot<R>>>),
}

impl<R: Send + 'static> ResultTarget<R> {
    fn deliver(self, unclaimed: Unclaimed<R>, call_site: &'static Location<'static>) {
        match self {
            Self::Direct(slot) => slot.deliver_result(unclaimed),
            Self::Redirect(sender) => sender.deliver(Box::new(DeliverResult {
                unclaimed: Some(unclaimed),
                call_site,
            })),
        }
    }
}

/// Message carrying a result to a listener slot on its target thread
struct DeliverResult<R> {
    unclaimed: Option<Unclaimed<R>>,
    call_site: &'static Location<'static>,
}

impl<R: Send + 'static> Message<ListenerSlot<R>> for DeliverResult<R> {
    fn invoke(&mut self, target: &ListenerSlot<R>) {
        if let Some(unclaimed) = self.unclaimed.take() {
            target.deliver_result(unclaimed);
        }
    }

    fn call_site(&self) -> &'static Location<'static> {
        self.call_site
    }
}

impl<R> fmt::Display for DeliverResult<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(".deliverResult()")
    }
}

/// Boxed method closure of a call producing a value
pub type RequestCall<T, R> = Box<dyn FnOnce(&T) -> Promise<R> + Send>;

/// Message for a method that returns a promise
pub struct PromiseCall<T: ?Sized, R> {
    method: &'static str,
    args: String,
    call_site: &'static Location<'static>,
    call: Option<RequestCall<T, R>>,
    target: Option<ResultTarget<R>>,
}

impl<T: ?Sized, R> PromiseCall<T, R> {
    pub fn new(
        method: &'static str,
        args: String,
        call_site: &'static Location<'static>,
        call: impl FnOnce(&T) -> Promise<R> + Send + 'static,
    ) -> Self {
        Self {
            method,
            args,
            call_site,
            call: Some(Box::new(call)),
            target: None,
        }
    }
}

impl<T: ?Sized, R: Send + 'static> Message<T> for PromiseCall<T, R> {
    fn invoke(&mut self, target: &T) {
        let Some(call) = self.call.take() else {
            return;
        };
        let unclaimed = match call(target).state {
            State::Resolved(unclaimed) => unclaimed,
            State::Pending(pending) => panic!(
                "Actor methods must answer with a resolved promise, {} returned pending {}",
                self,
                pending.describe()
            ),
        };
        match self.target.take() {
            Some(result_target) => result_target.deliver(unclaimed, self.call_site),
            None => drop(unclaimed),
        }
    }

    fn call_site(&self) -> &'static Location<'static> {
        self.call_site
    }
}

impl<T: ?Sized, R> fmt::Display for PromiseCall<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ".{}({})", self.method, self.args)
    }
}

/// A call not yet sent to its actor
trait PendingCall<R>: Send {
    fn dispatch(self: Box<Self>, target: Option<ResultTarget<R>>);

    fn describe(&self) -> String;
}

struct Outbound<T: ?Sized, R> {
    sender: Arc<dyn MessageSender<T>>,
    call: PromiseCall<T, R>,
}

impl<T: ?Sized + Send + Sync + 'static, R: Send + 'static> PendingCall<R> for Outbound<T, R> {
    fn dispatch(self: Box<Self>, target: Option<ResultTarget<R>>) {
        let Outbound { sender, mut call } = *self;
        call.target = target;
        sender.deliver(Box::new(call));
    }

    fn describe(&self) -> String {
        self.call.to_string()
    }
}

enum State<R> {
    Resolved(Unclaimed<R>),
    Pending(Box<dyn PendingCall<R>>),
}

/// Future-like handle of a call result.
///
/// Every consuming operation takes the promise by value, so each promise is
/// demanded at most once.
#[must_use = "a promise returned by an actor proxy does nothing until it is consumed"]
pub struct Promise<R> {
    state: State<R>,
}

impl<R: Send + 'static> Promise<R> {
    /// Resolved promise holding `result`
    pub fn wrap(result: R) -> Self {
        Self::resolved(Some(result), None)
    }

    /// Resolved promise whose value goes to `cleaner` if nobody claims it
    pub fn wrap_with_cleaner(result: R, cleaner: impl FnOnce(R) + Send + 'static) -> Self {
        Self::resolved(Some(result), Some(Box::new(cleaner)))
    }

    /// Resolved promise without a value
    pub fn empty() -> Self {
        Self::resolved(None, None)
    }

    fn resolved(result: Option<R>, cleaner: Option<Cleaner<R>>) -> Self {
        Self {
            state: State::Resolved(Unclaimed::new(result, cleaner)),
        }
    }

    /// Promise of a call that is sent through `sender` once demanded
    pub fn request<T>(sender: Arc<dyn MessageSender<T>>, call: PromiseCall<T, R>) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        Self {
            state: State::Pending(Box::new(Outbound { sender, call })),
        }
    }

    /// Whether the value is already present
    pub fn is_resolved(&self) -> bool {
        matches!(self.state, State::Resolved(_))
    }

    /// Run the call and discard its result through the cleaner
    pub fn then_nothing(self) {
        match self.state {
            State::Resolved(unclaimed) => drop(unclaimed),
            State::Pending(pending) => pending.dispatch(None),
        }
    }

    /// Deliver the result to `listener` on the thread that produces it
    pub fn then(self, listener: impl FnOnce(Option<R>) + Send + 'static) -> ActionHandle {
        match self.state {
            State::Resolved(unclaimed) => {
                listener(unclaimed.claim());
                ActionHandle::done()
            }
            State::Pending(pending) => {
                let slot = ListenerSlot::new(Some(Box::new(listener)));
                pending.dispatch(Some(ResultTarget::Direct(Arc::clone(&slot))));
                ActionHandle::attached(slot)
            }
        }
    }

    /// Deliver the result to `listener` as a message on `thread`.
    ///
    /// The listener is bound to `thread` before the call is sent, so it runs
    /// there even though the result is produced elsewhere.
    #[track_caller]
    pub fn then_on<A: ActorThread>(self, thread: &A, listener: impl FnOnce(Option<R>) + Send + 'static) -> ActionHandle {
        let call_site = Location::caller();
        let slot = ListenerSlot::new(Some(Box::new(listener)));
        let sender = thread.sender_named(Arc::clone(&slot), "ResultListener");
        match self.state {
            State::Resolved(unclaimed) => ResultTarget::Redirect(sender).deliver(unclaimed, call_site),
            State::Pending(pending) => pending.dispatch(Some(ResultTarget::Redirect(sender))),
        }
        ActionHandle::attached(slot)
    }

    /// Block until the result is available.
    ///
    /// Deadlocks when called on the thread that is expected to produce the
    /// result. Fails with [`ActorError::ResultAbandoned`] when the call is
    /// dropped without producing a value, e.g. because its worker crashed.
    pub fn get(self) -> Result<Option<R>> {
        let pending = match self.state {
            State::Resolved(unclaimed) => return Ok(unclaimed.claim()),
            State::Pending(pending) => pending,
        };

        let completion = Arc::new(Completion::new());
        let reporter = Reporter {
            completion: Arc::clone(&completion),
        };
        let description = pending.describe();
        let slot = ListenerSlot::new(Some(Box::new(move |result| reporter.complete(result))));
        pending.dispatch(Some(ResultTarget::Direct(slot)));

        completion
            .wait()
            .ok_or_else(|| ActorError::result_abandoned(description))
    }

    /// Release the promise without demanding its result.
    ///
    /// A resolved value goes to its cleaner. A call that was never demanded is
    /// never sent.
    pub fn forget(self) {
        match self.state {
            State::Resolved(unclaimed) => drop(unclaimed),
            State::Pending(pending) => drop(pending),
        }
    }
}

impl<R> fmt::Debug for Promise<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            State::Resolved(unclaimed) => f
                .debug_struct("Promise")
                .field("resolved", &true)
                .field("has_value", &unclaimed.result.is_some())
                .finish(),
            State::Pending(pending) => f
                .debug_struct("Promise")
                .field("resolved", &false)
                .field("call", &pending.describe())
                .finish(),
        }
    }
}

enum Outcome<R> {
    Waiting,
    Delivered(Option<R>),
    Abandoned,
}

/// Monitor a blocking `get` waits on
struct Completion<R> {
    outcome: Mutex<Outcome<R>>,
    ready: Condvar,
}

impl<R> Completion<R> {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(Outcome::Waiting),
            ready: Condvar::new(),
        }
    }

    fn settle(&self, outcome: Outcome<R>) {
        let mut current = self.outcome.lock();
        if matches!(*current, Outcome::Waiting) {
            *current = outcome;
            self.ready.notify_all();
        }
    }

    /// `None` when the call was abandoned
    fn wait(&self) -> Option<Option<R>> {
        let mut outcome = self.outcome.lock();
        while matches!(*outcome, Outcome::Waiting) {
            self.ready.wait(&mut outcome);
        }
        match std::mem::replace(&mut *outcome, Outcome::Abandoned) {
            Outcome::Delivered(result) => Some(result),
            Outcome::Waiting | Outcome::Abandoned => None,
        }
    }
}

/// Settles the completion, as abandoned if dropped before delivery
struct Reporter<R> {
    completion: Arc<Completion<R>>,
}

impl<R> Reporter<R> {
    fn complete(self, result: Option<R>) {
        self.completion.settle(Outcome::Delivered(result));
    }
}

impl<R> Drop for Reporter<R> {
    fn drop(&mut self) {
        self.completion.settle(Outcome::Abandoned);
    }
}
