//! Transaction Envelopes and Their Pool
//!
//! A [`Transaction`] carries one pending invocation from the sender to the
//! execution context: the implementation together with the message, and the
//! failure handler to report to. Envelopes are recycled into a small bounded
//! free-list owned by a [`TransactionPool`]; the pool is injected into every
//! binding at construction, there is no process-wide pool.
//!
//! # Ownership
//!
//! Between `obtain` and `recycle` an envelope is owned by exactly one
//! in-flight delivery. Recycling drops the carried invocation and failure
//! handler before the shell re-enters the free-list, so pooled shells never
//! keep implementations or messages alive.

use crate::error::ActorInvokeError;
use crate::failure::FailureHandler;
use crate::hooks::{AwakeScope, StayAwake};
use crate::message::Message;
use parking_lot::Mutex;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe, Location};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Default free-list capacity
pub const MAX_POOL_SIZE: usize = 5;

/// Type-erased pairing of an implementation with one message for it
pub(crate) trait Invocation: Send {
    fn invoke(&mut self);

    fn actor_name(&self) -> &'static str;

    fn call_site(&self) -> &'static Location<'static>;

    fn fmt_message(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;
}

/// Implementation bound to a message sent to it
pub(crate) struct BoundCall<T: ?Sized> {
    actor: Arc<T>,
    actor_name: &'static str,
    message: Box<dyn Message<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> BoundCall<T> {
    pub(crate) fn new(actor: Arc<T>, actor_name: &'static str, message: Box<dyn Message<T>>) -> Box<dyn Invocation> {
        Box::new(Self {
            actor,
            actor_name,
            message,
        })
    }
}

impl<T: ?Sized + Send + Sync + 'static> Invocation for BoundCall<T> {
    fn invoke(&mut self) {
        self.message.invoke(&self.actor);
    }

    fn actor_name(&self) -> &'static str {
        self.actor_name
    }

    fn call_site(&self) -> &'static Location<'static> {
        self.message.call_site()
    }

    fn fmt_message(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.message, f)
    }
}

/// Display adapter for the message inside an invocation
struct Described<'a>(&'a dyn Invocation);

impl fmt::Display for Described<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt_message(f)
    }
}

/// Pooled envelope of one pending invocation
pub struct Transaction {
    invocation: Option<Box<dyn Invocation>>,
    failure_handler: Option<Arc<dyn FailureHandler>>,
    home: Weak<TransactionPool>,
    next: Option<Box<Transaction>>,
}

impl Transaction {
    fn empty(home: Weak<TransactionPool>) -> Box<Self> {
        Box::new(Self {
            invocation: None,
            failure_handler: None,
            home,
            next: None,
        })
    }

    /// `Impl.method(args)` of the carried invocation, empty once recycled
    pub fn describe(&self) -> String {
        match self.invocation.as_deref() {
            Some(invocation) => format!("{}{}", invocation.actor_name(), Described(invocation)),
            None => String::new(),
        }
    }

    /// Where the carried invocation was sent from
    pub fn call_site(&self) -> Option<&'static Location<'static>> {
        self.invocation.as_deref().map(|invocation| invocation.call_site())
    }

    /// Whether the envelope currently carries an invocation
    pub fn is_loaded(&self) -> bool {
        self.invocation.is_some()
    }

    /// Run the carried invocation and recycle the envelope.
    ///
    /// A panic raised by the implementation is caught, described and handed to
    /// the failure handler; it never escapes this call by itself. Whatever the
    /// handler does (including rethrowing), the stay-awake scope is released
    /// and the envelope recycled.
    pub fn execute(self: Box<Self>, stay_awake: Option<&dyn StayAwake>) {
        let mut in_flight = InFlight(Some(self));
        let _awake = AwakeScope::enter(stay_awake);

        let Some(transaction) = in_flight.0.as_mut() else {
            return;
        };
        let handler = transaction.failure_handler.clone();
        let Some(invocation) = transaction.invocation.as_mut() else {
            return;
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| invocation.invoke()));
        if let Err(payload) = outcome {
            let invocation: &dyn Invocation = &**invocation;
            let error = ActorInvokeError::from_panic(
                invocation.actor_name(),
                Described(invocation).to_string(),
                invocation.call_site(),
                payload.as_ref(),
            );
            if let Some(handler) = handler {
                handler.on_uncaught_exception(invocation.actor_name(), &Described(invocation), error);
            }
        }
    }

    /// Clear the envelope and hand it back to the pool it came from
    pub fn recycle(mut self: Box<Self>) {
        self.invocation = None;
        self.failure_handler = None;
        match self.home.upgrade() {
            Some(pool) => pool.release(self),
            None => drop(self),
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("call", &self.describe())
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

/// Recycles the envelope when execution leaves scope, unwinding or not
struct InFlight(Option<Box<Transaction>>);

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Some(transaction) = self.0.take() {
            transaction.recycle();
        }
    }
}

/// Pool usage counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Envelopes created because the free-list was empty
    pub allocated: u64,
    /// Envelopes handed out from the free-list
    pub reused: u64,
    /// Envelopes currently pooled
    pub pooled: usize,
}

/// Bounded free-list of envelopes
#[derive(Default)]
struct FreeList {
    top: Option<Box<Transaction>>,
    size: usize,
}

/// Envelope pool with a fixed free-list capacity.
///
/// `obtain` never blocks beyond the pool lock and falls back to allocation
/// when the free-list is empty; `recycle` drops envelopes beyond capacity.
pub struct TransactionPool {
    capacity: usize,
    free: Mutex<FreeList>,
    allocated: AtomicU64,
    reused: AtomicU64,
}

impl TransactionPool {
    /// Create a pool with the default capacity
    pub fn new() -> Arc<Self> {
        Self::with_capacity(MAX_POOL_SIZE)
    }

    /// Create a pool keeping at most `capacity` recycled envelopes
    pub fn with_capacity(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity,
            free: Mutex::new(FreeList::default()),
            allocated: AtomicU64::new(0),
            reused: AtomicU64::new(0),
        })
    }

    pub(crate) fn obtain(
        self: &Arc<Self>,
        invocation: Box<dyn Invocation>,
        failure_handler: Arc<dyn FailureHandler>,
    ) -> Box<Transaction> {
        let mut transaction = self.pop().unwrap_or_else(|| {
            self.allocated.fetch_add(1, Ordering::Relaxed);
            Transaction::empty(Arc::downgrade(self))
        });
        transaction.invocation = Some(invocation);
        transaction.failure_handler = Some(failure_handler);
        transaction
    }

    fn pop(&self) -> Option<Box<Transaction>> {
        let mut free = self.free.lock();
        let mut top = free.top.take()?;
        free.top = top.next.take();
        free.size -= 1;
        self.reused.fetch_add(1, Ordering::Relaxed);
        Some(top)
    }

    fn release(&self, mut transaction: Box<Transaction>) {
        let mut free = self.free.lock();
        if free.size < self.capacity {
            transaction.next = free.top.take();
            free.top = Some(transaction);
            free.size += 1;
        }
    }

    /// Free-list capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every pooled envelope
    pub fn clear(&self) {
        let mut free = self.free.lock();
        let mut top = free.top.take();
        free.size = 0;
        while let Some(mut transaction) = top {
            top = transaction.next.take();
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.allocated.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            pooled: self.free.lock().size,
        }
    }
}

impl fmt::Debug for TransactionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionPool")
            .field("capacity", &self.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}
