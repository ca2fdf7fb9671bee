//! Foreign-loop binding.
//!
//! Binds implementations to a single-threaded cooperative loop this runtime
//! does not own, such as an application's main event loop. Messages are posted
//! as tasks onto the loop; its lifecycle is entirely up to its owner.

use super::Envelopes;
use super::pooled::Task;
use crate::actor_ref::{ActorThread, MessageSender};
use crate::failure::FailureHandler;
use crate::message::Message;
use crate::transaction::TransactionPool;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// Single-threaded loop accepting tasks from any thread
pub trait Looper: Send + Sync + 'static {
    /// Queue `task`; `false` when the loop no longer runs
    fn post(&self, task: Task) -> bool;
}

/// Minimal cooperative loop driven by its owner's thread.
///
/// ```rust
/// use actor_threads::MainLoop;
///
/// let (mut main_loop, handle) = MainLoop::new();
/// actor_threads::Looper::post(&handle, Box::new(|| println!("tick")));
/// assert_eq!(main_loop.run_until_idle(), 1);
/// ```
pub struct MainLoop {
    receiver: mpsc::UnboundedReceiver<Task>,
}

/// Posting side of a [`MainLoop`]
#[derive(Clone)]
pub struct LoopHandle {
    sender: mpsc::UnboundedSender<Task>,
}

impl MainLoop {
    pub fn new() -> (Self, LoopHandle) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { receiver }, LoopHandle { sender })
    }

    /// Run tasks until every handle is dropped.
    ///
    /// Blocks the calling thread; must not be called from within an async
    /// runtime.
    pub fn run(mut self) {
        while let Some(task) = self.receiver.blocking_recv() {
            task();
        }
    }

    /// Run the tasks queued right now, returning how many ran
    pub fn run_until_idle(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.receiver.try_recv() {
            task();
            ran += 1;
        }
        ran
    }
}

impl fmt::Debug for MainLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MainLoop").finish_non_exhaustive()
    }
}

impl Looper for LoopHandle {
    fn post(&self, task: Task) -> bool {
        self.sender.send(task).is_ok()
    }
}

impl fmt::Debug for LoopHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopHandle")
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

/// Actor thread posting onto a foreign loop
pub struct LooperActorThread<L: Looper> {
    looper: Arc<L>,
    envelopes: Envelopes,
}

impl<L: Looper> LooperActorThread<L> {
    pub fn new(looper: Arc<L>, pool: Arc<TransactionPool>, failure_handler: Arc<dyn FailureHandler>) -> Self {
        Self {
            looper,
            envelopes: Envelopes::new(pool, failure_handler),
        }
    }

    pub fn looper(&self) -> &Arc<L> {
        &self.looper
    }
}

impl<L: Looper> Clone for LooperActorThread<L> {
    fn clone(&self) -> Self {
        Self {
            looper: Arc::clone(&self.looper),
            envelopes: self.envelopes.clone(),
        }
    }
}

impl<L: Looper> ActorThread for LooperActorThread<L> {
    fn sender_named<T>(&self, actor: Arc<T>, actor_name: &'static str) -> Arc<dyn MessageSender<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        Arc::new(LooperSender {
            actor,
            actor_name,
            looper: Arc::clone(&self.looper),
            envelopes: self.envelopes.clone(),
        })
    }
}

struct LooperSender<T: ?Sized, L> {
    actor: Arc<T>,
    actor_name: &'static str,
    looper: Arc<L>,
    envelopes: Envelopes,
}

impl<T: ?Sized + Send + Sync + 'static, L: Looper> MessageSender<T> for LooperSender<T, L> {
    fn deliver(&self, message: Box<dyn Message<T>>) {
        let transaction = self.envelopes.wrap(&self.actor, self.actor_name, message);
        let call_site = transaction.call_site();
        if !self.looper.post(Box::new(move || transaction.execute(None))) {
            warn!(actor = self.actor_name, call_site = ?call_site, "Loop is gone, message dropped");
        }
    }
}
