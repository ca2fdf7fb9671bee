//! Dedicated-worker binding.
//!
//! Every implementation bound to a [`DedicatedActorThread`] shares one lazily
//! started [`Worker`]. When the worker retires on its idle timeout the next
//! delivery starts a replacement.

use super::Envelopes;
use crate::actor_ref::{ActorThread, MessageSender};
use crate::failure::FailureHandler;
use crate::message::Message;
use crate::transaction::{Transaction, TransactionPool};
use crate::worker::{StopHook, Worker, WorkerOptions};
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, error, warn};

/// Actor thread backed by a dedicated OS thread
#[derive(Clone)]
pub struct DedicatedActorThread {
    core: Arc<DedicatedCore>,
}

impl DedicatedActorThread {
    pub fn new(options: WorkerOptions, pool: Arc<TransactionPool>, failure_handler: Arc<dyn FailureHandler>) -> Self {
        Self {
            core: Arc::new(DedicatedCore {
                options,
                envelopes: Envelopes::new(pool, failure_handler),
                worker: Mutex::new(None),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.core.options.name
    }

    /// Worker currently backing this thread, if one is running
    pub fn current_worker(&self) -> Option<Arc<Worker>> {
        self.core.worker.lock().clone()
    }
}

impl fmt::Debug for DedicatedActorThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DedicatedActorThread")
            .field("name", &self.core.options.name)
            .field("idle_timeout", &self.core.options.idle_timeout)
            .field("worker", &self.current_worker())
            .finish()
    }
}

impl ActorThread for DedicatedActorThread {
    fn sender_named<T>(&self, actor: Arc<T>, actor_name: &'static str) -> Arc<dyn MessageSender<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        Arc::new(DedicatedSender {
            actor,
            actor_name,
            core: Arc::clone(&self.core),
        })
    }
}

struct DedicatedSender<T: ?Sized> {
    actor: Arc<T>,
    actor_name: &'static str,
    core: Arc<DedicatedCore>,
}

impl<T: ?Sized + Send + Sync + 'static> MessageSender<T> for DedicatedSender<T> {
    fn deliver(&self, message: Box<dyn Message<T>>) {
        let transaction = self.core.envelopes.wrap(&self.actor, self.actor_name, message);
        self.core.deliver(transaction);
    }
}

struct DedicatedCore {
    options: WorkerOptions,
    envelopes: Envelopes,
    worker: Mutex<Option<Arc<Worker>>>,
}

impl DedicatedCore {
    fn deliver(self: &Arc<Self>, transaction: Box<Transaction>) {
        let current = self.worker.lock().clone();
        let transaction = match current {
            Some(worker) => match worker.send_transaction(transaction) {
                Ok(()) => return,
                Err(rejected) => rejected,
            },
            None => transaction,
        };

        let mut slot = self.worker.lock();
        // Another sender may have replaced the worker in the meantime
        let transaction = match slot.as_ref() {
            Some(worker) => match worker.send_transaction(transaction) {
                Ok(()) => return,
                Err(rejected) => rejected,
            },
            None => transaction,
        };

        let worker = match Worker::spawn(self.options.clone(), Some(self.stop_hook())) {
            Ok(worker) => Arc::new(worker),
            Err(e) => {
                error!(
                    thread = %self.options.name,
                    error = %e,
                    call = %transaction.describe(),
                    "Failed to start worker, dropping message"
                );
                transaction.recycle();
                return;
            }
        };
        if let Err(rejected) = worker.send_transaction(transaction) {
            warn!(worker = %worker.id(), call = %rejected.describe(), "Fresh worker rejected message");
            rejected.recycle();
        }
        *slot = Some(worker);
    }

    /// Clears the slot if it still holds the retiring worker
    fn stop_hook(self: &Arc<Self>) -> StopHook {
        let core: Weak<Self> = Arc::downgrade(self);
        Box::new(move |id| {
            let Some(core) = core.upgrade() else {
                return;
            };
            let retired = {
                let mut slot = core.worker.lock();
                match slot.as_ref() {
                    Some(worker) if worker.id() == id => slot.take(),
                    _ => None,
                }
            };
            if retired.is_some() {
                debug!(thread = %core.options.name, worker = %id, "Released retired worker");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::LoggingFailureHandler;
    use crate::{actor_interface, Promise};
    use std::sync::mpsc;
    use std::thread::ThreadId;
    use std::time::Duration;

    actor_interface! {
        trait Tracker {
            fn visit(&self, value: u32);
            fn where_am_i(&self) -> Promise<ThreadId>;
        }
    }

    struct Visits {
        sink: Mutex<mpsc::Sender<(u32, ThreadId)>>,
    }

    impl Tracker for Visits {
        fn visit(&self, value: u32) {
            let _ = self.sink.lock().send((value, std::thread::current().id()));
        }

        fn where_am_i(&self) -> Promise<ThreadId> {
            Promise::wrap(std::thread::current().id())
        }
    }

    fn thread(idle_timeout: Option<Duration>) -> DedicatedActorThread {
        DedicatedActorThread::new(
            WorkerOptions::named("dedicated-test").idle_timeout(idle_timeout),
            TransactionPool::new(),
            Arc::new(LoggingFailureHandler),
        )
    }

    fn visits() -> (Arc<dyn Tracker>, mpsc::Receiver<(u32, ThreadId)>) {
        let (tx, rx) = mpsc::channel();
        (Arc::new(Visits { sink: Mutex::new(tx) }), rx)
    }

    #[test]
    fn test_worker_started_lazily() {
        let thread = thread(None);
        let (actor, rx) = visits();
        let tracker = thread.bind(actor);
        assert!(thread.current_worker().is_none());

        tracker.tell().visit(1);
        let (value, runner) = rx.recv_timeout(Duration::from_secs(5)).unwrap();

        assert_eq!(value, 1);
        assert_ne!(runner, std::thread::current().id());
        assert!(thread.current_worker().is_some());
    }

    #[test]
    fn test_same_worker_for_all_bindings() {
        let thread = thread(None);
        let (first, _rx1) = visits();
        let (second, _rx2) = visits();

        let a = thread.bind(first).tell().where_am_i().get().unwrap();
        let b = thread.bind(second).tell().where_am_i().get().unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn test_replaces_retired_worker() {
        let thread = thread(Some(Duration::ZERO));
        let (actor, rx) = visits();
        let tracker = thread.bind(actor);

        tracker.tell().visit(1);
        let (_, first) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        for _ in 0..500 {
            if thread.current_worker().is_none() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(thread.current_worker().is_none());

        tracker.tell().visit(2);
        let (value, second) = rx.recv_timeout(Duration::from_secs(5)).unwrap();

        assert_eq!(value, 2);
        assert_ne!(first, second);
    }

    #[test]
    fn test_rejected_worker_retry_under_lock() {
        let thread = thread(None);
        let (actor, rx) = visits();
        let tracker = thread.bind(actor);

        tracker.tell().visit(1);
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        let old = thread.current_worker().unwrap();
        old.close();

        tracker.tell().visit(2);
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap().0, 2);
        assert_ne!(thread.current_worker().unwrap().id(), old.id());
    }
}
