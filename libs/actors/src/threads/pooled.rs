//! Shared-pool binding.
//!
//! Deliveries are handed to an [`Executor`] as self-contained tasks that run
//! the same invoke, report and recycle sequence as a dedicated worker. There is
//! no per-binding ordering: two messages to the same implementation may run
//! concurrently on different pool threads.

use super::Envelopes;
use crate::actor_ref::{ActorThread, MessageSender};
use crate::error::{ActorError, Result};
use crate::failure::FailureHandler;
use crate::message::Message;
use crate::transaction::TransactionPool;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::debug;

/// Unit of work submitted to an executor
pub type Task = Box<dyn FnOnce() + Send>;

/// Externally supplied task executor
pub trait Executor: Send + Sync + 'static {
    fn execute(&self, task: Task);
}

impl Executor for Handle {
    fn execute(&self, task: Task) {
        drop(self.spawn_blocking(task));
    }
}

/// Bounded pool of threads that exit after staying idle for the keep-alive
pub struct ThreadPool {
    name: String,
    max_threads: usize,
    handle: Handle,
    runtime: Option<Runtime>,
}

impl ThreadPool {
    pub fn new(name: impl Into<String>, max_threads: usize, keep_alive: Duration) -> Result<Self> {
        let name = name.into();
        if max_threads == 0 {
            return Err(ActorError::configuration(
                format!("pool '{}' needs at least one thread", name),
                Some("max_threads"),
            ));
        }

        let counter = Arc::new(AtomicUsize::new(0));
        let prefix = name.clone();
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(max_threads)
            .thread_keep_alive(keep_alive)
            .thread_name_fn(move || format!("{}-{}", prefix, counter.fetch_add(1, Ordering::Relaxed)))
            .build()
            .map_err(|e| ActorError::runtime(name.clone(), e))?;

        debug!(
            pool = %name,
            max_threads = max_threads,
            keep_alive_ms = keep_alive.as_millis() as u64,
            "Thread pool created"
        );
        Ok(Self {
            name,
            max_threads,
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_threads(&self) -> usize {
        self.max_threads
    }
}

impl Executor for ThreadPool {
    fn execute(&self, task: Task) {
        self.handle.execute(task);
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("name", &self.name)
            .field("max_threads", &self.max_threads)
            .finish()
    }
}

/// Actor thread backed by an executor
#[derive(Clone)]
pub struct PooledActorThread {
    executor: Arc<dyn Executor>,
    envelopes: Envelopes,
}

impl PooledActorThread {
    pub fn new(executor: Arc<dyn Executor>, pool: Arc<TransactionPool>, failure_handler: Arc<dyn FailureHandler>) -> Self {
        Self {
            executor,
            envelopes: Envelopes::new(pool, failure_handler),
        }
    }
}

impl ActorThread for PooledActorThread {
    fn sender_named<T>(&self, actor: Arc<T>, actor_name: &'static str) -> Arc<dyn MessageSender<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        Arc::new(PooledSender {
            actor,
            actor_name,
            executor: Arc::clone(&self.executor),
            envelopes: self.envelopes.clone(),
        })
    }
}

struct PooledSender<T: ?Sized> {
    actor: Arc<T>,
    actor_name: &'static str,
    executor: Arc<dyn Executor>,
    envelopes: Envelopes,
}

impl<T: ?Sized + Send + Sync + 'static> MessageSender<T> for PooledSender<T> {
    fn deliver(&self, message: Box<dyn Message<T>>) {
        let transaction = self.envelopes.wrap(&self.actor, self.actor_name, message);
        self.executor.execute(Box::new(move || transaction.execute(None)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::LoggingFailureHandler;
    use crate::{actor_interface, Promise};
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::sync::mpsc;
    use std::thread::ThreadId;

    actor_interface! {
        trait Sleeper {
            fn nap(&self, millis: u64) -> Promise<ThreadId>;
            fn crash(&self);
        }
    }

    struct Napper;

    impl Sleeper for Napper {
        fn nap(&self, millis: u64) -> Promise<ThreadId> {
            std::thread::sleep(Duration::from_millis(millis));
            Promise::wrap(std::thread::current().id())
        }

        fn crash(&self) {
            panic!("pool task failed");
        }
    }

    /// Runs every task inline and counts them
    #[derive(Default)]
    struct Inline {
        tasks: AtomicUsize,
    }

    impl Executor for Inline {
        fn execute(&self, task: Task) {
            self.tasks.fetch_add(1, Ordering::SeqCst);
            task();
        }
    }

    #[test]
    fn test_tasks_go_through_executor_and_recycle() {
        let executor = Arc::new(Inline::default());
        let pool = TransactionPool::new();
        let thread = PooledActorThread::new(
            Arc::clone(&executor) as Arc<dyn Executor>,
            Arc::clone(&pool),
            Arc::new(LoggingFailureHandler),
        );
        let sleeper = thread.bind::<dyn Sleeper>(Arc::new(Napper));

        let runner = sleeper.tell().nap(0).get().unwrap();
        sleeper.tell().crash();

        assert_eq!(runner, Some(std::thread::current().id()));
        assert_eq!(executor.tasks.load(Ordering::SeqCst), 2);
        assert_eq!(pool.stats().pooled, 1);
    }

    #[test]
    fn test_thread_pool_runs_concurrently() {
        let pool = ThreadPool::new("nap-pool", 4, Duration::from_secs(60)).unwrap();
        let thread = PooledActorThread::new(Arc::new(pool), TransactionPool::new(), Arc::new(LoggingFailureHandler));
        let sleeper = thread.bind::<dyn Sleeper>(Arc::new(Napper));
        let (tx, rx) = mpsc::channel();
        let tx = Arc::new(Mutex::new(tx));

        for _ in 0..4 {
            let tx = Arc::clone(&tx);
            let _handle = sleeper.tell().nap(100).then(move |id| {
                let _ = tx.lock().send(id);
            });
        }
        let threads: HashSet<_> = (0..4)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap())
            .collect();

        assert!(threads.len() > 1);
        assert!(!threads.contains(&std::thread::current().id()));
    }

    #[test]
    fn test_zero_threads_rejected() {
        let error = ThreadPool::new("empty", 0, Duration::from_secs(1)).unwrap_err();
        assert_eq!(error.category(), "configuration");
    }
}
