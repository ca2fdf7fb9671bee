//! Actor Thread Factory and Binding Strategies
//!
//! [`ActorThreads`] owns what every binding needs injected: the failure
//! handler and the two envelope pools. It hands out the binding strategies:
//!
//! - [`DedicatedActorThread`]: one lazily started worker thread, optional idle shutdown
//! - [`PooledActorThread`]: tasks on a bounded thread pool or any [`Executor`]
//! - [`LooperActorThread`]: posts onto a foreign single-threaded loop
//! - [`RemoteActorThread`]: queues for a peer reached through a [`ServiceLauncher`]
//! - [`DirectActorThread`]: no indirection at all, for tests

pub mod dedicated;
pub mod direct;
pub mod looper;
pub mod pooled;
pub mod remote;

pub use dedicated::DedicatedActorThread;
pub use direct::DirectActorThread;
pub use looper::{LoopHandle, Looper, LooperActorThread, MainLoop};
pub use pooled::{Executor, PooledActorThread, Task, ThreadPool};
pub use remote::{
    PeerBinder, RemoteActorThread, RemoteMessageSender, ServiceConnection, ServiceLauncher,
    LOCAL_SENDER_INTERFACE,
};

use crate::config::ActorsConfig;
use crate::error::Result;
use crate::failure::{CrashEarlyFailureHandler, FailureHandler};
use crate::hooks::ScheduledWake;
use crate::message::Message;
use crate::transaction::{BoundCall, Transaction, TransactionPool};
use crate::worker::WorkerOptions;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Envelope source of one binding: its pool and its failure handler
#[derive(Clone)]
pub(crate) struct Envelopes {
    pool: Arc<TransactionPool>,
    failure_handler: Arc<dyn FailureHandler>,
}

impl Envelopes {
    pub(crate) fn new(pool: Arc<TransactionPool>, failure_handler: Arc<dyn FailureHandler>) -> Self {
        Self { pool, failure_handler }
    }

    pub(crate) fn wrap<T>(&self, actor: &Arc<T>, actor_name: &'static str, message: Box<dyn Message<T>>) -> Box<Transaction>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.pool.obtain(
            BoundCall::new(Arc::clone(actor), actor_name, message),
            Arc::clone(&self.failure_handler),
        )
    }
}

/// Factory of actor threads sharing one failure handler and one set of pools
#[derive(Clone)]
pub struct ActorThreads {
    config: ActorsConfig,
    failure_handler: Arc<dyn FailureHandler>,
    transactions: Arc<TransactionPool>,
    runnables: Arc<TransactionPool>,
}

impl ActorThreads {
    /// Default configuration, crash-early failure handling
    pub fn new() -> Self {
        Self::with_failure_handler(Arc::new(CrashEarlyFailureHandler))
    }

    pub fn with_failure_handler(failure_handler: Arc<dyn FailureHandler>) -> Self {
        let config = ActorsConfig::default();
        Self {
            transactions: TransactionPool::with_capacity(config.transaction_pool_capacity),
            runnables: TransactionPool::with_capacity(config.runnable_pool_capacity),
            config,
            failure_handler,
        }
    }

    pub fn from_config(config: ActorsConfig, failure_handler: Arc<dyn FailureHandler>) -> Result<Self> {
        config.validate()?;
        debug!(
            transaction_pool_capacity = config.transaction_pool_capacity,
            runnable_pool_capacity = config.runnable_pool_capacity,
            threads = config.threads.len(),
            "Actor threads configured"
        );
        Ok(Self {
            transactions: TransactionPool::with_capacity(config.transaction_pool_capacity),
            runnables: TransactionPool::with_capacity(config.runnable_pool_capacity),
            config,
            failure_handler,
        })
    }

    /// Dedicated thread that never stops on its own
    pub fn create_thread(&self, name: impl Into<String>) -> DedicatedActorThread {
        self.dedicated(WorkerOptions::named(name))
    }

    /// Dedicated thread whose worker stops after `idle_timeout` without messages
    pub fn create_thread_with_idle_timeout(&self, name: impl Into<String>, idle_timeout: Duration) -> DedicatedActorThread {
        self.dedicated(WorkerOptions::named(name).idle_timeout(Some(idle_timeout)))
    }

    /// Dedicated thread using the idle timeout configured under `threads.<name>`
    pub fn create_configured_thread(&self, name: &str) -> DedicatedActorThread {
        let idle_timeout = self.config.idle_timeout(name);
        self.dedicated(WorkerOptions::named(name).idle_timeout(idle_timeout))
    }

    fn dedicated(&self, options: WorkerOptions) -> DedicatedActorThread {
        DedicatedActorThread::new(options, Arc::clone(&self.transactions), Arc::clone(&self.failure_handler))
    }

    /// Thread running messages on an externally supplied executor
    pub fn create_executor_thread(&self, executor: Arc<dyn Executor>) -> PooledActorThread {
        PooledActorThread::new(executor, Arc::clone(&self.runnables), Arc::clone(&self.failure_handler))
    }

    /// Thread backed by a new pool of at most `max_threads` threads
    pub fn create_pooled_thread(&self, name: impl Into<String>, max_threads: usize) -> Result<PooledActorThread> {
        let pool = ThreadPool::new(name, max_threads, self.config.pool_keep_alive())?;
        Ok(self.create_executor_thread(Arc::new(pool)))
    }

    /// Thread posting onto a foreign loop
    pub fn create_looper_thread<L: Looper>(&self, looper: Arc<L>) -> LooperActorThread<L> {
        LooperActorThread::new(looper, Arc::clone(&self.transactions), Arc::clone(&self.failure_handler))
    }

    /// Thread whose implementations run in a remote peer started by `launcher`
    pub fn create_remote_thread(
        &self,
        launcher: Arc<dyn ServiceLauncher>,
        wake: Arc<dyn ScheduledWake>,
        job_id: u32,
    ) -> RemoteActorThread {
        RemoteActorThread::new(
            job_id,
            launcher,
            wake,
            Arc::clone(&self.transactions),
            Arc::clone(&self.failure_handler),
        )
    }

    pub fn failure_handler(&self) -> &Arc<dyn FailureHandler> {
        &self.failure_handler
    }

    /// Envelope pool of dedicated, foreign-loop and remote threads
    pub fn transaction_pool(&self) -> &Arc<TransactionPool> {
        &self.transactions
    }

    /// Envelope pool of executor-backed threads
    pub fn runnable_pool(&self) -> &Arc<TransactionPool> {
        &self.runnables
    }

    pub fn config(&self) -> &ActorsConfig {
        &self.config
    }
}

impl Default for ActorThreads {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ActorThreads {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorThreads")
            .field("transactions", &self.transactions)
            .field("runnables", &self.runnables)
            .finish()
    }
}
