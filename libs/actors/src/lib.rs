//! Actor Thread Bindings
//!
//! Binds plain trait implementations to execution contexts so that every call
//! made through the returned [`ActorRef`] becomes a message executed later, in
//! order, on the bound context. Results travel back through [`Promise`]s.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   ┌───────────────────┐   ┌──────────────────────┐
//! │  ActorRef<dyn T> │   │   ActorThread     │   │  Execution context   │
//! │                  │   │                   │   │                      │
//! │  proxy call ─────┼──▶│ wrap in pooled    │──▶│ Worker (dedicated)   │
//! │  → Message       │   │ Transaction       │   │ ThreadPool / Executor│
//! │                  │   │                   │   │ Looper (foreign loop)│
//! │  Promise<R> ◀────┼───┼── result/listener │   │ ActorService (remote)│
//! └──────────────────┘   └───────────────────┘   └──────────────────────┘
//! ```
//!
//! - **Dedicated**: one lazily started OS thread with optional idle shutdown
//! - **Pooled**: bounded pool, no ordering between messages
//! - **Looper**: posts onto a loop owned by someone else
//! - **Remote**: queues until a peer [`ActorService`] connects
//! - **Direct**: same-thread invocation for tests
//!
//! Failures raised by implementations never escape the execution context: they
//! are described and handed to the configured [`FailureHandler`].
//!
//! # Examples
//!
//! ```rust
//! use actor_threads::{actor_interface, ActorThread, ActorThreads, LoggingFailureHandler, Promise};
//! use std::sync::Arc;
//!
//! actor_interface! {
//!     pub trait Counter {
//!         fn add(&self, amount: u64);
//!         fn total(&self) -> Promise<u64>;
//!     }
//! }
//!
//! #[derive(Default)]
//! struct Tally(std::sync::atomic::AtomicU64);
//!
//! impl Counter for Tally {
//!     fn add(&self, amount: u64) {
//!         self.0.fetch_add(amount, std::sync::atomic::Ordering::SeqCst);
//!     }
//!
//!     fn total(&self) -> Promise<u64> {
//!         Promise::wrap(self.0.load(std::sync::atomic::Ordering::SeqCst))
//!     }
//! }
//!
//! let threads = ActorThreads::with_failure_handler(Arc::new(LoggingFailureHandler));
//! let counter = threads.create_thread("counter").bind::<dyn Counter>(Arc::new(Tally::default()));
//!
//! counter.tell().add(2);
//! counter.tell().add(3);
//! assert_eq!(counter.tell().total().get().unwrap(), Some(5));
//! ```

pub mod actor_ref;
pub mod config;
pub mod error;
pub mod failure;
pub mod hooks;
pub mod macros;
pub mod message;
pub mod promise;
pub mod service;
pub mod threads;
pub mod transaction;
pub mod worker;

pub use actor_ref::{ActorInterface, ActorProxy, ActorRef, ActorThread, MessageSender};
pub use config::{ActorsConfig, ThreadSettings};
pub use error::{ActorError, ActorInvokeError, Result};
pub use failure::{CrashEarlyFailureHandler, FailureHandler, LoggingFailureHandler};
pub use hooks::{NoScheduledWake, ScheduledWake, StayAwake, StayAwakeHook};
pub use message::{describe_args, CallMessage, Message, Redacted, Redaction};
pub use promise::{ActionHandle, ListenerSlot, Promise, PromiseCall};
pub use service::{ActorService, LocalServiceLauncher, ServiceOptions};
pub use threads::{
    ActorThreads, DedicatedActorThread, DirectActorThread, Executor, LoopHandle, Looper,
    LooperActorThread, MainLoop, PeerBinder, PooledActorThread, RemoteActorThread,
    RemoteMessageSender, ServiceConnection, ServiceLauncher, Task, ThreadPool,
    LOCAL_SENDER_INTERFACE,
};
pub use transaction::{PoolStats, Transaction, TransactionPool, MAX_POOL_SIZE};
pub use worker::{Worker, WorkerId, WorkerOptions};

#[doc(hidden)]
pub use message::simple_type_name as __simple_type_name;
