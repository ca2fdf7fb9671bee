//! Remote binding.
//!
//! Delivers envelopes to a peer living behind a connection the binding has to
//! establish itself through a [`ServiceLauncher`]. While no live peer is known,
//! envelopes wait in a per-binding queue that is drained in order once the peer
//! connects.
//!
//! # Connection lifecycle
//!
//! - no peer: enqueue and ask the launcher to start the peer
//! - peer known: forward directly; if the peer is gone, requeue, tear the
//!   connection down and start it again
//! - peer connected: validate its interface; an invalid peer is torn down and
//!   restarted once, a valid one receives the whole queue
//! - peer disconnected: forget it, the next delivery reconnects
//!
//! The launcher is never called with the binding's lock held: it may report a
//! connection synchronously from within `start`.

use super::Envelopes;
use crate::actor_ref::{ActorThread, MessageSender};
use crate::error::Result;
use crate::failure::FailureHandler;
use crate::hooks::ScheduledWake;
use crate::message::Message;
use crate::transaction::{Transaction, TransactionPool};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, error, warn};

/// Interface descriptor a valid peer publishes its sender under
pub const LOCAL_SENDER_INTERFACE: &str = "ServiceMessageSender";

/// Peer-side entry point for envelopes
pub trait RemoteMessageSender: Send + Sync {
    /// Queue `transaction` on the peer, handing it back if the peer is gone
    fn deliver(&self, transaction: Box<Transaction>) -> std::result::Result<(), Box<Transaction>>;

    /// Whether the peer still accepts envelopes
    fn is_alive(&self) -> bool;
}

/// Handle a peer publishes its sender through.
///
/// Clones share the attachment: detaching on the peer side invalidates every
/// handle a client still holds.
#[derive(Clone, Default)]
pub struct PeerBinder {
    attached: Arc<Mutex<Option<(String, Arc<dyn RemoteMessageSender>)>>>,
}

impl PeerBinder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach_interface(&self, sender: Arc<dyn RemoteMessageSender>, descriptor: &str) {
        *self.attached.lock() = Some((descriptor.to_string(), sender));
    }

    pub fn detach(&self) {
        self.attached.lock().take();
    }

    pub fn interface_descriptor(&self) -> Option<String> {
        self.attached.lock().as_ref().map(|(descriptor, _)| descriptor.clone())
    }

    /// Sender attached under `descriptor`, if any
    pub fn query_local_interface(&self, descriptor: &str) -> Option<Arc<dyn RemoteMessageSender>> {
        match self.attached.lock().as_ref() {
            Some((attached, sender)) if attached == descriptor => Some(Arc::clone(sender)),
            _ => None,
        }
    }
}

impl fmt::Debug for PeerBinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerBinder")
            .field("descriptor", &self.interface_descriptor())
            .finish()
    }
}

/// Connection callbacks from a [`ServiceLauncher`]
pub trait ServiceConnection: Send + Sync + 'static {
    fn on_connected(&self, binder: PeerBinder);
    fn on_disconnected(&self);
}

/// Process lifecycle of an out-of-process peer
pub trait ServiceLauncher: Send + Sync + 'static {
    /// Start the peer and bind `connection` to it.
    ///
    /// `Ok(true)` when the connection is bound and will hear about the peer
    /// through [`ServiceConnection::on_connected`]; an error when the peer
    /// cannot be started right now.
    fn start(&self, job_id: u32, connection: Arc<dyn ServiceConnection>) -> Result<bool>;

    /// Unbind `connection` if `bound`, then stop the peer
    fn stop(&self, job_id: u32, connection: &Arc<dyn ServiceConnection>, bound: bool);
}

/// Actor thread whose implementations run in a remote peer
#[derive(Clone)]
pub struct RemoteActorThread {
    job_id: u32,
    launcher: Arc<dyn ServiceLauncher>,
    wake: Arc<dyn ScheduledWake>,
    envelopes: Envelopes,
}

impl RemoteActorThread {
    pub fn new(
        job_id: u32,
        launcher: Arc<dyn ServiceLauncher>,
        wake: Arc<dyn ScheduledWake>,
        pool: Arc<TransactionPool>,
        failure_handler: Arc<dyn FailureHandler>,
    ) -> Self {
        Self {
            job_id,
            launcher,
            wake,
            envelopes: Envelopes::new(pool, failure_handler),
        }
    }

    pub fn job_id(&self) -> u32 {
        self.job_id
    }
}

impl fmt::Debug for RemoteActorThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteActorThread")
            .field("job_id", &self.job_id)
            .finish()
    }
}

impl ActorThread for RemoteActorThread {
    fn sender_named<T>(&self, actor: Arc<T>, actor_name: &'static str) -> Arc<dyn MessageSender<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let link = RemoteLink::new(self.job_id, Arc::clone(&self.launcher), Arc::clone(&self.wake));
        Arc::new(RemoteSender {
            actor,
            actor_name,
            envelopes: self.envelopes.clone(),
            link,
        })
    }
}

struct RemoteSender<T: ?Sized> {
    actor: Arc<T>,
    actor_name: &'static str,
    envelopes: Envelopes,
    link: Arc<RemoteLink>,
}

impl<T: ?Sized + Send + Sync + 'static> MessageSender<T> for RemoteSender<T> {
    fn deliver(&self, message: Box<dyn Message<T>>) {
        let transaction = self.envelopes.wrap(&self.actor, self.actor_name, message);
        self.link.deliver(transaction);
    }
}

#[derive(Default)]
struct LinkState {
    sender: Option<Arc<dyn RemoteMessageSender>>,
    queue: VecDeque<Box<Transaction>>,
    restart_attempt: bool,
    bound: bool,
}

/// Connection and send queue of one binding
pub(crate) struct RemoteLink {
    job_id: u32,
    launcher: Arc<dyn ServiceLauncher>,
    wake: Arc<dyn ScheduledWake>,
    state: Mutex<LinkState>,
    this: Weak<RemoteLink>,
}

impl RemoteLink {
    fn new(job_id: u32, launcher: Arc<dyn ServiceLauncher>, wake: Arc<dyn ScheduledWake>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            job_id,
            launcher,
            wake,
            state: Mutex::new(LinkState::default()),
            this: this.clone(),
        })
    }

    fn connection(&self) -> Option<Arc<dyn ServiceConnection>> {
        let this: Arc<dyn ServiceConnection> = self.this.upgrade()?;
        Some(this)
    }

    fn deliver(&self, transaction: Box<Transaction>) {
        let sender = {
            let mut state = self.state.lock();
            match state.sender.clone() {
                Some(sender) => sender,
                None => {
                    state.queue.push_back(transaction);
                    drop(state);
                    self.start_service(true);
                    return;
                }
            }
        };

        let transaction = if sender.is_alive() {
            match sender.deliver(transaction) {
                Ok(()) => return,
                Err(rejected) => rejected,
            }
        } else {
            transaction
        };

        warn!(job_id = self.job_id, call = %transaction.describe(), "Peer is gone, reconnecting");
        {
            let mut state = self.state.lock();
            state.queue.push_back(transaction);
            if state.sender.as_ref().is_some_and(|current| Arc::ptr_eq(current, &sender)) {
                state.sender = None;
            }
        }
        self.stop_service();
        self.start_service(true);
    }

    /// Ask the launcher for the peer; a `fresh` attempt re-arms the retry
    fn start_service(&self, fresh: bool) {
        let Some(connection) = self.connection() else {
            return;
        };
        if fresh {
            self.state.lock().restart_attempt = false;
        }
        match self.launcher.start(self.job_id, Arc::clone(&connection)) {
            Ok(bound) => {
                if bound {
                    self.state.lock().bound = true;
                }
            }
            Err(e) => {
                warn!(
                    job_id = self.job_id,
                    error = %e,
                    "Peer start refused, scheduling wake"
                );
                self.state.lock().bound = false;
                self.wake.schedule(self.job_id, Arc::downgrade(&connection));
            }
        }
    }

    fn stop_service(&self) {
        let bound = {
            let mut state = self.state.lock();
            state.sender = None;
            std::mem::replace(&mut state.bound, false)
        };
        if let Some(connection) = self.connection() {
            self.launcher.stop(self.job_id, &connection, bound);
        }
        self.wake.cancel(self.job_id);
    }

    /// Drain the queue into `sender` in order, `false` if the peer died midway
    fn drain_into(&self, sender: &Arc<dyn RemoteMessageSender>) -> bool {
        let mut state = self.state.lock();
        let mut drained = 0usize;
        while let Some(transaction) = state.queue.pop_front() {
            if let Err(rejected) = sender.deliver(transaction) {
                state.queue.push_front(rejected);
                warn!(
                    job_id = self.job_id,
                    drained = drained,
                    remaining = state.queue.len(),
                    "Peer died while draining queue"
                );
                return false;
            }
            drained += 1;
        }
        state.sender = Some(Arc::clone(sender));
        state.restart_attempt = false;
        debug!(job_id = self.job_id, drained = drained, "Peer connected, queue drained");
        true
    }

    /// Tear the connection down and start it again, once per failed attempt
    fn retry_once(&self) {
        self.stop_service();
        let retry = {
            let mut state = self.state.lock();
            !std::mem::replace(&mut state.restart_attempt, true)
        };
        if retry {
            self.start_service(false);
        } else {
            error!(
                job_id = self.job_id,
                queued = self.queued(),
                "Peer connection failed after retry"
            );
        }
    }

    fn queued(&self) -> usize {
        self.state.lock().queue.len()
    }
}

impl ServiceConnection for RemoteLink {
    fn on_connected(&self, binder: PeerBinder) {
        match binder.query_local_interface(LOCAL_SENDER_INTERFACE) {
            Some(sender) => {
                if !self.drain_into(&sender) {
                    self.retry_once();
                }
            }
            None => {
                warn!(
                    job_id = self.job_id,
                    descriptor = ?binder.interface_descriptor(),
                    "Peer exposes unexpected interface"
                );
                self.retry_once();
            }
        }
    }

    fn on_disconnected(&self) {
        let mut state = self.state.lock();
        state.sender = None;
        state.bound = false;
        debug!(job_id = self.job_id, queued = state.queue.len(), "Peer disconnected");
    }
}
