//! Peer-side host of remote bindings.
//!
//! An [`ActorService`] receives envelopes from remote bindings through the
//! sender it publishes on its [`PeerBinder`] and runs them on its own worker.
//! The worker's idle timeout is the service stop delay, armed from the moment
//! the service starts: once idle for that long the service stops itself.
//! [`LocalServiceLauncher`] hosts such services in-process and plays the
//! launcher role for [`RemoteActorThread`]s.
//!
//! [`RemoteActorThread`]: crate::threads::remote::RemoteActorThread

use crate::error::{ActorError, Result};
use crate::hooks::StayAwakeHook;
use crate::threads::remote::{
    PeerBinder, RemoteMessageSender, ServiceConnection, ServiceLauncher, LOCAL_SENDER_INTERFACE,
};
use crate::transaction::Transaction;
use crate::worker::{StopHook, Worker, WorkerId, WorkerOptions};
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info};

/// Default time a service stays up without work
pub const DEFAULT_STOP_DELAY: Duration = Duration::from_secs(10);

/// Construction parameters of an [`ActorService`]
#[derive(Clone)]
pub struct ServiceOptions {
    pub name: String,
    pub stop_delay: Duration,
    pub stay_awake: StayAwakeHook,
}

impl ServiceOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stop_delay: DEFAULT_STOP_DELAY,
            stay_awake: None,
        }
    }

    pub fn stop_delay(mut self, delay: Duration) -> Self {
        self.stop_delay = delay;
        self
    }

    pub fn stay_awake(mut self, hook: StayAwakeHook) -> Self {
        self.stay_awake = hook;
        self
    }
}

/// Sender published on the service's binder
struct ServiceMessageSender {
    worker: Arc<Worker>,
}

impl RemoteMessageSender for ServiceMessageSender {
    fn deliver(&self, transaction: Box<Transaction>) -> std::result::Result<(), Box<Transaction>> {
        self.worker.send_transaction(transaction)
    }

    fn is_alive(&self) -> bool {
        !self.worker.is_closed()
    }
}

/// Worker host answering remote bindings
pub struct ActorService {
    name: String,
    worker: Arc<Worker>,
    binder: PeerBinder,
}

impl ActorService {
    pub fn start(options: ServiceOptions) -> Result<Self> {
        Self::start_with_hook(options, None)
    }

    /// Start the service; `on_stop` runs on the service worker once it stopped itself
    pub(crate) fn start_with_hook(options: ServiceOptions, on_stop: Option<StopHook>) -> Result<Self> {
        let worker_options = WorkerOptions::named(options.name.clone())
            .idle_timeout(Some(options.stop_delay))
            .idle_from_start(true)
            .stay_awake(options.stay_awake);
        let worker = Arc::new(Worker::spawn(worker_options, on_stop)?);

        let binder = PeerBinder::new();
        binder.attach_interface(
            Arc::new(ServiceMessageSender {
                worker: Arc::clone(&worker),
            }),
            LOCAL_SENDER_INTERFACE,
        );

        info!(
            service = %options.name,
            worker = %worker.id(),
            stop_delay_ms = options.stop_delay.as_millis() as u64,
            "Actor service started"
        );
        Ok(Self {
            name: options.name,
            worker,
            binder,
        })
    }

    /// Handle clients bind to
    pub fn on_bind(&self) -> PeerBinder {
        self.binder.clone()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn worker_id(&self) -> WorkerId {
        self.worker.id()
    }

    pub fn is_running(&self) -> bool {
        !self.worker.is_closed()
    }

    /// Detach the published sender and stop the worker
    pub fn destroy(&self) {
        self.binder.detach();
        if !self.worker.is_closed() {
            self.worker.close();
            debug!(service = %self.name, worker = %self.worker.id(), "Actor service destroyed");
        }
    }
}

impl Drop for ActorService {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl fmt::Debug for ActorService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorService")
            .field("name", &self.name)
            .field("worker", &self.worker)
            .finish()
    }
}

struct Hosted {
    service: Arc<ActorService>,
    connections: Vec<Weak<dyn ServiceConnection>>,
}

#[derive(Default)]
struct Hosts {
    services: Mutex<HashMap<u32, Hosted>>,
}

impl Hosts {
    /// Forget `job_id` if `worker` still hosts it and tell its clients
    fn stopped_itself(&self, job_id: u32, worker: WorkerId) {
        let hosted = {
            let mut services = self.services.lock();
            match services.get(&job_id) {
                Some(hosted) if hosted.service.worker_id() == worker => services.remove(&job_id),
                _ => None,
            }
        };
        let Some(hosted) = hosted else {
            return;
        };

        hosted.service.destroy();
        debug!(job_id = job_id, worker = %worker, clients = hosted.connections.len(), "Actor service stopped itself");
        for connection in hosted.connections.iter().filter_map(Weak::upgrade) {
            connection.on_disconnected();
        }
    }
}

/// In-process launcher hosting one [`ActorService`] per job id
pub struct LocalServiceLauncher {
    options: ServiceOptions,
    hosts: Arc<Hosts>,
}

impl LocalServiceLauncher {
    pub fn new(name: impl Into<String>, stop_delay: Duration) -> Self {
        Self::with_options(ServiceOptions::named(name).stop_delay(stop_delay))
    }

    pub fn with_options(options: ServiceOptions) -> Self {
        Self {
            options,
            hosts: Arc::new(Hosts::default()),
        }
    }

    /// Service currently hosted for `job_id`
    pub fn service(&self, job_id: u32) -> Option<Arc<ActorService>> {
        self.hosts
            .services
            .lock()
            .get(&job_id)
            .map(|hosted| Arc::clone(&hosted.service))
    }

    fn stop_hook(&self, job_id: u32) -> StopHook {
        let hosts = Arc::downgrade(&self.hosts);
        Box::new(move |worker| {
            if let Some(hosts) = hosts.upgrade() {
                hosts.stopped_itself(job_id, worker);
            }
        })
    }
}

impl ServiceLauncher for LocalServiceLauncher {
    fn start(&self, job_id: u32, connection: Arc<dyn ServiceConnection>) -> Result<bool> {
        let binder = {
            let mut services = self.hosts.services.lock();
            if services.get(&job_id).is_some_and(|hosted| !hosted.service.is_running()) {
                services.remove(&job_id);
            }
            let hosted = match services.entry(job_id) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let options = ServiceOptions {
                        name: format!("{}-{}", self.options.name, job_id),
                        ..self.options.clone()
                    };
                    let service = ActorService::start_with_hook(options, Some(self.stop_hook(job_id)))
                        .map_err(|e| ActorError::launch(job_id, e.to_string()))?;
                    entry.insert(Hosted {
                        service: Arc::new(service),
                        connections: Vec::new(),
                    })
                }
            };
            let target = Arc::as_ptr(&connection) as *const ();
            hosted
                .connections
                .retain(|known| known.strong_count() > 0 && known.as_ptr() as *const () != target);
            hosted.connections.push(Arc::downgrade(&connection));
            hosted.service.on_bind()
        };

        connection.on_connected(binder);
        Ok(true)
    }

    fn stop(&self, job_id: u32, connection: &Arc<dyn ServiceConnection>, bound: bool) {
        let stopped = {
            let mut services = self.hosts.services.lock();
            let Some(hosted) = services.get_mut(&job_id) else {
                return;
            };
            if bound {
                let target = Arc::as_ptr(connection) as *const ();
                hosted
                    .connections
                    .retain(|known| known.strong_count() > 0 && known.as_ptr() as *const () != target);
            }
            if hosted.connections.is_empty() || !hosted.service.is_running() {
                services.remove(&job_id)
            } else {
                None
            }
        };

        match stopped {
            Some(hosted) => {
                hosted.service.destroy();
                debug!(job_id = job_id, "Actor service stopped by launcher");
            }
            None => debug!(job_id = job_id, "Actor service kept alive for other clients"),
        }
    }
}

impl fmt::Debug for LocalServiceLauncher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalServiceLauncher")
            .field("name", &self.options.name)
            .field("stop_delay", &self.options.stop_delay)
            .field("hosted", &self.hosts.services.lock().len())
            .finish()
    }
}
