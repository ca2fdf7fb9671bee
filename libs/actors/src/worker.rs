//! Dedicated Workers
//!
//! A [`Worker`] owns one OS thread driving a single-threaded tokio runtime. It
//! executes envelopes strictly in the order `send_transaction` accepted them,
//! one at a time.
//!
//! # Idle Shutdown
//!
//! Every accepted envelope bumps the worker's generation. After each processed
//! envelope the loop arms a poison pill tagged with the current generation,
//! replacing whatever pill was pending. When the pill fires it compares its tag
//! with the live generation under the gate lock: unchanged means nothing was
//! sent since, the gate is closed and the thread exits. A stale pill is a
//! no-op.
//!
//! Closing is published through the gate, never inferred from thread liveness:
//! once closed, `send_transaction` hands the envelope back and the binding
//! replaces the worker.

use crate::error::{ActorError, Result};
use crate::hooks::StayAwakeHook;
use crate::transaction::Transaction;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Generation sentinel of a retired worker
pub(crate) const CLOSED: i64 = -1;

/// Unique worker identity, stable for the worker's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId {
    id: Uuid,
}

impl WorkerId {
    pub fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.id
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.id.simple())
    }
}

/// Called once on the worker thread when the worker retires
pub(crate) type StopHook = Box<dyn FnOnce(WorkerId) + Send>;

/// Construction parameters of a worker
#[derive(Clone, Default)]
pub struct WorkerOptions {
    /// Backing thread name
    pub name: String,
    /// `None` never stops, `Some(Duration::ZERO)` stops as soon as idle
    pub idle_timeout: Option<Duration>,
    /// Held around every invocation
    pub stay_awake: StayAwakeHook,
    /// Arm the idle timeout before the first envelope arrives
    pub idle_from_start: bool,
}

impl WorkerOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn stay_awake(mut self, hook: StayAwakeHook) -> Self {
        self.stay_awake = hook;
        self
    }

    pub fn idle_from_start(mut self, armed: bool) -> Self {
        self.idle_from_start = armed;
        self
    }
}

/// Generation and queue entry guarded together
struct Gate {
    generation: i64,
    sender: Option<mpsc::UnboundedSender<Box<Transaction>>>,
}

struct WorkerState {
    id: WorkerId,
    name: String,
    gate: Mutex<Gate>,
}

impl WorkerState {
    fn generation(&self) -> i64 {
        self.gate.lock().generation
    }

    fn handle_poison_pill(&self, generation: i64) -> bool {
        let mut gate = self.gate.lock();
        if gate.generation == CLOSED || gate.generation != generation {
            return false;
        }
        gate.generation = CLOSED;
        gate.sender = None;
        true
    }

    fn close(&self) {
        let mut gate = self.gate.lock();
        gate.generation = CLOSED;
        gate.sender = None;
    }
}

/// Single-threaded ordered executor with idle self-shutdown
pub struct Worker {
    state: Arc<WorkerState>,
}

impl Worker {
    /// Start the backing thread.
    ///
    /// `on_stop` runs on the worker thread once the loop has exited, whether by
    /// poison pill, explicit close, drop or a panic escaping a failure handler.
    pub(crate) fn spawn(options: WorkerOptions, on_stop: Option<StopHook>) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| ActorError::runtime(options.name.clone(), e))?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let state = Arc::new(WorkerState {
            id: WorkerId::new(),
            name: options.name.clone(),
            gate: Mutex::new(Gate {
                generation: 0,
                sender: Some(sender),
            }),
        });

        let guard = ExitGuard {
            state: Arc::clone(&state),
            on_stop,
        };
        let idle_timeout = options.idle_timeout;
        let stay_awake = options.stay_awake;
        let first_pill = match idle_timeout {
            Some(timeout) if options.idle_from_start => Some(timeout),
            _ => None,
        };
        std::thread::Builder::new()
            .name(options.name.clone())
            .spawn(move || {
                let _guard = guard;
                runtime.block_on(run_loop(&_guard.state, receiver, idle_timeout, first_pill, stay_awake));
            })
            .map_err(|e| ActorError::spawn(options.name.clone(), e))?;

        debug!(
            worker = %state.id,
            thread = %state.name,
            idle_timeout_ms = idle_timeout.map(|t| t.as_millis() as u64),
            "Worker spawned"
        );
        Ok(Self { state })
    }

    pub fn id(&self) -> WorkerId {
        self.state.id
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }

    /// Live generation, [`CLOSED`] once retired
    pub fn generation(&self) -> i64 {
        self.state.generation()
    }

    pub fn is_closed(&self) -> bool {
        self.generation() == CLOSED
    }

    /// Queue an envelope, handing it back if the worker has retired
    pub(crate) fn send_transaction(&self, transaction: Box<Transaction>) -> std::result::Result<(), Box<Transaction>> {
        let mut gate = self.state.gate.lock();
        if gate.generation == CLOSED {
            return Err(transaction);
        }
        let Some(sender) = gate.sender.as_ref() else {
            return Err(transaction);
        };
        match sender.send(transaction) {
            Ok(()) => {
                gate.generation += 1;
                Ok(())
            }
            Err(mpsc::error::SendError(transaction)) => {
                gate.generation = CLOSED;
                gate.sender = None;
                Err(transaction)
            }
        }
    }

    /// Retire the worker if `generation` is still the live one
    pub(crate) fn handle_poison_pill(&self, generation: i64) -> bool {
        self.state.handle_poison_pill(generation)
    }

    /// Stop accepting envelopes; already queued ones still run
    pub fn close(&self) {
        self.state.close();
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.state.close();
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.state.id)
            .field("name", &self.state.name)
            .field("generation", &self.generation())
            .finish()
    }
}

/// Publishes retirement and runs the stop hook when the worker thread ends
struct ExitGuard {
    state: Arc<WorkerState>,
    on_stop: Option<StopHook>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.state.close();
        if std::thread::panicking() {
            error!(worker = %self.state.id, thread = %self.state.name, "Worker thread crashed");
        } else {
            debug!(worker = %self.state.id, thread = %self.state.name, "Worker stopped");
        }
        if let Some(on_stop) = self.on_stop.take() {
            on_stop(self.state.id);
        }
    }
}

async fn run_loop(
    state: &WorkerState,
    mut receiver: mpsc::UnboundedReceiver<Box<Transaction>>,
    idle_timeout: Option<Duration>,
    first_pill: Option<Duration>,
    stay_awake: StayAwakeHook,
) {
    // A deadline past the end of the clock means the pill never fires
    let mut pill: Option<(i64, Instant)> = first_pill
        .and_then(|timeout| Instant::now().checked_add(timeout))
        .map(|deadline| (0, deadline));
    loop {
        let next = match pill {
            Some((generation, deadline)) => tokio::select! {
                biased;
                next = receiver.recv() => next,
                _ = tokio::time::sleep_until(deadline) => {
                    if state.handle_poison_pill(generation) {
                        debug!(worker = %state.id, generation = generation, "Poison pill accepted");
                        break;
                    }
                    pill = None;
                    continue;
                }
            },
            None => receiver.recv().await,
        };

        let Some(transaction) = next else {
            break;
        };
        transaction.execute(stay_awake.as_deref());

        if let Some(timeout) = idle_timeout {
            let generation = state.generation();
            if generation == CLOSED {
                continue;
            }
            pill = Instant::now()
                .checked_add(timeout)
                .map(|deadline| (generation, deadline));
        }
    }

    // Closed while envelopes were still in flight towards us
    receiver.close();
    let mut dropped = 0usize;
    while let Ok(transaction) = receiver.try_recv() {
        transaction.recycle();
        dropped += 1;
    }
    if dropped > 0 {
        warn!(worker = %state.id, dropped = dropped, "Worker retired with queued envelopes");
    }
}
