//! Platform Hooks
//!
//! Opaque collaborators the runtime calls but never implements itself:
//! a stay-awake scope around each invocation and a scheduled wake used when an
//! out-of-process peer cannot be started directly. The process lifecycle hook
//! of the remote binding lives with it in [`threads::remote`](crate::threads::remote).

use crate::threads::remote::ServiceConnection;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Keeps the host awake while one message runs
pub trait StayAwake: Send + Sync + 'static {
    fn acquire(&self);
    fn release(&self);
}

/// Scope guard pairing [`StayAwake::acquire`] with a release on drop,
/// including when the invocation unwinds.
pub(crate) struct AwakeScope<'a> {
    hook: Option<&'a dyn StayAwake>,
}

impl<'a> AwakeScope<'a> {
    pub(crate) fn enter(hook: Option<&'a dyn StayAwake>) -> Self {
        if let Some(hook) = hook {
            hook.acquire();
        }
        Self { hook }
    }
}

impl Drop for AwakeScope<'_> {
    fn drop(&mut self) {
        if let Some(hook) = self.hook {
            hook.release();
        }
    }
}

/// Deferred start of an out-of-process peer.
///
/// Registered connections are held weakly: a scheduled job firing after the
/// binding went away must not resurrect it.
pub trait ScheduledWake: Send + Sync + 'static {
    fn schedule(&self, job_id: u32, connection: Weak<dyn ServiceConnection>);
    fn cancel(&self, job_id: u32);
}

/// Scheduled wake that only records the request in the logs
#[derive(Debug, Default, Clone, Copy)]
pub struct NoScheduledWake;

impl ScheduledWake for NoScheduledWake {
    fn schedule(&self, job_id: u32, _connection: Weak<dyn ServiceConnection>) {
        warn!(job_id = job_id, "No scheduled wake available, peer start deferred to next delivery");
    }

    fn cancel(&self, job_id: u32) {
        debug!(job_id = job_id, "Scheduled wake cancel ignored");
    }
}

/// Shared handle to an optional stay-awake hook
pub type StayAwakeHook = Option<Arc<dyn StayAwake>>;
