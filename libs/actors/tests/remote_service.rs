//! Remote Binding Integration Tests
//!
//! Queueing before a peer connects, in-order drain, and the in-process
//! service launcher end to end.

mod common;

use actor_threads::{
    actor_interface, ActorError, ActorThread, ActorThreads, LocalServiceLauncher,
    LoggingFailureHandler, NoScheduledWake, PeerBinder, Promise, RemoteMessageSender,
    ScheduledWake, ServiceConnection, ServiceLauncher, Transaction, LOCAL_SENDER_INTERFACE,
};
use common::*;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;

actor_interface! {
    trait Ledger {
        fn record(&self, entry: u32);
        fn entries(&self) -> Promise<Vec<u32>>;
    }
}

#[derive(Default)]
struct Book(Mutex<Vec<u32>>);

impl Ledger for Book {
    fn record(&self, entry: u32) {
        self.0.lock().push(entry);
    }

    fn entries(&self) -> Promise<Vec<u32>> {
        Promise::wrap(self.0.lock().clone())
    }
}

/// Launcher that holds connections until the test connects them
#[derive(Default)]
struct DeferredLauncher {
    pending: Mutex<Vec<Arc<dyn ServiceConnection>>>,
}

impl ServiceLauncher for DeferredLauncher {
    fn start(&self, _job_id: u32, connection: Arc<dyn ServiceConnection>) -> actor_threads::Result<bool> {
        self.pending.lock().push(connection);
        Ok(true)
    }

    fn stop(&self, _job_id: u32, _connection: &Arc<dyn ServiceConnection>, _bound: bool) {}
}

/// Peer recording descriptions before running envelopes
#[derive(Default)]
struct RecordingPeer {
    seen: Mutex<Vec<String>>,
}

impl RemoteMessageSender for RecordingPeer {
    fn deliver(&self, transaction: Box<Transaction>) -> std::result::Result<(), Box<Transaction>> {
        self.seen.lock().push(transaction.describe());
        transaction.execute(None);
        Ok(())
    }

    fn is_alive(&self) -> bool {
        true
    }
}

/// Launcher that can never start its peer
struct RefusingLauncher;

impl ServiceLauncher for RefusingLauncher {
    fn start(&self, job_id: u32, _connection: Arc<dyn ServiceConnection>) -> actor_threads::Result<bool> {
        Err(ActorError::launch(job_id, "background start not allowed"))
    }

    fn stop(&self, _job_id: u32, _connection: &Arc<dyn ServiceConnection>, _bound: bool) {}
}

#[derive(Default)]
struct Jobs {
    scheduled: Mutex<Vec<(u32, Weak<dyn ServiceConnection>)>>,
}

impl ScheduledWake for Jobs {
    fn schedule(&self, job_id: u32, connection: Weak<dyn ServiceConnection>) {
        self.scheduled.lock().push((job_id, connection));
    }

    fn cancel(&self, job_id: u32) {
        self.scheduled.lock().retain(|(scheduled, _)| *scheduled != job_id);
    }
}

fn threads() -> ActorThreads {
    init_tracing();
    ActorThreads::with_failure_handler(Arc::new(LoggingFailureHandler))
}

#[test]
fn test_queued_messages_drain_in_order() {
    let launcher = Arc::new(DeferredLauncher::default());
    let book = Arc::new(Book::default());
    let ledger = threads()
        .create_remote_thread(Arc::clone(&launcher) as Arc<dyn ServiceLauncher>, Arc::new(NoScheduledWake), 11)
        .bind::<dyn Ledger>(Arc::clone(&book) as Arc<dyn Ledger>);

    for entry in 1..=3 {
        ledger.tell().record(entry);
    }
    assert!(book.0.lock().is_empty());

    let peer = Arc::new(RecordingPeer::default());
    let binder = PeerBinder::new();
    binder.attach_interface(Arc::clone(&peer) as Arc<dyn RemoteMessageSender>, LOCAL_SENDER_INTERFACE);
    let connection = launcher.pending.lock().last().cloned().unwrap();
    connection.on_connected(binder);

    assert_eq!(*book.0.lock(), vec![1, 2, 3]);
    assert_eq!(
        *peer.seen.lock(),
        vec!["Book.record(1)", "Book.record(2)", "Book.record(3)"]
    );
}

#[test]
fn test_refused_start_waits_for_scheduled_wake() {
    let jobs = Arc::new(Jobs::default());
    let book = Arc::new(Book::default());
    let ledger = threads()
        .create_remote_thread(Arc::new(RefusingLauncher), Arc::clone(&jobs) as Arc<dyn ScheduledWake>, 12)
        .bind::<dyn Ledger>(Arc::clone(&book) as Arc<dyn Ledger>);

    ledger.tell().record(5);

    let connection = {
        let scheduled = jobs.scheduled.lock();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].0, 12);
        scheduled[0].1.upgrade().unwrap()
    };

    let peer = Arc::new(RecordingPeer::default());
    let binder = PeerBinder::new();
    binder.attach_interface(Arc::clone(&peer) as Arc<dyn RemoteMessageSender>, LOCAL_SENDER_INTERFACE);
    connection.on_connected(binder);

    assert_eq!(*book.0.lock(), vec![5]);
}

#[test]
fn test_scheduled_wake_does_not_keep_binding_alive() {
    let jobs = Arc::new(Jobs::default());
    let ledger = threads()
        .create_remote_thread(Arc::new(RefusingLauncher), Arc::clone(&jobs) as Arc<dyn ScheduledWake>, 13)
        .bind::<dyn Ledger>(Arc::new(Book::default()));

    ledger.tell().record(1);
    drop(ledger);

    assert!(jobs.scheduled.lock()[0].1.upgrade().is_none());
}

#[test]
fn test_local_service_end_to_end() {
    let launcher = Arc::new(LocalServiceLauncher::new("ledger-service", Duration::from_secs(30)));
    let ledger = threads()
        .create_remote_thread(Arc::clone(&launcher) as Arc<dyn ServiceLauncher>, Arc::new(NoScheduledWake), 21)
        .bind::<dyn Ledger>(Arc::new(Book::default()));

    for entry in 0..20 {
        ledger.tell().record(entry);
    }

    assert_eq!(ledger.tell().entries().get().unwrap(), Some((0..20).collect()));
    let service = launcher.service(21).unwrap();
    assert!(service.is_running());
    assert_eq!(service.name(), "ledger-service-21");
}

#[test]
fn test_local_service_restarts_after_idle_stop() {
    let launcher = Arc::new(LocalServiceLauncher::new("short-lived", Duration::from_millis(100)));
    let ledger = threads()
        .create_remote_thread(Arc::clone(&launcher) as Arc<dyn ServiceLauncher>, Arc::new(NoScheduledWake), 22)
        .bind::<dyn Ledger>(Arc::new(Book::default()));

    ledger.tell().record(1);
    assert_eq!(ledger.tell().entries().get().unwrap(), Some(vec![1]));

    assert!(wait_for(|| launcher.service(22).is_none()));

    ledger.tell().record(2);
    assert_eq!(ledger.tell().entries().get().unwrap(), Some(vec![1, 2]));
}
