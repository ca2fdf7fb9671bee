//! Worker Ordering Property Tests
//!
//! Messages to a dedicated thread run in send order per producer, and none
//! are lost while idle workers retire and get replaced.

mod common;

use actor_threads::{actor_interface, ActorThread, ActorThreads, LoggingFailureHandler, Promise};
use common::*;
use parking_lot::Mutex;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

actor_interface! {
    trait Sink {
        fn push(&self, producer: usize, sequence: usize);
        fn count(&self) -> Promise<usize>;
    }
}

#[derive(Default)]
struct Collected(Mutex<Vec<(usize, usize)>>);

impl Sink for Collected {
    fn push(&self, producer: usize, sequence: usize) {
        self.0.lock().push((producer, sequence));
    }

    fn count(&self) -> Promise<usize> {
        Promise::wrap(self.0.lock().len())
    }
}

fn run_producers(idle_timeout: Option<Duration>, producers: usize, messages: usize, pause_every: usize) -> Vec<(usize, usize)> {
    let threads = ActorThreads::with_failure_handler(Arc::new(LoggingFailureHandler));
    let thread = match idle_timeout {
        Some(timeout) => threads.create_thread_with_idle_timeout("ordering", timeout),
        None => threads.create_thread("ordering"),
    };
    let collected = Arc::new(Collected::default());
    let sink = thread.bind::<dyn Sink>(Arc::clone(&collected) as Arc<dyn Sink>);

    let handles: Vec<_> = (0..producers)
        .map(|producer| {
            let sink = sink.clone();
            std::thread::spawn(move || {
                for sequence in 0..messages {
                    sink.tell().push(producer, sequence);
                    if pause_every > 0 && sequence % pause_every == 0 {
                        std::thread::sleep(Duration::from_millis(2));
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(wait_for(|| collected.0.lock().len() == producers * messages));
    let entries = collected.0.lock().clone();
    entries
}

fn assert_per_producer_order(entries: &[(usize, usize)], producers: usize, messages: usize) {
    for producer in 0..producers {
        let sequence: Vec<_> = entries
            .iter()
            .filter(|(from, _)| *from == producer)
            .map(|(_, sequence)| *sequence)
            .collect();
        assert_eq!(sequence, (0..messages).collect::<Vec<_>>());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_send_order_kept_per_producer(producers in 1usize..4, messages in 1usize..60) {
        init_tracing();
        let entries = run_producers(None, producers, messages, 0);
        assert_per_producer_order(&entries, producers, messages);
    }

    #[test]
    fn prop_no_message_lost_across_idle_shutdowns(messages in 1usize..40, pause_every in 1usize..8) {
        let entries = run_producers(Some(Duration::from_millis(1)), 2, messages, pause_every);
        prop_assert_eq!(entries.len(), 2 * messages);
        assert_per_producer_order(&entries, 2, messages);
    }
}

#[test]
fn test_zero_idle_timeout_still_answers() {
    let threads = ActorThreads::with_failure_handler(Arc::new(LoggingFailureHandler));
    let sink = threads
        .create_thread_with_idle_timeout("eager", Duration::ZERO)
        .bind::<dyn Sink>(Arc::new(Collected::default()));

    for round in 1..=5 {
        sink.tell().push(0, round);
        assert_eq!(sink.tell().count().get().unwrap(), Some(round));
    }
}

#[test]
fn test_unbounded_idle_timeout_keeps_thread() {
    let threads = ActorThreads::with_failure_handler(Arc::new(LoggingFailureHandler));
    let sink = threads
        .create_thread_with_idle_timeout("max", Duration::MAX)
        .bind::<dyn Sink>(Arc::new(Collected::default()));

    sink.tell().push(0, 1);
    assert_eq!(sink.tell().count().get().unwrap(), Some(1));
    sink.tell().push(0, 2);
    assert_eq!(sink.tell().count().get().unwrap(), Some(2));
}
