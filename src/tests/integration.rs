//! Interactions between the scheduler, the synchronization primitives and
//! the thread lifecycle.

use super::helpers::{effective, fifo_kernel, priority_kernel, set_priority, EventLog};
use crate::sync::SyncList;
use std::sync::Arc;

#[test]
fn fifo_threads_round_robin() {
    let kernel = fifo_kernel();
    let log = EventLog::new();

    let mut workers = Vec::new();
    for name in ["a", "b", "c"] {
        let k = kernel.clone();
        let log = log.clone();
        workers.push(kernel.spawn(name, move || {
            for round in 0..3 {
                log.record(format!("{}{}", name, round));
                k.yield_now();
            }
        }));
    }
    for worker in &workers {
        kernel.join(worker);
    }

    assert_eq!(
        log.snapshot(),
        vec!["a0", "b0", "c0", "a1", "b1", "c1", "a2", "b2", "c2"]
    );
}

#[test]
fn higher_priority_thread_runs_first() {
    let kernel = priority_kernel();
    let log = EventLog::new();

    let low = {
        let log = log.clone();
        kernel.new_thread("low", move || log.record("low"))
    };
    let high = {
        let log = log.clone();
        kernel.new_thread("high", move || log.record("high"))
    };
    set_priority(&kernel, &high, 6);

    kernel.fork(&low);
    kernel.fork(&high);
    kernel.join(&low);
    kernel.join(&high);

    assert_eq!(log.snapshot(), vec!["high", "low"]);
}

#[test]
fn join_donates_priority_to_the_joined_thread() {
    let kernel = priority_kernel();
    let observed = Arc::new(spin::Mutex::new(Vec::new()));

    let low = {
        let k = kernel.clone();
        let observed = observed.clone();
        kernel.new_thread("low", move || {
            let me = k.current();
            for _ in 0..3 {
                observed.lock().push(effective(&k, &me));
                k.yield_now();
            }
        })
    };
    let high = {
        let k = kernel.clone();
        let low = low.clone();
        kernel.new_thread("high", move || k.join(&low))
    };
    set_priority(&kernel, &high, 7);

    kernel.fork(&low);
    kernel.fork(&high);
    kernel.join(&high);

    // The high-priority joiner runs first and blocks on the join, so
    // every observed step of low carries the donated priority.
    assert_eq!(*observed.lock(), vec![7, 7, 7]);
    assert_eq!(effective(&kernel, &low), 1);
}

#[test]
fn ping_pong_over_a_blocking_list() {
    let kernel = fifo_kernel();
    let ping: Arc<SyncList<u32>> = Arc::new(SyncList::new(&kernel));
    let pong: Arc<SyncList<u32>> = Arc::new(SyncList::new(&kernel));

    let echo = {
        let ping = ping.clone();
        let pong = pong.clone();
        kernel.spawn("echo", move || {
            for _ in 0..5 {
                let n = ping.remove_first();
                pong.add(n + 1);
            }
        })
    };

    for n in 0..5 {
        ping.add(n * 10);
        assert_eq!(pong.remove_first(), n * 10 + 1);
    }
    kernel.join(&echo);
}
