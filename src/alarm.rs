//! Timed sleep bookkeeping.
//!
//! Sleepers are keyed by wake tick plus an insertion sequence, so threads
//! due at the same tick wake in the order they went to sleep. The kernel's
//! timer handler sweeps this set roughly every timer interval; actual wake
//! resolution is therefore bounded by the interval, not by the tick.

use crate::thread::Thread;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct AlarmKey {
    wake_tick: u64,
    seq: u64,
}

struct Pending {
    sleepers: BTreeMap<AlarmKey, Thread>,
    next_seq: u64,
}

pub(crate) struct Alarm {
    pending: spin::Mutex<Pending>,
}

impl Alarm {
    pub(crate) fn new() -> Self {
        Self {
            pending: spin::Mutex::new(Pending {
                sleepers: BTreeMap::new(),
                next_seq: 0,
            }),
        }
    }

    /// Park `thread` until a sweep at or after `wake_tick`. The caller
    /// still has to block the thread itself.
    pub(crate) fn register(&self, wake_tick: u64, thread: Thread) {
        let mut pending = self.pending.lock();
        let key = AlarmKey {
            wake_tick,
            seq: pending.next_seq,
        };
        pending.next_seq += 1;
        pending.sleepers.insert(key, thread);
    }

    /// Remove and return every sleeper due at `now`, earliest first.
    pub(crate) fn due(&self, now: u64) -> Vec<Thread> {
        let mut pending = self.pending.lock();
        let mut woken = Vec::new();
        while let Some(entry) = pending.sleepers.first_entry() {
            if entry.key().wake_tick > now {
                break;
            }
            woken.push(entry.remove());
        }
        woken
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thread(id: u64) -> Thread {
        Thread::new(id, format!("t{}", id), || {})
    }

    #[test]
    fn sweep_returns_due_sleepers_in_order() {
        let alarm = Alarm::new();
        alarm.register(300, thread(1));
        alarm.register(100, thread(2));
        alarm.register(100, thread(3));

        assert!(alarm.due(50).is_empty());

        let woken = alarm.due(100);
        assert_eq!(woken, vec![thread(2), thread(3)]);

        assert_eq!(alarm.due(1000), vec![thread(1)]);
        assert!(alarm.due(2000).is_empty());
    }
}
