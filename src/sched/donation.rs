//! Priority scheduling with donation.
//!
//! Each thread carries a base priority (0..=7, default 1) and an effective
//! priority that donations can raise above it. Waiting sets are ordered by
//! effective priority (highest first), then enqueue time, then thread id,
//! so equal-priority threads round-robin. A thread that enqueues behind a
//! lower-priority holder of a transfer queue donates its effective
//! priority to that holder, and the donation follows the holder's own
//! waiting-on link so a whole chain of blockers is raised.
//!
//! When a holder is displaced (the queue hands the resource to the next
//! waiter), its effective priority resets to its base rather than being
//! recomputed from remaining donors. A thread holding several donated
//! resources can therefore run below its true donation level until it
//! releases the rest; this keeps release O(log n) and is accepted.
//!
//! Scheduling state lives in a side table keyed by thread id, owned by the
//! scheduler, not by the threads. Sustained higher-priority arrivals can
//! starve a low-priority thread indefinitely.

use crate::errors::{require, ContractViolation};
use crate::machine::MachineHandle;
use crate::sched::{Scheduler, ThreadQueue, PRIORITY_DEFAULT, PRIORITY_MAX};
use crate::thread::Thread;
use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Ordering key for one waiting thread. `BTreeSet::pop_first` then yields
/// highest effective priority, oldest enqueue, lowest id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct WaitKey {
    effective: Reverse<u8>,
    stamp: u64,
    id: u64,
}

impl WaitKey {
    fn new(effective: u8, stamp: u64, id: u64) -> Self {
        Self {
            effective: Reverse(effective),
            stamp,
            id,
        }
    }
}

struct ThreadSched {
    handle: Thread,
    base: u8,
    /// Never below `base`.
    effective: u8,
    /// Virtual time of the most recent enqueue.
    stamp: u64,
    /// Queue this thread is currently waiting on, if any. A thread waits
    /// on at most one queue at a time.
    waiting_on: Option<u64>,
}

struct QueueState {
    transfer: bool,
    holder: Option<u64>,
    waiting: BTreeSet<WaitKey>,
}

#[derive(Default)]
struct Table {
    threads: HashMap<u64, ThreadSched>,
    queues: HashMap<u64, QueueState>,
    next_queue_id: u64,
}

impl Table {
    fn ensure(&mut self, thread: &Thread) {
        self.threads.entry(thread.id()).or_insert_with(|| ThreadSched {
            handle: thread.clone(),
            base: PRIORITY_DEFAULT,
            effective: PRIORITY_DEFAULT,
            stamp: 0,
            waiting_on: None,
        });
    }

    /// Change a thread's effective priority, re-keying it inside whatever
    /// waiting set it sits in.
    fn set_effective(&mut self, thread_id: u64, effective: u8) {
        let Some(ts) = self.threads.get_mut(&thread_id) else {
            return;
        };
        if ts.effective == effective {
            return;
        }
        let old_key = WaitKey::new(ts.effective, ts.stamp, thread_id);
        let new_key = WaitKey::new(effective, ts.stamp, thread_id);
        let waiting_on = ts.waiting_on;
        ts.effective = effective;
        if let Some(queue_id) = waiting_on {
            if let Some(queue) = self.queues.get_mut(&queue_id) {
                queue.waiting.remove(&old_key);
                queue.waiting.insert(new_key);
            }
        }
    }
}

pub struct PriorityScheduler {
    machine: MachineHandle,
    table: Arc<spin::Mutex<Table>>,
}

impl PriorityScheduler {
    pub fn new(machine: MachineHandle) -> Self {
        Self {
            machine,
            table: Arc::new(spin::Mutex::new(Table::default())),
        }
    }
}

impl Scheduler for PriorityScheduler {
    fn new_queue(&self, transfer_priority: bool) -> Box<dyn ThreadQueue> {
        let mut table = self.table.lock();
        let id = table.next_queue_id;
        table.next_queue_id += 1;
        table.queues.insert(
            id,
            QueueState {
                transfer: transfer_priority,
                holder: None,
                waiting: BTreeSet::new(),
            },
        );
        Box::new(DonationQueue {
            machine: self.machine.clone(),
            table: self.table.clone(),
            id,
            transfer: transfer_priority,
        })
    }

    fn priority(&self, thread: &Thread) -> u8 {
        require(self.machine.disabled(), ContractViolation::InterruptsNotMasked);
        let table = self.table.lock();
        table
            .threads
            .get(&thread.id())
            .map_or(PRIORITY_DEFAULT, |ts| ts.base)
    }

    fn effective_priority(&self, thread: &Thread) -> u8 {
        require(self.machine.disabled(), ContractViolation::InterruptsNotMasked);
        let table = self.table.lock();
        table
            .threads
            .get(&thread.id())
            .map_or(PRIORITY_DEFAULT, |ts| ts.effective)
    }

    /// Changing the base resets the effective priority to it as well,
    /// discarding any standing donations; the next donation re-raises it.
    /// Re-asserting the current base is a no-op and leaves donations
    /// intact.
    fn set_priority(&self, thread: &Thread, priority: u8) {
        require(self.machine.disabled(), ContractViolation::InterruptsNotMasked);
        require(
            priority <= PRIORITY_MAX,
            ContractViolation::PriorityOutOfRange(priority),
        );
        let mut table = self.table.lock();
        table.ensure(thread);
        match table.threads.get_mut(&thread.id()) {
            Some(ts) if ts.base == priority => return,
            Some(ts) => ts.base = priority,
            None => return,
        }
        table.set_effective(thread.id(), priority);
    }
}

struct DonationQueue {
    machine: MachineHandle,
    table: Arc<spin::Mutex<Table>>,
    id: u64,
    transfer: bool,
}

impl ThreadQueue for DonationQueue {
    fn wait_for_access(&self, thread: &Thread) {
        require(self.machine.disabled(), ContractViolation::InterruptsNotMasked);
        // Read the clock before taking the table lock.
        let now = self.machine.time();

        let mut table = self.table.lock();
        table.ensure(thread);
        let donated = {
            let Some(ts) = table.threads.get_mut(&thread.id()) else {
                return;
            };
            ts.waiting_on = Some(self.id);
            ts.stamp = now;
            ts.effective
        };
        let key = WaitKey::new(donated, now, thread.id());
        if let Some(queue) = table.queues.get_mut(&self.id) {
            queue.waiting.insert(key);
        }

        // Walk the chain of blockers: raise every transfer-queue holder
        // whose base priority is below the donation, following each
        // holder's own waiting-on link until the chain ends.
        let mut departure = self.id;
        loop {
            let (transfer, holder) = match table.queues.get(&departure) {
                Some(queue) => (queue.transfer, queue.holder),
                None => break,
            };
            if !transfer {
                break;
            }
            let Some(holder_id) = holder else {
                break;
            };
            let (base, effective, waiting_on) = match table.threads.get(&holder_id) {
                Some(holder) => (holder.base, holder.effective, holder.waiting_on),
                None => break,
            };
            if donated <= base {
                break;
            }
            if donated > effective {
                log::trace!(
                    "donating priority {} to thread {}",
                    donated,
                    holder_id
                );
                table.set_effective(holder_id, donated);
            }
            match waiting_on {
                Some(next) => departure = next,
                None => break,
            }
        }
    }

    fn acquire(&self, thread: &Thread) {
        require(self.machine.disabled(), ContractViolation::InterruptsNotMasked);
        let mut table = self.table.lock();
        table.ensure(thread);
        let Some(queue) = table.queues.get_mut(&self.id) else {
            return;
        };
        require(queue.waiting.is_empty(), ContractViolation::QueueNotIdle);
        require(
            queue.holder.is_none(),
            ContractViolation::Internal("queue acquired while already held"),
        );
        queue.holder = Some(thread.id());
    }

    fn next_thread(&self) -> Option<Thread> {
        require(self.machine.disabled(), ContractViolation::InterruptsNotMasked);
        let mut table = self.table.lock();

        let (next_id, displaced) = {
            let queue = table.queues.get_mut(&self.id)?;
            match queue.waiting.pop_first() {
                None => {
                    queue.holder = None;
                    return None;
                }
                Some(key) => {
                    let displaced = queue.holder.replace(key.id);
                    (key.id, displaced)
                }
            }
        };

        // The displaced holder loses its donations along with the
        // resource: effective priority snaps back to base.
        if self.transfer {
            if let Some(old_id) = displaced {
                if let Some(base) = table.threads.get(&old_id).map(|ts| ts.base) {
                    table.set_effective(old_id, base);
                }
            }
        }

        let ts = table.threads.get_mut(&next_id)?;
        ts.waiting_on = None;
        Some(ts.handle.clone())
    }
}

impl Drop for DonationQueue {
    fn drop(&mut self) {
        self.table.lock().queues.remove(&self.id);
    }
}
