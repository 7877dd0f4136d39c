//! Ready-queue abstraction and the two scheduling policies.
//!
//! Every place the runtime parks threads waiting for something (the run
//! queue, a mutex, a join) goes through a [`ThreadQueue`] created by the
//! kernel's [`Scheduler`], so the scheduling policy decides wake order
//! everywhere with one mechanism. Queue operations require the interrupt
//! line to be masked; the policy implementations check that contract.

pub mod donation;
pub mod fifo;

use crate::machine::MachineHandle;
use crate::thread::Thread;

/// Lowest allowed thread priority.
pub const PRIORITY_MIN: u8 = 0;
/// Highest allowed thread priority.
pub const PRIORITY_MAX: u8 = 7;
/// Priority assigned to threads that never had one set.
pub const PRIORITY_DEFAULT: u8 = 1;

/// Scheduling policy selected at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulingPolicy {
    /// Strict arrival order, priorities ignored.
    #[default]
    Fifo,
    /// Highest effective priority first, with donation across ownership.
    Priority,
}

impl SchedulingPolicy {
    pub(crate) fn build(self, machine: MachineHandle) -> Box<dyn Scheduler> {
        match self {
            SchedulingPolicy::Fifo => Box::new(fifo::FifoScheduler::new(machine)),
            SchedulingPolicy::Priority => {
                Box::new(donation::PriorityScheduler::new(machine))
            }
        }
    }
}

/// A scheduling policy: a factory for wait queues plus the per-thread
/// priority bookkeeping the policy maintains.
pub trait Scheduler: Send + Sync {
    /// Create a queue threads can wait on. When `transfer_priority` is
    /// set, waiters donate their effective priority to the queue's current
    /// holder (only meaningful under the priority policy).
    fn new_queue(&self, transfer_priority: bool) -> Box<dyn ThreadQueue>;

    /// The thread's own (base) priority. Interrupts must be masked.
    fn priority(&self, thread: &Thread) -> u8;

    /// The thread's priority including donations. Interrupts must be
    /// masked.
    fn effective_priority(&self, thread: &Thread) -> u8;

    /// Set the thread's base priority. Outside `PRIORITY_MIN..=PRIORITY_MAX`
    /// is a contract violation. Interrupts must be masked.
    fn set_priority(&self, thread: &Thread, priority: u8);

    /// Bump the thread's base priority one step; returns false at the
    /// ceiling.
    fn increase_priority(&self, thread: &Thread) -> bool {
        let prior = self.priority(thread);
        if prior == PRIORITY_MAX {
            return false;
        }
        self.set_priority(thread, prior + 1);
        true
    }

    /// Drop the thread's base priority one step; returns false at the
    /// floor.
    fn decrease_priority(&self, thread: &Thread) -> bool {
        let prior = self.priority(thread);
        if prior == PRIORITY_MIN {
            return false;
        }
        self.set_priority(thread, prior - 1);
        true
    }
}

/// A set of threads waiting for one resource.
///
/// All three operations require the interrupt line to be masked.
pub trait ThreadQueue: Send + Sync {
    /// Add a thread to the waiting set. Under a transfer queue this also
    /// donates the waiter's effective priority to the holder.
    fn wait_for_access(&self, thread: &Thread);

    /// Record that the thread holds the queue's resource without waiting.
    /// Only valid while the waiting set is empty.
    fn acquire(&self, thread: &Thread);

    /// Remove and return the next thread to receive the resource, making
    /// it the holder. `None` when the waiting set is empty.
    fn next_thread(&self) -> Option<Thread>;
}
