//! Arrival-order scheduling.
//!
//! The degenerate policy: every queue is a plain FIFO and all threads
//! report the default priority. Useful as the baseline policy and for
//! tests that must not depend on priority ordering.

use crate::errors::{require, ContractViolation};
use crate::machine::MachineHandle;
use crate::sched::{Scheduler, ThreadQueue, PRIORITY_DEFAULT, PRIORITY_MAX};
use crate::thread::Thread;
use std::collections::VecDeque;

pub struct FifoScheduler {
    machine: MachineHandle,
}

impl FifoScheduler {
    pub fn new(machine: MachineHandle) -> Self {
        Self { machine }
    }
}

impl Scheduler for FifoScheduler {
    fn new_queue(&self, _transfer_priority: bool) -> Box<dyn ThreadQueue> {
        Box::new(FifoQueue {
            machine: self.machine.clone(),
            waiting: spin::Mutex::new(VecDeque::new()),
        })
    }

    fn priority(&self, _thread: &Thread) -> u8 {
        require(self.machine.disabled(), ContractViolation::InterruptsNotMasked);
        PRIORITY_DEFAULT
    }

    fn effective_priority(&self, _thread: &Thread) -> u8 {
        require(self.machine.disabled(), ContractViolation::InterruptsNotMasked);
        PRIORITY_DEFAULT
    }

    /// Range-checked but otherwise ignored; arrival order is all that
    /// matters under this policy.
    fn set_priority(&self, _thread: &Thread, priority: u8) {
        require(self.machine.disabled(), ContractViolation::InterruptsNotMasked);
        require(
            priority <= PRIORITY_MAX,
            ContractViolation::PriorityOutOfRange(priority),
        );
    }
}

struct FifoQueue {
    machine: MachineHandle,
    waiting: spin::Mutex<VecDeque<Thread>>,
}

impl ThreadQueue for FifoQueue {
    fn wait_for_access(&self, thread: &Thread) {
        require(self.machine.disabled(), ContractViolation::InterruptsNotMasked);
        self.waiting.lock().push_back(thread.clone());
    }

    fn acquire(&self, _thread: &Thread) {
        require(self.machine.disabled(), ContractViolation::InterruptsNotMasked);
        require(
            self.waiting.lock().is_empty(),
            ContractViolation::QueueNotIdle,
        );
    }

    fn next_thread(&self) -> Option<Thread> {
        require(self.machine.disabled(), ContractViolation::InterruptsNotMasked);
        self.waiting.lock().pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thread(id: u64) -> Thread {
        Thread::new(id, format!("t{}", id), || {})
    }

    #[test]
    fn queue_is_first_in_first_out() {
        let sched = FifoScheduler::new(MachineHandle::new());
        let queue = sched.new_queue(false);

        let (a, b, c) = (thread(1), thread(2), thread(3));
        queue.wait_for_access(&b);
        queue.wait_for_access(&a);
        queue.wait_for_access(&c);

        assert_eq!(queue.next_thread(), Some(b));
        assert_eq!(queue.next_thread(), Some(a));
        assert_eq!(queue.next_thread(), Some(c));
        assert_eq!(queue.next_thread(), None);
    }

    #[test]
    fn every_thread_reports_the_default_priority() {
        let sched = FifoScheduler::new(MachineHandle::new());
        let t = thread(1);
        sched.set_priority(&t, 6);
        assert_eq!(sched.priority(&t), PRIORITY_DEFAULT);
        assert_eq!(sched.effective_priority(&t), PRIORITY_DEFAULT);
    }

    #[test]
    #[should_panic(expected = "interrupt line to be masked")]
    fn queue_ops_require_masked_interrupts() {
        let machine = MachineHandle::new();
        let sched = FifoScheduler::new(machine.clone());
        let queue = sched.new_queue(false);
        machine.enable();
        queue.wait_for_access(&thread(1));
    }

    #[test]
    #[should_panic(expected = "waiting set is non-empty")]
    fn acquire_rejects_a_populated_queue() {
        let sched = FifoScheduler::new(MachineHandle::new());
        let queue = sched.new_queue(false);
        queue.wait_for_access(&thread(1));
        queue.acquire(&thread(2));
    }

    #[test]
    #[should_panic(expected = "outside the allowed range")]
    fn out_of_range_priority_is_rejected() {
        let sched = FifoScheduler::new(MachineHandle::new());
        sched.set_priority(&thread(1), PRIORITY_MAX + 1);
    }
}
