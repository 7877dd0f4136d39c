//! Sleeping mutual exclusion lock.
//!
//! Contended acquirers block on a scheduler queue created with priority
//! transfer enabled, so under the priority policy waiters donate their
//! effective priority to the owner for as long as they wait.
//!
//! Handoff is asynchronous: `release` clears the owner, pops the next
//! waiter (which installs it as the queue's holder, keeping donation
//! bookkeeping exact) and readies it; the waiter re-asserts ownership
//! when it is dispatched. Until then the lock is in handoff and fresh
//! acquirers queue up behind the designated next owner.

use crate::errors::{require, ContractViolation};
use crate::kernel::Kernel;
use crate::sched::ThreadQueue;
use crate::thread::Thread;

struct LockState {
    owner: Option<Thread>,
    /// A released lock whose next owner has been readied but not yet
    /// dispatched.
    handoff: bool,
}

pub struct Mutex {
    kernel: Kernel,
    queue: Box<dyn ThreadQueue>,
    state: spin::Mutex<LockState>,
}

impl Mutex {
    pub fn new(kernel: &Kernel) -> Mutex {
        Mutex {
            kernel: kernel.clone(),
            queue: kernel.new_wait_queue(true),
            state: spin::Mutex::new(LockState {
                owner: None,
                handoff: false,
            }),
        }
    }

    pub(crate) fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    /// Acquire the lock, blocking while another thread holds it.
    /// Acquiring a lock already held by the current thread is a contract
    /// violation.
    pub fn acquire(&self) {
        let current = self.kernel.current();
        let prior = self.kernel.machine().disable();

        let must_wait = {
            let state = self.state.lock();
            require(
                state.owner.as_ref() != Some(&current),
                ContractViolation::MutexReacquired,
            );
            state.owner.is_some() || state.handoff
        };

        if must_wait {
            self.queue.wait_for_access(&current);
            self.kernel.sleep();
            // Dispatched again: the releaser popped this thread as the
            // queue's next holder.
        } else {
            self.queue.acquire(&current);
        }

        {
            let mut state = self.state.lock();
            state.owner = Some(current);
            state.handoff = false;
        }
        self.kernel.machine().restore(prior);
    }

    /// Release the lock and ready the longest-waiting (or, under the
    /// priority policy, highest-priority) waiter. Releasing a lock the
    /// current thread does not hold is a contract violation.
    pub fn release(&self) {
        let current = self.kernel.current();
        let prior = self.kernel.machine().disable();

        {
            let mut state = self.state.lock();
            require(
                state.owner.as_ref() == Some(&current),
                ContractViolation::MutexNotHeld,
            );
            state.owner = None;
        }

        if let Some(next) = self.queue.next_thread() {
            self.state.lock().handoff = true;
            self.kernel.ready(&next);
        }

        self.kernel.machine().restore(prior);
    }

    pub fn is_held_by_current_thread(&self) -> bool {
        let current = self.kernel.current();
        self.state.lock().owner.as_ref() == Some(&current)
    }
}
