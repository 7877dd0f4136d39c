//! Condition variable with Mesa semantics.
//!
//! A condition variable is bound to one mutex for its whole life. `sleep`
//! atomically releases the mutex and blocks (both under a single masking
//! of the interrupt line), then reacquires the mutex before returning; a
//! woken thread must therefore re-check its predicate. Wakes with no
//! sleeper present are lost, not remembered.
//!
//! Waiters queue in plain FIFO order; priority does not reorder a
//! condition queue and no donation flows through it.

use crate::errors::{require, ContractViolation};
use crate::kernel::Kernel;
use crate::sync::Mutex;
use crate::thread::Thread;
use std::collections::VecDeque;
use std::sync::Arc;

pub struct Condvar {
    kernel: Kernel,
    lock: Arc<Mutex>,
    waiting: spin::Mutex<VecDeque<Thread>>,
}

impl Condvar {
    /// Create a condition variable bound to `lock`.
    pub fn new(lock: Arc<Mutex>) -> Condvar {
        Condvar {
            kernel: lock.kernel().clone(),
            lock,
            waiting: spin::Mutex::new(VecDeque::new()),
        }
    }

    /// Release the bound mutex, block until woken, then reacquire it.
    /// The current thread must hold the mutex.
    pub fn sleep(&self) {
        require(
            self.lock.is_held_by_current_thread(),
            ContractViolation::MutexNotHeld,
        );
        let current = self.kernel.current();

        let prior = self.kernel.machine().disable();
        self.waiting.lock().push_back(current);
        self.lock.release();
        self.kernel.sleep();
        self.lock.acquire();
        self.kernel.machine().restore(prior);
    }

    /// Ready the longest-sleeping waiter, if any. The current thread must
    /// hold the bound mutex.
    pub fn wake(&self) {
        require(
            self.lock.is_held_by_current_thread(),
            ContractViolation::MutexNotHeld,
        );
        let prior = self.kernel.machine().disable();
        let woken = self.waiting.lock().pop_front();
        if let Some(thread) = woken {
            self.kernel.ready(&thread);
        }
        self.kernel.machine().restore(prior);
    }

    /// Ready every current waiter. The current thread must hold the bound
    /// mutex.
    pub fn wake_all(&self) {
        require(
            self.lock.is_held_by_current_thread(),
            ContractViolation::MutexNotHeld,
        );
        let prior = self.kernel.machine().disable();
        loop {
            let woken = self.waiting.lock().pop_front();
            match woken {
                Some(thread) => self.kernel.ready(&thread),
                None => break,
            }
        }
        self.kernel.machine().restore(prior);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::KernelConfig;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fixture() -> (Kernel, Arc<Mutex>, Arc<Condvar>) {
        let kernel = Kernel::boot(KernelConfig::default());
        let lock = Arc::new(Mutex::new(&kernel));
        let cond = Arc::new(Condvar::new(lock.clone()));
        (kernel, lock, cond)
    }

    #[test]
    fn wake_readies_one_sleeper() {
        let (kernel, lock, cond) = fixture();
        let woken = Arc::new(AtomicU32::new(0));

        let sleeper = {
            let lock = lock.clone();
            let cond = cond.clone();
            let woken = woken.clone();
            kernel.spawn("sleeper", move || {
                lock.acquire();
                cond.sleep();
                woken.fetch_add(1, Ordering::SeqCst);
                lock.release();
            })
        };

        kernel.yield_now();
        assert_eq!(woken.load(Ordering::SeqCst), 0);

        lock.acquire();
        cond.wake();
        lock.release();
        kernel.join(&sleeper);
        assert_eq!(woken.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn wake_without_sleeper_is_lost() {
        let (kernel, lock, cond) = fixture();
        let woken = Arc::new(AtomicU32::new(0));

        lock.acquire();
        cond.wake(); // nobody is sleeping; this must not be remembered
        lock.release();

        {
            let lock = lock.clone();
            let cond = cond.clone();
            let woken = woken.clone();
            kernel.spawn("sleeper", move || {
                lock.acquire();
                cond.sleep();
                woken.fetch_add(1, Ordering::SeqCst);
                lock.release();
            });
        }
        kernel.yield_now();
        assert_eq!(woken.load(Ordering::SeqCst), 0);

        lock.acquire();
        cond.wake();
        lock.release();
        kernel.yield_now();
        assert_eq!(woken.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn wake_all_readies_every_sleeper() {
        let (kernel, lock, cond) = fixture();
        let woken = Arc::new(AtomicU32::new(0));

        let mut sleepers = Vec::new();
        for i in 0..3 {
            let lock = lock.clone();
            let cond = cond.clone();
            let woken = woken.clone();
            sleepers.push(kernel.spawn(&format!("s{}", i), move || {
                lock.acquire();
                cond.sleep();
                woken.fetch_add(1, Ordering::SeqCst);
                lock.release();
            }));
        }
        kernel.yield_now();

        lock.acquire();
        cond.wake_all();
        lock.release();
        for sleeper in &sleepers {
            kernel.join(sleeper);
        }
        assert_eq!(woken.load(Ordering::SeqCst), 3);
    }

    #[test]
    #[should_panic(expected = "does not hold it")]
    fn sleep_without_the_mutex_is_rejected() {
        let (_kernel, _lock, cond) = fixture();
        cond.sleep();
    }

    #[test]
    #[should_panic(expected = "does not hold it")]
    fn wake_without_the_mutex_is_rejected() {
        let (_kernel, _lock, cond) = fixture();
        cond.wake();
    }
}
