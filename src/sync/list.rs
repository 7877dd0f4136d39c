//! Blocking FIFO list.
//!
//! The canonical client of the mutex and condition variable: producers
//! append without blocking, consumers block until an item is available.
//! Unbounded; there is no backpressure on the producing side.

use crate::kernel::Kernel;
use crate::sync::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;

pub struct SyncList<T> {
    lock: Arc<Mutex>,
    non_empty: Condvar,
    items: spin::Mutex<VecDeque<T>>,
}

impl<T: Send> SyncList<T> {
    pub fn new(kernel: &Kernel) -> SyncList<T> {
        let lock = Arc::new(Mutex::new(kernel));
        SyncList {
            non_empty: Condvar::new(lock.clone()),
            lock,
            items: spin::Mutex::new(VecDeque::new()),
        }
    }

    /// Append an item and wake one blocked consumer.
    pub fn add(&self, item: T) {
        self.lock.acquire();
        self.items.lock().push_back(item);
        self.non_empty.wake();
        self.lock.release();
    }

    /// Remove and return the first item, blocking until one exists.
    pub fn remove_first(&self) -> T {
        self.lock.acquire();
        let item = loop {
            // Mesa wakeups: an earlier consumer may have drained the item
            // that woke us, so re-check after every sleep.
            match self.items.lock().pop_front() {
                Some(item) => break item,
                None => self.non_empty.sleep(),
            }
        };
        self.lock.release();
        item
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::KernelConfig;

    #[test]
    fn items_come_out_in_insertion_order() {
        let kernel = Kernel::boot(KernelConfig::default());
        let list = SyncList::new(&kernel);
        list.add(1);
        list.add(2);
        list.add(3);
        assert_eq!(list.remove_first(), 1);
        assert_eq!(list.remove_first(), 2);
        assert_eq!(list.remove_first(), 3);
    }

    #[test]
    fn consumer_blocks_until_a_producer_adds() {
        let kernel = Kernel::boot(KernelConfig::default());
        let list = Arc::new(SyncList::new(&kernel));
        let received = Arc::new(spin::Mutex::new(Vec::new()));

        let consumer = {
            let list = list.clone();
            let received = received.clone();
            kernel.spawn("consumer", move || {
                for _ in 0..3 {
                    received.lock().push(list.remove_first());
                }
            })
        };

        kernel.yield_now();
        assert!(received.lock().is_empty());

        for n in [10, 20, 30] {
            list.add(n);
        }
        kernel.join(&consumer);
        assert_eq!(*received.lock(), vec![10, 20, 30]);
    }
}
