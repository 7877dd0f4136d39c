//! Shared fixtures for the cross-module tests.

use crate::kernel::{Kernel, KernelConfig};
use crate::sched::SchedulingPolicy;
use crate::thread::Thread;
use std::sync::Arc;

pub fn fifo_kernel() -> Kernel {
    Kernel::boot(KernelConfig::default())
}

pub fn priority_kernel() -> Kernel {
    Kernel::boot(KernelConfig {
        policy: SchedulingPolicy::Priority,
        ..KernelConfig::default()
    })
}

/// Append-only event log shared between threads, for ordering assertions.
#[derive(Clone)]
pub struct EventLog {
    events: Arc<spin::Mutex<Vec<String>>>,
}

impl EventLog {
    pub fn new() -> EventLog {
        EventLog {
            events: Arc::new(spin::Mutex::new(Vec::new())),
        }
    }

    pub fn record(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

/// Read a thread's effective priority with the interrupt line masked.
pub fn effective(kernel: &Kernel, thread: &Thread) -> u8 {
    let prior = kernel.machine().disable();
    let priority = kernel.scheduler().effective_priority(thread);
    kernel.machine().restore(prior);
    priority
}

/// Set a thread's base priority with the interrupt line masked.
pub fn set_priority(kernel: &Kernel, thread: &Thread, priority: u8) {
    let prior = kernel.machine().disable();
    kernel.scheduler().set_priority(thread, priority);
    kernel.machine().restore(prior);
}
