//! Cooperatively multitasked kernel-thread runtime on a simulated clock.
//!
//! This crate implements the scheduling and synchronization core of a
//! teaching kernel: logical threads multiplexed one at a time over parked
//! OS threads, with mutual exclusion achieved solely by masking a
//! simulated interrupt line. Virtual time advances only when that line is
//! unmasked, which makes every run deterministic for a fixed timer seed.
//!
//! A [`Kernel`] is booted explicitly and handles to it are cloned into
//! thread bodies:
//!
//! ```
//! use cooperative_threads::{Kernel, KernelConfig};
//!
//! let kernel = Kernel::boot(KernelConfig::default());
//! let worker = kernel.spawn("worker", {
//!     let kernel = kernel.clone();
//!     move || {
//!         kernel.yield_now();
//!     }
//! });
//! kernel.join(&worker);
//! ```
//!
//! Scheduling policy is chosen at boot: plain FIFO, or priority
//! scheduling with donation through locks and joins. Higher layers build
//! on [`sync::Mutex`], [`sync::Condvar`] and [`sync::SyncList`]; timed
//! sleep goes through [`Kernel::wait_until`].
//!
//! All precondition violations (reentrant lock acquire, release by a
//! non-owner, joining self, and so on) are programming errors and abort
//! the simulation by panic.

mod alarm;
pub mod errors;
mod kernel;
pub mod machine;
pub mod sched;
pub mod sync;
mod thread;

pub use errors::ContractViolation;
pub use kernel::{Kernel, KernelConfig};
pub use machine::{MachineHandle, KERNEL_TICK, TIMER_TICKS};
pub use sched::{Scheduler, SchedulingPolicy, ThreadQueue};
pub use thread::{Status, Thread};

#[cfg(test)]
mod tests;
