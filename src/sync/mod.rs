//! Synchronization primitives built on the kernel's sleep/ready
//! operations: a mutex that participates in priority donation, a
//! condition variable with Mesa semantics, and a blocking list combining
//! the two.

mod condvar;
mod list;
mod mutex;

pub use condvar::Condvar;
pub use list::SyncList;
pub use mutex::Mutex;
