//! Logical thread handles.
//!
//! A [`Thread`] is a cheap cloneable handle on one logical thread: an id,
//! a debug name, the lifecycle status byte and the execution backing. All
//! lifecycle operations (fork, yield, sleep, join) live on the kernel,
//! which owns the dispatcher; this module only carries per-thread state.

mod exec;

pub(crate) use exec::{ExecContext, ExitToken};

use crate::sched::ThreadQueue;
use portable_atomic::{AtomicU8, Ordering};
use std::fmt;
use std::sync::Arc;

/// Lifecycle status of a logical thread.
///
/// `New` threads hold a computation but are not yet schedulable; `fork`
/// moves them to `Ready`. Exactly one thread is `Running` at any time.
/// `Finished` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    New = 0,
    Ready = 1,
    Running = 2,
    Blocked = 3,
    Finished = 4,
}

impl Status {
    fn from_u8(raw: u8) -> Status {
        match raw {
            0 => Status::New,
            1 => Status::Ready,
            2 => Status::Running,
            3 => Status::Blocked,
            _ => Status::Finished,
        }
    }
}

type Target = Box<dyn FnOnce() + Send + 'static>;

pub(crate) struct ThreadInner {
    id: u64,
    name: String,
    status: AtomicU8,
    /// Taken exactly once, by the carrier trampoline.
    target: spin::Mutex<Option<Target>>,
    pub(crate) exec: ExecContext,
    /// Created lazily on the first join, drained at finish.
    pub(crate) joiners: spin::Mutex<Option<Box<dyn ThreadQueue>>>,
}

/// Handle on one logical thread. Clones refer to the same thread; identity
/// is the thread id.
#[derive(Clone)]
pub struct Thread {
    pub(crate) inner: Arc<ThreadInner>,
}

impl Thread {
    pub(crate) fn new<F>(id: u64, name: String, target: F) -> Thread
    where
        F: FnOnce() + Send + 'static,
    {
        Thread {
            inner: Arc::new(ThreadInner {
                id,
                name,
                status: AtomicU8::new(Status::New as u8),
                target: spin::Mutex::new(Some(Box::new(target))),
                exec: ExecContext::new(),
                joiners: spin::Mutex::new(None),
            }),
        }
    }

    /// Wrap an already-running context (the boot OS thread) in a handle.
    pub(crate) fn adopt(id: u64, name: String) -> Thread {
        Thread {
            inner: Arc::new(ThreadInner {
                id,
                name,
                status: AtomicU8::new(Status::Running as u8),
                target: spin::Mutex::new(None),
                exec: ExecContext::new(),
                joiners: spin::Mutex::new(None),
            }),
        }
    }

    /// Monotonic non-zero id, unique within one kernel.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Debug name given at creation.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn status(&self) -> Status {
        Status::from_u8(self.inner.status.load(Ordering::SeqCst))
    }

    pub(crate) fn set_status(&self, status: Status) {
        self.inner.status.store(status as u8, Ordering::SeqCst);
    }

    pub(crate) fn take_target(&self) -> Option<Target> {
        self.inner.target.lock().take()
    }

    pub(crate) fn has_target(&self) -> bool {
        self.inner.target.lock().is_some()
    }
}

impl PartialEq for Thread {
    fn eq(&self, other: &Thread) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Thread {}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{} ({:?})", self.inner.name, self.inner.id, self.status())
    }
}

impl fmt::Display for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.inner.name, self.inner.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_thread_starts_in_new() {
        let t = Thread::new(7, "worker".into(), || {});
        assert_eq!(t.status(), Status::New);
        assert_eq!(t.id(), 7);
        assert_eq!(t.name(), "worker");
    }

    #[test]
    fn adopted_context_starts_running() {
        let t = Thread::adopt(1, "boot".into());
        assert_eq!(t.status(), Status::Running);
    }

    #[test]
    fn clones_share_identity_and_status() {
        let t = Thread::new(3, "a".into(), || {});
        let u = t.clone();
        t.set_status(Status::Ready);
        assert_eq!(u.status(), Status::Ready);
        assert_eq!(t, u);
        assert_ne!(t, Thread::new(4, "a".into(), || {}));
    }

    #[test]
    fn target_is_taken_once() {
        let t = Thread::new(2, "b".into(), || {});
        assert!(t.take_target().is_some());
        assert!(t.take_target().is_none());
    }
}
