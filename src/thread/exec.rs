//! Execution backing for logical threads.
//!
//! Every logical thread is carried by a dedicated OS thread that spends its
//! life parked on a condition variable and runs only between a `resume` on
//! its own slot and a `park` on it. A context switch is therefore
//! `target.resume()` followed by `self.park()`; because at most one slot
//! holds a run signal at any time, exactly one carrier OS thread is awake
//! and the runtime never observes real parallelism.
//!
//! Teardown is cooperative as well: the dispatcher signals `Exit` instead
//! of `Run`, the parked carrier unwinds with an [`ExitToken`] and its
//! trampoline lets the OS thread terminate.

use std::panic::panic_any;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;

/// Unwind payload used to tear a parked carrier thread down. The spawn
/// trampoline catches exactly this type; any other panic aborts the
/// process.
pub(crate) struct ExitToken;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Signal {
    /// Stay parked.
    Wait,
    /// Wake up and run until the next `park`.
    Run,
    /// Wake up and unwind out of the carrier.
    Exit,
}

/// One logical thread's parking slot plus its carrier OS thread handle.
pub(crate) struct ExecContext {
    slot: Mutex<Signal>,
    wakeup: Condvar,
    carrier: Mutex<Option<JoinHandle<()>>>,
}

impl ExecContext {
    pub(crate) fn new() -> Self {
        Self {
            slot: Mutex::new(Signal::Wait),
            wakeup: Condvar::new(),
            carrier: Mutex::new(None),
        }
    }

    /// Record the OS thread carrying this context so it can be reclaimed
    /// after the context finishes.
    pub(crate) fn attach_carrier(&self, handle: JoinHandle<()>) {
        *lock(&self.carrier) = Some(handle);
    }

    /// Hand the run signal to this context. The caller parks itself right
    /// after, completing the switch.
    pub(crate) fn resume(&self) {
        let mut sig = lock(&self.slot);
        *sig = Signal::Run;
        self.wakeup.notify_one();
    }

    /// Block the calling carrier until this context is resumed. Consumes
    /// the run signal; unwinds with [`ExitToken`] if teardown was signaled
    /// instead.
    pub(crate) fn park(&self) {
        let mut sig = lock(&self.slot);
        loop {
            match *sig {
                Signal::Wait => {
                    sig = self
                        .wakeup
                        .wait(sig)
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                }
                Signal::Run => {
                    *sig = Signal::Wait;
                    return;
                }
                Signal::Exit => {
                    drop(sig);
                    panic_any(ExitToken);
                }
            }
        }
    }

    /// Wake the parked carrier for unwinding, then wait for its OS thread
    /// to terminate. Called by the thread dispatched *after* this context
    /// finished, never by the context itself.
    pub(crate) fn reclaim(&self) {
        {
            let mut sig = lock(&self.slot);
            *sig = Signal::Exit;
            self.wakeup.notify_one();
        }
        if let Some(handle) = lock(&self.carrier).take() {
            // The trampoline converts ExitToken into a clean return, so
            // the carrier never terminates by panic here.
            let _ = handle.join();
        }
    }
}

/// Poisoning only happens while the process is already aborting on a stray
/// panic; recover the guard so teardown paths keep working.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn resume_before_park_is_not_lost() {
        let ctx = ExecContext::new();
        ctx.resume();
        // Must return immediately instead of blocking.
        ctx.park();
    }

    #[test]
    fn park_blocks_until_resumed() {
        let ctx = Arc::new(ExecContext::new());
        let woke = Arc::new(AtomicBool::new(false));

        let carrier = {
            let ctx = ctx.clone();
            let woke = woke.clone();
            std::thread::spawn(move || {
                ctx.park();
                woke.store(true, Ordering::SeqCst);
            })
        };

        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(!woke.load(Ordering::SeqCst));
        ctx.resume();
        carrier.join().unwrap();
        assert!(woke.load(Ordering::SeqCst));
    }

    #[test]
    fn reclaim_unwinds_a_parked_carrier() {
        let ctx = Arc::new(ExecContext::new());
        let carrier = {
            let ctx = ctx.clone();
            std::thread::spawn(move || {
                let unwound = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    ctx.park();
                }));
                assert!(matches!(
                    unwound.map_err(|p| p.downcast::<ExitToken>()),
                    Err(Ok(_))
                ));
            })
        };
        ctx.attach_carrier(carrier);
        ctx.reclaim();
    }
}
