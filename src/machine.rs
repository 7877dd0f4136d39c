//! Simulated interrupt line, virtual clock and hardware timer.
//!
//! The runtime never touches hardware atomics for mutual exclusion; the only
//! synchronization mechanism it knows is masking this simulated interrupt
//! line. Virtual time advances solely when the line transitions from masked
//! to unmasked, at which point every pending interrupt whose due tick has
//! arrived is delivered. Because only one logical thread executes at any
//! instant, this model is sufficient, and incorrectly synchronized client
//! code can only fail at the points where time advances.
//!
//! The recurring hardware timer fires approximately every
//! [`TIMER_TICKS`] ticks with a small pseudo-random jitter, re-arming itself
//! on every delivery. Its handler hook is installed once at boot.

use crate::errors::{require, violation, ContractViolation};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Ticks added whenever the interrupt line goes from masked to unmasked.
pub const KERNEL_TICK: u64 = 10;

/// Nominal interval, in ticks, between two firings of the hardware timer.
pub const TIMER_TICKS: u64 = 500;

/// One-shot interrupt callback.
type InterruptHandler = Box<dyn FnOnce() + Send>;

/// Recurring timer callback, installed once at boot.
type TimerHandler = Box<dyn FnMut() + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct PendingKey {
    time: u64,
    seq: u64,
}

enum Pending {
    /// A one-shot interrupt scheduled through [`MachineHandle::schedule`].
    OneShot {
        label: &'static str,
        handler: InterruptHandler,
    },
    /// A firing of the recurring hardware timer.
    TimerFire,
}

struct TimerState {
    prng: XorShift,
    /// Taken out while the handler runs so delivery never re-enters it.
    handler: Option<TimerHandler>,
}

struct MachineInner {
    enabled: bool,
    ticks: u64,
    pending: BTreeMap<PendingKey, Pending>,
    next_seq: u64,
    timer: Option<TimerState>,
}

/// Cloneable handle on the simulated machine.
///
/// This is the narrow boundary every other module consumes: mask and unmask
/// the interrupt line, read the tick counter, and arrange one-shot future
/// callbacks.
#[derive(Clone)]
pub struct MachineHandle {
    inner: Arc<spin::Mutex<MachineInner>>,
}

impl MachineHandle {
    /// Create a machine with the interrupt line initially masked and the
    /// clock at tick zero.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(spin::Mutex::new(MachineInner {
                enabled: false,
                ticks: 0,
                pending: BTreeMap::new(),
                next_seq: 0,
                timer: None,
            })),
        }
    }

    /// Mask the interrupt line, returning whether it was previously
    /// unmasked.
    pub fn disable(&self) -> bool {
        self.set_status(false)
    }

    /// Unmask the interrupt line. Equivalent to `restore(true)`.
    pub fn enable(&self) {
        self.set_status(true);
    }

    /// Restore the interrupt line to a previously observed state.
    ///
    /// Callers that mask the line must restore the *prior* state rather
    /// than unconditionally unmasking, so that nested masking composes.
    pub fn restore(&self, prior: bool) {
        self.set_status(prior);
    }

    /// Whether the interrupt line is currently unmasked.
    pub fn enabled(&self) -> bool {
        self.inner.lock().enabled
    }

    /// Whether the interrupt line is currently masked.
    pub fn disabled(&self) -> bool {
        !self.enabled()
    }

    /// Current virtual time in ticks.
    pub fn time(&self) -> u64 {
        self.inner.lock().ticks
    }

    /// Arrange for `handler` to run once at least `delta` ticks of virtual
    /// time have elapsed. A zero `delta` is a contract violation.
    pub fn schedule<F>(&self, delta: u64, label: &'static str, handler: F)
    where
        F: FnOnce() + Send + 'static,
    {
        require(delta > 0, ContractViolation::NonPositiveDelay);

        let mut st = self.inner.lock();
        let key = PendingKey {
            time: st.ticks + delta,
            seq: st.next_seq,
        };
        st.next_seq += 1;
        log::trace!("scheduling {} interrupt at tick {}", label, key.time);
        st.pending.insert(key, Pending::OneShot {
            label,
            handler: Box::new(handler),
        });
    }

    /// Install the recurring timer and arm its first firing.
    ///
    /// The handler runs with the interrupt line masked, once per firing.
    /// Only one timer exists per machine; installing it twice is an
    /// internal invariant failure.
    pub(crate) fn start_timer<F>(&self, seed: u64, handler: F)
    where
        F: FnMut() + Send + 'static,
    {
        let mut st = self.inner.lock();
        if st.timer.is_some() {
            drop(st);
            violation(ContractViolation::Internal("timer installed twice"));
        }
        let mut timer = TimerState {
            prng: XorShift::new(seed),
            handler: Some(Box::new(handler)),
        };
        let delay = timer.next_delay();
        let key = PendingKey {
            time: st.ticks + delay,
            seq: st.next_seq,
        };
        st.next_seq += 1;
        st.pending.insert(key, Pending::TimerFire);
        st.timer = Some(timer);
    }

    /// Set the interrupt line state, returning the prior state. A
    /// masked-to-unmasked transition advances the clock and delivers every
    /// due pending interrupt before the line is finally unmasked.
    fn set_status(&self, status: bool) -> bool {
        let old = {
            let mut st = self.inner.lock();
            let old = st.enabled;
            st.enabled = status;
            if !(!old && status) {
                return old;
            }
            st.ticks += KERNEL_TICK;
            // The line stays masked while handlers run.
            st.enabled = false;
            old
        };

        self.deliver_due();
        self.inner.lock().enabled = true;
        old
    }

    /// Pop and run pending interrupts, oldest due first, until none are
    /// due. The machine lock is released around every handler invocation:
    /// a handler is free to block the current logical thread, and delivery
    /// resumes on this call stack once the thread is dispatched again.
    fn deliver_due(&self) {
        loop {
            let job = {
                let mut st = self.inner.lock();
                match st.pending.pop_first() {
                    Some((key, job)) if key.time <= st.ticks => Some(job),
                    Some((key, job)) => {
                        st.pending.insert(key, job);
                        None
                    }
                    None => None,
                }
            };

            match job {
                None => break,
                Some(Pending::OneShot { label, handler }) => {
                    log::trace!("delivering {} interrupt", label);
                    handler();
                }
                Some(Pending::TimerFire) => self.fire_timer(),
            }
        }
    }

    /// Re-arm the timer, then run its handler if it is not already running
    /// further down this (suspended) call stack.
    fn fire_timer(&self) {
        let handler = {
            let mut st = self.inner.lock();
            let Some(timer) = st.timer.as_mut() else {
                return;
            };
            let delay = timer.next_delay();
            let taken = timer.handler.take();
            let key = PendingKey {
                time: st.ticks + delay,
                seq: st.next_seq,
            };
            st.next_seq += 1;
            st.pending.insert(key, Pending::TimerFire);
            taken
        };

        if let Some(mut handler) = handler {
            handler();
            let mut st = self.inner.lock();
            if let Some(timer) = st.timer.as_mut() {
                timer.handler = Some(handler);
            }
        }
    }
}

impl Default for MachineHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerState {
    /// Nominal interval plus a deterministic jitter of roughly ±5%.
    fn next_delay(&mut self) -> u64 {
        let spread = TIMER_TICKS / 10;
        TIMER_TICKS + self.prng.below(spread) - spread / 2
    }
}

/// Small deterministic generator (xorshift64*) used for timer jitter, so a
/// given seed reproduces the exact same interrupt schedule.
struct XorShift {
    state: u64,
}

impl XorShift {
    fn new(seed: u64) -> Self {
        Self {
            state: seed | 1,
        }
    }

    fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x.wrapping_mul(0x2545_f491_4f6c_dd1d)
    }

    fn below(&mut self, bound: u64) -> u64 {
        if bound == 0 {
            0
        } else {
            self.next() % bound
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn starts_masked_at_tick_zero() {
        let machine = MachineHandle::new();
        assert!(machine.disabled());
        assert_eq!(machine.time(), 0);
    }

    #[test]
    fn disable_returns_prior_state() {
        let machine = MachineHandle::new();
        machine.enable();
        assert!(machine.disable());
        assert!(!machine.disable());
        machine.restore(true);
        assert!(machine.enabled());
    }

    #[test]
    fn time_advances_only_on_unmask_transition() {
        let machine = MachineHandle::new();
        machine.enable();
        assert_eq!(machine.time(), KERNEL_TICK);
        // Already unmasked: no transition, no tick.
        machine.enable();
        assert_eq!(machine.time(), KERNEL_TICK);
        machine.disable();
        machine.restore(false);
        assert_eq!(machine.time(), KERNEL_TICK);
        machine.restore(true);
        assert_eq!(machine.time(), 2 * KERNEL_TICK);
    }

    #[test]
    fn one_shot_interrupts_fire_in_due_order() {
        let machine = MachineHandle::new();
        let fired = Arc::new(spin::Mutex::new(Vec::new()));

        for (delta, tag) in [(30u64, "late"), (10, "early"), (30, "late2")] {
            let fired = fired.clone();
            machine.schedule(delta, "test", move || fired.lock().push(tag));
        }

        machine.enable(); // tick 10: "early" due
        assert_eq!(*fired.lock(), vec!["early"]);
        machine.disable();
        machine.restore(true); // tick 20
        machine.disable();
        machine.restore(true); // tick 30: both "late" entries, insertion order
        assert_eq!(*fired.lock(), vec!["early", "late", "late2"]);
    }

    #[test]
    fn handlers_run_with_the_line_masked() {
        let machine = MachineHandle::new();
        let observed = Arc::new(AtomicU64::new(u64::MAX));
        let probe = machine.clone();
        let observed2 = observed.clone();
        machine.schedule(5, "probe", move || {
            observed2.store(probe.disabled() as u64, Ordering::SeqCst);
        });
        machine.enable();
        assert_eq!(observed.load(Ordering::SeqCst), 1);
        assert!(machine.enabled());
    }

    #[test]
    fn timer_rearms_itself() {
        let machine = MachineHandle::new();
        let fired = Arc::new(AtomicU64::new(0));
        let counter = fired.clone();
        machine.start_timer(42, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        // Drive well past two nominal intervals.
        machine.enable();
        for _ in 0..(2 * TIMER_TICKS / KERNEL_TICK) + 20 {
            machine.disable();
            machine.restore(true);
        }
        assert!(fired.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    #[should_panic(expected = "delay must be at least one tick")]
    fn zero_delay_is_rejected() {
        let machine = MachineHandle::new();
        machine.schedule(0, "bogus", || {});
    }
}
