//! The kernel: explicit runtime context owning the machine, the scheduler
//! and the dispatcher.
//!
//! There is no global scheduler state. A [`Kernel`] is created by
//! [`Kernel::boot`], which adopts the calling OS thread as the first
//! logical thread, creates the permanent idle thread and arms the
//! hardware timer. Handles are cheap clones of one shared context; thread
//! bodies capture a clone to reach the lifecycle operations.
//!
//! Exactly one logical thread runs at a time. Every scheduling decision
//! happens with the interrupt line masked; the dispatcher switches
//! carriers by resuming the target context and parking the caller's, and
//! the first thing a freshly dispatched thread does is reclaim the
//! previous thread's carrier if that thread finished.

use crate::alarm::Alarm;
use crate::errors::{require, violation, ContractViolation};
use crate::machine::MachineHandle;
use crate::sched::{Scheduler, SchedulingPolicy, ThreadQueue};
use crate::thread::{ExitToken, Status, Thread};
use portable_atomic::{AtomicU64, Ordering};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Id of the adopted boot context. It has no carrier trampoline, so it is
/// the one thread that must not finish.
const BOOT_THREAD_ID: u64 = 1;

/// Boot-time configuration.
#[derive(Debug, Clone, Copy)]
pub struct KernelConfig {
    /// Scheduling policy for every queue the kernel creates.
    pub policy: SchedulingPolicy,
    /// Seed for the hardware timer's jitter; a fixed seed reproduces the
    /// exact interrupt schedule.
    pub timer_seed: u64,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            policy: SchedulingPolicy::default(),
            timer_seed: 1,
        }
    }
}

struct Cpu {
    current: Option<Thread>,
    /// A finished thread parks here until the next dispatched thread
    /// reclaims its carrier.
    to_be_destroyed: Option<Thread>,
}

struct KernelInner {
    machine: MachineHandle,
    scheduler: Box<dyn Scheduler>,
    ready_queue: Box<dyn ThreadQueue>,
    cpu: spin::Mutex<Cpu>,
    idle: spin::Once<Thread>,
    alarm: Alarm,
    next_thread_id: AtomicU64,
}

/// Handle on one running kernel instance.
#[derive(Clone)]
pub struct Kernel {
    inner: Arc<KernelInner>,
}

impl Kernel {
    /// Create a kernel, adopting the calling OS thread as the running boot
    /// context. Returns with the interrupt line unmasked and the timer
    /// armed.
    pub fn boot(config: KernelConfig) -> Kernel {
        let machine = MachineHandle::new();
        let scheduler = config.policy.build(machine.clone());
        let ready_queue = scheduler.new_queue(false);

        let boot = Thread::adopt(BOOT_THREAD_ID, "main".into());
        let kernel = Kernel {
            inner: Arc::new(KernelInner {
                machine,
                scheduler,
                ready_queue,
                cpu: spin::Mutex::new(Cpu {
                    current: Some(boot.clone()),
                    to_be_destroyed: None,
                }),
                idle: spin::Once::new(),
                alarm: Alarm::new(),
                next_thread_id: AtomicU64::new(BOOT_THREAD_ID + 1),
            }),
        };
        kernel.inner.ready_queue.acquire(&boot);

        // The idle thread is dispatched whenever the run queue is empty
        // and is never enqueued itself. Its yield loop is also what keeps
        // virtual time moving while every other thread is blocked.
        let idle = kernel.new_thread("idle", {
            let kernel = kernel.clone();
            move || loop {
                kernel.yield_now();
            }
        });
        kernel.inner.idle.call_once(|| idle.clone());
        kernel.fork(&idle);

        kernel.inner.machine.start_timer(config.timer_seed, {
            let kernel = kernel.clone();
            move || kernel.timer_interrupt()
        });

        log::debug!("kernel booted with {:?}", config.policy);
        kernel.inner.machine.enable();
        kernel
    }

    /// The simulated machine this kernel runs on.
    pub fn machine(&self) -> &MachineHandle {
        &self.inner.machine
    }

    /// The scheduling policy instance, for priority manipulation.
    pub fn scheduler(&self) -> &dyn Scheduler {
        &*self.inner.scheduler
    }

    pub(crate) fn new_wait_queue(&self, transfer_priority: bool) -> Box<dyn ThreadQueue> {
        self.inner.scheduler.new_queue(transfer_priority)
    }

    /// Handle on the currently running logical thread.
    pub fn current(&self) -> Thread {
        let cpu = self.inner.cpu.lock();
        match &cpu.current {
            Some(thread) => thread.clone(),
            None => {
                drop(cpu);
                violation(ContractViolation::Internal("no running thread"))
            }
        }
    }

    /// Create a thread in the `New` state. It does not run until forked.
    pub fn new_thread<F>(&self, name: &str, target: F) -> Thread
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.inner.next_thread_id.fetch_add(1, Ordering::SeqCst);
        Thread::new(id, name.to_string(), target)
    }

    /// Create and immediately fork a thread.
    pub fn spawn<F>(&self, name: &str, target: F) -> Thread
    where
        F: FnOnce() + Send + 'static,
    {
        let thread = self.new_thread(name, target);
        self.fork(&thread);
        thread
    }

    /// Make a `New` thread schedulable. Forking twice, or forking a handle
    /// with no attached computation, is a contract violation.
    pub fn fork(&self, thread: &Thread) {
        require(
            thread.status() == Status::New,
            ContractViolation::ForkNonNewThread,
        );
        require(thread.has_target(), ContractViolation::ForkWithoutTarget);
        log::debug!("forking {}", thread);

        let carrier = {
            let kernel = self.clone();
            let thread = thread.clone();
            std::thread::Builder::new()
                .name(format!("{}", thread))
                .spawn(move || carrier_main(kernel, thread))
        };
        match carrier {
            Ok(handle) => thread.inner.exec.attach_carrier(handle),
            Err(err) => {
                log::error!("carrier spawn failed: {}", err);
                violation(ContractViolation::Internal("could not spawn carrier"))
            }
        }

        let prior = self.inner.machine.disable();
        self.ready(thread);
        self.inner.machine.restore(prior);
    }

    /// Move a thread into the run queue. Requires the interrupt line
    /// masked; the idle thread is marked ready but never enqueued.
    pub fn ready(&self, thread: &Thread) {
        require(
            self.inner.machine.disabled(),
            ContractViolation::InterruptsNotMasked,
        );
        require(
            thread.status() != Status::Ready,
            ContractViolation::ThreadAlreadyReady,
        );
        log::trace!("readying {}", thread);
        thread.set_status(Status::Ready);
        if !self.is_idle(thread) {
            self.inner.ready_queue.wait_for_access(thread);
        }
    }

    /// Give up the processor to the next ready thread. The current thread
    /// stays runnable and re-enters the run queue.
    pub fn yield_now(&self) {
        let current = self.current();
        require(
            current.status() == Status::Running,
            ContractViolation::YieldNotRunning,
        );
        log::trace!("{} yielding", current);

        let prior = self.inner.machine.disable();
        self.ready(&current);
        self.run_next();
        self.inner.machine.restore(prior);
    }

    /// Block the current thread and dispatch another. The caller must
    /// have masked the interrupt line and arranged for some other thread
    /// to eventually ready this one; nothing re-readies it otherwise.
    pub fn sleep(&self) {
        require(
            self.inner.machine.disabled(),
            ContractViolation::InterruptsNotMasked,
        );
        let current = self.current();
        if current.status() != Status::Finished {
            current.set_status(Status::Blocked);
        }
        self.run_next();
    }

    /// Terminate the current thread: mark it finished, wake every joiner
    /// and dispatch away for good. The carrier is reclaimed by the next
    /// thread to run. Threads that return from their computation arrive
    /// here through the carrier trampoline.
    pub fn finish(&self) -> ! {
        self.inner.machine.disable();
        let current = self.current();
        require(
            current.id() != BOOT_THREAD_ID,
            ContractViolation::BootContextFinished,
        );
        log::debug!("finishing {}", current);

        {
            let mut cpu = self.inner.cpu.lock();
            require(
                cpu.to_be_destroyed.is_none(),
                ContractViolation::Internal("two threads pending teardown"),
            );
            cpu.to_be_destroyed = Some(current.clone());
        }
        current.set_status(Status::Finished);

        if let Some(joiners) = current.inner.joiners.lock().take() {
            while let Some(joiner) = joiners.next_thread() {
                self.ready(&joiner);
            }
        }

        self.sleep();
        // A finished thread is only ever woken for teardown, which
        // unwinds out of the dispatcher.
        violation(ContractViolation::Internal("finished thread resumed"))
    }

    /// Wait for `target` to finish. Returns immediately if it already
    /// has; joining self is a contract violation. Under the priority
    /// policy the joined thread inherits the joiner's effective priority.
    pub fn join(&self, target: &Thread) {
        let current = self.current();
        require(current != *target, ContractViolation::JoinSelf);
        log::debug!("{} joining {}", current, target);

        let prior = self.inner.machine.disable();
        if target.status() != Status::Finished {
            {
                let mut joiners = target.inner.joiners.lock();
                let queue = joiners.get_or_insert_with(|| {
                    let queue = self.inner.scheduler.new_queue(true);
                    queue.acquire(target);
                    queue
                });
                queue.wait_for_access(&current);
            }
            self.sleep();
        }
        self.inner.machine.restore(prior);
    }

    /// Block the current thread for at least `delta` ticks of virtual
    /// time. The actual wake happens at the first timer sweep at or after
    /// the due tick. A zero `delta` is a contract violation.
    pub fn wait_until(&self, delta: u64) {
        require(delta > 0, ContractViolation::NonPositiveDelay);

        let prior = self.inner.machine.disable();
        let wake_tick = self.inner.machine.time() + delta;
        let current = self.current();
        log::debug!("{} sleeping until tick {}", current, wake_tick);
        self.inner.alarm.register(wake_tick, current);
        self.sleep();
        self.inner.machine.restore(prior);
    }

    /// Timer interrupt handler: wake due sleepers, then preempt the
    /// interrupted thread so wakeups take effect promptly.
    fn timer_interrupt(&self) {
        let now = self.inner.machine.time();
        for sleeper in self.inner.alarm.due(now) {
            log::trace!("waking {} at tick {}", sleeper, now);
            self.ready(&sleeper);
        }
        self.yield_now();
    }

    fn is_idle(&self, thread: &Thread) -> bool {
        self.inner.idle.get().map_or(false, |idle| idle == thread)
    }

    fn idle_thread(&self) -> Thread {
        match self.inner.idle.get() {
            Some(idle) => idle.clone(),
            None => violation(ContractViolation::Internal("no idle thread")),
        }
    }

    /// Dispatch the next ready thread, falling back to idle. Interrupts
    /// must be masked. Returns when the calling thread is dispatched
    /// again.
    fn run_next(&self) {
        let next = match self.inner.ready_queue.next_thread() {
            Some(next) => next,
            None => self.idle_thread(),
        };

        let prev = {
            let mut cpu = self.inner.cpu.lock();
            cpu.current.replace(next.clone())
        };
        let Some(prev) = prev else {
            violation(ContractViolation::Internal("no running thread"))
        };

        log::trace!("switching {} -> {}", prev, next);
        // Hand the run signal over, then park. When prev is the next
        // thread this consumes its own signal and returns immediately.
        next.inner.exec.resume();
        prev.inner.exec.park();

        self.restore_state(&prev);
    }

    /// First thing a thread does when dispatched: become the running
    /// thread and reclaim the carrier of a previously finished one.
    fn restore_state(&self, thread: &Thread) {
        thread.set_status(Status::Running);
        let victim = self.inner.cpu.lock().to_be_destroyed.take();
        if let Some(victim) = victim {
            log::trace!("reclaiming carrier of {}", victim);
            victim.inner.exec.reclaim();
        }
    }
}

/// Body of every carrier OS thread: wait for the first dispatch, run the
/// computation, then finish. Teardown unwinds with an [`ExitToken`];
/// any other unwind is a stray panic and aborts the whole simulation.
fn carrier_main(kernel: Kernel, thread: Thread) {
    let run = AssertUnwindSafe(|| {
        thread.inner.exec.park();
        kernel.restore_state(&thread);
        kernel.inner.machine.enable();

        if let Some(target) = thread.take_target() {
            target();
        }
        kernel.finish()
    });
    if let Err(payload) = catch_unwind(run) {
        if !payload.is::<ExitToken>() {
            log::error!("{} terminated by panic; aborting", thread);
            std::process::abort();
        }
    }
}
