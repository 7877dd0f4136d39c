//! Synchronous rendezvous between speakers and listeners.
//!
//! Any number of threads may queue up to speak and any number to listen,
//! but a word is only transferred when a speaker and a listener are both
//! present; the unmatched side blocks. There is never a moment with both
//! a speaker and a listener waiting.
//!
//! Run with `cargo run --example rendezvous`.

use cooperative_threads::sync::{Condvar, Mutex};
use cooperative_threads::{Kernel, KernelConfig};
use std::collections::VecDeque;
use std::sync::Arc;

const PER_THREAD: u32 = 3;

struct Rendezvous {
    lock: Arc<Mutex>,
    /// Listeners sleep here until a speaker shows up.
    speaker_ready: Condvar,
    /// Speakers sleep here until a listener shows up.
    listener_ready: Condvar,
    state: spin::Mutex<State>,
}

#[derive(Default)]
struct State {
    buffer: VecDeque<u32>,
    waiting_speakers: u32,
    waiting_listeners: u32,
}

impl Rendezvous {
    fn new(kernel: &Kernel) -> Rendezvous {
        let lock = Arc::new(Mutex::new(kernel));
        Rendezvous {
            speaker_ready: Condvar::new(lock.clone()),
            listener_ready: Condvar::new(lock.clone()),
            lock,
            state: spin::Mutex::new(State::default()),
        }
    }

    /// Transfer `word` to exactly one listener, blocking until one is
    /// paired with this speaker.
    fn speak(&self, word: u32) {
        self.lock.acquire();
        let paired = {
            let mut state = self.state.lock();
            state.buffer.push_back(word);
            if state.waiting_listeners > 0 {
                state.waiting_listeners -= 1;
                true
            } else {
                state.waiting_speakers += 1;
                false
            }
        };
        if paired {
            self.speaker_ready.wake();
        } else {
            self.listener_ready.sleep();
        }
        self.lock.release();
    }

    /// Block until paired with a speaker, then return its word.
    fn listen(&self) -> u32 {
        self.lock.acquire();
        let paired = {
            let mut state = self.state.lock();
            if state.waiting_speakers > 0 {
                state.waiting_speakers -= 1;
                true
            } else {
                state.waiting_listeners += 1;
                false
            }
        };
        if paired {
            self.listener_ready.wake();
        } else {
            self.speaker_ready.sleep();
        }
        let word = self
            .state
            .lock()
            .buffer
            .pop_front()
            .expect("paired rendezvous without a buffered word");
        self.lock.release();
        word
    }
}

fn main() {
    let kernel = Kernel::boot(KernelConfig::default());
    let rendezvous = Arc::new(Rendezvous::new(&kernel));

    let mut threads = Vec::new();
    for s in 0..3u32 {
        let k = kernel.clone();
        let rendezvous = rendezvous.clone();
        threads.push(kernel.spawn(&format!("speaker{}", s), move || {
            for i in 0..PER_THREAD {
                let word = s * 10 + i;
                println!("speaker{} says {}", s, word);
                rendezvous.speak(word);
                k.yield_now();
            }
        }));
    }
    for l in 0..3u32 {
        let k = kernel.clone();
        let rendezvous = rendezvous.clone();
        threads.push(kernel.spawn(&format!("listener{}", l), move || {
            for _ in 0..PER_THREAD {
                let word = rendezvous.listen();
                println!("listener{} hears {}", l, word);
                k.yield_now();
            }
        }));
    }

    for thread in &threads {
        kernel.join(thread);
    }
    println!("all words delivered");
}
