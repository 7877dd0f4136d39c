//! The river crossing puzzle: adults and children must all get from the
//! near bank to the far bank with one boat that carries either one adult
//! or up to two children, and every person is its own thread.
//!
//! The schedule that emerges: two children row across, one rows back,
//! an adult rows across, the child on the far bank rows back, repeat.
//! Threads coordinate through one mutex and three condition variables,
//! re-checking shared bank state after every wake.
//!
//! Run with `cargo run --example river_crossing`.

use cooperative_threads::sync::{Condvar, Mutex};
use cooperative_threads::{Kernel, KernelConfig};
use std::sync::Arc;

const ADULTS: u32 = 3;
const CHILDREN: u32 = 2;

struct River {
    lock: Arc<Mutex>,
    /// Children on the near bank wait here for the boat and their turn.
    child_near: Condvar,
    /// Children on the far bank wait here to row the boat back.
    child_far: Condvar,
    /// Adults wait here for their turn with the boat.
    adult_near: Condvar,
    state: spin::Mutex<Banks>,
}

struct Banks {
    children_near: u32,
    adults_near: u32,
    children_far: u32,
    adults_far: u32,
    boat_near: bool,
    /// The next trip from the near bank belongs to an adult.
    adult_turn: bool,
    /// Children already aboard for the current two-child trip.
    seats: u32,
    done: bool,
}

impl River {
    fn new(kernel: &Kernel, adults: u32, children: u32) -> River {
        let lock = Arc::new(Mutex::new(kernel));
        River {
            child_near: Condvar::new(lock.clone()),
            child_far: Condvar::new(lock.clone()),
            adult_near: Condvar::new(lock.clone()),
            lock,
            state: spin::Mutex::new(Banks {
                children_near: children,
                adults_near: adults,
                children_far: 0,
                adults_far: 0,
                boat_near: true,
                adult_turn: false,
                seats: 0,
                done: false,
            }),
        }
    }

    /// Wake every waiter so each re-checks the bank state.
    fn broadcast(&self) {
        self.child_near.wake_all();
        self.child_far.wake_all();
        self.adult_near.wake_all();
    }

    fn adult(&self, name: &str) {
        self.lock.acquire();
        loop {
            let ready = {
                let state = self.state.lock();
                state.done || (state.boat_near && state.adult_turn)
            };
            if ready {
                break;
            }
            self.adult_near.sleep();
        }
        {
            let mut state = self.state.lock();
            if !state.done {
                state.adults_near -= 1;
                state.adults_far += 1;
                state.boat_near = false;
                state.adult_turn = false;
                println!("{} rows to the far bank", name);
            }
        }
        // A child on the far bank must bring the boat back.
        self.broadcast();
        self.lock.release();
    }

    fn child(&self, name: &str) {
        let mut on_near_bank = true;
        self.lock.acquire();
        loop {
            if self.state.lock().done {
                break;
            }
            if on_near_bank {
                on_near_bank = self.child_near_step(name);
            } else {
                self.child_far_step(name);
                on_near_bank = true;
            }
        }
        self.lock.release();
    }

    /// One decision on the near bank. Returns the bank the child is on
    /// afterwards (true = still near).
    fn child_near_step(&self, name: &str) -> bool {
        enum Move {
            Wait,
            Pilot,
            Passenger,
            Solo,
        }

        let action = {
            let mut state = self.state.lock();
            if !state.boat_near || state.adult_turn {
                Move::Wait
            } else if state.children_near == 1 && state.adults_near == 0 && state.seats == 0 {
                // Last person on the near bank: cross alone and finish.
                state.children_near -= 1;
                state.children_far += 1;
                state.boat_near = false;
                state.done = true;
                Move::Solo
            } else if state.children_near >= 2 && state.seats == 0 {
                state.seats = 1;
                state.children_near -= 1;
                state.children_far += 1;
                Move::Pilot
            } else if state.seats == 1 {
                state.seats = 0;
                state.children_near -= 1;
                state.children_far += 1;
                state.boat_near = false;
                if state.children_near == 0 && state.adults_near == 0 {
                    state.done = true;
                } else {
                    state.adult_turn = state.adults_near > 0;
                }
                Move::Passenger
            } else {
                Move::Wait
            }
        };

        match action {
            Move::Wait => {
                self.child_near.sleep();
                true
            }
            Move::Solo => {
                println!("{} rows to the far bank alone", name);
                self.broadcast();
                false
            }
            Move::Pilot => {
                println!("{} rows to the far bank", name);
                // Summon a passenger, then wait on the far bank.
                self.broadcast();
                false
            }
            Move::Passenger => {
                println!("{} rides to the far bank", name);
                self.broadcast();
                false
            }
        }
    }

    /// One decision on the far bank: row back when the boat is here and
    /// the crossing is not finished.
    fn child_far_step(&self, name: &str) {
        loop {
            let ready = {
                let state = self.state.lock();
                state.done || !state.boat_near
            };
            if ready {
                break;
            }
            self.child_far.sleep();
        }
        let mut rowed = false;
        {
            let mut state = self.state.lock();
            if !state.done {
                state.children_far -= 1;
                state.children_near += 1;
                state.boat_near = true;
                rowed = true;
            }
        }
        if rowed {
            println!("{} rows back to the near bank", name);
            self.broadcast();
        }
    }
}

fn main() {
    let kernel = Kernel::boot(KernelConfig::default());
    let river = Arc::new(River::new(&kernel, ADULTS, CHILDREN));

    let mut people = Vec::new();
    for i in 0..ADULTS {
        let river = river.clone();
        let name = format!("adult{}", i);
        let label = name.clone();
        people.push(kernel.spawn(&name, move || river.adult(&label)));
    }
    for i in 0..CHILDREN {
        let river = river.clone();
        let name = format!("child{}", i);
        let label = name.clone();
        people.push(kernel.spawn(&name, move || river.child(&label)));
    }

    for person in &people {
        kernel.join(person);
    }

    let state = river.state.lock();
    println!(
        "crossing complete: {} adults and {} children on the far bank",
        state.adults_far, state.children_far
    );
}
