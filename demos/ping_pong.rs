//! Two threads bouncing a counter through a pair of blocking lists.
//!
//! Run with `cargo run --example ping_pong`.

use cooperative_threads::sync::SyncList;
use cooperative_threads::{Kernel, KernelConfig};
use std::sync::Arc;

const ROUNDS: u32 = 10;

fn main() {
    let kernel = Kernel::boot(KernelConfig::default());

    let ping: Arc<SyncList<u32>> = Arc::new(SyncList::new(&kernel));
    let pong: Arc<SyncList<u32>> = Arc::new(SyncList::new(&kernel));

    let echo = {
        let ping = ping.clone();
        let pong = pong.clone();
        kernel.spawn("echo", move || {
            for _ in 0..ROUNDS {
                let n = ping.remove_first();
                println!("echo   got {}", n);
                pong.add(n + 1);
            }
        })
    };

    for n in 0..ROUNDS {
        ping.add(n);
        let back = pong.remove_first();
        println!("main   got {}", back);
    }
    kernel.join(&echo);

    println!("done after {} rounds", ROUNDS);
}
