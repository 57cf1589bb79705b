//! Offloading a blocking computation to the worker pool.
//!
//! The closure runs on a pool thread; the completion event fires back on the
//! loop thread, where it is safe to touch loop-owned state.
//!
//! Run with: `cargo run --example offload`

use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use eventide::{EventLoop, EventSource, NativeError, RunMode, WorkEvent, WorkRequest};

fn main() -> Result<(), NativeError> {
    let lp = EventLoop::new()?;
    let work: Rc<WorkRequest> = lp.resource().expect("work request");

    let result = Arc::new(AtomicU64::new(0));

    let out = result.clone();
    work.queue(move || {
        // Pretend this is something worth keeping off the loop thread.
        std::thread::sleep(Duration::from_millis(200));
        let sum: u64 = (1..=1_000_000u64).sum();
        out.store(sum, Ordering::Release);
    });

    let out = result.clone();
    work.on::<WorkEvent>(move |_, _| {
        println!("pool finished: {}", out.load(Ordering::Acquire));
    });

    lp.run(RunMode::Default);
    lp.close();
    Ok(())
}
