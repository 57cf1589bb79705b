//! Repeating timer with a clean shutdown.
//!
//! Run with: `cargo run --example timer_tick`

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use eventide::{EventLoop, EventSource, NativeError, RunMode, TimerEvent, TimerHandle};

fn main() -> Result<(), NativeError> {
    let lp = EventLoop::new()?;
    let timer = lp.resource::<TimerHandle>().expect("timer");

    let ticks = Rc::new(Cell::new(0u32));
    let counter = ticks.clone();
    timer.on::<TimerEvent>(move |_, t| {
        counter.set(counter.get() + 1);
        println!("tick {}", counter.get());
        if counter.get() == 5 {
            t.close();
        }
    });

    timer.start(Duration::from_millis(100), Duration::from_millis(100));
    lp.run(RunMode::Default);

    // Nothing is registered anymore, so the loop can be closed for real.
    lp.close();
    println!("done after {} ticks", ticks.get());
    Ok(())
}
