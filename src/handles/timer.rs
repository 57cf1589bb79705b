//! # Timer handles.
//!
//! One-shot and repeating timers driven by the reactor's timer heap. A
//! repeating timer is rearmed *before* its callback runs, so a listener that
//! stops or restarts the timer observes the rearmed state, same as any other
//! caller.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use crate::core::event_loop::EventLoop;
use crate::core::resource::{AnyResource, ConstructorAccess, Resource, ResourceCore};
use crate::error::NativeError;
use crate::events::{Emitter, EventSource};
use crate::reactor::raw::{RawHandle, RawKind};

/// Published on each timer expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerEvent;

/// A timer resource.
///
/// Created through the loop factory; see `EventLoop::resource`.
pub struct TimerHandle {
    res: ResourceCore<TimerHandle, RawHandle>,
    repeat: Cell<Duration>,
}

fn timer_trampoline(owner: Rc<dyn AnyResource>) {
    if let Ok(timer) = owner.as_any_rc().downcast::<TimerHandle>() {
        timer.res.events().publish(TimerEvent, &timer);
    }
}

fn close_trampoline(owner: Rc<dyn AnyResource>) {
    if let Ok(timer) = owner.as_any_rc().downcast::<TimerHandle>() {
        timer.res.reset();
        timer.res.events().publish(super::CloseEvent, &timer);
    }
}

impl Resource for TimerHandle {
    fn create(_: ConstructorAccess, parent: Rc<EventLoop>) -> Rc<Self> {
        Rc::new_cyclic(|this| TimerHandle {
            res: ResourceCore::new(parent, RawHandle::new(RawKind::Timer), this.clone()),
            repeat: Cell::new(Duration::ZERO),
        })
    }

    fn init(&self) -> bool {
        self.res
            .init_with(self, true, |reactor, raw| reactor.register(raw))
    }
}

impl TimerHandle {
    /// Arms the timer: one `TimerEvent` after `timeout`, then one per
    /// `repeat` interval (a zero `repeat` means one-shot). Starting an
    /// already-armed timer rearms it.
    pub fn start(&self, timeout: Duration, repeat: Duration) -> bool {
        self.repeat.set(repeat);
        self.res.invoke(self, |reactor, raw| {
            reactor.timer_start(raw, timeout, repeat, timer_trampoline)
        })
    }

    /// Disarms the timer. The handle stays initialized and can be restarted.
    pub fn stop(&self) -> bool {
        self.res.invoke(self, |reactor, raw| reactor.timer_stop(raw))
    }

    /// Restarts the timer using the stored repeat value as both timeout and
    /// repeat. Fails with `InvalidArg` when no repeat value is set.
    pub fn again(&self) -> bool {
        let repeat = self.repeat.get();
        self.res.invoke(self, |reactor, raw| {
            if repeat.is_zero() {
                return Err(NativeError::InvalidArg);
            }
            reactor.timer_start(raw, repeat, repeat, timer_trampoline)
        })
    }

    /// The stored repeat interval.
    pub fn repeat(&self) -> Duration {
        self.repeat.get()
    }

    /// Sets the repeat interval used by the next `start`/`again`.
    pub fn set_repeat(&self, repeat: Duration) {
        self.repeat.set(repeat);
    }

    /// Requests teardown; idempotent. The close callback publishes one
    /// `CloseEvent` on a later loop turn.
    pub fn close(&self) {
        self.res.close(close_trampoline);
    }

    pub fn active(&self) -> bool {
        self.res.active()
    }

    pub fn closing(&self) -> bool {
        self.res.closing()
    }

    /// Re-references the handle so it keeps `run` alive again.
    pub fn reference(&self) {
        self.res.reference();
    }

    /// Unreferences the handle: it still fires while the loop runs for other
    /// reasons, but no longer keeps `run` alive by itself.
    pub fn unreference(&self) {
        self.res.unreference();
    }

    pub fn referenced(&self) -> bool {
        self.res.referenced()
    }

    /// The loop this timer was created on.
    pub fn parent(&self) -> &Rc<EventLoop> {
        self.res.parent()
    }
}

impl AnyResource for TimerHandle {
    fn as_any_rc(self: Rc<Self>) -> Rc<dyn std::any::Any> {
        self
    }
}

impl EventSource for TimerHandle {
    fn emitter(&self) -> &Emitter<Self> {
        self.res.events()
    }
}
