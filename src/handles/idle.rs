//! Idle handles: fire once per loop turn while started.
//!
//! An active idle handle keeps the poller at a zero timeout, so `run` spins
//! through turns as fast as listeners allow. Useful for deferring work to
//! "between events" and for draining queues incrementally.

use std::rc::Rc;

use crate::core::event_loop::EventLoop;
use crate::core::resource::{AnyResource, ConstructorAccess, Resource, ResourceCore};
use crate::events::{Emitter, EventSource};
use crate::reactor::raw::{RawHandle, RawKind};

/// Published once per loop turn while the idle handle is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleEvent;

/// An idle resource.
pub struct IdleHandle {
    res: ResourceCore<IdleHandle, RawHandle>,
}

fn idle_trampoline(owner: Rc<dyn AnyResource>) {
    if let Ok(idle) = owner.as_any_rc().downcast::<IdleHandle>() {
        idle.res.events().publish(IdleEvent, &idle);
    }
}

fn close_trampoline(owner: Rc<dyn AnyResource>) {
    if let Ok(idle) = owner.as_any_rc().downcast::<IdleHandle>() {
        idle.res.reset();
        idle.res.events().publish(super::CloseEvent, &idle);
    }
}

impl Resource for IdleHandle {
    fn create(_: ConstructorAccess, parent: Rc<EventLoop>) -> Rc<Self> {
        Rc::new_cyclic(|this| IdleHandle {
            res: ResourceCore::new(parent, RawHandle::new(RawKind::Idle), this.clone()),
        })
    }

    fn init(&self) -> bool {
        self.res
            .init_with(self, true, |reactor, raw| reactor.register(raw))
    }
}

impl IdleHandle {
    /// Starts publishing `IdleEvent` once per turn.
    pub fn start(&self) -> bool {
        self.res
            .invoke(self, |reactor, raw| reactor.idle_start(raw, idle_trampoline))
    }

    /// Stops the per-turn callback; the handle can be restarted.
    pub fn stop(&self) -> bool {
        self.res.invoke(self, |reactor, raw| reactor.idle_stop(raw))
    }

    /// Requests teardown; idempotent.
    pub fn close(&self) {
        self.res.close(close_trampoline);
    }

    pub fn active(&self) -> bool {
        self.res.active()
    }

    pub fn closing(&self) -> bool {
        self.res.closing()
    }

    pub fn reference(&self) {
        self.res.reference();
    }

    pub fn unreference(&self) {
        self.res.unreference();
    }

    pub fn referenced(&self) -> bool {
        self.res.referenced()
    }

    /// The loop this handle was created on.
    pub fn parent(&self) -> &Rc<EventLoop> {
        self.res.parent()
    }
}

impl AnyResource for IdleHandle {
    fn as_any_rc(self: Rc<Self>) -> Rc<dyn std::any::Any> {
        self
    }
}

impl EventSource for IdleHandle {
    fn emitter(&self) -> &Emitter<Self> {
        self.res.events()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event_loop::RunMode;
    use std::cell::Cell;

    #[test]
    fn test_idle_fires_once_per_turn() {
        let lp = EventLoop::new().expect("loop creation");
        let idle = lp.resource::<IdleHandle>().expect("idle init");
        let turns = Rc::new(Cell::new(0));

        let t = turns.clone();
        idle.on::<IdleEvent>(move |_, i| {
            t.set(t.get() + 1);
            if t.get() == 4 {
                i.close();
            }
        });
        assert!(idle.start());
        assert!(idle.active());

        lp.run(RunMode::Default);
        assert_eq!(turns.get(), 4, "one event per turn until the listener closed");
    }

    #[test]
    fn test_single_step_runs_exactly_one_turn() {
        let lp = EventLoop::new().expect("loop creation");
        let idle = lp.resource::<IdleHandle>().expect("idle init");
        let turns = Rc::new(Cell::new(0));

        let t = turns.clone();
        idle.on::<IdleEvent>(move |_, _| t.set(t.get() + 1));
        assert!(idle.start());

        assert!(lp.run(RunMode::NoWait), "work remains after a single step");
        assert_eq!(turns.get(), 1);
        assert!(lp.run(RunMode::Once));
        assert_eq!(turns.get(), 2);

        assert!(idle.stop());
        assert!(!idle.active());
        idle.close();
        lp.run(RunMode::NoWait);
    }
}
