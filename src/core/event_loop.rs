//! # The event loop: factory and owner-root for every resource.
//!
//! [`EventLoop`] owns the reactor and is the only place resources come from.
//! A resource created on one loop lives and dies on that loop: it keeps an
//! `Rc` to its parent, so a loop can never be dropped out from under its
//! resources, and nothing here lets a resource migrate.
//!
//! ## Architecture
//! ```text
//!        EventLoop (Rc) ───── owns ────► Reactor (poll / timers / pool)
//!         │        ▲                        │ completion
//!  factory│        │ parent Rc              ▼
//!         ▼        │                  trampoline ── back-pointer ──► wrapper
//!   Rc<TimerHandle> / Rc<IdleHandle> / ...          └─► publish(typed event)
//! ```
//!
//! ## Rules
//! - Single-threaded: every listener dispatch, state transition and anchor
//!   toggle happens on the thread that calls [`EventLoop::run`]. The only
//!   cross-thread entry points are `WakeupSender::send` and the worker pool
//!   completing a job, and both surface their events on the loop thread.
//! - The loop is itself an event source: loop-level failures (e.g. closing
//!   a busy loop) surface as `ErrorEvent`s on the loop, not panics.

use std::rc::Rc;
use std::time::Instant;

use tracing::debug;

use crate::core::resource::{AnyResource, ConstructorAccess, Resource};
use crate::error::{ErrorEvent, NativeError};
use crate::events::{Emitter, EventSource};
use crate::handles::{HandleRef, IdleHandle, TimerHandle, WakeupHandle};
use crate::reactor::pool::PoolConfig;
use crate::reactor::raw::RawKind;
use crate::reactor::Reactor;

/// How [`EventLoop::run`] drives turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Run turns until no referenced work remains or [`EventLoop::stop`] is
    /// called.
    Default,
    /// Run a single turn, waiting for activity if none is due.
    Once,
    /// Run a single turn without waiting; poll with a zero timeout.
    NoWait,
}

impl Default for RunMode {
    fn default() -> Self {
        RunMode::Default
    }
}

/// The event-processing engine and resource factory.
pub struct EventLoop {
    reactor: Reactor,
    events: Emitter<EventLoop>,
    this: std::rc::Weak<EventLoop>,
}

impl EventLoop {
    /// Creates a loop with the default worker-pool sizing.
    pub fn new() -> Result<Rc<Self>, NativeError> {
        let reactor = Reactor::new()?;
        Ok(Rc::new_cyclic(|this| EventLoop {
            reactor,
            events: Emitter::new(),
            this: this.clone(),
        }))
    }

    /// Creates a loop with explicit worker-pool sizing. The pool itself is
    /// spawned lazily, on the first queued job.
    pub fn with_pool_config(config: PoolConfig) -> Result<Rc<Self>, NativeError> {
        let lp = Self::new()?;
        lp.reactor.set_pool_config(config);
        Ok(lp)
    }

    pub(crate) fn reactor(&self) -> &Reactor {
        &self.reactor
    }

    fn shared(&self) -> Rc<EventLoop> {
        self.this
            .upgrade()
            .expect("an EventLoop is only ever constructed inside an Rc")
    }

    /// Creates and initializes a resource of kind `R`.
    ///
    /// Returns `None` when initialization fails; the error event published
    /// during init had no listeners yet, so callers that need to observe it
    /// should use [`EventLoop::uninitialized_resource`] and call
    /// [`Resource::init`] themselves after registering listeners.
    pub fn resource<R: Resource>(&self) -> Option<Rc<R>> {
        let resource = self.uninitialized_resource::<R>();
        resource.init().then(|| resource)
    }

    /// Creates a resource of kind `R` without initializing it.
    pub fn uninitialized_resource<R: Resource>(&self) -> Rc<R> {
        R::create(ConstructorAccess(()), self.shared())
    }

    /// Drives the reactor. Returns true if referenced work remains (i.e. the
    /// loop stopped early or single-stepped with activity left over).
    pub fn run(&self, mode: RunMode) -> bool {
        self.reactor.run(mode)
    }

    /// Makes the innermost [`EventLoop::run`] return after the current turn.
    pub fn stop(&self) {
        self.reactor.stop();
    }

    /// Whether any referenced active handle, pending close, or in-flight
    /// request keeps the loop running.
    pub fn alive(&self) -> bool {
        self.reactor.alive()
    }

    /// Loop time, cached once per turn.
    pub fn now(&self) -> Instant {
        self.reactor.now()
    }

    /// Forces a refresh of the cached loop time.
    pub fn update_time(&self) {
        self.reactor.update_now();
    }

    /// Closes the loop. Fails with a published `ErrorEvent` (`Busy`) while
    /// resources are still registered; once closed, initializing a resource
    /// on this loop fails with `LoopClosed`.
    pub fn close(&self) {
        if let Err(error) = self.reactor.close_loop() {
            debug!(error = %error, "loop close rejected");
            self.events.publish(ErrorEvent { error }, self);
        }
    }

    /// Enumerates live handles, recovering each wrapper through its
    /// back-pointer and the kind tag carried by the raw handle.
    ///
    /// This match is the one central table in the crate: adding a handle
    /// kind means adding a variant to [`HandleRef`] and an arm here.
    pub fn walk(&self, mut visitor: impl FnMut(HandleRef)) {
        for (kind, owner) in self.reactor.walk() {
            let recovered = match kind {
                RawKind::Timer => owner
                    .as_any_rc()
                    .downcast::<TimerHandle>()
                    .map(HandleRef::Timer),
                RawKind::Idle => owner
                    .as_any_rc()
                    .downcast::<IdleHandle>()
                    .map(HandleRef::Idle),
                RawKind::Wakeup => owner
                    .as_any_rc()
                    .downcast::<WakeupHandle>()
                    .map(HandleRef::Wakeup),
            };
            if let Ok(handle) = recovered {
                visitor(handle);
            }
        }
    }
}

impl EventSource for EventLoop {
    fn emitter(&self) -> &Emitter<Self> {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NativeError;
    use crate::handles::{CloseEvent, TimerEvent};
    use std::cell::Cell;
    use std::time::Duration;

    #[test]
    fn test_fresh_loop_has_no_work() {
        let lp = EventLoop::new().expect("loop creation");
        assert!(!lp.alive());
        assert!(!lp.run(RunMode::Default), "empty loop must return at once");
    }

    #[test]
    fn test_close_on_busy_loop_publishes_busy_error() {
        let lp = EventLoop::new().expect("loop creation");
        let _timer = lp.resource::<TimerHandle>().expect("timer init");

        let seen = Rc::new(Cell::new(None));
        let s = seen.clone();
        lp.on::<ErrorEvent>(move |ev, _| s.set(Some(ev.error)));

        lp.close();
        assert_eq!(
            seen.get(),
            Some(NativeError::Busy),
            "closing a loop with registered resources must publish Busy"
        );
    }

    #[test]
    fn test_init_on_closed_loop_publishes_error_event() {
        let lp = EventLoop::new().expect("loop creation");
        lp.close();

        let timer = lp.uninitialized_resource::<TimerHandle>();
        let seen = Rc::new(Cell::new(None));
        let s = seen.clone();
        timer.on::<ErrorEvent>(move |ev, _| s.set(Some(ev.error)));

        assert!(!timer.init(), "init on a closed loop must fail");
        assert_eq!(seen.get(), Some(NativeError::LoopClosed));
        assert!(!timer.active());
    }

    #[test]
    fn test_factory_returns_none_when_init_fails() {
        let lp = EventLoop::new().expect("loop creation");
        lp.close();
        assert!(lp.resource::<TimerHandle>().is_none());
    }

    #[test]
    fn test_walk_enumerates_each_kind_once() {
        let lp = EventLoop::new().expect("loop creation");
        let _timer = lp.resource::<TimerHandle>().expect("timer init");
        let _idle = lp.resource::<IdleHandle>().expect("idle init");

        let timers = Rc::new(Cell::new(0));
        let idles = Rc::new(Cell::new(0));
        lp.walk(|handle| match handle {
            HandleRef::Timer(_) => timers.set(timers.get() + 1),
            HandleRef::Idle(_) => idles.set(idles.get() + 1),
            HandleRef::Wakeup(_) => panic!("no wakeup handle was created"),
        });
        assert_eq!((timers.get(), idles.get()), (1, 1));
    }

    #[test]
    fn test_anchored_handle_survives_external_drop() {
        let lp = EventLoop::new().expect("loop creation");
        let fired = Rc::new(Cell::new(false));
        {
            let timer = lp.resource::<TimerHandle>().expect("timer init");
            let f = fired.clone();
            timer.once::<TimerEvent>(move |_, t| {
                f.set(true);
                t.close();
            });
            assert!(timer.start(Duration::from_millis(2), Duration::ZERO));
        }
        // Every external reference is gone; the anchor keeps it reachable.
        let mut live = 0;
        lp.walk(|_| live += 1);
        assert_eq!(live, 1, "anchored handle must still be enumerable");

        lp.run(RunMode::Default);
        assert!(fired.get(), "the timer must fire with no external owner");

        let mut after = 0;
        lp.walk(|_| after += 1);
        assert_eq!(after, 0, "closed handle must disappear from walk");
    }

    #[test]
    fn test_same_kind_resources_do_not_cross_deliver() {
        let lp = EventLoop::new().expect("loop creation");
        let first = lp.resource::<TimerHandle>().expect("timer init");
        let second = lp.resource::<TimerHandle>().expect("timer init");

        let first_hits = Rc::new(Cell::new(0));
        let second_hits = Rc::new(Cell::new(0));

        let h = first_hits.clone();
        first.on::<TimerEvent>(move |_, t| {
            h.set(h.get() + 1);
            t.close();
        });
        let h = second_hits.clone();
        second.on::<TimerEvent>(move |_, _| h.set(h.get() + 1));

        // Only the first timer ever runs.
        assert!(first.start(Duration::from_millis(2), Duration::ZERO));
        lp.run(RunMode::Default);

        assert_eq!(first_hits.get(), 1);
        assert_eq!(
            second_hits.get(),
            0,
            "an event on one instance must never reach listeners on another"
        );
        second.close();
        lp.run(RunMode::NoWait);
    }

    #[test]
    fn test_handle_state_machine() {
        let lp = EventLoop::new().expect("loop creation");
        let timer = lp.resource::<TimerHandle>().expect("timer init");
        assert!(!timer.active(), "initialized but unarmed: not active");
        assert!(!timer.closing());

        assert!(timer.start(Duration::from_secs(60), Duration::ZERO));
        assert!(timer.active());
        assert!(!timer.closing());

        timer.close();
        assert!(timer.closing(), "close request must be visible at once");
        assert!(!timer.active(), "a closing handle is no longer active");

        let closes = Rc::new(Cell::new(0));
        let c = closes.clone();
        timer.on::<CloseEvent>(move |_, _| c.set(c.get() + 1));

        lp.run(RunMode::NoWait);
        assert_eq!(closes.get(), 1, "close completion publishes one CloseEvent");
        assert!(timer.closing(), "closed handles still report closing");

        // Idempotent: a second close neither crashes nor re-publishes.
        timer.close();
        lp.run(RunMode::NoWait);
        assert_eq!(closes.get(), 1, "never a second close event");
    }

    #[test]
    fn test_operations_after_close_surface_already_closing() {
        let lp = EventLoop::new().expect("loop creation");
        let timer = lp.resource::<TimerHandle>().expect("timer init");
        timer.close();

        let seen = Rc::new(Cell::new(None));
        let s = seen.clone();
        timer.on::<ErrorEvent>(move |ev, _| s.set(Some(ev.error)));

        assert!(!timer.start(Duration::from_millis(1), Duration::ZERO));
        assert_eq!(seen.get(), Some(NativeError::AlreadyClosing));
        lp.run(RunMode::NoWait);
    }

    #[test]
    fn test_once_then_on_error_scenario() {
        let lp = EventLoop::new().expect("loop creation");
        lp.close();
        let timer = lp.uninitialized_resource::<TimerHandle>();

        let order = Rc::new(std::cell::RefCell::new(Vec::new()));
        let o = order.clone();
        timer.once::<ErrorEvent>(move |_, _| o.borrow_mut().push("once"));
        let o = order.clone();
        timer.on::<ErrorEvent>(move |_, _| o.borrow_mut().push("on"));

        timer.init();
        assert_eq!(*order.borrow(), vec!["once", "on"]);

        order.borrow_mut().clear();
        timer.init();
        assert_eq!(
            *order.borrow(),
            vec!["on"],
            "only the persistent listener fires the second time"
        );
    }

    #[test]
    fn test_unreferenced_handle_does_not_hold_the_loop() {
        let lp = EventLoop::new().expect("loop creation");
        let timer = lp.resource::<TimerHandle>().expect("timer init");
        assert!(timer.start(Duration::from_secs(60), Duration::ZERO));
        assert!(lp.alive());

        timer.unreference();
        assert!(!timer.referenced());
        assert!(!lp.alive(), "unreferenced handles must not keep run alive");
        assert!(!lp.run(RunMode::Default));

        timer.reference();
        assert!(lp.alive());
        timer.close();
        lp.run(RunMode::NoWait);
    }
}
