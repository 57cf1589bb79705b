//! Long-lived handle kinds.
//!
//! Each kind is a thin, mechanical application of the core: it owns a raw
//! handle, wires reactor entry points to trampolines, and publishes typed
//! events. All kinds share the same lifecycle: the close episode is armed at
//! initialization (the anchor is set once init succeeds) and ends in the
//! close callback, which releases the anchor and publishes one [`CloseEvent`].
//!
//! ## Contents
//! - [`TimerHandle`] / `TimerEvent` one-shot and repeating timers
//! - [`IdleHandle`] / `IdleEvent` fires once per loop turn while started
//! - [`WakeupHandle`] / `WakeupEvent` cross-thread wakeups via a detached sender
//! - [`HandleRef`] the closed set of kinds handed out by `EventLoop::walk`

mod idle;
mod timer;
mod wakeup;

pub use idle::{IdleEvent, IdleHandle};
pub use timer::{TimerEvent, TimerHandle};
pub use wakeup::{WakeupEvent, WakeupHandle, WakeupSender};

use std::rc::Rc;

/// Published exactly once per handle, when the reactor confirms teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseEvent;

/// A concretely-typed live handle, as enumerated by `EventLoop::walk`.
///
/// Deliberately a closed enum: the walk dispatch is an exhaustive match over
/// the kinds this crate ships, so forgetting a kind is a compile error rather
/// than a silent skip.
pub enum HandleRef {
    Timer(Rc<TimerHandle>),
    Idle(Rc<IdleHandle>),
    Wakeup(Rc<WakeupHandle>),
}

impl HandleRef {
    /// Whether the underlying handle is active.
    pub fn active(&self) -> bool {
        match self {
            HandleRef::Timer(h) => h.active(),
            HandleRef::Idle(h) => h.active(),
            HandleRef::Wakeup(h) => h.active(),
        }
    }

    /// Whether the underlying handle is closing or closed.
    pub fn closing(&self) -> bool {
        match self {
            HandleRef::Timer(h) => h.closing(),
            HandleRef::Idle(h) => h.closing(),
            HandleRef::Wakeup(h) => h.closing(),
        }
    }

    /// Requests teardown of the underlying handle.
    pub fn close(&self) {
        match self {
            HandleRef::Timer(h) => h.close(),
            HandleRef::Idle(h) => h.close(),
            HandleRef::Wakeup(h) => h.close(),
        }
    }
}
