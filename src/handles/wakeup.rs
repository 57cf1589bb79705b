//! # Cross-thread wakeup handles.
//!
//! The one loop entry point other threads may touch. The handle itself is
//! loop-thread-only like every other resource; what crosses threads is a
//! detached [`WakeupSender`], which holds nothing but the shared pending flag
//! and the poller's waker.
//!
//! ## Rules
//! - A wakeup handle is active from initialization until closed.
//! - Sends coalesce: any number of `send` calls between two loop turns
//!   produce a single [`WakeupEvent`], published on the loop thread.
//! - Senders outlive the handle harmlessly; a send after close wakes the
//!   poller at most once and publishes nothing.

use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mio::Waker;

use crate::core::event_loop::EventLoop;
use crate::core::resource::{AnyResource, ConstructorAccess, Resource, ResourceCore};
use crate::events::{Emitter, EventSource};
use crate::reactor::raw::{RawHandle, RawKind};

/// Published on the loop thread after one or more coalesced sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakeupEvent;

/// A wakeup resource.
pub struct WakeupHandle {
    res: ResourceCore<WakeupHandle, RawHandle>,
    pending: Arc<AtomicBool>,
}

/// Cloneable, `Send + Sync` sending half of a wakeup handle.
#[derive(Clone)]
pub struct WakeupSender {
    pending: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl WakeupSender {
    /// Signals the loop from any thread. Coalesces with other pending sends.
    pub fn send(&self) {
        if !self.pending.swap(true, Ordering::AcqRel) {
            // The next turn drains the flag regardless; a failed wake only
            // costs latency, never the event.
            let _ = self.waker.wake();
        }
    }
}

fn wakeup_trampoline(owner: Rc<dyn AnyResource>) {
    if let Ok(wakeup) = owner.as_any_rc().downcast::<WakeupHandle>() {
        wakeup.res.events().publish(WakeupEvent, &wakeup);
    }
}

fn close_trampoline(owner: Rc<dyn AnyResource>) {
    if let Ok(wakeup) = owner.as_any_rc().downcast::<WakeupHandle>() {
        wakeup.res.reset();
        wakeup.res.events().publish(super::CloseEvent, &wakeup);
    }
}

impl Resource for WakeupHandle {
    fn create(_: ConstructorAccess, parent: Rc<EventLoop>) -> Rc<Self> {
        Rc::new_cyclic(|this| WakeupHandle {
            res: ResourceCore::new(parent, RawHandle::new(RawKind::Wakeup), this.clone()),
            pending: Arc::new(AtomicBool::new(false)),
        })
    }

    fn init(&self) -> bool {
        let pending = self.pending.clone();
        self.res.init_with(self, true, |reactor, raw| {
            reactor.register(raw)?;
            reactor.wakeup_init(raw, pending, wakeup_trampoline)
        })
    }
}

impl WakeupHandle {
    /// A detached sender usable from any thread.
    pub fn sender(&self) -> WakeupSender {
        WakeupSender {
            pending: self.pending.clone(),
            waker: self.res.parent().reactor().waker(),
        }
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

impl AnyResource for WakeupHandle {
    fn as_any_rc(self: Rc<Self>) -> Rc<dyn std::any::Any> {
        self
    }
}

impl EventSource for WakeupHandle {
    fn emitter(&self) -> &Emitter<Self> {
        self.res.events()
    }
}
