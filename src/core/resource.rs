//! # Resource base: one raw struct, one owning wrapper.
//!
//! [`ResourceCore`] is the state every resource kind embeds: the owning loop,
//! the raw reactor struct (owned by value), the weak self-reference installed
//! at construction, the ownership anchor, and the typed emitter. Kinds stay
//! thin: they wire reactor entry points to trampolines and delegate
//! everything else here.
//!
//! ## Rules
//! - Instances are constructible only through the loop factory; the
//!   [`ConstructorAccess`] token keeps kind constructors out of reach.
//! - The raw struct's user-data back-pointer is installed inside
//!   `Rc::new_cyclic`, strictly before any reactor call.
//! - Every fallible reactor call goes through [`ResourceCore::init_with`] or
//!   [`ResourceCore::invoke`]; a failure publishes exactly one `ErrorEvent`
//!   on the owner and is never propagated as `Err` or a panic.
//!
//! ## State machine (handles)
//! ```text
//! UNINITIALIZED ──init ok──► INITIALIZED ──armed──► ACTIVE
//!       │                        │                    │
//!       └──init err (ErrorEvent) └──────── close() ───┴──► CLOSING
//!                                                            │ close callback
//!                                                            ▼
//!                                      CLOSED (anchor reset, one CloseEvent)
//! ```
//! Error events may be published from any state and never drive this machine.

use std::any::Any;
use std::rc::{Rc, Weak};

use crate::core::anchor::OwnershipAnchor;
use crate::core::event_loop::EventLoop;
use crate::error::{ErrorEvent, NativeError};
use crate::events::{Emitter, EventSource};
use crate::reactor::raw::{RawBind, RawHandle, REFED};
use crate::reactor::{Reactor, Trampoline};

/// Token gating resource construction to the loop factory.
///
/// Only the crate can mint one, so [`Resource::create`] is callable solely
/// through [`EventLoop::resource`] and [`EventLoop::uninitialized_resource`].
pub struct ConstructorAccess(pub(crate) ());

/// Type-erased view of a wrapper, used by back-pointers and the walk table.
pub(crate) trait AnyResource: 'static {
    fn as_any_rc(self: Rc<Self>) -> Rc<dyn Any>;
}

/// A kind constructible by the loop factory.
pub trait Resource: EventSource {
    /// Builds the wrapper bound to `parent`, back-pointer installed, nothing
    /// registered yet.
    #[doc(hidden)]
    fn create(access: ConstructorAccess, parent: Rc<EventLoop>) -> Rc<Self>;

    /// Registers the resource with the reactor. On failure, publishes one
    /// `ErrorEvent` on this instance and returns false.
    fn init(&self) -> bool;
}

/// Shared state of one resource wrapper.
///
/// `T` is the concrete kind embedding this core; `U` the raw reactor struct
/// it owns by value.
pub(crate) struct ResourceCore<T, U> {
    parent: Rc<EventLoop>,
    raw: U,
    this: Weak<T>,
    anchor: OwnershipAnchor,
    events: Emitter<T>,
}

impl<T: 'static, U: RawBind> ResourceCore<T, U>
where
    T: AnyResource,
{
    /// Builds the core and installs the user-data back-pointer. Must be
    /// called from inside `Rc::new_cyclic` so `this` addresses the wrapper
    /// under construction.
    pub(crate) fn new(parent: Rc<EventLoop>, raw: U, this: Weak<T>) -> Self {
        let owner: Weak<dyn AnyResource> = this.clone();
        raw.bind(owner);
        Self {
            parent,
            raw,
            this,
            anchor: OwnershipAnchor::new(),
            events: Emitter::new(),
        }
    }

    pub(crate) fn parent(&self) -> &Rc<EventLoop> {
        &self.parent
    }

    pub(crate) fn raw(&self) -> &U {
        &self.raw
    }

    pub(crate) fn events(&self) -> &Emitter<T> {
        &self.events
    }

    /// Arms the anchor: the wrapper now owns itself until `reset`.
    pub(crate) fn leak(&self) {
        if let Some(strong) = self.this.upgrade() {
            let strong: Rc<dyn Any> = strong;
            self.anchor.leak(strong);
        }
    }

    /// Releases the anchor; called from the episode's terminal callback.
    pub(crate) fn reset(&self) {
        self.anchor.reset();
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub(crate) fn has_self(&self) -> bool {
        self.anchor.has_self()
    }

    /// Runs a reactor registration. On success, optionally anchors (kinds
    /// whose close episode starts at initialization pass `anchor = true`).
    /// On failure, publishes exactly one `ErrorEvent` on `owner`.
    pub(crate) fn init_with(
        &self,
        owner: &T,
        anchor: bool,
        op: impl FnOnce(&Reactor, &U) -> Result<(), NativeError>,
    ) -> bool {
        let ok = self.invoke(owner, op);
        if ok && anchor {
            self.leak();
        }
        ok
    }

    /// Runs a reactor operation. A failure publishes exactly one
    /// `ErrorEvent` on `owner`; the result reports success.
    pub(crate) fn invoke(
        &self,
        owner: &T,
        op: impl FnOnce(&Reactor, &U) -> Result<(), NativeError>,
    ) -> bool {
        match op(self.parent.reactor(), &self.raw) {
            Ok(()) => true,
            Err(error) => {
                self.events.publish(ErrorEvent { error }, owner);
                false
            }
        }
    }
}

impl<T: 'static + AnyResource> ResourceCore<T, RawHandle> {
    /// Requests teardown; idempotent. The close callback runs on a later
    /// loop turn and is `cb`'s job: release the anchor, publish the close
    /// event, exactly once.
    pub(crate) fn close(&self, cb: Trampoline) {
        self.parent.reactor().close(&self.raw, cb);
    }

    /// Reactor's view of activity; no wrapper-side shadow state.
    pub(crate) fn active(&self) -> bool {
        self.raw.is_active()
    }

    /// True between a close request and the wrapper's destruction.
    pub(crate) fn closing(&self) -> bool {
        self.raw.is_closing()
    }

    pub(crate) fn reference(&self) {
        self.parent.reactor().set_refed(&self.raw, true);
    }

    pub(crate) fn unreference(&self) {
        self.parent.reactor().set_refed(&self.raw, false);
    }

    pub(crate) fn referenced(&self) -> bool {
        self.raw.flags.has(REFED)
    }
}
