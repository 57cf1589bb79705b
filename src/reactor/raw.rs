//! Raw reactor-side structs owned by value inside each wrapper.
//!
//! A [`RawHandle`] (or [`RawRequest`]) is the piece of native state a wrapper
//! carries: the kind tag, the flag word the reactor maintains, the slot index
//! into the reactor's tables, and the user-data back-pointer through which
//! completion callbacks recover the owning wrapper. The back-pointer is
//! installed at construction, strictly before any reactor call, and stays
//! valid until the wrapper is destroyed.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::core::resource::AnyResource;

/// Runtime tag carried by every raw handle; drives the closed walk dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RawKind {
    Timer,
    Idle,
    Wakeup,
}

pub(crate) const INITIALIZED: u8 = 1 << 0;
pub(crate) const ACTIVE: u8 = 1 << 1;
pub(crate) const CLOSING: u8 = 1 << 2;
pub(crate) const CLOSED: u8 = 1 << 3;
pub(crate) const REFED: u8 = 1 << 4;

/// The flag word of one raw handle.
///
/// Written only by the reactor; wrappers read it so `active()`/`closing()`
/// always reflect the reactor's own view with no shadow state. Shared by
/// `Rc` between the wrapper-owned struct and the reactor's slot so the two
/// can never drift apart.
#[derive(Default)]
pub(crate) struct FlagWord(Cell<u8>);

impl FlagWord {
    pub(crate) fn set(&self, flags: u8) {
        self.0.set(self.0.get() | flags);
    }

    pub(crate) fn unset(&self, flags: u8) {
        self.0.set(self.0.get() & !flags);
    }

    pub(crate) fn has(&self, flags: u8) -> bool {
        self.0.get() & flags == flags
    }

    pub(crate) fn has_any(&self, flags: u8) -> bool {
        self.0.get() & flags != 0
    }
}

/// Binds the user-data slot of a raw struct to its owning wrapper.
pub(crate) trait RawBind {
    fn bind(&self, owner: Weak<dyn AnyResource>);
}

/// Reactor-side identity of one long-lived handle.
pub(crate) struct RawHandle {
    pub(crate) kind: RawKind,
    pub(crate) slot: Cell<Option<usize>>,
    pub(crate) flags: Rc<FlagWord>,
    /// User-data back-pointer to the owning wrapper.
    pub(crate) data: RefCell<Option<Weak<dyn AnyResource>>>,
}

impl RawHandle {
    pub(crate) fn new(kind: RawKind) -> Self {
        Self {
            kind,
            slot: Cell::new(None),
            flags: Rc::new(FlagWord::default()),
            data: RefCell::new(None),
        }
    }

    /// Recovers the owning wrapper through the user-data slot.
    pub(crate) fn owner(&self) -> Option<Rc<dyn AnyResource>> {
        self.data.borrow().as_ref()?.upgrade()
    }

    pub(crate) fn is_active(&self) -> bool {
        self.flags.has(ACTIVE)
    }

    pub(crate) fn is_closing(&self) -> bool {
        self.flags.has_any(CLOSING | CLOSED)
    }
}

impl RawBind for RawHandle {
    fn bind(&self, owner: Weak<dyn AnyResource>) {
        *self.data.borrow_mut() = Some(owner);
    }
}

/// Reactor-side identity of one one-shot request.
///
/// Requests have no flag word: a request is pending exactly while it holds a
/// slot in the reactor's request table.
pub(crate) struct RawRequest {
    pub(crate) slot: Cell<Option<usize>>,
    pub(crate) data: RefCell<Option<Weak<dyn AnyResource>>>,
}

impl RawRequest {
    pub(crate) fn new() -> Self {
        Self {
            slot: Cell::new(None),
            data: RefCell::new(None),
        }
    }

    pub(crate) fn owner(&self) -> Option<Rc<dyn AnyResource>> {
        self.data.borrow().as_ref()?.upgrade()
    }
}

impl RawBind for RawRequest {
    fn bind(&self, owner: Weak<dyn AnyResource>) {
        *self.data.borrow_mut() = Some(owner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_word_set_unset() {
        let flags = FlagWord::default();
        assert!(!flags.has(ACTIVE));

        flags.set(INITIALIZED | ACTIVE);
        assert!(flags.has(ACTIVE));
        assert!(flags.has(INITIALIZED | ACTIVE));
        assert!(!flags.has(CLOSING));

        flags.unset(ACTIVE);
        assert!(!flags.has(ACTIVE));
        assert!(flags.has(INITIALIZED));
    }

    #[test]
    fn test_has_any_matches_single_bit() {
        let flags = FlagWord::default();
        flags.set(CLOSED);
        assert!(flags.has_any(CLOSING | CLOSED));
        assert!(!flags.has(CLOSING | CLOSED), "has() requires every bit");
    }
}
