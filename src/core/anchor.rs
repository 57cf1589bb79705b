//! Self-ownership anchor for resources with in-flight reactor operations.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

/// A strong self-reference a resource sets on itself while an asynchronous
/// episode is in flight, so the wrapper stays reachable even after every
/// external owner dropped its `Rc`. The terminal callback of the episode
/// releases it.
///
/// This is a single toggle, not a counter. If two independent episodes ever
/// overlap on one resource, the first terminal callback drops the anchor
/// while the second episode is still outstanding; callers arm exactly one
/// episode at a time (handles: init to close callback; work requests: queue
/// to after-work). If a terminal callback never fires, the cycle leaks for
/// the remaining process lifetime; that is the accepted trade-off.
pub(crate) struct OwnershipAnchor {
    slot: RefCell<Option<Rc<dyn Any>>>,
}

impl OwnershipAnchor {
    pub(crate) fn new() -> Self {
        Self {
            slot: RefCell::new(None),
        }
    }

    /// Installs the strong self-reference. Idempotent: a second call while
    /// anchored keeps the first reference and changes nothing.
    pub(crate) fn leak(&self, strong: Rc<dyn Any>) {
        let mut slot = self.slot.borrow_mut();
        if slot.is_none() {
            *slot = Some(strong);
        }
    }

    /// Drops the strong self-reference, if any.
    pub(crate) fn reset(&self) {
        self.slot.borrow_mut().take();
    }

    /// Whether the anchor currently holds the instance.
    #[cfg_attr(not(test), allow(dead_code))]
    pub(crate) fn has_self(&self) -> bool {
        self.slot.borrow().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leak_holds_a_strong_reference() {
        let anchor = OwnershipAnchor::new();
        let value: Rc<dyn Any> = Rc::new(41_u32);
        let observer = Rc::downgrade(&value);

        anchor.leak(value.clone());
        drop(value);
        assert!(anchor.has_self());
        assert!(
            observer.upgrade().is_some(),
            "anchored value must survive dropping the external reference"
        );

        anchor.reset();
        assert!(!anchor.has_self());
        assert!(
            observer.upgrade().is_none(),
            "reset must drop the last reference"
        );
    }

    #[test]
    fn test_leak_is_idempotent() {
        let anchor = OwnershipAnchor::new();
        let first: Rc<dyn Any> = Rc::new(1_u32);
        let second: Rc<dyn Any> = Rc::new(2_u32);

        anchor.leak(first.clone());
        anchor.leak(second.clone());
        anchor.reset();
        assert!(!anchor.has_self(), "single toggle: one reset fully releases");
    }

    #[test]
    fn test_reset_without_leak_is_harmless() {
        let anchor = OwnershipAnchor::new();
        anchor.reset();
        assert!(!anchor.has_self());
    }
}
