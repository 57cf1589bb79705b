//! # Per-instance typed event emitter.
//!
//! [`Emitter<T>`] maps event types to listener lists for a single owning
//! instance `T` (a handle kind, a request kind, or the loop itself). Listener
//! registration is typed end to end: registering for `TimerEvent` can never
//! observe a `CloseEvent`, and no reflection happens at dispatch time beyond
//! one id lookup and one downcast of the slot.
//!
//! ## Architecture
//! ```text
//!                  Emitter<T>
//!                     │
//!      HashMap<EventTypeId, Box<dyn erased slot>>
//!                     │                      (created lazily by on/once,
//!            Slot<E, T> per event type        never by publish)
//!            ├─ once: Vec<(serial, listener)>   fired then dropped
//!            └─ on:   Vec<(serial, listener)>   fired every publish
//! ```
//!
//! ## Rules
//! - **Dispatch order**: for one `publish`, one-shot listeners run first (in
//!   registration order, then they are gone), persistent listeners after.
//! - **Snapshot before dispatch**: the one-shot list is taken out of the slot
//!   and the persistent list is cloned *before* any listener runs. A listener
//!   may register, erase or clear listeners on this same emitter from inside
//!   its own invocation without corrupting the iteration. This is a required
//!   guarantee, not an accident of the implementation: listeners added during
//!   a publish do not observe the in-flight event; listeners erased during a
//!   publish still do (they were already in the snapshot).
//! - **Publish never allocates**: publishing an event type nobody registered
//!   for returns without touching the map.
//! - **No interception**: a panic inside a listener unwinds through `publish`
//!   into the reactor turn. Nothing here catches it.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::mem;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::registry::{event_type, EventTypeId};

/// Serials are process-unique so a connection applied to the wrong emitter
/// instance erases nothing instead of erasing a stranger.
static NEXT_SERIAL: AtomicU64 = AtomicU64::new(0);

type Listener<E, T> = Rc<dyn Fn(&mut E, &T)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListKind {
    Once,
    On,
}

/// Ticket for one registered listener, used to erase exactly that listener.
///
/// Returned by [`Emitter::on`] and [`Emitter::once`]; may be freely copied or
/// discarded. Erasing an already-removed (or already-fired one-shot) listener
/// is a no-op.
pub struct Connection<E> {
    kind: ListKind,
    serial: u64,
    _marker: PhantomData<fn(E)>,
}

impl<E> Clone for Connection<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for Connection<E> {}

/// Type-erased face of a `Slot<E, T>`, stored in the per-instance map.
trait ErasedSlot {
    fn is_empty(&self) -> bool;
    fn clear(&mut self);
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn as_any(&self) -> &dyn Any;
}

struct Slot<E, T> {
    once: Vec<(u64, Listener<E, T>)>,
    on: Vec<(u64, Listener<E, T>)>,
}

impl<E, T> Slot<E, T> {
    fn new() -> Self {
        Self {
            once: Vec::new(),
            on: Vec::new(),
        }
    }
}

impl<E: 'static, T: 'static> ErasedSlot for Slot<E, T> {
    fn is_empty(&self) -> bool {
        self.once.is_empty() && self.on.is_empty()
    }

    fn clear(&mut self) {
        self.once.clear();
        self.on.clear();
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Listener registry of one owning instance.
///
/// Single-threaded by construction (the whole object model lives on the loop
/// thread), so interior mutability is a `RefCell` and listeners are `Rc`s.
pub struct Emitter<T> {
    slots: RefCell<HashMap<EventTypeId, Box<dyn ErasedSlot>>>,
    _owner: PhantomData<fn(T)>,
}

impl<T: 'static> Emitter<T> {
    pub(crate) fn new() -> Self {
        Self {
            slots: RefCell::new(HashMap::new()),
            _owner: PhantomData,
        }
    }

    /// Runs `f` against the slot for `E`. With `create`, the slot is
    /// allocated on demand; without, a missing slot short-circuits to `None`.
    fn with_slot<E: 'static, R>(
        &self,
        create: bool,
        f: impl FnOnce(&mut Slot<E, T>) -> R,
    ) -> Option<R> {
        let id = event_type::<E>();
        let mut slots = self.slots.borrow_mut();
        let erased = if create {
            slots.entry(id).or_insert_with(|| Box::new(Slot::<E, T>::new()))
        } else {
            slots.get_mut(&id)?
        };
        let slot = erased
            .as_any_mut()
            .downcast_mut::<Slot<E, T>>()
            .expect("an event type id maps to exactly one slot type");
        Some(f(slot))
    }

    /// Registers a persistent listener for `E`.
    ///
    /// The listener fires on every publish of `E` until erased or cleared.
    pub fn on<E: 'static>(&self, listener: impl Fn(&mut E, &T) + 'static) -> Connection<E> {
        let serial = NEXT_SERIAL.fetch_add(1, Ordering::Relaxed);
        self.with_slot(true, |slot: &mut Slot<E, T>| {
            slot.on.push((serial, Rc::new(listener)))
        });
        Connection {
            kind: ListKind::On,
            serial,
            _marker: PhantomData,
        }
    }

    /// Registers a one-shot listener for `E`, invoked at most once and
    /// removed automatically right before its first invocation.
    pub fn once<E: 'static>(&self, listener: impl Fn(&mut E, &T) + 'static) -> Connection<E> {
        let serial = NEXT_SERIAL.fetch_add(1, Ordering::Relaxed);
        self.with_slot(true, |slot: &mut Slot<E, T>| {
            slot.once.push((serial, Rc::new(listener)))
        });
        Connection {
            kind: ListKind::Once,
            serial,
            _marker: PhantomData,
        }
    }

    /// Removes exactly the listener behind `conn`. No-op if it is already
    /// gone (erased before, fired as a one-shot, or cleared).
    pub fn erase<E: 'static>(&self, conn: Connection<E>) {
        self.with_slot(false, |slot: &mut Slot<E, T>| {
            let list = match conn.kind {
                ListKind::Once => &mut slot.once,
                ListKind::On => &mut slot.on,
            };
            list.retain(|(serial, _)| *serial != conn.serial);
        });
    }

    /// Removes every listener (both kinds) registered for `E` only.
    pub fn clear<E: 'static>(&self) {
        self.with_slot(false, |slot: &mut Slot<E, T>| {
            slot.once.clear();
            slot.on.clear();
        });
    }

    /// Removes every listener for every event type this instance has touched.
    pub fn clear_all(&self) {
        for slot in self.slots.borrow_mut().values_mut() {
            slot.clear();
        }
    }

    /// True if no listener remains for `E`.
    pub fn empty<E: 'static>(&self) -> bool {
        self.with_slot(false, |slot: &mut Slot<E, T>| slot.is_empty())
            .unwrap_or(true)
    }

    /// True if no listener remains for any event type.
    pub fn is_empty(&self) -> bool {
        self.slots.borrow().values().all(|slot| slot.is_empty())
    }

    /// Synchronously dispatches `event` to the listeners for `E`.
    ///
    /// One-shot listeners fire first and are consumed; persistent listeners
    /// fire after, every time. Both lists are snapshotted before the first
    /// invocation (see module docs). Publishing with no registered slot is a
    /// no-op and allocates nothing.
    pub(crate) fn publish<E: 'static>(&self, mut event: E, owner: &T) {
        let (once, on) = {
            let mut slots = self.slots.borrow_mut();
            let Some(erased) = slots.get_mut(&event_type::<E>()) else {
                return;
            };
            let slot = erased
                .as_any_mut()
                .downcast_mut::<Slot<E, T>>()
                .expect("an event type id maps to exactly one slot type");
            (mem::take(&mut slot.once), slot.on.clone())
        };
        // All borrows are released: listeners are free to mutate this
        // emitter, including for the event type being dispatched.
        for (_, listener) in &once {
            listener(&mut event, owner);
        }
        for (_, listener) in &on {
            listener(&mut event, owner);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Probe {
        events: Emitter<Probe>,
    }

    impl Probe {
        fn new() -> Self {
            Self {
                events: Emitter::new(),
            }
        }
    }

    #[derive(Debug, PartialEq)]
    struct Ping(u32);
    struct Pong;

    #[test]
    fn test_on_fires_every_publish() {
        let probe = Probe::new();
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        probe.events.on::<Ping>(move |_, _| h.set(h.get() + 1));

        probe.events.publish(Ping(1), &probe);
        probe.events.publish(Ping(2), &probe);
        assert_eq!(hits.get(), 2, "persistent listener must fire per publish");
    }

    #[test]
    fn test_once_fires_at_most_once() {
        let probe = Probe::new();
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        probe.events.once::<Ping>(move |_, _| h.set(h.get() + 1));

        probe.events.publish(Ping(1), &probe);
        probe.events.publish(Ping(2), &probe);
        probe.events.publish(Ping(3), &probe);
        assert_eq!(hits.get(), 1, "one-shot listener must fire exactly once");
    }

    #[test]
    fn test_publish_other_type_does_not_cross() {
        let probe = Probe::new();
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        probe.events.on::<Ping>(move |_, _| h.set(h.get() + 1));

        probe.events.publish(Pong, &probe);
        assert_eq!(hits.get(), 0, "listener for Ping must never see Pong");
    }

    #[test]
    fn test_once_fires_before_on() {
        let probe = Probe::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        let o = order.clone();
        probe.events.on::<Ping>(move |_, _| o.borrow_mut().push("on"));
        let o = order.clone();
        probe.events.once::<Ping>(move |_, _| o.borrow_mut().push("once"));

        probe.events.publish(Ping(0), &probe);
        assert_eq!(
            *order.borrow(),
            vec!["once", "on"],
            "one-shot listeners run before persistent ones even when registered later"
        );

        order.borrow_mut().clear();
        probe.events.publish(Ping(0), &probe);
        assert_eq!(*order.borrow(), vec!["on"]);
    }

    #[test]
    fn test_erase_removes_only_that_listener() {
        let probe = Probe::new();
        let first = Rc::new(Cell::new(0));
        let second = Rc::new(Cell::new(0));

        let f = first.clone();
        let conn = probe.events.on::<Ping>(move |_, _| f.set(f.get() + 1));
        let s = second.clone();
        probe.events.on::<Ping>(move |_, _| s.set(s.get() + 1));

        probe.events.erase(conn);
        probe.events.publish(Ping(0), &probe);
        assert_eq!(first.get(), 0, "erased listener must not fire");
        assert_eq!(second.get(), 1, "sibling listener must keep firing");

        // Idempotent.
        probe.events.erase(conn);
        probe.events.publish(Ping(0), &probe);
        assert_eq!(second.get(), 2);
    }

    #[test]
    fn test_clear_is_scoped_to_one_type() {
        let probe = Probe::new();
        let pings = Rc::new(Cell::new(0));
        let pongs = Rc::new(Cell::new(0));

        let p = pings.clone();
        probe.events.on::<Ping>(move |_, _| p.set(p.get() + 1));
        let p = pongs.clone();
        probe.events.on::<Pong>(move |_, _| p.set(p.get() + 1));

        probe.events.clear::<Ping>();
        probe.events.publish(Ping(0), &probe);
        probe.events.publish(Pong, &probe);
        assert_eq!(pings.get(), 0, "cleared type must not fire");
        assert_eq!(pongs.get(), 1, "other types must be untouched");

        probe.events.clear_all();
        probe.events.publish(Pong, &probe);
        assert_eq!(pongs.get(), 1, "clear_all must remove every listener");
    }

    #[test]
    fn test_empty_tracks_registration_lifecycle() {
        let probe = Probe::new();
        assert!(probe.events.is_empty(), "fresh emitter must be empty");
        assert!(probe.events.empty::<Ping>());

        let conn = probe.events.on::<Ping>(|_, _| {});
        assert!(!probe.events.is_empty());
        assert!(!probe.events.empty::<Ping>());
        assert!(probe.events.empty::<Pong>());

        probe.events.erase(conn);
        assert!(probe.events.is_empty(), "erasing the last listener empties");
        assert!(probe.events.empty::<Ping>());
    }

    #[test]
    fn test_once_slot_emptied_by_dispatch() {
        let probe = Probe::new();
        probe.events.once::<Ping>(|_, _| {});
        probe.events.publish(Ping(0), &probe);
        assert!(
            probe.events.empty::<Ping>(),
            "fired one-shots must not linger in the slot"
        );
    }

    #[test]
    fn test_publish_without_slot_allocates_nothing() {
        let probe = Probe::new();
        probe.events.publish(Ping(0), &probe);
        assert!(
            probe.events.slots.borrow().is_empty(),
            "publish must never create a handler slot"
        );
    }

    #[test]
    fn test_listener_may_register_during_dispatch() {
        let probe = Probe::new();
        let late = Rc::new(Cell::new(0));

        let l = late.clone();
        probe.events.on::<Ping>(move |_, owner| {
            let l = l.clone();
            owner.events.once::<Ping>(move |_, _| l.set(l.get() + 1));
        });

        probe.events.publish(Ping(0), &probe);
        assert_eq!(
            late.get(),
            0,
            "a listener registered mid-dispatch must not see the in-flight event"
        );

        probe.events.publish(Ping(0), &probe);
        assert_eq!(late.get(), 1, "it must see the next publish");
    }

    #[test]
    fn test_listener_may_clear_during_dispatch() {
        let probe = Probe::new();
        let hits = Rc::new(Cell::new(0));

        let h = hits.clone();
        probe.events.on::<Ping>(move |_, owner| {
            h.set(h.get() + 1);
            owner.events.clear::<Ping>();
        });
        let h = hits.clone();
        probe.events.on::<Ping>(move |_, _| h.set(h.get() + 1));

        // Snapshot semantics: both listeners were captured before the first
        // one cleared the slot, so both run for this publish.
        probe.events.publish(Ping(0), &probe);
        assert_eq!(hits.get(), 2);

        probe.events.publish(Ping(0), &probe);
        assert_eq!(hits.get(), 2, "cleared listeners must not fire again");
    }

    #[test]
    fn test_event_value_visible_to_listeners() {
        let probe = Probe::new();
        let seen = Rc::new(Cell::new(0));
        let s = seen.clone();
        probe.events.on::<Ping>(move |ev, _| s.set(ev.0));
        probe.events.publish(Ping(7), &probe);
        assert_eq!(seen.get(), 7);
    }
}
