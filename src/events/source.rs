//! Uniform listener-registration surface for event-emitting types.

use super::emitter::{Connection, Emitter};

/// Anything that owns an [`Emitter`]: every handle kind, every request kind,
/// and the loop itself.
///
/// The default methods forward to the embedded emitter so all owners share
/// one registration vocabulary. Publishing is not part of this trait; events
/// are produced by the reactor trampolines only.
pub trait EventSource: Sized + 'static {
    /// The emitter embedded in this instance.
    fn emitter(&self) -> &Emitter<Self>;

    /// Registers a persistent listener for `E`; it fires on every publish of
    /// `E` until erased or cleared.
    fn on<E: 'static>(&self, listener: impl Fn(&mut E, &Self) + 'static) -> Connection<E> {
        self.emitter().on(listener)
    }

    /// Registers a one-shot listener for `E`; it fires at most once and is
    /// removed automatically after its first invocation.
    fn once<E: 'static>(&self, listener: impl Fn(&mut E, &Self) + 'static) -> Connection<E> {
        self.emitter().once(listener)
    }

    /// Removes exactly the listener behind `conn`; no-op if already gone.
    fn erase<E: 'static>(&self, conn: Connection<E>) {
        self.emitter().erase(conn)
    }

    /// Removes all listeners registered for `E` only.
    fn clear<E: 'static>(&self) {
        self.emitter().clear::<E>()
    }

    /// Removes all listeners for every event type.
    fn clear_all(&self) {
        self.emitter().clear_all()
    }

    /// True if no listener remains for `E`.
    fn empty<E: 'static>(&self) -> bool {
        self.emitter().empty::<E>()
    }

    /// True if no listener remains at all.
    fn is_empty(&self) -> bool {
        self.emitter().is_empty()
    }
}
