//! Typed event dispatch: type registry, per-instance emitters, and the
//! registration surface shared by every event-producing type.
//!
//! ## Contents
//! - [`EventTypeId`], [`event_type`] process-wide type identification
//! - [`Emitter`], [`Connection`] per-instance listener lists and erasure
//! - [`EventSource`] the on/once/erase/clear/empty vocabulary
//!
//! Events themselves are plain structs defined next to the type that emits
//! them (`TimerEvent` by the timer, `CloseEvent` shared by all handles, and
//! so on); any `'static` type works as an event.

mod emitter;
mod registry;
mod source;

pub use emitter::{Connection, Emitter};
pub use registry::{event_type, EventTypeId};
pub use source::EventSource;
