//! Loop, resource base and ownership anchor.
//!
//! This module is the owner-root of the crate: [`EventLoop`] creates every
//! resource, `ResourceCore` binds each raw reactor struct to its wrapper, and
//! the anchor keeps wrappers alive across in-flight reactor operations.
//!
//! Internal modules:
//! - [`event_loop`]: factory, run/stop/alive, walk, loop-level events;
//! - [`resource`]: wrapper plumbing (back-pointer, init/invoke, close);
//! - [`anchor`]: the strong self-reference toggled around episodes.

pub(crate) mod anchor;
pub(crate) mod event_loop;
pub(crate) mod resource;

pub use event_loop::{EventLoop, RunMode};
pub use resource::{ConstructorAccess, Resource};
