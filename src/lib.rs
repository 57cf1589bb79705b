//! # eventide
//!
//! **Eventide** is a typed event-dispatch and resource-lifetime layer over a
//! small callback-based reactor.
//!
//! It solves two problems that always show up together when a callback engine
//! is wrapped in an ownership-managed object model:
//!
//! 1. **Dispatch**: an open-ended set of event types must reach per-instance
//!    listener sets without runtime reflection: registration and dispatch
//!    are typed end to end.
//! 2. **Lifetime**: a wrapper must stay alive for exactly the span of an
//!    in-flight reactor operation, surviving even if every external owner
//!    drops its reference, and must be released promptly once the reactor
//!    signals completion.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!                 ┌─────────────────────────────────────────────┐
//!                 │  EventLoop (factory, owner-root, run/walk)  │
//!                 └───────┬─────────────────────────▲───────────┘
//!                 creates │                         │ parent Rc
//!                         ▼                         │
//!    ┌──────────────┐ ┌──────────────┐ ┌──────────────┐ ┌──────────────┐
//!    │ TimerHandle  │ │  IdleHandle  │ │ WakeupHandle │ │ WorkRequest  │
//!    │  Emitter<T>  │ │  Emitter<T>  │ │  Emitter<T>  │ │  Emitter<T>  │
//!    │  anchor      │ │  anchor      │ │  anchor      │ │  anchor      │
//!    └──────┬───────┘ └──────┬───────┘ └──────┬───────┘ └──────┬───────┘
//!           │ init/invoke    │                │                │ queue
//!           ▼                ▼                ▼                ▼
//!    ┌─────────────────────────────────────────────────────────────────┐
//!    │  Reactor: poller · timer heap · idle queue · closes · pool      │
//!    └───────────────────────────────┬─────────────────────────────────┘
//!                                    │ completion callback
//!                                    ▼
//!                    back-pointer ──► wrapper ──► publish(TypedEvent)
//! ```
//!
//! ### Resource lifecycle
//! ```text
//! loop.resource::<R>() ──► create (back-pointer installed) ──► init
//!     init ok  ──► anchor armed (leak) ──► operations (start/queue/...)
//!     init err ──► one ErrorEvent, factory returns None
//!
//! close() ──► CLOSING ──► close callback on a later turn:
//!                            anchor released (reset)
//!                            one CloseEvent, ever
//! ```
//!
//! ## Threading model
//! Single-threaded and cooperative: every listener dispatch, state
//! transition and anchor toggle happens on the thread that calls
//! [`EventLoop::run`]. Exactly two entry points may be used from other
//! threads, [`WakeupSender::send`] and the worker pool finishing a
//! [`WorkRequest`], and both surface their events back on the loop thread.
//! There is no suspension primitive: waiting for a result means registering
//! a listener and letting the next turn publish it.
//!
//! ## Errors
//! Reactor failures surface as [`ErrorEvent`]s on the instance whose call
//! failed. Exactly one per failed call, never a panic, never silently
//! dropped. Failures *inside* listeners are the caller's problem by design:
//! nothing in this crate catches a panicking listener.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use eventide::{EventLoop, EventSource, RunMode, TimerEvent, TimerHandle};
//!
//! let lp = EventLoop::new()?;
//! let timer = lp.resource::<TimerHandle>().expect("timer");
//!
//! timer.on::<TimerEvent>(|_, t| {
//!     println!("tick");
//!     t.close();
//! });
//! timer.start(Duration::from_millis(10), Duration::ZERO);
//!
//! lp.run(RunMode::Default);
//! # Ok::<(), eventide::NativeError>(())
//! ```

mod core;
mod error;
mod events;
mod handles;
mod reactor;
mod requests;

// ---- Public re-exports ----

pub use crate::core::{ConstructorAccess, EventLoop, Resource, RunMode};
pub use error::{ErrorEvent, NativeError};
pub use events::{event_type, Connection, Emitter, EventSource, EventTypeId};
pub use handles::{
    CloseEvent, HandleRef, IdleEvent, IdleHandle, TimerEvent, TimerHandle, WakeupEvent,
    WakeupHandle, WakeupSender,
};
pub use reactor::pool::PoolConfig;
pub use requests::{WorkEvent, WorkRequest};
