//! One-shot request kinds.
//!
//! Requests differ from handles in lifecycle only: there is no close episode.
//! A request is armed when queued (the anchor is set), and the terminal
//! after-work callback releases the anchor and publishes the outcome.

mod work;

pub use work::{WorkEvent, WorkRequest};
