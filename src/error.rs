//! Error model for reactor-level failures.
//!
//! Every fallible reactor call is routed through the resource plumbing
//! (`init`/`invoke`), which converts an [`NativeError`] into exactly one
//! published [`ErrorEvent`] on the owning instance. Errors are never thrown
//! across the callback boundary and never silently dropped.
//!
//! Listener failures are a different channel entirely: a panic inside a
//! registered listener is **not** caught here or anywhere else in the crate;
//! it unwinds through `publish` into the caller of `run`. Guarding every
//! callback would tax the kinds that do not need it.

use std::io;

use thiserror::Error;

/// Failures reported by the reactor.
///
/// Each variant maps to a stable, errno-flavored numeric code (see
/// [`NativeError::code`]) so callers that log or compare against raw codes
/// keep working no matter which variant produced the event.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeError {
    /// Operation issued against a resource that is closing or already closed.
    #[error("resource is closing or already closed")]
    AlreadyClosing,

    /// Operation issued against a resource that was never initialized, or
    /// whose initialization failed.
    #[error("resource is not initialized")]
    NotInitialized,

    /// The owning event loop has been closed; no new registrations are
    /// accepted.
    #[error("event loop has been closed")]
    LoopClosed,

    /// The resource is busy: double initialization, a second in-flight work
    /// queue, or a cancel that arrived after the job already started.
    #[error("resource busy")]
    Busy,

    /// A queued job was canceled before it ran.
    #[error("operation canceled")]
    Canceled,

    /// An argument made no sense for the call (e.g. `again` on a timer with
    /// no repeat value).
    #[error("invalid argument")]
    InvalidArg,

    /// An I/O error from the poller, carrying the negated OS error code.
    #[error("i/o error (code {0})")]
    Io(i32),
}

impl NativeError {
    /// Stable numeric code, always negative, errno-flavored.
    pub fn code(&self) -> i32 {
        match self {
            NativeError::AlreadyClosing => -114,
            NativeError::NotInitialized => -6,
            NativeError::LoopClosed => -108,
            NativeError::Busy => -16,
            NativeError::Canceled => -125,
            NativeError::InvalidArg => -22,
            NativeError::Io(code) => *code,
        }
    }

    /// Short stable label (snake_case) for logs.
    pub fn name(&self) -> &'static str {
        match self {
            NativeError::AlreadyClosing => "already_closing",
            NativeError::NotInitialized => "not_initialized",
            NativeError::LoopClosed => "loop_closed",
            NativeError::Busy => "busy",
            NativeError::Canceled => "canceled",
            NativeError::InvalidArg => "invalid_arg",
            NativeError::Io(_) => "io",
        }
    }
}

impl From<io::Error> for NativeError {
    fn from(err: io::Error) -> Self {
        // Negate so that raw OS codes land in the same (negative) space as
        // the crate's own codes. EIO stands in when the OS gave us nothing.
        let code = err.raw_os_error().unwrap_or(5);
        NativeError::Io(-code.abs())
    }
}

/// Event published on an instance whenever one of its reactor calls fails.
///
/// May be observed in any resource state; error events never drive the
/// resource state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorEvent {
    /// The failure that produced this event.
    pub error: NativeError,
}

impl ErrorEvent {
    /// Numeric code of the underlying failure.
    pub fn code(&self) -> i32 {
        self.error.code()
    }

    /// Stable label of the underlying failure.
    pub fn name(&self) -> &'static str {
        self.error.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_negative_and_stable() {
        let all = [
            NativeError::AlreadyClosing,
            NativeError::NotInitialized,
            NativeError::LoopClosed,
            NativeError::Busy,
            NativeError::Canceled,
            NativeError::InvalidArg,
            NativeError::Io(-42),
        ];
        for err in all {
            assert!(err.code() < 0, "{} must map to a negative code", err.name());
        }
        assert_eq!(NativeError::Canceled.code(), -125);
        assert_eq!(NativeError::Busy.code(), -16);
    }

    #[test]
    fn test_io_conversion_negates_os_code() {
        let err = io::Error::from_raw_os_error(11);
        assert_eq!(NativeError::from(err), NativeError::Io(-11));
    }

    #[test]
    fn test_error_event_forwards_code_and_name() {
        let ev = ErrorEvent {
            error: NativeError::Canceled,
        };
        assert_eq!(ev.code(), -125);
        assert_eq!(ev.name(), "canceled");
    }
}
