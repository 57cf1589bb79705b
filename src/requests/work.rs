//! # Thread-pool work requests.
//!
//! Offloads a closure to the worker pool; the after-work event fires on the
//! loop thread. One job at a time per request: queueing while a job is in
//! flight fails with `Busy`.
//!
//! Work is the one kind with a cancellation mechanism beyond teardown:
//! [`WorkRequest::cancel`] is best-effort and succeeds only while the job is
//! still sitting in the injector queue. A canceled job completes with an
//! `ErrorEvent` carrying `Canceled`; a job that already started runs to the
//! end and completes with [`WorkEvent`].

use std::rc::Rc;

use crate::core::event_loop::EventLoop;
use crate::core::resource::{AnyResource, ConstructorAccess, Resource, ResourceCore};
use crate::error::{ErrorEvent, NativeError};
use crate::events::{Emitter, EventSource};
use crate::reactor::raw::RawRequest;

/// Published on the loop thread when a queued job finished normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkEvent;

/// A thread-pool work request.
pub struct WorkRequest {
    res: ResourceCore<WorkRequest, RawRequest>,
}

fn work_trampoline(owner: Rc<dyn AnyResource>, canceled: bool) {
    if let Ok(work) = owner.as_any_rc().downcast::<WorkRequest>() {
        work.res.raw().slot.set(None);
        work.res.reset();
        if canceled {
            work.res.events().publish(
                ErrorEvent {
                    error: NativeError::Canceled,
                },
                &work,
            );
        } else {
            work.res.events().publish(WorkEvent, &work);
        }
    }
}

impl Resource for WorkRequest {
    fn create(_: ConstructorAccess, parent: Rc<EventLoop>) -> Rc<Self> {
        Rc::new_cyclic(|this| WorkRequest {
            res: ResourceCore::new(parent, RawRequest::new(), this.clone()),
        })
    }

    /// Requests register with the reactor when queued, not at init.
    fn init(&self) -> bool {
        self.res.init_with(self, false, |_, _| Ok(()))
    }
}

impl WorkRequest {
    /// Queues `task` on the worker pool. On success the request anchors
    /// itself until the after-work callback runs.
    pub fn queue(&self, task: impl FnOnce() + Send + 'static) -> bool {
        let ok = self.res.invoke(self, |reactor, raw| {
            reactor.queue_work(raw, Box::new(task), work_trampoline)
        });
        if ok {
            self.res.leak();
        }
        ok
    }

    /// Best-effort cancel of the queued job. Fails with `Busy` once the job
    /// started (or finished), with `NotInitialized` when nothing is queued.
    pub fn cancel(&self) -> bool {
        self.res
            .invoke(self, |reactor, raw| reactor.cancel_work(raw))
    }

    /// Whether a job is currently queued or running.
    pub fn pending(&self) -> bool {
        self.res.raw().slot.get().is_some()
    }

    /// The loop this request was created on.
    pub fn parent(&self) -> &Rc<EventLoop> {
        self.res.parent()
    }
}

impl AnyResource for WorkRequest {
    fn as_any_rc(self: Rc<Self>) -> Rc<dyn std::any::Any> {
        self
    }
}

impl EventSource for WorkRequest {
    fn emitter(&self) -> &Emitter<Self> {
        self.res.events()
    }
}
