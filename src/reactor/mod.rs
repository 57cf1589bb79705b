//! # The callback reactor.
//!
//! Single-threaded engine under the loop: a poller, a timer heap, an idle
//! queue, deferred close callbacks, and the bridges for the only two
//! cross-thread entry points (wakeup signals and worker-pool completions).
//! Everything user-visible that starts here ends in a trampoline invoked on
//! the loop thread, which recovers the owning wrapper through its user-data
//! back-pointer and publishes a typed event.
//!
//! ## Turn structure
//! ```text
//! run(mode):
//!   while alive and not stopped:
//!     update cached time
//!     poll (timeout: zero if idles/closes pending, else next timer, else ∞)
//!     drain pool completions ──► after-work trampolines
//!     drain wakeup signals   ──► wakeup trampolines
//!     expire due timers      ──► timer trampolines (repeat rearms first)
//!     run active idles       ──► idle trampolines
//!     flush pending closes   ──► close trampolines (slots freed)
//! ```
//!
//! ## Rules
//! - No borrow of any internal table is held while a trampoline runs; every
//!   dispatch loop snapshots its work first. Listeners are therefore free to
//!   start, stop and close resources from inside their own invocation.
//! - Flag words are written only here; wrappers read them through the raw
//!   struct they own, so there is no wrapper-side shadow state to drift.
//! - A close request is honored exactly once; the close callback runs on a
//!   later turn, never inline with the request.

pub(crate) mod pool;
pub(crate) mod raw;

use std::cell::{Cell, RefCell};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::io;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_queue::SegQueue;
use mio::{Events, Poll, Token, Waker};
use tracing::{debug, trace};

use crate::core::event_loop::RunMode;
use crate::core::resource::AnyResource;
use crate::error::NativeError;

use self::pool::{Completion, Job, Pool, PoolConfig, JOB_CANCELED, JOB_QUEUED};
use self::raw::{
    FlagWord, RawHandle, RawKind, RawRequest, ACTIVE, CLOSED, CLOSING, INITIALIZED, REFED,
};

/// Completion callback invoked with the wrapper recovered from a back-pointer.
pub(crate) type Trampoline = fn(Rc<dyn AnyResource>);

/// After-work callback; the flag reports a canceled job.
pub(crate) type WorkTrampoline = fn(Rc<dyn AnyResource>, bool);

const WAKER_TOKEN: Token = Token(0);

struct TimerState {
    deadline: Instant,
    repeat: Duration,
    cb: Trampoline,
    /// Arming generation; stale heap entries carry an older value.
    gen: u64,
}

struct WakeupState {
    pending: Arc<AtomicBool>,
    cb: Trampoline,
}

struct HandleSlot {
    owner: Weak<dyn AnyResource>,
    kind: RawKind,
    flags: Rc<FlagWord>,
    timer: Option<TimerState>,
    idle_cb: Option<Trampoline>,
    wakeup: Option<WakeupState>,
    close_cb: Option<Trampoline>,
}

struct RequestSlot {
    owner: Weak<dyn AnyResource>,
    state: Arc<AtomicU8>,
    after: WorkTrampoline,
}

fn alloc<T>(table: &mut Vec<Option<T>>, free: &mut Vec<usize>, value: T) -> usize {
    match free.pop() {
        Some(index) => {
            table[index] = Some(value);
            index
        }
        None => {
            table.push(Some(value));
            table.len() - 1
        }
    }
}

pub(crate) struct Reactor {
    poll: RefCell<Poll>,
    events: RefCell<Events>,
    waker: Arc<Waker>,

    handles: RefCell<Vec<Option<HandleSlot>>>,
    handles_free: RefCell<Vec<usize>>,
    requests: RefCell<Vec<Option<RequestSlot>>>,
    requests_free: RefCell<Vec<usize>>,

    timer_heap: RefCell<BinaryHeap<Reverse<(Instant, u64, usize)>>>,
    timer_gen: Cell<u64>,
    pending_close: RefCell<VecDeque<usize>>,

    completions: Arc<SegQueue<Completion>>,
    pool: RefCell<Option<Pool>>,
    pool_config: Cell<PoolConfig>,

    now: Cell<Instant>,
    stop_flag: Cell<bool>,
    closed: Cell<bool>,
}

impl Reactor {
    pub(crate) fn new() -> io::Result<Reactor> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER_TOKEN)?);
        Ok(Reactor {
            poll: RefCell::new(poll),
            events: RefCell::new(Events::with_capacity(64)),
            waker,
            handles: RefCell::new(Vec::new()),
            handles_free: RefCell::new(Vec::new()),
            requests: RefCell::new(Vec::new()),
            requests_free: RefCell::new(Vec::new()),
            timer_heap: RefCell::new(BinaryHeap::new()),
            timer_gen: Cell::new(0),
            pending_close: RefCell::new(VecDeque::new()),
            completions: Arc::new(SegQueue::new()),
            pool: RefCell::new(None),
            pool_config: Cell::new(PoolConfig::default()),
            now: Cell::new(Instant::now()),
            stop_flag: Cell::new(false),
            closed: Cell::new(false),
        })
    }

    pub(crate) fn set_pool_config(&self, config: PoolConfig) {
        self.pool_config.set(config);
    }

    pub(crate) fn waker(&self) -> Arc<Waker> {
        self.waker.clone()
    }

    // ---- registration -----------------------------------------------------

    /// Registers a raw handle, allocating its slot. The user-data
    /// back-pointer must already be installed.
    pub(crate) fn register(&self, raw: &RawHandle) -> Result<(), NativeError> {
        if self.closed.get() {
            return Err(NativeError::LoopClosed);
        }
        if raw.slot.get().is_some() {
            return Err(NativeError::Busy);
        }
        let owner = raw.owner().ok_or(NativeError::NotInitialized)?;
        let index = alloc(
            &mut self.handles.borrow_mut(),
            &mut self.handles_free.borrow_mut(),
            HandleSlot {
                owner: Rc::downgrade(&owner),
                kind: raw.kind,
                flags: raw.flags.clone(),
                timer: None,
                idle_cb: None,
                wakeup: None,
                close_cb: None,
            },
        );
        raw.slot.set(Some(index));
        raw.flags.set(INITIALIZED | REFED);
        trace!(slot = index, kind = ?raw.kind, "handle registered");
        Ok(())
    }

    /// Slot index of a live (initialized, not closing) handle.
    fn live_slot(&self, raw: &RawHandle) -> Result<usize, NativeError> {
        if raw.flags.has_any(CLOSING | CLOSED) {
            return Err(NativeError::AlreadyClosing);
        }
        raw.slot.get().ok_or(NativeError::NotInitialized)
    }

    pub(crate) fn set_refed(&self, raw: &RawHandle, refed: bool) {
        if refed {
            raw.flags.set(REFED);
        } else {
            raw.flags.unset(REFED);
        }
    }

    // ---- timers -----------------------------------------------------------

    pub(crate) fn timer_start(
        &self,
        raw: &RawHandle,
        timeout: Duration,
        repeat: Duration,
        cb: Trampoline,
    ) -> Result<(), NativeError> {
        let index = self.live_slot(raw)?;
        let gen = self.timer_gen.get() + 1;
        self.timer_gen.set(gen);
        let deadline = self.now.get() + timeout;
        {
            let mut handles = self.handles.borrow_mut();
            let slot = handles
                .get_mut(index)
                .and_then(|s| s.as_mut())
                .ok_or(NativeError::NotInitialized)?;
            slot.timer = Some(TimerState {
                deadline,
                repeat,
                cb,
                gen,
            });
        }
        self.timer_heap.borrow_mut().push(Reverse((deadline, gen, index)));
        raw.flags.set(ACTIVE);
        trace!(slot = index, ?timeout, ?repeat, "timer armed");
        Ok(())
    }

    pub(crate) fn timer_stop(&self, raw: &RawHandle) -> Result<(), NativeError> {
        let index = self.live_slot(raw)?;
        let mut handles = self.handles.borrow_mut();
        let slot = handles
            .get_mut(index)
            .and_then(|s| s.as_mut())
            .ok_or(NativeError::NotInitialized)?;
        // Heap entries for the old arming become stale and are skipped.
        slot.timer = None;
        raw.flags.unset(ACTIVE);
        Ok(())
    }

    // ---- idles ------------------------------------------------------------

    pub(crate) fn idle_start(&self, raw: &RawHandle, cb: Trampoline) -> Result<(), NativeError> {
        let index = self.live_slot(raw)?;
        let mut handles = self.handles.borrow_mut();
        let slot = handles
            .get_mut(index)
            .and_then(|s| s.as_mut())
            .ok_or(NativeError::NotInitialized)?;
        slot.idle_cb = Some(cb);
        raw.flags.set(ACTIVE);
        Ok(())
    }

    pub(crate) fn idle_stop(&self, raw: &RawHandle) -> Result<(), NativeError> {
        let index = self.live_slot(raw)?;
        let mut handles = self.handles.borrow_mut();
        let slot = handles
            .get_mut(index)
            .and_then(|s| s.as_mut())
            .ok_or(NativeError::NotInitialized)?;
        slot.idle_cb = None;
        raw.flags.unset(ACTIVE);
        Ok(())
    }

    // ---- wakeups ----------------------------------------------------------

    /// Arms a wakeup handle. Wakeup handles are active from initialization
    /// until closed; `pending` is the flag the detached sender flips.
    pub(crate) fn wakeup_init(
        &self,
        raw: &RawHandle,
        pending: Arc<AtomicBool>,
        cb: Trampoline,
    ) -> Result<(), NativeError> {
        let index = self.live_slot(raw)?;
        let mut handles = self.handles.borrow_mut();
        let slot = handles
            .get_mut(index)
            .and_then(|s| s.as_mut())
            .ok_or(NativeError::NotInitialized)?;
        slot.wakeup = Some(WakeupState { pending, cb });
        raw.flags.set(ACTIVE);
        Ok(())
    }

    // ---- close ------------------------------------------------------------

    /// Requests teardown of a handle. Returns false (and does nothing) if
    /// the handle is already closing, closed, or was never registered.
    pub(crate) fn close(&self, raw: &RawHandle, cb: Trampoline) -> bool {
        if raw.flags.has_any(CLOSING | CLOSED) {
            return false;
        }
        let Some(index) = raw.slot.get() else {
            return false;
        };
        {
            let mut handles = self.handles.borrow_mut();
            let Some(slot) = handles.get_mut(index).and_then(|s| s.as_mut()) else {
                return false;
            };
            slot.timer = None;
            slot.idle_cb = None;
            slot.wakeup = None;
            slot.close_cb = Some(cb);
        }
        raw.flags.unset(ACTIVE);
        raw.flags.set(CLOSING);
        self.pending_close.borrow_mut().push_back(index);
        trace!(slot = index, "close requested");
        true
    }

    // ---- work -------------------------------------------------------------

    pub(crate) fn queue_work(
        &self,
        raw: &RawRequest,
        task: Box<dyn FnOnce() + Send>,
        after: WorkTrampoline,
    ) -> Result<(), NativeError> {
        if self.closed.get() {
            return Err(NativeError::LoopClosed);
        }
        if raw.slot.get().is_some() {
            return Err(NativeError::Busy);
        }
        let owner = raw.owner().ok_or(NativeError::NotInitialized)?;
        let state = Arc::new(AtomicU8::new(JOB_QUEUED));
        let index = alloc(
            &mut self.requests.borrow_mut(),
            &mut self.requests_free.borrow_mut(),
            RequestSlot {
                owner: Rc::downgrade(&owner),
                state: state.clone(),
                after,
            },
        );
        raw.slot.set(Some(index));
        if let Err(err) = self.submit_job(Job {
            req: index,
            state,
            task,
        }) {
            self.requests.borrow_mut()[index] = None;
            self.requests_free.borrow_mut().push(index);
            raw.slot.set(None);
            return Err(err);
        }
        trace!(slot = index, "work queued");
        Ok(())
    }

    fn submit_job(&self, job: Job) -> Result<(), NativeError> {
        let mut pool = self.pool.borrow_mut();
        if pool.is_none() {
            let spawned = Pool::spawn(
                self.pool_config.get(),
                self.completions.clone(),
                self.waker.clone(),
            )?;
            *pool = Some(spawned);
        }
        if let Some(pool) = pool.as_ref() {
            pool.submit(job);
        }
        Ok(())
    }

    /// Best-effort cancel: succeeds only while the job is still queued.
    pub(crate) fn cancel_work(&self, raw: &RawRequest) -> Result<(), NativeError> {
        let index = raw.slot.get().ok_or(NativeError::NotInitialized)?;
        let requests = self.requests.borrow();
        let slot = requests
            .get(index)
            .and_then(|s| s.as_ref())
            .ok_or(NativeError::NotInitialized)?;
        slot.state
            .compare_exchange(JOB_QUEUED, JOB_CANCELED, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| NativeError::Busy)?;
        Ok(())
    }

    // ---- liveness / run ---------------------------------------------------

    pub(crate) fn alive(&self) -> bool {
        if !self.pending_close.borrow().is_empty() {
            return true;
        }
        if self.requests.borrow().iter().any(|slot| slot.is_some()) {
            return true;
        }
        self.handles
            .borrow()
            .iter()
            .flatten()
            .any(|slot| slot.flags.has(ACTIVE | REFED))
    }

    pub(crate) fn stop(&self) {
        self.stop_flag.set(true);
    }

    pub(crate) fn run(&self, mode: RunMode) -> bool {
        loop {
            if self.stop_flag.get() || !self.alive() {
                break;
            }
            self.turn(mode);
            if mode != RunMode::Default {
                break;
            }
        }
        self.stop_flag.set(false);
        self.alive()
    }

    pub(crate) fn close_loop(&self) -> Result<(), NativeError> {
        if self.closed.get() {
            return Ok(());
        }
        let busy = !self.pending_close.borrow().is_empty()
            || self.handles.borrow().iter().any(|slot| slot.is_some())
            || self.requests.borrow().iter().any(|slot| slot.is_some());
        if busy {
            return Err(NativeError::Busy);
        }
        self.closed.set(true);
        debug!("reactor closed");
        Ok(())
    }

    pub(crate) fn now(&self) -> Instant {
        self.now.get()
    }

    pub(crate) fn update_now(&self) {
        self.now.set(Instant::now());
    }

    // ---- the turn ---------------------------------------------------------

    fn turn(&self, mode: RunMode) {
        self.update_now();
        let timeout = self.poll_timeout(mode);
        self.poll_events(timeout);
        self.update_now();
        self.drain_completions();
        self.drain_wakeups();
        self.run_timers();
        self.run_idles();
        self.flush_closes();
    }

    fn poll_timeout(&self, mode: RunMode) -> Option<Duration> {
        if mode == RunMode::NoWait {
            return Some(Duration::ZERO);
        }
        if !self.pending_close.borrow().is_empty() {
            return Some(Duration::ZERO);
        }
        if self
            .handles
            .borrow()
            .iter()
            .flatten()
            .any(|slot| slot.idle_cb.is_some())
        {
            return Some(Duration::ZERO);
        }
        // Earliest live timer; stale heap entries are discarded on the way.
        let mut heap = self.timer_heap.borrow_mut();
        let handles = self.handles.borrow();
        while let Some(&Reverse((deadline, gen, index))) = heap.peek() {
            let live = handles
                .get(index)
                .and_then(|s| s.as_ref())
                .and_then(|s| s.timer.as_ref())
                .is_some_and(|t| t.gen == gen);
            if live {
                return Some(deadline.saturating_duration_since(self.now.get()));
            }
            heap.pop();
        }
        // Nothing scheduled: block until a wakeup or a pool completion.
        None
    }

    fn poll_events(&self, timeout: Option<Duration>) {
        let mut poll = self.poll.borrow_mut();
        let mut events = self.events.borrow_mut();
        loop {
            match poll.poll(&mut events, timeout) {
                Ok(()) => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    debug!(error = %err, "poll failed");
                    break;
                }
            }
        }
    }

    fn drain_completions(&self) {
        let mut finished: Vec<(WorkTrampoline, Rc<dyn AnyResource>, bool)> = Vec::new();
        while let Some(done) = self.completions.pop() {
            let slot = {
                let mut requests = self.requests.borrow_mut();
                requests.get_mut(done.req).and_then(|s| s.take())
            };
            let Some(slot) = slot else { continue };
            self.requests_free.borrow_mut().push(done.req);
            if let Some(owner) = slot.owner.upgrade() {
                finished.push((slot.after, owner, done.canceled));
            }
        }
        for (after, owner, canceled) in finished {
            after(owner, canceled);
        }
    }

    fn drain_wakeups(&self) {
        let mut fired: Vec<(Trampoline, Rc<dyn AnyResource>)> = Vec::new();
        {
            let handles = self.handles.borrow();
            for slot in handles.iter().flatten() {
                let Some(wakeup) = slot.wakeup.as_ref() else {
                    continue;
                };
                if wakeup.pending.swap(false, Ordering::AcqRel) {
                    if let Some(owner) = slot.owner.upgrade() {
                        fired.push((wakeup.cb, owner));
                    }
                }
            }
        }
        for (cb, owner) in fired {
            cb(owner);
        }
    }

    fn run_timers(&self) {
        let now = self.now.get();
        let mut due: Vec<(Trampoline, Rc<dyn AnyResource>)> = Vec::new();
        {
            let mut heap = self.timer_heap.borrow_mut();
            let mut handles = self.handles.borrow_mut();
            while let Some(&Reverse((deadline, gen, index))) = heap.peek() {
                if deadline > now {
                    break;
                }
                heap.pop();
                let Some(slot) = handles.get_mut(index).and_then(|s| s.as_mut()) else {
                    continue;
                };
                let cb = {
                    let Some(state) = slot.timer.as_mut() else {
                        continue;
                    };
                    if state.gen != gen {
                        continue;
                    }
                    let cb = state.cb;
                    if state.repeat > Duration::ZERO {
                        // Rearm before the callback runs, like any repeating
                        // timer a listener may stop or restart.
                        state.deadline = now + state.repeat;
                        heap.push(Reverse((state.deadline, gen, index)));
                    } else {
                        slot.timer = None;
                        slot.flags.unset(ACTIVE);
                    }
                    cb
                };
                if let Some(owner) = slot.owner.upgrade() {
                    due.push((cb, owner));
                }
            }
        }
        for (cb, owner) in due {
            cb(owner);
        }
    }

    fn run_idles(&self) {
        let mut active: Vec<(Trampoline, Rc<dyn AnyResource>)> = Vec::new();
        {
            let handles = self.handles.borrow();
            for slot in handles.iter().flatten() {
                if let Some(cb) = slot.idle_cb {
                    if let Some(owner) = slot.owner.upgrade() {
                        active.push((cb, owner));
                    }
                }
            }
        }
        for (cb, owner) in active {
            cb(owner);
        }
    }

    fn flush_closes(&self) {
        // One at a time: a close listener may close further handles.
        loop {
            let index = self.pending_close.borrow_mut().pop_front();
            let Some(index) = index else { break };
            let slot = {
                let mut handles = self.handles.borrow_mut();
                handles.get_mut(index).and_then(|s| s.take())
            };
            let Some(slot) = slot else { continue };
            self.handles_free.borrow_mut().push(index);
            slot.flags.unset(CLOSING);
            slot.flags.set(CLOSED);
            trace!(slot = index, "close completed");
            if let Some(cb) = slot.close_cb {
                if let Some(owner) = slot.owner.upgrade() {
                    cb(owner);
                }
            }
        }
    }

    // ---- walk -------------------------------------------------------------

    /// Snapshot of every live handle: kind tag plus the wrapper recovered
    /// through the slot's registration and its back-pointer.
    pub(crate) fn walk(&self) -> Vec<(RawKind, Rc<dyn AnyResource>)> {
        self.handles
            .borrow()
            .iter()
            .flatten()
            .filter_map(|slot| slot.owner.upgrade().map(|owner| (slot.kind, owner)))
            .collect()
    }
}
