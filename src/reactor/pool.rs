//! # Worker pool for thread-offloaded jobs.
//!
//! A small set of parked threads fed by a lock-free injector queue. Jobs are
//! pushed from the loop thread; completions travel back over a second queue
//! and the poller's waker, so the user-visible event always fires on the loop
//! thread.
//!
//! ```text
//! loop thread                    pool threads
//!   submit(Job) ──► injector ──► pop / park
//!                                 │ run task (unless canceled)
//!   drain ◄──── completions ◄────┘ push + wake
//! ```
//!
//! The pool is spawned lazily on the first submitted job and shut down when
//! the owning reactor drops: workers observe the cleared run flag on their
//! next unpark and exit.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_queue::SegQueue;
use mio::Waker;
use tracing::debug;

/// Worker-pool sizing.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// Number of worker threads; clamped to at least 1.
    pub threads: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { threads: 4 }
    }
}

// Job lifecycle, shared between the loop thread (queue/cancel) and the
// worker that eventually pops the job.
pub(crate) const JOB_QUEUED: u8 = 0;
pub(crate) const JOB_RUNNING: u8 = 1;
pub(crate) const JOB_CANCELED: u8 = 2;
pub(crate) const JOB_DONE: u8 = 3;

pub(crate) struct Job {
    /// Slot in the reactor's request table.
    pub(crate) req: usize,
    pub(crate) state: Arc<AtomicU8>,
    pub(crate) task: Box<dyn FnOnce() + Send>,
}

pub(crate) struct Completion {
    pub(crate) req: usize,
    pub(crate) canceled: bool,
}

struct WorkerHandle {
    idle: Arc<AtomicBool>,
    thread: thread::Thread,
}

pub(crate) struct Pool {
    injector: Arc<SegQueue<Job>>,
    workers: Vec<WorkerHandle>,
    running: Arc<AtomicBool>,
}

impl Pool {
    pub(crate) fn spawn(
        config: PoolConfig,
        completions: Arc<SegQueue<Completion>>,
        waker: Arc<Waker>,
    ) -> io::Result<Pool> {
        let threads = config.threads.max(1);
        let injector: Arc<SegQueue<Job>> = Arc::new(SegQueue::new());
        let running = Arc::new(AtomicBool::new(true));
        let mut workers = Vec::with_capacity(threads);

        for id in 0..threads {
            let injector = injector.clone();
            let completions = completions.clone();
            let waker = waker.clone();
            let running = running.clone();
            let idle = Arc::new(AtomicBool::new(false));
            let idle_flag = idle.clone();

            let handle = thread::Builder::new()
                .name(format!("eventide-pool-{id}"))
                .spawn(move || worker_loop(&injector, &completions, &waker, &running, &idle_flag))?;
            workers.push(WorkerHandle {
                idle,
                thread: handle.thread().clone(),
            });
        }

        debug!(threads, "worker pool spawned");
        Ok(Pool {
            injector,
            workers,
            running,
        })
    }

    pub(crate) fn submit(&self, job: Job) {
        self.injector.push(job);
        self.unpark_one();
    }

    fn unpark_one(&self) {
        for worker in &self.workers {
            if worker.idle.swap(false, Ordering::AcqRel) {
                worker.thread.unpark();
                return;
            }
        }
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        for worker in &self.workers {
            worker.thread.unpark();
        }
    }
}

fn worker_loop(
    injector: &SegQueue<Job>,
    completions: &SegQueue<Completion>,
    waker: &Waker,
    running: &AtomicBool,
    idle: &AtomicBool,
) {
    while running.load(Ordering::Acquire) {
        if let Some(job) = injector.pop() {
            run_job(job, completions, waker);
            continue;
        }
        idle.store(true, Ordering::Release);
        // A submit may have raced the idle flag; drain once more before
        // parking so the job is not stranded until the next unpark.
        if let Some(job) = injector.pop() {
            idle.store(false, Ordering::Release);
            run_job(job, completions, waker);
            continue;
        }
        thread::park();
        idle.store(false, Ordering::Release);
    }
}

fn run_job(job: Job, completions: &SegQueue<Completion>, waker: &Waker) {
    let canceled = job
        .state
        .compare_exchange(JOB_QUEUED, JOB_RUNNING, Ordering::AcqRel, Ordering::Acquire)
        .is_err();
    if !canceled {
        (job.task)();
        job.state.store(JOB_DONE, Ordering::Release);
    }
    completions.push(Completion {
        req: job.req,
        canceled,
    });
    // Nothing useful can be done from a pool thread if the wake fails; the
    // next loop turn will still drain the completion queue.
    let _ = waker.wake();
}
