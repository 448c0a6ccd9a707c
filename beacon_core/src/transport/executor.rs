/**
 * Serialized executor — one background worker thread draining a FIFO
 * channel of tasks.
 *
 * Architecture overview:
 *
 * ```text
 *  ┌──────────────┐     unbounded channel     ┌─────────────────┐
 *  │  Component   │ ──────  WorkerMsg  ─────► │  Worker thread   │
 *  │  (any thread)│                           │  (at most one)   │
 *  └──────────────┘                           └───────┬─────────┘
 *                                                     │
 *                                     catch_unwind(task) + delay heap
 * ```
 *
 * The channel carries `WorkerMsg` variants:
 * - `Run(task)` — execute as soon as everything before it has run.
 * - `Schedule(delayed)` — park on the worker's delay heap until due.
 *
 * Every task runs behind `catch_unwind`: a panicking task is logged with
 * the worker's thread name and the panic message, and the worker moves
 * on to the next task.
 *
 * The worker is spawned lazily and released after `keep_alive` without
 * queued or delayed work; the next submission spawns a fresh one. Worker
 * threads are detached and never keep the process alive.
 */
use std::any::Any;
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::logger::Logger;
use crate::protocol::constants::THREAD_PREFIX;

type Task = Box<dyn FnOnce() + Send + 'static>;

// ---------------------------------------------------------------------------
// WorkerMsg — the messages sent through the channel
// ---------------------------------------------------------------------------

enum WorkerMsg {
    Run(Task),
    Schedule(Delayed),
}

// ---------------------------------------------------------------------------
// Delayed tasks
// ---------------------------------------------------------------------------

struct ScheduledShared {
    deadline: Instant,
    cancelled: AtomicBool,
    done: AtomicBool,
}

/**
 * Handle to a task armed with `schedule_once`.
 *
 * Cancelling only prevents a task that has not started yet; a running
 * task is never interrupted.
 */
#[derive(Clone)]
pub struct ScheduledHandle {
    shared: Arc<ScheduledShared>,
}

impl ScheduledHandle {
    pub fn cancel(&self) {
        self.shared.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::Acquire)
    }

    /// Ran, or was skipped because it was cancelled, or was dropped by shutdown.
    pub fn is_done(&self) -> bool {
        self.shared.done.load(Ordering::Acquire)
    }

    pub fn deadline(&self) -> Instant {
        self.shared.deadline
    }

    /// Milliseconds until the deadline; negative once it has passed.
    pub fn delay_millis(&self) -> i64 {
        let now = Instant::now();
        let deadline = self.shared.deadline;
        if deadline >= now {
            millis(deadline - now)
        } else {
            -millis(now - deadline)
        }
    }
}

/// Longest delay honoured as given; anything beyond is clamped.
const MAX_DELAY: Duration = Duration::from_secs(u32::MAX as u64);

/// `now + delay`, clamped so that huge delays never overflow `Instant`.
pub(crate) fn deadline_after(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay.min(MAX_DELAY))
        .or_else(|| now.checked_add(Duration::from_secs(86_400 * 365)))
        .unwrap_or(now)
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

struct Delayed {
    seq: u64,
    task: Task,
    shared: Arc<ScheduledShared>,
}

impl Delayed {
    fn key(&self) -> (Instant, u64) {
        (self.shared.deadline, self.seq)
    }
}

impl PartialEq for Delayed {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Delayed {}

impl PartialOrd for Delayed {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Delayed {
    /// Reversed so that `BinaryHeap` pops the earliest deadline first.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other.key().cmp(&self.key())
    }
}

// ---------------------------------------------------------------------------
// SerializedExecutor
// ---------------------------------------------------------------------------

struct ExecutorState {
    /// `None` once shut down; dropping the only sender disconnects the worker.
    sender: Option<Sender<WorkerMsg>>,
    worker_alive: bool,
}

impl ExecutorState {
    fn is_terminated(&self) -> bool {
        self.sender.is_none() && !self.worker_alive
    }
}

struct ExecutorInner {
    name: String,
    keep_alive: Duration,
    logger: Arc<dyn Logger>,
    receiver: Receiver<WorkerMsg>,
    state: Mutex<ExecutorState>,
    terminated: Condvar,
    discarding: AtomicBool,
    thread_seq: AtomicUsize,
    schedule_seq: AtomicU64,
}

impl ExecutorInner {
    fn lock_state(&self) -> MutexGuard<'_, ExecutorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/**
 * Single-worker task queue owned by exactly one component.
 *
 * Cloning yields another handle to the same queue (the component's timer
 * holds one); it does not create a second worker.
 */
#[derive(Clone)]
pub struct SerializedExecutor {
    inner: Arc<ExecutorInner>,
}

impl SerializedExecutor {
    /**
     * Creates an executor. No thread is spawned until the first task arrives.
     *
     * # Arguments
     * * `name` — Appears in the worker thread name and in diagnostics.
     * * `keep_alive` — Idle period after which the worker thread is released.
     * * `logger` — Receives thread lifecycle, rejection and panic reports.
     */
    pub fn new(name: impl Into<String>, keep_alive: Duration, logger: Arc<dyn Logger>) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();

        Self {
            inner: Arc::new(ExecutorInner {
                name: name.into(),
                keep_alive,
                logger,
                receiver,
                state: Mutex::new(ExecutorState {
                    sender: Some(sender),
                    worker_alive: false,
                }),
                terminated: Condvar::new(),
                discarding: AtomicBool::new(false),
                thread_seq: AtomicUsize::new(0),
                schedule_seq: AtomicU64::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /**
     * Enqueues `task` behind everything already submitted.
     *
     * After shutdown the task is dropped and the rejection is logged; the
     * caller never has to handle an error.
     */
    pub fn submit<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue(WorkerMsg::Run(Box::new(task)));
    }

    /**
     * Arms `task` to run on the worker once `delay` has elapsed.
     *
     * Returns `None` when the executor is shut down (rejection is logged).
     */
    pub fn schedule_once<F>(&self, task: F, delay: Duration) -> Option<ScheduledHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        let shared = Arc::new(ScheduledShared {
            deadline: deadline_after(delay),
            cancelled: AtomicBool::new(false),
            done: AtomicBool::new(false),
        });
        let delayed = Delayed {
            seq: self.inner.schedule_seq.fetch_add(1, Ordering::Relaxed),
            task: Box::new(task),
            shared: Arc::clone(&shared),
        };

        if self.enqueue(WorkerMsg::Schedule(delayed)) {
            Some(ScheduledHandle { shared })
        } else {
            None
        }
    }

    /**
     * Stops accepting work. Tasks already queued still run; delayed tasks
     * that are not due yet are dropped. Does not block.
     */
    pub fn shutdown(&self) {
        let mut state = self.inner.lock_state();
        state.sender = None;
        if !state.worker_alive {
            self.inner.terminated.notify_all();
        }
    }

    /**
     * Stops accepting work and discards everything that has not started.
     * The task currently running, if any, finishes normally.
     *
     * # Returns
     * The number of queued tasks that were discarded.
     */
    pub fn shutdown_now(&self) -> usize {
        self.inner.discarding.store(true, Ordering::Release);

        let mut state = self.inner.lock_state();
        state.sender = None;

        let mut discarded = 0;
        while let Ok(msg) = self.inner.receiver.try_recv() {
            match msg {
                WorkerMsg::Run(_) => discarded += 1,
                WorkerMsg::Schedule(entry) => entry.shared.done.store(true, Ordering::Release),
            }
        }

        if !state.worker_alive {
            self.inner.terminated.notify_all();
        }
        discarded
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.lock_state().sender.is_none()
    }

    /// Shut down and the worker has exited.
    pub fn is_terminated(&self) -> bool {
        self.inner.lock_state().is_terminated()
    }

    /// Whether a worker thread currently exists.
    pub fn has_worker(&self) -> bool {
        self.inner.lock_state().worker_alive
    }

    /**
     * Blocks until the executor is shut down and its worker has exited, or
     * until `timeout` elapses. Must not be called from the worker itself.
     *
     * # Returns
     * `true` if the executor terminated in time.
     */
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let state = self.inner.lock_state();
        let result = self
            .inner
            .terminated
            .wait_timeout_while(state, timeout, |s| !s.is_terminated());

        match result {
            Ok((state, _)) => state.is_terminated(),
            Err(_) => false,
        }
    }

    fn enqueue(&self, msg: WorkerMsg) -> bool {
        let mut state = self.inner.lock_state();

        let accepted = match state.sender.as_ref() {
            Some(sender) => sender.send(msg).is_ok(),
            None => false,
        };

        if !accepted {
            self.inner
                .logger
                .warn(&format!("Task rejected from {}", self.inner.name));
            return false;
        }

        if !state.worker_alive {
            Worker::spawn(&self.inner, &mut state);
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Worker — the background thread
// ---------------------------------------------------------------------------

struct Worker;

impl Worker {
    /// Spawns a worker. Called with the state lock held.
    fn spawn(inner: &Arc<ExecutorInner>, state: &mut ExecutorState) {
        let seq = inner.thread_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let thread_name = format!("{THREAD_PREFIX}{}-{seq}", inner.name);
        let worker_inner = Arc::clone(inner);

        let spawned = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || Self::run_loop(&worker_inner));

        match spawned {
            Ok(_) => {
                state.worker_alive = true;
                inner.logger.verbose(&format!("Thread {thread_name} created"));
            }
            Err(e) => {
                /*
                 * The task stays queued; the next submission tries again.
                 */
                inner
                    .logger
                    .error(&format!("Failed to spawn worker thread {thread_name}: {e}"));
            }
        }
    }

    fn run_loop(inner: &ExecutorInner) {
        let thread_name = thread::current()
            .name()
            .unwrap_or(inner.name.as_str())
            .to_string();
        let mut delayed: BinaryHeap<Delayed> = BinaryHeap::new();

        loop {
            if inner.discarding.load(Ordering::Acquire) {
                break;
            }

            while delayed
                .peek()
                .is_some_and(|d| d.shared.cancelled.load(Ordering::Acquire))
            {
                if let Some(cancelled) = delayed.pop() {
                    cancelled.shared.done.store(true, Ordering::Release);
                }
            }

            let now = Instant::now();
            if delayed.peek().is_some_and(|d| d.shared.deadline <= now) {
                if let Some(due) = delayed.pop() {
                    Self::run_delayed(inner, &thread_name, due);
                }
                continue;
            }

            /* Wake at least every keep-alive to sweep cancelled entries. */
            let wait = delayed
                .peek()
                .map(|d| d.shared.deadline.saturating_duration_since(now))
                .map_or(inner.keep_alive, |due| due.min(inner.keep_alive));

            match inner.receiver.recv_timeout(wait) {
                Ok(WorkerMsg::Run(task)) => {
                    if inner.discarding.load(Ordering::Acquire) {
                        break;
                    }
                    Self::run_guarded(inner, &thread_name, task);
                }
                Ok(WorkerMsg::Schedule(entry)) => delayed.push(entry),
                Err(RecvTimeoutError::Timeout) => {
                    if delayed.is_empty() {
                        /*
                         * Idle release. Re-check emptiness under the state lock
                         * so a concurrent submit either lands before we look or
                         * sees `worker_alive == false` and spawns a new worker.
                         */
                        let mut state = inner.lock_state();
                        if inner.receiver.is_empty() {
                            state.worker_alive = false;
                            inner.logger.verbose(&format!("Thread {thread_name} released"));
                            if state.sender.is_none() {
                                inner.terminated.notify_all();
                            }
                            return;
                        }
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        /*
         * Shut down: delayed tasks that never came due are dropped.
         */
        for entry in delayed.drain() {
            entry.shared.done.store(true, Ordering::Release);
        }
        let mut state = inner.lock_state();
        state.worker_alive = false;
        inner.terminated.notify_all();
    }

    fn run_delayed(inner: &ExecutorInner, thread_name: &str, due: Delayed) {
        let Delayed { task, shared, .. } = due;
        if !shared.cancelled.load(Ordering::Acquire) {
            Self::run_guarded(inner, thread_name, task);
        }
        shared.done.store(true, Ordering::Release);
    }

    fn run_guarded(inner: &ExecutorInner, thread_name: &str, task: Task) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
            inner.logger.error(&format!(
                "Thread {thread_name} with error {}",
                panic_message(payload.as_ref())
            ));
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
