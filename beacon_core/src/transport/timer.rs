/**
 * One-shot timer — a cancellable, re-armable delayed trigger running its
 * action on the owning component's `SerializedExecutor`.
 *
 * Merge rule: a timer only ever fires sooner, never later. Arming while a
 * fire is already pending keeps whichever deadline comes first.
 *
 * ```text
 *            start_in(d)                    fire
 *   Idle ───────────────► Armed{deadline} ────────► Idle
 *     │                      │  start_in(d') with an earlier deadline
 *     │                      └──► Armed{earlier deadline}
 *     └──── cancel ──► Cancelled ◄── cancel ──┘      (terminal)
 * ```
 */
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::executor::{deadline_after, ScheduledHandle, SerializedExecutor};
use crate::logger::Logger;

/// Observable timer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// Never armed, or already fired.
    Idle,
    /// A fire is pending at `deadline`.
    Armed { deadline: Instant },
    /// Terminal: no further fires.
    Cancelled,
}

enum Slot {
    Idle,
    Armed {
        handle: ScheduledHandle,
        generation: u64,
    },
    Cancelled,
}

struct TimerInner {
    name: String,
    executor: SerializedExecutor,
    action: Box<dyn Fn() + Send + Sync>,
    logger: Arc<dyn Logger>,
    slot: Mutex<Slot>,
    generation: AtomicU64,
    firing: AtomicBool,
}

impl TimerInner {
    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs on the executor. Stale fires from a replaced arm are ignored.
    fn fire(&self, generation: u64) {
        {
            let mut slot = self.lock_slot();
            match &*slot {
                Slot::Armed { generation: current, .. } if *current == generation => {
                    *slot = Slot::Idle;
                }
                _ => return,
            }
        }

        self.logger.verbose(&format!("{} fired", self.name));
        self.firing.store(true, Ordering::Release);
        (self.action)();
        self.firing.store(false, Ordering::Release);
    }
}

pub struct OneShotTimer {
    inner: Arc<TimerInner>,
}

impl OneShotTimer {
    /**
     * Binds `action` to a new idle timer.
     *
     * # Arguments
     * * `executor` — Handle to the owning component's executor; fires run there.
     * * `action` — Invoked once per fire.
     * * `name` — Used in log lines, e.g. `"Attribution timer"`.
     * * `logger` — Receives arm / fire / cancel traces.
     */
    pub fn new<F>(
        executor: SerializedExecutor,
        action: F,
        name: impl Into<String>,
        logger: Arc<dyn Logger>,
    ) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(TimerInner {
                name: name.into(),
                executor,
                action: Box::new(action),
                logger,
                slot: Mutex::new(Slot::Idle),
                generation: AtomicU64::new(0),
                firing: AtomicBool::new(false),
            }),
        }
    }

    /**
     * Arms the timer to fire after at least `delay`.
     *
     * - Idle → armed.
     * - Armed with a deadline no later than `now + delay` → no-op.
     * - Armed with a later deadline → the pending fire is replaced.
     * - Cancelled → no-op.
     */
    pub fn start_in(&self, delay: Duration) {
        let inner = &self.inner;
        let mut slot = inner.lock_slot();

        match &*slot {
            Slot::Cancelled => {
                inner
                    .logger
                    .verbose(&format!("{} is cancelled and cannot be started", inner.name));
                return;
            }
            Slot::Armed { handle, .. } if !handle.is_done() => {
                if handle.deadline() <= deadline_after(delay) {
                    return;
                }
                handle.cancel();
            }
            _ => {}
        }

        let generation = inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let weak = Arc::downgrade(inner);

        inner.logger.verbose(&format!(
            "{} starting. Launching in {:.1} seconds",
            inner.name,
            delay.as_secs_f64()
        ));

        let scheduled = inner.executor.schedule_once(
            move || {
                if let Some(timer) = weak.upgrade() {
                    timer.fire(generation);
                }
            },
            delay,
        );

        *slot = match scheduled {
            Some(handle) => Slot::Armed { handle, generation },
            None => Slot::Idle,
        };
    }

    /**
     * Moves the timer to the terminal cancelled state and drops any pending
     * fire. An action that is already running is left to finish; threads
     * cannot be interrupted, `interrupt_if_running` only reports it.
     */
    pub fn cancel(&self, interrupt_if_running: bool) {
        let inner = &self.inner;
        let mut slot = inner.lock_slot();

        if let Slot::Armed { handle, .. } = &*slot {
            handle.cancel();
        }
        *slot = Slot::Cancelled;

        if interrupt_if_running && inner.firing.load(Ordering::Acquire) {
            inner.logger.verbose(&format!(
                "{} canceled while firing, the running action will complete",
                inner.name
            ));
        } else {
            inner.logger.verbose(&format!("{} canceled", inner.name));
        }
    }

    /// Milliseconds until the pending fire; `0` when idle or cancelled.
    pub fn fire_in_millis(&self) -> i64 {
        match &*self.inner.lock_slot() {
            Slot::Armed { handle, .. } if !handle.is_done() => handle.delay_millis(),
            _ => 0,
        }
    }

    pub fn state(&self) -> TimerState {
        match &*self.inner.lock_slot() {
            Slot::Armed { handle, .. } if !handle.is_done() => TimerState::Armed {
                deadline: handle.deadline(),
            },
            Slot::Cancelled => TimerState::Cancelled,
            _ => TimerState::Idle,
        }
    }
}
