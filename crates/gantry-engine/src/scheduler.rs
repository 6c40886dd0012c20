//! The embedder-facing scheduler facade
//!
//! Bundles the registry, start barrier, clock and guest kernel into one
//! shared state handed to every trampoline, and exposes the fixed set of
//! scheduling primitives the guest kernel calls.

use crate::barrier::StartBarrier;
use crate::clock::{Clock, ClockTicker};
use crate::registry::TaskRegistry;
use crate::task::{Task, TaskId};
use crate::timer::{self, EventHandle};
use crate::trampoline::{self, ThreadSpec};
use crate::SchedResult;
use gantry_sdk::GuestKernel;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Clock ticks per second
    pub hz: u32,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self { hz: 100 }
    }
}

/// Scheduler statistics
#[derive(Debug, Clone, Default)]
pub struct SchedulerStats {
    /// Total tasks started via `spawn_task`
    pub tasks_spawned: u64,

    /// Total timer events scheduled
    pub timers_scheduled: u64,

    /// Total timer events cancelled before firing
    pub timers_cancelled: u64,

    /// Currently live tasks
    pub live_tasks: usize,
}

/// State shared by the scheduler, every trampoline and the clock ticker
pub(crate) struct SchedState {
    /// Live task set
    pub registry: TaskRegistry,

    /// Startup gate
    pub barrier: Arc<StartBarrier>,

    /// Virtual time
    pub clock: Arc<Clock>,

    /// The guest kernel collaborator
    pub guest: Arc<dyn GuestKernel>,

    /// Counter: tasks started
    pub tasks_spawned: AtomicU64,

    /// Counter: timers scheduled
    pub timers_scheduled: AtomicU64,

    /// Counter: timers cancelled
    pub timers_cancelled: AtomicU64,
}

impl SchedState {
    pub(crate) fn new(guest: Arc<dyn GuestKernel>, hz: u32) -> Self {
        Self {
            registry: TaskRegistry::new(),
            barrier: Arc::new(StartBarrier::new()),
            clock: Arc::new(Clock::new(hz)),
            guest,
            tasks_spawned: AtomicU64::new(0),
            timers_scheduled: AtomicU64::new(0),
            timers_cancelled: AtomicU64::new(0),
        }
    }
}

/// The scheduling proxy.
///
/// Multiplexes the guest kernel's logical tasks onto one host thread each,
/// gates them behind the start barrier, and drives the virtual clock.
pub struct Scheduler {
    state: Arc<SchedState>,
    ticker: Arc<ClockTicker>,
    started: bool,
}

impl Scheduler {
    /// Create a scheduler for `guest` with default options
    pub fn new(guest: Arc<dyn GuestKernel>) -> Self {
        Self::with_options(guest, SchedulerOptions::default())
    }

    /// Create a scheduler for `guest` with explicit options
    pub fn with_options(guest: Arc<dyn GuestKernel>, options: SchedulerOptions) -> Self {
        let state = Arc::new(SchedState::new(guest, options.hz));
        let ticker = ClockTicker::new(Arc::clone(&state.clock), Arc::clone(&state.barrier));
        Self {
            state,
            ticker,
            started: false,
        }
    }

    /// Start the clock ticker and allow tasks to run.
    ///
    /// Idempotent: calling `start` again is a no-op.
    pub fn start(&mut self) {
        if self.started {
            return;
        }

        self.ticker.start();
        self.state.barrier.release_all();
        self.started = true;
    }

    /// Stop the clock ticker.
    ///
    /// Tasks blocked inside the guest kernel are the guest's business;
    /// this only tears down what the scheduler itself started.
    pub fn shutdown(&mut self) {
        if !self.started {
            return;
        }

        self.ticker.stop();
        self.started = false;
    }

    /// Whether `start` has been called
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Start a new task running `body`.
    ///
    /// The body does not execute before `start` releases the barrier. On
    /// host-thread creation failure the task is torn down and the error
    /// returned.
    pub fn spawn_task<F>(&self, body: F) -> SchedResult<Arc<Task>>
    where
        F: FnOnce() + Send + 'static,
    {
        let task = self
            .state
            .registry
            .create(self.state.guest.as_ref(), "task", false);

        let spec = ThreadSpec {
            body: Box::new(body),
            delay: None,
        };
        if let Err(err) = trampoline::spawn(&self.state, &task, spec) {
            self.state
                .registry
                .release(&task, self.state.guest.as_ref());
            return Err(err);
        }

        self.state.tasks_spawned.fetch_add(1, Ordering::Relaxed);
        Ok(task)
    }

    /// Schedule `body` to run once after `delay`
    pub fn schedule_timer<F>(&self, delay: Duration, body: F) -> SchedResult<EventHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        timer::schedule(&self.state, delay, Box::new(body))
    }

    /// Cancel a pending timer event.
    ///
    /// A no-op if the event already fired; otherwise the callback is
    /// guaranteed never to run, and the backing task is released before
    /// this returns.
    pub fn cancel_timer(&self, handle: EventHandle) {
        timer::cancel(&self.state, handle);
    }

    /// Block the calling task until another task wakes it
    pub fn block_current(&self) {
        let task = self.current();
        task.block();
        self.state.clock.refresh();
    }

    /// Wake `task`; returns whether a waiter existed at signal time
    pub fn wake(&self, task: &Task) -> bool {
        task.wake()
    }

    /// The task bound to the calling thread, lazily binding an "init"
    /// client task on threads the proxy did not create
    pub fn current(&self) -> Arc<Task> {
        self.state.registry.current(self.state.guest.as_ref())
    }

    /// Look up a live task by id
    pub fn find_task(&self, id: TaskId) -> Option<Arc<Task>> {
        self.state.registry.find(id)
    }

    /// Number of live tasks
    pub fn task_count(&self) -> usize {
        self.state.registry.len()
    }

    /// Current virtual time in clock ticks
    pub fn jiffies(&self) -> u64 {
        self.state.clock.jiffies()
    }

    /// The virtual clock
    pub fn clock(&self) -> &Arc<Clock> {
        &self.state.clock
    }

    /// Snapshot of scheduler counters
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            tasks_spawned: self.state.tasks_spawned.load(Ordering::Relaxed),
            timers_scheduled: self.state.timers_scheduled.load(Ordering::Relaxed),
            timers_cancelled: self.state.timers_cancelled.load(Ordering::Relaxed),
            live_tasks: self.state.registry.len(),
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
