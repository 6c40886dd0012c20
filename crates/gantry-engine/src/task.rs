//! Task structure, lifecycle state and the per-task wait/wake signal

use gantry_sdk::KernelHandle;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Unique identifier for a Task
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

impl TaskId {
    /// Generate a new unique TaskId
    pub fn new() -> Self {
        TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Create a TaskId from a u64 value
    pub fn from_u64(id: u64) -> Self {
        TaskId(id)
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle state of a Task
///
/// The normal path is `Created -> BarrierWait -> [TimedWait] -> Running ->
/// Retired`; `TimedWait` is entered only by timer tasks, and a cancelled
/// timer leaves through `Cancelled` instead of running its body.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TaskState {
    /// Task object exists, its thread has not reached the barrier yet
    Created,
    /// Blocked on the start barrier
    BarrierWait,
    /// Timer task waiting out its delay
    TimedWait,
    /// Executing its body
    Running,
    /// Retired after its body returned
    Retired,
    /// Cancelled before its body ran
    Cancelled,
}

/// Why a timed wait ended
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum TimedWaitOutcome {
    /// Delay elapsed, or an explicit wake fired the timer early
    Fire,
    /// The cancellation flag was observed
    Cancelled,
}

/// What a canceller must do after requesting cancellation
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum CancelOutcome {
    /// Flag set and signalled; the canceller joins and retires
    Requested,
    /// The task already fired or was already cancelled
    AlreadyDone,
    /// The body is running; the trampoline performs retirement
    Firing,
}

/// Fields protected by the task lock.
///
/// One lock and one condvar serve the wait/wake rendezvous, the timed wait
/// of timer tasks, and cancellation signalling, so every race between them
/// resolves under a single lock.
struct SyncState {
    state: TaskState,
    cancelled: bool,
    waiters: usize,
    woken: bool,
}

/// A logical execution unit bound to exactly one host thread
pub struct Task {
    /// Unique identifier
    id: TaskId,

    /// Descriptive label (not unique)
    name: String,

    /// Externally-driven task whose thread the proxy does not own
    client: bool,

    /// Lock-protected lifecycle and signalling state
    sync: Mutex<SyncState>,

    /// Condvar paired with `sync`
    cond: Condvar,

    /// Guest-kernel state, transferred out exactly once at retirement
    kernel: Mutex<Option<KernelHandle>>,

    /// Host thread, present once the spawner has recorded it
    thread: Mutex<Option<JoinHandle<()>>>,

    /// Monotonic: set once the thread handle has been recorded
    joinable: AtomicBool,

    /// Monotonic: set by whichever side performs retirement
    released: AtomicBool,
}

impl Task {
    /// Create a new Task carrying the guest kernel's handle
    pub(crate) fn new(id: TaskId, name: &str, client: bool, kernel: KernelHandle) -> Self {
        Self {
            id,
            name: name.to_string(),
            client,
            sync: Mutex::new(SyncState {
                state: TaskState::Created,
                cancelled: false,
                waiters: 0,
                woken: false,
            }),
            cond: Condvar::new(),
            kernel: Mutex::new(Some(kernel)),
            thread: Mutex::new(None),
            joinable: AtomicBool::new(false),
            released: AtomicBool::new(false),
        }
    }

    /// Get the Task's unique ID
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Get the Task's name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this is an externally-driven ("client") task
    pub fn is_client(&self) -> bool {
        self.client
    }

    /// Get the current lifecycle state
    pub fn state(&self) -> TaskState {
        self.sync.lock().state
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.sync.lock().cancelled
    }

    /// Run `f` against the guest kernel's per-task state, if still attached
    pub fn with_kernel_state<R>(&self, f: impl FnOnce(&KernelHandle) -> R) -> Option<R> {
        self.kernel.lock().as_ref().map(f)
    }

    // =========================================================================
    // Wait / wake rendezvous
    // =========================================================================

    /// Block the calling thread until this task is explicitly woken.
    ///
    /// Must be called by the task's own thread. The rendezvous is direct:
    /// a wake delivered while no waiter is registered is not banked for a
    /// future `block`.
    pub fn block(&self) {
        let mut sync = self.sync.lock();
        sync.waiters += 1;
        while !sync.woken {
            self.cond.wait(&mut sync);
        }
        sync.woken = false;
        sync.waiters -= 1;
    }

    /// Wake a blocked task.
    ///
    /// Returns whether a waiter existed at signal time; waking a task with
    /// no waiter is a harmless no-op. A task sleeping out a timer delay
    /// counts as a waiter and fires early when woken.
    pub fn wake(&self) -> bool {
        let mut sync = self.sync.lock();
        if sync.waiters == 0 {
            return false;
        }
        sync.woken = true;
        self.cond.notify_one();
        true
    }

    // =========================================================================
    // Timed wait (timer tasks)
    // =========================================================================

    /// Wait out a timer delay, watching for cancellation and explicit wakes.
    ///
    /// Called by the task's own thread from the trampoline. The wake cause
    /// is decided under the task lock: cancellation wins over a
    /// simultaneous deadline expiry, an explicit wake fires the timer
    /// early, and spurious wakeups re-wait until the deadline.
    ///
    /// On return the state has been advanced to `Running` (fire) or
    /// `Cancelled`.
    pub(crate) fn timed_wait(&self, delay: Duration) -> TimedWaitOutcome {
        let deadline = Instant::now() + delay;
        let mut sync = self.sync.lock();
        sync.state = TaskState::TimedWait;
        sync.waiters += 1;

        let outcome = loop {
            if sync.cancelled {
                break TimedWaitOutcome::Cancelled;
            }
            if sync.woken {
                sync.woken = false;
                break TimedWaitOutcome::Fire;
            }
            if Instant::now() >= deadline {
                break TimedWaitOutcome::Fire;
            }
            self.cond.wait_until(&mut sync, deadline);
        };

        sync.waiters -= 1;
        sync.state = match outcome {
            TimedWaitOutcome::Fire => TaskState::Running,
            TimedWaitOutcome::Cancelled => TaskState::Cancelled,
        };
        outcome
    }

    // =========================================================================
    // Cancellation
    // =========================================================================

    /// Request cancellation of a pending timer task.
    ///
    /// The flag is set and the condvar signalled under the task lock, so
    /// this resolves deterministically against a timer that is firing: once
    /// the trampoline has committed to `Running` (or retired), cancellation
    /// performs no further action.
    pub(crate) fn request_cancel(&self) -> CancelOutcome {
        let mut sync = self.sync.lock();
        match sync.state {
            TaskState::Retired | TaskState::Cancelled => CancelOutcome::AlreadyDone,
            TaskState::Running => CancelOutcome::Firing,
            _ if sync.cancelled => CancelOutcome::AlreadyDone,
            _ => {
                sync.cancelled = true;
                self.cond.notify_one();
                CancelOutcome::Requested
            }
        }
    }

    // =========================================================================
    // Host-thread bookkeeping
    // =========================================================================

    /// Record the host thread handle; marks the task joinable
    pub(crate) fn record_thread(&self, handle: JoinHandle<()>) {
        *self.thread.lock() = Some(handle);
        self.joinable.store(true, Ordering::Release);
    }

    /// Take the host thread handle for joining
    pub(crate) fn take_thread(&self) -> Option<JoinHandle<()>> {
        self.thread.lock().take()
    }

    /// Whether a thread handle was ever recorded.
    ///
    /// Checked by the trampoline's cancelled branch: a canceller can only
    /// join (and therefore retire) a task whose handle was recorded, so an
    /// unjoinable cancelled task must retire itself.
    pub(crate) fn is_joinable(&self) -> bool {
        self.joinable.load(Ordering::Acquire)
    }

    /// Advance lifecycle state under the task lock
    pub(crate) fn set_state(&self, state: TaskState) {
        self.sync.lock().state = state;
    }

    /// Claim retirement; returns false if the task was already retired
    pub(crate) fn claim_release(&self) -> bool {
        let already = self.released.swap(true, Ordering::AcqRel);
        debug_assert!(!already, "task {:?} released twice", self.id);
        !already
    }

    /// Transfer the kernel handle out for destruction
    pub(crate) fn take_kernel_handle(&self) -> Option<KernelHandle> {
        self.kernel.lock().take()
    }

    /// Mark the task retired unless it already left through cancellation
    pub(crate) fn mark_retired(&self) {
        let mut sync = self.sync.lock();
        if sync.state != TaskState::Cancelled {
            sync.state = TaskState::Retired;
        }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}
