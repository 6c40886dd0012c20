//! Host-thread entry routine for every task
//!
//! Every thread the proxy creates runs the same body: wait at the start
//! barrier, bind the task to the thread, wait out a timer delay if one was
//! given, run the task's function, retire. Retirement happens by returning
//! from the closure; no library call ever terminates a thread it does not
//! own.

use crate::registry::{bind_current, unbind_current};
use crate::scheduler::SchedState;
use crate::task::{Task, TaskState, TimedWaitOutcome};
use crate::SchedResult;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Spawn descriptor: what the task thread should run and how
pub(crate) struct ThreadSpec {
    /// The task's function; the original's function/argument pair folded
    /// into one closure
    pub body: Box<dyn FnOnce() + Send>,

    /// Relative delay for timer tasks; `None` runs the body immediately
    /// after the barrier opens
    pub delay: Option<Duration>,
}

/// Start the host thread for `task`.
///
/// The join handle is recorded on the task before this returns, so any
/// handle the caller hands out afterwards refers to a joinable task. On
/// spawn failure the caller tears the task down.
pub(crate) fn spawn(state: &Arc<SchedState>, task: &Arc<Task>, spec: ThreadSpec) -> SchedResult<()> {
    let thread_state = Arc::clone(state);
    let thread_task = Arc::clone(task);

    let handle = thread::Builder::new()
        .name(format!("gantry-{}-{}", task.name(), task.id().as_u64()))
        .spawn(move || run(thread_state, thread_task, spec))?;

    task.record_thread(handle);
    Ok(())
}

/// The trampoline body
fn run(state: Arc<SchedState>, task: Arc<Task>, spec: ThreadSpec) {
    // Don't allow task bodies to run before the scheduler says go
    task.set_state(TaskState::BarrierWait);
    state.barrier.wait_until_go();

    bind_current(&task);

    if let Some(delay) = spec.delay {
        if task.timed_wait(delay) == TimedWaitOutcome::Cancelled {
            // Whoever can join performs retirement; an unjoinable task is
            // ours to retire
            if !task.is_joinable() {
                state.registry.release(&task, state.guest.as_ref());
            }
            state.clock.refresh();
            unbind_current();
            return;
        }
    } else {
        task.set_state(TaskState::Running);
    }

    (spec.body)();

    state.registry.release(&task, state.guest.as_ref());
    state.clock.refresh();
    unbind_current();
}
