//! Timer-driven events: schedule once, cancel maybe
//!
//! A timed event is an ordinary task whose trampoline waits out the delay
//! on the task's condvar before running the body. Cancellation follows one
//! discipline: set the flag under the task lock, signal, join the host
//! thread, then release. The join is what makes reclaiming the task safe
//! against a trampoline still waking up.

use crate::scheduler::SchedState;
use crate::task::{CancelOutcome, Task, TaskId};
use crate::trampoline::{self, ThreadSpec};
use crate::SchedResult;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

/// Handle to a pending timer event.
///
/// Retain it to be able to cancel; dropping it without cancelling lets the
/// timer fire normally.
pub struct EventHandle {
    task: Arc<Task>,
}

impl EventHandle {
    /// Identifier of the task backing this event
    pub fn task_id(&self) -> TaskId {
        self.task.id()
    }
}

impl std::fmt::Debug for EventHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandle")
            .field("task_id", &self.task.id())
            .finish()
    }
}

/// Schedule `body` to run once after `delay`.
///
/// Creates a timer task and starts its trampoline thread. If host thread
/// creation fails the just-created task is released and the error returned.
pub(crate) fn schedule(
    state: &Arc<SchedState>,
    delay: Duration,
    body: Box<dyn FnOnce() + Send>,
) -> SchedResult<EventHandle> {
    let task = state.registry.create(state.guest.as_ref(), "timer", false);

    let spec = ThreadSpec {
        body,
        delay: Some(delay),
    };
    if let Err(err) = trampoline::spawn(state, &task, spec) {
        state.registry.release(&task, state.guest.as_ref());
        return Err(err);
    }

    state.timers_scheduled.fetch_add(1, Ordering::Relaxed);
    Ok(EventHandle { task })
}

/// Cancel a pending timer event.
///
/// Idempotent against an event that already fired or was already
/// cancelled, and a no-op against one whose body is running; in both
/// cases the other side performs (or performed) retirement. Otherwise the
/// canceller joins the host thread before releasing the task, so the
/// trampoline is guaranteed gone before its state is reclaimed.
pub(crate) fn cancel(state: &Arc<SchedState>, handle: EventHandle) {
    let task = handle.task;

    match task.request_cancel() {
        CancelOutcome::AlreadyDone | CancelOutcome::Firing => return,
        CancelOutcome::Requested => {}
    }

    if let Some(thread) = task.take_thread() {
        let _ = thread.join();
        state.registry.release(&task, state.guest.as_ref());
        state.timers_cancelled.fetch_add(1, Ordering::Relaxed);
    }
    // No recorded thread: the trampoline retires itself once it observes
    // the flag
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_sdk::NoopGuestKernel;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Instant;

    fn started_state() -> Arc<SchedState> {
        let state = Arc::new(SchedState::new(Arc::new(NoopGuestKernel), 100));
        state.barrier.release_all();
        state
    }

    #[test]
    fn test_timer_fires_after_delay() {
        let state = started_state();
        let fired = Arc::new(AtomicUsize::new(0));

        let body = {
            let fired = fired.clone();
            Box::new(move || {
                fired.fetch_add(1, Ordering::SeqCst);
            })
        };
        let handle = schedule(&state, Duration::from_millis(50), body).unwrap();
        let id = handle.task_id();

        thread::sleep(Duration::from_millis(200));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(state.registry.find(id).is_none());
    }

    #[test]
    fn test_cancel_prevents_firing() {
        let state = started_state();
        let fired = Arc::new(AtomicUsize::new(0));

        let body = {
            let fired = fired.clone();
            Box::new(move || {
                fired.fetch_add(1, Ordering::SeqCst);
            })
        };
        let handle = schedule(&state, Duration::from_millis(500), body).unwrap();
        let id = handle.task_id();

        thread::sleep(Duration::from_millis(10));
        let start = Instant::now();
        cancel(&state, handle);
        // The join returns promptly because the trampoline short-circuits
        assert!(start.elapsed() < Duration::from_millis(400));

        thread::sleep(Duration::from_millis(600));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(state.registry.find(id).is_none());
    }

    #[test]
    fn test_cancel_after_fire_is_noop() {
        let state = started_state();
        let fired = Arc::new(AtomicUsize::new(0));

        let body = {
            let fired = fired.clone();
            Box::new(move || {
                fired.fetch_add(1, Ordering::SeqCst);
            })
        };
        let handle = schedule(&state, Duration::from_millis(20), body).unwrap();

        thread::sleep(Duration::from_millis(150));
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        cancel(&state, handle);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(state.registry.is_empty());
    }

    #[test]
    fn test_cancel_before_barrier_release() {
        // A timer scheduled before the scheduler starts parks at the
        // barrier; cancellation must still resolve once it opens
        let state = Arc::new(SchedState::new(Arc::new(NoopGuestKernel), 100));
        let fired = Arc::new(AtomicUsize::new(0));

        let body = {
            let fired = fired.clone();
            Box::new(move || {
                fired.fetch_add(1, Ordering::SeqCst);
            })
        };
        let handle = schedule(&state, Duration::from_millis(50), body).unwrap();

        let canceller = {
            let state = state.clone();
            thread::spawn(move || cancel(&state, handle))
        };
        thread::sleep(Duration::from_millis(20));
        state.barrier.release_all();

        canceller.join().unwrap();
        thread::sleep(Duration::from_millis(150));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(state.registry.is_empty());
    }

    #[test]
    fn test_wake_fires_timer_early() {
        let state = started_state();
        let fired = Arc::new(AtomicUsize::new(0));

        let body = {
            let fired = fired.clone();
            Box::new(move || {
                fired.fetch_add(1, Ordering::SeqCst);
            })
        };
        let handle = schedule(&state, Duration::from_secs(5), body).unwrap();
        let task = state.registry.find(handle.task_id()).unwrap();

        // Wait until the trampoline is parked in its timed wait
        let start = Instant::now();
        while !task.wake() {
            assert!(start.elapsed() < Duration::from_secs(2));
            thread::sleep(Duration::from_millis(5));
        }

        let start = Instant::now();
        while fired.load(Ordering::SeqCst) == 0 {
            assert!(start.elapsed() < Duration::from_secs(2));
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
