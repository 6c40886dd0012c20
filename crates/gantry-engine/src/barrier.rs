//! One-shot startup gate for task execution
//!
//! No task body may run before the scheduler signals "go". Every trampoline
//! and the clock ticker wait here first; scheduler initialization releases
//! them all exactly once.

use parking_lot::{Condvar, Mutex};

/// One-shot gate preventing task execution before scheduler readiness
pub struct StartBarrier {
    go: Mutex<bool>,
    cond: Condvar,
}

impl StartBarrier {
    /// Create a closed barrier
    pub fn new() -> Self {
        Self {
            go: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Block until tasks are allowed to run.
    ///
    /// Re-checks the go flag on every wake to tolerate spurious wakeups.
    pub fn wait_until_go(&self) {
        let mut go = self.go.lock();
        while !*go {
            self.cond.wait(&mut go);
        }
    }

    /// Allow tasks to run and release every blocked waiter.
    ///
    /// Idempotent: calls after the first are no-ops.
    pub fn release_all(&self) {
        let mut go = self.go.lock();
        if !*go {
            *go = true;
            self.cond.notify_all();
        }
    }

    /// Whether the barrier has been released
    pub fn is_released(&self) -> bool {
        *self.go.lock()
    }
}

impl Default for StartBarrier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_barrier_starts_closed() {
        let barrier = StartBarrier::new();
        assert!(!barrier.is_released());
    }

    #[test]
    fn test_release_is_idempotent() {
        let barrier = StartBarrier::new();
        barrier.release_all();
        barrier.release_all();
        assert!(barrier.is_released());
    }

    #[test]
    fn test_wait_after_release_returns_immediately() {
        let barrier = StartBarrier::new();
        barrier.release_all();
        barrier.wait_until_go();
    }

    #[test]
    fn test_release_unblocks_all_waiters() {
        let barrier = Arc::new(StartBarrier::new());
        let passed = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let barrier = barrier.clone();
                let passed = passed.clone();
                thread::spawn(move || {
                    barrier.wait_until_go();
                    passed.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        assert_eq!(passed.load(Ordering::SeqCst), 0);

        barrier.release_all();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(passed.load(Ordering::SeqCst), 4);
    }
}
