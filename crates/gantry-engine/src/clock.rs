//! Virtual clock: the jiffies counter and the tick thread
//!
//! One background thread advances a monotonic jiffies counter at a fixed
//! rate. The thread waits on the start barrier like any task trampoline,
//! then sleeps to absolute tick deadlines so drift does not accumulate.
//! Jiffies are recomputed from the epoch rather than incremented, so any
//! thread can refresh the counter after a wait without double counting.

use crate::barrier::StartBarrier;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Monotonic virtual time counter
pub struct Clock {
    /// Ticks per second
    hz: u32,

    /// Current jiffies value
    jiffies: AtomicU64,

    /// When the ticker started counting; unset until the scheduler starts
    epoch: OnceCell<Instant>,
}

impl Clock {
    /// Create a clock ticking `hz` times per second
    pub fn new(hz: u32) -> Self {
        assert!(hz > 0, "clock rate must be non-zero");
        Self {
            hz,
            jiffies: AtomicU64::new(0),
            epoch: OnceCell::new(),
        }
    }

    /// Ticks per second
    pub fn hz(&self) -> u32 {
        self.hz
    }

    /// Interval between ticks
    pub fn tick_interval(&self) -> Duration {
        Duration::from_nanos(NANOS_PER_SEC / u64::from(self.hz))
    }

    /// Read the current jiffies value
    pub fn jiffies(&self) -> u64 {
        self.jiffies.load(Ordering::Acquire)
    }

    /// Pin the epoch to now; first call wins
    pub(crate) fn start_epoch(&self) {
        let _ = self.epoch.set(Instant::now());
    }

    /// Recompute jiffies from elapsed time and publish the new value.
    ///
    /// Monotonic under concurrent refreshes; a no-op before the ticker has
    /// pinned the epoch.
    pub fn refresh(&self) -> u64 {
        let Some(epoch) = self.epoch.get() else {
            return self.jiffies();
        };
        let ticks = (epoch.elapsed().as_nanos() / u128::from(NANOS_PER_SEC / u64::from(self.hz)))
            as u64;
        self.jiffies.fetch_max(ticks, Ordering::AcqRel);
        self.jiffies()
    }
}

/// Background thread advancing the clock
///
/// Started once at scheduler initialization; in normal operation it runs
/// for the process lifetime. `stop` exists so embedders and tests can tear
/// a scheduler down without leaking the thread.
pub struct ClockTicker {
    clock: Arc<Clock>,
    barrier: Arc<StartBarrier>,
    shutdown: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ClockTicker {
    /// Create a ticker for `clock`, gated on `barrier`
    pub fn new(clock: Arc<Clock>, barrier: Arc<StartBarrier>) -> Arc<Self> {
        Arc::new(Self {
            clock,
            barrier,
            shutdown: AtomicBool::new(false),
            handle: Mutex::new(None),
        })
    }

    /// Start the tick thread
    pub fn start(self: &Arc<Self>) {
        let ticker = Arc::clone(self);

        let handle = thread::Builder::new()
            .name("gantry-clock".to_string())
            .spawn(move || {
                ticker.run_loop();
            })
            .expect("Failed to spawn clock thread");

        *self.handle.lock() = Some(handle);
    }

    /// Stop the tick thread
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);

        if let Some(handle) = self.handle.lock().take() {
            let start = Instant::now();
            let timeout = Duration::from_secs(2);
            loop {
                if handle.is_finished() {
                    let _ = handle.join();
                    return;
                }
                if start.elapsed() > timeout {
                    // Still blocked on the barrier; leave it detached
                    drop(handle);
                    return;
                }
                thread::sleep(Duration::from_millis(5));
            }
        }
    }

    /// Tick thread main loop
    fn run_loop(&self) {
        // Like every trampoline: nothing runs before the scheduler says go
        self.barrier.wait_until_go();
        self.clock.start_epoch();

        let tick = self.clock.tick_interval();
        let mut next = Instant::now() + tick;

        loop {
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }

            self.clock.refresh();

            // Sleep to the absolute deadline so drift does not accumulate
            let now = Instant::now();
            if next > now {
                thread::sleep(next - now);
            }
            next += tick;
        }

        #[cfg(debug_assertions)]
        eprintln!("Clock ticker shutting down");
    }
}

impl Drop for ClockTicker {
    fn drop(&mut self) {
        self.stop();
    }
}
