//! Gantry Engine - host-thread scheduling proxy
//!
//! This crate lets a guest kernel that only knows how to create logical
//! execution units, block them, wake them, and schedule timed callbacks run
//! its work on real host OS threads. It provides:
//! - Task lifecycle management (one host thread per task)
//! - The blocking wait/wake protocol
//! - Cancellable timer-driven events
//! - The startup barrier gating task execution
//! - The clock-tick thread advancing a virtual jiffies counter
//!
//! The guest kernel plugs in through the [`GuestKernel`] trait from
//! `gantry-sdk`; everything else is reached through the [`Scheduler`]
//! facade.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod barrier;
mod clock;
mod error;
mod registry;
mod scheduler;
mod task;
mod timer;
mod trampoline;

pub use barrier::StartBarrier;
pub use clock::{Clock, ClockTicker};
pub use error::{SchedError, SchedResult};
pub use registry::TaskRegistry;
pub use scheduler::{Scheduler, SchedulerOptions, SchedulerStats};
pub use task::{Task, TaskId, TaskState};
pub use timer::EventHandle;

// Re-export SDK types (canonical definitions live in gantry-sdk)
pub use gantry_sdk::{GuestKernel, KernelHandle, NoopGuestKernel};
