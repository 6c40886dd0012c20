//! Scheduler error types

/// Scheduling errors surfaced to the caller.
///
/// Only host-thread creation is recoverable; allocation exhaustion aborts
/// the process, and anything that would leave shared state inconsistent is
/// treated as a defect rather than an error value.
#[derive(Debug, thiserror::Error)]
pub enum SchedError {
    /// Creating the host thread for a task failed
    #[error("failed to spawn host thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),
}

/// Scheduling result
pub type SchedResult<T> = Result<T, SchedError>;
