//! GuestKernel trait - the collaborator the scheduler calls back into

use crate::handle::KernelHandle;

/// Callbacks the scheduling proxy makes into the guest kernel.
///
/// The proxy owns task lifecycle; the guest kernel owns whatever per-task
/// state it wants to associate with each logical execution unit. When the
/// proxy creates a task it asks the kernel for a matching [`KernelHandle`],
/// and when the task retires it hands the handle back for destruction.
///
/// `create_task` is infallible: the only way it can fail is allocation
/// exhaustion, which aborts the process.
pub trait GuestKernel: Send + Sync {
    /// Create the kernel-side state for a newly created task.
    ///
    /// - `id`: the task's process-unique identifier
    /// - `name`: the task's descriptive label (not unique)
    fn create_task(&self, id: u64, name: &str) -> KernelHandle;

    /// Destroy the kernel-side state of a retired task.
    ///
    /// Called exactly once per task, by whichever side performs retirement.
    fn destroy_task(&self, handle: KernelHandle);
}

/// A guest kernel that keeps no per-task state
pub struct NoopGuestKernel;

impl GuestKernel for NoopGuestKernel {
    fn create_task(&self, _id: u64, _name: &str) -> KernelHandle {
        KernelHandle::empty()
    }

    fn destroy_task(&self, handle: KernelHandle) {
        drop(handle);
    }
}
