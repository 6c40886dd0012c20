//! Opaque per-task kernel state

use std::any::Any;
use std::fmt;

/// Opaque per-task state owned by the guest kernel.
///
/// A `KernelHandle` is created by [`GuestKernel::create_task`] together with
/// the scheduler-side task and travels with it until retirement, when it is
/// handed back to [`GuestKernel::destroy_task`] exactly once. The scheduler
/// never interprets its contents; kernel code recovers its own type through
/// the downcast accessors.
///
/// Ownership is single-sourced: the handle is moved into the task at
/// creation and moved out at retirement, so whichever side retires the task
/// destroys the handle, and nothing else can.
///
/// [`GuestKernel::create_task`]: crate::GuestKernel::create_task
/// [`GuestKernel::destroy_task`]: crate::GuestKernel::destroy_task
pub struct KernelHandle {
    inner: Box<dyn Any + Send>,
}

impl KernelHandle {
    /// Wrap a kernel-side value in an opaque handle
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self {
            inner: Box::new(value),
        }
    }

    /// A handle carrying no state, for kernels that need none per task
    pub fn empty() -> Self {
        Self::new(())
    }

    /// Borrow the wrapped value, if it is a `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref()
    }

    /// Mutably borrow the wrapped value, if it is a `T`
    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.inner.downcast_mut()
    }

    /// Recover the wrapped value, or give the handle back on type mismatch
    pub fn downcast<T: Any>(self) -> Result<Box<T>, Self> {
        self.inner
            .downcast()
            .map_err(|inner| Self { inner })
    }
}

impl fmt::Debug for KernelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelHandle").finish_non_exhaustive()
    }
}
