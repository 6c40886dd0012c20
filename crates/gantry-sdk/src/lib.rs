//! Gantry SDK - Guest-kernel collaborator interface
//!
//! This crate provides the minimal types and traits a guest kernel needs to
//! embed the gantry scheduling proxy without depending on the full
//! gantry-engine: the [`GuestKernel`] trait the engine calls back into when
//! tasks are created and retired, and the opaque [`KernelHandle`] carrying
//! the kernel's per-task state.
//!
//! # Example
//!
//! ```ignore
//! use gantry_sdk::{GuestKernel, KernelHandle};
//!
//! struct LwpTable;
//!
//! impl GuestKernel for LwpTable {
//!     fn create_task(&self, id: u64, name: &str) -> KernelHandle {
//!         KernelHandle::new(Lwp::new(id, name))
//!     }
//!
//!     fn destroy_task(&self, handle: KernelHandle) {
//!         drop(handle);
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod handle;
mod kernel;

pub use handle::KernelHandle;
pub use kernel::{GuestKernel, NoopGuestKernel};
