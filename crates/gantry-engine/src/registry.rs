//! Registry of live tasks
//!
//! Owns the set of live tasks, allocates identifiers, and supports lookup
//! by id or by "the task running on the calling thread". All registry
//! mutation is serialized by a single lock; lookups are linear scans over
//! an insertion-ordered list, which is fine for the small task counts this
//! proxy is built for.

use crate::task::{Task, TaskId};
use gantry_sdk::GuestKernel;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::sync::Arc;

thread_local! {
    /// The task bound to this host thread, if the proxy created it
    static CURRENT_TASK: RefCell<Option<Arc<Task>>> = const { RefCell::new(None) };
}

/// Bind a task to the calling thread
pub(crate) fn bind_current(task: &Arc<Task>) {
    CURRENT_TASK.with(|current| *current.borrow_mut() = Some(Arc::clone(task)));
}

/// Clear the calling thread's task binding
pub(crate) fn unbind_current() {
    CURRENT_TASK.with(|current| *current.borrow_mut() = None);
}

/// Owns the set of live tasks
pub struct TaskRegistry {
    tasks: Mutex<Vec<Arc<Task>>>,
    init_task: OnceCell<Arc<Task>>,
}

impl TaskRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(Vec::new()),
            init_task: OnceCell::new(),
        }
    }

    /// Create and register a new task.
    ///
    /// Allocates an identifier, asks the guest kernel for its matching
    /// handle, and appends the task to the live list.
    pub fn create(&self, guest: &dyn GuestKernel, name: &str, client: bool) -> Arc<Task> {
        let id = TaskId::new();
        let kernel = guest.create_task(id.as_u64(), name);
        let task = Arc::new(Task::new(id, name, client, kernel));
        self.tasks.lock().push(Arc::clone(&task));
        task
    }

    /// Retire a task: unregister it and destroy its kernel handle.
    ///
    /// Exactly once per task; a second call is a defect and is ignored
    /// after a debug assertion. Never exits the calling thread; the
    /// trampoline alone decides when its thread returns.
    pub fn release(&self, task: &Arc<Task>, guest: &dyn GuestKernel) {
        if !task.claim_release() {
            return;
        }

        let mut tasks = self.tasks.lock();
        if let Some(pos) = tasks.iter().position(|t| t.id() == task.id()) {
            tasks.remove(pos);
        }
        drop(tasks);

        task.mark_retired();
        if let Some(handle) = task.take_kernel_handle() {
            guest.destroy_task(handle);
        }
    }

    /// Look up a live task by id.
    ///
    /// `None` for a stale id is a normal outcome, not an error.
    pub fn find(&self, id: TaskId) -> Option<Arc<Task>> {
        self.tasks.lock().iter().find(|t| t.id() == id).cloned()
    }

    /// The task bound to the calling thread.
    ///
    /// A thread the proxy did not create (e.g. the process main thread) is
    /// lazily bound to a shared "init" client task, created at most once
    /// per registry even when two unbound threads race here.
    pub fn current(&self, guest: &dyn GuestKernel) -> Arc<Task> {
        if let Some(task) = CURRENT_TASK.with(|current| current.borrow().clone()) {
            return task;
        }
        let init = self
            .init_task
            .get_or_init(|| self.create(guest, "init", true));
        let task = Arc::clone(init);
        bind_current(&task);
        task
    }

    /// Number of live tasks
    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Whether the registry holds no live tasks
    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskState;
    use gantry_sdk::NoopGuestKernel;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn test_create_registers_task() {
        let registry = TaskRegistry::new();
        let task = registry.create(&NoopGuestKernel, "task", false);

        assert_eq!(registry.len(), 1);
        assert_eq!(task.state(), TaskState::Created);
        assert!(registry.find(task.id()).is_some());
    }

    #[test]
    fn test_ids_unique_across_create_release() {
        let registry = TaskRegistry::new();
        let mut seen = HashSet::new();

        for _ in 0..10 {
            let task = registry.create(&NoopGuestKernel, "task", false);
            assert!(seen.insert(task.id()));
            registry.release(&task, &NoopGuestKernel);
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_release_removes_task() {
        let registry = TaskRegistry::new();
        let task = registry.create(&NoopGuestKernel, "task", false);
        let id = task.id();

        registry.release(&task, &NoopGuestKernel);

        assert!(registry.find(id).is_none());
        assert_eq!(task.state(), TaskState::Retired);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_find_stale_id_is_none() {
        let registry = TaskRegistry::new();
        assert!(registry.find(TaskId::from_u64(u64::MAX)).is_none());
    }

    #[test]
    fn test_current_binds_init_task() {
        let registry = TaskRegistry::new();
        let first = registry.current(&NoopGuestKernel);
        let second = registry.current(&NoopGuestKernel);

        assert_eq!(first.id(), second.id());
        assert_eq!(first.name(), "init");
        assert!(first.is_client());
        unbind_current();
    }

    #[test]
    fn test_current_init_task_created_once_under_race() {
        let registry = Arc::new(TaskRegistry::new());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                thread::spawn(move || registry.current(&NoopGuestKernel).id())
            })
            .collect();

        let ids: HashSet<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(ids.len(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_kernel_handle_destroyed_on_release() {
        use gantry_sdk::{GuestKernel, KernelHandle};
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct CountingKernel {
            created: AtomicUsize,
            destroyed: AtomicUsize,
        }

        impl GuestKernel for CountingKernel {
            fn create_task(&self, _id: u64, _name: &str) -> KernelHandle {
                self.created.fetch_add(1, Ordering::SeqCst);
                KernelHandle::empty()
            }

            fn destroy_task(&self, handle: KernelHandle) {
                self.destroyed.fetch_add(1, Ordering::SeqCst);
                drop(handle);
            }
        }

        let kernel = CountingKernel {
            created: AtomicUsize::new(0),
            destroyed: AtomicUsize::new(0),
        };
        let registry = TaskRegistry::new();

        let task = registry.create(&kernel, "task", false);
        assert_eq!(kernel.created.load(Ordering::SeqCst), 1);
        assert_eq!(kernel.destroyed.load(Ordering::SeqCst), 0);

        registry.release(&task, &kernel);
        assert_eq!(kernel.destroyed.load(Ordering::SeqCst), 1);
    }
}
