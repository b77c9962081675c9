//! Microtask Scheduler
//!
//! Dedup'ing microtask queue with a LIFO side stack and a local executor
//! for fire-and-forget futures.

use crate::GemError;
use smol::LocalExecutor;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};

/// Result of a scheduled callback
pub type TaskResult = Result<(), GemError>;

/// Identity of a [`Callback`], the dedup key of every queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackId(usize);

/// Shared callback compared by identity
#[derive(Clone)]
pub struct Callback(Rc<dyn Fn() -> TaskResult>);

impl Callback {
    pub fn new(f: impl Fn() -> TaskResult + 'static) -> Self {
        Self(Rc::new(f))
    }

    /// Wrap an infallible closure
    pub fn from_fn(f: impl Fn() + 'static) -> Self {
        Self::new(move || {
            f();
            Ok(())
        })
    }

    pub fn call(&self) -> TaskResult {
        (self.0)()
    }

    pub fn id(&self) -> CallbackId {
        CallbackId(Rc::as_ptr(&self.0) as *const () as usize)
    }

    pub fn ptr_eq(&self, other: &Callback) -> bool {
        self.id() == other.id()
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Callback").field(&self.id()).finish()
    }
}

/// Outcome of one microtask checkpoint
#[derive(Debug, Default)]
pub struct Checkpoint {
    /// Callbacks invoked
    pub executed: usize,
    /// Errors that escaped a callback (already logged)
    pub errors: Vec<GemError>,
}

impl Checkpoint {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Single-threaded microtask scheduler
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<SchedulerInner>,
}

struct SchedulerInner {
    queue: RefCell<VecDeque<Callback>>,
    stack: RefCell<Vec<Callback>>,
    stack_flush: Callback,
    executor: LocalExecutor<'static>,
    draining: Cell<bool>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        let inner = Rc::new_cyclic(|weak: &Weak<SchedulerInner>| {
            let weak = weak.clone();
            SchedulerInner {
                queue: RefCell::new(VecDeque::new()),
                stack: RefCell::new(Vec::new()),
                stack_flush: Callback::new(move || match weak.upgrade() {
                    Some(inner) => inner.flush_stack(),
                    None => Ok(()),
                }),
                executor: LocalExecutor::new(),
                draining: Cell::new(false),
            }
        });
        Self { inner }
    }

    /// Queue `task` for the next checkpoint.
    ///
    /// A task that is already queued moves to the end of the queue, so it
    /// still runs exactly once.
    pub fn add_microtask(&self, task: Callback) {
        let mut queue = self.inner.queue.borrow_mut();
        if let Some(pos) = queue.iter().position(|t| t.ptr_eq(&task)) {
            queue.remove(pos);
        }
        queue.push_back(task);
    }

    /// Queue `task` on the stack flushed last-in-first-out as one microtask.
    ///
    /// Nested elements connect parent first; stacking their `mounted` hooks
    /// runs them child first.
    pub fn add_microtask_to_stack(&self, task: Callback) {
        let first = {
            let mut stack = self.inner.stack.borrow_mut();
            stack.push(task);
            stack.len() == 1
        };
        if first {
            self.add_microtask(self.inner.stack_flush.clone());
        }
    }

    /// Whether `task` is waiting for the next checkpoint
    pub fn is_queued(&self, task: &Callback) -> bool {
        self.inner.queue.borrow().iter().any(|t| t.ptr_eq(task))
    }

    pub fn pending(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    /// Spawn a detached future, polled at every checkpoint
    pub fn spawn_local(&self, future: impl Future<Output = ()> + 'static) {
        self.inner.executor.spawn(future).detach();
    }

    /// Drain the queue until nothing is left, including work queued by the
    /// callbacks themselves and by woken futures.
    pub fn run_microtasks(&self) -> Checkpoint {
        let mut checkpoint = Checkpoint::default();
        if self.inner.draining.replace(true) {
            // Re-entrant call from inside a callback, the outer drain picks it up
            return checkpoint;
        }

        loop {
            let next = self.inner.queue.borrow_mut().pop_front();
            match next {
                Some(task) => {
                    checkpoint.executed += 1;
                    if let Err(err) = task.call() {
                        tracing::error!("unhandled error in microtask: {}", err);
                        checkpoint.errors.push(err);
                    }
                }
                None => {
                    if !self.inner.executor.try_tick() {
                        break;
                    }
                }
            }
        }

        self.inner.draining.set(false);
        if checkpoint.executed > 0 {
            tracing::trace!(executed = checkpoint.executed, "microtask checkpoint");
        }
        checkpoint
    }
}

impl SchedulerInner {
    fn flush_stack(&self) -> TaskResult {
        let tasks = std::mem::take(&mut *self.stack.borrow_mut());
        let mut result = Ok(());
        for task in tasks.iter().rev() {
            if let Err(err) = task.call() {
                if result.is_ok() {
                    result = Err(err);
                } else {
                    tracing::error!("unhandled error in stacked microtask: {}", err);
                }
            }
        }
        result
    }
}
