//! Stores
//!
//! A store is a shared value plus an ordered set of listeners. Mutations go
//! through [`Store::update`]; listeners are never called synchronously but
//! queued on the scheduler, so a burst of updates is observed once.

use crate::{Callback, Scheduler};
use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

/// Store identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct StoreId(u64);

/// Handle returned by `connect`, drop it to keep the listener connected
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Disconnect the listener
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Observable shared value
pub struct Store<T> {
    inner: Rc<StoreInner<T>>,
}

struct StoreInner<T> {
    id: StoreId,
    value: RefCell<T>,
    listeners: RefCell<Vec<Callback>>,
    scheduler: Scheduler,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.inner.id)
            .field("value", &self.inner.value)
            .field("listeners", &self.inner.listeners.borrow().len())
            .finish()
    }
}

impl<T: 'static> Store<T> {
    pub fn new(scheduler: &Scheduler, value: T) -> Self {
        Self {
            inner: Rc::new(StoreInner {
                id: StoreId(NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed)),
                value: RefCell::new(value),
                listeners: RefCell::new(Vec::new()),
                scheduler: scheduler.clone(),
            }),
        }
    }

    pub fn id(&self) -> StoreId {
        self.inner.id
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.inner.value.borrow().clone()
    }

    pub fn borrow(&self) -> Ref<'_, T> {
        self.inner.value.borrow()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Mutate the value and notify listeners at the next checkpoint
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.inner.value.borrow_mut());
        self.notify();
    }

    /// Swap in a new value, returns the old one
    pub fn replace(&self, value: T) -> T {
        let old = self.inner.value.replace(value);
        self.notify();
        old
    }

    /// Notify listeners without changing the value
    pub fn refresh(&self) {
        self.notify();
    }

    /// Register `listener`; registering the same callback twice is a no-op
    pub fn connect(&self, listener: Callback) -> Subscription {
        {
            let mut listeners = self.inner.listeners.borrow_mut();
            if !listeners.iter().any(|l| l.ptr_eq(&listener)) {
                listeners.push(listener.clone());
            }
        }
        let weak: Weak<StoreInner<T>> = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.listeners.borrow_mut().retain(|l| !l.ptr_eq(&listener));
            }
        })
    }

    pub fn disconnect(&self, listener: &Callback) {
        self.inner
            .listeners
            .borrow_mut()
            .retain(|l| !l.ptr_eq(listener));
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    /// Type-erased handle for metadata tables
    pub fn erase(&self) -> Rc<dyn AnyStore> {
        Rc::new(self.clone())
    }

    fn notify(&self) {
        let listeners = self.inner.listeners.borrow().clone();
        for listener in listeners {
            self.inner.scheduler.add_microtask(listener);
        }
    }
}

/// Store with its value type erased
pub trait AnyStore {
    fn store_id(&self) -> StoreId;
    fn connect_listener(&self, listener: Callback) -> Subscription;
    fn disconnect_listener(&self, listener: &Callback);
    fn value_type(&self) -> &'static str;
}

impl<T: 'static> AnyStore for Store<T> {
    fn store_id(&self) -> StoreId {
        self.id()
    }

    fn connect_listener(&self, listener: Callback) -> Subscription {
        self.connect(listener)
    }

    fn disconnect_listener(&self, listener: &Callback) {
        self.disconnect(listener)
    }

    fn value_type(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}
