//! Gem Core
//!
//! Shared primitives for the Gem element runtime and history manager.
//!
//! Everything here is single-threaded and driven by the microtask
//! checkpoint: stores, element updates and stylesheet recomputation are
//! queued on a [`Scheduler`] and observed together when
//! [`Scheduler::run_microtasks`] drains the queue.
//!
//! # Example
//! ```rust
//! use gem_core::{Callback, Scheduler, Store};
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let scheduler = Scheduler::new();
//! let store = Store::new(&scheduler, 1);
//! let seen = Rc::new(Cell::new(0));
//! let listener = {
//!     let (store, seen) = (store.clone(), seen.clone());
//!     Callback::from_fn(move || seen.set(store.get()))
//! };
//! let _subscription = store.connect(listener);
//!
//! store.update(|value| *value = 2);
//! store.update(|value| *value = 3);
//! assert_eq!(seen.get(), 0);
//!
//! scheduler.run_microtasks();
//! assert_eq!(seen.get(), 3);
//! ```

mod case;
mod config;
mod deps;
mod error;
mod event;
mod frame;
mod scheduler;
mod store;

pub use case::{camel_to_kebab_case, kebab_to_camel_case};
pub use config::RuntimeConfig;
pub use deps::{Dep, deps_changed};
pub use error::GemError;
pub use event::{CustomEvent, EventTarget, ListenerId};
pub use frame::{FrameQueue, FrameReport};
pub use scheduler::{Callback, CallbackId, Checkpoint, Scheduler, TaskResult};
pub use store::{AnyStore, Store, StoreId, Subscription};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build a dependency tuple for `effect`/`memo`.
///
/// ```rust
/// use gem_core::{Dep, deps};
/// assert_eq!(deps![1, "a", true], vec![Dep::Int(1), Dep::from("a"), Dep::Bool(true)]);
/// ```
#[macro_export]
macro_rules! deps {
    ($($value:expr),* $(,)?) => {
        vec![$($crate::Dep::from($value)),*]
    };
}
