//! Gem History
//!
//! Session history with open/close/should-close handlers per entry, so a
//! stack of modal dialogs can live in the browser history and follow the
//! back and forward buttons.
//!
//! # Example
//! ```rust
//! use gem_history::{HistoryConfig, HistoryManager, UpdateParams, Window};
//! use gem_core::Scheduler;
//!
//! let window = Window::new("https://example.com/").unwrap();
//! let scheduler = Scheduler::new();
//! let history = HistoryManager::install(&window, &scheduler, HistoryConfig::default()).unwrap();
//!
//! history.push(UpdateParams::new().path("/settings").title("Settings")).unwrap();
//! assert_eq!(window.pathname(), "/settings");
//!
//! history.back();
//! window.run_tasks();
//! assert_eq!(window.pathname(), "/");
//! ```

mod config;
mod manager;
mod path;
mod query;
mod window;

pub use config::HistoryConfig;
pub use gem_core::GemError;
pub use manager::{
    Handler, HistoryManager, HistoryParams, HistoryState, Predicate, RESERVED_KEYS, TitleState,
    UpdateParams,
};
pub use path::{apply_base_path, decode, normalize_base_path, resolve_path, strip_base_path};
pub use query::QueryString;
pub use window::{Interceptor, NativeCall, NativeKind, SessionEntry, Window};
