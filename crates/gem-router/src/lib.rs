//! Gem Router
//!
//! Path patterns, route tables and the `<gem-route>` element, which renders
//! whichever route matches the current history entry.
//!
//! # Example
//! ```rust
//! use gem_router::{Params, create_path, match_path};
//!
//! let params = match_path("/users/:id", "/users/42").unwrap().unwrap();
//! assert_eq!(params["id"], "42");
//!
//! let mut params = Params::new();
//! params.insert("id".into(), "7".into());
//! assert_eq!(create_path("/users/:id", &params), "/users/7");
//! ```

mod pattern;
mod route;
mod table;

pub use gem_core::GemError;
pub use pattern::{Params, PathPattern, create_path, match_path};
pub use route::{LIGHT_ROUTE_TAG, ROUTE_TAG, Route};
pub use table::{DEFAULT_PATTERN, RouteItem, RouteMatch, RouteTable};
