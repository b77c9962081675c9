//! Gem Element
//!
//! Reactive custom elements: declarative attributes and properties,
//! dependency-tracked effects, batched rendering and stylesheets shared
//! across shadow roots.
//!
//! # Example
//! ```rust
//! use gem_element::{ClassBuilder, Component, Element, GemError, Runtime, Template};
//!
//! struct Greeting;
//!
//! impl Component for Greeting {
//!     fn render(&self, el: &Element<Self>) -> Result<Template, GemError> {
//!         Ok(Template::new(format!("Hello {}", el.attr("name")?)))
//!     }
//! }
//!
//! let runtime = Runtime::default();
//! let class = ClassBuilder::new("Greeting").attribute("name").build();
//! runtime.registry().define("x-greeting", class).unwrap();
//!
//! let el = Element::create(&runtime, "x-greeting", Greeting).unwrap();
//! el.set_attr("name", "gem").unwrap();
//! el.connect(runtime.document()).unwrap();
//! runtime.run_microtasks();
//! assert_eq!(el.rendered().unwrap().as_str(), "Hello gem");
//! ```

mod dom;
mod element;
mod metadata;
mod registry;
mod runtime;
mod stylesheet;

pub use dom::{RootId, RootNode, ShadowRootInit, ShadowRootMode, StyleSheet, Template};
pub use element::{Cleanup, Component, EffectId, Element, Hook, Lifecycle};
pub use gem_core::{Dep, GemError, RuntimeConfig, deps};
pub use metadata::{
    Accessor, AttrDecl, AttrKind, ClassBuilder, ElementClass, EventDecl, Metadata,
    MetadataSnapshot, NamedDecl,
};
pub use registry::{DefineOutcome, Registry};
pub use runtime::Runtime;
pub use stylesheet::{StyleDisposer, StyleRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
