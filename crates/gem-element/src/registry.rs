//! Custom Element Registry
//!
//! Maps tag names to element classes and tracks live instances so a
//! redefinition can patch them in place.

use crate::metadata::ElementClass;
use gem_core::GemError;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

/// Result of [`Registry::define`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefineOutcome {
    /// First definition of the tag
    Defined,
    /// Same class defined again, nothing to do
    Unchanged,
    /// New class swapped in and this many live instances re-rendered
    Patched(usize),
    /// Shape changed, the page has to reload
    ReloadRequired,
}

/// Live element reachable from the registry
pub(crate) trait LiveElement {
    fn reload_class(&self);
}

/// Class currently defined for a tag, shared by its instances
pub(crate) struct ClassSlot {
    class: RefCell<Rc<ElementClass>>,
}

impl ClassSlot {
    pub(crate) fn get(&self) -> Rc<ElementClass> {
        self.class.borrow().clone()
    }
}

struct Definition {
    slot: Rc<ClassSlot>,
    instances: Vec<Weak<dyn LiveElement>>,
}

/// Custom element registry
#[derive(Clone, Default)]
pub struct Registry {
    definitions: Rc<RefCell<HashMap<String, Definition>>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<String> = self.definitions.borrow().keys().cloned().collect();
        tags.sort();
        f.debug_struct("Registry").field("tags", &tags).finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define `tag`, or hot-swap the class of an existing definition.
    pub fn define(&self, tag: &str, class: Rc<ElementClass>) -> Result<DefineOutcome, GemError> {
        if !Self::is_valid_name(tag) {
            return Err(GemError::InvalidElementName(tag.to_string()));
        }

        let live: Vec<Rc<dyn LiveElement>> = {
            let mut definitions = self.definitions.borrow_mut();
            let Some(definition) = definitions.get_mut(tag) else {
                definitions.insert(
                    tag.to_string(),
                    Definition {
                        slot: Rc::new(ClassSlot {
                            class: RefCell::new(class),
                        }),
                        instances: Vec::new(),
                    },
                );
                tracing::debug!(tag, "defined custom element");
                return Ok(DefineOutcome::Defined);
            };

            let current = definition.slot.get();
            if Rc::ptr_eq(&current, &class) {
                return Ok(DefineOutcome::Unchanged);
            }
            if !current.metadata().same_structure(class.metadata()) {
                tracing::warn!(tag, "element structure changed, reload required");
                return Ok(DefineOutcome::ReloadRequired);
            }

            *definition.slot.class.borrow_mut() = class;
            definition.instances.retain(|weak| weak.strong_count() > 0);
            definition.instances.iter().filter_map(Weak::upgrade).collect()
        };

        for element in &live {
            element.reload_class();
        }
        tracing::info!(tag, instances = live.len(), "hot-patched element class");
        Ok(DefineOutcome::Patched(live.len()))
    }

    pub fn get(&self, tag: &str) -> Option<Rc<ElementClass>> {
        self.definitions.borrow().get(tag).map(|d| d.slot.get())
    }

    pub fn is_defined(&self, tag: &str) -> bool {
        self.definitions.borrow().contains_key(tag)
    }

    pub(crate) fn slot(&self, tag: &str) -> Option<Rc<ClassSlot>> {
        self.definitions.borrow().get(tag).map(|d| d.slot.clone())
    }

    pub(crate) fn track(&self, tag: &str, element: Weak<dyn LiveElement>) {
        if let Some(definition) = self.definitions.borrow_mut().get_mut(tag) {
            definition.instances.retain(|weak| weak.strong_count() > 0);
            definition.instances.push(element);
        }
    }

    /// Live instances of `tag`
    pub fn instance_count(&self, tag: &str) -> usize {
        self.definitions.borrow().get(tag).map_or(0, |d| {
            d.instances.iter().filter(|weak| weak.strong_count() > 0).count()
        })
    }

    /// Validate a custom element name
    pub fn is_valid_name(name: &str) -> bool {
        if !name.contains('-') {
            return false;
        }
        if !name.chars().next().is_some_and(|c| c.is_ascii_lowercase()) {
            return false;
        }
        const RESERVED: &[&str] = &[
            "annotation-xml",
            "color-profile",
            "font-face",
            "font-face-src",
            "font-face-uri",
            "font-face-format",
            "font-face-name",
            "missing-glyph",
        ];
        if RESERVED.contains(&name) {
            return false;
        }
        name.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.'))
    }
}
