//! Class Metadata
//!
//! Declarations made on an element class: reflected attributes, plain
//! properties, custom states, events, parts, slots, stylesheets, stores
//! and class options.
//!
//! Tables are shared with the parent class until the first declaration on
//! the subclass, which copies the table (`Rc::make_mut`), so a subclass can
//! never alter what its ancestor declared.

use crate::dom::{ShadowRootInit, StyleSheet};
use gem_core::{AnyStore, StoreId, camel_to_kebab_case};
use serde::Serialize;
use std::cell::OnceCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// How an attribute string maps to a field value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttrKind {
    /// Missing attribute reads as the default, or `""`
    String,
    /// Presence means `true`
    Boolean,
    /// Parsed as `f64`, missing reads as the default, or `0`
    Number,
}

/// Reflected attribute declaration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttrDecl {
    pub field: String,
    pub attr: String,
    pub kind: AttrKind,
    pub default: Option<String>,
}

/// Event declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventDecl {
    pub field: String,
    pub event: String,
    /// Bubbles and crosses shadow roots
    pub global: bool,
}

/// Field mapped to a kebab-case name (custom state, part, slot)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedDecl {
    pub field: String,
    pub name: String,
}

/// What a field resolves to on an instance
#[derive(Debug, Clone, PartialEq)]
pub enum Accessor {
    Attribute(AttrDecl),
    Property,
    State(String),
    Part(String),
    Slot(String),
    Emitter(EventDecl),
}

/// Per-class declaration tables
#[derive(Clone, Default)]
pub struct Metadata {
    pub(crate) attributes: Rc<Vec<AttrDecl>>,
    pub(crate) properties: Rc<Vec<String>>,
    pub(crate) events: Rc<Vec<EventDecl>>,
    pub(crate) states: Rc<Vec<NamedDecl>>,
    pub(crate) parts: Rc<Vec<NamedDecl>>,
    pub(crate) slots: Rc<Vec<NamedDecl>>,
    pub(crate) style_sheets: Rc<Vec<StyleSheet>>,
    pub(crate) stores: Rc<Vec<Rc<dyn AnyStore>>>,
    pub(crate) hmr_methods: Rc<Vec<(String, String)>>,
    pub(crate) shadow: Option<ShadowRootInit>,
    pub(crate) aria_role: Option<String>,
    pub(crate) non_blocking: bool,
    pub(crate) root_element: Option<String>,
}

impl fmt::Debug for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metadata")
            .field("attributes", &self.attributes)
            .field("properties", &self.properties)
            .field("events", &self.events)
            .field("stores", &self.store_ids())
            .field("shadow", &self.shadow)
            .finish()
    }
}

/// Serializable view of [`Metadata`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataSnapshot {
    pub observed_attributes: Vec<String>,
    pub observed_properties: Vec<String>,
    pub defined_events: Vec<String>,
    pub defined_css_states: Vec<String>,
    pub defined_parts: Vec<String>,
    pub defined_slots: Vec<String>,
    pub observed_stores: Vec<StoreId>,
    pub adopted_style_sheets: Vec<StyleSheet>,
    pub shadow: Option<ShadowRootInit>,
    pub aria_role: Option<String>,
    pub non_blocking: bool,
    pub root_element: Option<String>,
}

impl Metadata {
    pub fn attributes(&self) -> &[AttrDecl] {
        &self.attributes
    }

    pub fn observed_attributes(&self) -> Vec<String> {
        self.attributes.iter().map(|a| a.attr.clone()).collect()
    }

    pub fn properties(&self) -> &[String] {
        &self.properties
    }

    pub fn events(&self) -> &[EventDecl] {
        &self.events
    }

    pub fn style_sheets(&self) -> &[StyleSheet] {
        &self.style_sheets
    }

    pub fn stores(&self) -> &[Rc<dyn AnyStore>] {
        &self.stores
    }

    pub fn store_ids(&self) -> Vec<StoreId> {
        self.stores.iter().map(|s| s.store_id()).collect()
    }

    pub fn shadow(&self) -> Option<ShadowRootInit> {
        self.shadow
    }

    pub fn aria_role(&self) -> Option<&str> {
        self.aria_role.as_deref()
    }

    pub fn is_non_blocking(&self) -> bool {
        self.non_blocking
    }

    pub fn root_element(&self) -> Option<&str> {
        self.root_element.as_deref()
    }

    pub fn snapshot(&self) -> MetadataSnapshot {
        let names = |table: &[NamedDecl]| table.iter().map(|d| d.name.clone()).collect();
        MetadataSnapshot {
            observed_attributes: self.observed_attributes(),
            observed_properties: self.properties.to_vec(),
            defined_events: self.events.iter().map(|e| e.event.clone()).collect(),
            defined_css_states: names(&self.states),
            defined_parts: names(&self.parts),
            defined_slots: names(&self.slots),
            observed_stores: self.store_ids(),
            adopted_style_sheets: self.style_sheets.to_vec(),
            shadow: self.shadow,
            aria_role: self.aria_role.clone(),
            non_blocking: self.non_blocking,
            root_element: self.root_element.clone(),
        }
    }

    /// Shape that must match for a class to be patched in place
    pub(crate) fn same_structure(&self, other: &Metadata) -> bool {
        self.shadow == other.shadow
            && self.aria_role == other.aria_role
            && self.store_ids() == other.store_ids()
            && self.hmr_methods == other.hmr_methods
    }
}

/// Insert or override the entry matching `same`
fn declare<T: Clone>(table: &mut Rc<Vec<T>>, item: T, same: impl Fn(&T) -> bool) {
    let table = Rc::make_mut(table);
    match table.iter_mut().find(|existing| same(existing)) {
        Some(existing) => *existing = item,
        None => table.push(item),
    }
}

/// Element class: a name, its metadata and the accessors derived from it
pub struct ElementClass {
    name: String,
    parent: Option<Rc<ElementClass>>,
    metadata: Metadata,
    accessors: OnceCell<HashMap<String, Accessor>>,
}

impl fmt::Debug for ElementClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementClass")
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|p| p.name.clone()))
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl ElementClass {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Rc<ElementClass>> {
        self.parent.as_ref()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Accessor table, built on first use
    pub fn accessors(&self) -> &HashMap<String, Accessor> {
        self.accessors.get_or_init(|| {
            tracing::trace!(class = %self.name, "installing accessors");
            let m = &self.metadata;
            let mut map = HashMap::new();
            for prop in m.properties.iter() {
                map.insert(prop.clone(), Accessor::Property);
            }
            for attr in m.attributes.iter() {
                map.insert(attr.field.clone(), Accessor::Attribute(attr.clone()));
            }
            for state in m.states.iter() {
                map.insert(state.field.clone(), Accessor::State(state.name.clone()));
            }
            for part in m.parts.iter() {
                map.insert(part.field.clone(), Accessor::Part(part.name.clone()));
            }
            for slot in m.slots.iter() {
                map.insert(slot.field.clone(), Accessor::Slot(slot.name.clone()));
            }
            for event in m.events.iter() {
                map.insert(event.field.clone(), Accessor::Emitter(event.clone()));
            }
            map
        })
    }

    pub fn accessors_installed(&self) -> bool {
        self.accessors.get().is_some()
    }

    pub fn accessor(&self, field: &str) -> Option<&Accessor> {
        self.accessors().get(field)
    }

    /// Attribute declaration by attribute name
    pub fn attribute_by_name(&self, attr: &str) -> Option<&AttrDecl> {
        self.metadata.attributes.iter().find(|a| a.attr == attr)
    }
}

/// Builds an [`ElementClass`] one declaration at a time
#[derive(Debug)]
pub struct ClassBuilder {
    name: String,
    parent: Option<Rc<ElementClass>>,
    metadata: Metadata,
}

impl ClassBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            metadata: Metadata {
                shadow: Some(ShadowRootInit::default()),
                ..Metadata::default()
            },
        }
    }

    /// Subclass of `parent`, sharing its tables until they are changed
    pub fn extends(name: impl Into<String>, parent: &Rc<ElementClass>) -> Self {
        Self {
            name: name.into(),
            parent: Some(parent.clone()),
            metadata: parent.metadata.clone(),
        }
    }

    fn attr(mut self, field: &str, kind: AttrKind, default: Option<String>) -> Self {
        let decl = AttrDecl {
            field: field.to_string(),
            attr: camel_to_kebab_case(field),
            kind,
            default,
        };
        declare(&mut self.metadata.attributes, decl, |a| a.field == field);
        self
    }

    /// String attribute
    pub fn attribute(self, field: &str) -> Self {
        self.attr(field, AttrKind::String, None)
    }

    pub fn attribute_with_default(self, field: &str, default: impl Into<String>) -> Self {
        self.attr(field, AttrKind::String, Some(default.into()))
    }

    pub fn bool_attribute(self, field: &str) -> Self {
        self.attr(field, AttrKind::Boolean, None)
    }

    pub fn num_attribute(self, field: &str) -> Self {
        self.attr(field, AttrKind::Number, None)
    }

    pub fn num_attribute_with_default(self, field: &str, default: f64) -> Self {
        self.attr(field, AttrKind::Number, Some(default.to_string()))
    }

    pub fn property(mut self, field: &str) -> Self {
        declare(&mut self.metadata.properties, field.to_string(), |p| p == field);
        self
    }

    fn named(table: &mut Rc<Vec<NamedDecl>>, field: &str, name: Option<&str>) {
        let decl = NamedDecl {
            field: field.to_string(),
            name: name.map_or_else(|| camel_to_kebab_case(field), str::to_string),
        };
        declare(table, decl, |d| d.field == field);
    }

    /// Custom CSS state, matched like a pseudo-class
    pub fn state(mut self, field: &str) -> Self {
        Self::named(&mut self.metadata.states, field, None);
        self
    }

    pub fn part(mut self, field: &str) -> Self {
        Self::named(&mut self.metadata.parts, field, None);
        self
    }

    pub fn part_named(mut self, field: &str, name: &str) -> Self {
        Self::named(&mut self.metadata.parts, field, Some(name));
        self
    }

    pub fn slot(mut self, field: &str) -> Self {
        Self::named(&mut self.metadata.slots, field, None);
        self
    }

    fn event(mut self, field: &str, global: bool) -> Self {
        let decl = EventDecl {
            field: field.to_string(),
            event: camel_to_kebab_case(field),
            global,
        };
        declare(&mut self.metadata.events, decl, |e| e.field == field);
        self
    }

    pub fn emitter(self, field: &str) -> Self {
        self.event(field, false)
    }

    pub fn global_emitter(self, field: &str) -> Self {
        self.event(field, true)
    }

    pub fn adopted_style(mut self, sheet: &StyleSheet) -> Self {
        declare(&mut self.metadata.style_sheets, sheet.clone(), |s| s == sheet);
        self
    }

    pub fn connect_store(mut self, store: Rc<dyn AnyStore>) -> Self {
        let id = store.store_id();
        declare(&mut self.metadata.stores, store, |s| s.store_id() == id);
        self
    }

    /// Render into a shadow root (the default)
    pub fn shadow(mut self, init: ShadowRootInit) -> Self {
        self.metadata.shadow = Some(init);
        self
    }

    /// Render into light DOM
    pub fn light(mut self) -> Self {
        self.metadata.shadow = None;
        self
    }

    pub fn aria_role(mut self, role: impl Into<String>) -> Self {
        self.metadata.aria_role = Some(role.into());
        self
    }

    /// Connect through the frame queue instead of synchronously
    pub fn non_blocking(mut self) -> Self {
        self.metadata.non_blocking = true;
        self
    }

    /// Only allow the element inside the shadow root of `tag`
    pub fn root_element(mut self, tag: impl Into<String>) -> Self {
        self.metadata.root_element = Some(tag.into());
        self
    }

    /// Record a method signature checked by hot reload
    pub fn hmr_method(mut self, name: &str, signature: &str) -> Self {
        let entry = (name.to_string(), signature.to_string());
        declare(&mut self.metadata.hmr_methods, entry, |(n, _)| n == name);
        self
    }

    pub fn build(self) -> Rc<ElementClass> {
        Rc::new(ElementClass {
            name: self.name,
            parent: self.parent,
            metadata: self.metadata,
            accessors: OnceCell::new(),
        })
    }
}
