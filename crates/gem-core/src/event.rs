//! Events
//!
//! Minimal event target used for element emitters and window events
//! (`hashchange`, `popstate`, `beforechange`).

use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Dispatched event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomEvent {
    /// Event type, e.g. `hashchange`
    pub kind: String,
    pub detail: Option<serde_json::Value>,
    pub bubbles: bool,
    pub composed: bool,
    /// Produced by the user agent rather than by script
    pub trusted: bool,
}

impl CustomEvent {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            detail: None,
            bubbles: false,
            composed: false,
            trusted: false,
        }
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }

    /// Bubbling and crossing shadow boundaries
    pub fn global(mut self) -> Self {
        self.bubbles = true;
        self.composed = true;
        self
    }

    pub fn trusted(mut self) -> Self {
        self.trusted = true;
        self
    }
}

/// Listener handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Rc<dyn Fn(&CustomEvent)>;

/// Named event listeners
#[derive(Clone, Default)]
pub struct EventTarget {
    inner: Rc<EventTargetInner>,
}

#[derive(Default)]
struct EventTargetInner {
    listeners: RefCell<Vec<(ListenerId, String, Listener)>>,
    next_id: Cell<u64>,
}

impl fmt::Debug for EventTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventTarget")
            .field("listeners", &self.inner.listeners.borrow().len())
            .finish()
    }
}

impl EventTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, kind: &str, listener: impl Fn(&CustomEvent) + 'static) -> ListenerId {
        let id = ListenerId(self.inner.next_id.get());
        self.inner.next_id.set(id.0 + 1);
        self.inner
            .listeners
            .borrow_mut()
            .push((id, kind.to_string(), Rc::new(listener)));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(lid, _, _)| *lid != id);
        listeners.len() != before
    }

    /// Call every listener of `event.kind` synchronously, returns how many ran
    pub fn dispatch(&self, event: &CustomEvent) -> usize {
        // Listeners may add or remove listeners while running
        let matching: Vec<Listener> = self
            .inner
            .listeners
            .borrow()
            .iter()
            .filter(|(_, kind, _)| *kind == event.kind)
            .map(|(_, _, listener)| listener.clone())
            .collect();
        for listener in &matching {
            listener(event);
        }
        matching.len()
    }

    pub fn listener_count(&self, kind: &str) -> usize {
        self.inner
            .listeners
            .borrow()
            .iter()
            .filter(|(_, k, _)| k == kind)
            .count()
    }
}
