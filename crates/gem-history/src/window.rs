//! Window
//!
//! The part of the browser the history manager talks to: a session history
//! stack, the location, the document title and window events. Traversals
//! (`back`, `forward`, `go`) are queued and performed by [`Window::run_tasks`],
//! which fires `popstate` the way the user agent does.

use gem_core::{CustomEvent, EventTarget, GemError};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use url::Url;

/// One slot of the session history
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEntry {
    pub url: Url,
    pub title: String,
    pub state: Option<Value>,
}

#[derive(Debug)]
struct SessionHistory {
    entries: Vec<SessionEntry>,
    current: usize,
}

impl SessionHistory {
    fn new(url: Url) -> Self {
        Self {
            entries: vec![SessionEntry {
                url,
                title: String::new(),
                state: None,
            }],
            current: 0,
        }
    }

    fn push(&mut self, entry: SessionEntry) {
        self.entries.truncate(self.current + 1);
        self.entries.push(entry);
        self.current = self.entries.len() - 1;
    }

    fn replace(&mut self, entry: SessionEntry) {
        self.entries[self.current] = entry;
    }

    /// Move by `delta`, `None` when the target is out of range
    fn traverse(&mut self, delta: isize) -> Option<&SessionEntry> {
        let target = self.current.checked_add_signed(delta)?;
        if delta == 0 || target >= self.entries.len() {
            return None;
        }
        self.current = target;
        Some(&self.entries[target])
    }

    fn current(&self) -> &SessionEntry {
        &self.entries[self.current]
    }
}

/// Which native method was called
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeKind {
    Push,
    Replace,
}

/// Arguments of a `pushState`/`replaceState` call
#[derive(Debug, Clone, PartialEq)]
pub struct NativeCall {
    pub kind: NativeKind,
    pub state: Option<Value>,
    pub title: String,
    pub url: String,
}

/// Replacement for `pushState`/`replaceState`
pub type Interceptor = Rc<dyn Fn(NativeCall) -> Result<(), GemError>>;

/// Browser window handle
#[derive(Clone)]
pub struct Window {
    inner: Rc<WindowInner>,
}

struct WindowInner {
    session: RefCell<SessionHistory>,
    title: RefCell<String>,
    events: RefCell<EventTarget>,
    traversals: RefCell<VecDeque<isize>>,
    interceptor: RefCell<Option<Interceptor>>,
}

impl fmt::Debug for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let session = self.inner.session.borrow();
        f.debug_struct("Window")
            .field("url", &session.current().url.as_str())
            .field("length", &session.entries.len())
            .field("current", &session.current)
            .finish()
    }
}

impl Window {
    pub fn new(url: &str) -> Result<Self, GemError> {
        let url = Url::parse(url).map_err(|e| GemError::InvalidUrl(format!("{url}: {e}")))?;
        Ok(Self {
            inner: Rc::new(WindowInner {
                session: RefCell::new(SessionHistory::new(url)),
                title: RefCell::new(String::new()),
                events: RefCell::new(EventTarget::new()),
                traversals: RefCell::new(VecDeque::new()),
                interceptor: RefCell::new(None),
            }),
        })
    }

    // === Location ===

    pub fn location(&self) -> Url {
        self.inner.session.borrow().current().url.clone()
    }

    /// Percent-encoded path
    pub fn pathname(&self) -> String {
        self.inner.session.borrow().current().url.path().to_string()
    }

    /// `?query`, or empty
    pub fn search(&self) -> String {
        match self.inner.session.borrow().current().url.query() {
            Some(query) if !query.is_empty() => format!("?{query}"),
            _ => String::new(),
        }
    }

    /// `#fragment`, or empty
    pub fn hash(&self) -> String {
        match self.inner.session.borrow().current().url.fragment() {
            Some(fragment) if !fragment.is_empty() => format!("#{fragment}"),
            _ => String::new(),
        }
    }

    // === Document ===

    pub fn title(&self) -> String {
        self.inner.title.borrow().clone()
    }

    pub fn set_title(&self, title: &str) {
        *self.inner.title.borrow_mut() = title.to_string();
    }

    /// Window event target (`popstate`, `hashchange`)
    pub fn events(&self) -> EventTarget {
        self.inner.events.borrow().clone()
    }

    // === History ===

    pub fn history_state(&self) -> Option<Value> {
        self.inner.session.borrow().current().state.clone()
    }

    pub fn history_length(&self) -> usize {
        self.inner.session.borrow().entries.len()
    }

    /// `history.pushState`, routed through the interceptor when one is installed
    pub fn push_state(&self, state: Option<Value>, title: &str, url: &str) -> Result<(), GemError> {
        self.call(NativeKind::Push, state, title, url)
    }

    /// `history.replaceState`, routed through the interceptor when one is installed
    pub fn replace_state(&self, state: Option<Value>, title: &str, url: &str) -> Result<(), GemError> {
        self.call(NativeKind::Replace, state, title, url)
    }

    fn call(&self, kind: NativeKind, state: Option<Value>, title: &str, url: &str) -> Result<(), GemError> {
        let interceptor = self.inner.interceptor.borrow().clone();
        match interceptor {
            Some(interceptor) => interceptor(NativeCall {
                kind,
                state,
                title: title.to_string(),
                url: url.to_string(),
            }),
            None => self.native(kind, state, title, url),
        }
    }

    /// The user agent's own `pushState`/`replaceState`
    pub fn native(&self, kind: NativeKind, state: Option<Value>, title: &str, url: &str) -> Result<(), GemError> {
        let current = self.location();
        let url = current
            .join(url)
            .map_err(|e| GemError::InvalidUrl(format!("{url}: {e}")))?;
        if url.origin() != current.origin() {
            return Err(GemError::InvalidUrl(format!("{url}: cross-origin history entry")));
        }
        let entry = SessionEntry {
            url,
            title: title.to_string(),
            state,
        };
        let mut session = self.inner.session.borrow_mut();
        match kind {
            NativeKind::Push => session.push(entry),
            NativeKind::Replace => session.replace(entry),
        }
        Ok(())
    }

    pub fn set_interceptor(&self, interceptor: Interceptor) {
        *self.inner.interceptor.borrow_mut() = Some(interceptor);
    }

    /// Remove `interceptor` if it is still the installed one
    pub fn release_interceptor(&self, interceptor: &Interceptor) {
        let mut installed = self.inner.interceptor.borrow_mut();
        if installed
            .as_ref()
            .is_some_and(|current| std::ptr::addr_eq(Rc::as_ptr(current), Rc::as_ptr(interceptor)))
        {
            *installed = None;
        }
    }

    pub fn is_intercepted(&self) -> bool {
        self.inner.interceptor.borrow().is_some()
    }

    pub fn back(&self) {
        self.go(-1);
    }

    pub fn forward(&self) {
        self.go(1);
    }

    /// Queue a traversal, performed by the next [`Window::run_tasks`]
    pub fn go(&self, delta: isize) {
        self.inner.traversals.borrow_mut().push_back(delta);
    }

    pub fn pending_traversals(&self) -> usize {
        self.inner.traversals.borrow().len()
    }

    /// Perform queued traversals, including ones queued by `popstate`
    /// listeners, returns how many moved the session history
    pub fn run_tasks(&self) -> usize {
        let mut moved = 0;
        loop {
            let Some(delta) = self.inner.traversals.borrow_mut().pop_front() else {
                break;
            };
            let state = {
                let mut session = self.inner.session.borrow_mut();
                match session.traverse(delta) {
                    Some(entry) => entry.state.clone(),
                    None => continue,
                }
            };
            moved += 1;
            tracing::trace!(delta, url = %self.location(), "session history traversal");
            self.events().dispatch(&popstate(state));
        }
        moved
    }

    /// The user followed an in-page anchor to `hash`
    pub fn navigate_hash(&self, hash: &str) {
        let mut url = self.location();
        let fragment = hash.strip_prefix('#').unwrap_or(hash);
        url.set_fragment(Some(fragment));
        self.inner.session.borrow_mut().push(SessionEntry {
            url,
            title: self.title(),
            state: None,
        });
        let events = self.events();
        events.dispatch(&popstate(None));
        events.dispatch(&CustomEvent::new("hashchange").trusted());
    }

    /// Reload the page: session history and title survive, script state does not
    pub fn reload(&self) {
        *self.inner.events.borrow_mut() = EventTarget::new();
        *self.inner.interceptor.borrow_mut() = None;
        self.inner.traversals.borrow_mut().clear();
        tracing::debug!(url = %self.location(), "page reloaded");
    }
}

fn popstate(state: Option<Value>) -> CustomEvent {
    let event = CustomEvent::new("popstate").trusted();
    match state {
        Some(state) => event.with_detail(state),
        None => event,
    }
}
