//! History Manager
//!
//! Wraps the window's session history. Every entry the manager creates
//! carries a monotonic `$key`; a side table keyed by it holds the rich
//! parameters (title, path, query, hash) and the open/close handlers that
//! cannot be serialized into the entry state. After a reload the side table
//! is rebuilt from the URL with the handlers missing.

use crate::config::HistoryConfig;
use crate::path::{apply_base_path, decode, normalize_base_path, resolve_path, strip_base_path};
use crate::query::QueryString;
use crate::window::{Interceptor, NativeCall, NativeKind, Window};
use gem_core::{Callback, CustomEvent, EventTarget, GemError, ListenerId, Scheduler, Store, Subscription};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

/// Keys the manager owns in the entry state
pub const RESERVED_KEYS: [&str; 4] = [
    "$key",
    "$hasCloseHandle",
    "$hasOpenHandle",
    "$hasShouldCloseHandle",
];

/// Restored keys further ahead of the local clock than this are not trusted
const MAX_KEY_SKEW_MS: u64 = 24 * 60 * 60 * 1000;

/// Open or close handler
pub type Handler = Rc<dyn Fn()>;

/// Should-close predicate, `false` vetoes the back navigation
pub type Predicate = Rc<dyn Fn() -> bool>;

/// Serialized state of an entry, as stored in the session history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryState {
    #[serde(rename = "$key", default)]
    pub key: String,
    #[serde(rename = "$hasCloseHandle", default)]
    pub has_close_handle: bool,
    #[serde(rename = "$hasOpenHandle", default)]
    pub has_open_handle: bool,
    #[serde(rename = "$hasShouldCloseHandle", default)]
    pub has_should_close_handle: bool,
    #[serde(rename = "$title", default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// User data
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

/// Arguments of `push`/`replace`, unset fields inherit from the current entry
#[derive(Clone, Default)]
pub struct UpdateParams {
    pub title: Option<String>,
    /// Internal path, absolute or relative to the current one
    pub path: Option<String>,
    pub query: Option<QueryString>,
    /// Includes the `#`
    pub hash: Option<String>,
    /// Runs when the forward button re-enters the entry
    pub open: Option<Handler>,
    /// Runs when the back button leaves the entry
    pub close: Option<Handler>,
    pub should_close: Option<Predicate>,
    /// JSON object merged into the entry state
    pub data: Option<Value>,
}

impl UpdateParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn query(mut self, query: impl Into<QueryString>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    pub fn open(mut self, open: impl Fn() + 'static) -> Self {
        self.open = Some(Rc::new(open));
        self
    }

    pub fn close(mut self, close: impl Fn() + 'static) -> Self {
        self.close = Some(Rc::new(close));
        self
    }

    pub fn should_close(mut self, should_close: impl Fn() -> bool + 'static) -> Self {
        self.should_close = Some(Rc::new(should_close));
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    fn has_handles(&self) -> bool {
        self.open.is_some() || self.close.is_some() || self.should_close.is_some()
    }
}

impl fmt::Debug for UpdateParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateParams")
            .field("title", &self.title)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("hash", &self.hash)
            .field("open", &self.open.is_some())
            .field("close", &self.close.is_some())
            .field("should_close", &self.should_close.is_some())
            .field("data", &self.data)
            .finish()
    }
}

/// Parameters of an entry after normalization
#[derive(Clone, Default)]
pub struct HistoryParams {
    pub title: String,
    /// Internal path, without the base path
    pub path: String,
    pub query: QueryString,
    /// Percent-decoded, includes the `#`
    pub hash: String,
    pub open: Option<Handler>,
    pub close: Option<Handler>,
    pub should_close: Option<Predicate>,
    pub data: Option<Value>,
}

impl fmt::Debug for HistoryParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistoryParams")
            .field("title", &self.title)
            .field("path", &self.path)
            .field("query", &self.query.to_string())
            .field("hash", &self.hash)
            .field("open", &self.open.is_some())
            .field("close", &self.close.is_some())
            .field("should_close", &self.should_close.is_some())
            .finish()
    }
}

/// Title shared with title-rendering elements
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TitleState {
    pub default_title: String,
    pub title: String,
}

impl TitleState {
    /// What the document shows
    pub fn display(&self) -> &str {
        if self.title.is_empty() {
            &self.default_title
        } else {
            &self.title
        }
    }
}

/// Re-entrancy guard for traversals the manager issues itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Navigating {
    Idle,
    /// Counter-navigation after a veto, ignore its popstate
    Veto,
    /// Extra back over a handler-less modal, apply its popstate without handlers
    Skip,
}

#[derive(Default)]
struct Hooks {
    interceptor: Option<Interceptor>,
    listeners: Vec<ListenerId>,
    subscriptions: Vec<Subscription>,
}

/// History manager handle
#[derive(Clone)]
pub struct HistoryManager {
    inner: Rc<ManagerInner>,
}

struct ManagerInner {
    window: Window,
    store: Store<HistoryState>,
    base_path: Store<String>,
    titles: Store<TitleState>,
    params: RefCell<HashMap<String, HistoryParams>>,
    events: EventTarget,
    navigating: Cell<Navigating>,
    last_key: Cell<u64>,
    hooks: RefCell<Hooks>,
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        let hooks = std::mem::take(self.hooks.get_mut());
        if let Some(interceptor) = &hooks.interceptor {
            self.window.release_interceptor(interceptor);
        }
        let events = self.window.events();
        for id in hooks.listeners {
            events.remove_listener(id);
        }
        for subscription in hooks.subscriptions {
            subscription.unsubscribe();
        }
    }
}

impl fmt::Debug for HistoryManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistoryManager")
            .field("current_key", &self.current_key())
            .field("base_path", &self.base_path())
            .field("entries", &self.inner.params.borrow().len())
            .finish()
    }
}

impl HistoryManager {
    /// Take over `window`'s history: intercept native calls, listen for
    /// `popstate`/`hashchange` and adopt the current entry
    pub fn install(window: &Window, scheduler: &Scheduler, config: HistoryConfig) -> Result<Self, GemError> {
        let default_title = config.default_title.unwrap_or_else(|| window.title());
        let manager = Self {
            inner: Rc::new(ManagerInner {
                window: window.clone(),
                store: Store::new(scheduler, HistoryState::default()),
                base_path: Store::new(scheduler, normalize_base_path(&config.base_path)),
                titles: Store::new(
                    scheduler,
                    TitleState {
                        default_title,
                        title: String::new(),
                    },
                ),
                params: RefCell::new(HashMap::new()),
                events: EventTarget::new(),
                navigating: Cell::new(Navigating::Idle),
                last_key: Cell::new(0),
                hooks: RefCell::new(Hooks::default()),
            }),
        };
        manager.attach();
        manager.restore()?;
        tracing::info!(
            url = %window.location(),
            base_path = %manager.base_path(),
            key = %manager.current_key(),
            "history manager installed"
        );
        Ok(manager)
    }

    fn attach(&self) {
        let weak = Rc::downgrade(&self.inner);
        let window = &self.inner.window;

        let interceptor: Interceptor = Rc::new({
            let weak = weak.clone();
            move |call: NativeCall| match upgrade(&weak) {
                Some(manager) => manager.update_by_native(call),
                None => Ok(()),
            }
        });
        window.set_interceptor(interceptor.clone());

        let events = window.events();
        let hashchange = events.add_listener("hashchange", {
            let weak = weak.clone();
            move |event: &CustomEvent| {
                // Synthetic events come from the manager itself
                if !event.trusted {
                    return;
                }
                let Some(manager) = upgrade(&weak) else { return };
                let hash = manager.inner.window.hash();
                if let Err(err) = manager.replace(UpdateParams::new().hash(hash)) {
                    tracing::error!(%err, "failed to record in-page navigation");
                }
            }
        });
        let popstate = events.add_listener("popstate", {
            let weak = weak.clone();
            move |event: &CustomEvent| {
                if let Some(manager) = upgrade(&weak) {
                    manager.on_popstate(event.detail.clone());
                }
            }
        });

        let on_title = Callback::from_fn({
            let weak = weak.clone();
            move || {
                if let Some(manager) = upgrade(&weak) {
                    manager.title_changed();
                }
            }
        });
        let on_entry = Callback::from_fn(move || {
            if let Some(manager) = upgrade(&weak) {
                manager.entry_changed();
            }
        });

        let mut hooks = self.inner.hooks.borrow_mut();
        hooks.interceptor = Some(interceptor);
        hooks.listeners = vec![hashchange, popstate];
        hooks.subscriptions = vec![
            self.inner.titles.connect(on_title),
            self.inner.store.connect(on_entry),
        ];
    }

    /// Adopt the entry the window is showing
    fn restore(&self) -> Result<(), GemError> {
        let window = &self.inner.window;
        let Some(existing) = window.history_state().filter(|state| !state.is_null()) else {
            if window.location().scheme().starts_with("http") {
                let path = self.internal_path(&window.pathname());
                self.replace(
                    UpdateParams::new()
                        .path(path)
                        .query(window.search())
                        .hash(window.hash()),
                )?;
            }
            return Ok(());
        };

        let mut trusted = true;
        if let Some(key) = existing.get("$key").and_then(Value::as_str) {
            let key = parse_key(key);
            if key.is_finite() && key > 0.0 && key <= (now_ms() + MAX_KEY_SKEW_MS) as f64 {
                self.inner.last_key.set(self.inner.last_key.get().max(key as u64));
            } else {
                tracing::warn!(key, "restored history key out of range, issuing a new one");
                trusted = false;
            }
        }
        let base = HistoryState {
            key: self.next_key(),
            ..HistoryState::default()
        };
        let mut state = match compose_state(base.clone(), existing.as_object()) {
            Ok(state) => state,
            Err(err) => {
                tracing::warn!(%err, "unreadable history state, starting a fresh entry");
                base.clone()
            }
        };
        if !trusted {
            state.key = base.key;
            let url = window.location().to_string();
            window.native(NativeKind::Replace, Some(encode_state(&state)?), &window.title(), &url)?;
        }

        if state.has_close_handle {
            // The close handler died with the previous page, leave the entry
            let params = self.normalize(UpdateParams::new().title(window.title()))?;
            self.inner.params.borrow_mut().insert(state.key.clone(), params);
            self.inner.store.replace(state);
            tracing::debug!("reloaded on an entry with a close handle, going back");
            self.back();
        } else {
            let params = self.normalize(
                UpdateParams::new()
                    .title(window.title())
                    .hash(window.hash()),
            )?;
            self.inner.params.borrow_mut().insert(state.key.clone(), params);
            self.inner.store.replace(state);
        }
        Ok(())
    }

    // === Accessors ===

    /// Current entry state, observed by routes
    pub fn store(&self) -> &Store<HistoryState> {
        &self.inner.store
    }

    pub fn base_path_store(&self) -> &Store<String> {
        &self.inner.base_path
    }

    pub fn title_store(&self) -> &Store<TitleState> {
        &self.inner.titles
    }

    /// Receives `beforechange` before every entry change
    pub fn events(&self) -> &EventTarget {
        &self.inner.events
    }

    pub fn window(&self) -> &Window {
        &self.inner.window
    }

    pub fn current_key(&self) -> String {
        self.inner.store.with(|state| state.key.clone())
    }

    pub fn base_path(&self) -> String {
        self.inner.base_path.get()
    }

    /// Parameters of the current entry
    pub fn params(&self) -> Option<HistoryParams> {
        self.inner.params.borrow().get(&self.current_key()).cloned()
    }

    /// Merge into the current entry's parameters and notify
    pub fn update_params(&self, update: UpdateParams) {
        let key = self.current_key();
        if let Some(params) = self.inner.params.borrow_mut().get_mut(&key) {
            if let Some(title) = update.title {
                params.title = title;
            }
            if let Some(path) = update.path {
                params.path = path;
            }
            if let Some(query) = update.query {
                params.query = query;
            }
            if let Some(hash) = update.hash {
                params.hash = hash;
            }
            if update.open.is_some() {
                params.open = update.open;
            }
            if update.close.is_some() {
                params.close = update.close;
            }
            if update.should_close.is_some() {
                params.should_close = update.should_close;
            }
            if update.data.is_some() {
                params.data = update.data;
            }
        }
        self.inner.store.refresh();
    }

    /// Change the base path; the current entry's path is recomputed from the URL bar
    pub fn set_base_path(&self, base_path: &str) {
        self.inner.base_path.replace(normalize_base_path(base_path));
        let path = self.internal_path(&self.inner.window.pathname());
        let key = self.current_key();
        if let Some(params) = self.inner.params.borrow_mut().get_mut(&key) {
            params.path = path;
        }
    }

    // === Navigation ===

    pub fn push(&self, params: UpdateParams) -> Result<(), GemError> {
        self.update_history(params, NativeKind::Push)
    }

    pub fn replace(&self, params: UpdateParams) -> Result<(), GemError> {
        self.update_history(params, NativeKind::Replace)
    }

    /// Leaving a modal entry replaces it instead of stacking a new one
    pub fn push_ignore_close_handle(&self, params: UpdateParams) -> Result<(), GemError> {
        if self.inner.store.with(|state| state.has_close_handle) {
            let close = self.params().and_then(|current| current.close);
            if let Some(close) = close {
                close();
            }
            self.replace(params)
        } else {
            self.push(params)
        }
    }

    pub fn back(&self) {
        self.inner.window.back();
    }

    pub fn forward(&self) {
        self.inner.window.forward();
    }

    // === Internals ===

    fn internal_path(&self, url_path: &str) -> String {
        strip_base_path(&self.base_path(), url_path)
    }

    fn next_key(&self) -> String {
        let key = now_ms().max(self.inner.last_key.get().saturating_add(1));
        self.inner.last_key.set(key);
        key.to_string()
    }

    fn validate_data(&self, data: Option<&Map<String, Value>>) -> Result<(), GemError> {
        let Some(data) = data else { return Ok(()) };
        let current = self.current_key();
        // Passing the current state back in is allowed
        if data.get("$key").and_then(Value::as_str) == Some(current.as_str()) {
            return Ok(());
        }
        for name in RESERVED_KEYS {
            if data.get(name).is_some_and(truthy) {
                return Err(GemError::ReservedKey(name.to_string()));
            }
        }
        Ok(())
    }

    fn normalize(&self, params: UpdateParams) -> Result<HistoryParams, GemError> {
        let window = &self.inner.window;
        let location_path = self.internal_path(&window.pathname());
        let (current_path, current_query) = match self.params() {
            Some(current) => (current.path, current.query),
            None => (location_path.clone(), QueryString::new()),
        };

        let explicit_path = params.path.as_deref().filter(|path| !path.is_empty());
        let path = match explicit_path {
            Some(relative) => resolve_path(&current_path, relative)?,
            None => location_path,
        };

        let next_query = match &params.query {
            Some(query) => query.clone(),
            None if explicit_path.is_some() => QueryString::new(),
            None => QueryString::parse(&window.search()),
        };
        let query_changed = next_query.to_string() != current_query.to_string();
        let query = if query_changed { next_query } else { current_query };
        let url_changed = path != current_path || query_changed;

        let title = match params.title.as_deref().filter(|title| !title.is_empty()) {
            Some(title) => title.to_string(),
            None if url_changed => String::new(),
            None => window.title(),
        };

        let status_changed = params.has_handles() || params.data.is_some();
        let hash = match &params.hash {
            Some(hash) => decode(hash),
            None if !url_changed && status_changed => decode(&window.hash()),
            None => String::new(),
        };

        Ok(HistoryParams {
            title,
            path,
            query,
            hash,
            open: params.open,
            close: params.close,
            should_close: params.should_close,
            data: params.data,
        })
    }

    fn update_history(&self, update: UpdateParams, kind: NativeKind) -> Result<(), GemError> {
        let data = data_object(update.data.as_ref())?.cloned();
        self.validate_data(data.as_ref())?;
        let params = self.normalize(update)?;

        let base = HistoryState {
            key: self.next_key(),
            has_close_handle: params.close.is_some(),
            has_open_handle: params.open.is_some(),
            has_should_close_handle: params.should_close.is_some(),
            title: Some(params.title.clone()),
            data: Map::new(),
        };
        let state = compose_state(base, data.as_ref())?;
        let encoded = encode_state(&state)?;
        let url = format!(
            "{}{}{}",
            apply_base_path(&self.base_path(), &params.path),
            params.query,
            params.hash
        );
        let title = params.title.clone();
        let hash = params.hash.clone();

        tracing::info!(?kind, %url, key = %state.key, "history update");
        self.commit(state, params);

        let window = &self.inner.window;
        let previous_hash = decode(&window.hash());
        window.native(kind, Some(encoded), &title, &url)?;
        if previous_hash != hash {
            window.events().dispatch(&CustomEvent::new("hashchange"));
        }
        Ok(())
    }

    /// `pushState`/`replaceState` from code that does not know the manager
    fn update_by_native(&self, call: NativeCall) -> Result<(), GemError> {
        let data = data_object(call.state.as_ref())?.cloned();
        self.validate_data(data.as_ref())?;

        let window = &self.inner.window;
        let resolved = window
            .location()
            .join(&call.url)
            .map_err(|e| GemError::InvalidUrl(format!("{}: {e}", call.url)))?;
        if resolved.origin() != window.location().origin() {
            return Err(GemError::InvalidUrl(format!("{resolved}: cross-origin history entry")));
        }
        let pathname = resolved.path().to_string();
        let hash = match resolved.fragment() {
            Some(fragment) if !fragment.is_empty() => format!("#{fragment}"),
            _ => String::new(),
        };

        let params = self.normalize(UpdateParams {
            title: Some(call.title.clone()),
            path: Some(pathname.clone()),
            query: Some(QueryString::parse(resolved.query().unwrap_or_default())),
            hash: Some(hash.clone()),
            data: data.clone().map(Value::Object),
            ..UpdateParams::default()
        })?;
        let base = HistoryState {
            key: self.next_key(),
            title: Some(call.title.clone()),
            ..HistoryState::default()
        };
        let state = compose_state(base, data.as_ref())?;
        let encoded = encode_state(&state)?;
        // Nested apps see paths without the base path
        let url = format!(
            "{}{}{}",
            apply_base_path(&self.base_path(), &pathname),
            params.query,
            hash
        );

        tracing::info!(kind = ?call.kind, %url, key = %state.key, "intercepted native history call");
        self.commit(state, params);

        let previous_hash = window.hash();
        window.native(call.kind, Some(encoded), &call.title, &url)?;
        if previous_hash != hash {
            window.events().dispatch(&CustomEvent::new("hashchange"));
        }
        Ok(())
    }

    fn commit(&self, state: HistoryState, params: HistoryParams) {
        self.inner.params.borrow_mut().insert(state.key.clone(), params);
        self.apply(state);
    }

    fn apply(&self, state: HistoryState) {
        self.inner.events.dispatch(&CustomEvent::new("beforechange"));
        self.inner.store.replace(state);
    }

    fn on_popstate(&self, detail: Option<Value>) {
        let Some(next) = detail
            .and_then(|state| serde_json::from_value::<HistoryState>(state).ok())
            .filter(|state| !state.key.is_empty())
        else {
            tracing::debug!("popstate without a history key, ignored");
            return;
        };

        match self.inner.navigating.replace(Navigating::Idle) {
            Navigating::Veto => return,
            Navigating::Skip => {
                self.reconstruct(&next);
                self.apply(next);
                return;
            }
            Navigating::Idle => {}
        }

        self.reconstruct(&next);
        let previous = self.inner.store.get();
        let is_forward = parse_key(&next.key) > parse_key(&previous.key);

        if is_forward && next.has_open_handle {
            let open = self.handlers(&next.key).0;
            if let Some(open) = open {
                open();
            }
        } else if !is_forward && previous.has_close_handle {
            let (_, close, should_close) = self.handlers(&previous.key);
            if should_close.is_some_and(|should_close| !should_close()) {
                tracing::warn!(key = %previous.key, "close vetoed, restoring history position");
                self.inner.navigating.set(Navigating::Veto);
                self.forward();
                return;
            }
            match close {
                Some(close) => close(),
                None if next.has_close_handle => {
                    tracing::debug!(key = %next.key, "skipping entry without a live close handler");
                    self.inner.navigating.set(Navigating::Skip);
                    self.back();
                }
                None => {}
            }
        }

        tracing::info!(key = %next.key, forward = is_forward, "history traversal");
        self.apply(next);
    }

    /// Rebuild parameters for an entry created by an earlier page or a nested app
    fn reconstruct(&self, state: &HistoryState) {
        if self.inner.params.borrow().contains_key(&state.key) {
            return;
        }
        let window = &self.inner.window;
        let current_title = self.inner.titles.with(|titles| titles.title.clone());
        let title = if current_title.is_empty() {
            state.title.clone().unwrap_or_default()
        } else {
            current_title
        };
        let params = HistoryParams {
            title,
            path: self.internal_path(&window.pathname()),
            query: QueryString::parse(&window.search()),
            hash: decode(&window.hash()),
            data: serde_json::to_value(state).ok(),
            ..HistoryParams::default()
        };
        self.inner.params.borrow_mut().insert(state.key.clone(), params);
    }

    fn handlers(&self, key: &str) -> (Option<Handler>, Option<Handler>, Option<Predicate>) {
        self.inner
            .params
            .borrow()
            .get(key)
            .map(|params| (params.open.clone(), params.close.clone(), params.should_close.clone()))
            .unwrap_or_default()
    }

    fn entry_changed(&self) {
        let Some(title) = self.params().map(|params| params.title) else {
            return;
        };
        if self.inner.titles.with(|titles| titles.title != title) {
            self.inner.titles.update(|titles| titles.title = title);
        }
    }

    fn title_changed(&self) {
        let (title, display) = self
            .inner
            .titles
            .with(|titles| (titles.title.clone(), titles.display().to_string()));
        let key = self.current_key();
        if let Some(params) = self.inner.params.borrow_mut().get_mut(&key) {
            params.title = title;
        }
        self.inner.window.set_title(&display);
    }
}

fn upgrade(weak: &Weak<ManagerInner>) -> Option<HistoryManager> {
    weak.upgrade().map(|inner| HistoryManager { inner })
}

/// Numeric prefix of a key, keys are compared as numbers
fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

fn parse_key(key: &str) -> f64 {
    let end = key
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(key.len());
    key[..end].parse().unwrap_or(f64::NAN)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn data_object(data: Option<&Value>) -> Result<Option<&Map<String, Value>>, GemError> {
    match data {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(other) => Err(GemError::InvalidState(format!("expected an object, got {other}"))),
    }
}

/// `base` with `data` spread over it
fn compose_state(base: HistoryState, data: Option<&Map<String, Value>>) -> Result<HistoryState, GemError> {
    let Some(data) = data else { return Ok(base) };
    let Value::Object(mut object) = encode_state(&base)? else {
        return Err(GemError::InvalidState("state is not an object".into()));
    };
    object.extend(data.iter().map(|(k, v)| (k.clone(), v.clone())));
    serde_json::from_value(Value::Object(object)).map_err(|e| GemError::InvalidState(e.to_string()))
}

fn encode_state(state: &HistoryState) -> Result<Value, GemError> {
    serde_json::to_value(state).map_err(|e| GemError::InvalidState(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn install(url: &str) -> (Window, Scheduler, HistoryManager) {
        let window = Window::new(url).unwrap();
        let scheduler = Scheduler::new();
        let manager = HistoryManager::install(&window, &scheduler, HistoryConfig::default()).unwrap();
        (window, scheduler, manager)
    }

    #[test]
    fn test_install_replaces_initial_entry() {
        let (window, _, manager) = install("https://example.com/a?x=1#top");
        assert_eq!(window.history_length(), 1);
        let state = window.history_state().unwrap();
        assert_eq!(state["$key"], json!(manager.current_key()));
        assert_eq!(state["$hasCloseHandle"], json!(false));

        let params = manager.params().unwrap();
        assert_eq!(params.path, "/a");
        assert_eq!(params.query.to_string(), "?x=1");
        assert_eq!(params.hash, "#top");
    }

    #[test]
    fn test_non_http_location_is_left_alone() {
        let (window, _, manager) = install("data:text/plain,hello");
        assert_eq!(window.history_state(), None);
        assert_eq!(manager.current_key(), "");
        assert!(manager.params().is_none());
    }

    #[test]
    fn test_keys_are_monotonic() {
        let (_, _, manager) = install("https://example.com/");
        let first = manager.current_key();
        manager.push(UpdateParams::new().path("/a")).unwrap();
        let second = manager.current_key();
        assert!(parse_key(&second) > parse_key(&first));
    }

    #[test]
    fn test_parse_key() {
        assert_eq!(parse_key("1700000000000"), 1_700_000_000_000.0);
        assert_eq!(parse_key("12.5-3"), 12.5);
        assert!(parse_key("").is_nan());
    }

    #[test]
    fn test_query_inherits_only_without_path() {
        let (_, _, manager) = install("https://example.com/list?page=2");
        manager.push(UpdateParams::new().title("Same")).unwrap();
        assert_eq!(manager.params().unwrap().query.to_string(), "?page=2");

        manager.push(UpdateParams::new().path("/other")).unwrap();
        assert_eq!(manager.params().unwrap().query.to_string(), "");
    }

    #[test]
    fn test_title_inherits_when_url_unchanged() {
        let (window, _, manager) = install("https://example.com/");
        window.set_title("Home");
        manager.push(UpdateParams::new().data(json!({"step": 1}))).unwrap();
        assert_eq!(manager.params().unwrap().title, "Home");

        manager.push(UpdateParams::new().path("/next")).unwrap();
        assert_eq!(manager.params().unwrap().title, "");
    }

    #[test]
    fn test_hash_inherits_for_state_updates() {
        let (_, _, manager) = install("https://example.com/doc#intro");
        manager.push(UpdateParams::new().close(|| {})).unwrap();
        assert_eq!(manager.params().unwrap().hash, "#intro");

        manager.push(UpdateParams::new().path("/doc2")).unwrap();
        assert_eq!(manager.params().unwrap().hash, "");
    }

    #[test]
    fn test_user_data_is_flattened() {
        let (window, _, manager) = install("https://example.com/");
        manager
            .push(UpdateParams::new().path("/a").data(json!({"tab": "info"})))
            .unwrap();
        let state = window.history_state().unwrap();
        assert_eq!(state["tab"], json!("info"));
        assert_eq!(manager.store().get().data.get("tab"), Some(&json!("info")));
    }

    #[test]
    fn test_non_object_data_rejected() {
        let (_, _, manager) = install("https://example.com/");
        let err = manager.push(UpdateParams::new().data(json!([1, 2]))).unwrap_err();
        assert!(matches!(err, GemError::InvalidState(_)));
    }

    #[test]
    fn test_beforechange_precedes_store_update() {
        let (_, _, manager) = install("https://example.com/");
        let seen = Rc::new(RefCell::new(Vec::new()));
        let (s, m) = (seen.clone(), manager.clone());
        manager.events().add_listener("beforechange", move |_| {
            s.borrow_mut().push(m.current_key());
        });
        let before = manager.current_key();
        manager.push(UpdateParams::new().path("/a")).unwrap();
        assert_eq!(*seen.borrow(), vec![before]);
    }

    #[test]
    fn test_update_params_merges_and_notifies() {
        let (_, scheduler, manager) = install("https://example.com/");
        let notified = Rc::new(Cell::new(0));
        let n = notified.clone();
        let _subscription = manager.store().connect(Callback::from_fn(move || n.set(n.get() + 1)));
        manager.update_params(UpdateParams::new().title("Renamed"));
        scheduler.run_microtasks();
        assert_eq!(manager.params().unwrap().title, "Renamed");
        assert_eq!(manager.params().unwrap().path, "/");
        assert_eq!(notified.get(), 1);
    }

    #[test]
    fn test_set_base_path_recomputes_path() {
        let (_, _, manager) = install("https://example.com/app/x");
        assert_eq!(manager.params().unwrap().path, "/app/x");
        manager.set_base_path("/app/");
        assert_eq!(manager.base_path(), "/app");
        assert_eq!(manager.params().unwrap().path, "/x");
    }

    #[test]
    fn test_dropping_manager_releases_window() {
        let (window, _, manager) = install("https://example.com/");
        assert!(window.is_intercepted());
        drop(manager);
        assert!(!window.is_intercepted());
        assert_eq!(window.events().listener_count("popstate"), 0);
        assert_eq!(window.events().listener_count("hashchange"), 0);
    }
}
