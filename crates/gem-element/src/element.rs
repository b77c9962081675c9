//! Reactive Element
//!
//! An [`Element`] pairs a user [`Component`] with the runtime state of one
//! custom element instance: attributes, properties, private state, custom
//! states, effects and memos, and the lifecycle machine
//! `unconnected -> connecting -> mounted <-> updating -> disconnected`.
//!
//! Renders are never synchronous. [`Element::update`] queues the element's
//! update task on the scheduler, so any number of changes within one turn
//! produce one render.

use crate::dom::{RootNode, Template, describe_root};
use crate::metadata::{Accessor, AttrDecl, ElementClass};
use crate::registry::{ClassSlot, LiveElement};
use crate::runtime::Runtime;
use crate::stylesheet::StyleDisposer;
use gem_core::{
    Callback, CustomEvent, Dep, EventTarget, GemError, Subscription, TaskResult, deps_changed,
};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};

/// Cleanup returned by a hook or an effect
pub type Cleanup = Box<dyn FnOnce()>;

/// What a lifecycle hook or effect hands back to the runtime
#[derive(Default)]
pub enum Hook {
    #[default]
    None,
    /// Called on disconnect
    Cleanup(Cleanup),
    /// Spawned on the runtime and never awaited by it
    Task(Pin<Box<dyn Future<Output = ()>>>),
}

impl Hook {
    pub fn cleanup(f: impl FnOnce() + 'static) -> Self {
        Self::Cleanup(Box::new(f))
    }

    pub fn spawn(future: impl Future<Output = ()> + 'static) -> Self {
        Self::Task(Box::pin(future))
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("Hook::None"),
            Self::Cleanup(_) => f.write_str("Hook::Cleanup"),
            Self::Task(_) => f.write_str("Hook::Task"),
        }
    }
}

/// Lifecycle state of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Unconnected,
    Connecting,
    Mounted,
    Updating,
    Disconnected,
}

/// Handle of a registered effect or memo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EffectId(u64);

/// User side of a custom element.
///
/// Every hook receives the element handle, which is how a component reads
/// its attributes, sets state or registers effects.
pub trait Component: Sized + 'static {
    /// Construction time; effects registered here survive disconnection
    fn setup(&self, _el: &Element<Self>) {}

    /// Before the first render
    fn will_mount(&self, _el: &Element<Self>) -> Hook {
        Hook::None
    }

    fn render(&self, el: &Element<Self>) -> Result<Template, GemError>;

    /// One microtask after the first render
    fn mounted(&self, _el: &Element<Self>) -> Hook {
        Hook::None
    }

    /// Returning `false` skips `render`; `updated` and effects still run
    fn should_update(&self, _el: &Element<Self>) -> bool {
        true
    }

    /// After every re-render
    fn updated(&self, _el: &Element<Self>) -> Hook {
        Hook::None
    }

    fn unmounted(&self, _el: &Element<Self>) {}

    fn attribute_changed(
        &self,
        _el: &Element<Self>,
        _name: &str,
        _old: Option<&str>,
        _new: Option<&str>,
    ) {
    }

    /// Content shown instead of a failed render, `None` propagates the error
    fn fallback(&self, _el: &Element<Self>, _error: &GemError) -> Option<Template> {
        None
    }
}

type EffectFn<C> = Rc<dyn Fn(&Element<C>, &[Dep]) -> Hook>;
type DepsFn<C> = Rc<dyn Fn(&Element<C>) -> Vec<Dep>>;

struct EffectRecord<C: Component> {
    id: EffectId,
    callback: EffectFn<C>,
    deps: Option<DepsFn<C>>,
    values: Option<Vec<Dep>>,
    cleanup: Option<Cleanup>,
    initialized: bool,
    /// Registered before connection, kept across disconnects
    in_constructor: bool,
}

#[derive(Clone, Copy)]
enum RecordKind {
    Effect,
    Memo,
}

/// Custom element instance
pub struct Element<C: Component> {
    inner: Rc<ElementInner<C>>,
}

struct ElementInner<C: Component> {
    tag: String,
    component: C,
    runtime: Runtime,
    class: Rc<ClassSlot>,
    shadow_root: Option<RootNode>,
    this: Weak<ElementInner<C>>,

    update_task: Callback,
    mount_task: Callback,
    teardown_task: Callback,
    connect_task: Callback,

    lifecycle: Cell<Lifecycle>,
    rendering: Cell<bool>,
    reparenting: Cell<bool>,
    started: Cell<bool>,
    parent: RefCell<Option<RootNode>>,

    attributes: RefCell<BTreeMap<String, String>>,
    properties: RefCell<HashMap<String, Rc<dyn Any>>>,
    css_states: RefCell<BTreeSet<String>>,
    state: RefCell<Option<Box<dyn Any>>>,
    events: EventTarget,

    effects: RefCell<Vec<EffectRecord<C>>>,
    memos: RefCell<Vec<EffectRecord<C>>>,
    next_effect: Cell<u64>,

    rendered: RefCell<Option<Template>>,
    subscriptions: RefCell<Vec<Subscription>>,
    styles: RefCell<Option<StyleDisposer>>,
    will_mount_cleanup: RefCell<Option<Cleanup>>,
    mounted_cleanup: RefCell<Option<Cleanup>>,
    updated_cleanup: RefCell<Option<Cleanup>>,
}

fn task<C: Component>(this: &Weak<ElementInner<C>>, run: fn(&Element<C>) -> TaskResult) -> Callback {
    let this = this.clone();
    Callback::new(move || match this.upgrade() {
        Some(inner) => run(&Element { inner }),
        None => Ok(()),
    })
}

fn run_cleanup(slot: &RefCell<Option<Cleanup>>) {
    let cleanup = slot.borrow_mut().take();
    if let Some(cleanup) = cleanup {
        cleanup();
    }
}

impl<C: Component> Clone for Element<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C: Component> PartialEq for Element<C> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<C: Component> fmt::Debug for Element<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("tag", &self.inner.tag)
            .field("lifecycle", &self.inner.lifecycle.get())
            .field("attributes", &self.inner.attributes.borrow())
            .finish()
    }
}

impl<C: Component> LiveElement for ElementInner<C> {
    fn reload_class(&self) {
        if let Some(inner) = self.this.upgrade() {
            Element { inner }.apply_class();
        }
    }
}

impl<C: Component> Element<C> {
    /// Instantiate the element class registered as `tag`
    pub fn create(runtime: &Runtime, tag: &str, component: C) -> Result<Self, GemError> {
        let slot = runtime
            .registry()
            .slot(tag)
            .ok_or_else(|| GemError::Undeclared {
                kind: "element",
                name: tag.to_string(),
            })?;
        let class = slot.get();
        class.accessors();
        let shadow_root = class
            .metadata()
            .shadow()
            .map(|init| RootNode::shadow(tag, init));

        let inner = Rc::new_cyclic(|this: &Weak<ElementInner<C>>| ElementInner {
            tag: tag.to_string(),
            component,
            runtime: runtime.clone(),
            class: slot,
            shadow_root,
            this: this.clone(),
            update_task: task(this, Self::perform_update),
            mount_task: task(this, Self::finish_mount),
            teardown_task: task(this, Self::teardown),
            connect_task: task(this, Self::mount),
            lifecycle: Cell::new(Lifecycle::Unconnected),
            rendering: Cell::new(false),
            reparenting: Cell::new(false),
            started: Cell::new(false),
            parent: RefCell::new(None),
            attributes: RefCell::new(BTreeMap::new()),
            properties: RefCell::new(HashMap::new()),
            css_states: RefCell::new(BTreeSet::new()),
            state: RefCell::new(None),
            events: EventTarget::new(),
            effects: RefCell::new(Vec::new()),
            memos: RefCell::new(Vec::new()),
            next_effect: Cell::new(0),
            rendered: RefCell::new(None),
            subscriptions: RefCell::new(Vec::new()),
            styles: RefCell::new(None),
            will_mount_cleanup: RefCell::new(None),
            mounted_cleanup: RefCell::new(None),
            updated_cleanup: RefCell::new(None),
        });

        let element = Self { inner };
        let live: Weak<dyn LiveElement> = Rc::downgrade(&element.inner) as Weak<ElementInner<C>>;
        runtime.registry().track(tag, live);
        element.inner.component.setup(&element);
        Ok(element)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn tag(&self) -> &str {
        &self.inner.tag
    }

    pub fn component(&self) -> &C {
        &self.inner.component
    }

    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    /// Class currently defined for this tag
    pub fn class(&self) -> Rc<ElementClass> {
        self.inner.class.get()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.inner.lifecycle.get()
    }

    pub fn is_connected(&self) -> bool {
        matches!(
            self.lifecycle(),
            Lifecycle::Connecting | Lifecycle::Mounted | Lifecycle::Updating
        )
    }

    pub fn is_mounted(&self) -> bool {
        matches!(self.lifecycle(), Lifecycle::Mounted | Lifecycle::Updating)
    }

    pub fn shadow_root(&self) -> Option<&RootNode> {
        self.inner.shadow_root.as_ref()
    }

    pub fn parent_root(&self) -> Option<RootNode> {
        self.inner.parent.borrow().clone()
    }

    /// Root whose adopted stylesheets style this element's content
    pub fn render_root(&self) -> Option<RootNode> {
        self.inner
            .shadow_root
            .clone()
            .or_else(|| self.inner.parent.borrow().clone())
    }

    /// Content committed by the last successful render
    pub fn rendered(&self) -> Option<Template> {
        self.inner.rendered.borrow().clone()
    }

    pub fn events(&self) -> &EventTarget {
        &self.inner.events
    }

    pub fn aria_role(&self) -> Option<String> {
        self.class().metadata().aria_role().map(str::to_string)
    }

    /// Run `future` on the runtime executor without awaiting it
    pub fn spawn(&self, future: impl Future<Output = ()> + 'static) {
        self.inner.runtime.scheduler().spawn_local(future);
    }

    // ========================================================================
    // Attributes and properties
    // ========================================================================

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.inner.attributes.borrow().get(name).cloned()
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.inner.attributes.borrow().contains_key(name)
    }

    /// Set or remove a DOM attribute; observed attributes re-render
    pub fn set_attribute(&self, name: &str, value: Option<&str>) {
        let old = {
            let mut attributes = self.inner.attributes.borrow_mut();
            match value {
                Some(value) => attributes.insert(name.to_string(), value.to_string()),
                None => attributes.remove(name),
            }
        };
        if old.as_deref() == value || self.class().attribute_by_name(name).is_none() {
            return;
        }
        self.inner
            .component
            .attribute_changed(self, name, old.as_deref(), value);
        self.update();
    }

    fn attr_decl(&self, field: &str) -> Result<AttrDecl, GemError> {
        match self.class().accessor(field) {
            Some(Accessor::Attribute(decl)) => Ok(decl.clone()),
            _ => Err(GemError::Undeclared {
                kind: "attribute",
                name: field.to_string(),
            }),
        }
    }

    /// String attribute value, falling back to its default
    pub fn attr(&self, field: &str) -> Result<String, GemError> {
        let decl = self.attr_decl(field)?;
        Ok(self
            .attribute(&decl.attr)
            .or(decl.default)
            .unwrap_or_default())
    }

    pub fn bool_attr(&self, field: &str) -> Result<bool, GemError> {
        let decl = self.attr_decl(field)?;
        Ok(self.has_attribute(&decl.attr))
    }

    pub fn num_attr(&self, field: &str) -> Result<f64, GemError> {
        let decl = self.attr_decl(field)?;
        let parse = |value: Option<String>| value.and_then(|v| v.trim().parse::<f64>().ok());
        Ok(parse(self.attribute(&decl.attr))
            .or_else(|| parse(decl.default))
            .unwrap_or(0.0))
    }

    pub fn set_attr(&self, field: &str, value: &str) -> Result<(), GemError> {
        let decl = self.attr_decl(field)?;
        self.set_attribute(&decl.attr, Some(value));
        Ok(())
    }

    pub fn set_bool_attr(&self, field: &str, value: bool) -> Result<(), GemError> {
        let decl = self.attr_decl(field)?;
        self.set_attribute(&decl.attr, value.then_some(""));
        Ok(())
    }

    pub fn set_num_attr(&self, field: &str, value: f64) -> Result<(), GemError> {
        let decl = self.attr_decl(field)?;
        self.set_attribute(&decl.attr, Some(&value.to_string()));
        Ok(())
    }

    fn expect_property(&self, field: &str) -> Result<(), GemError> {
        match self.class().accessor(field) {
            Some(Accessor::Property) => Ok(()),
            _ => Err(GemError::Undeclared {
                kind: "property",
                name: field.to_string(),
            }),
        }
    }

    /// Property value; `None` when unset or holding another type
    pub fn prop<T: Clone + 'static>(&self, field: &str) -> Result<Option<T>, GemError> {
        self.expect_property(field)?;
        Ok(self
            .inner
            .properties
            .borrow()
            .get(field)
            .and_then(|value| (**value).downcast_ref::<T>().cloned()))
    }

    pub fn set_prop<T: 'static>(&self, field: &str, value: T) -> Result<(), GemError> {
        self.expect_property(field)?;
        self.inner
            .properties
            .borrow_mut()
            .insert(field.to_string(), Rc::new(value));
        self.update();
        Ok(())
    }

    /// Reset a property to undefined
    pub fn clear_prop(&self, field: &str) -> Result<(), GemError> {
        self.expect_property(field)?;
        if self.inner.properties.borrow_mut().remove(field).is_some() {
            self.update();
        }
        Ok(())
    }

    // ========================================================================
    // Custom states, parts, slots and emitters
    // ========================================================================

    fn named(&self, field: &str, kind: &'static str) -> Result<String, GemError> {
        let name = match (kind, self.class().accessor(field)) {
            ("state", Some(Accessor::State(name)))
            | ("part", Some(Accessor::Part(name)))
            | ("slot", Some(Accessor::Slot(name))) => Some(name.clone()),
            _ => None,
        };
        name.ok_or_else(|| GemError::Undeclared {
            kind,
            name: field.to_string(),
        })
    }

    pub fn set_css_state(&self, field: &str, on: bool) -> Result<(), GemError> {
        let name = self.named(field, "state")?;
        let mut states = self.inner.css_states.borrow_mut();
        if on {
            states.insert(name);
        } else {
            states.remove(&name);
        }
        Ok(())
    }

    pub fn css_state(&self, field: &str) -> Result<bool, GemError> {
        let name = self.named(field, "state")?;
        Ok(self.inner.css_states.borrow().contains(&name))
    }

    /// Active custom states, as matched by `:state(name)`
    pub fn css_states(&self) -> Vec<String> {
        self.inner.css_states.borrow().iter().cloned().collect()
    }

    pub fn part(&self, field: &str) -> Result<String, GemError> {
        self.named(field, "part")
    }

    pub fn slot(&self, field: &str) -> Result<String, GemError> {
        self.named(field, "slot")
    }

    /// Dispatch the event declared as `field`, returns how many listeners ran
    pub fn emit(&self, field: &str, detail: Option<serde_json::Value>) -> Result<usize, GemError> {
        let decl = match self.class().accessor(field) {
            Some(Accessor::Emitter(decl)) => decl.clone(),
            _ => {
                return Err(GemError::Undeclared {
                    kind: "event",
                    name: field.to_string(),
                });
            }
        };
        let mut event = CustomEvent::new(decl.event);
        if let Some(detail) = detail {
            event = event.with_detail(detail);
        }
        if decl.global {
            event = event.global();
        }
        let mut count = self.inner.events.dispatch(&event);
        if decl.global && self.is_connected() {
            count += self.inner.runtime.document_events().dispatch(&event);
        }
        Ok(count)
    }

    // ========================================================================
    // State
    // ========================================================================

    /// Declare the private state, usually from `setup`
    pub fn init_state<S: 'static>(&self, state: S) {
        *self.inner.state.borrow_mut() = Some(Box::new(state));
    }

    pub fn state<S: Clone + 'static>(&self) -> Result<S, GemError> {
        let state = self.inner.state.borrow();
        let state = state.as_ref().ok_or(GemError::StateNotInitialized)?;
        state
            .downcast_ref::<S>()
            .cloned()
            .ok_or(GemError::StateMismatch)
    }

    /// Merge into the state and re-render; during a render the merge is
    /// applied without scheduling another one
    pub fn set_state<S: 'static>(&self, patch: impl FnOnce(&mut S)) -> Result<(), GemError> {
        {
            let mut state = self.inner.state.borrow_mut();
            let state = state.as_mut().ok_or(GemError::StateNotInitialized)?;
            let state = state.downcast_mut::<S>().ok_or(GemError::StateMismatch)?;
            patch(state);
        }
        if !self.inner.rendering.get() {
            self.update();
        }
        Ok(())
    }

    // ========================================================================
    // Effects and memos
    // ========================================================================

    fn records(&self, kind: RecordKind) -> &RefCell<Vec<EffectRecord<C>>> {
        match kind {
            RecordKind::Effect => &self.inner.effects,
            RecordKind::Memo => &self.inner.memos,
        }
    }

    fn register(&self, kind: RecordKind, callback: EffectFn<C>, deps: Option<DepsFn<C>>) -> EffectId {
        let id = EffectId(self.inner.next_effect.get());
        self.inner.next_effect.set(id.0 + 1);
        self.records(kind).borrow_mut().push(EffectRecord {
            id,
            callback,
            deps,
            values: None,
            cleanup: None,
            initialized: false,
            in_constructor: !self.is_connected(),
        });
        if self.is_mounted() {
            self.run_record(kind, id);
        }
        id
    }

    /// Side effect re-run after an update whenever `deps` changes
    pub fn effect(
        &self,
        callback: impl Fn(&Element<C>, &[Dep]) -> Hook + 'static,
        deps: impl Fn(&Element<C>) -> Vec<Dep> + 'static,
    ) -> EffectId {
        self.register(RecordKind::Effect, Rc::new(callback), Some(Rc::new(deps)))
    }

    /// Side effect re-run after every update
    pub fn effect_always(&self, callback: impl Fn(&Element<C>, &[Dep]) -> Hook + 'static) -> EffectId {
        self.register(RecordKind::Effect, Rc::new(callback), None)
    }

    /// Derivation run before `render` whenever `deps` changes
    pub fn memo(
        &self,
        callback: impl Fn(&Element<C>, &[Dep]) + 'static,
        deps: impl Fn(&Element<C>) -> Vec<Dep> + 'static,
    ) -> EffectId {
        let callback: EffectFn<C> = Rc::new(move |el: &Element<C>, values: &[Dep]| {
            callback(el, values);
            Hook::None
        });
        self.register(RecordKind::Memo, callback, Some(Rc::new(deps)))
    }

    pub fn memo_always(&self, callback: impl Fn(&Element<C>, &[Dep]) + 'static) -> EffectId {
        let callback: EffectFn<C> = Rc::new(move |el: &Element<C>, values: &[Dep]| {
            callback(el, values);
            Hook::None
        });
        self.register(RecordKind::Memo, callback, None)
    }

    /// Unregister an effect or memo, running its cleanup
    pub fn remove_effect(&self, id: EffectId) {
        for kind in [RecordKind::Effect, RecordKind::Memo] {
            let cleanup = {
                let mut records = self.records(kind).borrow_mut();
                let Some(pos) = records.iter().position(|r| r.id == id) else {
                    continue;
                };
                records.remove(pos).cleanup
            };
            if let Some(cleanup) = cleanup {
                cleanup();
            }
        }
    }

    fn absorb(&self, hook: Hook) -> Option<Cleanup> {
        match hook {
            Hook::None => None,
            Hook::Cleanup(cleanup) => Some(cleanup),
            Hook::Task(future) => {
                self.spawn(future);
                None
            }
        }
    }

    fn run_record(&self, kind: RecordKind, id: EffectId) {
        let (callback, deps, previous, initialized) = {
            let records = self.records(kind).borrow();
            let Some(record) = records.iter().find(|r| r.id == id) else {
                return;
            };
            (
                record.callback.clone(),
                record.deps.clone(),
                record.values.clone(),
                record.initialized,
            )
        };

        let values = deps.map(|deps| deps(self));
        let changed = match (&values, &previous) {
            (Some(new), Some(old)) => deps_changed(new, old),
            _ => true,
        };
        if initialized && !changed {
            return;
        }

        let hook = callback(self, values.as_deref().unwrap_or(&[]));
        let cleanup = self.absorb(hook);

        let orphan = {
            let mut records = self.records(kind).borrow_mut();
            match records.iter_mut().find(|r| r.id == id) {
                Some(record) => {
                    record.values = values;
                    record.initialized = true;
                    record.cleanup = cleanup;
                    None
                }
                None => cleanup,
            }
        };
        // Removed from inside its own callback
        if let Some(cleanup) = orphan {
            cleanup();
        }
    }

    fn run_records(&self, kind: RecordKind, only_uninitialized: bool) {
        let ids: Vec<EffectId> = self
            .records(kind)
            .borrow()
            .iter()
            .filter(|r| !only_uninitialized || !r.initialized)
            .map(|r| r.id)
            .collect();
        for id in ids {
            self.run_record(kind, id);
        }
    }

    fn reset_records(&self, kind: RecordKind) {
        let cleanups: Vec<Cleanup> = {
            let mut records = self.records(kind).borrow_mut();
            let cleanups = records.iter_mut().filter_map(|r| r.cleanup.take()).collect();
            records.retain(|r| r.in_constructor);
            for record in records.iter_mut() {
                record.initialized = false;
                record.values = None;
            }
            cleanups
        };
        for cleanup in cleanups {
            cleanup();
        }
    }

    /// Number of registered effects
    pub fn effect_count(&self) -> usize {
        self.inner.effects.borrow().len()
    }

    // ========================================================================
    // Update cycle
    // ========================================================================

    /// Request a re-render at the next checkpoint
    pub fn update(&self) {
        if self.is_connected() {
            self.inner
                .runtime
                .scheduler()
                .add_microtask(self.inner.update_task.clone());
        }
    }

    fn perform_update(&self) -> TaskResult {
        if self.lifecycle() != Lifecycle::Mounted {
            return Ok(());
        }
        self.inner.lifecycle.set(Lifecycle::Updating);
        let result = self.render_pass(true);
        if self.lifecycle() == Lifecycle::Updating {
            self.inner.lifecycle.set(Lifecycle::Mounted);
        }
        result?;

        run_cleanup(&self.inner.updated_cleanup);
        let hook = self.inner.component.updated(self);
        *self.inner.updated_cleanup.borrow_mut() = self.absorb(hook);
        self.run_records(RecordKind::Effect, false);
        Ok(())
    }

    fn render_pass(&self, gated: bool) -> TaskResult {
        let component = &self.inner.component;
        if gated && !component.should_update(self) {
            tracing::trace!(tag = %self.inner.tag, "render skipped by should_update");
            return Ok(());
        }

        self.inner.rendering.set(true);
        self.run_records(RecordKind::Memo, false);
        let result = component.render(self);
        self.inner.rendering.set(false);

        let template = match result {
            Ok(template) => template,
            Err(err) => match component.fallback(self, &err) {
                Some(template) => {
                    tracing::warn!(tag = %self.inner.tag, error = %err, "render failed, showing fallback");
                    template
                }
                None => return Err(err),
            },
        };
        if let Some(root) = &self.inner.shadow_root {
            root.set_content(template.clone());
        }
        *self.inner.rendered.borrow_mut() = Some(template);
        Ok(())
    }

    // ========================================================================
    // Connection
    // ========================================================================

    fn check_root_element(&self, parent: &RootNode) -> Result<(), GemError> {
        let class = self.class();
        let Some(expected) = class.metadata().root_element() else {
            return Ok(());
        };
        if parent.host_tag() == Some(expected) {
            return Ok(());
        }
        Err(GemError::RootElement {
            tag: self.inner.tag.clone(),
            expected: expected.to_string(),
            found: describe_root(parent),
        })
    }

    /// Insert into `parent`. Connecting again in the same turn as a
    /// disconnect is a move and keeps all state.
    pub fn connect(&self, parent: &RootNode) -> Result<(), GemError> {
        if self.inner.reparenting.get() {
            self.check_root_element(parent)?;
            self.inner.reparenting.set(false);
            self.reparent(parent);
            return Ok(());
        }
        if self.is_connected() {
            return Ok(());
        }
        self.check_root_element(parent)?;

        *self.inner.parent.borrow_mut() = Some(parent.clone());
        self.inner.lifecycle.set(Lifecycle::Connecting);
        if self.class().metadata().is_non_blocking() {
            let frames = self.inner.runtime.frames();
            frames.add(self.inner.connect_task.clone());
            if frames.is_saturated() {
                tracing::warn!(queued = frames.len(), "non-blocking queue saturated");
            }
            return Ok(());
        }
        self.mount()
    }

    fn reparent(&self, parent: &RootNode) {
        let moved = self
            .inner
            .parent
            .borrow()
            .as_ref()
            .is_none_or(|current| !current.ptr_eq(parent));
        if moved {
            *self.inner.parent.borrow_mut() = Some(parent.clone());
            if self.inner.shadow_root.is_none() && self.inner.started.get() {
                self.adopt_styles();
            }
        }
        if !self.inner.started.get() && self.class().metadata().is_non_blocking() {
            self.inner.runtime.frames().add(self.inner.connect_task.clone());
        }
        tracing::trace!(tag = %self.inner.tag, moved, "reconnected within one turn");
    }

    /// Remove from the tree; teardown happens at the next checkpoint
    pub fn disconnect(&self) {
        if !self.is_connected() || self.inner.reparenting.get() {
            return;
        }
        self.inner.reparenting.set(true);
        self.inner.runtime.frames().delete(&self.inner.connect_task);
        self.inner
            .runtime
            .scheduler()
            .add_microtask(self.inner.teardown_task.clone());
    }

    fn mount(&self) -> TaskResult {
        if self.lifecycle() != Lifecycle::Connecting || self.inner.started.get() {
            return Ok(());
        }
        self.inner.started.set(true);
        self.subscribe_stores();

        let hook = self.inner.component.will_mount(self);
        *self.inner.will_mount_cleanup.borrow_mut() = self.absorb(hook);

        self.render_pass(false)?;
        self.adopt_styles();
        self.inner
            .runtime
            .scheduler()
            .add_microtask_to_stack(self.inner.mount_task.clone());
        Ok(())
    }

    fn finish_mount(&self) -> TaskResult {
        if self.lifecycle() != Lifecycle::Connecting {
            return Ok(());
        }
        self.inner.lifecycle.set(Lifecycle::Mounted);
        let hook = self.inner.component.mounted(self);
        *self.inner.mounted_cleanup.borrow_mut() = self.absorb(hook);
        self.run_records(RecordKind::Effect, true);
        tracing::debug!(tag = %self.inner.tag, "mounted");
        Ok(())
    }

    fn teardown(&self) -> TaskResult {
        if !self.inner.reparenting.replace(false) {
            return Ok(());
        }
        let started = self.inner.started.replace(false);
        self.inner.lifecycle.set(Lifecycle::Disconnected);
        *self.inner.parent.borrow_mut() = None;
        if !started {
            tracing::trace!(tag = %self.inner.tag, "pending connect cancelled");
            return Ok(());
        }

        let subscriptions = std::mem::take(&mut *self.inner.subscriptions.borrow_mut());
        for subscription in subscriptions {
            subscription.unsubscribe();
        }
        run_cleanup(&self.inner.mounted_cleanup);
        run_cleanup(&self.inner.will_mount_cleanup);
        run_cleanup(&self.inner.updated_cleanup);
        self.inner.component.unmounted(self);
        self.reset_records(RecordKind::Effect);
        self.reset_records(RecordKind::Memo);

        let styles = self.inner.styles.borrow_mut().take();
        if let Some(styles) = styles {
            styles.dispose();
        }
        tracing::debug!(tag = %self.inner.tag, "unmounted");
        Ok(())
    }

    fn subscribe_stores(&self) {
        let class = self.class();
        let subscriptions: Vec<Subscription> = class
            .metadata()
            .stores()
            .iter()
            .map(|store| store.connect_listener(self.inner.update_task.clone()))
            .collect();
        *self.inner.subscriptions.borrow_mut() = subscriptions;
    }

    fn adopt_styles(&self) {
        let previous = self.inner.styles.borrow_mut().take();
        if let Some(previous) = previous {
            previous.dispose();
        }
        let class = self.class();
        let sheets = class.metadata().style_sheets();
        if sheets.is_empty() {
            return;
        }
        let Some(root) = self.render_root() else {
            return;
        };
        let disposer = self.inner.runtime.styles().apply(&root, sheets);
        *self.inner.styles.borrow_mut() = Some(disposer);
    }

    /// Pick up a hot-swapped class: stores, styles, then a re-render
    fn apply_class(&self) {
        if !self.inner.started.get() {
            return;
        }
        let subscriptions = std::mem::take(&mut *self.inner.subscriptions.borrow_mut());
        for subscription in subscriptions {
            subscription.unsubscribe();
        }
        self.subscribe_stores();
        self.adopt_styles();
        self.update();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClassBuilder;
    use gem_core::deps;

    #[derive(Default)]
    struct Counter {
        renders: Cell<u32>,
    }

    impl Component for Counter {
        fn render(&self, el: &Element<Self>) -> Result<Template, GemError> {
            self.renders.set(self.renders.get() + 1);
            Ok(Template::new(format!("<p>{}</p>", el.attr("label")?)))
        }
    }

    fn runtime_with(tag: &str, builder: ClassBuilder) -> Runtime {
        let runtime = Runtime::default();
        runtime.registry().define(tag, builder.build()).unwrap();
        runtime
    }

    #[test]
    fn test_create_requires_definition() {
        let runtime = Runtime::default();
        let err = Element::create(&runtime, "x-missing", Counter::default()).unwrap_err();
        assert!(matches!(err, GemError::Undeclared { kind: "element", .. }));
    }

    #[test]
    fn test_first_render_is_synchronous_mount_is_not() {
        let runtime = runtime_with("x-counter", ClassBuilder::new("Counter").attribute("label"));
        let el = Element::create(&runtime, "x-counter", Counter::default()).unwrap();
        assert_eq!(el.lifecycle(), Lifecycle::Unconnected);

        el.connect(runtime.document()).unwrap();
        assert_eq!(el.component().renders.get(), 1);
        assert_eq!(el.lifecycle(), Lifecycle::Connecting);
        assert_eq!(el.shadow_root().and_then(|r| r.content()), Some(Template::new("<p></p>")));

        runtime.run_microtasks();
        assert_eq!(el.lifecycle(), Lifecycle::Mounted);
    }

    #[test]
    fn test_updates_coalesce() {
        let runtime = runtime_with("x-counter", ClassBuilder::new("Counter").attribute("label"));
        let el = Element::create(&runtime, "x-counter", Counter::default()).unwrap();
        el.connect(runtime.document()).unwrap();
        runtime.run_microtasks();

        for i in 0..10 {
            el.set_attr("label", &i.to_string()).unwrap();
            el.update();
        }
        runtime.run_microtasks();
        assert_eq!(el.component().renders.get(), 2);
        assert_eq!(el.rendered(), Some(Template::new("<p>9</p>")));
    }

    #[test]
    fn test_attribute_kinds() {
        let runtime = runtime_with(
            "x-kinds",
            ClassBuilder::new("Kinds")
                .attribute_with_default("label", "none")
                .bool_attribute("open")
                .num_attribute("size"),
        );
        let el = Element::create(&runtime, "x-kinds", Counter::default()).unwrap();
        assert_eq!(el.attr("label").unwrap(), "none");
        assert!(!el.bool_attr("open").unwrap());
        assert_eq!(el.num_attr("size").unwrap(), 0.0);

        el.set_bool_attr("open", true).unwrap();
        el.set_num_attr("size", 2.5).unwrap();
        assert_eq!(el.attribute("open").as_deref(), Some(""));
        assert_eq!(el.num_attr("size").unwrap(), 2.5);

        el.set_attribute("size", Some("abc"));
        assert_eq!(el.num_attr("size").unwrap(), 0.0);
        assert!(el.attr("missing").is_err());
    }

    #[test]
    fn test_properties_may_be_undefined() {
        let runtime = runtime_with("x-props", ClassBuilder::new("Props").property("data"));
        let el = Element::create(&runtime, "x-props", Counter::default()).unwrap();
        assert_eq!(el.prop::<Vec<u8>>("data").unwrap(), None);
        el.set_prop("data", vec![1u8, 2]).unwrap();
        assert_eq!(el.prop::<Vec<u8>>("data").unwrap(), Some(vec![1, 2]));
        el.clear_prop("data").unwrap();
        assert_eq!(el.prop::<Vec<u8>>("data").unwrap(), None);
        assert!(el.set_prop("other", 1).is_err());
    }

    #[test]
    fn test_state_errors() {
        let runtime = runtime_with("x-state", ClassBuilder::new("State"));
        let el = Element::create(&runtime, "x-state", Counter::default()).unwrap();
        assert_eq!(el.set_state(|n: &mut u32| *n += 1), Err(GemError::StateNotInitialized));
        el.init_state(0u32);
        assert_eq!(el.set_state(|s: &mut String| s.clear()), Err(GemError::StateMismatch));
        el.set_state(|n: &mut u32| *n += 1).unwrap();
        assert_eq!(el.state::<u32>(), Ok(1));
    }

    #[test]
    fn test_effect_runs_after_mount_with_deps() {
        let runtime = runtime_with("x-counter", ClassBuilder::new("Counter").attribute("label"));
        let el = Element::create(&runtime, "x-counter", Counter::default()).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        el.effect(
            move |_, values| {
                s.borrow_mut().push(values.to_vec());
                Hook::None
            },
            |el| deps![el.attr("label").unwrap_or_default()],
        );
        el.connect(runtime.document()).unwrap();
        assert!(seen.borrow().is_empty());
        runtime.run_microtasks();
        assert_eq!(*seen.borrow(), vec![deps![""]]);
    }

    #[test]
    fn test_css_states_parts_and_emitters() {
        let runtime = runtime_with(
            "x-menu",
            ClassBuilder::new("Menu")
                .state("isOpen")
                .part("closeButton")
                .slot("footer")
                .emitter("itemSelect"),
        );
        let el = Element::create(&runtime, "x-menu", Counter::default()).unwrap();
        el.set_css_state("isOpen", true).unwrap();
        assert_eq!(el.css_states(), vec!["is-open"]);
        assert!(el.css_state("isOpen").unwrap());
        assert_eq!(el.part("closeButton").unwrap(), "close-button");
        assert_eq!(el.slot("footer").unwrap(), "footer");

        let detail = Rc::new(RefCell::new(None));
        let d = detail.clone();
        el.events()
            .add_listener("item-select", move |e| *d.borrow_mut() = e.detail.clone());
        assert_eq!(el.emit("itemSelect", Some(serde_json::json!(3))).unwrap(), 1);
        assert_eq!(*detail.borrow(), Some(serde_json::json!(3)));
        assert!(el.emit("isOpen", None).is_err());
    }
}
