//! Route element
//!
//! Renders the route matching the current history entry. Every change of
//! the history store schedules an update; the route is only resolved again
//! when the path, the `key` property or the route table changes, so a
//! query-only navigation keeps the current content.

use crate::pattern::create_path;
use crate::table::{RouteMatch, RouteTable};
use gem_core::Dep;
use gem_element::{ClassBuilder, Component, Element, GemError, Hook, Runtime, Template};
use gem_history::{HistoryManager, UpdateParams};
use serde_json::json;
use std::cell::Cell;
use std::rc::Rc;

/// Route rendering into its shadow root
pub const ROUTE_TAG: &str = "gem-route";

/// Route rendering into the light DOM
pub const LIGHT_ROUTE_TAG: &str = "gem-light-route";

#[derive(Debug, Clone, Default)]
struct RouteState {
    current: RouteMatch,
    content: Template,
}

/// Component of `<gem-route>`
pub struct Route {
    history: HistoryManager,
    changed: Cell<bool>,
}

impl Route {
    pub fn new(history: &HistoryManager) -> Self {
        Self {
            history: history.clone(),
            changed: Cell::new(false),
        }
    }

    /// Register both route elements, observing `history`
    pub fn define(runtime: &Runtime, history: &HistoryManager) -> Result<(), GemError> {
        let registry = runtime.registry();
        registry.define(ROUTE_TAG, Self::class(history).build())?;
        registry.define(LIGHT_ROUTE_TAG, Self::class(history).light().build())?;
        Ok(())
    }

    fn class(history: &HistoryManager) -> ClassBuilder {
        ClassBuilder::new("Route")
            .property("routes")
            .property("key")
            .bool_attribute("inert")
            .emitter("routechange")
            .connect_store(history.store().erase())
            .connect_store(history.base_path_store().erase())
    }

    /// Create a route element showing `routes`
    pub fn create(
        runtime: &Runtime,
        tag: &str,
        history: &HistoryManager,
        routes: RouteTable,
    ) -> Result<Element<Self>, GemError> {
        let el = Element::create(runtime, tag, Self::new(history))?;
        el.set_prop("routes", Rc::new(routes))?;
        Ok(el)
    }

    /// Route and parameters currently shown
    pub fn current(&self, el: &Element<Self>) -> RouteMatch {
        el.state::<RouteState>()
            .map(|state| state.current)
            .unwrap_or_default()
    }

    fn routes(el: &Element<Self>) -> Rc<RouteTable> {
        el.prop::<Rc<RouteTable>>("routes")
            .ok()
            .flatten()
            .unwrap_or_default()
    }

    fn resolve(&self, el: &Element<Self>) {
        let Some(params) = self.history.params() else {
            return;
        };
        let found = Self::routes(el).find(&params.path);

        if let Some(redirect) = found.route.as_ref().and_then(|route| route.redirect.as_deref()) {
            let target = create_path(redirect, &found.params);
            tracing::debug!(from = %params.path, to = %target, "route redirect");
            let update = UpdateParams::new()
                .path(target)
                .query(params.query.clone())
                .hash(params.hash.clone());
            if let Err(err) = self.history.replace(update) {
                tracing::error!(%err, "route redirect failed");
            }
            return;
        }

        if let Some(title) = found.route.as_ref().and_then(|route| route.title.clone()) {
            self.history.title_store().update(|titles| titles.title = title);
        }
        let content = found
            .route
            .as_ref()
            .map(|route| route.render(&found.params))
            .unwrap_or_default();
        tracing::debug!(path = %params.path, pattern = ?found.pattern(), "route resolved");
        let applied = el.set_state(|state: &mut RouteState| {
            state.current = found;
            state.content = content;
        });
        if let Err(err) = applied {
            tracing::error!(%err, "failed to store route");
            return;
        }
        self.changed.set(true);
    }

    fn announce(&self, el: &Element<Self>) {
        if !self.changed.replace(false) {
            return;
        }
        let current = self.current(el);
        let detail = json!({
            "pattern": current.pattern(),
            "params": current.params,
        });
        if let Err(err) = el.emit("routechange", Some(detail)) {
            tracing::error!(%err, "failed to emit routechange");
        }
    }
}

impl Component for Route {
    fn setup(&self, el: &Element<Self>) {
        el.init_state(RouteState::default());
        el.memo(
            |el, _| el.component().resolve(el),
            |el| {
                let history = &el.component().history;
                let path = history.params().map(|params| params.path).unwrap_or_default();
                let key = el.prop::<String>("key").ok().flatten().unwrap_or_default();
                let routes = el
                    .prop::<Rc<RouteTable>>("routes")
                    .ok()
                    .flatten()
                    .map_or(Dep::Null, |routes| Dep::of(&routes));
                vec![Dep::from(path), Dep::from(key), routes]
            },
        );
    }

    fn should_update(&self, el: &Element<Self>) -> bool {
        !el.bool_attr("inert").unwrap_or(false)
    }

    fn render(&self, el: &Element<Self>) -> Result<Template, GemError> {
        Ok(el.state::<RouteState>()?.content)
    }

    fn mounted(&self, el: &Element<Self>) -> Hook {
        self.announce(el);
        Hook::None
    }

    fn updated(&self, el: &Element<Self>) -> Hook {
        self.announce(el);
        Hook::None
    }
}
