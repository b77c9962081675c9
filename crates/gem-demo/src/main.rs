//! Gem Demo
//!
//! Opens two modal dialogs as history entries, then walks back through
//! them: the inner dialog closes, the outer one refuses while it has
//! unsaved changes and closes once they are saved.
//!
//! Usage: `gem-demo [config.json]`

use anyhow::{Context, Result, bail};
use gem_element::{ClassBuilder, Component, Element, GemError, Runtime, RuntimeConfig, Template};
use gem_history::{HistoryConfig, HistoryManager, UpdateParams, Window};
use gem_router::{ROUTE_TAG, Route, RouteItem, RouteTable};
use serde::Deserialize;
use std::cell::Cell;
use std::rc::Rc;
use tracing_subscriber::EnvFilter;

const MODAL_STACK_TAG: &str = "demo-modal-stack";

#[derive(Debug, Deserialize)]
#[serde(default)]
struct DemoConfig {
    url: String,
    runtime: RuntimeConfig,
    history: HistoryConfig,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            url: "https://gem.local/".to_string(),
            runtime: RuntimeConfig::default(),
            history: HistoryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Dialogs {
    open: Vec<String>,
}

/// Renders the open dialogs, innermost last
struct ModalStack {
    history: HistoryManager,
    unsaved: Rc<Cell<bool>>,
}

impl Component for ModalStack {
    fn setup(&self, el: &Element<Self>) {
        el.init_state(Dialogs::default());
    }

    fn render(&self, el: &Element<Self>) -> Result<Template, GemError> {
        let dialogs = el.state::<Dialogs>()?;
        if dialogs.open.is_empty() {
            return Ok(Template::new("(no dialogs)"));
        }
        Ok(Template::new(dialogs.open.join(" > ")))
    }
}

/// Push a history entry for dialog `name`; a guarded dialog refuses to
/// close while there are unsaved changes
fn open_dialog(stack: &Element<ModalStack>, name: &str, guarded: bool) -> Result<()> {
    stack.set_state(|dialogs: &mut Dialogs| dialogs.open.push(name.to_string()))?;
    let on_close = stack.clone();
    let mut params = UpdateParams::new()
        .path(format!("/dialog/{name}"))
        .title(name)
        .close(move || {
            if let Err(err) = on_close.set_state(|dialogs: &mut Dialogs| {
                dialogs.open.pop();
            }) {
                tracing::error!(%err, "failed to close dialog");
            }
        });
    if guarded {
        let unsaved = stack.component().unsaved.clone();
        params = params.should_close(move || !unsaved.get());
    }
    stack.component().history.push(params)?;
    Ok(())
}

fn settle(runtime: &Runtime, window: &Window) -> Result<()> {
    window.run_tasks();
    let checkpoint = runtime.run_microtasks();
    if let Some(err) = checkpoint.errors.into_iter().next() {
        bail!(err);
    }
    Ok(())
}

fn report(step: &str, window: &Window, stack: &Element<ModalStack>, route: &Element<Route>) {
    let show = |template: Option<Template>| template.map(|t| t.to_string()).unwrap_or_default();
    println!(
        "{step:<24} url={:<20} history={} dialogs=[{}] route=[{}]",
        window.pathname(),
        window.history_length(),
        show(stack.rendered()),
        show(route.rendered()),
    );
}

fn load_config() -> Result<DemoConfig> {
    let Some(path) = std::env::args().nth(1) else {
        return Ok(DemoConfig::default());
    };
    let json = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    serde_json::from_str(&json).with_context(|| format!("parsing {path}"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = load_config()?;
    tracing::info!("gem demo v{}", gem_element::VERSION);

    let runtime = Runtime::new(config.runtime);
    let window = Window::new(&config.url)?;
    let history = HistoryManager::install(&window, runtime.scheduler(), config.history)?;

    Route::define(&runtime, &history)?;
    runtime
        .registry()
        .define(MODAL_STACK_TAG, ClassBuilder::new("ModalStack").light().build())?;

    let routes = RouteTable::new([
        RouteItem::new("/").title("Home").content("home page"),
        RouteItem::new("/dialog/:name")
            .content_fn(|params| Template::new(format!("dialog {}", params["name"]))),
        RouteItem::new("*").content("not found"),
    ])?;
    let route = Route::create(&runtime, ROUTE_TAG, &history, routes)?;
    let unsaved = Rc::new(Cell::new(false));
    let stack = Element::create(
        &runtime,
        MODAL_STACK_TAG,
        ModalStack {
            history: history.clone(),
            unsaved: unsaved.clone(),
        },
    )?;
    route.connect(runtime.document())?;
    stack.connect(runtime.document())?;
    settle(&runtime, &window)?;
    report("start", &window, &stack, &route);

    open_dialog(&stack, "settings", true)?;
    unsaved.set(true);
    settle(&runtime, &window)?;
    report("open settings", &window, &stack, &route);

    open_dialog(&stack, "confirm", false)?;
    settle(&runtime, &window)?;
    report("open confirm", &window, &stack, &route);

    history.back();
    settle(&runtime, &window)?;
    report("back (confirm closes)", &window, &stack, &route);

    history.back();
    settle(&runtime, &window)?;
    report("back (vetoed)", &window, &stack, &route);

    unsaved.set(false);
    history.back();
    settle(&runtime, &window)?;
    report("back (saved, closes)", &window, &stack, &route);

    Ok(())
}
