//! Edge case tests for gem-history
//!
//! Back/forward round trips, close-handle vetoes, hash bookkeeping, base
//! paths, reloads and calls from code that bypasses the manager.

use gem_core::Scheduler;
use gem_history::{
    GemError, HistoryConfig, HistoryManager, NativeKind, UpdateParams, Window, apply_base_path,
    strip_base_path,
};
use proptest::prelude::*;
use serde_json::json;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

fn setup(url: &str) -> (Window, Scheduler, HistoryManager) {
    setup_with(url, HistoryConfig::default())
}

fn setup_with(url: &str, config: HistoryConfig) -> (Window, Scheduler, HistoryManager) {
    let window = Window::new(url).unwrap();
    let scheduler = Scheduler::new();
    let history = HistoryManager::install(&window, &scheduler, config).unwrap();
    (window, scheduler, history)
}

fn counter() -> (Rc<Cell<u32>>, impl Fn() + 'static) {
    let count = Rc::new(Cell::new(0));
    let c = count.clone();
    (count, move || c.set(c.get() + 1))
}

// ============================================================================
// Traversal
// ============================================================================

#[test]
fn test_push_back_forward_round_trip() {
    let (window, _, history) = setup("https://example.com/");
    history
        .push(
            UpdateParams::new()
                .path("/a")
                .title("A")
                .query("q=1")
                .hash("#x"),
        )
        .unwrap();
    let key = history.current_key();

    history.back();
    window.run_tasks();
    assert_eq!(window.pathname(), "/");
    assert_ne!(history.current_key(), key);

    history.forward();
    window.run_tasks();
    assert_eq!(window.pathname(), "/a");
    assert_eq!(history.current_key(), key);
    let params = history.params().unwrap();
    assert_eq!(params.title, "A");
    assert_eq!(params.query.to_string(), "?q=1");
    assert_eq!(params.hash, "#x");
}

#[test]
fn test_close_handle_runs_on_back() {
    let (window, _, history) = setup("https://example.com/");
    let initial = history.current_key();
    let (closed, close) = counter();
    history
        .push(UpdateParams::new().path("/modal").close(close))
        .unwrap();

    history.back();
    window.run_tasks();
    assert_eq!(closed.get(), 1);
    assert_eq!(window.pathname(), "/");
    assert_eq!(history.current_key(), initial);
}

#[test]
fn test_open_handle_runs_on_forward() {
    let (window, _, history) = setup("https://example.com/");
    let (opened, open) = counter();
    history
        .push(UpdateParams::new().path("/modal").open(open).close(|| {}))
        .unwrap();
    assert_eq!(opened.get(), 0);

    history.back();
    window.run_tasks();
    history.forward();
    window.run_tasks();
    assert_eq!(opened.get(), 1);
    assert_eq!(window.pathname(), "/modal");
}

#[test]
fn test_should_close_veto_keeps_position() {
    let (window, _, history) = setup("https://example.com/");
    history.push(UpdateParams::new().path("/a")).unwrap();
    let (closed, close) = counter();
    history
        .push(
            UpdateParams::new()
                .path("/modal")
                .close(close)
                .should_close(|| false),
        )
        .unwrap();
    let key = history.current_key();
    let length = window.history_length();

    history.back();
    window.run_tasks();

    assert_eq!(window.pathname(), "/modal");
    assert_eq!(window.history_length() - length, 0);
    assert_eq!(closed.get(), 0);
    assert_eq!(history.current_key(), key);
    assert_eq!(window.pending_traversals(), 0);
}

#[test]
fn test_should_close_allows_then_closes() {
    let (window, _, history) = setup("https://example.com/");
    let allow = Rc::new(Cell::new(false));
    let (closed, close) = counter();
    let a = allow.clone();
    history
        .push(
            UpdateParams::new()
                .path("/modal")
                .close(close)
                .should_close(move || a.get()),
        )
        .unwrap();

    history.back();
    window.run_tasks();
    assert_eq!(window.pathname(), "/modal");

    allow.set(true);
    history.back();
    window.run_tasks();
    assert_eq!(window.pathname(), "/");
    assert_eq!(closed.get(), 1);
}

#[test]
fn test_forward_past_vetoing_modal() {
    let (window, _, history) = setup("https://example.com/");
    let (closed, close) = counter();
    history
        .push(
            UpdateParams::new()
                .path("/modal")
                .close(close)
                .should_close(|| false),
        )
        .unwrap();
    history.push(UpdateParams::new().path("/b")).unwrap();
    let key_b = history.current_key();

    history.back();
    window.run_tasks();
    assert_eq!(window.pathname(), "/modal");

    history.forward();
    window.run_tasks();
    assert_eq!(window.pathname(), "/b");
    assert_eq!(history.current_key(), key_b);
    assert_eq!(history.params().unwrap().path, "/b");
    assert_eq!(closed.get(), 0);
}

#[test]
fn test_push_ignore_close_handle_replaces_modal() {
    let (window, _, history) = setup("https://example.com/");
    let (closed, close) = counter();
    history
        .push(UpdateParams::new().path("/modal").close(close))
        .unwrap();
    let length = window.history_length();

    history
        .push_ignore_close_handle(UpdateParams::new().path("/b"))
        .unwrap();
    assert_eq!(closed.get(), 1);
    assert_eq!(window.history_length(), length);
    assert_eq!(window.pathname(), "/b");

    history
        .push_ignore_close_handle(UpdateParams::new().path("/c"))
        .unwrap();
    assert_eq!(window.history_length(), length + 1);
}

#[test]
fn test_foreign_popstate_ignored() {
    let (window, _, history) = setup("https://example.com/");
    let key = history.current_key();
    window
        .native(NativeKind::Push, Some(json!({"host": 1})), "", "/f1")
        .unwrap();
    window
        .native(NativeKind::Push, Some(json!({"host": 2})), "", "/f2")
        .unwrap();
    history.back();
    window.run_tasks();
    assert_eq!(window.pathname(), "/f1");
    assert_eq!(history.current_key(), key);
}

// ============================================================================
// Hashes
// ============================================================================

#[test]
fn test_hash_push_back_push() {
    let (window, _, history) = setup("https://example.com/");
    let length = window.history_length();

    history
        .push(UpdateParams::new().path("/a").hash("#a"))
        .unwrap();
    assert_eq!(window.hash(), "#a");

    history.back();
    window.run_tasks();
    assert_eq!(window.hash(), "");

    history
        .push(UpdateParams::new().path("/a").hash("#b"))
        .unwrap();
    assert_eq!(window.history_length(), length + 1);
    assert_eq!(window.hash(), "#b");
}

#[test]
fn test_synthetic_hashchange_only_when_hash_changes() {
    let (window, _, history) = setup("https://example.com/");
    let events = Rc::new(RefCell::new(Vec::new()));
    let e = events.clone();
    window
        .events()
        .add_listener("hashchange", move |event| e.borrow_mut().push(event.trusted));

    history.replace(UpdateParams::new().hash("#one")).unwrap();
    history.replace(UpdateParams::new().hash("#one")).unwrap();
    history.replace(UpdateParams::new().hash("#two")).unwrap();
    assert_eq!(*events.borrow(), vec![false, false]);
}

#[test]
fn test_hash_stored_decoded() {
    let (window, _, history) = setup("https://example.com/");
    history.push(UpdateParams::new().hash("#%E4%B8%AD")).unwrap();
    assert_eq!(history.params().unwrap().hash, "#中");
    assert_eq!(window.hash(), "#%E4%B8%AD");
}

#[test]
fn test_anchor_navigation_recorded() {
    let (window, _, history) = setup("https://example.com/page");
    let before = history.current_key();
    window.navigate_hash("#section");

    assert_ne!(history.current_key(), before);
    let state = window.history_state().unwrap();
    assert_eq!(state["$key"], json!(history.current_key()));
    let params = history.params().unwrap();
    assert_eq!(params.hash, "#section");
    assert_eq!(params.path, "/page");
}

// ============================================================================
// Paths
// ============================================================================

#[test]
fn test_relative_paths() {
    let (window, _, history) = setup("https://example.com/");
    history.push(UpdateParams::new().path("/a/b")).unwrap();
    history.push(UpdateParams::new().path("./c")).unwrap();
    assert_eq!(window.pathname(), "/a/c");
    history.push(UpdateParams::new().path("../x")).unwrap();
    assert_eq!(window.pathname(), "/x");
}

#[test]
fn test_base_path() {
    let config = HistoryConfig {
        base_path: "/d".into(),
        ..HistoryConfig::default()
    };
    let (window, _, history) = setup_with("https://example.com/d/a", config);
    assert_eq!(history.params().unwrap().path, "/a");

    history.push(UpdateParams::new().path("/b")).unwrap();
    assert_eq!(window.pathname(), "/d/b");
    assert_eq!(history.params().unwrap().path, "/b");

    history.push(UpdateParams::new().path("/")).unwrap();
    assert_eq!(window.pathname(), "/d/");
    assert_eq!(history.params().unwrap().path, "/");
}

// ============================================================================
// Reserved keys and native calls
// ============================================================================

#[test]
fn test_reserved_keys_rejected() {
    let (window, _, history) = setup("https://example.com/");
    let length = window.history_length();

    let err = history
        .push(UpdateParams::new().data(json!({"$key": "x"})))
        .unwrap_err();
    assert_eq!(err, GemError::ReservedKey("$key".into()));

    let err = history
        .push(UpdateParams::new().data(json!({"$hasCloseHandle": true})))
        .unwrap_err();
    assert_eq!(err, GemError::ReservedKey("$hasCloseHandle".into()));
    assert!(err.is_configuration());
    assert_eq!(window.history_length(), length);

    history
        .push(UpdateParams::new().data(json!({"$hasOpenHandle": false})))
        .unwrap();
}

#[test]
fn test_native_push_is_intercepted() {
    let (window, _, history) = setup("https://example.com/");
    let length = window.history_length();

    window
        .push_state(Some(json!({"page": 2})), "Nested", "/nested?x=1#top")
        .unwrap();
    assert_eq!(window.history_length(), length + 1);
    let state = window.history_state().unwrap();
    assert_eq!(state["page"], json!(2));
    assert_eq!(state["$key"], json!(history.current_key()));

    let params = history.params().unwrap();
    assert_eq!(params.path, "/nested");
    assert_eq!(params.title, "Nested");
    assert_eq!(params.query.get("x"), Some("1"));
    assert_eq!(params.hash, "#top");
}

#[test]
fn test_native_reserved_key_fails_fast() {
    let (window, _, _history) = setup("https://example.com/");
    let err = window
        .push_state(Some(json!({"$key": "forged"})), "", "/x")
        .unwrap_err();
    assert_eq!(err, GemError::ReservedKey("$key".into()));
    assert_eq!(window.pathname(), "/");
}

#[test]
fn test_native_replace_with_current_state_keeps_key() {
    let (window, _, history) = setup("https://example.com/");
    let key = history.current_key();
    window
        .replace_state(window.history_state(), "", "/same")
        .unwrap();
    assert_eq!(history.current_key(), key);
    assert_eq!(window.pathname(), "/same");
}

#[test]
fn test_native_cross_origin_leaves_manager_untouched() {
    let (window, _, history) = setup("https://example.com/");
    let key = history.current_key();
    let length = window.history_length();

    let err = window
        .push_state(None, "", "https://other.example/x")
        .unwrap_err();
    assert!(matches!(err, GemError::InvalidUrl(_)));
    assert_eq!(history.current_key(), key);
    assert_eq!(history.store().get().key, key);
    assert_eq!(history.params().unwrap().path, "/");
    assert_eq!(window.history_length(), length);
}

#[test]
fn test_native_push_under_base_path() {
    let config = HistoryConfig {
        base_path: "/app".into(),
        ..HistoryConfig::default()
    };
    let (window, _, history) = setup_with("https://example.com/app/", config);
    window.push_state(None, "", "/inner").unwrap();
    assert_eq!(window.pathname(), "/app/inner");
    assert_eq!(history.params().unwrap().path, "/inner");
}

// ============================================================================
// Reload
// ============================================================================

#[test]
fn test_reload_reconstructs_params() {
    let window = Window::new("https://example.com/").unwrap();
    let scheduler = Scheduler::new();
    let history = HistoryManager::install(&window, &scheduler, HistoryConfig::default()).unwrap();
    history.push(UpdateParams::new().path("/a").title("A")).unwrap();
    let key = history.current_key();
    drop(history);

    window.reload();
    let history = HistoryManager::install(&window, &scheduler, HistoryConfig::default()).unwrap();
    assert_eq!(history.current_key(), key);
    assert_eq!(history.params().unwrap().path, "/a");

    history.push(UpdateParams::new().path("/b")).unwrap();
    assert!(history.current_key().parse::<u64>().unwrap() > key.parse::<u64>().unwrap());
}

#[test]
fn test_reload_on_modal_goes_back() {
    let window = Window::new("https://example.com/").unwrap();
    let scheduler = Scheduler::new();
    let history = HistoryManager::install(&window, &scheduler, HistoryConfig::default()).unwrap();
    history.push(UpdateParams::new().path("/a")).unwrap();
    let key_a = history.current_key();
    history
        .push(UpdateParams::new().path("/modal").close(|| {}))
        .unwrap();
    drop(history);

    window.reload();
    let history = HistoryManager::install(&window, &scheduler, HistoryConfig::default()).unwrap();
    assert_eq!(window.pending_traversals(), 1);
    window.run_tasks();
    assert_eq!(window.pathname(), "/a");
    assert_eq!(history.current_key(), key_a);
}

#[test]
fn test_reload_on_nested_modal_skips_both() {
    let window = Window::new("https://example.com/").unwrap();
    let scheduler = Scheduler::new();
    let history = HistoryManager::install(&window, &scheduler, HistoryConfig::default()).unwrap();
    let initial = history.current_key();
    history
        .push(UpdateParams::new().path("/m1").close(|| {}))
        .unwrap();
    history
        .push(UpdateParams::new().path("/m2").close(|| {}))
        .unwrap();
    drop(history);

    window.reload();
    let history = HistoryManager::install(&window, &scheduler, HistoryConfig::default()).unwrap();
    window.run_tasks();
    assert_eq!(window.pathname(), "/");
    assert_eq!(history.current_key(), initial);
}

#[test]
fn test_install_over_out_of_range_key() {
    let window = Window::new("https://example.com/x").unwrap();
    window
        .replace_state(Some(json!({"$key": "100000000000000000000000"})), "", "/x")
        .unwrap();
    let scheduler = Scheduler::new();
    let history = HistoryManager::install(&window, &scheduler, HistoryConfig::default()).unwrap();

    let first = history.current_key();
    assert_ne!(first, "100000000000000000000000");
    assert_eq!(window.history_state().unwrap()["$key"], json!(first));

    history.push(UpdateParams::new().path("/y")).unwrap();
    let second = history.current_key();
    assert!(second.parse::<u64>().unwrap() > first.parse::<u64>().unwrap());

    history.back();
    window.run_tasks();
    assert_eq!(history.current_key(), first);
    assert_eq!(window.pathname(), "/x");
}

// ============================================================================
// Title store
// ============================================================================

#[test]
fn test_title_store_follows_entries() {
    let window = Window::new("https://example.com/").unwrap();
    window.set_title("Site");
    let scheduler = Scheduler::new();
    let history = HistoryManager::install(&window, &scheduler, HistoryConfig::default()).unwrap();

    history.push(UpdateParams::new().path("/a").title("A")).unwrap();
    scheduler.run_microtasks();
    assert_eq!(history.title_store().get().title, "A");
    assert_eq!(window.title(), "A");

    history.title_store().update(|titles| titles.title = "Renamed".into());
    scheduler.run_microtasks();
    assert_eq!(history.params().unwrap().title, "Renamed");
    assert_eq!(window.title(), "Renamed");

    history.push(UpdateParams::new().path("/b")).unwrap();
    scheduler.run_microtasks();
    assert_eq!(history.title_store().get().title, "");
    assert_eq!(window.title(), "Site");
}

// ============================================================================
// Property tests
// ============================================================================

proptest! {
    #[test]
    fn prop_base_path_mapping_is_inverse(
        base in "(/[a-z]{1,5}){0,2}",
        path in "/([a-z0-9]{1,4}/?){0,3}",
    ) {
        prop_assert_eq!(strip_base_path(&base, &apply_base_path(&base, &path)), path);
    }
}
