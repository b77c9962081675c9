//! Shared Stylesheet Adoption
//!
//! Every rendering root keeps a reference count per adopted sheet. Counts
//! change synchronously; the root's adopted list is rewritten once per
//! checkpoint by a deduplicated microtask.

use crate::dom::{RootId, RootNode, StyleSheet};
use gem_core::{Callback, Scheduler, TaskResult};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

#[derive(Debug)]
struct SheetEntry {
    sheet: StyleSheet,
    count: usize,
    /// Registration that first adopted the sheet
    generation: u64,
    index: usize,
}

struct RootSheets {
    root: RootNode,
    entries: Vec<SheetEntry>,
    /// Managed sheets written by the last recompute
    written: Vec<StyleSheet>,
    recompute: Callback,
}

/// Per-root reference counted stylesheet registry
#[derive(Clone)]
pub struct StyleRegistry {
    inner: Rc<StyleRegistryInner>,
}

struct StyleRegistryInner {
    scheduler: Scheduler,
    roots: RefCell<HashMap<RootId, RootSheets>>,
    generation: Cell<u64>,
    recomputations: Cell<usize>,
}

impl fmt::Debug for StyleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StyleRegistry")
            .field("roots", &self.inner.roots.borrow().len())
            .finish()
    }
}

impl StyleRegistry {
    pub fn new(scheduler: &Scheduler) -> Self {
        Self {
            inner: Rc::new(StyleRegistryInner {
                scheduler: scheduler.clone(),
                roots: RefCell::new(HashMap::new()),
                generation: Cell::new(0),
                recomputations: Cell::new(0),
            }),
        }
    }

    /// Count one more user of each sheet on `root`.
    ///
    /// The adopted list is rewritten at the next checkpoint: live sheets,
    /// newest registration first, then sheets adopted by other code.
    pub fn apply(&self, root: &RootNode, sheets: &[StyleSheet]) -> StyleDisposer {
        let generation = self.inner.generation.get() + 1;
        self.inner.generation.set(generation);

        let recompute = {
            let mut roots = self.inner.roots.borrow_mut();
            let state = roots.entry(root.id()).or_insert_with(|| RootSheets {
                root: root.clone(),
                entries: Vec::new(),
                written: Vec::new(),
                recompute: recompute_task(Rc::downgrade(&self.inner), root.id()),
            });
            for (index, sheet) in sheets.iter().enumerate() {
                match state.entries.iter_mut().find(|e| e.sheet == *sheet) {
                    Some(entry) => entry.count += 1,
                    None => state.entries.push(SheetEntry {
                        sheet: sheet.clone(),
                        count: 1,
                        generation,
                        index,
                    }),
                }
            }
            state.recompute.clone()
        };
        self.inner.scheduler.add_microtask(recompute);

        StyleDisposer {
            registry: Rc::downgrade(&self.inner),
            root: root.id(),
            sheets: sheets.to_vec(),
        }
    }

    /// Current count of `sheet` on `root`
    pub fn ref_count(&self, root: &RootNode, sheet: &StyleSheet) -> usize {
        self.inner
            .roots
            .borrow()
            .get(&root.id())
            .and_then(|state| state.entries.iter().find(|e| e.sheet == *sheet))
            .map_or(0, |entry| entry.count)
    }

    /// Number of adopted-list rewrites so far
    pub fn recomputations(&self) -> usize {
        self.inner.recomputations.get()
    }
}

fn recompute_task(registry: Weak<StyleRegistryInner>, root: RootId) -> Callback {
    Callback::new(move || match registry.upgrade() {
        Some(inner) => inner.recompute(root),
        None => Ok(()),
    })
}

impl StyleRegistryInner {
    fn release(&self, root: RootId, sheets: &[StyleSheet]) {
        let recompute = {
            let mut roots = self.roots.borrow_mut();
            let Some(state) = roots.get_mut(&root) else {
                return;
            };
            for sheet in sheets {
                if let Some(entry) = state.entries.iter_mut().find(|e| e.sheet == *sheet) {
                    entry.count = entry.count.saturating_sub(1);
                }
            }
            state.recompute.clone()
        };
        // Zero-count sheets stay listed until the recompute
        self.scheduler.add_microtask(recompute);
    }

    fn recompute(&self, root: RootId) -> TaskResult {
        self.recomputations.set(self.recomputations.get() + 1);
        let mut roots = self.roots.borrow_mut();
        let Some(state) = roots.get_mut(&root) else {
            return Ok(());
        };

        state.entries.retain(|entry| entry.count > 0);
        let mut live: Vec<&SheetEntry> = state.entries.iter().collect();
        live.sort_by(|a, b| {
            b.generation
                .cmp(&a.generation)
                .then(a.index.cmp(&b.index))
        });
        let managed: Vec<StyleSheet> = live.iter().map(|entry| entry.sheet.clone()).collect();

        let external: Vec<StyleSheet> = state
            .root
            .adopted_style_sheets()
            .into_iter()
            .filter(|sheet| !state.written.contains(sheet) && !managed.contains(sheet))
            .collect();

        let mut adopted = managed.clone();
        adopted.extend(external);
        tracing::trace!(
            managed = managed.len(),
            total = adopted.len(),
            "recomputed adopted stylesheets"
        );
        state.root.set_adopted_style_sheets(adopted);
        state.written = managed;

        if state.entries.is_empty() {
            roots.remove(&root);
        }
        Ok(())
    }
}

/// Releases the sheets counted by [`StyleRegistry::apply`]
#[must_use = "dropping the disposer keeps the sheets adopted"]
pub struct StyleDisposer {
    registry: Weak<StyleRegistryInner>,
    root: RootId,
    sheets: Vec<StyleSheet>,
}

impl StyleDisposer {
    pub fn dispose(self) {
        if let Some(inner) = self.registry.upgrade() {
            inner.release(self.root, &self.sheets);
        }
    }
}

impl fmt::Debug for StyleDisposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StyleDisposer")
            .field("root", &self.root)
            .field("sheets", &self.sheets.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adoption_is_deferred() {
        let scheduler = Scheduler::new();
        let styles = StyleRegistry::new(&scheduler);
        let root = RootNode::document();
        let sheet = StyleSheet::new("a {}");

        let disposer = styles.apply(&root, &[sheet.clone()]);
        assert!(!root.is_adopted(&sheet));
        scheduler.run_microtasks();
        assert!(root.is_adopted(&sheet));

        disposer.dispose();
        assert!(root.is_adopted(&sheet));
        scheduler.run_microtasks();
        assert!(!root.is_adopted(&sheet));
    }

    #[test]
    fn test_one_recompute_per_root_per_checkpoint() {
        let scheduler = Scheduler::new();
        let styles = StyleRegistry::new(&scheduler);
        let root = RootNode::document();
        let sheet = StyleSheet::new("");
        let disposers: Vec<_> = (0..10).map(|_| styles.apply(&root, &[sheet.clone()])).collect();
        scheduler.run_microtasks();
        assert_eq!(styles.recomputations(), 1);
        assert_eq!(styles.ref_count(&root, &sheet), 10);
        assert_eq!(root.adopted_style_sheets().len(), 1);
        drop(disposers);
    }

    #[test]
    fn test_later_registration_sorts_first_then_external() {
        let scheduler = Scheduler::new();
        let styles = StyleRegistry::new(&scheduler);
        let root = RootNode::document();
        let external = StyleSheet::new("external");
        root.set_adopted_style_sheets(vec![external.clone()]);

        let base = StyleSheet::new("base");
        let theme = StyleSheet::new("theme");
        let outer = StyleSheet::new("outer");
        let _a = styles.apply(&root, &[base.clone(), theme.clone()]);
        let _b = styles.apply(&root, &[outer.clone()]);
        scheduler.run_microtasks();

        assert_eq!(root.adopted_style_sheets(), vec![outer, base, theme, external]);
    }

    #[test]
    fn test_churn_within_turn_keeps_sheet() {
        let scheduler = Scheduler::new();
        let styles = StyleRegistry::new(&scheduler);
        let root = RootNode::document();
        let sheet = StyleSheet::new("");
        let first = styles.apply(&root, &[sheet.clone()]);
        scheduler.run_microtasks();

        first.dispose();
        let _second = styles.apply(&root, &[sheet.clone()]);
        scheduler.run_microtasks();
        assert!(root.is_adopted(&sheet));
        assert_eq!(styles.ref_count(&root, &sheet), 1);
    }
}
