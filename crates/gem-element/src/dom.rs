//! Host Model
//!
//! The slice of the DOM the runtime touches: rendering roots with their
//! adopted stylesheet list, constructable stylesheets and rendered content.

use serde::Serialize;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ROOT_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_SHEET_ID: AtomicU64 = AtomicU64::new(1);

/// Shadow root mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ShadowRootMode {
    #[default]
    Open,
    Closed,
}

/// Shadow root initialization options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct ShadowRootInit {
    pub mode: ShadowRootMode,
    pub delegates_focus: bool,
}

impl ShadowRootInit {
    pub fn closed() -> Self {
        Self {
            mode: ShadowRootMode::Closed,
            delegates_focus: false,
        }
    }
}

/// Rendered content produced by the template layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Template(String);

impl Template {
    pub fn new(content: impl Into<String>) -> Self {
        Self(content.into())
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Template {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Template {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Constructable stylesheet, compared by identity
#[derive(Clone)]
pub struct StyleSheet {
    inner: Rc<StyleSheetInner>,
}

struct StyleSheetInner {
    id: u64,
    css: RefCell<String>,
}

impl StyleSheet {
    pub fn new(css: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(StyleSheetInner {
                id: NEXT_SHEET_ID.fetch_add(1, Ordering::Relaxed),
                css: RefCell::new(css.into()),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn css(&self) -> String {
        self.inner.css.borrow().clone()
    }

    /// Replace the rules in place; every root adopting the sheet sees them
    pub fn replace_sync(&self, css: impl Into<String>) {
        *self.inner.css.borrow_mut() = css.into();
    }
}

impl PartialEq for StyleSheet {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for StyleSheet {}

impl fmt::Debug for StyleSheet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StyleSheet").field("id", &self.inner.id).finish()
    }
}

impl Serialize for StyleSheet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.inner.id)
    }
}

/// Root identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RootId(u64);

#[derive(Debug, Clone)]
enum RootKind {
    Document,
    Shadow { host: String, init: ShadowRootInit },
}

/// Document or shadow root
#[derive(Clone)]
pub struct RootNode {
    inner: Rc<RootInner>,
}

struct RootInner {
    id: RootId,
    kind: RootKind,
    adopted: RefCell<Vec<StyleSheet>>,
    content: RefCell<Option<Template>>,
}

impl RootNode {
    fn with_kind(kind: RootKind) -> Self {
        Self {
            inner: Rc::new(RootInner {
                id: RootId(NEXT_ROOT_ID.fetch_add(1, Ordering::Relaxed)),
                kind,
                adopted: RefCell::new(Vec::new()),
                content: RefCell::new(None),
            }),
        }
    }

    pub fn document() -> Self {
        Self::with_kind(RootKind::Document)
    }

    /// Shadow root attached to an element named `host`
    pub fn shadow(host: &str, init: ShadowRootInit) -> Self {
        Self::with_kind(RootKind::Shadow {
            host: host.to_string(),
            init,
        })
    }

    pub fn id(&self) -> RootId {
        self.inner.id
    }

    pub fn is_document(&self) -> bool {
        matches!(self.inner.kind, RootKind::Document)
    }

    /// Tag name of the shadow host, `None` for the document
    pub fn host_tag(&self) -> Option<&str> {
        match &self.inner.kind {
            RootKind::Document => None,
            RootKind::Shadow { host, .. } => Some(host),
        }
    }

    pub fn shadow_init(&self) -> Option<ShadowRootInit> {
        match &self.inner.kind {
            RootKind::Document => None,
            RootKind::Shadow { init, .. } => Some(*init),
        }
    }

    pub fn adopted_style_sheets(&self) -> Vec<StyleSheet> {
        self.inner.adopted.borrow().clone()
    }

    pub fn set_adopted_style_sheets(&self, sheets: Vec<StyleSheet>) {
        *self.inner.adopted.borrow_mut() = sheets;
    }

    pub fn is_adopted(&self, sheet: &StyleSheet) -> bool {
        self.inner.adopted.borrow().contains(sheet)
    }

    pub fn content(&self) -> Option<Template> {
        self.inner.content.borrow().clone()
    }

    pub fn set_content(&self, content: Template) {
        *self.inner.content.borrow_mut() = Some(content);
    }

    pub fn ptr_eq(&self, other: &RootNode) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for RootNode {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for RootNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootNode")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("adopted", &self.inner.adopted.borrow().len())
            .finish()
    }
}

/// Name of a root for diagnostics
pub(crate) fn describe_root(root: &RootNode) -> String {
    match root.host_tag() {
        Some(tag) => format!("<{tag}>"),
        None => "document".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stylesheet_identity() {
        let a = StyleSheet::new(":host { display: block }");
        let b = StyleSheet::new(":host { display: block }");
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        a.replace_sync("p {}");
        assert_eq!(a.clone().css(), "p {}");
    }

    #[test]
    fn test_root_kinds() {
        let doc = RootNode::document();
        assert!(doc.is_document());
        assert_eq!(doc.host_tag(), None);
        assert_eq!(describe_root(&doc), "document");

        let shadow = RootNode::shadow("gem-book", ShadowRootInit::closed());
        assert_eq!(shadow.host_tag(), Some("gem-book"));
        assert_eq!(shadow.shadow_init().map(|i| i.mode), Some(ShadowRootMode::Closed));
        assert_eq!(describe_root(&shadow), "<gem-book>");
        assert_ne!(doc.id(), shadow.id());
    }

    #[test]
    fn test_external_adoption() {
        let root = RootNode::document();
        let sheet = StyleSheet::new("");
        root.set_adopted_style_sheets(vec![sheet.clone()]);
        assert!(root.is_adopted(&sheet));
    }
}
