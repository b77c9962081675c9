//! Route tables

use crate::pattern::{Params, PathPattern, create_path};
use gem_core::GemError;
use gem_element::Template;
use gem_history::UpdateParams;
use serde_json::Value;
use std::fmt;
use std::rc::Rc;

/// Pattern of the fallback route
pub const DEFAULT_PATTERN: &str = "*";

type ContentFn = Rc<dyn Fn(&Params) -> Template>;

/// One route
#[derive(Clone)]
pub struct RouteItem {
    pub pattern: String,
    /// Pattern to replace the current entry with, filled from the match
    pub redirect: Option<String>,
    pub title: Option<String>,
    pub content: Option<Template>,
    /// Builds the content from the captured parameters
    pub content_fn: Option<ContentFn>,
    pub data: Option<Value>,
}

impl fmt::Debug for RouteItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteItem")
            .field("pattern", &self.pattern)
            .field("redirect", &self.redirect)
            .field("title", &self.title)
            .field("content", &self.content)
            .field("content_fn", &self.content_fn.is_some())
            .finish()
    }
}

impl RouteItem {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            redirect: None,
            title: None,
            content: None,
            content_fn: None,
            data: None,
        }
    }

    pub fn redirect(mut self, target: impl Into<String>) -> Self {
        self.redirect = Some(target.into());
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn content(mut self, content: impl Into<Template>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn content_fn(mut self, f: impl Fn(&Params) -> Template + 'static) -> Self {
        self.content_fn = Some(Rc::new(f));
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Content for a match with `params`
    pub fn render(&self, params: &Params) -> Template {
        match (&self.content, &self.content_fn) {
            (Some(content), _) => content.clone(),
            (None, Some(f)) => f(params),
            (None, None) => Template::empty(),
        }
    }

    /// Path of this route filled with `params`, without the base path
    pub fn path(&self, params: &Params) -> String {
        create_path(&self.pattern, params)
    }

    /// History parameters navigating to this route
    pub fn history_params(&self, params: &Params) -> UpdateParams {
        let update = UpdateParams::new().path(self.path(params));
        match &self.title {
            Some(title) => update.title(title.clone()),
            None => update,
        }
    }
}

/// Result of [`RouteTable::find`]
#[derive(Debug, Clone, Default)]
pub struct RouteMatch {
    /// Matched route, or the fallback route, or nothing
    pub route: Option<Rc<RouteItem>>,
    pub params: Params,
}

impl RouteMatch {
    pub fn pattern(&self) -> Option<&str> {
        self.route.as_deref().map(|route| route.pattern.as_str())
    }
}

/// Ordered routes with compiled patterns
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<(Rc<RouteItem>, Option<PathPattern>)>,
}

impl RouteTable {
    pub fn new(routes: impl IntoIterator<Item = RouteItem>) -> Result<Self, GemError> {
        let routes = routes
            .into_iter()
            .map(|route| {
                let pattern = if route.pattern == DEFAULT_PATTERN {
                    None
                } else {
                    Some(PathPattern::new(&route.pattern)?)
                };
                Ok((Rc::new(route), pattern))
            })
            .collect::<Result<Vec<_>, GemError>>()?;
        Ok(Self { routes })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// First route matching `path`, else the last `*` route
    pub fn find(&self, path: &str) -> RouteMatch {
        let mut fallback = None;
        for (route, pattern) in &self.routes {
            match pattern {
                None => fallback = Some(route.clone()),
                Some(pattern) => {
                    if let Some(params) = pattern.matches(path) {
                        return RouteMatch {
                            route: Some(route.clone()),
                            params,
                        };
                    }
                }
            }
        }
        RouteMatch {
            route: fallback,
            params: Params::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RouteTable {
        RouteTable::new([
            RouteItem::new("*").content("not found"),
            RouteItem::new("/").content("home"),
            RouteItem::new("/users/:id").title("User").content_fn(|params| {
                Template::new(format!("user {}", params["id"]))
            }),
            RouteItem::new("/old/:id").redirect("/users/:id"),
        ])
        .unwrap()
    }

    #[test]
    fn test_first_match_wins() {
        let table = table();
        let found = table.find("/users/7");
        assert_eq!(found.pattern(), Some("/users/:id"));
        assert_eq!(found.params["id"], "7");
        assert_eq!(found.route.unwrap().render(&found.params).as_str(), "user 7");
    }

    #[test]
    fn test_fallback_route() {
        let found = table().find("/missing");
        assert_eq!(found.pattern(), Some("*"));
        assert!(found.params.is_empty());
        assert!(RouteTable::default().find("/").route.is_none());
    }

    #[test]
    fn test_redirect_target_path() {
        let found = table().find("/old/3");
        let route = found.route.unwrap();
        let target = RouteItem::new(route.redirect.clone().unwrap());
        assert_eq!(target.path(&found.params), "/users/3");
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        assert!(RouteTable::new([RouteItem::new("/:a/:a")]).is_err());
    }
}
