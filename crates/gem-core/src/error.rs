//! Error taxonomy
//!
//! Configuration errors are programmer mistakes and surface at the call
//! site. Render errors come out of `render` or lifecycle hooks and travel
//! to whoever drives the update cycle, usually the microtask checkpoint.

/// Errors raised by the runtime, the history manager and the router
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GemError {
    /// `set_state` on an element that never declared state
    #[error("gem: `set_state` requires a declared state")]
    StateNotInitialized,

    /// `set_state` with a different type than the declared state
    #[error("gem: state type does not match the declared state")]
    StateMismatch,

    /// History data uses a key reserved by the history manager
    #[error("gem: `{0}` is not allowed")]
    ReservedKey(String),

    /// Element connected outside of its required root element
    #[error("gem: <{tag}> must be rendered in <{expected}>, found {found}")]
    RootElement {
        tag: String,
        expected: String,
        found: String,
    },

    /// Custom element name fails validation
    #[error("gem: invalid custom element name `{0}`")]
    InvalidElementName(String),

    /// Access to a field the element class never declared
    #[error("gem: `{name}` is not a declared {kind}")]
    Undeclared { kind: &'static str, name: String },

    /// URL could not be parsed or resolved
    #[error("gem: invalid url: {0}")]
    InvalidUrl(String),

    /// History state is not a JSON object or could not be encoded
    #[error("gem: invalid history state: {0}")]
    InvalidState(String),

    /// Route pattern could not be compiled
    #[error("gem: invalid route pattern: {0}")]
    InvalidPattern(String),

    /// Error thrown from `render` or a lifecycle hook
    #[error("gem: render failed: {0}")]
    Render(String),
}

impl GemError {
    /// Shorthand for a render-phase error
    pub fn render(message: impl Into<String>) -> Self {
        Self::Render(message.into())
    }

    /// Whether this is a configuration error (fatal to the call)
    pub fn is_configuration(&self) -> bool {
        !matches!(self, Self::Render(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_prefixed() {
        assert_eq!(
            GemError::ReservedKey("$key".into()).to_string(),
            "gem: `$key` is not allowed"
        );
        assert!(GemError::StateNotInitialized.to_string().starts_with("gem: "));
    }

    #[test]
    fn test_taxonomy() {
        assert!(GemError::StateNotInitialized.is_configuration());
        assert!(!GemError::render("boom").is_configuration());
    }
}
