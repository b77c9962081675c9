//! History configuration

use serde::{Deserialize, Serialize};

/// History manager options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Prefix of every URL bar path, e.g. `/docs`
    pub base_path: String,

    /// Title shown when the current entry has none, defaults to the document title
    pub default_title: Option<String>,
}

impl HistoryConfig {
    /// Parse from JSON, missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json() {
        let config = HistoryConfig::from_json(r#"{ "base_path": "/docs" }"#).unwrap();
        assert_eq!(config.base_path, "/docs");
        assert_eq!(config.default_title, None);
        assert_eq!(HistoryConfig::from_json("{}").unwrap(), HistoryConfig::default());
    }
}
