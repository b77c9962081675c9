//! Query strings
//!
//! Ordered key/value pairs with `application/x-www-form-urlencoded`
//! encoding. Values that are not strings travel as JSON.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use url::form_urlencoded;

/// Query string of a history entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryString {
    pairs: Vec<(String, String)>,
}

impl QueryString {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `?a=1&b=2` or `a=1&b=2`
    pub fn parse(input: &str) -> Self {
        let input = input.strip_prefix('?').unwrap_or(input);
        Self {
            pairs: form_urlencoded::parse(input.as_bytes()).into_owned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn has(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    /// Replace the first `key` in place and drop the others
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.pairs.iter().position(|(k, _)| k == key) {
            Some(first) => {
                self.pairs[first].1 = value;
                let mut index = 0;
                self.pairs.retain(|(k, _)| {
                    let keep = k != key || index == first;
                    index += 1;
                    keep
                });
            }
            None => self.pairs.push((key.to_string(), value)),
        }
    }

    pub fn append(&mut self, key: &str, value: impl Into<String>) {
        self.pairs.push((key.to_string(), value.into()));
    }

    pub fn delete(&mut self, key: &str) {
        self.pairs.retain(|(k, _)| k != key);
    }

    /// Store any serializable value; arrays become repeated keys and an
    /// empty value removes the key
    pub fn set_any<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> serde_json::Result<()> {
        match serde_json::to_value(value)? {
            Value::Array(items) => {
                self.delete(key);
                for item in &items {
                    self.append(key, stringify(item));
                }
            }
            other => {
                let encoded = stringify(&other);
                if encoded.is_empty() {
                    self.delete(key);
                } else {
                    self.set(key, encoded);
                }
            }
        }
        Ok(())
    }

    /// First non-empty value of `key` decoded from JSON
    pub fn get_any<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_any_all(key).into_iter().next()
    }

    /// Every non-empty value of `key` that decodes as `T`
    pub fn get_any_all<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        self.get_all(key)
            .into_iter()
            .filter(|v| !v.is_empty())
            .filter_map(|v| serde_json::from_str(v).ok())
            .collect()
    }

    /// Append every pair of `other`
    pub fn concat(&mut self, other: &QueryString) {
        self.pairs.extend(other.pairs.iter().cloned());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl fmt::Display for QueryString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.pairs.is_empty() {
            return Ok(());
        }
        let encoded = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(&self.pairs)
            .finish();
        write!(f, "?{encoded}")
    }
}

impl From<&str> for QueryString {
    fn from(input: &str) -> Self {
        Self::parse(input)
    }
}

impl From<String> for QueryString {
    fn from(input: String) -> Self {
        Self::parse(&input)
    }
}

impl Serialize for QueryString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for QueryString {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let query = QueryString::parse("?a=1&b=hello%20world");
        assert_eq!(query.get("a"), Some("1"));
        assert_eq!(query.get("b"), Some("hello world"));
        assert_eq!(query.to_string(), "?a=1&b=hello+world");
        assert_eq!(QueryString::new().to_string(), "");
        assert_eq!(QueryString::parse("?").to_string(), "");
    }

    #[test]
    fn test_set_replaces_first_and_drops_rest() {
        let mut query = QueryString::parse("a=1&b=2&a=3");
        query.set("a", "x");
        assert_eq!(query.to_string(), "?a=x&b=2");
        query.set("c", "y");
        assert_eq!(query.to_string(), "?a=x&b=2&c=y");
    }

    #[test]
    fn test_any_values() {
        let mut query = QueryString::new();
        query.set_any("page", &2).unwrap();
        query.set_any("tags", &["a", "b"]).unwrap();
        query.set_any("filter", &serde_json::json!({"open": true})).unwrap();
        assert_eq!(query.get_any::<u32>("page"), Some(2));
        assert_eq!(query.get_all("tags"), vec!["a", "b"]);
        assert_eq!(
            query.get_any::<serde_json::Value>("filter"),
            Some(serde_json::json!({"open": true}))
        );
        query.set_any("page", "").unwrap();
        assert!(!query.has("page"));
    }

    #[test]
    fn test_concat() {
        let mut query = QueryString::parse("a=1");
        query.concat(&QueryString::parse("b=2&a=3"));
        assert_eq!(query.get_all("a"), vec!["1", "3"]);
    }
}
