//! Path patterns
//!
//! `/users/:id` matches one segment per named parameter, `*` matches any
//! remainder and is reported under `0`, `1`, ... Matching is case-sensitive,
//! and a pattern ending with `/` also matches the path without it.

use gem_core::GemError;
use regex::Regex;
use std::collections::BTreeMap;

/// Parameters captured by a match
pub type Params = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token<'a> {
    Literal(&'a str),
    Param(&'a str),
    Wildcard,
}

fn tokenize(pattern: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut literal_start = 0;
    let mut rest = pattern.char_indices().peekable();

    while let Some((index, c)) = rest.next() {
        match c {
            '*' => {
                if literal_start < index {
                    tokens.push(Token::Literal(&pattern[literal_start..index]));
                }
                tokens.push(Token::Wildcard);
                literal_start = index + 1;
            }
            ':' => {
                let name_start = index + 1;
                let mut name_end = name_start;
                while let Some(&(next, ch)) = rest.peek() {
                    if !(ch.is_ascii_alphanumeric() || ch == '_') {
                        break;
                    }
                    name_end = next + ch.len_utf8();
                    rest.next();
                }
                if name_end == name_start {
                    // A lone `:` is literal
                    continue;
                }
                if literal_start < index {
                    tokens.push(Token::Literal(&pattern[literal_start..index]));
                }
                tokens.push(Token::Param(&pattern[name_start..name_end]));
                literal_start = name_end;
            }
            _ => {}
        }
    }
    if literal_start < pattern.len() {
        tokens.push(Token::Literal(&pattern[literal_start..]));
    }
    tokens
}

/// Compiled path pattern
#[derive(Debug, Clone)]
pub struct PathPattern {
    source: String,
    regex: Regex,
}

impl PathPattern {
    pub fn new(pattern: &str) -> Result<Self, GemError> {
        let mut expr = String::from("^");
        let mut wildcards = 0;
        for token in tokenize(pattern) {
            match token {
                Token::Literal(text) => expr.push_str(&regex::escape(text)),
                Token::Param(name) => expr.push_str(&format!("(?P<p_{name}>[^/]+)")),
                Token::Wildcard => {
                    expr.push_str(&format!("(?P<w{wildcards}>.*)"));
                    wildcards += 1;
                }
            }
        }
        expr.push('$');
        let regex = Regex::new(&expr).map_err(|e| GemError::InvalidPattern(format!("{pattern}: {e}")))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Captured parameters, `None` when `path` does not match
    pub fn matches(&self, path: &str) -> Option<Params> {
        let slashed = format!("{path}/");
        let captures = self
            .regex
            .captures(path)
            .or_else(|| self.regex.captures(&slashed))?;
        let params = self
            .regex
            .capture_names()
            .flatten()
            .filter_map(|group| {
                let value = captures.name(group)?.as_str().to_string();
                let name = group
                    .strip_prefix("p_")
                    .or_else(|| group.strip_prefix('w'))
                    .unwrap_or(group);
                Some((name.to_string(), value))
            })
            .collect();
        Some(params)
    }
}

/// Match `path` against `pattern`
pub fn match_path(pattern: &str, path: &str) -> Result<Option<Params>, GemError> {
    Ok(PathPattern::new(pattern)?.matches(path))
}

/// Fill `pattern` with `params`; wildcards take `0`, `1`, ... and unknown
/// parameters stay as written
pub fn create_path(pattern: &str, params: &Params) -> String {
    let mut path = String::new();
    let mut wildcards = 0;
    for token in tokenize(pattern) {
        match token {
            Token::Literal(text) => path.push_str(text),
            Token::Param(name) => match params.get(name) {
                Some(value) => path.push_str(value),
                None => {
                    path.push(':');
                    path.push_str(name);
                }
            },
            Token::Wildcard => {
                let name = wildcards.to_string();
                wildcards += 1;
                match params.get(&name) {
                    Some(value) => path.push_str(value),
                    None => {
                        path.push(':');
                        path.push_str(&name);
                    }
                }
            }
        }
    }
    path
}
