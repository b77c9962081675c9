//! Path mapping
//!
//! Application code sees internal paths; the URL bar shows them behind the
//! base path. [`apply_base_path`] and [`strip_base_path`] are inverses for
//! every internal path, including `/`.

use gem_core::GemError;
use url::Url;

/// Origin used to resolve paths that carry no origin of their own
pub(crate) const LOCAL_ORIGIN: &str = "http://gem.local";

/// Canonical base path: empty, or a leading `/` without a trailing one
pub fn normalize_base_path(base: &str) -> String {
    let trimmed = base.trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Internal path to URL bar path
pub fn apply_base_path(base: &str, path: &str) -> String {
    if base.is_empty() {
        path.to_string()
    } else {
        format!("{base}{path}")
    }
}

/// URL bar path to internal path
pub fn strip_base_path(base: &str, url_path: &str) -> String {
    if base.is_empty() {
        return url_path.to_string();
    }
    if url_path == base {
        return "/".to_string();
    }
    match url_path.strip_prefix(base) {
        Some(rest) if rest.starts_with('/') => rest.to_string(),
        _ => url_path.to_string(),
    }
}

/// Resolve `relative` (`./a`, `../b`, `/c`) against `current`
pub fn resolve_path(current: &str, relative: &str) -> Result<String, GemError> {
    let base = Url::parse(LOCAL_ORIGIN)
        .and_then(|origin| origin.join(current))
        .map_err(|e| GemError::InvalidUrl(e.to_string()))?;
    let resolved = base
        .join(relative)
        .map_err(|e| GemError::InvalidUrl(format!("{relative}: {e}")))?;
    Ok(resolved.path().to_string())
}

/// Percent-decode, keeping the input when it is not valid UTF-8
pub fn decode(value: &str) -> String {
    urlencoding::decode(value)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| value.to_string())
}
