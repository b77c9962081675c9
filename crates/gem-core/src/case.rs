//! Field name <-> DOM name conversion

/// `appTitle` -> `app-title`
pub fn camel_to_kebab_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// `app-title` -> `appTitle`
pub fn kebab_to_camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut chars = name.chars();
    while let Some(c) = chars.next() {
        if c == '-' {
            match chars.next() {
                Some(next) => out.push(next.to_ascii_uppercase()),
                None => out.push('-'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camel_to_kebab() {
        assert_eq!(camel_to_kebab_case("appTitle"), "app-title");
        assert_eq!(camel_to_kebab_case("openHandleX"), "open-handle-x");
        assert_eq!(camel_to_kebab_case("plain"), "plain");
    }

    #[test]
    fn test_kebab_to_camel() {
        assert_eq!(kebab_to_camel_case("app-title"), "appTitle");
        assert_eq!(kebab_to_camel_case("plain"), "plain");
        assert_eq!(kebab_to_camel_case("trailing-"), "trailing-");
    }
}
