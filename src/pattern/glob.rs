//! Value matchers for pattern fields.
//!
//! | Pattern | Semantics |
//! |---------|-----------|
//! | `"*"` | matches everything |
//! | `"prefix*"` | prefix match |
//! | `"*suffix"` | suffix match |
//! | `"*contains*"` | contains match |
//! | `"a?c"`, `"v[0-9]*"` | general glob (via the `glob` crate) |
//! | `"exact"` | exact match |

/// Characters that turn a pattern value into a glob.
const GLOB_CHARS: &[char] = &['*', '?', '['];

/// A compiled matcher for a single pattern field value.
#[derive(Debug, Clone)]
pub enum ValueMatcher {
    /// Literal value, compared for equality
    Exact(String),
    /// `*`
    Any,
    /// `prefix*`
    Prefix(String),
    /// `*suffix`
    Suffix(String),
    /// `*contains*`
    Contains(String),
    /// Anything else containing glob syntax
    Glob(::glob::Pattern),
}

impl ValueMatcher {
    /// Compile a pattern value.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem when the value is not a valid glob.
    pub fn new(value: &str) -> Result<Self, String> {
        if !value.contains(GLOB_CHARS) {
            return Ok(Self::Exact(value.to_string()));
        }
        let collapsed = collapse_stars(value);
        let value = collapsed.as_str();
        if value == "*" {
            return Ok(Self::Any);
        }

        let starts_star = value.starts_with('*');
        let ends_star = value.ends_with('*');
        let inner = value.trim_matches('*');
        if !inner.contains(GLOB_CHARS) {
            match (starts_star, ends_star) {
                (true, true) if value.len() - inner.len() == 2 => {
                    return Ok(Self::Contains(inner.to_string()));
                }
                (true, false) if value.len() - inner.len() == 1 => {
                    return Ok(Self::Suffix(inner.to_string()));
                }
                (false, true) if value.len() - inner.len() == 1 => {
                    return Ok(Self::Prefix(inner.to_string()));
                }
                _ => {}
            }
        }

        ::glob::Pattern::new(value)
            .map(Self::Glob)
            .map_err(|e| format!("invalid glob '{value}': {e}"))
    }

    /// Returns `true` for literal (non-wildcard) values.
    #[must_use]
    pub fn is_exact(&self) -> bool {
        matches!(self, Self::Exact(_))
    }

    /// Test a value against this matcher.
    #[must_use]
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Self::Exact(e) => value == e,
            Self::Any => true,
            Self::Prefix(p) => value.starts_with(p.as_str()),
            Self::Suffix(s) => value.ends_with(s.as_str()),
            Self::Contains(c) => value.contains(c.as_str()),
            Self::Glob(p) => p.matches(value),
        }
    }
}

/// Replace every run of `*` with a single `*`.
fn collapse_stars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c != '*' || !out.ends_with('*') {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(s: &str) -> ValueMatcher {
        ValueMatcher::new(s).unwrap()
    }

    #[test]
    fn wildcard_matches_anything() {
        let p = m("*");
        assert!(p.matches("anything"));
        assert!(p.matches(""));
        assert!(matches!(m("**"), ValueMatcher::Any));
    }

    #[test]
    fn repeated_stars_behave_like_one() {
        assert!(matches!(m("**x"), ValueMatcher::Suffix(ref s) if s == "x"));
        assert!(m("**x").matches("abx"));
        assert!(matches!(m("a**b"), ValueMatcher::Glob(_)));
        assert!(m("a**b").matches("a/b"));
        assert!(m("v***?").matches("v12"));
    }

    #[test]
    fn exact_matches_only_exact() {
        let p = m("get");
        assert!(p.is_exact());
        assert!(p.matches("get"));
        assert!(!p.matches("get_all"));
    }

    #[test]
    fn prefix_suffix_contains() {
        assert!(matches!(m("get*"), ValueMatcher::Prefix(_)));
        assert!(m("get*").matches("get_user"));
        assert!(!m("get*").matches("forget"));

        assert!(matches!(m("*_write"), ValueMatcher::Suffix(_)));
        assert!(m("*_write").matches("db_write"));
        assert!(!m("*_write").matches("db_read"));

        assert!(matches!(m("*search*"), ValueMatcher::Contains(_)));
        assert!(m("*search*").matches("deep_search_tool"));
        assert!(!m("*search*").matches("news"));
    }

    #[test]
    fn general_globs_use_glob_semantics() {
        let p = m("v?.[0-9]");
        assert!(matches!(p, ValueMatcher::Glob(_)));
        assert!(p.matches("v1.2"));
        assert!(!p.matches("v1.x"));
        assert!(m("a*b*c").matches("aXbYc"));
        assert!(!p.is_exact());
    }

    #[test]
    fn invalid_glob_is_rejected() {
        assert!(ValueMatcher::new("[abc").is_err());
    }
}
