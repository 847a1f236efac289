use std::fmt;

use crate::error::ResolveError;
use crate::names;

/// Class-name pattern with an optional single leading or trailing `*`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ClassPattern {
    /// Bare `*`.
    Any,
    /// `com.x.*`: classes whose name starts with the prefix.
    Prefix(String),
    /// `*Foo`: classes whose name ends with the suffix.
    Suffix(String),
    Exact(String),
}

impl ClassPattern {
    pub fn parse(pattern: &str) -> Result<Self, ResolveError> {
        let pattern = pattern.trim();
        if !names::is_class_pattern(pattern) {
            return Err(ResolveError::MalformedClassName(pattern.to_string()));
        }
        Ok(if pattern == "*" {
            ClassPattern::Any
        } else if let Some(suffix) = pattern.strip_prefix('*') {
            ClassPattern::Suffix(suffix.to_string())
        } else if let Some(prefix) = pattern.strip_suffix('*') {
            ClassPattern::Prefix(prefix.to_string())
        } else {
            ClassPattern::Exact(pattern.to_string())
        })
    }

    pub fn matches(&self, class_name: &str) -> bool {
        match self {
            ClassPattern::Any => true,
            ClassPattern::Prefix(prefix) => class_name.starts_with(prefix.as_str()),
            ClassPattern::Suffix(suffix) => class_name.ends_with(suffix.as_str()),
            ClassPattern::Exact(name) => class_name == name,
        }
    }

    /// Wildcard patterns must be checked against every loaded class; exact
    /// names can be looked up directly.
    pub fn is_wild(&self) -> bool {
        !matches!(self, ClassPattern::Exact(_))
    }

    /// Filter for the class-prepare request. `None` for a bare wildcard.
    pub fn prepare_filter(&self) -> Option<String> {
        match self {
            ClassPattern::Any => None,
            other => Some(other.to_string()),
        }
    }

    pub fn exact_name(&self) -> Option<&str> {
        match self {
            ClassPattern::Exact(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for ClassPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassPattern::Any => f.write_str("*"),
            ClassPattern::Prefix(prefix) => write!(f, "{prefix}*"),
            ClassPattern::Suffix(suffix) => write!(f, "*{suffix}"),
            ClassPattern::Exact(name) => f.write_str(name),
        }
    }
}
