//! Type name patterns
//!
//! | Pattern      | Matches                                            |
//! |--------------|----------------------------------------------------|
//! | `basic.Foo`  | `basic.Foo` and its nested types (`basic.Foo$1`)   |
//! | `basic.*`    | types directly in `basic`, nested types included   |
//! | `basic..*`   | types in `basic` and every sub-package             |
//! | `*`          | everything                                         |

use crate::error::RegistryError;
use hotswap_unit::package_of;
use std::fmt;

/// A parsed name pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamePattern {
    /// `*`
    Any,
    /// A type name
    Exact(String),
    /// `pkg.*`
    Package(String),
    /// `pkg..*`
    Subtree(String),
}

impl NamePattern {
    /// Parse a pattern
    pub fn parse(pattern: &str) -> Result<Self, RegistryError> {
        let invalid = || RegistryError::InvalidPattern(pattern.to_string());

        if pattern == "*" {
            return Ok(NamePattern::Any);
        }
        let (prefix, ctor): (&str, fn(String) -> Self) = if let Some(prefix) = pattern.strip_suffix("..*") {
            (prefix, NamePattern::Subtree)
        } else if let Some(prefix) = pattern.strip_suffix(".*") {
            (prefix, NamePattern::Package)
        } else {
            (pattern, NamePattern::Exact)
        };

        let valid = !prefix.is_empty()
            && !prefix.contains('*')
            && !prefix.starts_with('.')
            && !prefix.ends_with('.')
            && !prefix.contains("..")
            && !prefix.chars().any(char::is_whitespace);
        if !valid {
            return Err(invalid());
        }
        Ok(ctor(prefix.to_string()))
    }

    /// Check whether a type name matches
    pub fn matches(&self, name: &str) -> bool {
        match self {
            NamePattern::Any => true,
            NamePattern::Exact(exact) => {
                name == exact
                    || name
                        .strip_prefix(exact.as_str())
                        .map_or(false, |rest| rest.starts_with('$'))
            }
            NamePattern::Package(package) => package_of(name) == package,
            NamePattern::Subtree(root) => {
                let package = package_of(name);
                package == root
                    || package
                        .strip_prefix(root.as_str())
                        .map_or(false, |rest| rest.starts_with('.'))
            }
        }
    }
}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamePattern::Any => f.write_str("*"),
            NamePattern::Exact(name) => f.write_str(name),
            NamePattern::Package(package) => write!(f, "{}.*", package),
            NamePattern::Subtree(root) => write!(f, "{}..*", root),
        }
    }
}
