// SPDX-License-Identifier: Apache-2.0

use std::fmt;

/// A dotted path from the root of a document, e.g. `"components.foo.command"`.
/// The empty keychain denotes the root itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keychain {
    components: Vec<String>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum KeychainError {
    #[error("keychain must not start with '.'")]
    LeadingDot,
    #[error("keychain must not end with '.'")]
    TrailingDot,
    #[error("keychain must not contain an empty component ('..')")]
    EmptyComponent,
}

impl Keychain {
    /// The root keychain (empty path).
    pub fn root() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    pub fn parse(s: &str) -> Result<Self, KeychainError> {
        if s.is_empty() {
            return Ok(Self::root());
        }
        if s.starts_with('.') {
            return Err(KeychainError::LeadingDot);
        }
        if s.ends_with('.') {
            return Err(KeychainError::TrailingDot);
        }
        let components: Vec<String> = s.split('.').map(str::to_string).collect();
        if components.iter().any(String::is_empty) {
            return Err(KeychainError::EmptyComponent);
        }
        Ok(Self { components })
    }

    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// All ancestor keychains from the root down through `self` (inclusive),
    /// shortest first. The number of ancestors equals `self.len()` unless
    /// `self` is the root, in which case there is exactly one: the root.
    pub fn ancestors_inclusive(&self) -> Vec<Keychain> {
        if self.is_root() {
            return vec![Keychain::root()];
        }
        (1..=self.components.len())
            .map(|n| Keychain {
                components: self.components[..n].to_vec(),
            })
            .collect()
    }

    /// The keychain for the first `n` components, or `self` if `n >= len()`.
    pub fn prefix(&self, n: usize) -> Keychain {
        let n = n.min(self.components.len());
        Keychain {
            components: self.components[..n].to_vec(),
        }
    }
}

impl fmt::Display for Keychain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.components.join("."))
    }
}

impl std::str::FromStr for Keychain {
    type Err = KeychainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Keychain::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_root() {
        let k = Keychain::parse("").unwrap();
        assert!(k.is_root());
    }

    #[test]
    fn leading_dot_is_rejected() {
        assert_eq!(Keychain::parse(".a.b"), Err(KeychainError::LeadingDot));
    }

    #[test]
    fn trailing_dot_is_rejected() {
        assert_eq!(Keychain::parse("a.b."), Err(KeychainError::TrailingDot));
    }

    #[test]
    fn double_dot_is_rejected() {
        assert_eq!(Keychain::parse("a..b"), Err(KeychainError::EmptyComponent));
    }

    #[test]
    fn ancestors_inclusive_covers_every_prefix() {
        let k = Keychain::parse("a.b.c").unwrap();
        let ancestors = k.ancestors_inclusive();
        let rendered: Vec<String> = ancestors.iter().map(Keychain::to_string).collect();
        assert_eq!(rendered, vec!["a", "a.b", "a.b.c"]);
    }

    #[test]
    fn root_ancestors_inclusive_is_itself() {
        let k = Keychain::root();
        assert_eq!(k.ancestors_inclusive().len(), 1);
    }
}
