//! Name-based applicability of wrappers.

use std::collections::BTreeSet;

/// Decides whether a wrapper applies to an extension name.
///
/// With an empty `matches` set the wrapper applies to every name except
/// those in `mismatches`; otherwise it applies to `matches` minus
/// `mismatches`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WrapperPredicate {
    matches: BTreeSet<String>,
    mismatches: BTreeSet<String>,
}

impl WrapperPredicate {
    /// Predicate that applies to every name.
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to the given names (added to any existing inclusions).
    pub fn matching<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.matches.extend(names.into_iter().map(Into::into));
        self
    }

    /// Exclude the given names.
    pub fn excluding<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mismatches.extend(names.into_iter().map(Into::into));
        self
    }

    /// Whether the wrapper applies to `name`.
    pub fn applies(&self, name: &str) -> bool {
        (self.matches.is_empty() || self.matches.contains(name)) && !self.mismatches.contains(name)
    }

    /// Names the wrapper is restricted to (empty means all).
    pub fn matches(&self) -> &BTreeSet<String> {
        &self.matches
    }

    /// Names the wrapper never applies to.
    pub fn mismatches(&self) -> &BTreeSet<String> {
        &self.mismatches
    }
}
