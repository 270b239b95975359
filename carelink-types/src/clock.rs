//! Logical clocks and knowledge vectors.
//!
//! A [`LogicalClock`] is the causal stamp a scope assigns when it accepts a
//! write. Clocks are only ever compared; they are never added or subtracted.
//!
//! A [`KnowledgeVector`] is a store's accumulated view of every scope's
//! clock, used to select changes newer than a caller's last sync point.

use crate::ScopeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Causal version stamp, monotonically increasing within one scope.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct LogicalClock(u64);

impl LogicalClock {
    /// The clock of a scope that has accepted no writes.
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LogicalClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for LogicalClock {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Per-scope logical clocks known to a store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeVector {
    clocks: BTreeMap<ScopeId, LogicalClock>,
}

impl KnowledgeVector {
    /// Creates an empty knowledge vector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a vector that knows a single scope at the given clock.
    #[must_use]
    pub fn for_scope(scope: ScopeId, clock: LogicalClock) -> Self {
        let mut clocks = BTreeMap::new();
        clocks.insert(scope, clock);
        Self { clocks }
    }

    /// Returns the clock known for a scope (zero if unknown).
    #[must_use]
    pub fn get(&self, scope: &ScopeId) -> LogicalClock {
        self.clocks.get(scope).copied().unwrap_or(LogicalClock::ZERO)
    }

    /// Returns all scopes and their clocks.
    pub fn scopes(&self) -> impl Iterator<Item = (&ScopeId, &LogicalClock)> {
        self.clocks.iter()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clocks.is_empty()
    }

    /// Raises the clock for a scope. Lower values are ignored.
    pub fn update(&mut self, scope: ScopeId, clock: LogicalClock) {
        let entry = self.clocks.entry(scope).or_insert(LogicalClock::ZERO);
        if clock > *entry {
            *entry = clock;
        }
    }

    /// Merges another vector into this one, taking the pointwise maximum.
    pub fn merge(&mut self, other: &Self) {
        for (scope, &clock) in &other.clocks {
            self.update(scope.clone(), clock);
        }
    }

    /// Returns a new vector that is the merge of this and another.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.merge(other);
        result
    }

    /// Returns true if this vector knows at least everything `other` knows.
    #[must_use]
    pub fn dominates(&self, other: &Self) -> bool {
        other
            .clocks
            .iter()
            .all(|(scope, clock)| self.get(scope) >= *clock)
    }

    /// Serializes the vector for persistence alongside a sync token.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Restores a vector persisted with [`KnowledgeVector::to_json`].
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
