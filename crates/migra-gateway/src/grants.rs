//! Capability grants
//!
//! Immutable map from agent name to the operations it may invoke. Checked on
//! every invocation; an agent without a grant entry may invoke nothing.

use std::collections::{BTreeMap, BTreeSet};

/// Per-agent authorized operation sets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityGrants {
    grants: BTreeMap<String, BTreeSet<String>>,
}

impl CapabilityGrants {
    /// Start building a grant table
    #[inline]
    #[must_use]
    pub fn builder() -> CapabilityGrantsBuilder {
        CapabilityGrantsBuilder::default()
    }

    #[must_use]
    pub fn is_authorized(&self, agent: &str, operation: &str) -> bool {
        self.grants
            .get(agent)
            .is_some_and(|ops| ops.contains(operation))
    }

    /// Operations granted to `agent`, empty when it has none
    #[must_use]
    pub fn operations_for(&self, agent: &str) -> Vec<&str> {
        self.grants
            .get(agent)
            .map(|ops| ops.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    #[inline]
    #[must_use]
    pub fn agents(&self) -> impl Iterator<Item = &str> {
        self.grants.keys().map(String::as_str)
    }
}

/// Builder for [`CapabilityGrants`]; the built table cannot be changed
#[derive(Debug, Default)]
pub struct CapabilityGrantsBuilder {
    grants: BTreeMap<String, BTreeSet<String>>,
}

impl CapabilityGrantsBuilder {
    /// Grant `operations` to `agent`. An empty list still registers the agent.
    #[must_use]
    pub fn grant<I, S>(mut self, agent: impl Into<String>, operations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.grants
            .entry(agent.into())
            .or_default()
            .extend(operations.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn build(self) -> CapabilityGrants {
        CapabilityGrants {
            grants: self.grants,
        }
    }
}
