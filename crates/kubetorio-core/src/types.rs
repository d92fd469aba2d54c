use std::fmt;
use std::time::Duration;

use kube::{Resource, ResourceExt};
use serde::{Deserialize, Serialize};

/// Identity of a namespaced object; doubles as the reconcile work item.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Returns `None` for objects without a namespace or a name.
    pub fn from_resource<K: Resource>(obj: &K) -> Option<Self> {
        let namespace = obj.namespace()?;
        let name = obj.meta().name.clone()?;
        Some(Self { namespace, name })
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Result of a single reconcile pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The parent is gone; owned dependents are left to cascade deletion.
    ParentGone,
    Created,
    Updated,
    Unchanged,
    /// More than one dependent claims the parent. Nothing was mutated.
    Inconsistent { dependents: usize },
    /// The ownership index disagreed with the store; retry once the watch catches up.
    StaleIndex,
}

impl Outcome {
    pub fn requeue(&self) -> bool {
        matches!(self, Outcome::StaleIndex)
    }

    pub fn mutated(&self) -> bool {
        matches!(self, Outcome::Created | Outcome::Updated)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::ParentGone => f.write_str("parent gone"),
            Outcome::Created => f.write_str("created"),
            Outcome::Updated => f.write_str("updated"),
            Outcome::Unchanged => f.write_str("unchanged"),
            Outcome::Inconsistent { dependents } => {
                write!(f, "inconsistent ({} dependents)", dependents)
            }
            Outcome::StaleIndex => f.write_str("stale index"),
        }
    }
}

/// Exponential requeue delay after failed passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl BackoffPolicy {
    /// Delay for the given number of consecutive failures (1-based).
    pub fn delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .map_or(self.max, |d| d.min(self.max))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(5),
            max: Duration::from_secs(300),
        }
    }
}
