use std::collections::BTreeMap;

/// Ordered label set. Ordering keeps generated objects byte-identical across
/// builds.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Labels(pub BTreeMap<String, String>);

impl Labels {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&String> {
        self.0.get(key)
    }

    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }

    /// True when every label in `self` is present with the same value in `other`.
    pub fn is_subset_of(&self, other: &BTreeMap<String, String>) -> bool {
        self.0.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}
