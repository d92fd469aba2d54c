//! Secondary index from an owner to the dependents whose controller
//! reference points at it.
//!
//! The index only tracks identities. It is kept current from a watch over the
//! dependent kind (see [`IndexWriter`]) and bulk-populated from a listing at
//! startup, so lookups never hit the API server.

use std::collections::{BTreeSet, HashMap};
use std::mem;

use kube::runtime::watcher;
use kube::Resource;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::owner::{controller_of, match_controller, OwnerMatch};
use crate::types::ObjectKey;

#[derive(Default)]
struct IndexState {
    /// (namespace, owner name) -> dependent names in that namespace.
    by_owner: HashMap<ObjectKey, BTreeSet<String>>,
    /// dependent -> owner name, so updates and deletes can unlink old entries.
    by_object: HashMap<ObjectKey, String>,
    ready: bool,
}

impl IndexState {
    fn unlink(&mut self, key: &ObjectKey) {
        let Some(owner) = self.by_object.remove(key) else {
            return;
        };
        let owner_key = ObjectKey::new(key.namespace.clone(), owner);
        if let Some(names) = self.by_owner.get_mut(&owner_key) {
            names.remove(&key.name);
            if names.is_empty() {
                self.by_owner.remove(&owner_key);
            }
        }
    }

    fn link(&mut self, key: ObjectKey, owner: String) {
        self.by_owner
            .entry(ObjectKey::new(key.namespace.clone(), owner.clone()))
            .or_default()
            .insert(key.name.clone());
        self.by_object.insert(key, owner);
    }
}

pub struct OwnershipIndex {
    owner_api_version: String,
    owner_kind: String,
    state: RwLock<IndexState>,
}

impl OwnershipIndex {
    pub fn new(owner_api_version: impl Into<String>, owner_kind: impl Into<String>) -> Self {
        Self {
            owner_api_version: owner_api_version.into(),
            owner_kind: owner_kind.into(),
            state: RwLock::new(IndexState::default()),
        }
    }

    /// Index dependents by their controller reference to owner kind `P`.
    pub fn for_owner<P: Resource<DynamicType = ()>>() -> Self {
        Self::new(P::api_version(&()), P::kind(&()))
    }

    pub fn owner_api_version(&self) -> &str {
        &self.owner_api_version
    }

    pub fn owner_kind(&self) -> &str {
        &self.owner_kind
    }

    /// Extract the index entry for `obj`. Total: foreign and malformed owners
    /// simply produce no entry.
    fn entry<K: Resource>(&self, obj: &K) -> Option<(ObjectKey, String)> {
        let key = ObjectKey::from_resource(obj)?;
        match match_controller(obj.meta(), &self.owner_api_version, &self.owner_kind) {
            OwnerMatch::Owned(owner) => Some((key, owner)),
            OwnerMatch::NotOwned => {
                if let Some(foreign) = controller_of(obj) {
                    info!(
                        dependent = %key,
                        owner_kind = %foreign.kind,
                        owner_api_version = %foreign.api_version,
                        "Ignoring dependent controlled by another kind"
                    );
                }
                None
            }
            OwnerMatch::Malformed(reason) => {
                warn!(dependent = %key, reason, "Ignoring dependent with malformed owner");
                None
            }
        }
    }

    /// Record an added or updated dependent.
    pub fn observe<K: Resource>(&self, obj: &K) {
        let Some(key) = ObjectKey::from_resource(obj) else {
            return;
        };
        let entry = self.entry(obj);
        let mut state = self.state.write();
        state.unlink(&key);
        if let Some((key, owner)) = entry {
            debug!(dependent = %key, owner = %owner, "Indexed dependent");
            state.link(key, owner);
        }
    }

    /// Drop a deleted dependent.
    pub fn forget<K: Resource>(&self, obj: &K) {
        if let Some(key) = ObjectKey::from_resource(obj) {
            self.state.write().unlink(&key);
        }
    }

    /// Rebuild the whole index from a full listing of dependents.
    pub fn replace<'a, K, I>(&self, objs: I)
    where
        K: Resource + 'a,
        I: IntoIterator<Item = &'a K>,
    {
        let entries: Vec<_> = objs.into_iter().filter_map(|o| self.entry(o)).collect();
        self.replace_entries(entries);
    }

    fn replace_entries(&self, entries: Vec<(ObjectKey, String)>) {
        let mut fresh = IndexState {
            ready: true,
            ..Default::default()
        };
        for (key, owner) in entries {
            fresh.link(key, owner);
        }
        let indexed = fresh.by_object.len();
        *self.state.write() = fresh;
        info!(indexed, kind = %self.owner_kind, "Ownership index rebuilt");
    }

    /// Dependents of `owner` in `namespace`, in name order.
    pub fn lookup(&self, namespace: &str, owner: &str) -> Vec<ObjectKey> {
        let state = self.state.read();
        state
            .by_owner
            .get(&ObjectKey::new(namespace, owner))
            .map(|names| {
                names
                    .iter()
                    .map(|name| ObjectKey::new(namespace, name.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Owner currently recorded for a dependent.
    pub fn owner_of(&self, dependent: &ObjectKey) -> Option<String> {
        self.state.read().by_object.get(dependent).cloned()
    }

    pub fn is_ready(&self) -> bool {
        self.state.read().ready
    }

    pub fn len(&self) -> usize {
        self.state.read().by_object.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Applies watcher events to an [`OwnershipIndex`].
///
/// Objects seen during a re-list are buffered and swapped in on `InitDone`, so
/// readers never observe a half-built index.
pub struct IndexWriter<'a> {
    index: &'a OwnershipIndex,
    buffer: Vec<(ObjectKey, String)>,
}

impl<'a> IndexWriter<'a> {
    pub fn new(index: &'a OwnershipIndex) -> Self {
        Self {
            index,
            buffer: Vec::new(),
        }
    }

    pub fn apply_watcher_event<K: Resource>(&mut self, event: &watcher::Event<K>) {
        match event {
            watcher::Event::Apply(obj) => self.index.observe(obj),
            watcher::Event::Delete(obj) => self.index.forget(obj),
            watcher::Event::Init => self.buffer.clear(),
            watcher::Event::InitApply(obj) => {
                if let Some(entry) = self.index.entry(obj) {
                    self.buffer.push(entry);
                }
            }
            watcher::Event::InitDone => {
                self.index.replace_entries(mem::take(&mut self.buffer));
            }
        }
    }
}
