//! Typed access to the object store.
//!
//! The reconciler is written against [`ObjectStore`] so it can run on the
//! Kubernetes API ([`KubeStore`]) or on the in-memory [`MemoryStore`].

mod kubernetes;
mod memory;

pub use kubernetes::KubeStore;
pub use memory::{MemoryStore, StoreCall, StoreOp};

use async_trait::async_trait;
use kubetorio_core::{ObjectKey, Result};

#[async_trait]
pub trait ObjectStore<K: Send + Sync>: Send + Sync {
    /// `Ok(None)` when the object does not exist.
    async fn get(&self, key: &ObjectKey) -> Result<Option<K>>;

    /// Every object in `namespace`, or in all namespaces for `None`.
    async fn list(&self, namespace: Option<&str>) -> Result<Vec<K>>;

    async fn create(&self, obj: &K) -> Result<K>;

    /// Replace an existing object. A set resourceVersion must match the stored one.
    async fn update(&self, obj: &K) -> Result<K>;
}
