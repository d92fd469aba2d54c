use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use kube::core::ErrorResponse;
use kube::Resource;
use kubetorio_core::{Error, ObjectKey, Result};
use parking_lot::{Mutex, RwLock};

use super::ObjectStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Get,
    List,
    Create,
    Update,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Get(ObjectKey),
    List(Option<String>),
    Create(ObjectKey),
    Update(ObjectKey),
}

impl StoreCall {
    pub fn op(&self) -> StoreOp {
        match self {
            StoreCall::Get(_) => StoreOp::Get,
            StoreCall::List(_) => StoreOp::List,
            StoreCall::Create(_) => StoreOp::Create,
            StoreCall::Update(_) => StoreOp::Update,
        }
    }

    pub fn is_mutation(&self) -> bool {
        matches!(self.op(), StoreOp::Create | StoreOp::Update)
    }
}

struct Failure {
    op: StoreOp,
    code: u16,
    reason: String,
}

/// In-process [`ObjectStore`] with API-server-like write semantics: creates
/// reject taken names, updates require an existing object and a matching
/// resourceVersion. Every call is recorded.
pub struct MemoryStore<K> {
    objects: RwLock<BTreeMap<ObjectKey, K>>,
    calls: Mutex<Vec<StoreCall>>,
    failures: Mutex<Vec<Failure>>,
    revision: AtomicU64,
}

impl<K> Default for MemoryStore<K> {
    fn default() -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
            revision: AtomicU64::new(0),
        }
    }
}

fn api_error(code: u16, reason: &str, message: String) -> Error {
    Error::Kube(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message,
        reason: reason.to_string(),
        code,
    }))
}

impl<K> MemoryStore<K>
where
    K: Resource + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn stamp(&self, obj: &mut K) {
        let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        let meta = obj.meta_mut();
        if meta.uid.is_none() {
            meta.uid = Some(format!("uid-{}", revision));
        }
        meta.resource_version = Some(revision.to_string());
    }

    fn record(&self, call: StoreCall) -> Result<()> {
        let op = call.op();
        self.calls.lock().push(call);

        let mut failures = self.failures.lock();
        if let Some(pos) = failures.iter().position(|f| f.op == op) {
            let failure = failures.remove(pos);
            return Err(api_error(
                failure.code,
                &failure.reason,
                format!("injected {:?} failure", op),
            ));
        }
        Ok(())
    }

    /// Store `obj` directly, bypassing the call log. Returns the stored copy.
    pub fn insert(&self, mut obj: K) -> K {
        self.stamp(&mut obj);
        if let Some(key) = ObjectKey::from_resource(&obj) {
            self.objects.write().insert(key, obj.clone());
        }
        obj
    }

    pub fn remove(&self, key: &ObjectKey) -> Option<K> {
        self.objects.write().remove(key)
    }

    pub fn object(&self, key: &ObjectKey) -> Option<K> {
        self.objects.read().get(key).cloned()
    }

    pub fn snapshot(&self) -> Vec<K> {
        self.objects.read().values().cloned().collect()
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().clone()
    }

    pub fn mutations(&self) -> Vec<StoreCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.is_mutation())
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Make the next call of kind `op` fail with the given API status.
    pub fn fail_next(&self, op: StoreOp, code: u16, reason: impl Into<String>) {
        self.failures.lock().push(Failure {
            op,
            code,
            reason: reason.into(),
        });
    }
}

#[async_trait]
impl<K> ObjectStore<K> for MemoryStore<K>
where
    K: Resource + Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &ObjectKey) -> Result<Option<K>> {
        self.record(StoreCall::Get(key.clone()))?;
        Ok(self.object(key))
    }

    async fn list(&self, namespace: Option<&str>) -> Result<Vec<K>> {
        self.record(StoreCall::List(namespace.map(str::to_string)))?;
        let objects = self.objects.read();
        Ok(objects
            .iter()
            .filter(|(key, _)| namespace.map_or(true, |ns| key.namespace == ns))
            .map(|(_, obj)| obj.clone())
            .collect())
    }

    async fn create(&self, obj: &K) -> Result<K> {
        let key = ObjectKey::from_resource(obj).ok_or(Error::MissingField("metadata.name"))?;
        self.record(StoreCall::Create(key.clone()))?;

        let mut objects = self.objects.write();
        if objects.contains_key(&key) {
            return Err(api_error(
                409,
                "AlreadyExists",
                format!("{} already exists", key),
            ));
        }
        let mut stored = obj.clone();
        stored.meta_mut().uid = None;
        self.stamp(&mut stored);
        objects.insert(key, stored.clone());
        Ok(stored)
    }

    async fn update(&self, obj: &K) -> Result<K> {
        let key = ObjectKey::from_resource(obj).ok_or(Error::MissingField("metadata.name"))?;
        self.record(StoreCall::Update(key.clone()))?;

        let mut objects = self.objects.write();
        let Some(current) = objects.get(&key) else {
            return Err(api_error(404, "NotFound", format!("{} not found", key)));
        };
        if let Some(expected) = obj.meta().resource_version.as_deref() {
            if current.meta().resource_version.as_deref() != Some(expected) {
                return Err(api_error(
                    409,
                    "Conflict",
                    format!("{} has been modified", key),
                ));
            }
        }
        let mut stored = obj.clone();
        stored.meta_mut().uid = current.meta().uid.clone();
        self.stamp(&mut stored);
        objects.insert(key, stored.clone());
        Ok(stored)
    }
}
