use std::fmt::Debug;
use std::marker::PhantomData;

use async_trait::async_trait;
use kube::api::{Api, ListParams, PostParams};
use kube::core::NamespaceResourceScope;
use kube::{Client, Resource, ResourceExt};
use kubetorio_core::{Error, ObjectKey, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::ObjectStore;

/// [`ObjectStore`] backed by the Kubernetes API.
pub struct KubeStore<K> {
    client: Client,
    field_manager: String,
    _marker: PhantomData<fn() -> K>,
}

impl<K> KubeStore<K> {
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
            _marker: PhantomData,
        }
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            dry_run: false,
            field_manager: Some(self.field_manager.clone()),
        }
    }
}

impl<K> Clone for KubeStore<K> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            field_manager: self.field_manager.clone(),
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<K> ObjectStore<K> for KubeStore<K>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
{
    async fn get(&self, key: &ObjectKey) -> Result<Option<K>> {
        let api: Api<K> = Api::namespaced(self.client.clone(), &key.namespace);

        match api.get(&key.name).await {
            Ok(obj) => Ok(Some(obj)),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
            Err(e) => Err(Error::Kube(e)),
        }
    }

    async fn list(&self, namespace: Option<&str>) -> Result<Vec<K>> {
        let api: Api<K> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };

        let list = api
            .list(&ListParams::default())
            .await
            .map_err(Error::Kube)?;
        Ok(list.items)
    }

    async fn create(&self, obj: &K) -> Result<K> {
        let namespace = obj
            .namespace()
            .ok_or(Error::MissingField("metadata.namespace"))?;
        let api: Api<K> = Api::namespaced(self.client.clone(), &namespace);

        let created = api
            .create(&self.post_params(), obj)
            .await
            .map_err(Error::Kube)?;
        debug!("Created {} {}/{}", K::kind(&()), namespace, created.name_any());
        Ok(created)
    }

    async fn update(&self, obj: &K) -> Result<K> {
        let key = ObjectKey::from_resource(obj).ok_or(Error::MissingField("metadata.name"))?;
        let api: Api<K> = Api::namespaced(self.client.clone(), &key.namespace);

        let updated = api
            .replace(&key.name, &self.post_params(), obj)
            .await
            .map_err(Error::Kube)?;
        debug!("Replaced {} {}", K::kind(&()), key);
        Ok(updated)
    }
}
