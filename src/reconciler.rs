//! The reconcile pass: converge the single dependent of a parent toward the
//! output of its [`DesiredState`] builder.

use std::fmt::Debug;
use std::sync::Arc;

use kube::core::NamespaceResourceScope;
use kube::{Resource, ResourceExt};
use kubetorio_core::{
    controlled_by, controller_of, owner_reference, Error, ObjectKey, Outcome, OwnerMatch,
    OwnershipIndex, Result,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::desired::DesiredState;
use crate::store::ObjectStore;

/// A namespaced kind that owns generated dependents.
pub trait Parent:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<T> Parent for T where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// A kind the reconciler can generate and keep converged.
pub trait Dependent:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// True when every field the builder owns already matches `desired`.
    fn converged_with(&self, desired: &Self) -> bool;

    /// Overwrite the builder-owned fields with those of `desired`, keeping
    /// resourceVersion, status and anything the server filled in.
    fn adopt(&mut self, desired: Self);

    /// Why `desired` cannot be applied to `self` in place, if a field the
    /// builder owns is immutable once created.
    fn immutable_drift(&self, desired: &Self) -> Option<String>;
}

pub struct Reconciler<P, D>
where
    P: Send + Sync,
    D: Send + Sync,
{
    parents: Arc<dyn ObjectStore<P>>,
    dependents: Arc<dyn ObjectStore<D>>,
    index: Arc<OwnershipIndex>,
    desired: Arc<dyn DesiredState<P, Child = D>>,
}

impl<P, D> Clone for Reconciler<P, D>
where
    P: Send + Sync,
    D: Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            parents: Arc::clone(&self.parents),
            dependents: Arc::clone(&self.dependents),
            index: Arc::clone(&self.index),
            desired: Arc::clone(&self.desired),
        }
    }
}

impl<P, D> Reconciler<P, D>
where
    P: Parent,
    D: Dependent,
{
    pub fn new(
        parents: Arc<dyn ObjectStore<P>>,
        dependents: Arc<dyn ObjectStore<D>>,
        index: Arc<OwnershipIndex>,
        desired: Arc<dyn DesiredState<P, Child = D>>,
    ) -> Self {
        Self {
            parents,
            dependents,
            index,
            desired,
        }
    }

    /// Run one pass for the parent identified by `key`.
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<Outcome> {
        let kind = P::kind(&());

        let Some(parent) = self.parents.get(key).await? else {
            debug!(parent = %key, %kind, "Parent no longer exists, nothing to do");
            return Ok(Outcome::ParentGone);
        };

        let mut observed = self.observed_dependents(key).await?;

        let desired = match self.desired.build(&parent) {
            Ok(desired) => desired,
            Err(e) => {
                error!(parent = %key, %kind, error = %e, "Unable to construct desired state");
                return Err(e);
            }
        };

        match observed.len() {
            0 => self.create(key, &parent, desired).await,
            1 => {
                let current = observed.remove(0);
                self.converge(key, current, desired).await
            }
            n => {
                let names: Vec<String> = observed.iter().map(|d| d.name_any()).collect();
                warn!(
                    parent = %key,
                    %kind,
                    dependents = ?names,
                    "Several dependents are controlled by one parent; leaving them untouched"
                );
                Ok(Outcome::Inconsistent { dependents: n })
            }
        }
    }

    /// Fetch every dependent the index attributes to `key`. Entries that have
    /// since vanished from the store, or whose live controller is no longer
    /// this parent, are skipped.
    async fn observed_dependents(&self, key: &ObjectKey) -> Result<Vec<D>> {
        let owned = self.index.lookup(&key.namespace, &key.name);
        let mut observed = Vec::with_capacity(owned.len());
        for dependent in &owned {
            let Some(obj) = self.dependents.get(dependent).await? else {
                debug!(parent = %key, %dependent, "Indexed dependent is gone");
                continue;
            };
            if is_controlled_by::<P, D>(&obj, key) {
                observed.push(obj);
            } else {
                debug!(parent = %key, %dependent, "Indexed dependent changed owner");
            }
        }
        Ok(observed)
    }

    async fn create(&self, key: &ObjectKey, parent: &P, mut desired: D) -> Result<Outcome> {
        desired.meta_mut().owner_references = Some(vec![owner_reference(parent)]);
        let name = desired.name_any();

        match self.dependents.create(&desired).await {
            Ok(_) => {
                info!(parent = %key, dependent = %name, kind = %D::kind(&()), "Created dependent");
                Ok(Outcome::Created)
            }
            Err(e) if e.is_already_exists() => self.name_collision(key, &desired).await,
            Err(e) => {
                error!(parent = %key, dependent = %name, error = %e, "Unable to create dependent");
                Err(e)
            }
        }
    }

    async fn converge(&self, key: &ObjectKey, mut current: D, desired: D) -> Result<Outcome> {
        let name = current.name_any();
        if current.converged_with(&desired) {
            debug!(parent = %key, dependent = %name, "Dependent is up to date");
            return Ok(Outcome::Unchanged);
        }

        if let Some(reason) = current.immutable_drift(&desired) {
            error!(parent = %key, dependent = %name, %reason, "Dependent cannot be updated in place");
            let dependent = ObjectKey::new(key.namespace.as_str(), name.as_str());
            return Err(Error::immutable(&dependent, reason));
        }

        current.adopt(desired);
        match self.dependents.update(&current).await {
            Ok(_) => {
                info!(parent = %key, dependent = %name, kind = %D::kind(&()), "Updated dependent");
                Ok(Outcome::Updated)
            }
            Err(e) if e.is_conflict() || e.is_not_found() => {
                debug!(parent = %key, dependent = %name, error = %e, "Dependent changed underneath us");
                Ok(Outcome::StaleIndex)
            }
            Err(e) => {
                error!(parent = %key, dependent = %name, error = %e, "Unable to update dependent");
                Err(e)
            }
        }
    }

    /// The create hit an existing object with the dependent's name. Either the
    /// index has not caught up with our own earlier create, or the name belongs
    /// to an object some other controller manages.
    async fn name_collision(&self, key: &ObjectKey, desired: &D) -> Result<Outcome> {
        let name = desired.name_any();
        let dependent = ObjectKey::new(key.namespace.as_str(), name.as_str());

        let Some(existing) = self.dependents.get(&dependent).await? else {
            debug!(parent = %key, %dependent, "Conflicting dependent vanished");
            return Ok(Outcome::StaleIndex);
        };
        if is_controlled_by::<P, D>(&existing, key) {
            debug!(parent = %key, %dependent, "Dependent exists but is not indexed yet");
            return Ok(Outcome::StaleIndex);
        }

        let owner = controller_of(&existing)
            .map(|r| format!("{}/{}", r.kind, r.name))
            .unwrap_or_else(|| "no controller".to_string());
        warn!(parent = %key, %dependent, %owner, "Dependent name is taken by a foreign object");
        Err(Error::name_taken(&dependent, owner))
    }
}

fn is_controlled_by<P, D>(obj: &D, parent: &ObjectKey) -> bool
where
    P: Resource<DynamicType = ()>,
    D: Resource,
{
    matches!(controlled_by::<P, D>(obj), OwnerMatch::Owned(owner) if owner == parent.name)
}
