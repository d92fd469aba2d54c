//! Translates watch events into reconcile work items.
//!
//! Parent events are handled by the controller itself. Dependent events are
//! routed to their owner through the controller reference carried on the
//! object, not through the ownership index, so a lagging index can never drop
//! a trigger.

use kube::runtime::reflector::ObjectRef;
use kube::{Resource, ResourceExt};
use kubetorio_core::{controlled_by, OwnerMatch};
use tracing::{debug, trace};

/// Work item for the owner of `dependent`, if it is controlled by a `P`.
pub fn owner_work_item<P, D>(dependent: &D) -> Option<ObjectRef<P>>
where
    P: Resource<DynamicType = ()>,
    D: Resource,
{
    let namespace = dependent.namespace()?;
    match controlled_by::<P, D>(dependent) {
        OwnerMatch::Owned(owner) => {
            trace!(dependent = %dependent.name_any(), %owner, "Routing dependent event to owner");
            Some(ObjectRef::new(&owner).within(&namespace))
        }
        OwnerMatch::NotOwned => None,
        OwnerMatch::Malformed(reason) => {
            debug!(dependent = %dependent.name_any(), reason, "Dropping event for malformed owner");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::Server;
    use k8s_openapi::api::apps::v1::Deployment;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};

    fn deployment(refs: Vec<OwnerReference>) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                name: Some("factorio".to_string()),
                namespace: Some("games".to_string()),
                owner_references: Some(refs),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn reference(api_version: &str, kind: &str) -> OwnerReference {
        OwnerReference {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            name: "vanilla".to_string(),
            uid: "1234".to_string(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    #[test]
    fn routes_owned_dependent_to_owner_in_same_namespace() {
        let dep = deployment(vec![reference("kubetorio.ljdelight.com/v1beta1", "Server")]);
        let work = owner_work_item::<Server, _>(&dep).unwrap();
        assert_eq!(work.name, "vanilla");
        assert_eq!(work.namespace.as_deref(), Some("games"));
    }

    #[test]
    fn ignores_dependents_of_other_kinds() {
        let dep = deployment(vec![reference("apps/v1", "ReplicaSet")]);
        assert!(owner_work_item::<Server, _>(&dep).is_none());
        assert!(owner_work_item::<Server, _>(&deployment(vec![])).is_none());
    }
}
