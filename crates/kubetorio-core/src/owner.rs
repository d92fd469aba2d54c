use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};

/// How a dependent's controller reference relates to an expected owner kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerMatch {
    Owned(String),
    NotOwned,
    Malformed(&'static str),
}

/// Classify `meta` against an owner identified by api version and kind.
pub fn match_controller(meta: &ObjectMeta, api_version: &str, kind: &str) -> OwnerMatch {
    let mut controllers = meta
        .owner_references
        .iter()
        .flatten()
        .filter(|r| r.controller == Some(true));

    let Some(owner) = controllers.next() else {
        return OwnerMatch::NotOwned;
    };
    if controllers.next().is_some() {
        return OwnerMatch::Malformed("multiple controller references");
    }
    if owner.api_version != api_version || owner.kind != kind {
        return OwnerMatch::NotOwned;
    }
    if owner.name.is_empty() {
        return OwnerMatch::Malformed("controller reference without a name");
    }
    OwnerMatch::Owned(owner.name.clone())
}

/// Typed form of [`match_controller`] for owner kind `P`.
pub fn controlled_by<P, K>(obj: &K) -> OwnerMatch
where
    P: Resource<DynamicType = ()>,
    K: Resource,
{
    match_controller(obj.meta(), &P::api_version(&()), &P::kind(&()))
}

/// The first controller reference of `obj`, if any.
pub fn controller_of<K: Resource>(obj: &K) -> Option<&OwnerReference> {
    obj.owner_references()
        .iter()
        .find(|r| r.controller == Some(true))
}

pub fn owner_reference<P>(owner: &P) -> OwnerReference
where
    P: Resource<DynamicType = ()>,
{
    OwnerReference {
        api_version: P::api_version(&()).to_string(),
        kind: P::kind(&()).to_string(),
        name: owner.name_any(),
        uid: owner.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}
