use super::{Container, Labels};
use crate::reconciler::Dependent;
use crate::types::ChildResource;
use k8s_openapi::api::apps::v1 as apps;
use k8s_openapi::api::core::v1 as core;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use std::collections::BTreeMap;

#[derive(Clone, Debug)]
pub struct Deployment {
    pub name: String,
    pub replicas: i32,
    pub labels: Labels,
    pub containers: Vec<Container>,
}

impl Deployment {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            labels: Labels::new().insert("app", &name),
            name,
            replicas: 1,
            containers: Vec::new(),
        }
    }

    pub fn replicas(mut self, n: i32) -> Self {
        self.replicas = n;
        self
    }

    /// Labels for the object, its pod template and its selector. There is no
    /// separate selector setter: the selector is always exactly these labels.
    pub fn labels(mut self, labels: Labels) -> Self {
        self.labels = labels;
        self
    }

    pub fn container(mut self, container: Container) -> Self {
        self.containers.push(container);
        self
    }
}

impl ChildResource for Deployment {
    type K8sType = apps::Deployment;

    fn into_k8s(self, namespace: &str, owner_ref: Option<OwnerReference>) -> Self::K8sType {
        let labels_map = self.labels.into_inner();
        apps::Deployment {
            metadata: ObjectMeta {
                name: Some(self.name),
                namespace: Some(namespace.to_string()),
                labels: Some(labels_map.clone()),
                owner_references: owner_ref.map(|r| vec![r]),
                ..Default::default()
            },
            spec: Some(apps::DeploymentSpec {
                replicas: Some(self.replicas),
                selector: LabelSelector {
                    match_labels: Some(labels_map.clone()),
                    match_expressions: None,
                },
                template: core::PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels_map),
                        ..Default::default()
                    }),
                    spec: Some(core::PodSpec {
                        containers: self.containers.into_iter().map(|c| c.into_k8s()).collect(),
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

fn pod_containers(spec: &apps::DeploymentSpec) -> &[core::Container] {
    spec.template
        .spec
        .as_ref()
        .map(|p| p.containers.as_slice())
        .unwrap_or(&[])
}

fn template_labels(spec: &apps::DeploymentSpec) -> Option<&BTreeMap<String, String>> {
    spec.template.metadata.as_ref().and_then(|m| m.labels.as_ref())
}

fn containers_match(have: &[core::Container], want: &[core::Container]) -> bool {
    have.len() == want.len()
        && have.iter().zip(want).all(|(h, w)| {
            h.name == w.name
                && h.image == w.image
                && h.command == w.command
                && h.args == w.args
                && h.env == w.env
                && h.ports == w.ports
        })
}

fn labels_cover(
    have: &Option<BTreeMap<String, String>>,
    want: &Option<BTreeMap<String, String>>,
) -> bool {
    let empty = BTreeMap::new();
    let have = have.as_ref().unwrap_or(&empty);
    want.iter()
        .flatten()
        .all(|(k, v)| have.get(k) == Some(v))
}

// Only the fields the builder sets are compared and written. Everything the API
// server defaults (strategy, revision history, pod defaults) and the status are
// left alone so a converged Deployment stays converged.
impl Dependent for apps::Deployment {
    fn converged_with(&self, desired: &Self) -> bool {
        let Some(want) = desired.spec.as_ref() else {
            return labels_cover(&self.metadata.labels, &desired.metadata.labels);
        };
        let Some(have) = self.spec.as_ref() else {
            return false;
        };

        labels_cover(&self.metadata.labels, &desired.metadata.labels)
            && have.replicas == want.replicas
            && have.selector.match_labels == want.selector.match_labels
            && have.selector.match_expressions == want.selector.match_expressions
            && template_labels(have) == template_labels(want)
            && containers_match(pod_containers(have), pod_containers(want))
    }

    fn adopt(&mut self, desired: Self) {
        if let Some(labels) = desired.metadata.labels {
            self.metadata
                .labels
                .get_or_insert_with(BTreeMap::new)
                .extend(labels);
        }

        let Some(want) = desired.spec else {
            return;
        };
        let have = self.spec.get_or_insert_with(Default::default);
        have.replicas = want.replicas;
        have.template
            .metadata
            .get_or_insert_with(Default::default)
            .labels = want.template.metadata.and_then(|m| m.labels);
        have.template
            .spec
            .get_or_insert_with(Default::default)
            .containers = want.template.spec.map(|s| s.containers).unwrap_or_default();
    }

    // The API server rejects any change to spec.selector after creation.
    fn immutable_drift(&self, desired: &Self) -> Option<String> {
        let have = self.spec.as_ref()?;
        let want = desired.spec.as_ref()?;
        if have.selector == want.selector {
            return None;
        }
        Some(format!(
            "spec.selector is immutable: have {:?}, want {:?}",
            have.selector.match_labels.as_ref().unwrap_or(&BTreeMap::new()),
            want.selector.match_labels.as_ref().unwrap_or(&BTreeMap::new()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Protocol;
    use k8s_openapi::api::apps::v1::DeploymentStatus;

    fn desired() -> apps::Deployment {
        Deployment::new("factorio")
            .container(
                Container::new("factorio", "factoriotools/factorio:0.17.58")
                    .env("PORT", 31001)
                    .named_port("game", 31001, Protocol::Udp),
            )
            .into_k8s("default", None)
    }

    /// What the API server hands back: defaults filled in, status populated.
    fn as_stored(mut d: apps::Deployment) -> apps::Deployment {
        d.metadata.resource_version = Some("7".to_string());
        let spec = d.spec.as_mut().unwrap();
        spec.revision_history_limit = Some(10);
        spec.progress_deadline_seconds = Some(600);
        let pod = spec.template.spec.as_mut().unwrap();
        pod.restart_policy = Some("Always".to_string());
        pod.containers[0].image_pull_policy = Some("IfNotPresent".to_string());
        pod.containers[0].termination_message_path = Some("/dev/termination-log".to_string());
        d.status = Some(DeploymentStatus {
            ready_replicas: Some(1),
            ..Default::default()
        });
        d
    }

    #[test]
    fn selector_equals_template_labels() {
        let d = desired();
        let spec = d.spec.unwrap();
        assert_eq!(
            spec.selector.match_labels,
            spec.template.metadata.unwrap().labels
        );
    }

    #[test]
    fn server_defaults_do_not_count_as_drift() {
        assert!(as_stored(desired()).converged_with(&desired()));
    }

    #[test]
    fn replica_drift_is_detected_and_adopted() {
        let mut stored = as_stored(desired());
        stored.spec.as_mut().unwrap().replicas = Some(2);
        assert!(!stored.converged_with(&desired()));

        stored.adopt(desired());
        assert!(stored.converged_with(&desired()));
        assert_eq!(stored.spec.as_ref().unwrap().replicas, Some(1));
        assert_eq!(stored.metadata.resource_version.as_deref(), Some("7"));
        assert_eq!(stored.spec.as_ref().unwrap().revision_history_limit, Some(10));
        assert!(stored.status.is_some());
    }

    #[test]
    fn selector_changes_are_refused_instead_of_adopted() {
        let stored = as_stored(desired());
        assert!(stored.immutable_drift(&desired()).is_none());

        let relabelled = Deployment::new("factorio")
            .labels(Labels::new().insert("app", "factorio").insert("tier", "game"))
            .container(
                Container::new("factorio", "factoriotools/factorio:0.17.58")
                    .env("PORT", 31001)
                    .named_port("game", 31001, Protocol::Udp),
            )
            .into_k8s("default", None);
        let reason = stored.immutable_drift(&relabelled).unwrap();
        assert!(reason.contains("spec.selector"));
    }

    #[test]
    fn adopt_keeps_the_existing_selector() {
        let mut stored = as_stored(desired());
        let before = stored.spec.as_ref().unwrap().selector.clone();
        stored.spec.as_mut().unwrap().replicas = Some(3);

        stored.adopt(desired());
        assert_eq!(stored.spec.unwrap().selector, before);
    }

    #[test]
    fn extra_labels_on_stored_object_are_kept() {
        let mut stored = as_stored(desired());
        stored
            .metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .insert("team".to_string(), "ops".to_string());
        assert!(stored.converged_with(&desired()));

        stored.adopt(desired());
        assert_eq!(
            stored.metadata.labels.unwrap().get("team").map(String::as_str),
            Some("ops")
        );
    }
}
