//! Desired-state computation: `Server` -> `Deployment`.
//!
//! Pure and deterministic. The owner reference is not set here; the reconciler
//! attaches it when creating the object.

use k8s_openapi::api::apps::v1 as apps;
use kube::ResourceExt;
use kubetorio_core::{Error, ObjectKey, Result};

use crate::crd::Server;
use crate::types::{ChildResource, Container, Deployment, Labels, Protocol};

pub const APP_LABEL: &str = "factorio";
pub const MANAGED_BY: &str = "kubetorio";
pub const SERVER_LABEL: &str = "kubetorio.ljdelight.com/server";
pub const CONTAINER_NAME: &str = "factorio";

const SETTINGS_PATH: &str = "/opt/factorio/data/server-settings.example.json";
const ENTRYPOINT: &str = "/docker-entrypoint.sh";

/// Maps a parent object to the single dependent that realises it.
pub trait DesiredState<P>: Send + Sync + 'static {
    type Child;

    fn build(&self, parent: &P) -> Result<Self::Child>;
}

/// Builds the Deployment running a [`Server`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ServerDeployment;

impl DesiredState<Server> for ServerDeployment {
    type Child = apps::Deployment;

    fn build(&self, server: &Server) -> Result<apps::Deployment> {
        build_deployment(server)
    }
}

pub fn build_deployment(server: &Server) -> Result<apps::Deployment> {
    let key = ObjectKey::from_resource(server).ok_or(Error::MissingField("metadata.namespace"))?;
    let spec = &server.spec;
    validate(&key, spec)?;

    let labels = Labels::new()
        .insert("app", APP_LABEL)
        .insert("app.kubernetes.io/managed-by", MANAGED_BY)
        .insert(SERVER_LABEL, server.name_any());

    let container = Container::new(CONTAINER_NAME, spec.image.as_str())
        .env("PORT", spec.port)
        .env("RCON_PORT", spec.rcon_port)
        .named_port("game", spec.port, Protocol::Udp)
        .named_port("rcon", spec.rcon_port, Protocol::Tcp)
        .command(vec!["/bin/sh", "-cxe"])
        .args(vec![startup_script(spec.public)]);

    Ok(Deployment::new(key.name.as_str())
        .replicas(1)
        .labels(labels)
        .container(container)
        .into_k8s(&key.namespace, None))
}

/// Rewrites the visibility setting in place, then hands off to the image's
/// entrypoint.
pub fn startup_script(public: bool) -> String {
    format!(
        "jq '.visibility.public = {public}' {settings} > {settings}.tmp;\n\
         mv {settings}.tmp {settings};\n\
         cat {settings};\n\
         exec {entrypoint};\n",
        public = public,
        settings = SETTINGS_PATH,
        entrypoint = ENTRYPOINT,
    )
}

fn validate(key: &ObjectKey, spec: &crate::crd::ServerSpec) -> Result<()> {
    if spec.image.trim().is_empty() {
        return Err(Error::build(key, "image must not be empty"));
    }
    if spec.image.chars().any(char::is_whitespace) {
        return Err(Error::build(
            key,
            format!("image {:?} contains whitespace", spec.image),
        ));
    }
    for (field, port) in [("port", spec.port), ("rconPort", spec.rcon_port)] {
        if !(1..=65535).contains(&port) {
            return Err(Error::build(
                key,
                format!("{} {} is outside 1-65535", field, port),
            ));
        }
    }
    if spec.port == spec.rcon_port {
        return Err(Error::build(key, "port and rconPort must differ"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::ServerSpec;
    use kube::api::ObjectMeta;

    fn server(spec: ServerSpec) -> Server {
        Server {
            metadata: ObjectMeta {
                name: Some("factorio".to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec,
        }
    }

    fn env_of(d: &apps::Deployment) -> Vec<(String, Option<String>)> {
        let pod = d.spec.as_ref().unwrap().template.spec.as_ref().unwrap();
        pod.containers[0]
            .env
            .iter()
            .flatten()
            .map(|e| (e.name.clone(), e.value.clone()))
            .collect()
    }

    #[test]
    fn builds_single_replica_factorio_deployment() {
        let d = build_deployment(&server(ServerSpec::default())).unwrap();

        assert_eq!(d.metadata.name.as_deref(), Some("factorio"));
        assert_eq!(d.metadata.namespace.as_deref(), Some("default"));
        assert!(d.metadata.owner_references.is_none());

        let spec = d.spec.as_ref().unwrap();
        assert_eq!(spec.replicas, Some(1));
        let pod = spec.template.spec.as_ref().unwrap();
        assert_eq!(pod.containers.len(), 1);
        assert_eq!(
            pod.containers[0].image.as_deref(),
            Some("factoriotools/factorio:0.17.58")
        );
        assert_eq!(
            env_of(&d),
            vec![
                ("PORT".to_string(), Some("31001".to_string())),
                ("RCON_PORT".to_string(), Some("27015".to_string())),
            ]
        );
        assert_eq!(
            pod.containers[0].command,
            Some(vec!["/bin/sh".to_string(), "-cxe".to_string()])
        );
    }

    #[test]
    fn selector_is_contained_in_template_labels() {
        let d = build_deployment(&server(ServerSpec::default())).unwrap();
        let spec = d.spec.unwrap();
        let selector = Labels(spec.selector.match_labels.unwrap());
        let template = spec.template.metadata.unwrap().labels.unwrap();
        assert!(selector.is_subset_of(&template));
        assert_eq!(selector.get(SERVER_LABEL).map(String::as_str), Some("factorio"));
    }

    #[test]
    fn output_is_deterministic() {
        let s = server(ServerSpec {
            public: true,
            ..Default::default()
        });
        let a = serde_json::to_vec(&build_deployment(&s).unwrap()).unwrap();
        let b = serde_json::to_vec(&build_deployment(&s).unwrap()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn script_carries_visibility_and_hands_off() {
        let script = startup_script(true);
        assert!(script.starts_with("jq '.visibility.public = true'"));
        assert!(script.trim_end().ends_with("exec /docker-entrypoint.sh;"));
        assert!(startup_script(false).contains(".visibility.public = false"));
    }

    #[test]
    fn rejects_invalid_specs() {
        let bad = [
            ServerSpec {
                image: " ".to_string(),
                ..Default::default()
            },
            ServerSpec {
                image: "factorio latest".to_string(),
                ..Default::default()
            },
            ServerSpec {
                port: 0,
                ..Default::default()
            },
            ServerSpec {
                rcon_port: 70000,
                ..Default::default()
            },
            ServerSpec {
                rcon_port: crate::crd::DEFAULT_PORT,
                ..Default::default()
            },
        ];
        for spec in bad {
            let err = build_deployment(&server(spec)).unwrap_err();
            assert!(matches!(err, Error::Build { .. }), "unexpected {err:?}");
        }
    }

    #[test]
    fn missing_namespace_is_an_error() {
        let mut s = server(ServerSpec::default());
        s.metadata.namespace = None;
        assert!(matches!(
            build_deployment(&s),
            Err(Error::MissingField(_))
        ));
    }
}
