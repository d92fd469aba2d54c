use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const DEFAULT_IMAGE: &str = "factoriotools/factorio:0.17.58";
pub const DEFAULT_PORT: i32 = 31001;
pub const DEFAULT_RCON_PORT: i32 = 27015;

/// A dedicated game server. Realised as a single-replica Deployment.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[kube(
    group = "kubetorio.ljdelight.com",
    version = "v1beta1",
    kind = "Server",
    plural = "servers",
    shortname = "fs",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ServerSpec {
    /// Container image running the server.
    #[serde(default = "default_image")]
    pub image: String,

    /// UDP port players connect to.
    #[serde(default = "default_port")]
    pub port: i32,

    /// TCP port of the remote console.
    #[serde(default = "default_rcon_port")]
    pub rcon_port: i32,

    /// List the server on the public matchmaking server.
    #[serde(default)]
    pub public: bool,
}

fn default_image() -> String {
    DEFAULT_IMAGE.to_string()
}

fn default_port() -> i32 {
    DEFAULT_PORT
}

fn default_rcon_port() -> i32 {
    DEFAULT_RCON_PORT
}

impl Default for ServerSpec {
    fn default() -> Self {
        Self {
            image: default_image(),
            port: DEFAULT_PORT,
            rcon_port: DEFAULT_RCON_PORT,
            public: false,
        }
    }
}
