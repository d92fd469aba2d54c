use k8s_openapi::api::core::v1 as k8s;

#[derive(Clone, Debug)]
pub struct Container {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub args: Vec<String>,
    pub ports: Vec<ContainerPort>,
    pub env: Vec<EnvVar>,
}

impl Container {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            command: Vec::new(),
            args: Vec::new(),
            ports: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn command(mut self, cmd: Vec<impl Into<String>>) -> Self {
        self.command = cmd.into_iter().map(Into::into).collect();
        self
    }

    pub fn args(mut self, args: Vec<impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Named port; protocol is always spelled out so the API server has
    /// nothing to default.
    pub fn named_port(mut self, name: impl Into<String>, port: i32, protocol: Protocol) -> Self {
        self.ports.push(ContainerPort {
            container_port: port,
            name: name.into(),
            protocol,
        });
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.env.push(EnvVar {
            name: key.into(),
            value: value.to_string(),
        });
        self
    }

    pub fn into_k8s(self) -> k8s::Container {
        k8s::Container {
            name: self.name,
            image: Some(self.image),
            command: if self.command.is_empty() {
                None
            } else {
                Some(self.command)
            },
            args: if self.args.is_empty() { None } else { Some(self.args) },
            ports: if self.ports.is_empty() {
                None
            } else {
                Some(self.ports.into_iter().map(|p| p.into_k8s()).collect())
            },
            env: if self.env.is_empty() {
                None
            } else {
                Some(self.env.into_iter().map(|e| e.into_k8s()).collect())
            },
            ..Default::default()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
        }
    }
}

#[derive(Clone, Debug)]
pub struct ContainerPort {
    pub container_port: i32,
    pub name: String,
    pub protocol: Protocol,
}

impl ContainerPort {
    pub fn into_k8s(self) -> k8s::ContainerPort {
        k8s::ContainerPort {
            container_port: self.container_port,
            name: Some(self.name),
            protocol: Some(self.protocol.as_str().to_string()),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

impl EnvVar {
    pub fn into_k8s(self) -> k8s::EnvVar {
        k8s::EnvVar {
            name: self.name,
            value: Some(self.value),
            value_from: None,
        }
    }
}
