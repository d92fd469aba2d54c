use thiserror::Error;

use crate::types::ObjectKey;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Cannot build desired state for {key}: {reason}")]
    Build { key: String, reason: String },

    #[error("{key} already exists and is controlled by {owner}")]
    NameTaken { key: String, owner: String },

    #[error("Cannot update {key}: {reason}")]
    Immutable { key: String, reason: String },

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub fn build(key: &ObjectKey, reason: impl Into<String>) -> Self {
        Error::Build {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub fn name_taken(key: &ObjectKey, owner: impl Into<String>) -> Self {
        Error::NameTaken {
            key: key.to_string(),
            owner: owner.into(),
        }
    }

    pub fn immutable(key: &ObjectKey, reason: impl Into<String>) -> Self {
        Error::Immutable {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    fn api_code(&self) -> Option<u16> {
        match self {
            Error::Kube(kube::Error::Api(e)) => Some(e.code),
            _ => None,
        }
    }

    fn api_reason(&self) -> Option<&str> {
        match self {
            Error::Kube(kube::Error::Api(e)) => Some(e.reason.as_str()),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.api_code() == Some(404)
    }

    /// 409 raised by a create whose target name is taken.
    pub fn is_already_exists(&self) -> bool {
        self.api_code() == Some(409) && self.api_reason() == Some("AlreadyExists")
    }

    /// 409 raised by a write against an outdated resourceVersion.
    pub fn is_conflict(&self) -> bool {
        self.api_code() == Some(409) && !self.is_already_exists()
    }
}

pub type Result<T> = std::result::Result<T, Error>;
