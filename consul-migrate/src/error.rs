use std::fmt;
use thiserror::Error;

use crate::client::{ClientError, Scope};

/// ACL entity kinds the migration touches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Namespace,
    Policy,
    Role,
    Token,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Namespace => write!(f, "namespace"),
            Self::Policy => write!(f, "acl policy"),
            Self::Role => write!(f, "acl role"),
            Self::Token => write!(f, "acl token"),
        }
    }
}

/// Operation that was being performed against the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    List,
    Read,
    Create,
    Update,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::List => write!(f, "list"),
            Self::Read => write!(f, "read"),
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
        }
    }
}

#[derive(Error, Debug)]
pub enum MigrateError {
    #[error("error retrieving Consul info: {0}")]
    Connectivity(#[source] ClientError),

    #[error("unexpected response from Consul: {0}")]
    Protocol(String),

    #[error("failed to {op} {kind}{}: {source}", describe_target(.id, .namespace))]
    Entity {
        kind: EntityKind,
        op: Operation,
        id: Option<String>,
        namespace: Option<String>,
        #[source]
        source: ClientError,
    },

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    pub(crate) fn entity(
        kind: EntityKind,
        op: Operation,
        id: Option<&str>,
        scope: &Scope,
        source: ClientError,
    ) -> Self {
        Self::Entity {
            kind,
            op,
            id: id.map(str::to_string),
            namespace: scope.namespace_name().map(str::to_string),
            source,
        }
    }

    /// The entity kind for entity operation failures
    pub fn entity_kind(&self) -> Option<EntityKind> {
        match self {
            Self::Entity { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

fn describe_target(id: &Option<String>, namespace: &Option<String>) -> String {
    let mut out = String::new();
    if let Some(id) = id {
        out.push_str(&format!(" '{}'", id));
    }
    if let Some(ns) = namespace {
        out.push_str(&format!(" in namespace '{}'", ns));
    }
    out
}

pub type Result<T> = std::result::Result<T, MigrateError>;
