//! Access to a cluster's namespace and ACL endpoints
//!
//! [`ConsulApi`] is the seam between the migration logic and the network.
//! [`HttpClient`] talks to a real agent; tests substitute an in-memory cluster.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::snapshot::{Namespace, Policy, Role, Token};

pub use http::HttpClient;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Consul unreachable: {0}")]
    Unreachable(String),

    #[error("Consul returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Namespace qualifier applied to a request
///
/// The global scope sends no qualifier, which lands in the `default`
/// namespace on Enterprise and is the only scope on OSS.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    namespace: Option<String>,
}

impl Scope {
    pub fn global() -> Self {
        Self { namespace: None }
    }

    pub fn namespace(name: impl Into<String>) -> Self {
        Self {
            namespace: Some(name.into()),
        }
    }

    pub fn namespace_name(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "namespace '{}'", ns),
            None => write!(f, "global scope"),
        }
    }
}

/// Policy list entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyStub {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Name", default)]
    pub name: String,
}

/// Role list entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleStub {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Name", default)]
    pub name: String,
}

/// Token list entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenStub {
    #[serde(rename = "AccessorID")]
    pub accessor_id: String,
    #[serde(rename = "Description", default)]
    pub description: String,
}

/// Operations the exporter and importer need from a cluster
#[async_trait]
pub trait ConsulApi: Send + Sync {
    /// Raw agent self-description (`/v1/agent/self`)
    async fn agent_self(&self) -> ClientResult<serde_json::Value>;

    async fn list_namespaces(&self) -> ClientResult<Vec<Namespace>>;

    async fn create_namespace(&self, namespace: &Namespace) -> ClientResult<Namespace>;

    async fn list_policies(&self, scope: &Scope) -> ClientResult<Vec<PolicyStub>>;

    async fn read_policy(&self, id: &str, scope: &Scope) -> ClientResult<Policy>;

    /// Create a policy; the returned value carries the assigned id
    async fn create_policy(&self, policy: &Policy, scope: &Scope) -> ClientResult<Policy>;

    async fn list_roles(&self, scope: &Scope) -> ClientResult<Vec<RoleStub>>;

    async fn read_role(&self, id: &str, scope: &Scope) -> ClientResult<Role>;

    /// Create a role; the returned value carries the assigned id
    async fn create_role(&self, role: &Role, scope: &Scope) -> ClientResult<Role>;

    async fn list_tokens(&self, scope: &Scope) -> ClientResult<Vec<TokenStub>>;

    async fn read_token(&self, accessor_id: &str, scope: &Scope) -> ClientResult<Token>;

    async fn create_token(&self, token: &Token, scope: &Scope) -> ClientResult<Token>;

    /// Update an existing token identified by its accessor id
    async fn update_token(&self, token: &Token, scope: &Scope) -> ClientResult<Token>;
}
