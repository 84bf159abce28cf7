//! Snapshot document model
//!
//! The wire format matches the Consul HTTP API field names for entities so an
//! exported snapshot can be inspected against `consul acl ... -format=json`
//! output. Fields the model doesn't name explicitly are kept in `extra` and
//! replayed as-is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Read;

use crate::edition::Edition;
use crate::error::Result;

/// Built-in policy present on every cluster; never exported
pub const GLOBAL_MANAGEMENT_POLICY_ID: &str = "00000000-0000-0000-0000-000000000001";

/// Built-in token used for unauthenticated requests; updated in place on import
pub const ANONYMOUS_TOKEN_ID: &str = "00000000-0000-0000-0000-000000000002";

/// Namespace every Enterprise cluster starts with
pub const DEFAULT_NAMESPACE: &str = "default";

/// Consul reports unset timestamps as Go's zero time instead of omitting them
const ZERO_TIME_SECS: i64 = -62_135_596_800;

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn is_zero(n: &u64) -> bool {
    *n == 0
}

/// Complete exported state of one cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(
        rename = "enterprise",
        default,
        skip_serializing_if = "Edition::is_oss",
        deserialize_with = "null_as_default"
    )]
    pub edition: Edition,
    #[serde(
        default,
        skip_serializing_if = "BTreeMap::is_empty",
        deserialize_with = "null_as_default"
    )]
    pub namespaces: BTreeMap<String, NamespaceData>,
    #[serde(flatten)]
    pub acl: AclData,
}

impl Snapshot {
    /// Snapshot of an OSS cluster: all data lives at the top level
    pub fn oss(acl: AclData) -> Self {
        Self {
            edition: Edition::Oss,
            namespaces: BTreeMap::new(),
            acl,
        }
    }

    /// Snapshot of an Enterprise cluster: all data lives under namespaces
    pub fn enterprise(namespaces: BTreeMap<String, NamespaceData>) -> Self {
        Self {
            edition: Edition::Enterprise,
            namespaces,
            acl: AclData::default(),
        }
    }

    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Total number of policies, roles and tokens across all scopes
    pub fn entity_count(&self) -> usize {
        self.acl.len() + self.namespaces.values().map(|ns| ns.acl.len()).sum::<usize>()
    }
}

/// A namespace definition together with the ACL data scoped to it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NamespaceData {
    pub definition: Namespace,
    #[serde(flatten)]
    pub acl: AclData,
}

/// Policies, roles and tokens keyed by their identifier at export time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AclData {
    #[serde(
        rename = "acl_policies",
        default,
        skip_serializing_if = "BTreeMap::is_empty",
        deserialize_with = "null_as_default"
    )]
    pub policies: BTreeMap<String, Policy>,
    #[serde(
        rename = "acl_roles",
        default,
        skip_serializing_if = "BTreeMap::is_empty",
        deserialize_with = "null_as_default"
    )]
    pub roles: BTreeMap<String, Role>,
    /// Keyed by accessor id
    #[serde(
        rename = "acl_tokens",
        default,
        skip_serializing_if = "BTreeMap::is_empty",
        deserialize_with = "null_as_default"
    )]
    pub tokens: BTreeMap<String, Token>,
}

impl AclData {
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty() && self.roles.is_empty() && self.tokens.is_empty()
    }

    pub fn len(&self) -> usize {
        self.policies.len() + self.roles.len() + self.tokens.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Namespace {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Description", default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(rename = "ACLs", default, skip_serializing_if = "Option::is_none")]
    pub acls: Option<NamespaceAcls>,
    #[serde(
        rename = "Meta",
        default,
        skip_serializing_if = "BTreeMap::is_empty",
        deserialize_with = "null_as_default"
    )]
    pub meta: BTreeMap<String, String>,
    #[serde(rename = "DeletedAt", default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(rename = "CreateIndex", default, skip_serializing_if = "is_zero")]
    pub create_index: u64,
    #[serde(rename = "ModifyIndex", default, skip_serializing_if = "is_zero")]
    pub modify_index: u64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Namespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// True when the deletion marker is set to a real timestamp
    pub fn is_deleted(&self) -> bool {
        self.deleted_at
            .is_some_and(|at| at.timestamp() != ZERO_TIME_SECS || at.timestamp_subsec_nanos() != 0)
    }

    pub fn clear_server_fields(&mut self) {
        self.create_index = 0;
        self.modify_index = 0;
    }
}

/// Default policy and role links applied to tokens in a namespace
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NamespaceAcls {
    #[serde(
        rename = "PolicyDefaults",
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "null_as_default"
    )]
    pub policy_defaults: Vec<AclLink>,
    #[serde(
        rename = "RoleDefaults",
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "null_as_default"
    )]
    pub role_defaults: Vec<AclLink>,
}

/// Reference from a role or token to a policy or role
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclLink {
    #[serde(rename = "ID", default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(rename = "Name", default, deserialize_with = "null_as_default")]
    pub name: String,
}

impl AclLink {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

pub type PolicyLink = AclLink;
pub type RoleLink = AclLink;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    #[serde(rename = "ID", default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(rename = "Name", default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(rename = "Description", default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(rename = "Rules", default, deserialize_with = "null_as_default")]
    pub rules: String,
    #[serde(
        rename = "Datacenters",
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "null_as_default"
    )]
    pub datacenters: Vec<String>,
    #[serde(rename = "Hash", default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(rename = "CreateIndex", default)]
    pub create_index: u64,
    #[serde(rename = "ModifyIndex", default)]
    pub modify_index: u64,
    #[serde(rename = "Namespace", default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Policy {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Strip everything the destination assigns itself, including the id
    pub fn clear_server_fields(&mut self) {
        self.id.clear();
        self.hash = None;
        self.create_index = 0;
        self.modify_index = 0;
        self.namespace = None;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Role {
    #[serde(rename = "ID", default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(rename = "Name", default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(rename = "Description", default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(
        rename = "Policies",
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "null_as_default"
    )]
    pub policies: Vec<PolicyLink>,
    #[serde(rename = "Hash", default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(rename = "CreateIndex", default)]
    pub create_index: u64,
    #[serde(rename = "ModifyIndex", default)]
    pub modify_index: u64,
    #[serde(rename = "Namespace", default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Role {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn clear_server_fields(&mut self) {
        self.id.clear();
        self.hash = None;
        self.create_index = 0;
        self.modify_index = 0;
        self.namespace = None;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Token {
    #[serde(rename = "AccessorID", default, deserialize_with = "null_as_default")]
    pub accessor_id: String,
    #[serde(rename = "SecretID", default, skip_serializing_if = "Option::is_none")]
    pub secret_id: Option<String>,
    #[serde(rename = "Description", default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(
        rename = "Policies",
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "null_as_default"
    )]
    pub policies: Vec<PolicyLink>,
    #[serde(
        rename = "Roles",
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "null_as_default"
    )]
    pub roles: Vec<RoleLink>,
    #[serde(rename = "Local", default)]
    pub local: bool,
    #[serde(rename = "Hash", default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(rename = "CreateIndex", default)]
    pub create_index: u64,
    #[serde(rename = "ModifyIndex", default)]
    pub modify_index: u64,
    #[serde(rename = "Namespace", default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Token {
    pub fn new(accessor_id: impl Into<String>) -> Self {
        Self {
            accessor_id: accessor_id.into(),
            ..Default::default()
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.accessor_id == ANONYMOUS_TOKEN_ID
    }

    /// Tokens keep their accessor and secret ids across clusters
    pub fn clear_server_fields(&mut self) {
        self.hash = None;
        self.create_index = 0;
        self.modify_index = 0;
        self.namespace = None;
    }
}
