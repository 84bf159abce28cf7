//! consul-migrate: move ACL state between Consul clusters
//!
//! Export walks a source cluster and captures policies, roles, tokens (and
//! namespaces on Enterprise) into a [`Snapshot`]. Import replays a snapshot
//! into a destination cluster, rewriting policy and role links to the
//! identifiers the destination assigns.

pub mod client;
pub mod config;
pub mod edition;
pub mod error;
pub mod export;
pub mod import;
pub mod snapshot;

pub use client::{ClientError, ConsulApi, HttpClient, Scope};
pub use config::{ClientConfig, TlsConfig};
pub use edition::{classify, Edition};
pub use error::{EntityKind, MigrateError, Operation, Result};
pub use export::{export, export_acl_data};
pub use import::{import, IdRemap, ImportReport};
pub use snapshot::{AclData, AclLink, Namespace, NamespaceData, Policy, PolicyLink, Role, RoleLink, Snapshot, Token};
