//! Replay of a snapshot into a destination cluster
//!
//! Entities are created strictly in dependency order: namespaces, then
//! policies, roles and tokens within each scope. The destination assigns new
//! ids to policies and roles, so every link embedded in a later entity is
//! rewritten through an [`IdRemap`] built up over the run.

use std::collections::HashMap;
use std::ops::AddAssign;
use tracing::{debug, info};

use crate::client::{ConsulApi, Scope};
use crate::edition::{classify, Edition};
use crate::error::{EntityKind, MigrateError, Operation, Result};
use crate::snapshot::{AclData, AclLink, NamespaceData, Policy, Role, Snapshot, Token, DEFAULT_NAMESPACE};

/// Old-to-new id tables for one import run
#[derive(Debug, Clone, Default)]
pub struct IdRemap {
    policies: HashMap<String, String>,
    roles: HashMap<String, String>,
}

impl IdRemap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_policy(&mut self, old: impl Into<String>, new: impl Into<String>) {
        self.policies.insert(old.into(), new.into());
    }

    pub fn record_role(&mut self, old: impl Into<String>, new: impl Into<String>) {
        self.roles.insert(old.into(), new.into());
    }

    /// New id for an exported policy id.
    ///
    /// Ids that were never imported (the built-in global-management policy,
    /// for one) resolve to the empty id, leaving the server to match the
    /// link by name.
    pub fn resolve_policy(&self, old: &str) -> String {
        resolve(&self.policies, old, EntityKind::Policy)
    }

    /// New id for an exported role id; unknown ids resolve to the empty id
    pub fn resolve_role(&self, old: &str) -> String {
        resolve(&self.roles, old, EntityKind::Role)
    }

    fn rewrite_policy_links(&self, links: &mut [AclLink]) {
        for link in links {
            link.id = self.resolve_policy(&link.id);
        }
    }

    fn rewrite_role_links(&self, links: &mut [AclLink]) {
        for link in links {
            link.id = self.resolve_role(&link.id);
        }
    }
}

fn resolve(map: &HashMap<String, String>, old: &str, kind: EntityKind) -> String {
    match map.get(old) {
        Some(new) => new.clone(),
        None => {
            debug!(%kind, id = old, "no imported entity for link, clearing id");
            String::new()
        }
    }
}

/// What an import run wrote to the destination
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub namespaces: usize,
    pub policies: usize,
    pub roles: usize,
    pub tokens: usize,
    pub anonymous_updates: usize,
}

impl AddAssign for ImportReport {
    fn add_assign(&mut self, other: Self) {
        self.namespaces += other.namespaces;
        self.policies += other.policies;
        self.roles += other.roles;
        self.tokens += other.tokens;
        self.anonymous_updates += other.anonymous_updates;
    }
}

/// Replay `snapshot` into the cluster behind `api`
///
/// Stops at the first failure; whatever was created before it stays on the
/// destination.
pub async fn import(api: &dyn ConsulApi, snapshot: Snapshot) -> Result<ImportReport> {
    let mut remap = IdRemap::new();
    match classify(api).await? {
        Edition::Enterprise => import_enterprise(api, snapshot, &mut remap).await,
        Edition::Oss => import_oss(api, snapshot, &mut remap).await,
    }
}

async fn import_enterprise(api: &dyn ConsulApi, snapshot: Snapshot, remap: &mut IdRemap) -> Result<ImportReport> {
    debug!("importing data to Consul Enterprise");

    if snapshot.edition.is_oss() {
        // OSS data has no namespaces; it lands in the default one
        return import_acl_data(api, snapshot.acl, &Scope::global(), remap).await;
    }

    let mut report = ImportReport::default();
    for ns in snapshot.namespaces.into_values() {
        report += import_namespace(api, ns, remap).await?;
    }
    Ok(report)
}

async fn import_oss(api: &dyn ConsulApi, mut snapshot: Snapshot, remap: &mut IdRemap) -> Result<ImportReport> {
    debug!("importing data to Consul OSS");

    let acl = if snapshot.edition.is_enterprise() {
        // only the default namespace has an OSS equivalent
        let dropped: Vec<&String> = snapshot
            .namespaces
            .keys()
            .filter(|name| name.as_str() != DEFAULT_NAMESPACE)
            .collect();
        if !dropped.is_empty() {
            debug!(?dropped, "skipping namespaces without an OSS equivalent");
        }
        snapshot
            .namespaces
            .remove(DEFAULT_NAMESPACE)
            .map(|ns| ns.acl)
            .unwrap_or_default()
    } else {
        snapshot.acl
    };

    import_acl_data(api, acl, &Scope::global(), remap).await
}

async fn import_namespace(api: &dyn ConsulApi, ns: NamespaceData, remap: &mut IdRemap) -> Result<ImportReport> {
    let NamespaceData { mut definition, acl } = ns;
    definition.clear_server_fields();

    let created = api.create_namespace(&definition).await.map_err(|source| {
        MigrateError::entity(EntityKind::Namespace, Operation::Create, Some(&definition.name), &Scope::global(), source)
    })?;
    info!(ns = %created.name, "created Namespace");

    let mut report = import_acl_data(api, acl, &Scope::namespace(created.name), remap).await?;
    report.namespaces += 1;
    Ok(report)
}

/// Replay one scope's policies, then roles, then tokens
///
/// Roles link to policies and tokens link to both, so the order matters:
/// each phase reads ids recorded into `remap` by the phases before it.
pub async fn import_acl_data(
    api: &dyn ConsulApi,
    acl: AclData,
    scope: &Scope,
    remap: &mut IdRemap,
) -> Result<ImportReport> {
    let mut report = ImportReport::default();

    for (old_id, policy) in acl.policies {
        import_policy(api, scope, &old_id, policy, remap).await?;
        report.policies += 1;
    }

    for (old_id, role) in acl.roles {
        import_role(api, scope, &old_id, role, remap).await?;
        report.roles += 1;
    }

    for token in acl.tokens.into_values() {
        if import_token(api, scope, token, remap).await? {
            report.anonymous_updates += 1;
        } else {
            report.tokens += 1;
        }
    }

    Ok(report)
}

async fn import_policy(
    api: &dyn ConsulApi,
    scope: &Scope,
    old_id: &str,
    mut policy: Policy,
    remap: &mut IdRemap,
) -> Result<()> {
    policy.clear_server_fields();

    let created = api
        .create_policy(&policy, scope)
        .await
        .map_err(|source| MigrateError::entity(EntityKind::Policy, Operation::Create, Some(old_id), scope, source))?;
    info!(id = %created.id, from = old_id, name = %created.name, ns = scope.namespace_name(), "created ACL Policy");

    remap.record_policy(old_id, created.id);
    Ok(())
}

async fn import_role(
    api: &dyn ConsulApi,
    scope: &Scope,
    old_id: &str,
    mut role: Role,
    remap: &mut IdRemap,
) -> Result<()> {
    role.clear_server_fields();
    remap.rewrite_policy_links(&mut role.policies);

    let created = api
        .create_role(&role, scope)
        .await
        .map_err(|source| MigrateError::entity(EntityKind::Role, Operation::Create, Some(old_id), scope, source))?;
    info!(id = %created.id, from = old_id, name = %created.name, ns = scope.namespace_name(), "created ACL Role");

    remap.record_role(old_id, created.id);
    Ok(())
}

/// Returns true when the token was the anonymous token and got updated in place
async fn import_token(api: &dyn ConsulApi, scope: &Scope, mut token: Token, remap: &IdRemap) -> Result<bool> {
    token.clear_server_fields();
    remap.rewrite_policy_links(&mut token.policies);
    remap.rewrite_role_links(&mut token.roles);

    if token.is_anonymous() {
        api.update_token(&token, scope).await.map_err(|source| {
            MigrateError::entity(EntityKind::Token, Operation::Update, Some(&token.accessor_id), scope, source)
        })?;
        info!(accessor_id = %token.accessor_id, ns = scope.namespace_name(), "updated anonymous ACL Token");
        Ok(true)
    } else {
        api.create_token(&token, scope).await.map_err(|source| {
            MigrateError::entity(EntityKind::Token, Operation::Create, Some(&token.accessor_id), scope, source)
        })?;
        info!(accessor_id = %token.accessor_id, ns = scope.namespace_name(), "created ACL Token");
        Ok(false)
    }
}
