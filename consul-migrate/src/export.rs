//! Read-only capture of a cluster's ACL state

use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::client::{ConsulApi, Scope};
use crate::edition::{classify, Edition};
use crate::error::{EntityKind, MigrateError, Operation, Result};
use crate::snapshot::{AclData, NamespaceData, Snapshot, GLOBAL_MANAGEMENT_POLICY_ID};

/// Capture the full ACL state of the cluster behind `api`
pub async fn export(api: &dyn ConsulApi) -> Result<Snapshot> {
    match classify(api).await? {
        Edition::Enterprise => {
            debug!("exporting data from Consul Enterprise");
            export_enterprise(api).await
        }
        Edition::Oss => {
            debug!("exporting data from Consul OSS");
            export_oss(api).await
        }
    }
}

async fn export_oss(api: &dyn ConsulApi) -> Result<Snapshot> {
    debug!("exporting ACL data");
    let acl = export_acl_data(api, &Scope::global()).await?;
    info!(
        policies = acl.policies.len(),
        roles = acl.roles.len(),
        tokens = acl.tokens.len(),
        "exported ACL data"
    );
    Ok(Snapshot::oss(acl))
}

async fn export_enterprise(api: &dyn ConsulApi) -> Result<Snapshot> {
    debug!("gathering namespace list");
    let list = api
        .list_namespaces()
        .await
        .map_err(|source| MigrateError::entity(EntityKind::Namespace, Operation::List, None, &Scope::global(), source))?;

    let mut namespaces = BTreeMap::new();
    for definition in list {
        if definition.is_deleted() {
            debug!(ns = %definition.name, "ignoring deleted namespace");
            continue;
        }

        debug!(ns = %definition.name, "exporting ACL data for namespace");
        let acl = export_acl_data(api, &Scope::namespace(definition.name.clone())).await?;
        info!(
            ns = %definition.name,
            policies = acl.policies.len(),
            roles = acl.roles.len(),
            tokens = acl.tokens.len(),
            "exported namespace"
        );

        namespaces.insert(definition.name.clone(), NamespaceData { definition, acl });
    }

    Ok(Snapshot::enterprise(namespaces))
}

/// Capture the policies, roles and tokens visible in `scope`
///
/// Every list entry is re-read individually since list responses omit
/// fields such as policy rules and token secrets.
pub async fn export_acl_data(api: &dyn ConsulApi, scope: &Scope) -> Result<AclData> {
    let mut acl = AclData::default();

    let policies = api
        .list_policies(scope)
        .await
        .map_err(|source| MigrateError::entity(EntityKind::Policy, Operation::List, None, scope, source))?;
    for stub in policies {
        if stub.id == GLOBAL_MANAGEMENT_POLICY_ID {
            continue;
        }
        let policy = api
            .read_policy(&stub.id, scope)
            .await
            .map_err(|source| MigrateError::entity(EntityKind::Policy, Operation::Read, Some(&stub.id), scope, source))?;
        acl.policies.insert(policy.id.clone(), policy);
    }

    let roles = api
        .list_roles(scope)
        .await
        .map_err(|source| MigrateError::entity(EntityKind::Role, Operation::List, None, scope, source))?;
    for stub in roles {
        let role = api
            .read_role(&stub.id, scope)
            .await
            .map_err(|source| MigrateError::entity(EntityKind::Role, Operation::Read, Some(&stub.id), scope, source))?;
        acl.roles.insert(role.id.clone(), role);
    }

    let tokens = api
        .list_tokens(scope)
        .await
        .map_err(|source| MigrateError::entity(EntityKind::Token, Operation::List, None, scope, source))?;
    for stub in tokens {
        let token = api
            .read_token(&stub.accessor_id, scope)
            .await
            .map_err(|source| {
                MigrateError::entity(EntityKind::Token, Operation::Read, Some(&stub.accessor_id), scope, source)
            })?;
        acl.tokens.insert(token.accessor_id.clone(), token);
    }

    Ok(acl)
}
