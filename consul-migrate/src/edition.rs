use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::ConsulApi;
use crate::error::{MigrateError, Result};

/// Version suffix carried by Consul Enterprise builds
const ENTERPRISE_MARKER: &str = "+ent";

/// Capability tier of a cluster
///
/// Serialized as the snapshot's `enterprise` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "bool", into = "bool")]
pub enum Edition {
    /// Single-tenant: ACL data lives in one global scope
    #[default]
    Oss,
    /// Multi-tenant: ACL data is partitioned by namespace
    Enterprise,
}

impl Edition {
    pub fn is_oss(&self) -> bool {
        matches!(self, Self::Oss)
    }

    pub fn is_enterprise(&self) -> bool {
        matches!(self, Self::Enterprise)
    }

    /// Classify a version string such as `1.9.3+ent`
    pub fn from_version(version: &str) -> Self {
        if version.contains(ENTERPRISE_MARKER) {
            Self::Enterprise
        } else {
            Self::Oss
        }
    }
}

impl From<bool> for Edition {
    fn from(enterprise: bool) -> Self {
        if enterprise {
            Self::Enterprise
        } else {
            Self::Oss
        }
    }
}

impl From<Edition> for bool {
    fn from(edition: Edition) -> Self {
        edition.is_enterprise()
    }
}

impl std::fmt::Display for Edition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Oss => write!(f, "oss"),
            Self::Enterprise => write!(f, "enterprise"),
        }
    }
}

/// Determine whether the cluster behind `api` runs OSS or Enterprise
pub async fn classify(api: &dyn ConsulApi) -> Result<Edition> {
    debug!("retrieving agent info to determine if this is enterprise or oss");
    let info = api.agent_self().await.map_err(MigrateError::Connectivity)?;

    let version = info
        .get("Config")
        .and_then(|config| config.get("Version"))
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            MigrateError::Protocol("agent info Config.Version field is missing or not a string".into())
        })?;

    let edition = Edition::from_version(version);
    debug!(version, %edition, "classified cluster edition");
    Ok(edition)
}
