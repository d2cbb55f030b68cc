use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Binds a developer portal tenant to a set of gateway deployments.
#[derive(Clone, Debug, Default, PartialEq, Eq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "l7.operator.dev",
    version = "v1alpha1",
    kind = "L7Portal",
    status = "L7PortalStatus",
    shortname = "l7portal",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct L7PortalSpec {
    #[serde(default = "enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub tenant: String,
    /// Reads descriptors from a local directory instead of the portal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<String>,
    #[serde(default)]
    pub deployment_tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_interval_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<PortalAuth>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PortalAuth {
    #[serde(default)]
    pub endpoint: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Secret with `CLIENT_ID` and `CLIENT_SECRET` keys. Takes precedence
    /// over the inline credentials.
    pub existing_secret_name: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct L7PortalStatus {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub api_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_config_map: Option<String>,
}

pub const CLIENT_ID_KEY: &str = "CLIENT_ID";
pub const CLIENT_SECRET_KEY: &str = "CLIENT_SECRET";

fn enabled() -> bool {
    true
}

// === impl L7Portal ===

impl L7Portal {
    pub fn summary_config_map(&self) -> String {
        format!("{}-api-summary", self.metadata.name.as_deref().unwrap_or_default())
    }

    pub fn snapshot_config_map(&self) -> String {
        format!("{}-api-snapshot", self.metadata.name.as_deref().unwrap_or_default())
    }
}
