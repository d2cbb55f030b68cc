use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A gateway deployment that `L7Api` deployment tags refer to.
///
/// Only the management settings needed to reach a gateway's pods are modeled.
#[derive(Clone, Debug, Default, PartialEq, Eq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "l7.operator.dev",
    version = "v1alpha1",
    kind = "Gateway",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySpec {
    #[serde(default)]
    pub management: Management,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Management {
    /// Secret holding the admin credentials. Defaults to the gateway's name.
    pub secret_name: Option<String>,
    pub graphman_port: Option<u16>,
    #[serde(default)]
    pub database: Database,
}

/// Database-backed gateways are configured through their database and are
/// never pushed to directly.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Database {
    #[serde(default)]
    pub enabled: bool,
}

pub const ADMIN_USERNAME_KEY: &str = "SSG_ADMIN_USERNAME";
pub const ADMIN_PASSWORD_KEY: &str = "SSG_ADMIN_PASSWORD";

// === impl Gateway ===

impl Gateway {
    pub fn admin_secret_name(&self) -> &str {
        self.spec
            .management
            .secret_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.metadata.name.as_deref().unwrap_or_default())
    }

    pub fn is_database_backed(&self) -> bool {
        self.spec.management.database.enabled
    }

    pub fn graphman_port(&self, default: u16) -> u16 {
        self.spec.management.graphman_port.unwrap_or(default)
    }
}
