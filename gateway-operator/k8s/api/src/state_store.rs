use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A key-value store gateways keep shared state in.
#[derive(Clone, Debug, Default, PartialEq, Eq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "l7.operator.dev",
    version = "v1alpha1",
    kind = "L7StateStore",
    status = "L7StateStoreStatus",
    shortname = "l7statestore",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct L7StateStoreSpec {
    #[serde(default)]
    pub store_type: StoreType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis: Option<RedisSpec>,
    /// Secret with `username` and `masterPassword` keys. Takes precedence
    /// over the inline credentials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing_secret: Option<String>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum StoreType {
    #[default]
    Redis,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RedisSpec {
    #[serde(default)]
    pub mode: RedisMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standalone: Option<Endpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentinel: Option<Sentinel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<u32>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RedisMode {
    #[default]
    Standalone,
    Sentinel,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct Sentinel {
    pub master: String,
    #[serde(default)]
    pub nodes: Vec<Endpoint>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct L7StateStoreStatus {
    #[serde(default)]
    pub ready: bool,
}

pub const USERNAME_KEY: &str = "username";
pub const PASSWORD_KEY: &str = "masterPassword";

// === impl RedisSpec ===

impl RedisSpec {
    /// The endpoints to try, in order.
    pub fn endpoints(&self) -> Vec<&Endpoint> {
        match self.mode {
            RedisMode::Standalone => self.standalone.iter().collect(),
            RedisMode::Sentinel => self.sentinel.iter().flat_map(|s| s.nodes.iter()).collect(),
        }
    }

    /// A copy of the configuration with credentials removed.
    pub fn without_credentials(&self) -> Self {
        Self {
            username: None,
            master_password: None,
            ..self.clone()
        }
    }
}
