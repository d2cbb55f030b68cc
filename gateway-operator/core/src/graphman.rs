//! The gateway-native bundle accepted by a gateway's management endpoint.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub web_api_services: Vec<WebApiService>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub policy_fragments: Vec<PolicyFragment>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cluster_properties: Vec<ClusterProperty>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub listen_ports: Vec<ListenPort>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BundleProperties>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebApiService {
    pub name: String,
    pub folder_path: String,
    pub resolution_path: String,
    pub methods_allowed: Vec<HttpMethod>,
    pub enabled: bool,
    #[serde(default)]
    pub soap: bool,
    #[serde(default)]
    pub properties: Vec<EntityProperty>,
    pub policy: Policy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goid: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyFragment {
    pub name: String,
    pub folder_path: String,
    pub guid: String,
    pub policy: Policy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goid: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Policy {
    pub xml: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct EntityProperty {
    pub name: String,
    pub value: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterProperty {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goid: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenPort {
    pub name: String,
    pub port: u16,
    pub protocol: String,
    pub enabled: bool,
    #[serde(default)]
    pub enabled_features: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goid: Option<String>,
}

/// Bundle-level instructions; only used to express removals.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleProperties {
    pub mappings: Mappings,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Mappings {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub web_api_services: Vec<Mapping>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub policy_fragments: Vec<Mapping>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Mapping {
    pub action: MappingAction,
    pub source: serde_json::Map<String, serde_json::Value>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MappingAction {
    NewOrUpdate,
    Delete,
}

/// The closed set of verbs a gateway service may allow.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Options,
    Patch,
    Head,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unsupported HTTP method: {0}")]
pub struct UnsupportedMethod(pub String);

// === impl Bundle ===

impl Bundle {
    /// Builds the bundle that removes a portal API from a gateway: the web API
    /// service is matched by its resolution path and the fragment by name.
    pub fn removal(resolution_path: &str, fragment_name: &str) -> Self {
        let mut service = serde_json::Map::new();
        service.insert(
            "resolutionPath".to_string(),
            serde_json::Value::String(resolution_path.to_string()),
        );
        let mut fragment = serde_json::Map::new();
        fragment.insert(
            "name".to_string(),
            serde_json::Value::String(fragment_name.to_string()),
        );

        Self {
            properties: Some(BundleProperties {
                mappings: Mappings {
                    web_api_services: vec![Mapping {
                        action: MappingAction::Delete,
                        source: service,
                    }],
                    policy_fragments: vec![Mapping {
                        action: MappingAction::Delete,
                        source: fragment,
                    }],
                },
            }),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.web_api_services.is_empty()
            && self.policy_fragments.is_empty()
            && self.cluster_properties.is_empty()
            && self.listen_ports.is_empty()
    }

    /// Clears every generated entity identifier.
    pub(crate) fn strip_goids(&mut self) {
        for s in &mut self.web_api_services {
            s.goid = None;
        }
        for f in &mut self.policy_fragments {
            f.goid = None;
        }
        for p in &mut self.cluster_properties {
            p.goid = None;
        }
        for l in &mut self.listen_ports {
            l.goid = None;
        }
    }
}

// === impl HttpMethod ===

impl HttpMethod {
    pub const REST: [HttpMethod; 7] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Delete,
        HttpMethod::Options,
        HttpMethod::Patch,
        HttpMethod::Head,
    ];

    pub const SOAP: [HttpMethod; 2] = [HttpMethod::Get, HttpMethod::Post];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
        }
    }
}

impl FromStr for HttpMethod {
    type Err = UnsupportedMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::REST
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnsupportedMethod(s.to_string()))
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
