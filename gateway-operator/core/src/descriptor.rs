use serde::{Deserialize, Serialize};

/// A publishable API as advertised by a developer portal.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiDescriptor {
    pub uuid: String,
    pub name: String,

    /// Base path on the gateway, with or without a leading slash.
    #[serde(rename = "ssgUrl")]
    pub base_path: String,

    #[serde(rename = "ssgServiceType", default)]
    pub service_type: ServiceType,

    #[serde(rename = "apiEnabled", default = "enabled_by_default")]
    pub enabled: bool,

    #[serde(rename = "customFieldValues", default)]
    pub custom_fields: Vec<NameValue>,

    #[serde(default)]
    pub policy_entities: Vec<PolicyEntity>,

    #[serde(default)]
    pub modify_ts: i64,

    /// WSDL location advertised for SOAP APIs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_url: Option<String>,

    /// Inline WSDL document for SOAP APIs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wsdl: Option<String>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServiceType {
    #[default]
    Rest,
    Soap,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct NameValue {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

/// A policy template applied to the API, with its ordered arguments.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyEntity {
    pub policy_entity_uuid: String,
    #[serde(default)]
    pub policy_template_arguments: Vec<NameValue>,
}

fn enabled_by_default() -> bool {
    true
}

// === impl ApiDescriptor ===

impl ApiDescriptor {
    pub fn is_soap(&self) -> bool {
        self.service_type == ServiceType::Soap
    }

    /// The identifier with its separators stripped.
    pub fn short_id(&self) -> String {
        self.uuid.chars().filter(|c| *c != '-').collect()
    }

    /// A 32 hex character identifier for the rendered service, derived from
    /// the API identifier so that renders are reproducible.
    pub fn service_id(&self) -> String {
        let mut id = crate::checksum::fingerprint(format!("service:{}", self.uuid));
        id.truncate(32);
        id
    }

    pub fn fragment_name(&self) -> String {
        format!("{}-fragment", self.name)
    }

    /// A stable GUID for the API's policy fragment.
    pub fn fragment_guid(&self) -> String {
        let hash = crate::checksum::fingerprint(format!("fragment:{}", self.uuid));
        format!(
            "{}-{}-{}-{}-{}",
            &hash[0..8],
            &hash[8..12],
            &hash[12..16],
            &hash[16..20],
            &hash[20..32]
        )
    }

    /// The gateway URL pattern, `"/" + basePath + "*"`.
    pub fn url_pattern(&self) -> String {
        format!("/{}*", self.base_path.trim_start_matches('/'))
    }
}
