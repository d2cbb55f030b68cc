use crate::{
    checksum,
    graphman::{Bundle, EntityProperty, HttpMethod, Policy, PolicyFragment, WebApiService},
    portal::{self, PolicyResource, Resource, ServiceResource, INCLUDE},
    PORTAL_FOLDER, PORTAL_FRAGMENT_FOLDER,
};

/// Properties with this key prefix are carried onto the gateway service.
const PROPERTY_PREFIX: &str = "property.";
const SOAP_PROPERTY: &str = "soap";

/// A translated bundle and the checksum of its serialized form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Translation {
    pub bundle: Bundle,
    pub checksum: String,
}

/// Translates a portal XML bundle into a gateway-native bundle.
///
/// Qualifying items are emitted in document order: every `POLICY` item of
/// type `Include` yields one policy fragment and every `SERVICE` item yields
/// one web API service. Unsupported verbs, empty properties and other item
/// types are dropped.
pub fn translate(xml: &str) -> Result<Translation, portal::Error> {
    let parsed = portal::parse(xml)?;

    let mut bundle = Bundle::default();
    for item in &parsed.items {
        match &item.resource {
            Resource::Policy(policy) if policy.policy_type == INCLUDE => {
                bundle.policy_fragments.push(fragment(policy));
            }
            Resource::Policy(policy) => {
                tracing::debug!(name = %item.name, policy_type = %policy.policy_type, "Skipping non-include policy");
            }
            Resource::Service(service) => {
                bundle.web_api_services.push(web_api_service(service));
            }
            Resource::Unknown(kind) => {
                tracing::debug!(name = %item.name, %kind, "Skipping unsupported item");
            }
        }
    }

    let checksum = checksum::fingerprint_json(&bundle)?;
    Ok(Translation { bundle, checksum })
}

fn fragment(policy: &PolicyResource) -> PolicyFragment {
    PolicyFragment {
        name: policy.name.clone(),
        folder_path: PORTAL_FRAGMENT_FOLDER.to_string(),
        guid: policy.guid.clone(),
        policy: Policy {
            xml: policy.policy.clone(),
        },
        goid: None,
    }
}

fn web_api_service(service: &ServiceResource) -> WebApiService {
    let methods_allowed = service
        .verbs
        .iter()
        .filter_map(|verb| match verb.parse::<HttpMethod>() {
            Ok(method) => Some(method),
            Err(error) => {
                tracing::debug!(service = %service.name, %error, "Dropping verb");
                None
            }
        })
        .collect();

    let mut soap = false;
    let mut properties = Vec::new();
    for property in &service.properties {
        let Some(value) = property.value.as_text() else {
            continue;
        };
        if let Some(name) = property.key.strip_prefix(PROPERTY_PREFIX) {
            properties.push(EntityProperty {
                name: name.to_string(),
                value: value.into_owned(),
            });
        } else if property.key == SOAP_PROPERTY {
            soap = matches!(property.value, portal::PropertyValue::Boolean(true))
                || value.eq_ignore_ascii_case("true");
        }
    }

    WebApiService {
        name: service.name.clone(),
        folder_path: PORTAL_FOLDER.to_string(),
        resolution_path: service.url_pattern.clone(),
        methods_allowed,
        enabled: service.enabled,
        soap,
        properties,
        policy: Policy {
            xml: service.policy.clone(),
        },
        goid: None,
    }
}
