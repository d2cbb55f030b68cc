use crate::condition::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// An API published to gateways as a translated bundle.
#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "l7.operator.dev",
    version = "v1alpha1",
    kind = "L7Api",
    status = "L7ApiStatus",
    shortname = "l7api",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct L7ApiSpec {
    pub name: String,
    #[serde(default)]
    pub service_url: String,
    #[serde(default)]
    pub portal_published: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portal_name: Option<String>,
    /// Names of the `Gateway`s the bundle is pushed to, in order.
    #[serde(default)]
    pub deployment_tags: Vec<String>,
    /// Base64 encoded, optionally gzip compressed, bundle JSON.
    #[serde(default)]
    pub graphman_bundle: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portal_meta: Option<PortalMeta>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub checksum: String,
}

/// Where a portal-published API came from.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PortalMeta {
    pub uuid: String,
    pub fragment_name: String,
    #[serde(default)]
    pub modify_ts: i64,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct L7ApiStatus {
    #[serde(default)]
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default)]
    pub targets: Vec<TargetStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<ApiPhase>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// The state of a bundle on one gateway pod.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TargetStatus {
    pub pod: String,
    pub deployment: String,
    pub checksum: String,
    pub phase: SyncPhase,
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub last_updated: String,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum SyncPhase {
    #[default]
    Unsynced,
    Applying,
    Synced,
    Removing,
    Removed,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum ApiPhase {
    Active,
    Removed,
}

// === impl L7ApiStatus ===

impl L7ApiStatus {
    pub fn target(&self, pod: &str, deployment: &str) -> Option<&TargetStatus> {
        self.targets
            .iter()
            .find(|t| t.pod == pod && t.deployment == deployment)
    }

    /// Replaces the entry for the target's (pod, deployment) or appends it.
    pub fn upsert_target(&mut self, target: TargetStatus) {
        match self
            .targets
            .iter_mut()
            .find(|t| t.pod == target.pod && t.deployment == target.deployment)
        {
            Some(existing) => *existing = target,
            None => self.targets.push(target),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn target(pod: &str, checksum: &str) -> TargetStatus {
        TargetStatus {
            pod: pod.to_string(),
            deployment: "ssg".to_string(),
            checksum: checksum.to_string(),
            phase: SyncPhase::Synced,
            ready: true,
            last_updated: String::new(),
        }
    }

    #[test]
    fn upsert_target_replaces_in_place() {
        let mut status = L7ApiStatus::default();
        status.upsert_target(target("a", "1"));
        status.upsert_target(target("b", "1"));
        status.upsert_target(target("a", "2"));
        assert_eq!(status.targets, vec![target("a", "2"), target("b", "1")]);
        assert_eq!(status.target("b", "ssg"), Some(&target("b", "1")));
        assert_eq!(status.target("b", "other"), None);
    }

    #[test]
    fn spec_round_trips_camel_case() {
        let spec: L7ApiSpec = serde_json::from_value(serde_json::json!({
            "name": "Booking",
            "serviceUrl": "/bookings",
            "portalPublished": true,
            "deploymentTags": ["ssg"],
            "graphmanBundle": "e30=",
            "portalMeta": { "uuid": "u", "fragmentName": "Booking-fragment" },
        }))
        .unwrap();
        assert_eq!(spec.deployment_tags, vec!["ssg".to_string()]);
        assert_eq!(
            spec.portal_meta.as_ref().map(|m| m.fragment_name.as_str()),
            Some("Booking-fragment")
        );
        let value = serde_json::to_value(&spec).unwrap();
        assert!(value.get("checksum").is_none());
        assert_eq!(value["serviceUrl"], "/bookings");
    }
}
