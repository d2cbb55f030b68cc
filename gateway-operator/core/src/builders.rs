//! Bundles for gateway-wide settings: cluster properties and listen ports.
//!
//! Each entity gets a freshly generated `goid` so the receiving gateway can
//! match it on later applies. The checksum is computed with those
//! identifiers stripped, so it only changes when the logical content does.

use crate::{
    checksum,
    graphman::{Bundle, ClusterProperty, ListenPort},
};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A serialized bundle and its content checksum.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Built {
    pub bytes: Vec<u8>,
    pub checksum: String,
}

/// Describes a listen port to configure on a gateway.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenPortSpec {
    pub name: String,
    pub port: u16,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default = "enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub enabled_features: Vec<String>,
}

pub fn cluster_properties<'a>(
    properties: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> serde_json::Result<Built> {
    let bundle = Bundle {
        cluster_properties: properties
            .into_iter()
            .map(|(name, value)| ClusterProperty {
                name: name.to_string(),
                value: value.to_string(),
                goid: Some(goid()),
            })
            .collect(),
        ..Default::default()
    };
    build(bundle)
}

pub fn listen_ports(ports: &[ListenPortSpec]) -> serde_json::Result<Built> {
    let bundle = Bundle {
        listen_ports: ports
            .iter()
            .map(|p| ListenPort {
                name: p.name.clone(),
                port: p.port,
                protocol: p.protocol.clone(),
                enabled: p.enabled,
                enabled_features: p.enabled_features.clone(),
                goid: Some(goid()),
            })
            .collect(),
        ..Default::default()
    };
    build(bundle)
}

fn build(bundle: Bundle) -> serde_json::Result<Built> {
    let bytes = serde_json::to_vec(&bundle)?;
    let mut stripped = bundle;
    stripped.strip_goids();
    let checksum = checksum::fingerprint_json(&stripped)?;
    Ok(Built { bytes, checksum })
}

/// A random 32 hex character gateway object identifier.
fn goid() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    hex::encode(bytes)
}

fn default_protocol() -> String {
    "HTTPS".to_string()
}

fn enabled() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_ignores_generated_ids() {
        let a = cluster_properties([("cluster.hostname", "gw.example.com")]).unwrap();
        let b = cluster_properties([("cluster.hostname", "gw.example.com")]).unwrap();
        assert_ne!(a.bytes, b.bytes, "each build generates new goids");
        assert_eq!(a.checksum, b.checksum);

        let c = cluster_properties([("cluster.hostname", "other.example.com")]).unwrap();
        assert_ne!(a.checksum, c.checksum);
    }

    #[test]
    fn bytes_keep_generated_ids() {
        let built = listen_ports(&[ListenPortSpec {
            name: "https".to_string(),
            port: 8443,
            protocol: "HTTPS".to_string(),
            enabled: true,
            enabled_features: vec!["Published service message input".to_string()],
        }])
        .unwrap();
        let bundle: Bundle = serde_json::from_slice(&built.bytes).unwrap();
        assert_eq!(bundle.listen_ports.len(), 1);
        let goid = bundle.listen_ports[0].goid.as_deref().unwrap();
        assert_eq!(goid.len(), 32);
        assert!(goid.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
