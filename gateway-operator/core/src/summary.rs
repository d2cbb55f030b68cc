//! The compact inventory of APIs known to a portal.

use crate::{checksum, descriptor::ApiDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSummary {
    pub name: String,
    pub uuid: String,
    pub service_url: String,
    pub checksum: String,
}

/// A portal's inventory at one point in time: the summary and the full
/// descriptors it was computed from, both ordered by API name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Inventory {
    pub summary: Vec<ApiSummary>,
    pub descriptors: Vec<ApiDescriptor>,
    pub checksum: String,
}

impl Inventory {
    pub fn new(mut descriptors: Vec<ApiDescriptor>) -> serde_json::Result<Self> {
        descriptors.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.uuid.cmp(&b.uuid)));
        let summary = descriptors
            .iter()
            .map(|d| {
                Ok(ApiSummary {
                    name: d.name.clone(),
                    uuid: d.uuid.clone(),
                    service_url: d.base_path.clone(),
                    checksum: checksum::fingerprint_json(d)?,
                })
            })
            .collect::<serde_json::Result<Vec<_>>>()?;
        let checksum = checksum::fingerprint_json(&summary)?;
        Ok(Self {
            summary,
            descriptors,
            checksum,
        })
    }
}

/// Names present in `previous` but absent from `current`.
pub fn removed<'a>(previous: &'a [ApiSummary], current: &[ApiSummary]) -> Vec<&'a str> {
    let current = current.iter().map(|s| s.name.as_str()).collect::<BTreeSet<_>>();
    previous
        .iter()
        .map(|s| s.name.as_str())
        .filter(|name| !current.contains(name))
        .collect()
}
