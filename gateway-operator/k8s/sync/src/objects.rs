//! Checksum-gated writes of owned objects.

use crate::{
    store::{Object, Store},
    Result,
};
use gateway_operator_core::checksum;
use gateway_operator_k8s_api::{labels, ResourceExt};
use serde_json::json;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Write {
    Created,
    Patched,
    Unchanged,
}

/// Writes `desired` unless the stored object already carries `sum` in its
/// checksum annotation.
///
/// Updates replace the object's top-level content fields and merge the
/// desired labels and annotations into the stored ones.
pub(crate) async fn apply<S: Store, K: Object>(
    store: &S,
    ns: &str,
    mut desired: K,
    sum: &str,
) -> Result<Write> {
    let name = desired.name_any();
    desired
        .annotations_mut()
        .insert(labels::CHECKSUM.to_string(), sum.to_string());

    let Some(current) = store.get::<K>(ns, &name).await? else {
        store.create(ns, &desired).await?;
        tracing::debug!(kind = %K::kind(&()), %name, "Created");
        return Ok(Write::Created);
    };

    let recorded = current.annotations().get(labels::CHECKSUM);
    if !checksum::changed(recorded.map(String::as_str), sum) {
        return Ok(Write::Unchanged);
    }

    let mut patch = serde_json::to_value(&desired)?;
    if let Some(fields) = patch.as_object_mut() {
        for key in ["apiVersion", "kind", "metadata", "status"] {
            fields.remove(key);
        }
    }
    patch["metadata"] = json!({
        "labels": desired.labels(),
        "annotations": desired.annotations(),
        "resourceVersion": current.resource_version(),
    });
    store.patch::<K>(ns, &name, &patch).await?;
    tracing::debug!(kind = %K::kind(&()), %name, "Updated");
    Ok(Write::Patched)
}
