//! Creates, updates and deletes the `L7Api`s a portal publishes.

use crate::{store::Store, Error, Result};
use gateway_operator_core::{
    checksum,
    encoding::{self, Compression},
    summary::{self, ApiSummary},
    ApiDescriptor, Translation,
};
use gateway_operator_k8s_api::{
    l7api::PortalMeta,
    labels::{self, Labels},
    L7Api, L7ApiSpec, L7Portal, ObjectMeta, Resource, ResourceExt,
};
use serde_json::json;
use std::collections::BTreeSet;

/// The outcome of an [`upsert`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Upsert {
    Created,
    Patched,
    Unchanged,
}

/// Builds the `L7Api` a portal publishes for a descriptor.
pub fn desired_api(
    portal: &L7Portal,
    descriptor: &ApiDescriptor,
    translation: &Translation,
) -> Result<L7Api> {
    let name = labels::normalize(&descriptor.name);
    let portal_name = portal.name_any();
    let graphman_bundle = encoding::encode_json(&translation.bundle, Compression::Gzip)?;

    Ok(L7Api {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: portal.namespace(),
            labels: Some(
                [
                    (labels::API.to_string(), name),
                    (labels::PORTAL.to_string(), portal_name.clone()),
                ]
                .into_iter()
                .collect(),
            ),
            annotations: Some(
                [(labels::CHECKSUM.to_string(), translation.checksum.clone())]
                    .into_iter()
                    .collect(),
            ),
            owner_references: portal.controller_owner_ref(&()).map(|r| vec![r]),
            ..Default::default()
        },
        spec: L7ApiSpec {
            name: descriptor.name.clone(),
            service_url: descriptor.url_pattern(),
            portal_published: true,
            portal_name: Some(portal_name),
            deployment_tags: portal.spec.deployment_tags.clone(),
            graphman_bundle,
            portal_meta: Some(PortalMeta {
                uuid: descriptor.uuid.clone(),
                fragment_name: descriptor.fragment_name(),
                modify_ts: descriptor.modify_ts,
                enabled: descriptor.enabled,
            }),
            checksum: translation.checksum.clone(),
        },
        status: None,
    })
}

/// Creates the `L7Api` or brings the stored one up to date.
///
/// A stored object is only patched when its checksum annotation or its
/// deployment tags differ from the desired ones. Labels and annotations are
/// merged key by key and `spec` is replaced.
pub async fn upsert<S: Store>(store: &S, desired: &L7Api) -> Result<Upsert> {
    let ns = crate::namespace(desired)?;
    let name = desired.name_any();
    let sum = desired
        .annotations()
        .get(labels::CHECKSUM)
        .cloned()
        .unwrap_or_default();

    let Some(current) = store.get::<L7Api>(&ns, &name).await? else {
        store.create(&ns, desired).await?;
        tracing::info!(%ns, %name, "Created L7Api");
        return Ok(Upsert::Created);
    };

    let recorded = current.annotations().get(labels::CHECKSUM);
    if !checksum::changed(recorded.map(String::as_str), &sum)
        && current.spec.deployment_tags == desired.spec.deployment_tags
    {
        return Ok(Upsert::Unchanged);
    }

    let mut merged_labels = current.labels().clone();
    Labels::from(desired.labels().clone()).merge_into(&mut merged_labels);
    let mut merged_annotations = current.annotations().clone();
    Labels::from(desired.annotations().clone()).merge_into(&mut merged_annotations);

    let patch = json!({
        "metadata": {
            "labels": merged_labels,
            "annotations": merged_annotations,
            "resourceVersion": current.resource_version(),
        },
        "spec": desired.spec,
    });
    store.patch::<L7Api>(&ns, &name, &patch).await?;
    tracing::info!(%ns, %name, "Updated L7Api");
    Ok(Upsert::Patched)
}

/// Object names of the entries that disappeared from a portal's inventory.
///
/// Names still claimed by a current entry, and names that normalize to
/// nothing, are left out.
pub fn removed(previous: &[ApiSummary], current: &[ApiSummary]) -> Vec<String> {
    let kept = current
        .iter()
        .map(|s| labels::normalize(&s.name))
        .collect::<BTreeSet<_>>();
    summary::removed(previous, current)
        .into_iter()
        .map(labels::normalize)
        .filter(|name| !name.is_empty() && !kept.contains(name))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Deletes the named `L7Api`s, continuing past individual failures.
///
/// Returns the first failure once every deletion has been attempted.
pub async fn delete<S: Store>(store: &S, ns: &str, names: &[String]) -> Result<()> {
    let mut failure: Option<Error> = None;
    for name in names {
        match store.delete::<L7Api>(ns, name).await {
            Ok(()) => tracing::info!(%ns, %name, "Deleted L7Api"),
            Err(error) => {
                tracing::warn!(%ns, %name, %error, "Failed to delete L7Api");
                failure.get_or_insert(error);
            }
        }
    }
    match failure {
        Some(error) => Err(error),
        None => Ok(()),
    }
}
