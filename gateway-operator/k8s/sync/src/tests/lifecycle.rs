use super::*;
use crate::lifecycle::{self, Upsert};
use gateway_operator_core::{descriptor::NameValue, summary::Inventory, Bundle, Translation};
use gateway_operator_k8s_api::{L7PortalSpec, ResourceExt};
use pretty_assertions::assert_eq;

fn portal(tags: &[&str]) -> L7Portal {
    L7Portal {
        metadata: ObjectMeta {
            uid: Some("portal-uid".to_string()),
            ..meta("dev")
        },
        spec: L7PortalSpec {
            enabled: true,
            deployment_tags: tags.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        },
        status: None,
    }
}

fn translated(descriptor: &ApiDescriptor) -> Translation {
    translate(&template::render(descriptor)).unwrap()
}

#[test]
fn desired_api_carries_portal_identity() {
    let d = descriptor("Booking API", "bookings");
    let t = translated(&d);

    let api = lifecycle::desired_api(&portal(&["ssg"]), &d, &t).unwrap();

    assert_eq!(api.name_any(), "booking-api");
    assert_eq!(api.namespace().as_deref(), Some(NS));
    assert_eq!(api.labels()[labels::API], "booking-api");
    assert_eq!(api.labels()[labels::PORTAL], "dev");
    assert_eq!(api.annotations()[labels::CHECKSUM], t.checksum);

    let owner = &api.owner_references()[0];
    assert_eq!(owner.uid, "portal-uid");
    assert_eq!(owner.kind, "L7Portal");
    assert_eq!(owner.controller, Some(true));

    assert_eq!(api.spec.name, "Booking API");
    assert_eq!(api.spec.service_url, "/bookings*");
    assert!(api.spec.portal_published);
    assert_eq!(api.spec.portal_name.as_deref(), Some("dev"));
    assert_eq!(api.spec.deployment_tags, vec!["ssg".to_string()]);
    assert_eq!(api.spec.checksum, t.checksum);
    assert_eq!(
        encoding::decode_json::<Bundle>(&api.spec.graphman_bundle).unwrap(),
        t.bundle
    );
    let meta = api.spec.portal_meta.unwrap();
    assert_eq!(meta.uuid, d.uuid);
    assert_eq!(meta.fragment_name, "Booking API-fragment");
}

#[tokio::test]
async fn upsert_creates_then_patches_on_change() {
    let h = Harness::new();
    let d = descriptor("Booking API", "bookings");
    let desired = lifecycle::desired_api(&portal(&["ssg"]), &d, &translated(&d)).unwrap();

    assert_eq!(
        lifecycle::upsert(&h.store, &desired).await.unwrap(),
        Upsert::Created
    );
    assert_eq!(
        lifecycle::upsert(&h.store, &desired).await.unwrap(),
        Upsert::Unchanged
    );

    // Labels set by others survive updates.
    let patch = serde_json::json!({ "metadata": { "labels": { "team": "payments" } } });
    h.store
        .patch::<L7Api>(NS, "booking-api", &patch)
        .await
        .unwrap();

    let changed = ApiDescriptor {
        custom_fields: vec![NameValue {
            name: "tier".to_string(),
            value: "gold".to_string(),
        }],
        ..d
    };
    let t = translated(&changed);
    let desired = lifecycle::desired_api(&portal(&["ssg"]), &changed, &t).unwrap();
    assert_eq!(
        lifecycle::upsert(&h.store, &desired).await.unwrap(),
        Upsert::Patched
    );

    let stored = h.store.fetch::<L7Api>("booking-api").unwrap();
    assert_eq!(stored.labels()["team"], "payments");
    assert_eq!(stored.labels()[labels::API], "booking-api");
    assert_eq!(stored.annotations()[labels::CHECKSUM], t.checksum);
    assert_eq!(stored.spec, desired.spec);
}

#[tokio::test]
async fn upsert_follows_deployment_tags() {
    let h = Harness::new();
    let d = descriptor("Pets", "pets");
    let t = translated(&d);
    let before = lifecycle::desired_api(&portal(&["ssg"]), &d, &t).unwrap();
    lifecycle::upsert(&h.store, &before).await.unwrap();

    let after = lifecycle::desired_api(&portal(&["ssg", "ssg-edge"]), &d, &t).unwrap();
    assert_eq!(
        lifecycle::upsert(&h.store, &after).await.unwrap(),
        Upsert::Patched
    );
    let stored = h.store.fetch::<L7Api>("pets").unwrap();
    assert_eq!(stored.spec.deployment_tags, vec!["ssg", "ssg-edge"]);
}

#[test]
fn removed_names_are_object_names() {
    let previous = Inventory::new(vec![
        descriptor("Booking API", "bookings"),
        descriptor("Pets", "pets"),
    ])
    .unwrap()
    .summary;
    let current = Inventory::new(vec![descriptor("Pets", "pets")])
        .unwrap()
        .summary;

    assert_eq!(
        lifecycle::removed(&previous, &current),
        vec!["booking-api".to_string()]
    );
}

#[test]
fn removed_skips_names_still_claimed() {
    let previous = Inventory::new(vec![
        descriptor("Pets API", "pets"),
        descriptor("pets-api", "pets-v2"),
        descriptor("日本語", "jp"),
    ])
    .unwrap()
    .summary;
    let current = Inventory::new(vec![descriptor("pets-api", "pets-v2")])
        .unwrap()
        .summary;

    assert!(lifecycle::removed(&previous, &current).is_empty());
}

#[tokio::test]
async fn delete_tolerates_missing_objects() {
    let h = Harness::new();
    h.store.seed(api(&descriptor("Pets", "pets"), &[]));

    lifecycle::delete(&h.store, NS, &["gone".to_string(), "pets".to_string()])
        .await
        .unwrap();

    assert!(h.store.fetch::<L7Api>("pets").is_none());
}
