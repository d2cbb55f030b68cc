use super::*;
use crate::distribute::{self, Teardown};
use gateway_operator_core::{graphman::MappingAction, Bundle};
use gateway_operator_k8s_api::{
    condition,
    gateway::{Database, Management},
    l7api::{ApiPhase, SyncPhase},
    ResourceExt, API_FINALIZER,
};
use pretty_assertions::assert_eq;

fn booking() -> ApiDescriptor {
    descriptor("Booking", "bookings")
}

fn setup(pods: &[(&str, bool)]) -> Harness {
    let h = Harness::new();
    seed_gateway(&h.store, "ssg");
    for (name, ready) in pods {
        h.store.seed(pod(name, "ssg", *ready));
    }
    h.store.seed(api(&booking(), &["ssg"]));
    h
}

async fn reconcile(h: &Harness, name: &str) -> Option<L7Api> {
    let api = h.store.fetch::<L7Api>(name).expect("api must exist");
    distribute::reconcile(Arc::new(api), h.ctx.clone())
        .await
        .expect("reconcile must succeed");
    h.store.fetch::<L7Api>(name)
}

fn targets(api: &L7Api) -> Vec<(String, SyncPhase)> {
    api.status
        .as_ref()
        .map(|s| s.targets.iter().map(|t| (t.pod.clone(), t.phase)).collect())
        .unwrap_or_default()
}

fn apply(pod: &str) -> Call {
    Call::Apply(pod.to_string())
}

fn remove(pod: &str) -> Call {
    Call::Remove(pod.to_string())
}

/// Replaces the stored spec, keeping metadata and status.
fn update_spec(h: &Harness, spec: L7ApiSpec) {
    let mut current = h.store.fetch::<L7Api>("booking").unwrap();
    current.spec = spec;
    h.store.seed(current);
}

#[tokio::test]
async fn pushes_to_ready_pods() {
    let h = setup(&[("ssg-0", true), ("ssg-1", true), ("ssg-2", false)]);

    let api = reconcile(&h, "booking").await.unwrap();

    assert!(api.finalizers().iter().any(|f| f == API_FINALIZER));
    assert_eq!(h.graphman.calls(), vec![apply("ssg-0"), apply("ssg-1")]);
    assert_eq!(
        targets(&api),
        vec![
            ("ssg-0".to_string(), SyncPhase::Synced),
            ("ssg-1".to_string(), SyncPhase::Synced),
        ]
    );

    let status = api.status.clone().unwrap();
    assert!(status.ready);
    assert_eq!(status.phase, Some(ApiPhase::Active));
    assert_eq!(status.checksum.as_deref(), Some(api.spec.checksum.as_str()));
    let ready = condition::find(&status.conditions, condition::READY).unwrap();
    assert!(ready.is_true());

    let expected = translate(&template::render(&booking())).unwrap().bundle;
    let pushed: Bundle = serde_json::from_slice(&h.graphman.bundles()[0]).unwrap();
    assert_eq!(pushed, expected);
}

#[tokio::test]
async fn converged_api_is_left_alone() {
    let h = setup(&[("ssg-0", true), ("ssg-1", true)]);
    reconcile(&h, "booking").await;
    let writes = h.store.writes();
    let calls = h.graphman.calls().len();

    reconcile(&h, "booking").await;
    reconcile(&h, "booking").await;

    assert_eq!(h.store.writes(), writes);
    assert_eq!(h.graphman.calls().len(), calls);
}

#[tokio::test]
async fn failing_pod_does_not_block_others() {
    let h = setup(&[("ssg-0", true), ("ssg-1", true), ("ssg-2", true)]);
    h.graphman.fail("ssg-1");

    let api = reconcile(&h, "booking").await.unwrap();
    assert_eq!(h.graphman.calls().len(), 3);
    assert_eq!(
        targets(&api),
        vec![
            ("ssg-0".to_string(), SyncPhase::Synced),
            ("ssg-2".to_string(), SyncPhase::Synced),
        ]
    );
    let status = api.status.unwrap();
    assert!(!status.ready);
    let ready = condition::find(&status.conditions, condition::READY).unwrap();
    assert!(!ready.is_true());
    assert_eq!(ready.reason, "ApplyFailed");
    assert!(ready.message.contains("ssg-1"));
    assert_eq!(h.events.reasons(), vec!["ApplyFailed"]);

    h.graphman.heal();
    let api = reconcile(&h, "booking").await.unwrap();
    assert_eq!(h.graphman.calls().len(), 4);
    assert_eq!(h.graphman.calls().last(), Some(&apply("ssg-1")));
    assert!(api.status.unwrap().ready);
}

#[tokio::test]
async fn new_checksum_is_pushed_everywhere() {
    let h = setup(&[("ssg-0", true), ("ssg-1", true)]);
    reconcile(&h, "booking").await;

    let changed = api(&descriptor("Booking", "reservations"), &["ssg"]).spec;
    let sum = changed.checksum.clone();
    update_spec(&h, changed);
    let api = reconcile(&h, "booking").await.unwrap();

    assert_eq!(h.graphman.calls().len(), 4);
    let status = api.status.unwrap();
    assert_eq!(status.checksum.as_deref(), Some(sum.as_str()));
    assert!(status.targets.iter().all(|t| t.checksum == sum));
}

#[tokio::test]
async fn prunes_departed_pods_and_deployments() {
    let h = setup(&[("ssg-0", true), ("ssg-1", true)]);
    reconcile(&h, "booking").await;

    h.store.remove::<Pod>("ssg-1");
    let api = reconcile(&h, "booking").await.unwrap();
    assert_eq!(targets(&api), vec![("ssg-0".to_string(), SyncPhase::Synced)]);

    let mut spec = api.spec.clone();
    spec.deployment_tags.clear();
    update_spec(&h, spec);
    let api = reconcile(&h, "booking").await.unwrap();
    assert!(targets(&api).is_empty());
    assert!(api.status.unwrap().ready);
    assert_eq!(
        h.graphman.calls(),
        vec![apply("ssg-0"), apply("ssg-1"), remove("ssg-0")]
    );
}

#[tokio::test]
async fn retired_deployment_keeps_pods_until_removed() {
    let h = setup(&[("ssg-0", true)]);
    reconcile(&h, "booking").await;

    let mut spec = h.store.fetch::<L7Api>("booking").unwrap().spec;
    spec.deployment_tags.clear();
    update_spec(&h, spec);
    h.graphman.fail("ssg-0");
    let api = reconcile(&h, "booking").await.unwrap();

    assert_eq!(h.graphman.calls(), vec![apply("ssg-0"), remove("ssg-0")]);
    assert_eq!(targets(&api), vec![("ssg-0".to_string(), SyncPhase::Synced)]);
    let status = api.status.unwrap();
    assert!(!status.ready);
    let ready = condition::find(&status.conditions, condition::READY).unwrap();
    assert!(ready.message.contains("ssg-0"));

    // Teardown still reaches the pod through the recorded deployment.
    h.graphman.heal();
    h.store.delete::<L7Api>(NS, "booking").await.unwrap();
    assert!(reconcile(&h, "booking").await.is_none());
    assert_eq!(
        h.graphman.calls(),
        vec![apply("ssg-0"), remove("ssg-0"), remove("ssg-0")]
    );
}

#[tokio::test]
async fn repeated_tags_push_once() {
    let h = Harness::new();
    seed_gateway(&h.store, "ssg");
    h.store.seed(pod("ssg-0", "ssg", true));
    h.store.seed(pod("ssg-1", "ssg", true));
    h.store.seed(api(&booking(), &["ssg", "ssg"]));

    reconcile(&h, "booking").await;

    assert_eq!(h.graphman.calls(), vec![apply("ssg-0"), apply("ssg-1")]);
}

#[tokio::test]
async fn skips_missing_and_database_backed_gateways() {
    let h = Harness::new();
    h.store.seed(Gateway {
        metadata: meta("db"),
        spec: GatewaySpec {
            management: Management {
                database: Database { enabled: true },
                ..Default::default()
            },
        },
    });
    h.store.seed(pod("db-0", "db", true));
    h.store.seed(api(&booking(), &["missing", "db"]));

    let api = reconcile(&h, "booking").await.unwrap();

    assert!(h.graphman.calls().is_empty());
    assert!(targets(&api).is_empty());
    assert!(api.status.unwrap().ready);
}

#[tokio::test]
async fn deletion_removes_from_every_pod_then_releases() {
    let h = setup(&[("ssg-0", true), ("ssg-1", true), ("ssg-2", true)]);
    reconcile(&h, "booking").await;
    for pod in ["ssg-0", "ssg-1", "ssg-2"] {
        h.graphman.fail(pod);
    }

    h.store.delete::<L7Api>(NS, "booking").await.unwrap();
    let deleting = h.store.fetch::<L7Api>("booking").unwrap();
    assert_eq!(Teardown::of(&deleting), Teardown::Pending);

    assert!(reconcile(&h, "booking").await.is_none());

    let removals = h
        .graphman
        .calls()
        .into_iter()
        .filter(|c| matches!(c, Call::Remove(_)))
        .collect::<Vec<_>>();
    assert_eq!(removals.len(), 3);

    let removal: Bundle = serde_json::from_slice(h.graphman.bundles().last().unwrap()).unwrap();
    let mappings = removal.properties.unwrap().mappings;
    assert_eq!(mappings.web_api_services[0].action, MappingAction::Delete);
    assert_eq!(
        mappings.web_api_services[0].source["resolutionPath"],
        "/bookings*"
    );
    assert_eq!(mappings.policy_fragments[0].source["name"], "Booking-fragment");
}

#[tokio::test]
async fn completed_teardown_only_releases_the_finalizer() {
    let h = setup(&[("ssg-0", true)]);
    reconcile(&h, "booking").await;
    let calls = h.graphman.calls().len();

    h.store.delete::<L7Api>(NS, "booking").await.unwrap();
    let patch = serde_json::json!({ "status": { "phase": "Removed" } });
    h.store
        .patch_status::<L7Api>(NS, "booking", &patch)
        .await
        .unwrap();
    let deleting = h.store.fetch::<L7Api>("booking").unwrap();
    assert_eq!(Teardown::of(&deleting), Teardown::Complete);

    assert!(reconcile(&h, "booking").await.is_none());
    assert_eq!(h.graphman.calls().len(), calls);
}
