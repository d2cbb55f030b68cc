//! Pushes each `L7Api`'s bundle to the gateway pods its deployment tags name,
//! and removes it from them when the `L7Api` is deleted or a deployment is
//! no longer declared.
//!
//! Every (pod, deployment) pair moves through `Unsynced -> Applying ->
//! Synced` and, on deletion, `Removing -> Removed`. Only `Synced` entries are
//! recorded in the status: an entry exists exactly when the pod accepted the
//! bundle with the recorded checksum.

use crate::{
    events::Event,
    graphman::Target,
    secret_value,
    store::Store,
    Context, Error, Result,
};
use gateway_operator_core::{checksum, encoding, Bundle};
use gateway_operator_k8s_api::{
    condition::{self, Condition},
    gateway::{ADMIN_PASSWORD_KEY, ADMIN_USERNAME_KEY},
    is_deleting,
    l7api::{ApiPhase, SyncPhase, TargetStatus},
    labels, pod, Gateway, L7Api, L7ApiStatus, Pod, Resource, ResourceExt, Secret, API_FINALIZER,
};
use kube::runtime::controller::Action;
use serde_json::json;
use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    sync::Arc,
};

/// Progress of an `L7Api`'s removal from its gateways.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Teardown {
    /// Removal bundles have not been sent yet.
    Pending,
    /// Removal has been attempted on every reachable pod and recorded in
    /// the status; only the finalizer remains.
    Complete,
}

// === impl Teardown ===

impl Teardown {
    pub fn of(api: &L7Api) -> Self {
        match api.status.as_ref().and_then(|s| s.phase) {
            Some(ApiPhase::Removed) => Self::Complete,
            _ => Self::Pending,
        }
    }
}

pub async fn reconcile<S: Store>(api: Arc<L7Api>, ctx: Arc<Context<S>>) -> Result<Action> {
    let ns = crate::namespace(api.as_ref())?;
    let name = api.name_any();
    let has_finalizer = api.finalizers().iter().any(|f| f == API_FINALIZER);

    if is_deleting(api.as_ref()) {
        if !has_finalizer {
            return Ok(Action::await_change());
        }
        let mut api = api.as_ref().clone();
        loop {
            match Teardown::of(&api) {
                Teardown::Pending => {
                    remove_everywhere(&ctx, &ns, &api).await;
                    api = record_removed(&ctx, &ns, &api).await;
                }
                Teardown::Complete => {
                    release_finalizer(&ctx.store, &ns, &api).await?;
                    tracing::info!(%ns, %name, "Removed L7Api from gateways");
                    return Ok(Action::await_change());
                }
            }
        }
    }

    let api = if has_finalizer {
        api.as_ref().clone()
    } else {
        let mut finalizers = api.finalizers().to_vec();
        finalizers.push(API_FINALIZER.to_string());
        let patch = json!({
            "metadata": {
                "finalizers": finalizers,
                "resourceVersion": api.resource_version(),
            }
        });
        ctx.store.patch::<L7Api>(&ns, &name, &patch).await?
    };

    distribute(&ctx, &ns, &api).await?;
    Ok(Action::requeue(ctx.config.requeue))
}

/// Pushes the bundle to every ready pod that does not have it yet and
/// records the outcome.
async fn distribute<S: Store>(ctx: &Context<S>, ns: &str, api: &L7Api) -> Result<()> {
    let name = api.name_any();
    let bundle = encoding::decode(&api.spec.graphman_bundle)?;
    let sum = if api.spec.checksum.is_empty() {
        checksum::fingerprint(&bundle)
    } else {
        api.spec.checksum.clone()
    };

    let previous = api.status.clone().unwrap_or_default();
    let mut status = previous.clone();
    let mut pushed = HashSet::new();
    let mut listed = BTreeMap::<&str, BTreeSet<String>>::new();
    let mut failures = Vec::new();

    for tag in &api.spec.deployment_tags {
        let Some(gateway) = ctx.store.get::<Gateway>(ns, tag).await? else {
            tracing::info!(%ns, api = %name, gateway = %tag, "Gateway not found");
            continue;
        };
        if gateway.is_database_backed() {
            tracing::debug!(%ns, api = %name, gateway = %tag, "Skipping database-backed gateway");
            continue;
        }
        let pods = match ctx.store.list::<Pod>(ns, &labels::gateway_pods(tag)).await {
            Ok(pods) => pods,
            Err(error) => {
                tracing::warn!(%ns, api = %name, gateway = %tag, %error, "Failed to list gateway pods");
                failures.push(format!("{tag}: {error}"));
                continue;
            }
        };
        listed.insert(tag.as_str(), pods.iter().map(|p| p.name_any()).collect());

        let mut credentials = None;
        for pod in &pods {
            let pod_name = pod.name_any();
            let synced = status
                .target(&pod_name, tag)
                .is_some_and(|t| t.phase == SyncPhase::Synced && t.checksum == sum);
            if !pod::is_ready(pod) || synced {
                ctx.metrics.skip(ns, tag);
                continue;
            }
            if !pushed.insert((pod_name.clone(), tag.clone())) {
                continue;
            }

            if credentials.is_none() {
                match admin_credentials(&ctx.store, ns, &gateway).await {
                    Ok(c) => credentials = Some(c),
                    Err(error) => {
                        tracing::warn!(%ns, api = %name, gateway = %tag, %error, "Failed to read gateway credentials");
                        failures.push(format!("{tag}: {error}"));
                        break;
                    }
                }
            }
            let Some(target) = reachable(ctx, &gateway, pod, credentials.as_ref()) else {
                continue;
            };

            tracing::debug!(%ns, api = %name, pod = %pod_name, phase = ?SyncPhase::Applying, "Pushing bundle");
            match ctx.graphman.apply(&target, &bundle).await {
                Ok(()) => {
                    ctx.metrics.push(ns, tag);
                    tracing::info!(%ns, api = %name, pod = %pod_name, "Applied bundle");
                    status.upsert_target(TargetStatus {
                        pod: pod_name,
                        deployment: tag.clone(),
                        checksum: sum.clone(),
                        phase: SyncPhase::Synced,
                        ready: true,
                        last_updated: condition::now(),
                    });
                }
                Err(error) => {
                    ctx.metrics.failure(ns, tag);
                    tracing::warn!(%ns, api = %name, pod = %pod_name, %error, "Failed to apply bundle");
                    ctx.events
                        .publish(
                            &api.object_ref(&()),
                            Event::warning(
                                "ApplyFailed",
                                "Apply",
                                format!("pod {pod_name}: {error}"),
                            ),
                        )
                        .await;
                    failures.push(format!("{pod_name}: {error}"));
                }
            }
        }
    }

    // Pods of deployments that are no longer declared get the removal bundle
    // and keep their entries until it is accepted.
    let mut retired = BTreeMap::<String, BTreeSet<String>>::new();
    for t in &status.targets {
        if !api.spec.deployment_tags.contains(&t.deployment) {
            retired
                .entry(t.deployment.clone())
                .or_default()
                .insert(t.pod.clone());
        }
    }
    let mut holding = HashSet::new();
    if !retired.is_empty() {
        let removal = serde_json::to_vec(&removal_bundle(api))?;
        for (tag, pods) in &retired {
            for pod in remove_from(ctx, ns, api, &removal, tag, Some(pods)).await {
                failures.push(format!("{pod}: bundle not removed"));
                holding.insert((pod, tag.clone()));
            }
        }
    }

    // Forget pods that left a deployment. Deployments that could not be
    // listed keep their entries.
    status.targets.retain(|t| {
        if !api.spec.deployment_tags.contains(&t.deployment) {
            return holding.contains(&(t.pod.clone(), t.deployment.clone()));
        }
        listed
            .get(t.deployment.as_str())
            .map_or(true, |pods| pods.contains(&t.pod))
    });

    status.phase = Some(ApiPhase::Active);
    status.ready = failures.is_empty();
    if failures.is_empty() {
        status.checksum = Some(sum);
        condition::set(
            &mut status.conditions,
            Condition::new(condition::READY, true, "Synced", ""),
        );
    } else {
        condition::set(
            &mut status.conditions,
            Condition::new(condition::READY, false, "ApplyFailed", failures.join("; ")),
        );
    }

    if status != previous {
        let patch = json!({
            "metadata": { "resourceVersion": api.resource_version() },
            "status": status,
        });
        ctx.store.patch_status::<L7Api>(ns, &name, &patch).await?;
    }
    Ok(())
}

/// Sends a removal bundle to every ready pod of every declared deployment
/// and of every deployment the status still records. Failures are logged
/// and do not hold up the teardown.
async fn remove_everywhere<S: Store>(ctx: &Context<S>, ns: &str, api: &L7Api) {
    let removal = match serde_json::to_vec(&removal_bundle(api)) {
        Ok(bytes) => bytes,
        Err(error) => {
            tracing::error!(%ns, api = %api.name_any(), %error, "Failed to encode removal bundle");
            return;
        }
    };

    let recorded = api.status.iter().flat_map(|s| s.targets.iter());
    let mut seen = HashSet::new();
    let tags = api
        .spec
        .deployment_tags
        .iter()
        .chain(recorded.map(|t| &t.deployment))
        .filter(|tag| seen.insert(*tag))
        .collect::<Vec<_>>();
    for tag in tags {
        remove_from(ctx, ns, api, &removal, tag, None).await;
    }
}

/// Sends a removal bundle to the ready pods of one deployment, or only to
/// the named ones.
///
/// Returns the named pods that may still hold the bundle. Pods that no
/// longer exist, and gateways that are gone or database-backed, hold nothing.
async fn remove_from<S: Store>(
    ctx: &Context<S>,
    ns: &str,
    api: &L7Api,
    removal: &[u8],
    tag: &str,
    only: Option<&BTreeSet<String>>,
) -> BTreeSet<String> {
    let name = api.name_any();
    let unreached = || only.cloned().unwrap_or_default();

    let gateway = match ctx.store.get::<Gateway>(ns, tag).await {
        Ok(Some(gateway)) if !gateway.is_database_backed() => gateway,
        Ok(_) => return BTreeSet::new(),
        Err(error) => {
            tracing::warn!(%ns, api = %name, gateway = %tag, %error, "Failed to read gateway");
            return unreached();
        }
    };
    let pods = match ctx.store.list::<Pod>(ns, &labels::gateway_pods(tag)).await {
        Ok(pods) => pods,
        Err(error) => {
            tracing::warn!(%ns, api = %name, gateway = %tag, %error, "Failed to list gateway pods");
            return unreached();
        }
    };
    let credentials = match admin_credentials(&ctx.store, ns, &gateway).await {
        Ok(c) => c,
        Err(error) => {
            tracing::warn!(%ns, api = %name, gateway = %tag, %error, "Failed to read gateway credentials");
            return unreached();
        }
    };

    let mut holding = BTreeSet::new();
    let wanted = pods
        .iter()
        .filter(|p| only.map_or(true, |names| names.contains(&p.name_any())));
    for pod in wanted {
        let target = if pod::is_ready(pod) {
            reachable(ctx, &gateway, pod, Some(&credentials))
        } else {
            None
        };
        let Some(target) = target else {
            holding.insert(pod.name_any());
            continue;
        };
        tracing::debug!(%ns, api = %name, pod = %target.pod, phase = ?SyncPhase::Removing, "Removing bundle");
        match ctx.graphman.remove(&target, removal).await {
            Ok(()) => {
                ctx.metrics.removal(ns, tag);
                tracing::info!(%ns, api = %name, pod = %target.pod, "Removed bundle");
            }
            Err(error) => {
                ctx.metrics.failure(ns, tag);
                tracing::warn!(%ns, api = %name, pod = %target.pod, %error, "Failed to remove bundle");
                holding.insert(target.pod);
            }
        }
    }
    holding
}

/// Records the removal in the status. A failed write is logged and the
/// teardown proceeds with the phase set locally.
async fn record_removed<S: Store>(ctx: &Context<S>, ns: &str, api: &L7Api) -> L7Api {
    let status = L7ApiStatus {
        ready: false,
        checksum: None,
        targets: Vec::new(),
        phase: Some(ApiPhase::Removed),
        conditions: api
            .status
            .as_ref()
            .map(|s| s.conditions.clone())
            .unwrap_or_default(),
    };
    let patch = json!({
        "metadata": { "resourceVersion": api.resource_version() },
        "status": status,
    });
    match ctx
        .store
        .patch_status::<L7Api>(ns, &api.name_any(), &patch)
        .await
    {
        Ok(updated) => updated,
        Err(error) => {
            tracing::warn!(%ns, api = %api.name_any(), %error, "Failed to record removal");
            let mut api = api.clone();
            api.status = Some(status);
            api
        }
    }
}

async fn release_finalizer<S: Store>(store: &S, ns: &str, api: &L7Api) -> Result<()> {
    let finalizers = api
        .finalizers()
        .iter()
        .filter(|f| *f != API_FINALIZER)
        .cloned()
        .collect::<Vec<_>>();
    let patch = json!({ "metadata": { "finalizers": finalizers } });
    match store.patch::<L7Api>(ns, &api.name_any(), &patch).await {
        Ok(_) | Err(Error::NotFound { .. }) => Ok(()),
        Err(error) => Err(error),
    }
}

/// The removal bundle for everything the API's bundle installed.
///
/// Falls back to the API's service URL and fragment name when the bundle
/// cannot be read.
fn removal_bundle(api: &L7Api) -> Bundle {
    let installed = encoding::decode_json::<Bundle>(&api.spec.graphman_bundle).ok();
    let resolution_path = installed
        .as_ref()
        .and_then(|b| b.web_api_services.first())
        .map(|s| s.resolution_path.clone())
        .unwrap_or_else(|| api.spec.service_url.clone());
    let fragment = installed
        .as_ref()
        .and_then(|b| b.policy_fragments.first())
        .map(|f| f.name.clone())
        .or_else(|| api.spec.portal_meta.as_ref().map(|m| m.fragment_name.clone()))
        .unwrap_or_else(|| format!("{}-fragment", api.spec.name));
    Bundle::removal(&resolution_path, &fragment)
}

async fn admin_credentials<S: Store>(
    store: &S,
    ns: &str,
    gateway: &Gateway,
) -> Result<(String, String)> {
    let secret_name = gateway.admin_secret_name();
    let secret = store
        .get::<Secret>(ns, secret_name)
        .await?
        .ok_or_else(|| Error::NotFound {
            kind: "Secret".to_string(),
            name: secret_name.to_string(),
        })?;
    let value = |key: &'static str| {
        secret_value(&secret, key).ok_or_else(|| Error::MissingKey {
            secret: secret_name.to_string(),
            key,
        })
    };
    Ok((value(ADMIN_USERNAME_KEY)?, value(ADMIN_PASSWORD_KEY)?))
}

/// The management endpoint of a pod, if it has an address.
fn reachable<S>(
    ctx: &Context<S>,
    gateway: &Gateway,
    pod: &Pod,
    credentials: Option<&(String, String)>,
) -> Option<Target> {
    let (username, password) = credentials?;
    let Some(address) = pod::ip(pod) else {
        tracing::debug!(pod = %pod.name_any(), "Pod has no IP");
        return None;
    };
    Some(Target {
        pod: pod.name_any(),
        address: address.to_string(),
        port: gateway.graphman_port(ctx.config.graphman_port),
        username: username.clone(),
        password: password.clone(),
    })
}
