//! Keeps a portal's inventory and its published `L7Api`s in sync.
//!
//! Each enabled portal owns two scheduled jobs. The inventory job fetches
//! descriptors, records the summary and snapshot ConfigMaps and removes APIs
//! that left the inventory. The entities job renders, translates and upserts
//! an `L7Api` for every descriptor in the snapshot.

use crate::{
    lifecycle,
    objects::{self, Write},
    scheduler::Tick,
    store::Store,
    Context, Result,
};
use gateway_operator_core::{
    encoding::{self, Compression},
    summary::{ApiSummary, Inventory},
    template, translate, ApiDescriptor,
};
use gateway_operator_k8s_api::{
    condition, is_deleting, labels, ConfigMap, L7Portal, L7PortalStatus, ObjectMeta, Resource,
    ResourceExt,
};
use kube::runtime::controller::Action;
use parking_lot::Mutex;
use serde_json::json;
use std::{
    collections::HashSet,
    sync::Arc,
    time::{Duration, SystemTime},
};
use tracing::Instrument;

/// ConfigMap key holding the encoded summary.
pub const SUMMARY_KEY: &str = "summary";

/// ConfigMap key holding the encoded descriptors.
pub const SNAPSHOT_KEY: &str = "snapshot";

pub fn inventory_tag(ns: &str, name: &str) -> String {
    format!("{ns}/{name}/sync-inventory")
}

pub fn entities_tag(ns: &str, name: &str) -> String {
    format!("{ns}/{name}/sync-entities")
}

/// Registers or cancels a portal's jobs.
pub async fn reconcile<S: Store>(portal: Arc<L7Portal>, ctx: Arc<Context<S>>) -> Result<Action> {
    let ns = crate::namespace(portal.as_ref())?;
    let name = portal.name_any();
    let inventory = inventory_tag(&ns, &name);
    let entities = entities_tag(&ns, &name);

    if is_deleting(portal.as_ref()) || !portal.spec.enabled {
        if ctx.scheduler.cancel(&inventory) | ctx.scheduler.cancel(&entities) {
            tracing::info!(%ns, %name, "Stopped portal sync");
        }
        return Ok(Action::await_change());
    }

    let interval = portal
        .spec
        .sync_interval_seconds
        .map(Duration::from_secs)
        .unwrap_or(ctx.config.sync_interval);

    for tag in [&inventory, &entities] {
        if ctx.scheduler.interval(tag).is_some_and(|i| i != interval) {
            ctx.scheduler.cancel(tag);
        }
    }

    let last_sync = Arc::new(Mutex::new(None));
    let job = {
        let (ctx, ns, name) = (ctx.clone(), ns.clone(), name.clone());
        move || {
            let (ctx, ns, name, last_sync) =
                (ctx.clone(), ns.clone(), name.clone(), last_sync.clone());
            async move { sync_inventory(&ctx, &ns, &name, &last_sync).await }
        }
    };
    if ctx.scheduler.register(inventory.clone(), interval, job) {
        tracing::info!(%ns, %name, ?interval, "Started inventory sync");
    }

    let job = {
        let (ctx, ns, name) = (ctx.clone(), ns.clone(), name.clone());
        move || {
            let (ctx, ns, name) = (ctx.clone(), ns.clone(), name.clone());
            async move { sync_entities(&ctx, &ns, &name).await }
        }
    };
    if ctx.scheduler.register(entities.clone(), interval, job) {
        tracing::info!(%ns, %name, ?interval, "Started entity sync");
    }

    Ok(Action::await_change())
}

/// Fetches the current inventory and records it if it changed.
///
/// `last_sync` holds the completion time of the previous run and gates
/// re-reads of sources that can report modification times.
pub async fn sync_inventory<S: Store>(
    ctx: &Context<S>,
    ns: &str,
    name: &str,
    last_sync: &Mutex<Option<SystemTime>>,
) -> Result<Tick> {
    let Some(portal) = active_portal(&ctx.store, ns, name).await? else {
        return Ok(Tick::Stop);
    };

    let source = ctx.sources.source(&portal).await?;
    let previous_run = *last_sync.lock();
    if let Some(at) = previous_run {
        let fresh = at
            .elapsed()
            .is_ok_and(|age| age < ctx.config.cache_refresh_window);
        if fresh && source.modified_since(at).await? == Some(false) {
            tracing::trace!(%ns, %name, "Inventory unchanged");
            return Ok(Tick::Continue);
        }
    }

    let inventory = Inventory::new(source.fetch().await?)?;
    let summary_name = portal.summary_config_map();
    let current = ctx.store.get::<ConfigMap>(ns, &summary_name).await?;
    let previous = current.as_ref().map(decode_summary).unwrap_or_default();

    let summary = encoding::encode_json(&inventory.summary, Compression::Gzip)?;
    let snapshot = encoding::encode_json(&inventory.descriptors, Compression::Gzip)?;

    // The summary is the record removals are computed from, so it is only
    // written once every removed API is gone. The snapshot goes first so the
    // entities job stops recreating them.
    let snapshot_written = objects::apply(
        &ctx.store,
        ns,
        config_map(&portal, &portal.snapshot_config_map(), SNAPSHOT_KEY, snapshot),
        &inventory.checksum,
    )
    .await?;
    let removed = lifecycle::removed(&previous, &inventory.summary);
    if !removed.is_empty() {
        lifecycle::delete(&ctx.store, ns, &removed).await?;
    }
    let summary_written = objects::apply(
        &ctx.store,
        ns,
        config_map(&portal, &summary_name, SUMMARY_KEY, summary),
        &inventory.checksum,
    )
    .await?;

    let changed = snapshot_written != Write::Unchanged || summary_written != Write::Unchanged;
    if changed {
        tracing::info!(%ns, %name, apis = inventory.summary.len(), removed = removed.len(), checksum = %inventory.checksum, "Inventory changed");
    }

    update_status(ctx, &portal, &inventory, &summary_name).await?;
    *last_sync.lock() = Some(SystemTime::now());

    if changed {
        ctx.scheduler.trigger(&entities_tag(ns, name));
    }
    Ok(Tick::Continue)
}

/// Upserts an `L7Api` for every descriptor in the snapshot.
///
/// A descriptor that fails to render, translate or write is logged and
/// skipped; the others are still processed. So is a descriptor whose name
/// maps to no object name or to the object name of an earlier descriptor.
pub async fn sync_entities<S: Store>(ctx: &Context<S>, ns: &str, name: &str) -> Result<Tick> {
    let Some(portal) = active_portal(&ctx.store, ns, name).await? else {
        return Ok(Tick::Stop);
    };
    let Some(snapshot) = ctx
        .store
        .get::<ConfigMap>(ns, &portal.snapshot_config_map())
        .await?
    else {
        tracing::debug!(%ns, %name, "No snapshot yet");
        return Ok(Tick::Continue);
    };
    let Some(encoded) = snapshot.data.as_ref().and_then(|d| d.get(SNAPSHOT_KEY)) else {
        return Ok(Tick::Continue);
    };
    let descriptors = encoding::decode_json::<Vec<ApiDescriptor>>(encoded)?;

    let (mut created, mut patched, mut failed) = (0, 0, 0);
    let mut claimed = HashSet::new();
    for descriptor in &descriptors {
        let object_name = labels::normalize(&descriptor.name);
        if object_name.is_empty() {
            failed += 1;
            tracing::warn!(%ns, portal = %name, api = %descriptor.name, "API name has no characters usable in an object name");
            continue;
        }
        if !claimed.insert(object_name) {
            failed += 1;
            tracing::warn!(%ns, portal = %name, api = %descriptor.name, "API name collides with another API in the portal");
            continue;
        }
        let span = tracing::debug_span!("api", name = %descriptor.name);
        match sync_entity(ctx, &portal, descriptor).instrument(span).await {
            Ok(lifecycle::Upsert::Created) => created += 1,
            Ok(lifecycle::Upsert::Patched) => patched += 1,
            Ok(lifecycle::Upsert::Unchanged) => {}
            Err(error) => {
                failed += 1;
                tracing::warn!(%ns, portal = %name, api = %descriptor.name, %error, "Failed to sync API");
            }
        }
    }
    if created + patched + failed > 0 {
        tracing::info!(%ns, %name, created, patched, failed, "Synced portal APIs");
    }
    Ok(Tick::Continue)
}

async fn sync_entity<S: Store>(
    ctx: &Context<S>,
    portal: &L7Portal,
    descriptor: &ApiDescriptor,
) -> Result<lifecycle::Upsert> {
    let translation = translate(&template::render(descriptor))?;
    let desired = lifecycle::desired_api(portal, descriptor, &translation)?;
    lifecycle::upsert(&ctx.store, &desired).await
}

async fn active_portal<S: Store>(store: &S, ns: &str, name: &str) -> Result<Option<L7Portal>> {
    let portal = store.get::<L7Portal>(ns, name).await?;
    Ok(portal.filter(|p| p.spec.enabled && !is_deleting(p)))
}

fn decode_summary(cm: &ConfigMap) -> Vec<ApiSummary> {
    let Some(encoded) = cm.data.as_ref().and_then(|d| d.get(SUMMARY_KEY)) else {
        return Vec::new();
    };
    encoding::decode_json(encoded).unwrap_or_else(|error| {
        tracing::warn!(name = %cm.name_any(), %error, "Ignoring unreadable summary");
        Vec::new()
    })
}

fn config_map(portal: &L7Portal, name: &str, key: &str, value: String) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: portal.namespace(),
            labels: Some(
                [(labels::PORTAL.to_string(), portal.name_any())]
                    .into_iter()
                    .collect(),
            ),
            owner_references: portal.controller_owner_ref(&()).map(|r| vec![r]),
            ..Default::default()
        },
        data: Some([(key.to_string(), value)].into_iter().collect()),
        ..Default::default()
    }
}

async fn update_status<S: Store>(
    ctx: &Context<S>,
    portal: &L7Portal,
    inventory: &Inventory,
    summary_name: &str,
) -> Result<()> {
    let current = portal.status.clone().unwrap_or_default();
    let last_updated = if current.checksum.as_deref() == Some(inventory.checksum.as_str()) {
        current.last_updated.clone()
    } else {
        Some(condition::now())
    };
    let desired = L7PortalStatus {
        ready: true,
        api_count: u32::try_from(inventory.summary.len()).unwrap_or(u32::MAX),
        checksum: Some(inventory.checksum.clone()),
        last_updated,
        summary_config_map: Some(summary_name.to_string()),
    };
    if desired == current {
        return Ok(());
    }

    let patch = json!({
        "metadata": { "resourceVersion": portal.resource_version() },
        "status": desired,
    });
    ctx.store
        .patch_status::<L7Portal>(&crate::namespace(portal)?, &portal.name_any(), &patch)
        .await?;
    Ok(())
}
