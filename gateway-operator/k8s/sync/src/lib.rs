#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod distribute;
mod error;
pub mod events;
pub mod graphman;
pub mod inventory;
pub mod lifecycle;
pub mod metrics;
mod objects;
pub mod portal;
pub mod probe;
pub mod scheduler;
pub mod state_store;
pub mod store;


pub use self::{
    error::{Error, Result},
    scheduler::{Scheduler, Tick},
    store::{KubeStore, Store},
};

use self::{
    events::EventSink, graphman::GraphmanClient, inventory::SourceProvider,
    metrics::DistributionMetrics, probe::StoreProbe,
};
use gateway_operator_k8s_api::{ResourceExt, Secret};
use kube::runtime::controller::Action;
use std::{sync::Arc, time::Duration};

/// Operator-wide settings.
#[derive(Clone, Debug)]
pub struct Config {
    /// How often `L7Api` and `L7StateStore` resources are reconciled again.
    pub requeue: Duration,
    /// Portal job interval when a portal does not set its own.
    pub sync_interval: Duration,
    pub graphman_port: u16,
    /// A cache-directory inventory is not re-read within this window unless
    /// it has changed.
    pub cache_refresh_window: Duration,
}

/// Everything a reconcile needs.
pub struct Context<S> {
    pub store: S,
    pub graphman: Arc<dyn GraphmanClient>,
    pub events: Arc<dyn EventSink>,
    pub probe: Arc<dyn StoreProbe>,
    pub sources: Arc<dyn SourceProvider>,
    pub scheduler: Scheduler,
    pub metrics: DistributionMetrics,
    pub config: Config,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            requeue: Duration::from_secs(10),
            sync_interval: Duration::from_secs(10),
            graphman_port: 9443,
            cache_refresh_window: Duration::from_secs(30),
        }
    }
}

/// Logs a failed reconcile and retries it after the requeue delay.
pub fn error_policy<K, S>(obj: Arc<K>, error: &Error, ctx: Arc<Context<S>>) -> Action
where
    K: kube::Resource<DynamicType = ()>,
{
    tracing::warn!(
        kind = %K::kind(&()),
        namespace = %obj.namespace().unwrap_or_default(),
        name = %obj.name_any(),
        %error,
        "Reconcile failed"
    );
    Action::requeue(ctx.config.requeue)
}

/// Reads a secret entry from `data`, falling back to `stringData`.
pub(crate) fn secret_value(secret: &Secret, key: &str) -> Option<String> {
    if let Some(v) = secret.data.as_ref().and_then(|d| d.get(key)) {
        return String::from_utf8(v.0.clone()).ok();
    }
    secret.string_data.as_ref()?.get(key).cloned()
}

pub(crate) fn namespace<K: kube::Resource>(obj: &K) -> Result<String> {
    obj.meta().namespace.clone().ok_or(Error::MissingField {
        kind: "object",
        field: "metadata.namespace",
    })
}
