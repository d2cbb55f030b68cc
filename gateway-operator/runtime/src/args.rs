use crate::{
    k8s::{Api, Client, L7Api, L7Portal, L7StateStore, Resource},
    sync::{
        self, distribute,
        events::KubeEvents,
        graphman::HttpGraphman,
        inventory::Sources,
        metrics::{DistributionMetrics, SchedulerMetrics},
        portal,
        probe::RedisProbe,
        state_store, Context, KubeStore, Scheduler,
    },
};
use anyhow::{bail, Result};
use clap::Parser;
use futures::{future, prelude::*};
use kube::runtime::{
    controller::{self, Action},
    reflector::ObjectRef,
    watcher, Controller,
};
use prometheus_client::registry::Registry;
use std::{sync::Arc, time::Duration};
use tracing::{info_span, Instrument};

/// Reported as the source of published events.
const CONTROLLER_NAME: &str = "gateway-operator";

#[derive(Debug, Parser)]
#[clap(
    name = "gateway-operator",
    about = "Publishes developer portal APIs to layer 7 gateways"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "gateway=info,warn",
        env = "GATEWAY_OPERATOR_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Seconds between portal sync runs, for portals that do not set their
    /// own interval.
    #[clap(long, default_value = "10", env = "GATEWAY_OPERATOR_SYNC_INTERVAL_SECS")]
    sync_interval_secs: u64,

    /// Seconds before an `L7Api` or `L7StateStore` is reconciled again.
    #[clap(long, default_value = "10", env = "GATEWAY_OPERATOR_REQUEUE_SECS")]
    requeue_secs: u64,

    /// Management port used for gateways that do not declare one.
    #[clap(long, default_value = "9443", env = "GATEWAY_OPERATOR_GRAPHMAN_PORT")]
    graphman_port: u16,

    /// Bound for every outbound HTTP and TCP call.
    #[clap(long, default_value = "5", env = "GATEWAY_OPERATOR_REQUEST_TIMEOUT_SECS")]
    request_timeout_secs: u64,

    #[clap(
        long,
        default_value = "30",
        env = "GATEWAY_OPERATOR_CACHE_REFRESH_WINDOW_SECS"
    )]
    cache_refresh_window_secs: u64,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            sync_interval_secs,
            requeue_secs,
            graphman_port,
            request_timeout_secs,
            cache_refresh_window_secs,
        } = self;

        let timeout = Duration::from_secs(request_timeout_secs);
        let config = sync::Config {
            requeue: Duration::from_secs(requeue_secs),
            sync_interval: Duration::from_secs(sync_interval_secs),
            graphman_port,
            cache_refresh_window: Duration::from_secs(cache_refresh_window_secs),
        };

        let mut prom = <Registry>::default();
        let distribution_metrics =
            DistributionMetrics::register(prom.sub_registry_with_prefix("distribution"));
        let scheduler_metrics =
            SchedulerMetrics::register(prom.sub_registry_with_prefix("scheduler"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        let client = runtime.client();
        let store = KubeStore::new(client.clone(), timeout);
        let ctx = Arc::new(Context {
            store: store.clone(),
            graphman: Arc::new(HttpGraphman::new(timeout)?),
            events: Arc::new(KubeEvents::new(client.clone(), CONTROLLER_NAME)),
            probe: Arc::new(RedisProbe::new(timeout)),
            sources: Arc::new(Sources::new(store, timeout)?),
            scheduler: Scheduler::new(scheduler_metrics),
            metrics: distribution_metrics,
            config,
        });

        // Spawn a controller per custom resource kind. Kinds whose CRD is not
        // installed are skipped.

        if api_resource_exists::<L7Api>(&client).await {
            tokio::spawn(
                Controller::new(Api::<L7Api>::all(client.clone()), watcher::Config::default())
                    .run(distribute::reconcile, sync::error_policy, ctx.clone())
                    .for_each(report)
                    .instrument(info_span!("l7apis")),
            );
        } else {
            tracing::warn!("l7apis.l7.operator.dev resource kind not found, skipping controller");
        }

        if api_resource_exists::<L7Portal>(&client).await {
            tokio::spawn(
                Controller::new(
                    Api::<L7Portal>::all(client.clone()),
                    watcher::Config::default(),
                )
                .run(portal::reconcile, sync::error_policy, ctx.clone())
                .for_each(report)
                .instrument(info_span!("l7portals")),
            );
        } else {
            tracing::warn!(
                "l7portals.l7.operator.dev resource kind not found, skipping controller"
            );
        }

        if api_resource_exists::<L7StateStore>(&client).await {
            tokio::spawn(
                Controller::new(
                    Api::<L7StateStore>::all(client.clone()),
                    watcher::Config::default(),
                )
                .run(state_store::reconcile, sync::error_policy, ctx.clone())
                .for_each(report)
                .instrument(info_span!("l7statestores")),
            );
        } else {
            tracing::warn!(
                "l7statestores.l7.operator.dev resource kind not found, skipping controller"
            );
        }

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}

/// Logs a controller outcome. Reconcile failures are already logged, with
/// their object, by the error policy.
fn report<K>(
    outcome: Result<(ObjectRef<K>, Action), controller::Error<sync::Error, watcher::Error>>,
) -> future::Ready<()>
where
    K: Resource<DynamicType = ()>,
{
    match outcome {
        Ok((obj, action)) => {
            tracing::debug!(namespace = ?obj.namespace, name = %obj.name, ?action, "Reconciled");
        }
        Err(controller::Error::ReconcilerFailed(..)) => {}
        Err(error) => tracing::warn!(%error, "Controller error"),
    }
    future::ready(())
}

async fn api_resource_exists<T>(client: &Client) -> bool
where
    T: Resource,
    T::DynamicType: Default,
{
    let dt = Default::default();
    client
        .list_api_group_resources(&T::api_version(&dt))
        .await
        .ok()
        .iter()
        .flat_map(|r| r.resources.iter())
        .any(|r| r.kind == T::kind(&dt))
}
