//! Runs tag-addressed periodic jobs.
//!
//! Each registered job runs on its own task: once immediately, then every
//! interval or whenever it is triggered. A job ends by returning
//! [`Tick::Stop`] or by being cancelled.

use crate::{metrics::SchedulerMetrics, Result};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{sync::Notify, task::JoinHandle, time};
use tracing::{info_span, Instrument};

/// What a job wants to happen after a run.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Tick {
    Continue,
    Stop,
}

/// A handle to a job table. Clones share the same table.
#[derive(Clone, Default)]
pub struct Scheduler {
    jobs: Arc<Mutex<HashMap<String, Entry>>>,
    ids: Arc<AtomicU64>,
    metrics: SchedulerMetrics,
}

struct Entry {
    id: u64,
    interval: Duration,
    trigger: Arc<Notify>,
    task: JoinHandle<()>,
}

// === impl Scheduler ===

impl Scheduler {
    pub fn new(metrics: SchedulerMetrics) -> Self {
        Self {
            metrics,
            ..Default::default()
        }
    }

    /// Registers a job under `tag`. Returns false, leaving the existing job
    /// in place, if the tag is already registered.
    pub fn register<F, Fut>(&self, tag: impl Into<String>, interval: Duration, job: F) -> bool
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Tick>> + Send + 'static,
    {
        let tag = tag.into();
        let mut jobs = self.jobs.lock();
        if jobs.contains_key(&tag) {
            return false;
        }

        let id = self.ids.fetch_add(1, Ordering::Relaxed);
        let trigger = Arc::new(Notify::new());
        let task = tokio::spawn(
            run(
                self.clone(),
                tag.clone(),
                id,
                interval,
                trigger.clone(),
                job,
            )
            .instrument(info_span!("job", %tag)),
        );
        jobs.insert(
            tag,
            Entry {
                id,
                interval,
                trigger,
                task,
            },
        );
        true
    }

    pub fn is_registered(&self, tag: &str) -> bool {
        self.jobs.lock().contains_key(tag)
    }

    pub fn interval(&self, tag: &str) -> Option<Duration> {
        self.jobs.lock().get(tag).map(|e| e.interval)
    }

    /// Stops a job immediately, aborting a run in progress.
    pub fn cancel(&self, tag: &str) -> bool {
        match self.jobs.lock().remove(tag) {
            Some(entry) => {
                entry.task.abort();
                tracing::debug!(%tag, "Cancelled job");
                true
            }
            None => false,
        }
    }

    /// Runs a job as soon as it is idle, without waiting for its interval.
    pub fn trigger(&self, tag: &str) -> bool {
        match self.jobs.lock().get(tag) {
            Some(entry) => {
                entry.trigger.notify_one();
                true
            }
            None => false,
        }
    }

    pub fn tags(&self) -> Vec<String> {
        let mut tags = self.jobs.lock().keys().cloned().collect::<Vec<_>>();
        tags.sort();
        tags
    }

    /// Removes the entry for `tag` if it still belongs to job `id`.
    fn unregister(&self, tag: &str, id: u64) {
        let mut jobs = self.jobs.lock();
        if jobs.get(tag).is_some_and(|e| e.id == id) {
            jobs.remove(tag);
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("tags", &self.tags())
            .finish()
    }
}

async fn run<F, Fut>(
    scheduler: Scheduler,
    tag: String,
    id: u64,
    interval: Duration,
    trigger: Arc<Notify>,
    job: F,
) where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Tick>>,
{
    // Jobs are labeled by the last tag segment, e.g. `sync-inventory`.
    let kind = tag.rsplit('/').next().unwrap_or_default().to_string();
    let mut ticks = time::interval(interval);
    ticks.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticks.tick() => {}
            _ = trigger.notified() => {}
        }

        match job().await {
            Ok(Tick::Continue) => scheduler.metrics.run(&kind),
            Ok(Tick::Stop) => {
                scheduler.metrics.run(&kind);
                tracing::debug!("Job stopped");
                scheduler.unregister(&tag, id);
                return;
            }
            Err(error) => {
                scheduler.metrics.failure(&kind);
                tracing::warn!(%error, "Job failed");
            }
        }
    }
}
