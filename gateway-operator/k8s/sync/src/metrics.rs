use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

/// Counts bundle distribution outcomes per gateway deployment.
#[derive(Clone, Debug, Default)]
pub struct DistributionMetrics {
    pushes: Family<DeploymentLabels, Counter>,
    removals: Family<DeploymentLabels, Counter>,
    failures: Family<DeploymentLabels, Counter>,
    skipped: Family<DeploymentLabels, Counter>,
}

/// Counts scheduled job runs per job kind.
#[derive(Clone, Debug, Default)]
pub struct SchedulerMetrics {
    runs: Family<JobLabels, Counter>,
    failures: Family<JobLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct DeploymentLabels {
    namespace: String,
    deployment: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct JobLabels {
    job: String,
}

// === impl DistributionMetrics ===

impl DistributionMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let metrics = Self::default();
        prom.register(
            "bundle_pushes",
            "Count of bundles applied to gateway pods",
            metrics.pushes.clone(),
        );
        prom.register(
            "bundle_removals",
            "Count of removal bundles sent to gateway pods",
            metrics.removals.clone(),
        );
        prom.register(
            "bundle_failures",
            "Count of failed pushes to gateway pods",
            metrics.failures.clone(),
        );
        prom.register(
            "bundle_skipped",
            "Count of gateway pods skipped because they were not ready or already in sync",
            metrics.skipped.clone(),
        );
        metrics
    }

    pub(crate) fn push(&self, namespace: &str, deployment: &str) {
        self.pushes.get_or_create(&labels(namespace, deployment)).inc();
    }

    pub(crate) fn removal(&self, namespace: &str, deployment: &str) {
        self.removals
            .get_or_create(&labels(namespace, deployment))
            .inc();
    }

    pub(crate) fn failure(&self, namespace: &str, deployment: &str) {
        self.failures
            .get_or_create(&labels(namespace, deployment))
            .inc();
    }

    pub(crate) fn skip(&self, namespace: &str, deployment: &str) {
        self.skipped.get_or_create(&labels(namespace, deployment)).inc();
    }
}

fn labels(namespace: &str, deployment: &str) -> DeploymentLabels {
    DeploymentLabels {
        namespace: namespace.to_string(),
        deployment: deployment.to_string(),
    }
}

// === impl SchedulerMetrics ===

impl SchedulerMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let metrics = Self::default();
        prom.register("job_runs", "Count of scheduled job runs", metrics.runs.clone());
        prom.register(
            "job_failures",
            "Count of scheduled job runs that failed",
            metrics.failures.clone(),
        );
        metrics
    }

    pub(crate) fn run(&self, job: &str) {
        self.runs
            .get_or_create(&JobLabels {
                job: job.to_string(),
            })
            .inc();
    }

    pub(crate) fn failure(&self, job: &str) {
        self.failures
            .get_or_create(&JobLabels {
                job: job.to_string(),
            })
            .inc();
    }
}
