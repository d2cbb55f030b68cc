use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{self, EventType, Recorder, Reporter};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Kind {
    Normal,
    Warning,
}

/// A Kubernetes event to record against an object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pub kind: Kind,
    pub reason: &'static str,
    pub action: &'static str,
    pub note: String,
}

/// Records events. Failures to record are logged and otherwise ignored.
#[async_trait::async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, object: &ObjectReference, event: Event);
}

pub struct KubeEvents {
    recorder: Recorder,
}

// === impl Event ===

impl Event {
    pub fn normal(reason: &'static str, action: &'static str, note: impl Into<String>) -> Self {
        Self {
            kind: Kind::Normal,
            reason,
            action,
            note: note.into(),
        }
    }

    pub fn warning(reason: &'static str, action: &'static str, note: impl Into<String>) -> Self {
        Self {
            kind: Kind::Warning,
            reason,
            action,
            note: note.into(),
        }
    }
}

// === impl KubeEvents ===

impl KubeEvents {
    pub fn new(client: kube::Client, controller: &str) -> Self {
        let reporter = Reporter {
            controller: controller.to_string(),
            instance: std::env::var("HOSTNAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait::async_trait]
impl EventSink for KubeEvents {
    async fn publish(&self, object: &ObjectReference, event: Event) {
        let Event {
            kind,
            reason,
            action,
            note,
        } = event;
        let ev = events::Event {
            type_: match kind {
                Kind::Normal => EventType::Normal,
                Kind::Warning => EventType::Warning,
            },
            reason: reason.to_string(),
            note: Some(note),
            action: action.to_string(),
            secondary: None,
        };
        if let Err(error) = self.recorder.publish(&ev, object).await {
            tracing::warn!(%error, %reason, "Failed to record event");
        }
    }
}
