use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const READY: &str = "Ready";

/// A status condition in the shape of `metav1.Condition`, with the
/// transition time kept as an RFC 3339 string.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub last_transition_time: String,
}

// === impl Condition ===

impl Condition {
    pub fn new(type_: &str, ok: bool, reason: &str, message: impl Into<String>) -> Self {
        Self {
            type_: type_.to_string(),
            status: if ok { "True" } else { "False" }.to_string(),
            reason: reason.to_string(),
            message: message.into(),
            last_transition_time: now(),
        }
    }

    pub fn is_true(&self) -> bool {
        self.status == "True"
    }

    fn same_state(&self, other: &Self) -> bool {
        self.type_ == other.type_
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }
}

/// Inserts or replaces the condition of the same type.
///
/// An existing condition in the same state is left untouched, including its
/// transition time, so that repeated reconciles produce identical statuses.
pub fn set(conditions: &mut Vec<Condition>, condition: Condition) {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) if existing.same_state(&condition) => {}
        Some(existing) => *existing = condition,
        None => conditions.push(condition),
    }
}

pub fn find<'c>(conditions: &'c [Condition], type_: &str) -> Option<&'c Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// The current time formatted for status fields.
pub fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unchanged_condition_keeps_transition_time() {
        let mut conditions = vec![Condition {
            last_transition_time: "2020-01-01T00:00:00Z".to_string(),
            ..Condition::new(READY, true, "Synced", "")
        }];
        set(&mut conditions, Condition::new(READY, true, "Synced", ""));
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].last_transition_time, "2020-01-01T00:00:00Z");

        set(&mut conditions, Condition::new(READY, false, "PushFailed", "boom"));
        assert_eq!(conditions.len(), 1);
        assert!(!conditions[0].is_true());
        assert_ne!(conditions[0].last_transition_time, "2020-01-01T00:00:00Z");
    }

    #[test]
    fn appends_new_types() {
        let mut conditions = Vec::new();
        set(&mut conditions, Condition::new(READY, true, "Synced", ""));
        set(&mut conditions, Condition::new("Probed", false, "Timeout", ""));
        assert_eq!(conditions.len(), 2);
        assert_eq!(find(&conditions, "Probed").map(|c| c.reason.as_str()), Some("Timeout"));
    }
}
