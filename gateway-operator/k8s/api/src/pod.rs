use crate::Pod;

/// Returns true if the pod reports a `Ready` condition with status `True`.
pub fn is_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .into_iter()
        .flatten()
        .any(|c| c.type_ == "Ready" && c.status == "True")
}

pub fn ip(pod: &Pod) -> Option<&str> {
    pod.status.as_ref()?.pod_ip.as_deref()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PodStatus;
    use k8s_openapi::api::core::v1::PodCondition;

    fn pod(ready: &str, ip: Option<&str>) -> Pod {
        Pod {
            status: Some(PodStatus {
                conditions: Some(vec![PodCondition {
                    type_: "Ready".to_string(),
                    status: ready.to_string(),
                    ..Default::default()
                }]),
                pod_ip: ip.map(Into::into),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn readiness() {
        assert!(is_ready(&pod("True", Some("10.0.0.1"))));
        assert!(!is_ready(&pod("False", Some("10.0.0.1"))));
        assert!(!is_ready(&Pod::default()));
        assert_eq!(ip(&pod("True", Some("10.0.0.1"))), Some("10.0.0.1"));
        assert_eq!(ip(&pod("True", None)), None);
    }
}
