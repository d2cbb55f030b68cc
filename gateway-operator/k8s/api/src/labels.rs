use std::{collections::BTreeMap, sync::Arc};

pub type Map = BTreeMap<String, String>;

/// Names the `L7Api` an object belongs to.
pub const API: &str = "l7.operator.dev/api";

/// Names the `L7Portal` an object was published by.
pub const PORTAL: &str = "l7.operator.dev/portal";

/// Records the checksum of the content an object was last written with.
pub const CHECKSUM: &str = "l7.operator.dev/checksum";

/// Selects the pods of a gateway deployment.
pub const GATEWAY_NAME: &str = "app.kubernetes.io/name";

/// Label values may not exceed this length.
const MAX_VALUE_LEN: usize = 63;

#[derive(Clone, Debug, Eq, Default)]
pub struct Labels(Arc<Map>);

// === Labels ===

impl Labels {
    /// Formats the labels as an equality-based label selector.
    pub fn selector(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Returns true if every label is present in `labels` with the same value.
    pub fn matches(&self, labels: &Map) -> bool {
        self.0.iter().all(|(k, v)| labels.get(k) == Some(v))
    }

    /// Writes each label into `target`, leaving unrelated keys in place.
    ///
    /// Returns true if `target` was modified.
    pub fn merge_into(&self, target: &mut Map) -> bool {
        let mut changed = false;
        for (k, v) in self.0.iter() {
            if target.get(k) != Some(v) {
                target.insert(k.clone(), v.clone());
                changed = true;
            }
        }
        changed
    }
}

impl From<Map> for Labels {
    #[inline]
    fn from(labels: Map) -> Self {
        Self(Arc::new(labels))
    }
}

impl From<Option<Map>> for Labels {
    #[inline]
    fn from(labels: Option<Map>) -> Self {
        labels.unwrap_or_default().into()
    }
}

impl AsRef<Map> for Labels {
    #[inline]
    fn as_ref(&self) -> &Map {
        self.0.as_ref()
    }
}

impl<T: AsRef<Map>> std::cmp::PartialEq<T> for Labels {
    #[inline]
    fn eq(&self, t: &T) -> bool {
        self.0.as_ref().eq(t.as_ref())
    }
}

impl std::iter::FromIterator<(String, String)> for Labels {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(Arc::new(iter.into_iter().collect()))
    }
}

impl<'a> std::iter::FromIterator<(&'a str, &'a str)> for Labels {
    fn from_iter<T: IntoIterator<Item = (&'a str, &'a str)>>(iter: T) -> Self {
        iter.into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

/// Converts a display name into a valid object name and label value.
///
/// The name is lowercased, spaces become hyphens and any other character
/// outside `[a-z0-9.-]` is removed. The result never starts or ends with a
/// separator.
pub fn normalize(name: &str) -> String {
    let mut out = name
        .chars()
        .flat_map(char::to_lowercase)
        .filter_map(|c| match c {
            ' ' => Some('-'),
            'a'..='z' | '0'..='9' | '-' | '.' => Some(c),
            _ => None,
        })
        .collect::<String>();
    out.truncate(MAX_VALUE_LEN);
    out.trim_matches(|c| c == '-' || c == '.').to_string()
}

/// The label selector matching a gateway's pods.
pub fn gateway_pods(gateway: &str) -> String {
    Labels::from_iter([(GATEWAY_NAME, gateway)]).selector()
}
