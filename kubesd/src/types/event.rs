use serde::{Deserialize, Deserializer};
use serde_json::value::RawValue;
use std::fmt;

use crate::types::TargetLabels;

/// Capacity of the downstream event channel.
///
/// Producers block when the channel is full; no events are coalesced or
/// dropped.
pub const SYNC_EVENT_CHANNEL_CAPACITY: usize = 100;

/// A change notification for one discovered object's scrape targets.
///
/// Consumers replace the target group identified by `key` with `labels`, or
/// retire it when `labels` is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncEvent {
    /// Stable target group identifier: `<kind>/<set name>/<object key>`.
    pub key: String,
    /// The fresh target label sets, or `None` for a deletion.
    pub labels: Option<Vec<TargetLabels>>,
    /// Identifier of the configuration section producing these targets.
    pub config_section_set: String,
}

/// Builds the stable key under which one object's targets are published.
pub fn build_sync_key(kind: &str, set_name: &str, object_key: &str) -> String {
    format!("{kind}/{set_name}/{object_key}")
}

/// Action attached to a watch frame.
///
/// Unknown action strings are preserved so they can be reported verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Added,
    Modified,
    Deleted,
    Bookmark,
    Error,
    Unknown(String),
}

impl From<String> for Action {
    fn from(value: String) -> Self {
        match value.as_str() {
            "ADDED" => Action::Added,
            "MODIFIED" => Action::Modified,
            "DELETED" => Action::Deleted,
            "BOOKMARK" => Action::Bookmark,
            "ERROR" => Action::Error,
            _ => Action::Unknown(value),
        }
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(String::deserialize(deserializer)?.into())
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Added => f.write_str("ADDED"),
            Action::Modified => f.write_str("MODIFIED"),
            Action::Deleted => f.write_str("DELETED"),
            Action::Bookmark => f.write_str("BOOKMARK"),
            Action::Error => f.write_str("ERROR"),
            Action::Unknown(other) => f.write_str(other),
        }
    }
}

/// One frame of a Kubernetes watch stream.
///
/// The object payload is kept raw; each watcher decodes it into its own kind
/// and drops frames that fail to decode.
#[derive(Debug, Deserialize)]
pub struct WatchEvent {
    /// The action performed on the object.
    #[serde(rename = "type")]
    pub action: Action,
    /// The raw JSON of the affected object.
    pub object: Box<RawValue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_actions_parse() {
        let event: WatchEvent =
            serde_json::from_str(r#"{"type": "ADDED", "object": {"metadata": {}}}"#).unwrap();
        assert_eq!(event.action, Action::Added);

        let event: WatchEvent =
            serde_json::from_str(r#"{"type": "DELETED", "object": {}}"#).unwrap();
        assert_eq!(event.action, Action::Deleted);
    }

    #[test]
    fn unknown_actions_preserve_the_string() {
        let event: WatchEvent =
            serde_json::from_str(r#"{"type": "REORDERED", "object": {}}"#).unwrap();
        assert_eq!(event.action, Action::Unknown("REORDERED".to_string()));
        assert_eq!(event.action.to_string(), "REORDERED");
    }

    #[test]
    fn sync_keys_are_stable() {
        assert_eq!(
            build_sync_key("endpoints", "job-0", "ns1/svc1"),
            "endpoints/job-0/ns1/svc1"
        );
        assert_eq!(build_sync_key("node", "job-0", "node-1"), "node/job-0/node-1");
    }
}
