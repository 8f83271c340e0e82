//! Typed models of the watched Kubernetes object kinds.
//!
//! Each kind models only the fields its label builder reads; unknown JSON
//! fields are ignored and missing fields are defaulted, so partial objects
//! from older or newer API servers still decode.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use crate::error::{ErrorKind, SdError, SdResult};
use crate::types::TargetLabels;

pub mod endpoints;
pub mod endpointslice;
pub mod ingress;
pub mod node;
pub mod pod;
pub mod service;

pub use endpoints::Endpoints;
pub use endpointslice::EndpointSlice;
pub use ingress::Ingress;
pub use node::Node;
pub use pod::Pod;
pub use service::Service;

/// Common Kubernetes object metadata.
///
/// See <https://kubernetes.io/docs/reference/kubernetes-api/common-definitions/object-meta/>.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    pub uid: String,
    pub resource_version: String,
    #[serde(deserialize_with = "null_to_default")]
    pub labels: BTreeMap<String, String>,
    #[serde(deserialize_with = "null_to_default")]
    pub annotations: BTreeMap<String, String>,
    #[serde(deserialize_with = "null_to_default")]
    pub owner_references: Vec<OwnerReference>,
}

impl ObjectMeta {
    /// Returns the cache key of the object: `namespace/name` for namespaced
    /// objects, the bare name for cluster-scoped ones.
    pub fn key(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.namespace, self.name)
        }
    }

    /// Registers the object's labels and annotations under `prefix`.
    ///
    /// Every entry produces a value label and a `…present` marker label, with
    /// the Kubernetes key normalized through [`sanitize_label_name`].
    pub fn register_labels_and_annotations(&self, prefix: &str, m: &mut TargetLabels) {
        for (name, value) in &self.labels {
            let ln = sanitize_label_name(name);
            m.insert(format!("{prefix}_label_{ln}"), value.clone());
            m.insert(format!("{prefix}_labelpresent_{ln}"), "true".to_string());
        }
        for (name, value) in &self.annotations {
            let an = sanitize_label_name(name);
            m.insert(format!("{prefix}_annotation_{an}"), value.clone());
            m.insert(format!("{prefix}_annotationpresent_{an}"), "true".to_string());
        }
    }
}

/// Reference from an object to its owner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OwnerReference {
    pub kind: String,
    pub name: String,
    pub controller: bool,
}

/// Reference to another namespaced object, e.g. an endpoint address target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectReference {
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ObjectReference {
    /// Returns the cache key of the referenced object.
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// Metadata of a list response; carries the resource version the subsequent
/// watch starts from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListMeta {
    pub resource_version: String,
}

/// A Kubernetes list response for any object kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de> + Default"))]
pub struct ObjectList<T> {
    #[serde(default)]
    pub metadata: ListMeta,
    #[serde(default, deserialize_with = "null_to_default")]
    pub items: Vec<T>,
}

impl<T: DeserializeOwned + Default> ObjectList<T> {
    /// Parses a list response body.
    pub fn parse(data: &[u8]) -> SdResult<Self> {
        serde_json::from_slice(data).map_err(|err| {
            SdError::with_detail(
                ErrorKind::DeserializationError,
                "cannot parse Kubernetes list response",
                err,
            )
        })
    }
}

/// An object kind whose targets are built from the object alone, without
/// joining other cached kinds.
pub trait TargetObject: DeserializeOwned + Default + Send + Sync + 'static {
    /// Kind segment used in sync-event keys, e.g. `pod`.
    const KIND: &'static str;

    /// Returns the object's cache/event key.
    fn object_key(&self) -> String;

    /// Builds the scrape targets for this object.
    fn target_labels(&self) -> Vec<TargetLabels>;
}

/// Normalizes a Kubernetes label key into a Prometheus label name by
/// replacing every byte outside `[a-zA-Z0-9_]` with `_`.
pub fn sanitize_label_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Joins a host and port into an `__address__` value, bracketing IPv6 hosts.
pub fn join_host_port(host: &str, port: i32) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// Deserializes JSON `null` into the type's default value.
///
/// Go's encoding of empty slices and maps is `null`; the API server emits it
/// for empty collections.
pub(crate) fn null_to_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_names_are_sanitized() {
        assert_eq!(
            sanitize_label_name("app.kubernetes.io/name"),
            "app_kubernetes_io_name"
        );
        assert_eq!(sanitize_label_name("simple"), "simple");
        assert_eq!(sanitize_label_name("uses-dash"), "uses_dash");
    }

    #[test]
    fn ipv6_addresses_are_bracketed() {
        assert_eq!(join_host_port("10.0.0.1", 8080), "10.0.0.1:8080");
        assert_eq!(join_host_port("fd00::12", 8080), "[fd00::12]:8080");
    }

    #[test]
    fn namespaced_and_cluster_scoped_keys() {
        let meta = ObjectMeta {
            name: "p1".to_string(),
            namespace: "ns1".to_string(),
            ..ObjectMeta::default()
        };
        assert_eq!(meta.key(), "ns1/p1");

        let meta = ObjectMeta {
            name: "node-1".to_string(),
            ..ObjectMeta::default()
        };
        assert_eq!(meta.key(), "node-1");
    }

    #[test]
    fn labels_and_annotations_register_with_present_markers() {
        let mut meta = ObjectMeta::default();
        meta.labels.insert("app.kubernetes.io/name".to_string(), "web".to_string());
        meta.annotations.insert("note".to_string(), "x".to_string());

        let mut m = TargetLabels::new();
        meta.register_labels_and_annotations("__meta_kubernetes_pod", &mut m);

        assert_eq!(
            m.get("__meta_kubernetes_pod_label_app_kubernetes_io_name").unwrap(),
            "web"
        );
        assert_eq!(
            m.get("__meta_kubernetes_pod_labelpresent_app_kubernetes_io_name").unwrap(),
            "true"
        );
        assert_eq!(m.get("__meta_kubernetes_pod_annotation_note").unwrap(), "x");
        assert_eq!(
            m.get("__meta_kubernetes_pod_annotationpresent_note").unwrap(),
            "true"
        );
    }

    #[test]
    fn null_collections_decode_as_empty() {
        let meta: ObjectMeta = serde_json::from_str(
            r#"{"name": "p1", "namespace": "ns1", "labels": null, "ownerReferences": null}"#,
        )
        .unwrap();
        assert!(meta.labels.is_empty());
        assert!(meta.owner_references.is_empty());
    }
}
