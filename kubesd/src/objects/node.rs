use serde::{Deserialize, Serialize};

use crate::objects::{ObjectMeta, TargetObject, join_host_port, null_to_default, sanitize_label_name};
use crate::types::TargetLabels;

/// Address type preference for picking a node's scrape address.
const ADDRESS_TYPE_PREFERENCE: [&str; 6] = [
    "InternalIP",
    "InternalDNS",
    "ExternalIP",
    "ExternalDNS",
    "LegacyHostIP",
    "Hostname",
];

/// Kubernetes node.
///
/// See <https://kubernetes.io/docs/reference/kubernetes-api/cluster-resources/node-v1/>.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Node {
    pub metadata: ObjectMeta,
    pub status: NodeStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeStatus {
    #[serde(deserialize_with = "null_to_default")]
    pub addresses: Vec<NodeAddress>,
    pub daemon_endpoints: NodeDaemonEndpoints,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeAddress {
    #[serde(rename = "type")]
    pub address_type: String,
    pub address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeDaemonEndpoints {
    pub kubelet_endpoint: DaemonEndpoint,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DaemonEndpoint {
    pub port: i32,
}

impl Node {
    /// Returns the object's cache key (nodes are cluster-scoped, so this is
    /// the bare name).
    pub fn key(&self) -> String {
        self.metadata.key()
    }

    /// Picks the scrape address following the documented type preference.
    fn preferred_address(&self) -> Option<&str> {
        for address_type in ADDRESS_TYPE_PREFERENCE {
            if let Some(address) = self
                .status
                .addresses
                .iter()
                .find(|a| a.address_type == address_type)
            {
                return Some(&address.address);
            }
        }
        None
    }

    /// Builds the single target for this node, addressed at the kubelet.
    ///
    /// Nodes without any address yield no target.
    pub fn build_targets(&self) -> Vec<TargetLabels> {
        let Some(address) = self.preferred_address() else {
            return Vec::new();
        };

        let mut m = TargetLabels::new();
        m.insert(
            "__address__".to_string(),
            join_host_port(address, self.status.daemon_endpoints.kubelet_endpoint.port),
        );
        m.insert("instance".to_string(), self.metadata.name.clone());
        m.insert(
            "__meta_kubernetes_node_name".to_string(),
            self.metadata.name.clone(),
        );
        self.metadata
            .register_labels_and_annotations("__meta_kubernetes_node", &mut m);

        // First address of each type only.
        for node_address in &self.status.addresses {
            let label = format!(
                "__meta_kubernetes_node_address_{}",
                sanitize_label_name(&node_address.address_type)
            );
            m.entry(label).or_insert_with(|| node_address.address.clone());
        }

        vec![m]
    }
}

impl TargetObject for Node {
    const KIND: &'static str = "node";

    fn object_key(&self) -> String {
        self.key()
    }

    fn target_labels(&self) -> Vec<TargetLabels> {
        self.build_targets()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_node() -> Node {
        serde_json::from_value(json!({
            "metadata": {
                "name": "node-1",
                "labels": {"kubernetes.io/os": "linux"}
            },
            "status": {
                "addresses": [
                    {"type": "Hostname", "address": "node-1.local"},
                    {"type": "InternalIP", "address": "172.16.0.5"},
                    {"type": "InternalIP", "address": "172.16.0.6"}
                ],
                "daemonEndpoints": {"kubeletEndpoint": {"port": 10250}}
            }
        }))
        .unwrap()
    }

    #[test]
    fn internal_ip_is_preferred_over_hostname() {
        let node = sample_node();
        let targets = node.build_targets();
        assert_eq!(targets.len(), 1);

        let m = &targets[0];
        assert_eq!(m.get("__address__").unwrap(), "172.16.0.5:10250");
        assert_eq!(m.get("instance").unwrap(), "node-1");
        assert_eq!(m.get("__meta_kubernetes_node_name").unwrap(), "node-1");
        assert_eq!(
            m.get("__meta_kubernetes_node_label_kubernetes_io_os").unwrap(),
            "linux"
        );
    }

    #[test]
    fn only_the_first_address_of_each_type_is_labeled() {
        let node = sample_node();
        let targets = node.build_targets();
        let m = &targets[0];
        assert_eq!(
            m.get("__meta_kubernetes_node_address_InternalIP").unwrap(),
            "172.16.0.5"
        );
        assert_eq!(
            m.get("__meta_kubernetes_node_address_Hostname").unwrap(),
            "node-1.local"
        );
    }

    #[test]
    fn nodes_without_addresses_yield_no_target() {
        let mut node = sample_node();
        node.status.addresses.clear();
        assert!(node.build_targets().is_empty());
    }
}
