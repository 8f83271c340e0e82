use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::cache::SharedCache;
use crate::objects::endpoints::PodPortsSeen;
use crate::objects::{ObjectMeta, ObjectReference, join_host_port, null_to_default, sanitize_label_name};
use crate::types::TargetLabels;

/// Kubernetes endpoint slice (`discovery.k8s.io/v1beta1`).
///
/// Structurally analogous to [`crate::objects::Endpoints`], but addresses and
/// ports live on the slice itself and readiness is a per-endpoint condition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EndpointSlice {
    pub metadata: ObjectMeta,
    pub address_type: String,
    #[serde(deserialize_with = "null_to_default")]
    pub endpoints: Vec<Endpoint>,
    #[serde(deserialize_with = "null_to_default")]
    pub ports: Vec<EndpointPort>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Endpoint {
    #[serde(deserialize_with = "null_to_default")]
    pub addresses: Vec<String>,
    pub conditions: EndpointConditions,
    pub hostname: String,
    pub target_ref: Option<ObjectReference>,
    #[serde(deserialize_with = "null_to_default")]
    pub topology: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EndpointConditions {
    pub ready: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EndpointPort {
    pub app_protocol: String,
    pub name: String,
    pub port: i32,
    pub protocol: String,
}

impl EndpointSlice {
    /// Returns the object's cache key.
    pub fn key(&self) -> String {
        self.metadata.key()
    }

    /// Builds targets by joining this slice with the cached Pods and the
    /// same-keyed Service, mirroring the Endpoints join: pass 1 over
    /// (endpoint, port, address), pass 2 over container ports no slice port
    /// covered.
    pub async fn build_targets(&self, cache: &SharedCache) -> Vec<TargetLabels> {
        let svc = cache.services.load(&self.key()).await;
        let svc = svc.as_deref();

        let mut targets = Vec::new();
        let mut pods_seen = PodPortsSeen::default();

        for endpoint in &self.endpoints {
            let pod = match &endpoint.target_ref {
                Some(target_ref) if target_ref.kind == "Pod" => {
                    cache.pods.load(&target_ref.key()).await
                }
                _ => None,
            };

            for port in &self.ports {
                for address in &endpoint.addresses {
                    let mut m = self.endpoint_labels(address, endpoint, port);
                    if let Some(svc) = svc {
                        svc.append_common_labels(&mut m);
                    }
                    if let Some(pod) = &pod {
                        pod.append_common_labels(&mut m);
                        for container in &pod.spec.containers {
                            if let Some(container_port) = container
                                .ports
                                .iter()
                                .find(|cp| cp.container_port == port.port)
                            {
                                pod.append_container_labels(&mut m, container, container_port);
                                pods_seen.record(pod, container_port.container_port);
                            }
                        }
                    }
                    targets.push(m);
                }
            }
        }

        pods_seen.append_uncovered_ports(&mut targets, svc);

        targets
    }

    fn endpoint_labels(
        &self,
        address: &str,
        endpoint: &Endpoint,
        port: &EndpointPort,
    ) -> TargetLabels {
        let mut m = TargetLabels::new();
        m.insert("__address__".to_string(), join_host_port(address, port.port));
        m.insert(
            "__meta_kubernetes_namespace".to_string(),
            self.metadata.namespace.clone(),
        );
        m.insert(
            "__meta_kubernetes_endpointslice_name".to_string(),
            self.metadata.name.clone(),
        );
        m.insert(
            "__meta_kubernetes_endpointslice_address_type".to_string(),
            self.address_type.clone(),
        );
        if let Some(ready) = endpoint.conditions.ready {
            m.insert(
                "__meta_kubernetes_endpointslice_endpoint_conditions_ready".to_string(),
                ready.to_string(),
            );
        }
        m.insert(
            "__meta_kubernetes_endpointslice_port_name".to_string(),
            port.name.clone(),
        );
        m.insert(
            "__meta_kubernetes_endpointslice_port_protocol".to_string(),
            port.protocol.clone(),
        );
        m.insert(
            "__meta_kubernetes_endpointslice_port".to_string(),
            port.port.to_string(),
        );
        if !port.app_protocol.is_empty() {
            m.insert(
                "__meta_kubernetes_endpointslice_port_app_protocol".to_string(),
                port.app_protocol.clone(),
            );
        }
        if let Some(target_ref) = &endpoint.target_ref
            && !target_ref.kind.is_empty()
        {
            m.insert(
                "__meta_kubernetes_endpointslice_address_target_kind".to_string(),
                target_ref.kind.clone(),
            );
            m.insert(
                "__meta_kubernetes_endpointslice_address_target_name".to_string(),
                target_ref.name.clone(),
            );
        }
        if !endpoint.hostname.is_empty() {
            m.insert(
                "__meta_kubernetes_endpointslice_endpoint_hostname".to_string(),
                endpoint.hostname.clone(),
            );
        }
        for (key, value) in &endpoint.topology {
            let name = sanitize_label_name(key);
            m.insert(
                format!("__meta_kubernetes_endpointslice_endpoint_topology_{name}"),
                value.clone(),
            );
            m.insert(
                format!("__meta_kubernetes_endpointslice_endpoint_topology_present_{name}"),
                "true".to_string(),
            );
        }
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{Pod, Service};
    use serde_json::json;

    fn sample_slice() -> EndpointSlice {
        serde_json::from_value(json!({
            "metadata": {"name": "svc1-abc", "namespace": "ns1"},
            "addressType": "IPv4",
            "endpoints": [{
                "addresses": ["10.0.0.1"],
                "conditions": {"ready": true},
                "targetRef": {"kind": "Pod", "namespace": "ns1", "name": "p1"},
                "topology": {"kubernetes.io/hostname": "node-1"}
            }],
            "ports": [{"name": "http", "port": 8080, "protocol": "TCP", "appProtocol": "http"}]
        }))
        .unwrap()
    }

    async fn populated_cache() -> SharedCache {
        let cache = SharedCache::new();
        let pod: Pod = serde_json::from_value(json!({
            "metadata": {"name": "p1", "namespace": "ns1"},
            "spec": {
                "containers": [{
                    "name": "c1",
                    "ports": [
                        {"name": "http", "containerPort": 8080, "protocol": "TCP"},
                        {"containerPort": 9090, "protocol": "TCP"}
                    ]
                }]
            },
            "status": {"podIP": "10.0.0.1"}
        }))
        .unwrap();
        let svc: Service = serde_json::from_value(json!({
            "metadata": {"name": "svc1-abc", "namespace": "ns1"},
            "spec": {"type": "ClusterIP", "clusterIP": "10.96.0.20"}
        }))
        .unwrap();
        cache.pods.store("ns1/p1".to_string(), pod).await;
        cache.services.store("ns1/svc1-abc".to_string(), svc).await;
        cache
    }

    #[tokio::test]
    async fn slice_join_emits_advertised_and_uncovered_ports() {
        let cache = populated_cache().await;
        let targets = sample_slice().build_targets(&cache).await;
        assert_eq!(targets.len(), 2);

        let advertised = &targets[0];
        assert_eq!(advertised.get("__address__").unwrap(), "10.0.0.1:8080");
        assert_eq!(
            advertised
                .get("__meta_kubernetes_endpointslice_address_type")
                .unwrap(),
            "IPv4"
        );
        assert_eq!(
            advertised
                .get("__meta_kubernetes_endpointslice_endpoint_conditions_ready")
                .unwrap(),
            "true"
        );
        assert_eq!(
            advertised
                .get("__meta_kubernetes_endpointslice_port_app_protocol")
                .unwrap(),
            "http"
        );
        assert_eq!(
            advertised
                .get("__meta_kubernetes_endpointslice_endpoint_topology_kubernetes_io_hostname")
                .unwrap(),
            "node-1"
        );
        assert_eq!(
            advertised.get("__meta_kubernetes_pod_name").unwrap(),
            "p1"
        );
        assert_eq!(
            advertised.get("__meta_kubernetes_service_name").unwrap(),
            "svc1-abc"
        );

        let uncovered = &targets[1];
        assert_eq!(uncovered.get("__address__").unwrap(), "10.0.0.1:9090");
        assert!(!uncovered.contains_key("__meta_kubernetes_endpointslice_name"));
    }

    #[tokio::test]
    async fn absent_ready_condition_emits_no_ready_label() {
        let cache = SharedCache::new();
        let mut slice = sample_slice();
        slice.endpoints[0].conditions.ready = None;

        let targets = slice.build_targets(&cache).await;
        assert!(
            !targets[0]
                .contains_key("__meta_kubernetes_endpointslice_endpoint_conditions_ready")
        );
    }
}
