use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::cache::SharedCache;
use crate::objects::pod::Pod;
use crate::objects::service::Service;
use crate::objects::{ObjectMeta, ObjectReference, join_host_port, null_to_default};
use crate::types::TargetLabels;

/// Kubernetes endpoints object.
///
/// Its cache key equals the key of the Service it backs; the two are treated
/// as a pair by the join.
///
/// See <https://kubernetes.io/docs/reference/kubernetes-api/service-resources/endpoints-v1/>.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Endpoints {
    pub metadata: ObjectMeta,
    #[serde(deserialize_with = "null_to_default")]
    pub subsets: Vec<EndpointSubset>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EndpointSubset {
    #[serde(deserialize_with = "null_to_default")]
    pub addresses: Vec<EndpointAddress>,
    #[serde(deserialize_with = "null_to_default")]
    pub not_ready_addresses: Vec<EndpointAddress>,
    #[serde(deserialize_with = "null_to_default")]
    pub ports: Vec<EndpointPort>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EndpointAddress {
    pub hostname: String,
    pub ip: String,
    pub node_name: String,
    pub target_ref: Option<ObjectReference>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EndpointPort {
    pub app_protocol: String,
    pub name: String,
    pub port: i32,
    pub protocol: String,
}

/// Pods resolved during the first pass, with the subset ports that hit them.
///
/// Insertion order is preserved so emission order stays deterministic.
#[derive(Default)]
pub(crate) struct PodPortsSeen {
    entries: Vec<(Arc<Pod>, Vec<i32>)>,
}

impl PodPortsSeen {
    pub(crate) fn record(&mut self, pod: &Arc<Pod>, port: i32) {
        let key = pod.key();
        match self.entries.iter_mut().find(|(p, _)| p.key() == key) {
            Some((_, ports)) => ports.push(port),
            None => self.entries.push((pod.clone(), vec![port])),
        }
    }

    /// Emits one extra target per container port of every seen pod that no
    /// subset port covered. This is what surfaces scrape targets on container
    /// ports the Endpoints object itself does not advertise.
    pub(crate) fn append_uncovered_ports(
        self,
        targets: &mut Vec<TargetLabels>,
        svc: Option<&Service>,
    ) {
        for (pod, ports_hit) in self.entries {
            for container in &pod.spec.containers {
                for port in &container.ports {
                    if ports_hit.contains(&port.container_port) {
                        continue;
                    }
                    let mut m = TargetLabels::new();
                    m.insert(
                        "__address__".to_string(),
                        join_host_port(&pod.status.pod_ip, port.container_port),
                    );
                    pod.append_common_labels(&mut m);
                    pod.append_container_labels(&mut m, container, port);
                    if let Some(svc) = svc {
                        svc.append_common_labels(&mut m);
                    }
                    targets.push(m);
                }
            }
        }
    }
}

impl Endpoints {
    /// Returns the object's cache key, shared with the backing Service.
    pub fn key(&self) -> String {
        self.metadata.key()
    }

    /// Builds targets by joining this object with the cached Pods and the
    /// same-keyed Service.
    ///
    /// Pass 1 emits one target per (subset, port, address), ready addresses
    /// before not-ready ones, overlaying service, endpoints-metadata and pod
    /// labels in that order. Pass 2 emits one target per container port of
    /// every resolved pod that no subset port covered. Absent cache entries
    /// reduce the label set; they never suppress a target.
    pub async fn build_targets(&self, cache: &SharedCache) -> Vec<TargetLabels> {
        let svc = cache.services.load(&self.key()).await;
        let svc = svc.as_deref();

        let mut targets = Vec::new();
        let mut pods_seen = PodPortsSeen::default();

        for subset in &self.subsets {
            for port in &subset.ports {
                for address in &subset.addresses {
                    let target = self
                        .target_for_address(&mut pods_seen, address, port, cache, svc, "true")
                        .await;
                    targets.push(target);
                }
                for address in &subset.not_ready_addresses {
                    let target = self
                        .target_for_address(&mut pods_seen, address, port, cache, svc, "false")
                        .await;
                    targets.push(target);
                }
            }
        }

        pods_seen.append_uncovered_ports(&mut targets, svc);

        targets
    }

    async fn target_for_address(
        &self,
        pods_seen: &mut PodPortsSeen,
        address: &EndpointAddress,
        port: &EndpointPort,
        cache: &SharedCache,
        svc: Option<&Service>,
        ready: &str,
    ) -> TargetLabels {
        let mut m = self.endpoint_labels(address, port, ready);
        if let Some(svc) = svc {
            svc.append_common_labels(&mut m);
        }
        self.metadata
            .register_labels_and_annotations("__meta_kubernetes_endpoints", &mut m);

        let Some(target_ref) = &address.target_ref else {
            return m;
        };
        if target_ref.kind != "Pod" {
            return m;
        }
        let Some(pod) = cache.pods.load(&target_ref.key()).await else {
            return m;
        };

        pod.append_common_labels(&mut m);
        for container in &pod.spec.containers {
            if let Some(container_port) = container
                .ports
                .iter()
                .find(|cp| cp.container_port == port.port)
            {
                pod.append_container_labels(&mut m, container, container_port);
                pods_seen.record(&pod, container_port.container_port);
            }
        }

        m
    }

    fn endpoint_labels(
        &self,
        address: &EndpointAddress,
        port: &EndpointPort,
        ready: &str,
    ) -> TargetLabels {
        let mut m = TargetLabels::new();
        m.insert(
            "__address__".to_string(),
            join_host_port(&address.ip, port.port),
        );
        m.insert(
            "__meta_kubernetes_namespace".to_string(),
            self.metadata.namespace.clone(),
        );
        m.insert(
            "__meta_kubernetes_endpoints_name".to_string(),
            self.metadata.name.clone(),
        );
        m.insert(
            "__meta_kubernetes_endpoint_ready".to_string(),
            ready.to_string(),
        );
        m.insert(
            "__meta_kubernetes_endpoint_port_name".to_string(),
            port.name.clone(),
        );
        m.insert(
            "__meta_kubernetes_endpoint_port_protocol".to_string(),
            port.protocol.clone(),
        );
        if let Some(target_ref) = &address.target_ref
            && !target_ref.kind.is_empty()
        {
            m.insert(
                "__meta_kubernetes_endpoint_address_target_kind".to_string(),
                target_ref.kind.clone(),
            );
            m.insert(
                "__meta_kubernetes_endpoint_address_target_name".to_string(),
                target_ref.name.clone(),
            );
        }
        if !address.node_name.is_empty() {
            m.insert(
                "__meta_kubernetes_endpoint_node_name".to_string(),
                address.node_name.clone(),
            );
        }
        if !address.hostname.is_empty() {
            m.insert(
                "__meta_kubernetes_endpoint_hostname".to_string(),
                address.hostname.clone(),
            );
        }
        m
    }
}
