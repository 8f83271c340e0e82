use serde::{Deserialize, Serialize};

use crate::objects::{ObjectMeta, TargetObject, join_host_port, null_to_default};
use crate::types::TargetLabels;

/// Kubernetes service.
///
/// See <https://kubernetes.io/docs/reference/kubernetes-api/service-resources/service-v1/>.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Service {
    pub metadata: ObjectMeta,
    pub spec: ServiceSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceSpec {
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(rename = "clusterIP")]
    pub cluster_ip: String,
    pub external_name: String,
    #[serde(deserialize_with = "null_to_default")]
    pub ports: Vec<ServicePort>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServicePort {
    pub name: String,
    pub port: i32,
    pub protocol: String,
}

impl Service {
    /// Returns the object's cache key, shared with the Endpoints object that
    /// backs this service.
    pub fn key(&self) -> String {
        self.metadata.key()
    }

    /// Appends the service-level labels, also overlaid onto joined endpoint
    /// targets.
    pub fn append_common_labels(&self, m: &mut TargetLabels) {
        m.insert(
            "__meta_kubernetes_namespace".to_string(),
            self.metadata.namespace.clone(),
        );
        m.insert(
            "__meta_kubernetes_service_name".to_string(),
            self.metadata.name.clone(),
        );
        m.insert(
            "__meta_kubernetes_service_type".to_string(),
            self.spec.service_type.clone(),
        );
        if self.spec.service_type == "ExternalName" {
            m.insert(
                "__meta_kubernetes_service_external_name".to_string(),
                self.spec.external_name.clone(),
            );
        } else {
            m.insert(
                "__meta_kubernetes_service_cluster_ip".to_string(),
                self.spec.cluster_ip.clone(),
            );
        }
        self.metadata
            .register_labels_and_annotations("__meta_kubernetes_service", m);
    }

    /// Builds one target per service port, addressed through cluster DNS.
    pub fn build_targets(&self) -> Vec<TargetLabels> {
        let host = format!("{}.{}.svc", self.metadata.name, self.metadata.namespace);
        let mut targets = Vec::with_capacity(self.spec.ports.len());
        for port in &self.spec.ports {
            let mut m = TargetLabels::new();
            m.insert("__address__".to_string(), join_host_port(&host, port.port));
            m.insert(
                "__meta_kubernetes_service_port_name".to_string(),
                port.name.clone(),
            );
            m.insert(
                "__meta_kubernetes_service_port_protocol".to_string(),
                port.protocol.clone(),
            );
            self.append_common_labels(&mut m);
            targets.push(m);
        }
        targets
    }
}

impl TargetObject for Service {
    const KIND: &'static str = "service";

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

    fn sample_service() -> Service {
        serde_json::from_value(json!({
            "metadata": {
                "name": "svc1",
                "namespace": "ns1",
                "labels": {"tier": "backend"}
            },
            "spec": {
                "type": "ClusterIP",
                "clusterIP": "10.96.0.10",
                "ports": [
                    {"name": "http", "port": 80, "protocol": "TCP"},
                    {"name": "metrics", "port": 9102, "protocol": "TCP"}
                ]
            }
        }))
        .unwrap()
    }

    #[test]
    fn one_target_per_service_port() {
        let svc = sample_service();
        let targets = svc.build_targets();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].get("__address__").unwrap(), "svc1.ns1.svc:80");
        assert_eq!(
            targets[0].get("__meta_kubernetes_service_port_name").unwrap(),
            "http"
        );
        assert_eq!(
            targets[0].get("__meta_kubernetes_service_cluster_ip").unwrap(),
            "10.96.0.10"
        );
        assert_eq!(
            targets[0].get("__meta_kubernetes_service_label_tier").unwrap(),
            "backend"
        );
        assert_eq!(targets[1].get("__address__").unwrap(), "svc1.ns1.svc:9102");
    }

    #[test]
    fn external_name_services_expose_the_external_name() {
        let mut svc = sample_service();
        svc.spec.service_type = "ExternalName".to_string();
        svc.spec.external_name = "db.example.com".to_string();

        let targets = svc.build_targets();
        assert_eq!(
            targets[0]
                .get("__meta_kubernetes_service_external_name")
                .unwrap(),
            "db.example.com"
        );
        assert!(!targets[0].contains_key("__meta_kubernetes_service_cluster_ip"));
    }
}
