use serde::{Deserialize, Serialize};

use crate::objects::{ObjectMeta, OwnerReference, TargetObject, join_host_port, null_to_default};
use crate::types::TargetLabels;

/// Kubernetes pod.
///
/// See <https://kubernetes.io/docs/reference/kubernetes-api/workload-resources/pod-v1/>.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Pod {
    pub metadata: ObjectMeta,
    pub spec: PodSpec,
    pub status: PodStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PodSpec {
    pub node_name: String,
    #[serde(deserialize_with = "null_to_default")]
    pub containers: Vec<Container>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Container {
    pub name: String,
    pub image: String,
    #[serde(deserialize_with = "null_to_default")]
    pub ports: Vec<ContainerPort>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContainerPort {
    pub name: String,
    pub container_port: i32,
    pub protocol: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PodStatus {
    pub phase: String,
    #[serde(rename = "podIP")]
    pub pod_ip: String,
    #[serde(rename = "hostIP")]
    pub host_ip: String,
    #[serde(deserialize_with = "null_to_default")]
    pub conditions: Vec<PodCondition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PodCondition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
}

impl Pod {
    /// Returns the object's cache key.
    pub fn key(&self) -> String {
        self.metadata.key()
    }

    /// Returns the lowercased `Ready` condition status, or `unknown` when the
    /// condition is absent.
    fn ready_status(&self) -> String {
        self.status
            .conditions
            .iter()
            .find(|c| c.condition_type == "Ready")
            .map(|c| c.status.to_lowercase())
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Returns the owner reference marked as the pod's controller.
    fn controller(&self) -> Option<&OwnerReference> {
        self.metadata.owner_references.iter().find(|or| or.controller)
    }

    /// Appends the pod-level labels shared by every target that resolves to
    /// this pod, including targets built by the endpoints join.
    pub fn append_common_labels(&self, m: &mut TargetLabels) {
        m.insert(
            "__meta_kubernetes_namespace".to_string(),
            self.metadata.namespace.clone(),
        );
        m.insert(
            "__meta_kubernetes_pod_name".to_string(),
            self.metadata.name.clone(),
        );
        m.insert(
            "__meta_kubernetes_pod_ip".to_string(),
            self.status.pod_ip.clone(),
        );
        m.insert("__meta_kubernetes_pod_ready".to_string(), self.ready_status());
        m.insert(
            "__meta_kubernetes_pod_phase".to_string(),
            self.status.phase.clone(),
        );
        m.insert(
            "__meta_kubernetes_pod_node_name".to_string(),
            self.spec.node_name.clone(),
        );
        m.insert(
            "__meta_kubernetes_pod_host_ip".to_string(),
            self.status.host_ip.clone(),
        );
        m.insert("__meta_kubernetes_pod_uid".to_string(), self.metadata.uid.clone());
        if let Some(controller) = self.controller() {
            if !controller.kind.is_empty() {
                m.insert(
                    "__meta_kubernetes_pod_controller_kind".to_string(),
                    controller.kind.clone(),
                );
            }
            if !controller.name.is_empty() {
                m.insert(
                    "__meta_kubernetes_pod_controller_name".to_string(),
                    controller.name.clone(),
                );
            }
        }
        self.metadata
            .register_labels_and_annotations("__meta_kubernetes_pod", m);
    }

    /// Appends the labels describing one container port of this pod.
    pub fn append_container_labels(
        &self,
        m: &mut TargetLabels,
        container: &Container,
        port: &ContainerPort,
    ) {
        m.insert(
            "__meta_kubernetes_pod_container_name".to_string(),
            container.name.clone(),
        );
        m.insert(
            "__meta_kubernetes_pod_container_image".to_string(),
            container.image.clone(),
        );
        m.insert(
            "__meta_kubernetes_pod_container_port_name".to_string(),
            port.name.clone(),
        );
        m.insert(
            "__meta_kubernetes_pod_container_port_number".to_string(),
            port.container_port.to_string(),
        );
        m.insert(
            "__meta_kubernetes_pod_container_port_protocol".to_string(),
            port.protocol.clone(),
        );
    }

    /// Builds one target per (container, container port).
    ///
    /// Pods without an assigned IP yield no targets.
    pub fn build_targets(&self) -> Vec<TargetLabels> {
        let mut targets = Vec::new();
        if self.status.pod_ip.is_empty() {
            return targets;
        }
        for container in &self.spec.containers {
            for port in &container.ports {
                let mut m = TargetLabels::new();
                m.insert(
                    "__address__".to_string(),
                    join_host_port(&self.status.pod_ip, port.container_port),
                );
                self.append_common_labels(&mut m);
                self.append_container_labels(&mut m, container, port);
                targets.push(m);
            }
        }
        targets
    }
}

impl TargetObject for Pod {
    const KIND: &'static str = "pod";

    fn object_key(&self) -> String {
        self.key()
    }

    fn target_labels(&self) -> Vec<TargetLabels> {
        self.build_targets()
    }
}
