use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::objects::{ObjectMeta, TargetObject, null_to_default};
use crate::types::TargetLabels;

/// Kubernetes ingress.
///
/// See <https://kubernetes.io/docs/reference/kubernetes-api/service-resources/ingress-v1/>.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Ingress {
    pub metadata: ObjectMeta,
    pub spec: IngressSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IngressSpec {
    #[serde(deserialize_with = "null_to_default")]
    pub rules: Vec<IngressRule>,
    #[serde(deserialize_with = "null_to_default")]
    pub tls: Vec<IngressTls>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IngressRule {
    pub host: String,
    pub http: Option<HttpIngressRuleValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpIngressRuleValue {
    #[serde(deserialize_with = "null_to_default")]
    pub paths: Vec<HttpIngressPath>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpIngressPath {
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IngressTls {
    #[serde(deserialize_with = "null_to_default")]
    pub hosts: Vec<String>,
}

impl Ingress {
    /// Returns the object's cache key.
    pub fn key(&self) -> String {
        self.metadata.key()
    }

    /// Builds one target per (rule host, HTTP path).
    ///
    /// The scheme is `https` when the rule host appears in any TLS host list.
    /// Rules without explicit paths contribute a single `/` path.
    pub fn build_targets(&self) -> Vec<TargetLabels> {
        let tls_hosts: HashSet<&str> = self
            .spec
            .tls
            .iter()
            .flat_map(|tls| tls.hosts.iter().map(String::as_str))
            .collect();

        let mut targets = Vec::new();
        for rule in &self.spec.rules {
            let scheme = if tls_hosts.contains(rule.host.as_str()) {
                "https"
            } else {
                "http"
            };

            let paths: Vec<&str> = match &rule.http {
                Some(http) if !http.paths.is_empty() => {
                    http.paths.iter().map(|p| p.path.as_str()).collect()
                }
                _ => vec!["/"],
            };

            for path in paths {
                let mut m = TargetLabels::new();
                m.insert("__address__".to_string(), rule.host.clone());
                m.insert(
                    "__meta_kubernetes_namespace".to_string(),
                    self.metadata.namespace.clone(),
                );
                m.insert(
                    "__meta_kubernetes_ingress_name".to_string(),
                    self.metadata.name.clone(),
                );
                m.insert(
                    "__meta_kubernetes_ingress_scheme".to_string(),
                    scheme.to_string(),
                );
                m.insert("__meta_kubernetes_ingress_host".to_string(), rule.host.clone());
                m.insert("__meta_kubernetes_ingress_path".to_string(), path.to_string());
                self.metadata
                    .register_labels_and_annotations("__meta_kubernetes_ingress", &mut m);
                targets.push(m);
            }
        }
        targets
    }
}

impl TargetObject for Ingress {
    const KIND: &'static str = "ingress";

    fn object_key(&self) -> String {
        self.key()
    }

    fn target_labels(&self) -> Vec<TargetLabels> {
        self.build_targets()
    }
}
