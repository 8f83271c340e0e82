use std::collections::HashMap;
use std::fmt;

use kubesd_config::shared::Role;

mod event;

pub use event::*;

/// A single scrape target, represented as a map of label name to label value.
///
/// Every target carries at least `__address__` and
/// `__meta_kubernetes_namespace`.
pub type TargetLabels = HashMap<String, String>;

/// Kubernetes object kinds watched by the discovery pipeline.
///
/// A role maps to one or more watched kinds; compound roles (endpoints,
/// endpointslices) watch three kinds and join them through the shared cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchedKind {
    Pods,
    Nodes,
    Services,
    Endpoints,
    EndpointSlices,
    Ingresses,
}

impl WatchedKind {
    /// Returns the lowercase plural resource name used in API paths.
    pub fn plural(&self) -> &'static str {
        match self {
            WatchedKind::Pods => "pods",
            WatchedKind::Nodes => "nodes",
            WatchedKind::Services => "services",
            WatchedKind::Endpoints => "endpoints",
            WatchedKind::EndpointSlices => "endpointslices",
            WatchedKind::Ingresses => "ingresses",
        }
    }

    /// Returns the role whose configured selectors apply to this kind's list
    /// and watch requests.
    pub fn selector_role(&self) -> Role {
        match self {
            WatchedKind::Pods => Role::Pod,
            WatchedKind::Nodes => Role::Node,
            WatchedKind::Services => Role::Service,
            WatchedKind::Endpoints => Role::Endpoints,
            WatchedKind::EndpointSlices => Role::EndpointSlices,
            WatchedKind::Ingresses => Role::Ingress,
        }
    }

    /// Builds the list path for this kind, scoped to a namespace when one is
    /// given.
    ///
    /// The core kinds live under `/api/v1`; EndpointSlices and Ingresses live
    /// under their API groups.
    pub fn list_path(&self, namespace: Option<&str>) -> String {
        let prefix = match self {
            WatchedKind::EndpointSlices => "/apis/discovery.k8s.io/v1beta1/",
            WatchedKind::Ingresses => "/apis/networking.k8s.io/v1/",
            _ => "/api/v1/",
        };

        match namespace {
            Some(ns) => format!("{prefix}namespaces/{ns}/{}", self.plural()),
            None => format!("{prefix}{}", self.plural()),
        }
    }
}

impl fmt::Display for WatchedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.plural())
    }
}
