use tracing::{error, warn};

use crate::error::SdResult;
use crate::objects::{Endpoints, EndpointSlice, ObjectList, Pod, Service};
use crate::types::{Action, WatchEvent};
use crate::watchers::{KindHandler, WatcherContext};

/// Which joined kind the pod and service watchers of a compound role fan out
/// to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Endpoints,
    EndpointSlices,
}

/// Rebuilds and re-emits the joined object stored under `key`, if any.
///
/// The endpoints caches double as the join index: a pod or service
/// modification looks up the joined object by its own key and replays it, so
/// targets pick up the fresh pod or service labels.
async fn reemit_joined(ctx: &WatcherContext, join: JoinKind, key: &str) {
    match join {
        JoinKind::Endpoints => {
            if let Some(endpoints) = ctx.cache().endpoints.load(key).await {
                let labels = endpoints.build_targets(ctx.cache()).await;
                ctx.emit("endpoints", key, Some(labels)).await;
            }
        }
        JoinKind::EndpointSlices => {
            if let Some(slice) = ctx.cache().endpoint_slices.load(key).await {
                let labels = slice.build_targets(ctx.cache()).await;
                ctx.emit("endpointslices", key, Some(labels)).await;
            }
        }
    }
}

/// Watch handler for the endpoints of a compound role.
#[derive(Clone)]
pub struct EndpointsTargets {
    ctx: WatcherContext,
}

impl EndpointsTargets {
    pub fn new(ctx: WatcherContext) -> Self {
        Self { ctx }
    }

    async fn process(&self, endpoints: Endpoints, action: &Action) {
        let key = endpoints.key();
        match action {
            Action::Added | Action::Modified => {
                let labels = endpoints.build_targets(self.ctx.cache()).await;
                self.ctx.emit("endpoints", &key, Some(labels)).await;
            }
            Action::Deleted => self.ctx.emit("endpoints", &key, None).await,
            Action::Bookmark => {}
            Action::Error => {
                warn!(kind = "endpoints", "received an error frame, the stream will restart");
            }
            Action::Unknown(other) => {
                warn!(kind = "endpoints", action = %other, "unexpected watch action");
            }
        }
        // The cache is updated after emission so that a subsequent pod or
        // service modification joins against the newest endpoints record.
        self.ctx.cache().endpoints.apply(action, key, endpoints).await;
    }
}

impl KindHandler for EndpointsTargets {
    async fn bootstrap(&self, body: &[u8]) -> SdResult<String> {
        let list = ObjectList::<Endpoints>::parse(body)?;
        for endpoints in list.items {
            self.process(endpoints, &Action::Added).await;
        }
        Ok(list.metadata.resource_version)
    }

    async fn handle_event(&self, event: WatchEvent) {
        let endpoints: Endpoints = match serde_json::from_str(event.object.get()) {
            Ok(endpoints) => endpoints,
            Err(err) => {
                error!(kind = "endpoints", "cannot decode watch object, skipping it: {err}");
                return;
            }
        };
        self.process(endpoints, &event.action).await;
    }
}

/// Watch handler for the endpoint slices of the endpointslices role.
#[derive(Clone)]
pub struct EndpointSliceTargets {
    ctx: WatcherContext,
}

impl EndpointSliceTargets {
    pub fn new(ctx: WatcherContext) -> Self {
        Self { ctx }
    }

    async fn process(&self, slice: EndpointSlice, action: &Action) {
        let key = slice.key();
        match action {
            Action::Added | Action::Modified => {
                let labels = slice.build_targets(self.ctx.cache()).await;
                self.ctx.emit("endpointslices", &key, Some(labels)).await;
            }
            Action::Deleted => self.ctx.emit("endpointslices", &key, None).await,
            Action::Bookmark => {}
            Action::Error => {
                warn!(
                    kind = "endpointslices",
                    "received an error frame, the stream will restart"
                );
            }
            Action::Unknown(other) => {
                warn!(kind = "endpointslices", action = %other, "unexpected watch action");
            }
        }
        self.ctx
            .cache()
            .endpoint_slices
            .apply(action, key, slice)
            .await;
    }
}

impl KindHandler for EndpointSliceTargets {
    async fn bootstrap(&self, body: &[u8]) -> SdResult<String> {
        let list = ObjectList::<EndpointSlice>::parse(body)?;
        for slice in list.items {
            self.process(slice, &Action::Added).await;
        }
        Ok(list.metadata.resource_version)
    }

    async fn handle_event(&self, event: WatchEvent) {
        let slice: EndpointSlice = match serde_json::from_str(event.object.get()) {
            Ok(slice) => slice,
            Err(err) => {
                error!(
                    kind = "endpointslices",
                    "cannot decode watch object, skipping it: {err}"
                );
                return;
            }
        };
        self.process(slice, &event.action).await;
    }
}

/// Pod watcher of a compound role: keeps the pod cache current and replays
/// the joined object when a cached pod changes.
#[derive(Clone)]
pub struct PodCacheSync {
    ctx: WatcherContext,
    join: JoinKind,
}

impl PodCacheSync {
    pub fn new(ctx: WatcherContext, join: JoinKind) -> Self {
        Self { ctx, join }
    }
}

impl KindHandler for PodCacheSync {
    async fn bootstrap(&self, body: &[u8]) -> SdResult<String> {
        let list = ObjectList::<Pod>::parse(body)?;
        for pod in list.items {
            self.ctx.cache().pods.store(pod.key(), pod).await;
        }
        Ok(list.metadata.resource_version)
    }

    async fn handle_event(&self, event: WatchEvent) {
        let pod: Pod = match serde_json::from_str(event.object.get()) {
            Ok(pod) => pod,
            Err(err) => {
                error!(kind = "pods", "cannot decode watch object, skipping it: {err}");
                return;
            }
        };
        if let Action::Unknown(other) = &event.action {
            warn!(kind = "pods", action = %other, "unexpected watch action");
        }

        let key = pod.key();
        self.ctx.cache().pods.apply(&event.action, key.clone(), pod).await;
        if event.action == Action::Modified {
            reemit_joined(&self.ctx, self.join, &key).await;
        }
    }
}

/// Service watcher of a compound role: keeps the service cache current and
/// replays the joined object when a cached service changes.
#[derive(Clone)]
pub struct ServiceCacheSync {
    ctx: WatcherContext,
    join: JoinKind,
}

impl ServiceCacheSync {
    pub fn new(ctx: WatcherContext, join: JoinKind) -> Self {
        Self { ctx, join }
    }
}

impl KindHandler for ServiceCacheSync {
    async fn bootstrap(&self, body: &[u8]) -> SdResult<String> {
        let list = ObjectList::<Service>::parse(body)?;
        for service in list.items {
            self.ctx.cache().services.store(service.key(), service).await;
        }
        Ok(list.metadata.resource_version)
    }

    async fn handle_event(&self, event: WatchEvent) {
        let service: Service = match serde_json::from_str(event.object.get()) {
            Ok(service) => service,
            Err(err) => {
                error!(kind = "services", "cannot decode watch object, skipping it: {err}");
                return;
            }
        };
        if let Action::Unknown(other) = &event.action {
            warn!(kind = "services", action = %other, "unexpected watch action");
        }

        let key = service.key();
        self.ctx
            .cache()
            .services
            .apply(&event.action, key.clone(), service)
            .await;
        if event.action == Action::Modified {
            reemit_joined(&self.ctx, self.join, &key).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SharedCache;
    use crate::types::{SYNC_EVENT_CHANNEL_CAPACITY, SyncEvent};
    use serde_json::json;
    use tokio::sync::mpsc;

    fn context() -> (WatcherContext, mpsc::Receiver<SyncEvent>) {
        let (tx, rx) = mpsc::channel(SYNC_EVENT_CHANNEL_CAPACITY);
        let ctx = WatcherContext::new("job-0".to_string(), SharedCache::new(), tx);
        (ctx, rx)
    }

    fn frame(value: serde_json::Value) -> WatchEvent {
        // Watch frames carry a raw JSON payload, so they must be parsed from
        // text rather than from a `serde_json::Value`.
        serde_json::from_str(&value.to_string()).unwrap()
    }

    fn endpoints_frame(action: &str) -> WatchEvent {
        frame(json!({
            "type": action,
            "object": {
                "metadata": {"name": "svc1", "namespace": "ns1"},
                "subsets": [{
                    "addresses": [{
                        "ip": "10.0.0.1",
                        "targetRef": {"kind": "Pod", "namespace": "ns1", "name": "p1"}
                    }],
                    "ports": [{"name": "http", "port": 8080, "protocol": "TCP"}]
                }]
            }
        }))
    }

    fn pod_frame(action: &str, pod_ip: &str) -> WatchEvent {
        frame(json!({
            "type": action,
            "object": {
                "metadata": {"name": "p1", "namespace": "ns1"},
                "spec": {"containers": [{"name": "c1", "ports": [{"containerPort": 8080}]}]},
                "status": {"podIP": pod_ip}
            }
        }))
    }

    #[tokio::test]
    async fn endpoints_events_update_the_cache_after_emitting() {
        let (ctx, mut rx) = context();
        let handler = EndpointsTargets::new(ctx.clone());

        handler.handle_event(endpoints_frame("ADDED")).await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event.key, "endpoints/job-0/ns1/svc1");
        assert!(event.labels.is_some());
        assert!(ctx.cache().endpoints.load("ns1/svc1").await.is_some());

        handler.handle_event(endpoints_frame("DELETED")).await;
        let event = rx.recv().await.unwrap();
        assert!(event.labels.is_none());
        assert!(ctx.cache().endpoints.load("ns1/svc1").await.is_none());
    }

    #[tokio::test]
    async fn pod_modification_replays_the_linked_endpoints() {
        let (ctx, mut rx) = context();
        let endpoints_handler = EndpointsTargets::new(ctx.clone());
        let pods_handler = PodCacheSync::new(ctx.clone(), JoinKind::Endpoints);

        pods_handler.handle_event(pod_frame("ADDED", "10.0.0.1")).await;
        endpoints_handler.handle_event(endpoints_frame("ADDED")).await;
        let initial = rx.recv().await.unwrap();
        let initial_labels = initial.labels.unwrap();
        assert_eq!(
            initial_labels[0].get("__meta_kubernetes_pod_ip").unwrap(),
            "10.0.0.1"
        );

        pods_handler
            .handle_event(pod_frame("MODIFIED", "10.0.0.2"))
            .await;
        let replayed = rx.recv().await.unwrap();
        assert_eq!(replayed.key, "endpoints/job-0/ns1/svc1");
        let labels = replayed.labels.unwrap();
        assert_eq!(
            labels[0].get("__meta_kubernetes_pod_ip").unwrap(),
            "10.0.0.2"
        );
    }

    #[tokio::test]
    async fn pod_addition_does_not_fan_out() {
        let (ctx, mut rx) = context();
        let endpoints_handler = EndpointsTargets::new(ctx.clone());
        let pods_handler = PodCacheSync::new(ctx.clone(), JoinKind::Endpoints);

        endpoints_handler.handle_event(endpoints_frame("ADDED")).await;
        let _ = rx.recv().await.unwrap();

        pods_handler.handle_event(pod_frame("ADDED", "10.0.0.1")).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn service_deletion_removes_service_labels_from_later_joins() {
        let (ctx, mut rx) = context();
        let endpoints_handler = EndpointsTargets::new(ctx.clone());
        let services_handler = ServiceCacheSync::new(ctx.clone(), JoinKind::Endpoints);

        let service_frame = frame(json!({
            "type": "ADDED",
            "object": {
                "metadata": {"name": "svc1", "namespace": "ns1"},
                "spec": {"type": "ClusterIP", "clusterIP": "10.96.0.10"}
            }
        }));
        services_handler.handle_event(service_frame).await;

        endpoints_handler.handle_event(endpoints_frame("ADDED")).await;
        let event = rx.recv().await.unwrap();
        assert!(
            event.labels.unwrap()[0].contains_key("__meta_kubernetes_service_name")
        );

        let delete_frame = frame(json!({
            "type": "DELETED",
            "object": {
                "metadata": {"name": "svc1", "namespace": "ns1"},
                "spec": {"type": "ClusterIP", "clusterIP": "10.96.0.10"}
            }
        }));
        services_handler.handle_event(delete_frame).await;

        endpoints_handler.handle_event(endpoints_frame("MODIFIED")).await;
        let event = rx.recv().await.unwrap();
        assert!(
            !event.labels.unwrap()[0].contains_key("__meta_kubernetes_service_name")
        );
    }
}
