//! Per-kind watch handlers.
//!
//! A [`KindHandler`] is the single code path through which an object becomes
//! targets: the bootstrap list synthesizes `ADDED` events through the same
//! handler the watch stream uses, so a target's labels are built identically
//! whether it first appears at bootstrap or later.

use std::future::Future;
use tokio::sync::mpsc;
use tracing::debug;

use crate::cache::SharedCache;
use crate::error::SdResult;
use crate::types::{SyncEvent, TargetLabels, WatchEvent, build_sync_key};

mod joined;
mod targets;

pub use joined::{
    EndpointSliceTargets, EndpointsTargets, JoinKind, PodCacheSync, ServiceCacheSync,
};
pub use targets::TargetsHandler;

/// Handles the two input paths of one watched kind.
pub trait KindHandler: Clone + Send + Sync + 'static {
    /// Parses a list response, seeds caches, synthesizes `ADDED` events, and
    /// returns the list's resource version for the watch to start from.
    fn bootstrap(&self, body: &[u8]) -> impl Future<Output = SdResult<String>> + Send;

    /// Handles one decoded watch frame.
    fn handle_event(&self, event: WatchEvent) -> impl Future<Output = ()> + Send;
}

/// State shared by all handlers of one discovery pipeline.
#[derive(Debug, Clone)]
pub struct WatcherContext {
    set_name: String,
    cache: SharedCache,
    events_tx: mpsc::Sender<SyncEvent>,
}

impl WatcherContext {
    pub fn new(set_name: String, cache: SharedCache, events_tx: mpsc::Sender<SyncEvent>) -> Self {
        Self {
            set_name,
            cache,
            events_tx,
        }
    }

    pub fn set_name(&self) -> &str {
        &self.set_name
    }

    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    /// Sends one sync event downstream, blocking while the channel is full.
    pub async fn emit(&self, kind: &str, object_key: &str, labels: Option<Vec<TargetLabels>>) {
        let event = SyncEvent {
            key: build_sync_key(kind, &self.set_name, object_key),
            labels,
            config_section_set: self.set_name.clone(),
        };
        if self.events_tx.send(event).await.is_err() {
            debug!("sync event dropped, the downstream consumer is gone");
        }
    }
}
