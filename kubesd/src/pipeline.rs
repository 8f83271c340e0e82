//! Discovery pipeline orchestration.
//!
//! Contains [`DiscoveryPipeline`], which turns one discovery configuration
//! into a set of watch workers, wires their events into the shared caches and
//! label builders, and owns the writer end of the downstream event channel.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

use kubesd_config::shared::{Role, SdConfig};

use crate::cache::SharedCache;
use crate::client::{ApiClient, build_list_path};
use crate::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use crate::error::SdResult;
use crate::types::{SYNC_EVENT_CHANNEL_CAPACITY, SyncEvent, WatchedKind};
use crate::objects::{Ingress, Node, Pod, Service};
use crate::watchers::{
    EndpointSliceTargets, EndpointsTargets, JoinKind, KindHandler, PodCacheSync, ServiceCacheSync,
    TargetsHandler, WatcherContext,
};
use crate::workers::base::Worker;
use crate::workers::pool::WatcherPool;
use crate::workers::watch::WatchWorker;

/// Internal lifecycle state of a pipeline.
#[derive(Debug)]
enum PipelineState {
    /// Created but not yet started.
    NotStarted,
    /// Running with active watch workers.
    Started { pool: WatcherPool },
}

/// A running Kubernetes service discovery instance.
///
/// One pipeline serves one configuration section (one role): it bootstraps
/// every required (kind, namespace) watcher from a list request, keeps them
/// connected with backoff, and emits [`SyncEvent`]s on the channel returned
/// by [`DiscoveryPipeline::new`]. Compound roles share one [`SharedCache`]
/// across their three watchers.
#[derive(Debug)]
pub struct DiscoveryPipeline {
    config: SdConfig,
    set_name: String,
    cache: SharedCache,
    events_tx: mpsc::Sender<SyncEvent>,
    shutdown_tx: ShutdownTx,
    state: PipelineState,
}

impl DiscoveryPipeline {
    /// Creates a pipeline and the receiver its events will arrive on.
    ///
    /// `set_name` identifies the configuration section producing these
    /// targets; it is threaded into every emitted event so multiple
    /// concurrent pipelines stay distinguishable downstream.
    pub fn new(config: SdConfig, set_name: impl Into<String>) -> (Self, mpsc::Receiver<SyncEvent>) {
        let (events_tx, events_rx) = mpsc::channel(SYNC_EVENT_CHANNEL_CAPACITY);

        // The receiver side is recreated on demand through `subscribe`, so the
        // one returned here is dropped.
        let (shutdown_tx, _) = create_shutdown_channel();

        let pipeline = Self {
            config,
            set_name: set_name.into(),
            cache: SharedCache::new(),
            events_tx,
            shutdown_tx,
            state: PipelineState::NotStarted,
        };
        (pipeline, events_rx)
    }

    /// Returns a handle for signaling shutdown from other tasks.
    pub fn shutdown_tx(&self) -> ShutdownTx {
        self.shutdown_tx.clone()
    }

    /// Starts the watchers of the configured role.
    ///
    /// Each watcher bootstraps from a list request before its watch loop
    /// begins; bootstrap failures are logged and the watch loop still starts
    /// from the server's current state. For the compound roles the pod and
    /// service watchers are started first so their caches are seeded before
    /// the joined kind is listed.
    pub async fn start(&mut self) -> SdResult<()> {
        info!(
            "starting {} discovery for config section '{}'",
            self.config.role, self.set_name
        );

        let client = Arc::new(ApiClient::new(&self.config)?);
        let ctx = WatcherContext::new(
            self.set_name.clone(),
            self.cache.clone(),
            self.events_tx.clone(),
        );

        let mut pool = WatcherPool::new();
        match self.config.role {
            Role::Pod => {
                self.start_watchers(
                    &client,
                    &mut pool,
                    WatchedKind::Pods,
                    TargetsHandler::<Pod>::new(ctx),
                )
                .await?;
            }
            Role::Node => {
                self.start_watchers(
                    &client,
                    &mut pool,
                    WatchedKind::Nodes,
                    TargetsHandler::<Node>::new(ctx),
                )
                .await?;
            }
            Role::Service => {
                self.start_watchers(
                    &client,
                    &mut pool,
                    WatchedKind::Services,
                    TargetsHandler::<Service>::new(ctx),
                )
                .await?;
            }
            Role::Ingress => {
                self.start_watchers(
                    &client,
                    &mut pool,
                    WatchedKind::Ingresses,
                    TargetsHandler::<Ingress>::new(ctx),
                )
                .await?;
            }
            Role::Endpoints => {
                self.start_watchers(
                    &client,
                    &mut pool,
                    WatchedKind::Pods,
                    PodCacheSync::new(ctx.clone(), JoinKind::Endpoints),
                )
                .await?;
                self.start_watchers(
                    &client,
                    &mut pool,
                    WatchedKind::Services,
                    ServiceCacheSync::new(ctx.clone(), JoinKind::Endpoints),
                )
                .await?;
                self.start_watchers(
                    &client,
                    &mut pool,
                    WatchedKind::Endpoints,
                    EndpointsTargets::new(ctx),
                )
                .await?;
            }
            Role::EndpointSlices => {
                self.start_watchers(
                    &client,
                    &mut pool,
                    WatchedKind::Pods,
                    PodCacheSync::new(ctx.clone(), JoinKind::EndpointSlices),
                )
                .await?;
                self.start_watchers(
                    &client,
                    &mut pool,
                    WatchedKind::Services,
                    ServiceCacheSync::new(ctx.clone(), JoinKind::EndpointSlices),
                )
                .await?;
                self.start_watchers(
                    &client,
                    &mut pool,
                    WatchedKind::EndpointSlices,
                    EndpointSliceTargets::new(ctx),
                )
                .await?;
            }
        }

        self.state = PipelineState::Started { pool };

        Ok(())
    }

    /// Bootstraps and spawns one watcher per configured namespace for `kind`,
    /// or a single cluster-wide watcher when no namespaces are configured.
    async fn start_watchers<H: KindHandler>(
        &self,
        client: &Arc<ApiClient>,
        pool: &mut WatcherPool,
        kind: WatchedKind,
        handler: H,
    ) -> SdResult<()> {
        let namespaces: Vec<Option<String>> = if self.config.namespaces.is_empty() {
            vec![None]
        } else {
            self.config.namespaces.iter().cloned().map(Some).collect()
        };

        for namespace in namespaces {
            let path = build_list_path(kind, namespace.as_deref(), &self.config.selectors);

            let resource_version = match client.blocking_list(&path).await {
                Ok(body) => match handler.bootstrap(&body).await {
                    Ok(version) => version,
                    Err(err) => {
                        error!("cannot decode the {kind} list response: {err}");
                        String::new()
                    }
                },
                Err(err) => {
                    error!("cannot get the latest {kind} resource version: {err}");
                    String::new()
                }
            };

            let worker = WatchWorker::new(
                client.clone(),
                kind,
                namespace,
                path,
                resource_version,
                handler.clone(),
                self.shutdown_tx.subscribe(),
            );
            pool.add(worker.start().await?);
        }

        Ok(())
    }

    /// Waits for every watcher to terminate.
    ///
    /// Watchers only terminate after a shutdown signal; errors from panicked
    /// watcher tasks are aggregated and returned.
    pub async fn wait(self) -> SdResult<()> {
        let PipelineState::Started { pool } = self.state else {
            info!("pipeline was not started, nothing to wait for");

            return Ok(());
        };

        info!("waiting for {} watchers to terminate", pool.len());

        pool.wait_all().await
    }

    /// Signals every watcher to terminate and returns immediately.
    ///
    /// Use [`DiscoveryPipeline::wait`] afterwards to wait for complete
    /// shutdown.
    pub fn shutdown(&self) {
        info!("shutting down the discovery pipeline");

        if let Err(err) = self.shutdown_tx.shutdown() {
            error!("failed to send the shutdown signal to the watchers: {err}");
        }
    }

    /// Initiates shutdown and waits for every watcher to terminate.
    pub async fn shutdown_and_wait(self) -> SdResult<()> {
        self.shutdown();
        self.wait().await
    }
}
