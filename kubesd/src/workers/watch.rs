use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info};

use crate::client::ApiClient;
use crate::concurrency::shutdown::ShutdownRx;
use crate::error::{SdError, SdResult};
use crate::types::WatchedKind;
use crate::watchers::KindHandler;
use crate::workers::base::{Worker, WorkerHandle};

/// Delay before the first reconnect attempt.
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Backoff growth per reconnect attempt.
const BACKOFF_STEP: Duration = Duration::from_secs(5);

/// Upper bound on the reconnect delay.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Reconnect backoff for a watch loop.
///
/// Grows linearly from 1 s by 5 s per attempt up to 30 s, and is never reset
/// on a successful session.
#[derive(Debug)]
pub(crate) struct WatchBackoff {
    current: Duration,
}

impl WatchBackoff {
    pub(crate) fn new() -> Self {
        Self {
            current: INITIAL_BACKOFF,
        }
    }

    /// Returns the delay to sleep before the next reconnect and advances the
    /// schedule.
    pub(crate) fn advance(&mut self) -> Duration {
        let delay = self.current;
        self.current = MAX_BACKOFF.min(self.current + BACKOFF_STEP);
        delay
    }
}

/// Handle to a running watch worker.
#[derive(Debug)]
pub struct WatchWorkerHandle {
    handle: Option<JoinHandle<SdResult<()>>>,
}

impl WorkerHandle for WatchWorkerHandle {
    async fn wait(mut self) -> SdResult<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        handle.await??;

        Ok(())
    }
}

/// A worker sustaining the watch loop for one (kind, namespace) pair.
///
/// The loop opens a watch session starting at the bootstrap resource version,
/// and on any termination reconnects with an *empty* resource version so the
/// server picks its current state. The backoff sleep is cancellable through
/// the shutdown signal; no error ever propagates out of the loop.
#[derive(Debug)]
pub struct WatchWorker<H> {
    client: Arc<ApiClient>,
    kind: WatchedKind,
    namespace: Option<String>,
    path: String,
    resource_version: String,
    handler: H,
    shutdown_rx: ShutdownRx,
}

impl<H: KindHandler> WatchWorker<H> {
    pub fn new(
        client: Arc<ApiClient>,
        kind: WatchedKind,
        namespace: Option<String>,
        path: String,
        resource_version: String,
        handler: H,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            client,
            kind,
            namespace,
            path,
            resource_version,
            handler,
            shutdown_rx,
        }
    }

    async fn run(self) -> SdResult<()> {
        let WatchWorker {
            client,
            path,
            mut resource_version,
            handler,
            mut shutdown_rx,
            ..
        } = self;

        let mut backoff = WatchBackoff::new();
        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    info!("shutting down watcher");
                    return Ok(());
                }

                result = client.watch_session(&path, &resource_version, &handler) => {
                    match result {
                        Ok(()) => debug!("watch stream ended, reconnecting"),
                        Err(err) => error!("watch stream failed: {err}"),
                    }
                }
            }

            // Reconnect from the server's current state.
            resource_version.clear();

            let delay = backoff.advance();
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    info!("shutting down watcher during backoff");
                    return Ok(());
                }

                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

impl<H: KindHandler> Worker<WatchWorkerHandle> for WatchWorker<H> {
    type Error = SdError;

    async fn start(self) -> Result<WatchWorkerHandle, Self::Error> {
        let span = tracing::info_span!(
            "watcher",
            kind = %self.kind,
            namespace = self.namespace.as_deref().unwrap_or("*"),
        );
        info!(kind = %self.kind, "starting watcher");

        let handle = tokio::spawn(self.run().instrument(span));

        Ok(WatchWorkerHandle {
            handle: Some(handle),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_linearly_and_caps_at_thirty_seconds() {
        let mut backoff = WatchBackoff::new();
        let delays: Vec<u64> = (0..8).map(|_| backoff.advance().as_secs()).collect();
        assert_eq!(delays, vec![1, 6, 11, 16, 21, 26, 30, 30]);
    }
}
