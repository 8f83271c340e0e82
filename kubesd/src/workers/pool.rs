use crate::error::{SdError, SdResult};
use crate::workers::base::WorkerHandle;
use crate::workers::watch::WatchWorkerHandle;

/// Tracks the watch workers of one pipeline.
///
/// All workers of a role are spawned during startup; the pool joins them at
/// shutdown and aggregates whatever failures they surfaced.
#[derive(Debug, Default)]
pub struct WatcherPool {
    handles: Vec<WatchWorkerHandle>,
}

impl WatcherPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a started worker to the pool.
    pub fn add(&mut self, handle: WatchWorkerHandle) {
        self.handles.push(handle);
    }

    /// Returns the number of tracked workers.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns whether the pool tracks no workers.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Waits for every worker to terminate, aggregating their errors.
    pub async fn wait_all(self) -> SdResult<()> {
        let mut errors = Vec::new();
        for handle in self.handles {
            if let Err(err) = handle.wait().await {
                errors.push(err);
            }
        }

        if !errors.is_empty() {
            return Err(SdError::many(errors));
        }

        Ok(())
    }
}
