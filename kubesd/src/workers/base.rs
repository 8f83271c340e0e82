use std::future::Future;

use crate::error::SdResult;

/// A type that can be started as a background worker task.
///
/// The generic parameter `H` is the handle type returned when the worker
/// starts.
pub trait Worker<H>
where
    H: WorkerHandle,
{
    /// Error type returned when the worker fails to start.
    type Error;

    /// Starts the worker and resolves to its handle.
    fn start(self) -> impl Future<Output = Result<H, Self::Error>> + Send;
}

/// A handle to a running worker.
pub trait WorkerHandle {
    /// Resolves when the worker completes.
    ///
    /// Captures panics of the worker task and surfaces them as errors.
    fn wait(self) -> impl Future<Output = SdResult<()>> + Send;
}
