use tokio::sync::watch;

/// Transmitter side of the shutdown coordination channel.
///
/// [`ShutdownTx`] broadcasts a shutdown signal to every watcher that
/// subscribed to it. The signal carries no payload; receivers react to the
/// channel changing.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<()>);

impl ShutdownTx {
    /// Triggers shutdown for all subscribed watchers.
    ///
    /// Watchers respond by abandoning their current watch session and
    /// terminating without error.
    pub fn shutdown(&self) -> Result<(), watch::error::SendError<()>> {
        self.0.send(())
    }

    /// Creates a new shutdown receiver.
    ///
    /// Each watcher holds its own receiver; any number can be created from
    /// the same transmitter.
    pub fn subscribe(&self) -> ShutdownRx {
        self.0.subscribe()
    }
}

/// Receiver side of the shutdown coordination channel.
pub type ShutdownRx = watch::Receiver<()>;

/// Creates a new shutdown coordination channel.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(());
    (ShutdownTx(tx), rx)
}
