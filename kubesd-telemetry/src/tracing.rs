use std::sync::Once;
use thiserror::Error;
use tracing::subscriber::{SetGlobalDefaultError, set_global_default};
use tracing_subscriber::{EnvFilter, fmt};

/// Default filter directive applied when `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "info";

/// Errors that can occur during tracing initialization.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to set global default subscriber: {0}")]
    SetGlobalDefault(#[from] SetGlobalDefaultError),
}

/// Initializes tracing for a service.
///
/// Installs a console subscriber filtered through `RUST_LOG` (defaulting to
/// `info`) with the service name attached to every event as the target
/// prefix. Must be called once, before any spans or events are emitted.
pub fn init_tracing(service_name: &str) -> Result<(), TracingError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();

    set_global_default(subscriber)?;

    tracing::info!(service = service_name, "tracing initialized");

    Ok(())
}

static INIT_TEST_TRACING: Once = Once::new();

/// Initializes tracing for test environments.
///
/// Call at the beginning of tests. Output is only produced when the
/// `ENABLE_TRACING` environment variable is set:
/// ```bash
/// ENABLE_TRACING=1 cargo test test_name
/// ```
pub fn init_test_tracing() {
    INIT_TEST_TRACING.call_once(|| {
        if std::env::var("ENABLE_TRACING").is_ok() {
            init_tracing("test").expect("Failed to initialize tracing for tests");
        }
    });
}
