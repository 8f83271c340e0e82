//! Telemetry bootstrap for kubesd services.
//!
//! Wires `tracing` with an environment-driven filter for binaries and tests.

mod tracing;

pub use tracing::*;
