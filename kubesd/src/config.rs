//! Configuration objects for discovery pipelines.
//!
//! Re-exports the shared configuration types required to construct a
//! [`crate::pipeline::DiscoveryPipeline`].

// Re-exports.
pub use kubesd_config::shared::*;
