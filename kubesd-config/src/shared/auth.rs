use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::secret::Secret;

/// Basic authentication credentials for the Kubernetes API server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BasicAuthConfig {
    /// Username sent in the `Authorization` header.
    pub username: String,
    /// Password sent in the `Authorization` header.
    #[serde(default)]
    pub password: Option<Secret>,
}

/// TLS settings for connections to the Kubernetes API server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct TlsConfig {
    /// Path to a PEM bundle of trusted CA certificates.
    pub ca_file: Option<PathBuf>,
    /// Path to a PEM client certificate presented to the server.
    pub cert_file: Option<PathBuf>,
    /// Path to the PEM private key matching `cert_file`.
    pub key_file: Option<PathBuf>,
    /// Disables server certificate verification.
    pub insecure_skip_verify: bool,
}
