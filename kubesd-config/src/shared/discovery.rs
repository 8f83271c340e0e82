use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::secret::Secret;
use crate::shared::{BasicAuthConfig, TlsConfig, ValidationError};

/// Kubernetes discovery role determining which object kinds are watched and
/// how scrape targets are built from them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// One target per pod container port.
    Pod,
    /// One target per node, addressed at the kubelet.
    Node,
    /// One target per service port.
    Service,
    /// Targets joined from Endpoints, Pods and Services.
    Endpoints,
    /// One target per ingress rule path.
    Ingress,
    /// Targets joined from EndpointSlices, Pods and Services.
    EndpointSlices,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Pod => "pod",
            Role::Node => "node",
            Role::Service => "service",
            Role::Endpoints => "endpoints",
            Role::Ingress => "ingress",
            Role::EndpointSlices => "endpointslices",
        };
        f.write_str(name)
    }
}

/// Label and field selectors applied to the list and watch requests of one
/// role's object kind.
///
/// See <https://kubernetes.io/docs/concepts/overview/working-with-objects/labels/>.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Selector {
    /// Role whose requests this selector applies to.
    pub role: Role,
    /// Label selector expression, e.g. `app=frontend`.
    #[serde(default)]
    pub label: Option<String>,
    /// Field selector expression, e.g. `spec.nodeName=node-1`.
    #[serde(default)]
    pub field: Option<String>,
}

/// Kubernetes service discovery configuration.
///
/// When `api_server` is unset the configuration falls back to in-cluster
/// discovery through the `KUBERNETES_SERVICE_HOST`/`KUBERNETES_SERVICE_PORT`
/// environment variables and the mounted service account credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SdConfig {
    /// Discovery role.
    pub role: Role,
    /// Kubernetes API server base URL, e.g. `https://10.0.0.1:443`.
    #[serde(default)]
    pub api_server: Option<String>,
    /// Namespaces to watch. Empty means cluster-wide.
    #[serde(default)]
    pub namespaces: Vec<String>,
    /// Per-role label and field selectors.
    #[serde(default)]
    pub selectors: Vec<Selector>,
    /// Basic authentication credentials.
    #[serde(default)]
    pub basic_auth: Option<BasicAuthConfig>,
    /// Bearer token attached to every request.
    #[serde(default)]
    pub bearer_token: Option<Secret>,
    /// File containing the bearer token attached to every request.
    #[serde(default)]
    pub bearer_token_file: Option<PathBuf>,
    /// TLS settings for the API server connection.
    #[serde(default)]
    pub tls: Option<TlsConfig>,
    /// HTTP proxy URL for API server connections.
    #[serde(default)]
    pub proxy_url: Option<String>,
}

impl SdConfig {
    /// Creates a configuration for the given role with all optional settings
    /// unset.
    pub fn new(role: Role) -> Self {
        Self {
            role,
            api_server: None,
            namespaces: Vec::new(),
            selectors: Vec::new(),
            basic_auth: None,
            bearer_token: None,
            bearer_token_file: None,
            tls: None,
            proxy_url: None,
        }
    }

    /// Validates the configuration.
    ///
    /// Returns [`ValidationError::ConflictingAuthorization`] when more than
    /// one authorization mechanism is set, and
    /// [`ValidationError::IncompleteClientCertificate`] when only one half of
    /// a TLS client certificate pair is configured.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let auth_mechanisms = [
            self.basic_auth.is_some(),
            self.bearer_token.is_some(),
            self.bearer_token_file.is_some(),
        ];
        if auth_mechanisms.into_iter().filter(|set| *set).count() > 1 {
            return Err(ValidationError::ConflictingAuthorization);
        }

        if let Some(tls) = &self.tls
            && tls.cert_file.is_some() != tls.key_file.is_some()
        {
            return Err(ValidationError::IncompleteClientCertificate);
        }

        Ok(())
    }
}
