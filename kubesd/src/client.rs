//! HTTP client for the Kubernetes API server.
//!
//! [`ApiClient`] issues the one-shot list requests and long-lived watch
//! requests every watcher is built on. One client (and one connection pool)
//! is shared by all watchers of a pipeline.

use bytes::Bytes;
use futures::TryStreamExt;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tokio_util::io::StreamReader;
use tracing::error;

use kubesd_config::shared::{SdConfig, Selector, TlsConfig};

use crate::bail;
use crate::error::{ErrorKind, SdError, SdResult};
use crate::stream::JsonFrameReader;
use crate::types::{WatchEvent, WatchedKind};
use crate::watchers::KindHandler;

/// Connection establishment timeout, covering the TLS handshake.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Idle connections are reaped after this long.
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// Mounted service account credentials used for in-cluster discovery.
const SERVICE_ACCOUNT_CA_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";
const SERVICE_ACCOUNT_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Authorization applied to every API server request.
#[derive(Debug, Clone)]
enum Authorization {
    None,
    Bearer(SecretString),
    Basic {
        username: String,
        password: Option<SecretString>,
    },
}

impl Authorization {
    fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            Authorization::None => request,
            Authorization::Bearer(token) => request.bearer_auth(token.expose_secret()),
            Authorization::Basic { username, password } => request.basic_auth(
                username,
                password.as_ref().map(|password| password.expose_secret()),
            ),
        }
    }
}

/// Client for the Kubernetes API server.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    authorization: Authorization,
}

impl ApiClient {
    /// Builds a client from the discovery configuration.
    ///
    /// Without a configured `api_server` the client assumes it runs inside a
    /// pod and discovers the server and its credentials from the environment,
    /// per
    /// <https://kubernetes.io/docs/tasks/run-application/access-api-from-pod/>.
    pub fn new(config: &SdConfig) -> SdResult<Self> {
        let (base_url, in_cluster) = resolve_api_server(config)?;
        let authorization = build_authorization(config, in_cluster)?;

        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .gzip(true)
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT);

        let tls = config.tls.clone().unwrap_or_default();
        let ca_file = match &tls.ca_file {
            Some(path) => Some(path.clone()),
            None if in_cluster => Some(SERVICE_ACCOUNT_CA_PATH.into()),
            None => None,
        };
        if let Some(path) = ca_file {
            let pem = std::fs::read(&path).map_err(|err| {
                SdError::with_detail(
                    ErrorKind::AuthenticationError,
                    "cannot read the CA bundle",
                    format!("{}: {err}", path.display()),
                )
            })?;
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&pem)?);
        }
        builder = apply_client_certificate(builder, &tls)?;
        if tls.insecure_skip_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        builder = match &config.proxy_url {
            Some(proxy_url) => builder.proxy(reqwest::Proxy::all(proxy_url)?),
            None => builder.no_proxy(),
        };

        Ok(Self {
            client: builder.build()?,
            base_url,
            authorization,
        })
    }

    /// Performs a single blocking GET against the API server and returns the
    /// full body.
    ///
    /// Fails on transport errors and non-2xx statuses. Gzip-encoded bodies
    /// are decompressed transparently.
    pub async fn blocking_list(&self, path: &str) -> SdResult<Bytes> {
        let url = format!("{}{path}", self.base_url);
        let response = self.authorization.apply(self.client.get(url)).send().await?;

        let status = response.status();
        if !status.is_success() {
            bail!(
                ErrorKind::ApiRequestFailed,
                "unexpected status code from blocking API request",
                format!("{status} at {path}")
            );
        }

        Ok(response.bytes().await?)
    }

    /// Opens one watch session and dispatches every decoded frame to the
    /// handler.
    ///
    /// Appends `watch=1` and, when non-empty, `resourceVersion` to the path.
    /// Returns `Ok(())` when the server closes the stream; the caller decides
    /// whether to reconnect. Frames that fail to decode are logged and
    /// skipped, they never terminate the session.
    pub async fn watch_session<H: KindHandler>(
        &self,
        path: &str,
        resource_version: &str,
        handler: &H,
    ) -> SdResult<()> {
        let mut url = format!("{}{}", self.base_url, append_query(path, "watch=1"));
        if !resource_version.is_empty() {
            url.push_str("&resourceVersion=");
            url.push_str(resource_version);
        }

        let response = self.authorization.apply(self.client.get(url)).send().await?;
        let status = response.status();
        if !status.is_success() {
            bail!(
                ErrorKind::ApiRequestFailed,
                "unexpected status code from watch request",
                format!("{status} at {path}")
            );
        }

        let body = StreamReader::new(Box::pin(
            response.bytes_stream().map_err(std::io::Error::other),
        ));
        let mut frames = JsonFrameReader::new(body);
        while let Some(frame) = frames.next_frame().await? {
            match serde_json::from_slice::<WatchEvent>(&frame) {
                Ok(event) => handler.handle_event(event).await,
                Err(err) => {
                    error!("cannot parse watch frame as JSON, skipping it: {err}");
                }
            }
        }

        Ok(())
    }
}

/// Builds the list path for `kind`, including the configured selectors of the
/// kind's role.
pub fn build_list_path(
    kind: WatchedKind,
    namespace: Option<&str>,
    selectors: &[Selector],
) -> String {
    let mut path = kind.list_path(namespace);
    if let Some(query) = selectors_query(kind, selectors) {
        path = append_query(&path, &query);
    }
    path
}

/// Renders the selectors matching `kind`'s role into a query string.
///
/// Multiple selectors for the same role are joined with commas into a single
/// `labelSelector`/`fieldSelector` pair, URL-encoded.
fn selectors_query(kind: WatchedKind, selectors: &[Selector]) -> Option<String> {
    let role = kind.selector_role();

    let mut label_selectors = Vec::new();
    let mut field_selectors = Vec::new();
    for selector in selectors.iter().filter(|s| s.role == role) {
        if let Some(label) = &selector.label
            && !label.is_empty()
        {
            label_selectors.push(label.as_str());
        }
        if let Some(field) = &selector.field
            && !field.is_empty()
        {
            field_selectors.push(field.as_str());
        }
    }

    if label_selectors.is_empty() && field_selectors.is_empty() {
        return None;
    }

    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    if !label_selectors.is_empty() {
        serializer.append_pair("labelSelector", &label_selectors.join(","));
    }
    if !field_selectors.is_empty() {
        serializer.append_pair("fieldSelector", &field_selectors.join(","));
    }
    Some(serializer.finish())
}

/// Appends a query fragment with the separator the path requires.
fn append_query(path: &str, query: &str) -> String {
    if path.contains('?') {
        format!("{path}&{query}")
    } else {
        format!("{path}?{query}")
    }
}

/// Resolves the API server base URL, falling back to in-cluster discovery.
///
/// Returns the URL and whether the in-cluster service account credentials
/// should be used.
fn resolve_api_server(config: &SdConfig) -> SdResult<(String, bool)> {
    if let Some(api_server) = &config.api_server {
        return Ok((api_server.trim_end_matches('/').to_string(), false));
    }

    let Ok(host) = std::env::var("KUBERNETES_SERVICE_HOST") else {
        bail!(
            ErrorKind::ConfigError,
            "cannot discover the API server",
            "`api_server` is not configured and KUBERNETES_SERVICE_HOST is not set; \
             it must be defined when running inside Kubernetes"
        );
    };
    let Ok(port) = std::env::var("KUBERNETES_SERVICE_PORT") else {
        bail!(
            ErrorKind::ConfigError,
            "cannot discover the API server",
            format!("KUBERNETES_SERVICE_PORT is not set; KUBERNETES_SERVICE_HOST={host}")
        );
    };

    let base_url = if host.contains(':') {
        format!("https://[{host}]:{port}")
    } else {
        format!("https://{host}:{port}")
    };
    Ok((base_url, true))
}

/// Builds the request authorization from the configuration, defaulting to the
/// mounted service account token for in-cluster clients.
fn build_authorization(config: &SdConfig, in_cluster: bool) -> SdResult<Authorization> {
    if let Some(basic_auth) = &config.basic_auth {
        return Ok(Authorization::Basic {
            username: basic_auth.username.clone(),
            password: basic_auth
                .password
                .clone()
                .map(|password| password.into()),
        });
    }
    if let Some(token) = &config.bearer_token {
        return Ok(Authorization::Bearer(token.clone().into()));
    }

    let token_file = match &config.bearer_token_file {
        Some(path) => Some(path.clone()),
        None if in_cluster => Some(SERVICE_ACCOUNT_TOKEN_PATH.into()),
        None => None,
    };
    if let Some(path) = token_file {
        let token = std::fs::read_to_string(&path).map_err(|err| {
            SdError::with_detail(
                ErrorKind::AuthenticationError,
                "cannot read the bearer token file",
                format!("{}: {err}", path.display()),
            )
        })?;
        return Ok(Authorization::Bearer(token.trim().to_string().into()));
    }

    Ok(Authorization::None)
}

fn apply_client_certificate(
    builder: reqwest::ClientBuilder,
    tls: &TlsConfig,
) -> SdResult<reqwest::ClientBuilder> {
    let (Some(cert_file), Some(key_file)) = (&tls.cert_file, &tls.key_file) else {
        return Ok(builder);
    };

    let mut pem = std::fs::read(cert_file).map_err(|err| {
        SdError::with_detail(
            ErrorKind::AuthenticationError,
            "cannot read the client certificate",
            format!("{}: {err}", cert_file.display()),
        )
    })?;
    pem.extend(std::fs::read(key_file).map_err(|err| {
        SdError::with_detail(
            ErrorKind::AuthenticationError,
            "cannot read the client key",
            format!("{}: {err}", key_file.display()),
        )
    })?);

    Ok(builder.identity(reqwest::Identity::from_pem(&pem)?))
}
