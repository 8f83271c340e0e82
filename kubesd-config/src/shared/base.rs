use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// More than one authorization mechanism was configured.
    #[error(
        "at most one of `basic_auth`, `bearer_token` and `bearer_token_file` may be configured"
    )]
    ConflictingAuthorization,
    /// A TLS client certificate was configured without its key, or vice versa.
    #[error("`cert_file` and `key_file` must be configured together")]
    IncompleteClientCertificate,
}
