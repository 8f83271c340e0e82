use std::error;
use std::fmt;

/// Convenient result type for discovery operations using [`SdError`] as the
/// error type.
pub type SdResult<T> = Result<T, SdError>;

/// Main error type for service discovery operations.
///
/// [`SdError`] can represent a single categorized error, an error with
/// additional dynamic detail, or multiple aggregated errors (e.g. from
/// several watcher tasks failing independently).
#[derive(Debug, Clone)]
pub struct SdError {
    repr: ErrorRepr,
}

/// Internal representation of error data.
#[derive(Debug, Clone)]
enum ErrorRepr {
    /// Error with kind and static description.
    WithDescription(ErrorKind, &'static str),
    /// Error with kind, static description, and dynamic detail.
    WithDescriptionAndDetail(ErrorKind, &'static str, String),
    /// Multiple aggregated errors.
    Many(Vec<SdError>),
}

/// Categories of errors that can occur during service discovery.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The discovery configuration is invalid or incomplete.
    ConfigError,
    /// The API server URL could not be parsed.
    InvalidApiServerUrl,
    /// Authorization material could not be loaded or applied.
    AuthenticationError,
    /// A connection to the Kubernetes API server could not be established.
    ApiConnectionFailed,
    /// The Kubernetes API server rejected a request or returned a non-2xx
    /// status.
    ApiRequestFailed,
    /// Reading from a stream or the filesystem failed.
    IoError,
    /// A response body or watch frame could not be decoded.
    DeserializationError,
    /// A watcher task panicked or was aborted.
    WatcherPanic,
    /// Unknown / uncategorized.
    Unknown,
}

impl SdError {
    /// Creates an error from a kind and a static description.
    pub fn new(kind: ErrorKind, description: &'static str) -> SdError {
        SdError {
            repr: ErrorRepr::WithDescription(kind, description),
        }
    }

    /// Creates an error carrying additional dynamic detail.
    pub fn with_detail(
        kind: ErrorKind,
        description: &'static str,
        detail: impl fmt::Display,
    ) -> SdError {
        SdError {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, description, detail.to_string()),
        }
    }

    /// Attaches dynamic detail to this error, replacing any existing detail.
    ///
    /// Aggregated errors are returned unchanged.
    pub fn detailed(self, detail: impl fmt::Display) -> SdError {
        match self.repr {
            ErrorRepr::WithDescription(kind, desc)
            | ErrorRepr::WithDescriptionAndDetail(kind, desc, _) => {
                SdError::with_detail(kind, desc, detail)
            }
            ErrorRepr::Many(_) => self,
        }
    }

    /// Creates an [`SdError`] containing multiple aggregated errors.
    pub fn many(errors: Vec<SdError>) -> SdError {
        SdError {
            repr: ErrorRepr::Many(errors),
        }
    }

    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For aggregated errors, returns the kind of the first error or
    /// [`ErrorKind::Unknown`] if the list is empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::WithDescription(kind, _)
            | ErrorRepr::WithDescriptionAndDetail(kind, _, _) => kind,
            ErrorRepr::Many(ref errors) => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns all [`ErrorKind`]s present in this error, flattened.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::WithDescription(kind, _)
            | ErrorRepr::WithDescriptionAndDetail(kind, _, _) => vec![kind],
            ErrorRepr::Many(ref errors) => errors.iter().flat_map(|err| err.kinds()).collect(),
        }
    }

    /// Returns the detailed error information, if available.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::WithDescriptionAndDetail(_, _, ref detail) => Some(detail.as_str()),
            ErrorRepr::Many(ref errors) => errors.iter().find_map(|e| e.detail()),
            _ => None,
        }
    }
}

impl PartialEq for SdError {
    fn eq(&self, other: &SdError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::WithDescription(kind_a, _), ErrorRepr::WithDescription(kind_b, _)) => {
                kind_a == kind_b
            }
            (
                ErrorRepr::WithDescriptionAndDetail(kind_a, _, _),
                ErrorRepr::WithDescriptionAndDetail(kind_b, _, _),
            ) => kind_a == kind_b,
            (ErrorRepr::Many(errors_a), ErrorRepr::Many(errors_b)) => {
                errors_a.len() == errors_b.len()
                    && errors_a.iter().zip(errors_b.iter()).all(|(a, b)| a == b)
            }
            _ => false,
        }
    }
}

impl fmt::Display for SdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self.repr {
            ErrorRepr::WithDescription(kind, desc) => {
                write!(f, "{kind:?}: {desc}")
            }
            ErrorRepr::WithDescriptionAndDetail(kind, desc, ref detail) => {
                write!(f, "{kind:?}: {desc} -> {detail}")
            }
            ErrorRepr::Many(ref errors) => {
                if errors.len() == 1 {
                    errors[0].fmt(f)
                } else {
                    write!(f, "Multiple errors occurred ({} total):", errors.len())?;
                    for (i, error) in errors.iter().enumerate() {
                        write!(f, "\n  {}: {}", i + 1, error)?;
                    }
                    Ok(())
                }
            }
        }
    }
}

impl error::Error for SdError {}

/// Returns early with an [`SdError`] built from a kind, a static description,
/// and optional dynamic detail.
///
/// ```ignore
/// bail!(ErrorKind::ApiRequestFailed, "unexpected status code");
/// bail!(ErrorKind::ApiRequestFailed, "unexpected status code", status);
/// ```
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr $(, $detail:expr)?) => {
        return Err($crate::error::SdError::new($kind, $desc)$(.detailed($detail))?)
    };
}

/// Aggregates a vector of errors into one [`SdError`].
impl<E> From<Vec<E>> for SdError
where
    E: Into<SdError>,
{
    fn from(errors: Vec<E>) -> SdError {
        SdError {
            repr: ErrorRepr::Many(errors.into_iter().map(Into::into).collect()),
        }
    }
}

impl From<std::io::Error> for SdError {
    fn from(err: std::io::Error) -> SdError {
        SdError::with_detail(ErrorKind::IoError, "I/O error occurred", err)
    }
}

impl From<serde_json::Error> for SdError {
    fn from(err: serde_json::Error) -> SdError {
        SdError::with_detail(
            ErrorKind::DeserializationError,
            "JSON deserialization failed",
            err,
        )
    }
}

/// Converts [`reqwest::Error`] to [`SdError`], classifying connection and
/// request failures separately so callers can distinguish an unreachable API
/// server from a rejected request.
impl From<reqwest::Error> for SdError {
    fn from(err: reqwest::Error) -> SdError {
        let (kind, description) = if err.is_connect() || err.is_timeout() {
            (
                ErrorKind::ApiConnectionFailed,
                "cannot connect to the Kubernetes API server",
            )
        } else if err.is_builder() {
            (ErrorKind::ConfigError, "cannot build the HTTP client")
        } else if err.is_decode() {
            (ErrorKind::IoError, "cannot read the API response body")
        } else {
            (ErrorKind::ApiRequestFailed, "Kubernetes API request failed")
        };

        SdError::with_detail(kind, description, err)
    }
}

impl From<url::ParseError> for SdError {
    fn from(err: url::ParseError) -> SdError {
        SdError::with_detail(ErrorKind::InvalidApiServerUrl, "cannot parse URL", err)
    }
}

/// Converts a task join failure into [`ErrorKind::WatcherPanic`].
impl From<tokio::task::JoinError> for SdError {
    fn from(err: tokio::task::JoinError) -> SdError {
        SdError::with_detail(
            ErrorKind::WatcherPanic,
            "a watcher task terminated abnormally",
            err,
        )
    }
}
