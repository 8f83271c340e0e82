use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Environment variable selecting the deployment environment.
const ENVIRONMENT_VAR: &str = "KUBESD_ENVIRONMENT";

/// Deployment environment a kubesd service runs in.
///
/// Decides which environment-specific file is layered over the base
/// configuration. An unset variable means [`Environment::Prod`], so a
/// deployment never silently picks up development settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Environment {
    /// Local development.
    Dev,
    /// Deployed.
    #[default]
    Prod,
}

/// Error returned when `KUBESD_ENVIRONMENT` holds an unsupported value.
#[derive(Debug, Error)]
#[error("unsupported environment `{0}`, expected `dev` or `prod`")]
pub struct UnknownEnvironment(String);

impl Environment {
    /// Reads the environment from `KUBESD_ENVIRONMENT`.
    pub fn detect() -> Result<Self, UnknownEnvironment> {
        match std::env::var(ENVIRONMENT_VAR) {
            Ok(value) => value.parse(),
            Err(_) => Ok(Self::default()),
        }
    }

    /// Returns the lowercase name used in configuration file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Prod => "prod",
        }
    }
}

impl FromStr for Environment {
    type Err = UnknownEnvironment;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(UnknownEnvironment(s.to_string())),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
