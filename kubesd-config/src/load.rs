use serde::de::DeserializeOwned;
use std::path::Path;

use crate::environment::Environment;

/// Directory holding configuration files, relative to the working directory.
const CONFIG_DIR: &str = "configuration";

/// Prefix shared by all configuration environment variables.
const ENV_VAR_PREFIX: &str = "KUBESD";

/// Marks configuration keys whose environment-variable form holds a
/// comma-separated list.
pub trait Config {
    /// Keys decoded as comma-separated lists, e.g.
    /// `KUBESD_DISCOVERY__NAMESPACES=ns1,ns2` for `discovery.namespaces`.
    const LIST_KEYS: &'static [&'static str];
}

/// Loads the configuration for the detected environment.
///
/// Three layers are merged, later ones overriding earlier ones:
/// `configuration/base.yaml`, then the optional
/// `configuration/<environment>.yaml`, then `KUBESD_*` environment variables
/// with `__` separating nested keys (`KUBESD_DISCOVERY__ROLE` sets
/// `discovery.role`).
pub fn load_config<T>() -> Result<T, config::ConfigError>
where
    T: Config + DeserializeOwned,
{
    let environment = Environment::detect()
        .map_err(|err| config::ConfigError::Message(err.to_string()))?;

    let config_dir = Path::new(CONFIG_DIR);
    let environment_file = config_dir.join(format!("{environment}.yaml"));

    config::Config::builder()
        .add_source(config::File::from(config_dir.join("base.yaml")))
        .add_source(config::File::from(environment_file).required(false))
        .add_source(env_source::<T>())
        .build()?
        .try_deserialize()
}

/// Builds the environment-variable layer for `T`.
fn env_source<T: Config>() -> config::Environment {
    let mut source = config::Environment::with_prefix(ENV_VAR_PREFIX)
        .prefix_separator("_")
        .separator("__");

    if !T::LIST_KEYS.is_empty() {
        source = source.try_parsing(true).list_separator(",");
        for key in T::LIST_KEYS {
            source = source.with_list_parse_key(key);
        }
    }

    source
}
