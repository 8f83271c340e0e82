use kubesd_config::Config;
use kubesd_config::shared::SdConfig;
use serde::Deserialize;

/// Top-level configuration of the discovery agent.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Name of the configuration section, threaded into every emitted event
    /// key.
    #[serde(default = "default_set_name")]
    pub set_name: String,
    /// Service discovery settings.
    pub discovery: SdConfig,
}

fn default_set_name() -> String {
    "kubernetes".to_string()
}

impl Config for AgentConfig {
    const LIST_KEYS: &'static [&'static str] = &["discovery.namespaces"];
}

/// Loads the agent configuration from the `configuration/` directory and
/// `KUBESD_*` environment overrides.
pub fn load_agent_config() -> anyhow::Result<AgentConfig> {
    Ok(kubesd_config::load_config::<AgentConfig>()?)
}
