use tracing::info;

use kubesd::pipeline::DiscoveryPipeline;
use kubesd_telemetry::init_tracing;

use crate::config::{AgentConfig, load_agent_config};

mod config;

fn main() -> anyhow::Result<()> {
    let agent_config = load_agent_config()?;

    init_tracing(env!("CARGO_BIN_NAME"))?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(agent_config))?;

    Ok(())
}

async fn async_main(agent_config: AgentConfig) -> anyhow::Result<()> {
    agent_config.discovery.validate()?;

    let (mut pipeline, mut events_rx) =
        DiscoveryPipeline::new(agent_config.discovery, agent_config.set_name);
    pipeline.start().await?;

    // Surface emitted target groups in the logs until we are told to stop.
    let consumer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match &event.labels {
                Some(labels) => {
                    info!("targets updated for '{}': {} label sets", event.key, labels.len())
                }
                None => info!("targets removed for '{}'", event.key),
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("received Ctrl-C, shutting down");

    pipeline.shutdown_and_wait().await?;
    consumer.abort();

    Ok(())
}
