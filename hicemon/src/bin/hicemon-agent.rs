use std::time::Duration;

use clap::Parser;
use hicemon::agent::{Agent, AgentConfig};

#[derive(Parser)]
#[command(name = "hicemon-agent", version, about = "Per-node CPU monitor agent")]
struct Cli {
    /// Name this node is registered under in the cluster
    #[arg(long)]
    node_name: String,
    /// Container runtime HTTP endpoint
    #[arg(long, default_value = "http://127.0.0.1:2375")]
    runtime_endpoint: String,
    /// Monitor server address
    #[arg(short, long, default_value = "127.0.0.1:12345")]
    server: String,
    /// Seconds between samples
    #[arg(long, default_value_t = 1)]
    interval: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let agent = Agent::new(AgentConfig {
        node_name: cli.node_name,
        runtime_endpoint: cli.runtime_endpoint,
        server_addr: cli.server,
        interval: Duration::from_secs(cli.interval),
    })
    .await?;
    agent.run().await;
    Ok(())
}
