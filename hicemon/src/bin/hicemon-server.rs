use clap::Parser;
use hicemon::server::{ServerConfig, run_server};

#[derive(Parser)]
#[command(name = "hicemon-server", version, about = "Node stat forwarding server")]
struct Cli {
    /// UDP listen address
    #[arg(long, default_value = "0.0.0.0:12345")]
    listen: String,
    /// Broker bootstrap addresses, comma separated
    #[arg(long, default_value = "127.0.0.1:9092")]
    brokers: String,
    /// Topic the node stats are republished on
    #[arg(long, default_value = "nodesstats")]
    topic: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    run_server(ServerConfig {
        listen: cli.listen,
        brokers: cli.brokers,
        topic: cli.topic,
    })
    .await
}
