use std::path::PathBuf;
use std::time::Duration;

use analyse::consumer::{Analyzer, AnalyzerConfig, Assignor, OffsetPolicy};
use clap::Parser;
use libcatalog::CatalogConfig;

#[derive(Parser)]
#[command(name = "hiceanalyse", version, about = "Node performance analyzer")]
struct Cli {
    /// Broker bootstrap addresses, comma separated host:port
    #[arg(long, default_value = "127.0.0.1:9092")]
    brokers: String,
    /// Consumer group
    #[arg(long, default_value = "rhice-analyse")]
    group: String,
    /// Topic carrying the node stat batches
    #[arg(long, default_value = "nodesstats")]
    topic: String,
    /// Consumer group partition assignment strategy
    #[arg(long, value_enum, default_value_t = Assignor::Range)]
    assignor: Assignor,
    /// Initial offset policy when the group has no committed offset
    #[arg(long, value_enum, default_value_t = OffsetPolicy::Newest)]
    offset: OffsetPolicy,
    /// Seconds between workload tree rebuilds
    #[arg(long, default_value_t = 120)]
    refresh: u64,
    /// Registry store endpoints, comma separated host:port
    #[arg(long, value_delimiter = ',', default_value = "127.0.0.1:2379")]
    endpoints: Vec<String>,
    /// CA certificate for the store connection
    #[arg(long)]
    ca: Option<PathBuf>,
    /// Client certificate for the store connection
    #[arg(long)]
    cert: Option<PathBuf>,
    /// Client key for the store connection
    #[arg(long)]
    key: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut catalog = CatalogConfig::new(cli.endpoints);
    catalog.ca_path = cli.ca;
    catalog.cert_path = cli.cert;
    catalog.key_path = cli.key;

    let analyzer = Analyzer::try_new(AnalyzerConfig {
        brokers: cli.brokers,
        group: cli.group,
        topic: cli.topic,
        assignor: cli.assignor,
        offset: cli.offset,
        refresh: Duration::from_secs(cli.refresh),
        catalog,
    })
    .await?;
    analyzer.run().await
}
