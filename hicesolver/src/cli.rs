use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use libcatalog::CatalogConfig;

#[derive(Parser)]
#[command(name = "hicesolver", version, about = "Multi-arch image resolver for rhice")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the resolver loop against the catalog store
    Run {
        #[command(flatten)]
        catalog: CatalogOpts,
        /// Registry inspection command; `{image}` is substituted
        #[arg(long, default_value = "docker manifest inspect {image}")]
        inspect_command: String,
        /// Substring of registries reachable without TLS verification
        #[arg(long, default_value = "")]
        insecure_registry: String,
        /// Seconds between resolver passes
        #[arg(long, default_value_t = 60)]
        interval: u64,
    },
    /// Seed the catalog from an image list YAML file
    Seed {
        #[command(flatten)]
        catalog: CatalogOpts,
        /// Image list file
        #[arg(short, long, default_value = "images.yaml")]
        file: PathBuf,
    },
}

#[derive(Args)]
pub struct CatalogOpts {
    /// Catalog store endpoints, comma separated host:port
    #[arg(long, value_delimiter = ',', default_value = "127.0.0.1:2379")]
    pub endpoints: Vec<String>,
    /// CA certificate for the store connection
    #[arg(long)]
    pub ca: Option<PathBuf>,
    /// Client certificate for the store connection
    #[arg(long)]
    pub cert: Option<PathBuf>,
    /// Client key for the store connection
    #[arg(long)]
    pub key: Option<PathBuf>,
}

impl CatalogOpts {
    pub fn into_config(self) -> CatalogConfig {
        let mut cfg = CatalogConfig::new(self.endpoints);
        cfg.ca_path = self.ca;
        cfg.cert_path = self.cert;
        cfg.key_path = self.key;
        cfg
    }
}
