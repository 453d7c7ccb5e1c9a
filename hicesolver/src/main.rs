mod cli;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use log::info;

use cli::{Cli, Commands};
use common::images::ImagesList;
use libcatalog::{Catalog, CatalogStore, CommandInspector, Resolver};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            catalog,
            inspect_command,
            insecure_registry,
            interval,
        } => {
            let cfg = catalog.into_config();
            let store = Arc::new(CatalogStore::connect(&cfg).await?);
            let inspector = CommandInspector::new(inspect_command, insecure_registry);
            let resolver = Resolver::new(store, Box::new(inspector))
                .with_interval(Duration::from_secs(interval));
            info!("resolver running, pass every {interval}s");
            resolver.run().await;
        }
        Commands::Seed { catalog, file } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("reading image list {}", file.display()))?;
            let images: ImagesList =
                serde_yaml::from_str(&content).context("parsing image list")?;
            let cfg = catalog.into_config();
            let store = CatalogStore::connect(&cfg).await?;
            store.replace_images(&images).await?;
            info!(
                "seeded catalog with {} image(s) from {}",
                images.list.len(),
                file.display()
            );
        }
    }

    Ok(())
}
