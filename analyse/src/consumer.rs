use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use log::{debug, info, warn};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use tokio::time::Instant;

use common::stats::NodeStat;
use common::{Node, PERF_NODE_LABEL};
use libcatalog::{CatalogConfig, CatalogStore};

use crate::perf::controller_perf_advisory;
use crate::workload::WorkloadTree;

/// How long a workload tree snapshot stays valid before the next message
/// triggers a rebuild.
pub const DEFAULT_REFRESH: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OffsetPolicy {
    Oldest,
    Newest,
}

impl OffsetPolicy {
    fn as_broker_str(&self) -> &'static str {
        match self {
            OffsetPolicy::Oldest => "earliest",
            OffsetPolicy::Newest => "latest",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Assignor {
    Range,
    Roundrobin,
    Sticky,
}

impl Assignor {
    fn as_broker_str(&self) -> &'static str {
        match self {
            Assignor::Range => "range",
            Assignor::Roundrobin => "roundrobin",
            Assignor::Sticky => "cooperative-sticky",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub brokers: String,
    pub group: String,
    pub topic: String,
    pub assignor: Assignor,
    pub offset: OffsetPolicy,
    pub refresh: Duration,
    pub catalog: CatalogConfig,
}

impl AnalyzerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.brokers.is_empty() {
            bail!("no broker bootstrap addresses configured");
        }
        if self.topic.is_empty() {
            bail!("no topic configured");
        }
        if self.group.is_empty() {
            bail!("no consumer group configured");
        }
        self.catalog.validate()
    }
}

/// Per-node performance factors from the node labels, default 1.0.
pub fn node_perf_labels(nodes: &[Node]) -> HashMap<String, f64> {
    nodes
        .iter()
        .map(|node| {
            let perf = node
                .metadata
                .labels
                .get(PERF_NODE_LABEL)
                .and_then(|v| v.parse::<f64>().ok())
                .unwrap_or(1.0);
            (node.metadata.name.clone(), perf)
        })
        .collect()
}

pub struct Analyzer {
    cfg: AnalyzerConfig,
    store: CatalogStore,
}

impl Analyzer {
    pub async fn try_new(cfg: AnalyzerConfig) -> Result<Self> {
        cfg.validate()?;
        let store = CatalogStore::connect(&cfg.catalog).await?;
        Ok(Self { cfg, store })
    }

    async fn refresh(&self) -> Result<(WorkloadTree, HashMap<String, f64>)> {
        let pods = self.store.list_pods().await?;
        let nodes = self.store.list_nodes().await?;
        let tree = WorkloadTree::build(&pods);
        info!(
            "workload tree rebuilt: {} controller(s), {} container(s)",
            tree.controller_count(),
            tree.container_count()
        );
        Ok((tree, node_perf_labels(&nodes)))
    }

    /// Applies one stat batch and logs the advisory of every affected
    /// controller.
    fn apply(&self, tree: &mut WorkloadTree, labels: &HashMap<String, f64>, stat: &NodeStat) {
        for container_stat in &stat.containers_cpu_stat {
            let Some(controller) = tree.record_usage(&container_stat.id, container_stat.usage)
            else {
                continue;
            };
            let entry = tree.controller(controller);
            debug!("{}: {} replica(s)", entry.name, entry.pods.len());
            for &pod_id in &entry.pods {
                let pod = tree.pod(pod_id);
                for &container_id in &pod.containers {
                    let container = tree.container(container_id);
                    if container.cpu_usage != 0 {
                        debug!(
                            "  {} on {}: req {}m lmt {}m use {}%",
                            pod.name,
                            pod.node,
                            container.cpu_request_milli,
                            container.cpu_limit_milli,
                            container.cpu_usage
                        );
                    }
                }
            }
            let advisory = controller_perf_advisory(tree, controller, labels);
            if !advisory.is_empty() {
                info!("controller {} perf advisory: {advisory:?}", entry.name);
            }
        }
    }

    pub async fn run(&self) -> Result<()> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.cfg.brokers)
            .set("group.id", &self.cfg.group)
            .set("partition.assignment.strategy", self.cfg.assignor.as_broker_str())
            .set("auto.offset.reset", self.cfg.offset.as_broker_str())
            .set("enable.auto.commit", "true")
            .create()
            .context("creating broker consumer")?;
        consumer
            .subscribe(&[&self.cfg.topic])
            .context("subscribing to stat topic")?;

        let (mut tree, mut labels) = self.refresh().await?;
        let mut last_refresh = Instant::now();

        loop {
            let message = match consumer.recv().await {
                Ok(message) => message,
                Err(e) => {
                    warn!("consume error: {e}");
                    continue;
                }
            };
            if last_refresh.elapsed() >= self.cfg.refresh {
                match self.refresh().await {
                    Ok(refreshed) => {
                        (tree, labels) = refreshed;
                        last_refresh = Instant::now();
                    }
                    Err(e) => warn!("workload refresh failed: {e:#}"),
                }
            }
            let Some(payload) = message.payload() else {
                continue;
            };
            match NodeStat::decode(payload) {
                Ok(stat) => self.apply(&mut tree, &labels, &stat),
                Err(e) => warn!("dropping malformed stat record: {e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_catches_missing_settings() {
        let catalog = CatalogConfig::new(vec!["127.0.0.1:2379".to_string()]);
        let good = AnalyzerConfig {
            brokers: "127.0.0.1:9092".to_string(),
            group: "rhice".to_string(),
            topic: "nodesstats".to_string(),
            assignor: Assignor::Range,
            offset: OffsetPolicy::Newest,
            refresh: DEFAULT_REFRESH,
            catalog: catalog.clone(),
        };
        assert!(good.validate().is_ok());

        let mut missing_group = good.clone();
        missing_group.group = String::new();
        assert!(missing_group.validate().is_err());

        let mut missing_brokers = good.clone();
        missing_brokers.brokers = String::new();
        assert!(missing_brokers.validate().is_err());

        let mut bad_catalog = good;
        bad_catalog.catalog = CatalogConfig::new(vec![]);
        assert!(bad_catalog.validate().is_err());
    }

    #[test]
    fn perf_labels_default_to_one() {
        let node: Node = serde_yaml::from_str(
            r#"
apiVersion: v1
kind: Node
metadata:
  name: edge-1
  labels:
    hice.kj: "0.5"
"#,
        )
        .unwrap();
        let bare: Node = serde_yaml::from_str(
            r#"
apiVersion: v1
kind: Node
metadata:
  name: edge-2
"#,
        )
        .unwrap();
        let labels = node_perf_labels(&[node, bare]);
        assert_eq!(labels["edge-1"], 0.5);
        assert_eq!(labels["edge-2"], 1.0);
    }
}
