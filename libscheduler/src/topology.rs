use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Static network topology between worker nodes: symmetric link bandwidth
/// (kbps) and propagation latency (seconds). Self-links describe loopback
/// capacity and are expected in the configuration.
#[derive(Debug, Clone, Default)]
pub struct NetworkTopology {
    bandwidth: HashMap<(String, String), u64>,
    latency: HashMap<(String, String), f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Link {
    pub a: String,
    pub b: String,
    pub bandwidth_kbps: u64,
    #[serde(default)]
    pub latency_s: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopologyConfig {
    pub links: Vec<Link>,
}

impl NetworkTopology {
    pub fn from_config(cfg: &TopologyConfig) -> Self {
        let mut topology = Self::default();
        for link in &cfg.links {
            topology.add_link(&link.a, &link.b, link.bandwidth_kbps, link.latency_s);
        }
        topology
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("reading network topology {}", path.as_ref().display()))?;
        let cfg: TopologyConfig =
            serde_yaml::from_str(&content).context("parsing network topology config")?;
        Ok(Self::from_config(&cfg))
    }

    pub fn add_link(&mut self, a: &str, b: &str, bandwidth_kbps: u64, latency_s: f64) {
        for (x, y) in [(a, b), (b, a)] {
            self.bandwidth
                .insert((x.to_string(), y.to_string()), bandwidth_kbps);
            self.latency.insert((x.to_string(), y.to_string()), latency_s);
        }
    }

    pub fn bandwidth_kbps(&self, a: &str, b: &str) -> Option<u64> {
        self.bandwidth.get(&(a.to_string(), b.to_string())).copied()
    }

    pub fn latency_s(&self, a: &str, b: &str) -> f64 {
        self.latency
            .get(&(a.to_string(), b.to_string()))
            .copied()
            .unwrap_or(0.0)
    }
}
