use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Marker for "these two services make no API calls to each other".
const NO_CALL: i64 = -1;

/// Static microservice interaction graph.
///
/// Vertices are service labels; a directed edge `u -> v` means `u` calls
/// `v`'s API, weighted by the mean per-request payload in kbit. The graph
/// is fixed per cluster deployment and shared read-only by the hooks.
#[derive(Debug, Clone, Default)]
pub struct MicroServiceGraph {
    vertex: HashMap<String, usize>,
    names: Vec<String>,
    edge: Vec<Vec<i64>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceCall {
    pub from: String,
    pub to: String,
    pub kbit: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    pub services: Vec<String>,
    #[serde(default)]
    pub calls: Vec<ServiceCall>,
}

impl MicroServiceGraph {
    pub fn new<I, S>(services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = services.into_iter().map(Into::into).collect();
        let n = names.len();
        Self {
            vertex: names
                .iter()
                .enumerate()
                .map(|(i, s)| (s.clone(), i))
                .collect(),
            names,
            edge: vec![vec![NO_CALL; n]; n],
        }
    }

    pub fn from_config(cfg: &GraphConfig) -> Result<Self> {
        let mut graph = Self::new(cfg.services.iter().cloned());
        for call in &cfg.calls {
            graph
                .add_call(&call.from, &call.to, call.kbit)
                .with_context(|| format!("invalid call {} -> {}", call.from, call.to))?;
        }
        Ok(graph)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("reading service graph {}", path.as_ref().display()))?;
        let cfg: GraphConfig =
            serde_yaml::from_str(&content).context("parsing service graph config")?;
        Self::from_config(&cfg)
    }

    pub fn add_call(&mut self, from: &str, to: &str, kbit: i64) -> Result<()> {
        let &f = self
            .vertex
            .get(from)
            .with_context(|| format!("unknown service {from:?}"))?;
        let &t = self
            .vertex
            .get(to)
            .with_context(|| format!("unknown service {to:?}"))?;
        anyhow::ensure!(kbit >= 0, "edge weight must be non-negative");
        self.edge[f][t] = kbit;
        Ok(())
    }

    pub fn contains(&self, service: &str) -> bool {
        self.vertex.contains_key(service)
    }

    pub fn services(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Weight of the `from -> to` call, `None` when there is none.
    pub fn weight(&self, from: &str, to: &str) -> Option<i64> {
        let &f = self.vertex.get(from)?;
        let &t = self.vertex.get(to)?;
        let w = self.edge[f][t];
        (w >= 0).then_some(w)
    }

    /// Services `service` calls, with weights.
    pub fn callees(&self, service: &str) -> Vec<(&str, i64)> {
        self.adjacent(service, |graph, s, other| graph.edge[s][other])
    }

    /// Services calling `service`, with weights.
    pub fn callers(&self, service: &str) -> Vec<(&str, i64)> {
        self.adjacent(service, |graph, s, other| graph.edge[other][s])
    }

    fn adjacent(
        &self,
        service: &str,
        pick: impl Fn(&Self, usize, usize) -> i64,
    ) -> Vec<(&str, i64)> {
        let Some(&s) = self.vertex.get(service) else {
            return Vec::new();
        };
        self.names
            .iter()
            .enumerate()
            .filter(|&(other, _)| other != s)
            .filter_map(|(other, name)| {
                let w = pick(self, s, other);
                (w >= 0).then_some((name.as_str(), w))
            })
            .collect()
    }

    /// All edge weights adjacent to `service`, both directions.
    pub fn neighbor_weights(&self, service: &str) -> Vec<i64> {
        let mut weights: Vec<i64> = self.callees(service).iter().map(|&(_, w)| w).collect();
        weights.extend(self.callers(service).iter().map(|&(_, w)| w));
        weights
    }

    pub fn neighbor_sum(&self, service: &str) -> i64 {
        self.neighbor_weights(service).iter().sum()
    }

    /// The largest neighbor sum among `services`.
    pub fn max_neighbor_sum<'a>(&self, services: impl IntoIterator<Item = &'a str>) -> i64 {
        services
            .into_iter()
            .map(|s| self.neighbor_sum(s))
            .max()
            .unwrap_or(0)
    }

    /// Edge weights between `service` and any service in `deployed`.
    pub fn existing_neighbor_weights(
        &self,
        service: &str,
        deployed: &HashSet<String>,
    ) -> Vec<i64> {
        let mut weights: Vec<i64> = self
            .callees(service)
            .iter()
            .filter(|(peer, _)| deployed.contains(*peer))
            .map(|&(_, w)| w)
            .collect();
        weights.extend(
            self.callers(service)
                .iter()
                .filter(|(peer, _)| deployed.contains(*peer))
                .map(|&(_, w)| w),
        );
        weights
    }

    /// Largest edge weight between `service` and any deployed service.
    pub fn max_edge_to_deployed(
        &self,
        service: &str,
        deployed: &HashSet<String>,
    ) -> Option<i64> {
        self.existing_neighbor_weights(service, deployed)
            .into_iter()
            .max()
    }

    /// Largest edge weight between any deployed service and any undeployed
    /// service in `candidates` (the services still waiting to place).
    pub fn max_frontier_edge(
        &self,
        deployed: &HashSet<String>,
        candidates: &HashSet<String>,
    ) -> Option<i64> {
        candidates
            .iter()
            .filter(|c| !deployed.contains(*c))
            .filter_map(|c| self.max_edge_to_deployed(c, deployed))
            .max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn webshop() -> MicroServiceGraph {
        let mut g = MicroServiceGraph::new(["frontend", "cart", "productcatalog"]);
        g.add_call("frontend", "cart", 1).unwrap();
        g.add_call("cart", "frontend", 1).unwrap();
        g.add_call("frontend", "productcatalog", 100).unwrap();
        g.add_call("productcatalog", "frontend", 2).unwrap();
        g
    }

    #[test]
    fn neighbor_sums_count_both_directions() {
        let g = webshop();
        assert_eq!(g.neighbor_sum("frontend"), 104);
        assert_eq!(g.neighbor_sum("cart"), 2);
        assert_eq!(g.neighbor_sum("productcatalog"), 102);
        assert_eq!(g.max_neighbor_sum(g.services()), 104);
    }

    #[test]
    fn weight_distinguishes_absent_edges() {
        let g = webshop();
        assert_eq!(g.weight("frontend", "cart"), Some(1));
        assert_eq!(g.weight("cart", "productcatalog"), None);
        assert_eq!(g.weight("frontend", "nosuch"), None);
    }

    #[test]
    fn existing_neighbors_respect_deployment() {
        let g = webshop();
        let deployed = HashSet::from(["frontend".to_string()]);
        assert_eq!(g.existing_neighbor_weights("cart", &deployed), vec![1, 1]);
        assert_eq!(g.max_edge_to_deployed("cart", &deployed), Some(1));
        assert_eq!(g.max_edge_to_deployed("cart", &HashSet::new()), None);
    }

    #[test]
    fn frontier_edge_only_counts_candidate_services() {
        let g = webshop();
        let deployed = HashSet::from(["frontend".to_string()]);
        let all: HashSet<String> = ["cart", "productcatalog"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(g.max_frontier_edge(&deployed, &all), Some(100));
        let cart_only = HashSet::from(["cart".to_string()]);
        assert_eq!(g.max_frontier_edge(&deployed, &cart_only), Some(1));
    }

    #[test]
    fn config_round_trip() {
        let yaml = r#"
services: [a, b]
calls:
  - {from: a, to: b, kbit: 10}
"#;
        let cfg: GraphConfig = serde_yaml::from_str(yaml).unwrap();
        let g = MicroServiceGraph::from_config(&cfg).unwrap();
        assert_eq!(g.weight("a", "b"), Some(10));
        assert_eq!(g.weight("b", "a"), None);
    }
}
