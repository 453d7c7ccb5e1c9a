use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use common::{Node, PodTask};

use crate::models::{NodeInfo, PodInfo};

/// The host-provided view of the cluster for one scheduling pass.
///
/// Built from the registry's node and pod lists. Pods with a node name are
/// attached to their node; the rest wait in the pending list. During a
/// cycle the snapshot is read-only; the host replaces it between cycles.
#[derive(Debug, Default)]
pub struct Snapshot {
    nodes: Vec<NodeInfo>,
    by_name: HashMap<String, usize>,
    pending: Vec<PodInfo>,
}

/// Handle the plugins hold onto. Hooks only ever take read locks; the host
/// takes the write lock between cycles to refresh or assume pods.
pub type SharedSnapshot = Arc<RwLock<Snapshot>>;

pub fn shared(snapshot: Snapshot) -> SharedSnapshot {
    Arc::new(RwLock::new(snapshot))
}

impl Snapshot {
    pub fn new(nodes: &[Node], pods: &[PodTask]) -> Self {
        let infos = nodes.iter().map(NodeInfo::from_node).collect();
        let pod_infos = pods.iter().map(PodInfo::from_task).collect();
        Self::from_infos(infos, pod_infos)
    }

    /// Builds a snapshot from already-converted infos. Pods carrying a node
    /// name land on that node (unknown node names stay pending).
    pub fn from_infos(nodes: Vec<NodeInfo>, pods: Vec<PodInfo>) -> Self {
        let mut snapshot = Self {
            by_name: nodes
                .iter()
                .enumerate()
                .map(|(i, n)| (n.name.clone(), i))
                .collect(),
            nodes,
            pending: Vec::new(),
        };
        for pod in pods {
            match pod.node_name.clone() {
                Some(node) if snapshot.by_name.contains_key(&node) => {
                    let idx = snapshot.by_name[&node];
                    snapshot.nodes[idx].add_pod(pod);
                }
                _ => snapshot.pending.push(pod),
            }
        }
        snapshot
    }

    pub fn list(&self) -> &[NodeInfo] {
        &self.nodes
    }

    pub fn get(&self, name: &str) -> Option<&NodeInfo> {
        self.by_name.get(name).map(|&i| &self.nodes[i])
    }

    pub fn pending_pods(&self) -> &[PodInfo] {
        &self.pending
    }

    /// Marks a pending pod as placed on `node_name` without committing it.
    /// The pod keeps an empty node name: downstream resource accounting
    /// uses that to tell an assumed copy from a synced one.
    pub fn assume(&mut self, pod_name: &str, node_name: &str) -> bool {
        let Some(&idx) = self.by_name.get(node_name) else {
            return false;
        };
        let Some(pos) = self.pending.iter().position(|p| p.name == pod_name) else {
            return false;
        };
        let pod = self.pending.remove(pos);
        self.nodes[idx].add_pod(pod);
        true
    }

    /// Services with at least one pod placed on some node.
    pub fn deployed_services(&self) -> HashSet<String> {
        self.nodes
            .iter()
            .flat_map(|n| n.pods.iter())
            .filter_map(|p| p.service())
            .map(str::to_string)
            .collect()
    }

    /// Services whose pods are still waiting for placement.
    pub fn pending_services(&self) -> HashSet<String> {
        self.pending
            .iter()
            .filter_map(|p| p.service())
            .map(str::to_string)
            .collect()
    }

    /// Names of nodes hosting at least one pod of `service`.
    pub fn service_nodes(&self, service: &str) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|n| n.pods.iter().any(|p| p.service() == Some(service)))
            .map(|n| n.name.as_str())
            .collect()
    }
}
