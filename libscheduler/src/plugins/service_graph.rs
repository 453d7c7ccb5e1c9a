//! MHice: microservice call-graph awareness.
//!
//! QueueSort pulls pods whose services talk to already-placed workloads to
//! the front of the queue, the PreFilter gate parks pods whose heavier
//! peers have not placed yet, and Score ranks candidate nodes by the
//! expected communication delay to the pod's placed peers over the static
//! network topology.

use std::collections::HashSet;

use async_trait::async_trait;
use log::{debug, trace};

use crate::cycle_state::CycleState;
use crate::graph::MicroServiceGraph;
use crate::models::{NodeInfo, PodInfo};
use crate::plugins::perf::hice_requested_milli;
use crate::plugins::{
    ActionType, ClusterEvent, ClusterEventWithHint, Code, EnqueueExtension, EventInner,
    EventResource, Plugin, PreFilterPlugin, QueueSortPlugin, QueueingHint, ScorePlugin, Status,
};
use crate::snapshot::{SharedSnapshot, Snapshot};
use crate::topology::NetworkTopology;

pub const NAME: &str = "MHice";

const ERR_REASON_WAIT: &str = "wait for more important service";

/// Communication budget in seconds; a candidate whose expected round delay
/// exceeds it scores zero.
const DELAY_BUDGET_S: f64 = 10.0;

pub struct GraphPlugin {
    graph: MicroServiceGraph,
    topology: NetworkTopology,
    snapshot: SharedSnapshot,
}

impl GraphPlugin {
    pub fn new(
        graph: MicroServiceGraph,
        topology: NetworkTopology,
        snapshot: SharedSnapshot,
    ) -> Self {
        Self {
            graph,
            topology,
            snapshot,
        }
    }

    /// Expected one-way delay from the closest replica of a peer service to
    /// the candidate node: transfer time of the mean payload plus link
    /// latency. Unknown links count as unreachable.
    fn peer_delay(&self, peer_nodes: &[&str], weight_kbit: i64, candidate: &str) -> f64 {
        peer_nodes
            .iter()
            .map(|peer_node| {
                let data_delay = match self.topology.bandwidth_kbps(peer_node, candidate) {
                    Some(kbps) if kbps > 0 => weight_kbit as f64 / kbps as f64 / 100.0,
                    _ => f64::INFINITY,
                };
                data_delay + self.topology.latency_s(peer_node, candidate)
            })
            .fold(f64::INFINITY, f64::min)
    }

    /// The worst best-replica delay across `peers`, with the peer that
    /// causes it. `None` when no peer has a placed replica.
    fn max_peer_delay<'a>(
        &self,
        snapshot: &'a Snapshot,
        peers: &[(&'a str, i64)],
        candidate: &str,
    ) -> Option<(f64, &'a str)> {
        peers
            .iter()
            .filter_map(|&(peer, weight)| {
                let nodes = snapshot.service_nodes(peer);
                if nodes.is_empty() {
                    return None;
                }
                Some((self.peer_delay(&nodes, weight, candidate), peer))
            })
            .max_by(|(a, _), (b, _)| a.total_cmp(b))
    }

    /// Headroom scoring for pods with no placed peers: the emptier the
    /// node, the better. CPU headroom uses performance-rescaled units.
    fn headroom_score(&self, pod: &PodInfo, node: &NodeInfo) -> i64 {
        let request = pod.resource_request();
        let kb = pod.perf_baseline();
        let kj = node.perf_factor();

        let mut ratio = 0.0_f64;
        if request.milli_cpu > 0 {
            let cpu_eff = request.milli_cpu as f64 * kb / kj;
            let cpu_free = node.allocatable.milli_cpu as f64 - hice_requested_milli(node) as f64;
            ratio = ratio.max(if cpu_free > 0.0 {
                cpu_eff / cpu_free
            } else {
                f64::INFINITY
            });
        }
        if request.memory > 0 {
            let mem_free = node.allocatable.memory as f64 - node.requested.memory as f64;
            ratio = ratio.max(if mem_free > 0.0 {
                request.memory as f64 / mem_free
            } else {
                f64::INFINITY
            });
        }

        if !ratio.is_finite() {
            return 0;
        }
        (100 - (100.0 * ratio) as i64).max(0)
    }

    /// Weights of the edges between `pod`'s service and deployed services.
    fn existing_neighbor_weights(&self, pod: &PodInfo, deployed: &HashSet<String>) -> Vec<i64> {
        match pod.service() {
            Some(service) => self.graph.existing_neighbor_weights(service, deployed),
            None => Vec::new(),
        }
    }

    fn neighbor_sum(&self, pod: &PodInfo) -> i64 {
        pod.service()
            .map(|service| self.graph.neighbor_sum(service))
            .unwrap_or(0)
    }
}

impl Plugin for GraphPlugin {
    fn name(&self) -> &str {
        NAME
    }
}

impl QueueSortPlugin for GraphPlugin {
    /// Pods talking to already-placed services go first, heaviest edge
    /// wins. Among pods with no placed peers, the one with the largest
    /// total adjacency wins.
    fn less(&self, p1: &PodInfo, p2: &PodInfo) -> bool {
        let deployed = {
            let snapshot = self.snapshot.read().expect("snapshot lock poisoned");
            snapshot.deployed_services()
        };
        let existing1 = self.existing_neighbor_weights(p1, &deployed);
        let existing2 = self.existing_neighbor_weights(p2, &deployed);

        match (existing1.is_empty(), existing2.is_empty()) {
            (false, true) => true,
            (true, false) => false,
            (false, false) => {
                existing1.iter().max().unwrap() > existing2.iter().max().unwrap()
            }
            (true, true) => self.neighbor_sum(p1) > self.neighbor_sum(p2),
        }
    }
}

#[async_trait]
impl PreFilterPlugin for GraphPlugin {
    /// Gate: a pod may only place while it is the most important pending
    /// work. Pods with an edge to a deployed service must carry the
    /// heaviest frontier edge; pods without one must have the largest
    /// total adjacency among the still-pending services. Services absent
    /// from the graph bypass the gate.
    async fn pre_filter(
        &self,
        _state: &mut CycleState,
        pod: &PodInfo,
        _nodes: &[NodeInfo],
    ) -> Status {
        let Some(service) = pod.service() else {
            return Status::default();
        };
        if !self.graph.contains(service) {
            return Status::default();
        }

        let (deployed, pending) = {
            let snapshot = self.snapshot.read().expect("snapshot lock poisoned");
            (snapshot.deployed_services(), snapshot.pending_services())
        };
        // Services still waiting to place, always counting this pod's own.
        let mut candidates: HashSet<String> = pending
            .into_iter()
            .filter(|s| !deployed.contains(s) && self.graph.contains(s))
            .collect();
        candidates.insert(service.to_string());

        match self.graph.max_edge_to_deployed(service, &deployed) {
            Some(pod_max_edge) => {
                let frontier = self.graph.max_frontier_edge(&deployed, &candidates);
                if Some(pod_max_edge) != frontier {
                    debug!(
                        "holding {}: edge {pod_max_edge} to deployed peers, frontier max {frontier:?}",
                        pod.name
                    );
                    return Status::new(Code::Error, vec![ERR_REASON_WAIT.to_string()]);
                }
            }
            None => {
                let max_sum = self
                    .graph
                    .max_neighbor_sum(candidates.iter().map(String::as_str));
                if self.graph.neighbor_sum(service) != max_sum {
                    debug!(
                        "holding {}: neighbor sum {} below pending max {max_sum}",
                        pod.name,
                        self.graph.neighbor_sum(service)
                    );
                    return Status::new(Code::Error, vec![ERR_REASON_WAIT.to_string()]);
                }
            }
        }
        Status::default()
    }
}

impl ScorePlugin for GraphPlugin {
    fn score(&self, _state: &mut CycleState, pod: &PodInfo, node_info: &NodeInfo) -> (i64, Status) {
        let snapshot = self.snapshot.read().expect("snapshot lock poisoned");

        let peers = pod
            .service()
            .filter(|s| self.graph.contains(s))
            .map(|service| (self.graph.callees(service), self.graph.callers(service)));
        let Some((callees, callers)) = peers else {
            return (self.headroom_score(pod, node_info), Status::default());
        };

        let call_out = self.max_peer_delay(&snapshot, &callees, &node_info.name);
        let call_in = self.max_peer_delay(&snapshot, &callers, &node_info.name);
        if call_out.is_none() && call_in.is_none() {
            // No peer has placed anywhere yet; fall back to headroom.
            return (self.headroom_score(pod, node_info), Status::default());
        }

        let total = call_out.map(|(d, _)| d).unwrap_or(0.0)
            + call_in.map(|(d, _)| d).unwrap_or(0.0);
        if total > DELAY_BUDGET_S {
            return (0, Status::default());
        }

        let max_peers: Vec<&str> = call_out
            .iter()
            .chain(call_in.iter())
            .map(|&(_, peer)| peer)
            .collect();
        let collocated = max_peers
            .iter()
            .all(|peer| snapshot.service_nodes(peer).contains(&node_info.name.as_str()));
        if collocated {
            trace!(
                "graph score of {} on {}: max peers collocate",
                pod.name, node_info.name
            );
            return (100, Status::default());
        }

        // Capped below 100 so collocation always outranks a fast link.
        let score = (100 - (total / DELAY_BUDGET_S * 100.0) as i64).min(99);
        trace!(
            "graph score of {} on {}: total delay {total:.3e} -> {score}",
            pod.name, node_info.name
        );
        (score, Status::default())
    }
}

impl EnqueueExtension for GraphPlugin {
    fn events_to_register(&self) -> Vec<ClusterEventWithHint> {
        // Any pod placement can move the frontier and unblock gated pods.
        vec![ClusterEventWithHint {
            event: ClusterEvent {
                resource: EventResource::Pod,
                action_type: ActionType::Add | ActionType::UpdatePodLabel,
            },
            queueing_hint_fn: Some(Box::new(|pod, event| match event {
                EventInner::Pod(_, Some(_)) => {
                    trace!("pod set changed, requeueing pod {}", pod.name);
                    QueueingHint::Queue
                }
                _ => QueueingHint::Skip,
            })),
        }]
    }
}
