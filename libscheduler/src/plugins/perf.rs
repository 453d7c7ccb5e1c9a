//! Hicev2: single-thread performance awareness.
//!
//! CPU requests and limits are authored against a reference node with
//! per-core performance `kb`. On a node with performance `kj`, the
//! effective demand of a container is `demand * kb / kj`. Filter rejects
//! nodes the rescaled pod cannot fit, Score prefers nodes that degrade the
//! pod least, and Bind rewrites the stored quantities so the node-local
//! runtime enforces the rescaled values.

use std::sync::Arc;

use async_trait::async_trait;
use libcatalog::Catalog;
use log::{debug, trace};

use common::SCHEDULER_NAME;

use crate::cycle_state::CycleState;
use crate::models::{NodeInfo, PodInfo, Resources};
use crate::plugins::arch::{image_patches, image_snapshot_from_state};
use crate::plugins::binding::{ContainerPatch, commit_assignment};
use crate::plugins::{
    ActionType, BindPlugin, ClusterEvent, ClusterEventWithHint, Code, EnqueueExtension,
    EventInner, EventResource, FilterPlugin, Plugin, QueueingHint, ScorePlugin, Status,
};
use crate::snapshot::SharedSnapshot;

pub const NAME: &str = "Hicev2";

const ERR_REASON_PERF: &str = "node(s)'s performance is too low";

pub struct PerfPlugin {
    catalog: Arc<dyn Catalog>,
    snapshot: SharedSnapshot,
}

impl PerfPlugin {
    pub fn new(catalog: Arc<dyn Catalog>, snapshot: SharedSnapshot) -> Self {
        Self { catalog, snapshot }
    }
}

/// One resource dimension that kept the pod off a node.
#[derive(Debug, Clone)]
pub struct InsufficientResource {
    pub resource: String,
    pub reason: String,
    pub requested: u64,
    pub used: u64,
    pub capacity: u64,
}

/// Sum of the resident pods' CPU demands in node-local millicores.
///
/// A pod that this scheduler placed but whose registry write has not been
/// synced back still carries reference-node quantities and an empty node
/// name; its demand is reconstructed from its own kb over this node's kj.
/// Everything else already holds real values and is summed raw.
pub(crate) fn hice_requested_milli(node: &NodeInfo) -> u64 {
    let kj = node.perf_factor();
    node.pods
        .iter()
        .map(|pod| {
            let raw = pod.resource_request().milli_cpu;
            if pod.scheduler_name.as_deref() == Some(SCHEDULER_NAME) && pod.node_name.is_none() {
                (raw as f64 * pod.perf_baseline() / kj) as u64
            } else {
                raw
            }
        })
        .sum()
}

/// Checks a rescaled pod request against the node. CPU uses the rescaled
/// demand on both sides; memory, ephemeral storage and scalar resources
/// compare raw sums.
pub fn fits_request(pod_request: &Resources, node: &NodeInfo) -> Vec<InsufficientResource> {
    let mut insufficient = Vec::new();

    let allowed_pod_number = node.allocatable.pods;
    if node.pods.len() + 1 > allowed_pod_number {
        insufficient.push(InsufficientResource {
            resource: "pods".to_string(),
            reason: "too many pods".to_string(),
            requested: 1,
            used: node.pods.len() as u64,
            capacity: allowed_pod_number as u64,
        });
    }

    if pod_request.is_zero() {
        return insufficient;
    }

    let node_requested_milli = hice_requested_milli(node);
    if node.allocatable.milli_cpu < pod_request.milli_cpu + node_requested_milli {
        insufficient.push(InsufficientResource {
            resource: "cpu".to_string(),
            reason: "insufficient hice cpu".to_string(),
            requested: pod_request.milli_cpu,
            used: node_requested_milli,
            capacity: node.allocatable.milli_cpu,
        });
    }

    if node.allocatable.memory < pod_request.memory + node.requested.memory {
        insufficient.push(InsufficientResource {
            resource: "memory".to_string(),
            reason: "insufficient memory".to_string(),
            requested: pod_request.memory,
            used: node.requested.memory,
            capacity: node.allocatable.memory,
        });
    }

    if node.allocatable.ephemeral_storage
        < pod_request.ephemeral_storage + node.requested.ephemeral_storage
    {
        insufficient.push(InsufficientResource {
            resource: "ephemeral-storage".to_string(),
            reason: "insufficient ephemeral-storage".to_string(),
            requested: pod_request.ephemeral_storage,
            used: node.requested.ephemeral_storage,
            capacity: node.allocatable.ephemeral_storage,
        });
    }

    for (name, quantity) in &pod_request.scalar {
        let capacity = node.allocatable.scalar.get(name).copied().unwrap_or(0);
        let used = node.requested.scalar.get(name).copied().unwrap_or(0);
        if capacity < quantity + used {
            insufficient.push(InsufficientResource {
                resource: name.clone(),
                reason: format!("insufficient {name}"),
                requested: *quantity,
                used,
                capacity,
            });
        }
    }

    insufficient
}

/// Rounds millicores up to whole cores; already-whole values stay put.
fn m_ceil(x: u64) -> u64 {
    if x % 1000 == 0 { x } else { (x / 1000 + 1) * 1000 }
}

/// Degradation level of one container on a `kj` node: 0 = runs as
/// authored, 1 = fits with mild degradation, 2 = limit headroom lost,
/// 3 = infeasible (Filter should have removed the node).
fn hice_level(req: u64, lmt: u64, kb: f64, kj: f64) -> u8 {
    if kb <= kj {
        return 0;
    }
    if req == 0 && lmt == 0 {
        return 0;
    }
    let req = if req == 0 { lmt } else { req };
    let hice_req = (req as f64 / kj * kb) as u64;
    let hice_lmt = (lmt as f64 / kj * kb) as u64;
    if hice_req <= m_ceil(req) {
        if hice_lmt <= m_ceil(lmt) { 1 } else { 2 }
    } else {
        3
    }
}

impl Plugin for PerfPlugin {
    fn name(&self) -> &str {
        NAME
    }
}

impl FilterPlugin for PerfPlugin {
    fn filter(&self, _state: &mut CycleState, pod: &PodInfo, node_info: &NodeInfo) -> Status {
        let kb = pod.perf_baseline();
        let kj = node_info.perf_factor();

        // A container needing 0.8 reference cores must not rescale into
        // more than one whole core here.
        let max_req_milli = pod
            .containers
            .iter()
            .map(|c| c.requests.milli_cpu)
            .max()
            .unwrap_or(0);
        let max_req_cores = max_req_milli as f64 / 1000.0;
        if max_req_cores / kj * kb > max_req_cores.ceil() {
            return Status::unschedulable(ERR_REASON_PERF);
        }

        let mut pod_request = pod.resource_request();
        pod_request.milli_cpu = (pod_request.milli_cpu as f64 * kb / kj) as u64;

        let insufficient = fits_request(&pod_request, node_info);
        if insufficient.is_empty() {
            Status::default()
        } else {
            Status::new(
                Code::Unschedulable,
                insufficient.into_iter().map(|r| r.reason).collect(),
            )
        }
    }
}

impl ScorePlugin for PerfPlugin {
    fn score(&self, _state: &mut CycleState, pod: &PodInfo, node_info: &NodeInfo) -> (i64, Status) {
        let kj = node_info.perf_factor();
        if !pod.has_perf_baseline() {
            return (100, Status::default());
        }
        let kb = pod.perf_baseline();

        let level = pod
            .containers
            .iter()
            .map(|c| hice_level(c.requests.milli_cpu, c.limits.milli_cpu, kb, kj))
            .max()
            .unwrap_or(0);

        let score = match level {
            0 => 100,
            1 => (51.0 + 49.0 * kj / kb) as i64,
            2 => (1.0 + 49.0 * kj / kb) as i64,
            _ => 0,
        };
        trace!(
            "perf score of {} on {}: level {level} -> {score}",
            pod.name, node_info.name
        );
        (score, Status::default())
    }
}

#[async_trait]
impl BindPlugin for PerfPlugin {
    async fn bind(&self, state: &mut CycleState, pod: &PodInfo, node_name: &str) -> Status {
        debug!(
            "attempting to bind {}/{} to {node_name}",
            pod.namespace, pod.name
        );
        let (kj, arch) = {
            let snapshot = self.snapshot.read().expect("snapshot lock poisoned");
            match snapshot.get(node_name) {
                Some(node) => (node.perf_factor(), node.arch()),
                None => return Status::error(format!("node {node_name} not in snapshot")),
            }
        };
        let kb = pod.perf_baseline();

        let images = image_snapshot_from_state(state);
        let mut patches = match arch {
            Some(arch) => image_patches(pod, arch, &images),
            None => Vec::new(),
        };

        for container in &pod.containers {
            let cpu_request_milli = (container.requests.milli_cpu != 0)
                .then(|| (container.requests.milli_cpu as f64 * kb / kj) as u64);
            let cpu_limit_milli = (container.limits.milli_cpu != 0)
                .then(|| (container.limits.milli_cpu as f64 * kb / kj) as u64);
            if cpu_request_milli.is_none() && cpu_limit_milli.is_none() {
                continue;
            }
            match patches.iter_mut().find(|p| p.name == container.name) {
                Some(patch) => {
                    patch.cpu_request_milli = cpu_request_milli;
                    patch.cpu_limit_milli = cpu_limit_milli;
                }
                None => patches.push(ContainerPatch {
                    name: container.name.clone(),
                    image: None,
                    cpu_request_milli,
                    cpu_limit_milli,
                }),
            }
        }

        match commit_assignment(
            self.catalog.as_ref(),
            &pod.namespace,
            &pod.name,
            node_name,
            &patches,
        )
        .await
        {
            Ok(()) => Status::default(),
            Err(e) => Status::error(format!("committing pod assignment: {e:#}")),
        }
    }
}

impl EnqueueExtension for PerfPlugin {
    fn events_to_register(&self) -> Vec<ClusterEventWithHint> {
        vec![
            ClusterEventWithHint {
                event: ClusterEvent {
                    resource: EventResource::Pod,
                    action_type: ActionType::Delete,
                },
                queueing_hint_fn: Some(Box::new(|pod, event| match event {
                    EventInner::Pod(_, None) => {
                        trace!("a pod was deleted, requeueing pod {}", pod.name);
                        QueueingHint::Queue
                    }
                    _ => QueueingHint::Skip,
                })),
            },
            ClusterEventWithHint {
                event: ClusterEvent {
                    resource: EventResource::Node,
                    action_type: ActionType::Add
                        | ActionType::UpdateNodeAllocatable
                        | ActionType::UpdateNodeLabel,
                },
                queueing_hint_fn: Some(Box::new(|pod, event| match event {
                    EventInner::Node(_, Some(_)) => {
                        trace!("node capacity or labels changed, requeueing pod {}", pod.name);
                        QueueingHint::Queue
                    }
                    _ => QueueingHint::Skip,
                })),
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::models::{ContainerInfo, NodeResources};

    fn pod(req_milli: u64, kb: Option<f64>) -> PodInfo {
        let mut labels = HashMap::new();
        if let Some(kb) = kb {
            labels.insert("hice.kb".to_string(), kb.to_string());
        }
        PodInfo {
            name: "p".to_string(),
            labels,
            scheduler_name: Some(SCHEDULER_NAME.to_string()),
            containers: vec![ContainerInfo {
                name: "c".to_string(),
                image: "img".to_string(),
                requests: Resources {
                    milli_cpu: req_milli,
                    ..Default::default()
                },
                limits: Resources::default(),
            }],
            ..Default::default()
        }
    }

    fn node(name: &str, kj: f64, alloc_milli: u64) -> NodeInfo {
        let mut labels = HashMap::new();
        labels.insert("hice.kj".to_string(), kj.to_string());
        NodeInfo {
            name: name.to_string(),
            labels,
            allocatable: NodeResources {
                milli_cpu: alloc_milli,
                memory: 8 << 30,
                ephemeral_storage: 100 << 30,
                pods: 110,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn plugin() -> PerfPlugin {
        let catalog = Arc::new(libcatalog::MemoryCatalog::new());
        let snapshot = crate::snapshot::shared(crate::snapshot::Snapshot::default());
        PerfPlugin::new(catalog, snapshot)
    }

    #[test]
    fn m_ceil_rounds_to_whole_cores() {
        assert_eq!(m_ceil(0), 0);
        assert_eq!(m_ceil(800), 1000);
        assert_eq!(m_ceil(1000), 1000);
        assert_eq!(m_ceil(1500), 2000);
    }

    #[test]
    fn hice_level_classifies_degradation() {
        // Node at least as fast as the reference: always level 0.
        assert_eq!(hice_level(800, 1000, 1.0, 1.0), 0);
        assert_eq!(hice_level(800, 1000, 1.0, 2.0), 0);
        // No requests at all: level 0.
        assert_eq!(hice_level(0, 0, 2.0, 1.0), 0);
        // Mild degradation: rescaled request still under the core ceiling.
        assert_eq!(hice_level(100, 0, 2.0, 1.0), 1);
        // Limit blows past its ceiling while the request fits.
        assert_eq!(hice_level(100, 900, 2.0, 1.0), 2);
        // Request itself no longer fits a whole core.
        assert_eq!(hice_level(800, 0, 2.0, 1.0), 3);
    }

    #[test]
    fn rescaled_request_fits_or_rejects() {
        let perf = plugin();
        let mut state = CycleState::default();

        // 500m at kb=2.0 becomes 1000m on a kj=1.0 node: exactly fits.
        let p = pod(500, Some(2.0));
        let status = perf.filter(&mut state, &p, &node("fast", 1.0, 1000));
        assert!(status.is_success());

        // The same pod on a kj=0.5 node needs 2000m of 1000m: rejected,
        // and the per-container ceiling trips first.
        let status = perf.filter(&mut state, &p, &node("slow", 0.5, 1000));
        assert_eq!(status.code, Code::Unschedulable);
        assert_eq!(status.reasons, vec![ERR_REASON_PERF.to_string()]);

        // Two 500m containers pass the per-container ceiling but their
        // rescaled sum of 2000m overflows a 1500m node.
        let mut two = pod(500, Some(2.0));
        let mut second = two.containers[0].clone();
        second.name = "c2".to_string();
        two.containers.push(second);
        let status = perf.filter(&mut state, &two, &node("fast", 1.0, 1500));
        assert_eq!(status.code, Code::Unschedulable);
        assert_eq!(status.reasons, vec!["insufficient hice cpu".to_string()]);
    }

    #[test]
    fn per_container_ceiling_rejects_slow_nodes() {
        let perf = plugin();
        let mut state = CycleState::default();

        // 800m at kb=2.0 on a kj=1.0 node would need 1.6 cores where the
        // reference needed less than one: infeasible per container.
        let p = pod(800, Some(2.0));
        let status = perf.filter(&mut state, &p, &node("fast", 1.0, 8000));
        assert_eq!(status.code, Code::Unschedulable);
        assert_eq!(status.reasons, vec![ERR_REASON_PERF.to_string()]);
    }

    #[test]
    fn resident_unsynced_pods_are_rescaled_into_node_demand() {
        let mut n = node("slow", 0.5, 4000);
        // Assumed copy: our scheduler, no node name yet, authored at kb=2.
        let mut assumed = pod(500, Some(2.0));
        assumed.node_name = None;
        n.pods.push(assumed);
        // Synced pod: already rescaled, raw values count.
        let mut synced = pod(300, Some(2.0));
        synced.node_name = Some("slow".to_string());
        n.pods.push(synced);
        // Foreign pod: raw values count.
        let mut foreign = pod(200, None);
        foreign.scheduler_name = None;
        n.pods.push(foreign);

        // 500 * 2.0 / 0.5 = 2000, plus 300 and 200 raw.
        assert_eq!(hice_requested_milli(&n), 2500);
    }

    #[test]
    fn pod_count_capacity_is_enforced() {
        let mut n = node("tiny", 1.0, 64_000);
        n.allocatable.pods = 1;
        n.pods.push(pod(0, None));
        let insufficient = fits_request(&Resources::default(), &n);
        assert_eq!(insufficient.len(), 1);
        assert_eq!(insufficient[0].reason, "too many pods");
    }

    #[test]
    fn score_without_baseline_label_is_full() {
        let perf = plugin();
        let mut state = CycleState::default();
        let (score, status) = perf.score(&mut state, &pod(500, None), &node("slow", 0.25, 1000));
        assert!(status.is_success());
        assert_eq!(score, 100);
    }

    #[test]
    fn level_one_scores_order_by_node_performance() {
        let perf = plugin();
        let mut state = CycleState::default();

        // kb=2.0, request 100m: level 1 everywhere, score 51 + 49*kj/kb.
        let p = pod(100, Some(2.0));
        let expected = [(1.0, 75), (0.8, 70), (0.5, 63)];
        let mut scores = Vec::new();
        for (kj, want) in expected {
            let (score, status) = perf.score(&mut state, &p, &node("n", kj, 8000));
            assert!(status.is_success());
            assert_eq!(score, want);
            scores.push(score);
        }
        // Strictly ordered by node performance.
        assert!(scores[0] > scores[1] && scores[1] > scores[2]);
    }

    #[test]
    fn admitted_nodes_always_score_positive() {
        let perf = plugin();
        let mut state = CycleState::default();
        let p = pod(100, Some(2.0));
        for kj in [0.25, 0.5, 1.0, 2.0] {
            let n = node("n", kj, 8000);
            if perf.filter(&mut state, &p, &n).is_success() {
                let (score, _) = perf.score(&mut state, &p, &n);
                assert!(score > 0, "kj={kj} passed Filter but scored {score}");
            }
        }
    }
}
