//! Scheduler plugin framework and the heterogeneity-aware plugin suite.
//!
//! Hook names and semantics follow the scheduling-framework convention:
//! within one cycle the host calls `QueueSort -> PreFilter -> Filter xN ->
//! Score xN -> Bind`. Filter and Score are pure over the snapshot; the
//! hooks that talk to the catalog store (`PreFilter`, `Bind`) are async.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use bitflags::bitflags;

use crate::cycle_state::CycleState;
use crate::models::{NodeInfo, PodInfo};

pub mod arch;
pub mod binding;
pub mod perf;
pub mod service_graph;

pub use arch::ArchPlugin;
pub use perf::PerfPlugin;
pub use service_graph::GraphPlugin;

pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;
}

/// Plugin name and weight. Weight only matters for Score plugins.
#[derive(Clone)]
pub struct PluginInfo {
    pub name: String,
    pub weight: i64,
}

impl PluginInfo {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            weight: 0,
        }
    }

    fn with_weight(name: &str, weight: i64) -> Self {
        Self {
            name: name.to_string(),
            weight,
        }
    }
}

/// Hook wiring by plugin name, as handed to the host's configuration.
pub struct Plugins {
    pub queue_sort: PluginInfo,
    pub pre_filter: Vec<PluginInfo>,
    pub filter: Vec<PluginInfo>,
    pub score: Vec<PluginInfo>,
    pub bind: Vec<PluginInfo>,
    pub enqueue_extensions: Vec<PluginInfo>,
}

impl Default for Plugins {
    fn default() -> Self {
        let arch = PluginInfo::new(arch::NAME);
        let perf = PluginInfo::with_weight(perf::NAME, 1);
        let graph = PluginInfo::with_weight(service_graph::NAME, 1);

        Self {
            queue_sort: graph.clone(),
            pre_filter: vec![graph.clone(), arch.clone()],
            filter: vec![arch.clone(), perf.clone()],
            score: vec![perf.clone(), graph.clone()],
            // First bind plugin that handles the pod wins; Hicev2 also
            // rewrites resources, so it runs before Hicev1.
            bind: vec![perf.clone(), arch.clone()],
            enqueue_extensions: vec![arch, perf, graph],
        }
    }
}

/// Sorts the pending queue. Returns whether `p1` should schedule earlier
/// than `p2`; equal pods compare false both ways.
pub trait QueueSortPlugin: Plugin {
    fn less(&self, p1: &PodInfo, p2: &PodInfo) -> bool;

    fn compare(&self, p1: &PodInfo, p2: &PodInfo) -> Ordering {
        if self.less(p1, p2) {
            Ordering::Less
        } else if self.less(p2, p1) {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    }
}

/// Runs once at cycle start before any per-node work. May suspend on the
/// catalog store; anything downstream hooks need is written to the cycle
/// state.
#[async_trait]
pub trait PreFilterPlugin: Plugin {
    async fn pre_filter(
        &self,
        state: &mut CycleState,
        pod: &PodInfo,
        nodes: &[NodeInfo],
    ) -> Status;
}

/// Decides whether one node can run the pod. Pure over the snapshot.
pub trait FilterPlugin: Plugin {
    fn filter(&self, state: &mut CycleState, pod: &PodInfo, node_info: &NodeInfo) -> Status;
}

/// Ranks a node that passed filtering, 0..=100, higher is better.
pub trait ScorePlugin: Plugin {
    fn score(&self, state: &mut CycleState, pod: &PodInfo, node_info: &NodeInfo) -> (i64, Status);
}

/// Commits the pod to the chosen node. The first bind plugin returning a
/// non-`Skip` status handles the pod; the rest are not called.
#[async_trait]
pub trait BindPlugin: Plugin {
    async fn bind(&self, state: &mut CycleState, pod: &PodInfo, node_name: &str) -> Status;
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ActionType: u32 {
        const Add = 1;
        const Delete = 1 << 1;
        const UpdateNodeLabel = 1 << 2;
        const UpdateNodeAllocatable = 1 << 3;
        const UpdatePodLabel = 1 << 4;
    }
}

#[derive(Clone, Copy, Debug)]
pub enum EventResource {
    Pod,
    Node,
}

pub struct ClusterEvent {
    pub resource: EventResource,
    pub action_type: ActionType,
}

/// Old and new object of a cluster event. `None` on the new side means a
/// deletion.
#[derive(Debug, Clone)]
pub enum EventInner {
    Pod(Option<PodInfo>, Option<PodInfo>),
    Node(Option<NodeInfo>, Option<NodeInfo>),
}

pub enum QueueingHint {
    Skip,
    Queue,
}

pub type QueueingHintFn = Box<dyn Fn(&PodInfo, &EventInner) -> QueueingHint + Send + Sync>;

pub struct ClusterEventWithHint {
    pub event: ClusterEvent,
    /// Decides whether the event can make a previously rejected pod
    /// schedulable; the host consults it before requeueing.
    pub queueing_hint_fn: Option<QueueingHintFn>,
}

/// Lets a plugin tell the host which cluster events may unblock pods it
/// rejected.
pub trait EnqueueExtension: Plugin {
    fn events_to_register(&self) -> Vec<ClusterEventWithHint>;
}

/// Registry of the instantiated plugins, one slot per hook.
#[derive(Clone)]
pub struct Registry {
    pub queue_sort: Arc<dyn QueueSortPlugin>,
    pub pre_filter: Vec<Arc<dyn PreFilterPlugin>>,
    pub filter: Vec<Arc<dyn FilterPlugin>>,
    pub score: Vec<(Arc<dyn ScorePlugin>, i64)>,
    pub bind: Vec<Arc<dyn BindPlugin>>,
    pub enqueue_extensions: Vec<Arc<dyn EnqueueExtension>>,
}

impl Registry {
    /// Wires the three plugins into their hooks, mirroring
    /// [`Plugins::default`].
    pub fn new(arch: Arc<ArchPlugin>, perf: Arc<PerfPlugin>, graph: Arc<GraphPlugin>) -> Self {
        Self {
            queue_sort: graph.clone(),
            pre_filter: vec![graph.clone(), arch.clone()],
            filter: vec![arch.clone(), perf.clone()],
            score: vec![(perf.clone(), 1), (graph.clone(), 1)],
            bind: vec![perf.clone(), arch.clone()],
            enqueue_extensions: vec![arch, perf, graph],
        }
    }
}

/// Outcome of one hook invocation.
#[derive(Clone, Debug)]
pub struct Status {
    pub code: Code,
    pub reasons: Vec<String>,
    pub err: String,
    pub plugin: String,
}

impl Default for Status {
    /// Default success status.
    fn default() -> Self {
        Self {
            code: Code::Success,
            reasons: vec![],
            err: String::new(),
            plugin: String::new(),
        }
    }
}

impl Status {
    pub fn new(code: Code, reasons: Vec<String>) -> Self {
        Status {
            code,
            reasons,
            err: String::new(),
            plugin: String::new(),
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            code: Code::Error,
            err: error.into(),
            ..Default::default()
        }
    }

    pub fn unschedulable(reason: &str) -> Self {
        Self::new(Code::Unschedulable, vec![reason.to_string()])
    }

    pub fn is_success(&self) -> bool {
        self.code == Code::Success
    }
}

/// Status code returned from plugins.
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum Code {
    /// Plugin ran correctly and found the pod schedulable.
    Success,
    /// Internal plugin error or unexpected input. The host requeues the pod
    /// without a backoff penalty against this plugin.
    Error,
    /// The plugin found the pod unschedulable on this node.
    Unschedulable,
    /// Unschedulable, and no later recovery (preemption etc.) could help.
    UnschedulableAndUnresolvable,
    /// A bind plugin chose not to handle this pod.
    Skip,
    /// The pod should park until an external condition holds.
    Wait,
}
