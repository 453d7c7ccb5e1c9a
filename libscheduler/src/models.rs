use std::collections::HashMap;

use common::pod::{ContainerSpec, ResourceList};
use common::quantity::{parse_cpu, parse_memory};
use common::{ARCH_LABEL, Arch, Node, PERF_BASELINE_LABEL, PERF_NODE_LABEL, PodTask, SERVICE_LABEL};

/// A resource vector in scheduler units: millicores, bytes, and named
/// extended scalar resources.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resources {
    pub milli_cpu: u64,
    pub memory: u64,
    pub ephemeral_storage: u64,
    pub scalar: HashMap<String, u64>,
}

impl Resources {
    pub fn from_resource_list(list: &ResourceList) -> Self {
        Self {
            milli_cpu: list.cpu.as_deref().map(parse_cpu).unwrap_or(0),
            memory: list.memory.as_deref().map(parse_memory).unwrap_or(0),
            ephemeral_storage: list
                .ephemeral_storage
                .as_deref()
                .map(parse_memory)
                .unwrap_or(0),
            scalar: HashMap::new(),
        }
    }

    pub fn add(&mut self, other: &Resources) {
        self.milli_cpu += other.milli_cpu;
        self.memory += other.memory;
        self.ephemeral_storage += other.ephemeral_storage;
        for (name, quantity) in &other.scalar {
            *self.scalar.entry(name.clone()).or_insert(0) += quantity;
        }
    }

    /// Per-dimension maximum. Init containers run sequentially, so the pod
    /// needs the max of any init container rather than their sum.
    pub fn set_max(&mut self, other: &Resources) {
        self.milli_cpu = self.milli_cpu.max(other.milli_cpu);
        self.memory = self.memory.max(other.memory);
        self.ephemeral_storage = self.ephemeral_storage.max(other.ephemeral_storage);
        for (name, quantity) in &other.scalar {
            let entry = self.scalar.entry(name.clone()).or_insert(0);
            *entry = (*entry).max(*quantity);
        }
    }

    pub fn is_zero(&self) -> bool {
        self.milli_cpu == 0
            && self.memory == 0
            && self.ephemeral_storage == 0
            && self.scalar.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerInfo {
    pub name: String,
    pub image: String,
    pub requests: Resources,
    pub limits: Resources,
}

impl ContainerInfo {
    fn from_spec(spec: &ContainerSpec) -> Self {
        let (requests, limits) = match &spec.resources {
            Some(res) => (
                res.requests
                    .as_ref()
                    .map(Resources::from_resource_list)
                    .unwrap_or_default(),
                res.limits
                    .as_ref()
                    .map(Resources::from_resource_list)
                    .unwrap_or_default(),
            ),
            None => (Resources::default(), Resources::default()),
        };
        Self {
            name: spec.name.clone(),
            image: spec.image.clone(),
            requests,
            limits,
        }
    }
}

/// A pod as the plugins see it: parsed quantities, label lookups, and the
/// fields the hooks actually read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PodInfo {
    pub name: String,
    pub namespace: String,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
    pub scheduler_name: Option<String>,
    pub node_name: Option<String>,
    pub containers: Vec<ContainerInfo>,
    pub init_containers: Vec<ContainerInfo>,
    pub overhead: Option<Resources>,
}

impl PodInfo {
    pub fn from_task(task: &PodTask) -> Self {
        Self {
            name: task.metadata.name.clone(),
            namespace: task.metadata.namespace.clone(),
            labels: task.metadata.labels.clone(),
            annotations: task.metadata.annotations.clone(),
            scheduler_name: task.spec.scheduler_name.clone(),
            node_name: task.spec.node_name.clone(),
            containers: task.spec.containers.iter().map(ContainerInfo::from_spec).collect(),
            init_containers: task
                .spec
                .init_containers
                .iter()
                .map(ContainerInfo::from_spec)
                .collect(),
            overhead: task.spec.overhead.as_ref().map(Resources::from_resource_list),
        }
    }

    /// The reference-node performance factor (kb) the pod's CPU quantities
    /// were authored against. Missing or malformed labels default to 1.0.
    pub fn perf_baseline(&self) -> f64 {
        label_factor(&self.labels, PERF_BASELINE_LABEL)
    }

    /// Whether the pod carries the kb label at all; scoring treats its
    /// absence differently from an explicit 1.0.
    pub fn has_perf_baseline(&self) -> bool {
        self.labels.contains_key(PERF_BASELINE_LABEL)
    }

    pub fn service(&self) -> Option<&str> {
        self.labels.get(SERVICE_LABEL).map(String::as_str)
    }

    /// The pod's total resource request: the sum over regular containers,
    /// widened per-dimension by any init container, plus pod overhead.
    pub fn resource_request(&self) -> Resources {
        let mut request = Resources::default();
        for container in &self.containers {
            request.add(&container.requests);
        }
        for container in &self.init_containers {
            request.set_max(&container.requests);
        }
        if let Some(overhead) = &self.overhead {
            request.add(overhead);
        }
        request
    }
}

/// Pod capacity assumed for nodes that don't report one.
pub const DEFAULT_POD_CAPACITY: usize = 110;

/// Allocatable capacity of a node, including the pod-count dimension.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeResources {
    pub milli_cpu: u64,
    pub memory: u64,
    pub ephemeral_storage: u64,
    pub pods: usize,
    pub scalar: HashMap<String, u64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeInfo {
    pub name: String,
    pub labels: HashMap<String, String>,
    pub allocatable: NodeResources,
    /// Raw (un-rescaled) request sum of the resident pods.
    pub requested: Resources,
    /// Pods resident on the node, including ones the host has assumed onto
    /// it but not yet committed.
    pub pods: Vec<PodInfo>,
}

impl NodeInfo {
    pub fn from_node(node: &Node) -> Self {
        let alloc = &node.status.allocatable;
        let allocatable = NodeResources {
            milli_cpu: alloc.get("cpu").map(|v| parse_cpu(v)).unwrap_or(0),
            memory: alloc.get("memory").map(|v| parse_memory(v)).unwrap_or(0),
            ephemeral_storage: alloc
                .get("ephemeral-storage")
                .map(|v| parse_memory(v))
                .unwrap_or(0),
            pods: alloc
                .get("pods")
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(DEFAULT_POD_CAPACITY),
            scalar: HashMap::new(),
        };
        Self {
            name: node.metadata.name.clone(),
            labels: node.metadata.labels.clone(),
            allocatable,
            requested: Resources::default(),
            pods: Vec::new(),
        }
    }

    /// The node's single-thread performance factor (kj), default 1.0.
    pub fn perf_factor(&self) -> f64 {
        label_factor(&self.labels, PERF_NODE_LABEL)
    }

    pub fn arch(&self) -> Option<Arch> {
        self.labels.get(ARCH_LABEL)?.parse().ok()
    }

    pub(crate) fn add_pod(&mut self, pod: PodInfo) {
        self.requested.add(&pod.resource_request());
        self.pods.push(pod);
    }
}

fn label_factor(labels: &HashMap<String, String>, key: &str) -> f64 {
    labels
        .get(key)
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(1.0)
}
