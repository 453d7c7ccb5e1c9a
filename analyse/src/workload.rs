//! The cluster workload tree: Namespace -> ControllerKind -> Controller ->
//! Pod -> Container.
//!
//! Entries live in per-level arenas and point at their parents with typed
//! indices, so walking up from a container to its controller is a lookup,
//! not a pointer chase. The tree is rebuilt wholesale on refresh and never
//! mutated structurally in between; only usage samples are written in.

use std::collections::HashMap;

use common::PodTask;
use common::quantity::parse_cpu;

/// Controller kinds whose pods take part in the analysis.
pub const CONTROLLER_KINDS: [&str; 5] = [
    "DaemonSet",
    "Deployment",
    "ReplicaSet",
    "StatefulSet",
    "ReplicationController",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NamespaceId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KindId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControllerId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PodId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContainerId(usize);

#[derive(Debug)]
pub struct NamespaceEntry {
    pub name: String,
    pub kinds: Vec<KindId>,
}

#[derive(Debug)]
pub struct KindEntry {
    pub name: String,
    pub namespace: NamespaceId,
    pub controllers: Vec<ControllerId>,
}

#[derive(Debug)]
pub struct ControllerEntry {
    pub name: String,
    pub kind: KindId,
    pub pods: Vec<PodId>,
}

#[derive(Debug)]
pub struct PodEntry {
    pub name: String,
    pub controller: ControllerId,
    pub node: String,
    pub containers: Vec<ContainerId>,
}

#[derive(Debug)]
pub struct ContainerEntry {
    pub name: String,
    pub runtime_id: String,
    pub pod: PodId,
    pub node: String,
    pub cpu_request_milli: u64,
    pub cpu_limit_milli: u64,
    /// Latest observed usage in percent-of-cores; zero until a sample
    /// arrives.
    pub cpu_usage: u64,
}

#[derive(Debug, Default)]
pub struct WorkloadTree {
    namespaces: Vec<NamespaceEntry>,
    kinds: Vec<KindEntry>,
    controllers: Vec<ControllerEntry>,
    pods: Vec<PodEntry>,
    containers: Vec<ContainerEntry>,
    by_runtime_id: HashMap<String, ContainerId>,
}

impl WorkloadTree {
    /// Builds the tree from a registry pod list: running pods owned by one
    /// of the analyzed controller kinds, one container entry per reported
    /// container status.
    pub fn build(pods: &[PodTask]) -> Self {
        let mut tree = Self::default();
        for pod in pods {
            if pod.status.phase != "Running" {
                continue;
            }
            let Some(owner) = pod
                .metadata
                .owner_references
                .iter()
                .find(|o| o.controller && CONTROLLER_KINDS.contains(&o.kind.as_str()))
            else {
                continue;
            };
            let node = pod.spec.node_name.clone().unwrap_or_default();

            let ns = tree.intern_namespace(&pod.metadata.namespace);
            let kind = tree.intern_kind(ns, &owner.kind);
            let controller = tree.intern_controller(kind, &owner.name);

            let pod_id = PodId(tree.pods.len());
            tree.pods.push(PodEntry {
                name: pod.metadata.name.clone(),
                controller,
                node: node.clone(),
                containers: Vec::new(),
            });
            tree.controllers[controller.0].pods.push(pod_id);

            for status in &pod.status.container_statuses {
                let Some(spec) = pod
                    .spec
                    .containers
                    .iter()
                    .find(|c| c.name == status.name)
                else {
                    continue;
                };
                let requests = spec
                    .resources
                    .as_ref()
                    .and_then(|r| r.requests.as_ref())
                    .and_then(|r| r.cpu.as_deref())
                    .map(parse_cpu)
                    .unwrap_or(0);
                let limits = spec
                    .resources
                    .as_ref()
                    .and_then(|r| r.limits.as_ref())
                    .and_then(|r| r.cpu.as_deref())
                    .map(parse_cpu)
                    .unwrap_or(0);

                let container_id = ContainerId(tree.containers.len());
                let runtime_id = status.runtime_id().to_string();
                tree.containers.push(ContainerEntry {
                    name: status.name.clone(),
                    runtime_id: runtime_id.clone(),
                    pod: pod_id,
                    node: node.clone(),
                    cpu_request_milli: requests,
                    cpu_limit_milli: limits,
                    cpu_usage: 0,
                });
                tree.pods[pod_id.0].containers.push(container_id);
                tree.by_runtime_id.insert(runtime_id, container_id);
            }
        }
        tree
    }

    fn intern_namespace(&mut self, name: &str) -> NamespaceId {
        if let Some(i) = self.namespaces.iter().position(|n| n.name == name) {
            return NamespaceId(i);
        }
        self.namespaces.push(NamespaceEntry {
            name: name.to_string(),
            kinds: Vec::new(),
        });
        NamespaceId(self.namespaces.len() - 1)
    }

    fn intern_kind(&mut self, namespace: NamespaceId, name: &str) -> KindId {
        if let Some(&id) = self.namespaces[namespace.0]
            .kinds
            .iter()
            .find(|&&k| self.kinds[k.0].name == name)
        {
            return id;
        }
        let id = KindId(self.kinds.len());
        self.kinds.push(KindEntry {
            name: name.to_string(),
            namespace,
            controllers: Vec::new(),
        });
        self.namespaces[namespace.0].kinds.push(id);
        id
    }

    fn intern_controller(&mut self, kind: KindId, name: &str) -> ControllerId {
        if let Some(&id) = self.kinds[kind.0]
            .controllers
            .iter()
            .find(|&&c| self.controllers[c.0].name == name)
        {
            return id;
        }
        let id = ControllerId(self.controllers.len());
        self.controllers.push(ControllerEntry {
            name: name.to_string(),
            kind,
            pods: Vec::new(),
        });
        self.kinds[kind.0].controllers.push(id);
        id
    }

    /// Attaches a usage sample to the container with this runtime id.
    /// Returns the owning controller so the caller can re-derive its
    /// advisory.
    pub fn record_usage(&mut self, runtime_id: &str, usage: u64) -> Option<ControllerId> {
        let &id = self.by_runtime_id.get(runtime_id)?;
        self.containers[id.0].cpu_usage = usage;
        Some(self.pods[self.containers[id.0].pod.0].controller)
    }

    pub fn controller(&self, id: ControllerId) -> &ControllerEntry {
        &self.controllers[id.0]
    }

    pub fn pod(&self, id: PodId) -> &PodEntry {
        &self.pods[id.0]
    }

    pub fn container(&self, id: ContainerId) -> &ContainerEntry {
        &self.containers[id.0]
    }

    /// Parent lookup: the namespace a controller ultimately belongs to.
    pub fn namespace_of(&self, id: ControllerId) -> &NamespaceEntry {
        let kind = &self.kinds[self.controllers[id.0].kind.0];
        &self.namespaces[kind.namespace.0]
    }

    pub fn controller_count(&self) -> usize {
        self.controllers.len()
    }

    pub fn container_count(&self) -> usize {
        self.containers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pod_yaml(name: &str, kind: &str, owner: &str, node: &str, phase: &str) -> PodTask {
        serde_yaml::from_str(&format!(
            r#"
apiVersion: v1
kind: Pod
metadata:
  name: {name}
  namespace: default
  ownerReferences:
  - kind: {kind}
    name: {owner}
    controller: true
spec:
  nodeName: {node}
  containers:
  - name: main
    image: app:latest
    resources:
      requests:
        cpu: 250m
      limits:
        cpu: 500m
status:
  phase: {phase}
  containerStatuses:
  - name: main
    containerID: docker://{name}-ctr
"#
        ))
        .unwrap()
    }

    #[test]
    fn build_keeps_running_controlled_pods_only() {
        let pods = vec![
            pod_yaml("web-1", "ReplicaSet", "web", "n1", "Running"),
            pod_yaml("web-2", "ReplicaSet", "web", "n2", "Running"),
            pod_yaml("web-3", "ReplicaSet", "web", "n1", "Pending"),
            pod_yaml("static-1", "Node", "n1", "n1", "Running"),
        ];
        let mut tree = WorkloadTree::build(&pods);
        assert_eq!(tree.controller_count(), 1);
        assert_eq!(tree.container_count(), 2);

        let controller = tree.record_usage("web-1-ctr", 40).unwrap();
        assert_eq!(tree.controller(controller).name, "web");
        assert_eq!(tree.controller(controller).pods.len(), 2);
        assert_eq!(tree.namespace_of(controller).name, "default");
        assert!(tree.record_usage("unknown-ctr", 40).is_none());
    }

    #[test]
    fn parent_indices_walk_back_up_the_tree() {
        let pods = vec![pod_yaml("web-1", "Deployment", "web", "n1", "Running")];
        let mut tree = WorkloadTree::build(&pods);
        let controller = tree.record_usage("web-1-ctr", 10).unwrap();
        let pod_id = tree.controller(controller).pods[0];
        assert_eq!(tree.pod(pod_id).node, "n1");
        let container_id = tree.pod(pod_id).containers[0];
        let container = tree.container(container_id);
        assert_eq!(container.cpu_request_milli, 250);
        assert_eq!(container.cpu_limit_milli, 500);
        assert_eq!(container.cpu_usage, 10);
        // The container's pod back-reference points at the same entry.
        assert_eq!(tree.pod(container.pod).name, "web-1");
    }
}
