//! Relative performance estimation.
//!
//! Replicas of one controller run the same work, so their observed CPU
//! usage is an inverse proxy for node speed. The advisory for each node
//! carrying a replica is `ln(label/observed) - k`, where `label` is the
//! node's configured performance factor, `observed = 1/usage`, and `k`
//! centers the values so they sum to zero across the observed nodes.

use std::collections::HashMap;

use crate::workload::{ControllerId, WorkloadTree};

/// Per-node advisory for one controller's replica set. Nodes without a
/// usable usage sample are absent. An empty map means no replica has
/// reported yet.
pub fn controller_perf_advisory(
    tree: &WorkloadTree,
    controller: ControllerId,
    perf_labels: &HashMap<String, f64>,
) -> HashMap<String, f64> {
    let mut observed: HashMap<String, f64> = HashMap::new();
    for &pod_id in &tree.controller(controller).pods {
        let pod = tree.pod(pod_id);
        let mut perf = -1.0;
        for &container_id in &pod.containers {
            let container = tree.container(container_id);
            if container.cpu_usage == 0 {
                continue;
            }
            perf = 1.0 / container.cpu_usage as f64;
        }
        if perf > 0.0 {
            observed.insert(pod.node.clone(), perf);
        }
    }
    if observed.is_empty() {
        return observed;
    }

    let label = |node: &str| perf_labels.get(node).copied().unwrap_or(1.0);
    let k = observed
        .iter()
        .map(|(node, perf)| (label(node) / perf).ln())
        .sum::<f64>()
        / observed.len() as f64;

    observed
        .into_iter()
        .map(|(node, perf)| {
            let advisory = (label(&node) / perf).ln() - k;
            (node, advisory)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use common::PodTask;

    use super::*;
    use crate::workload::WorkloadTree;

    fn replica(name: &str, node: &str) -> PodTask {
        serde_yaml::from_str(&format!(
            r#"
apiVersion: v1
kind: Pod
metadata:
  name: {name}
  namespace: default
  ownerReferences:
  - kind: Deployment
    name: web
    controller: true
spec:
  nodeName: {node}
  containers:
  - name: main
    image: app:latest
status:
  phase: Running
  containerStatuses:
  - name: main
    containerID: docker://{name}-ctr
"#
        ))
        .unwrap()
    }

    #[test]
    fn advisories_are_centered_on_zero() {
        let pods = vec![
            replica("web-1", "n1"),
            replica("web-2", "n2"),
            replica("web-3", "n3"),
        ];
        let mut tree = WorkloadTree::build(&pods);
        tree.record_usage("web-1-ctr", 50).unwrap();
        tree.record_usage("web-2-ctr", 100).unwrap();
        let controller = tree.record_usage("web-3-ctr", 200).unwrap();

        let mut labels = HashMap::new();
        labels.insert("n1".to_string(), 2.0);

        let advisory = controller_perf_advisory(&tree, controller, &labels);
        assert_eq!(advisory.len(), 3);
        let sum: f64 = advisory.values().sum();
        assert!(sum.abs() < 1e-9, "advisories must center on zero, got {sum}");

        // n1 used half the CPU of n2 but is labeled twice as fast, so the
        // two advisories coincide; n3's heavier usage stands out.
        assert!((advisory["n1"] - advisory["n2"]).abs() < 1e-9);
        assert!(advisory["n3"] > advisory["n2"]);
    }

    #[test]
    fn silent_replicas_produce_no_advisory() {
        let pods = vec![replica("web-1", "n1"), replica("web-2", "n2")];
        let mut tree = WorkloadTree::build(&pods);
        let controller = tree.record_usage("web-1-ctr", 0).unwrap();
        let advisory = controller_perf_advisory(&tree, controller, &HashMap::new());
        assert!(advisory.is_empty());
    }
}
