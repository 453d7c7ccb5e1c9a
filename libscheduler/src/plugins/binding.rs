//! Bind-side commit: write the mutated pod straight to the registry.
//!
//! The bind hooks do not call the host's bind RPC. Instead they fetch the
//! stored pod, patch the image names, CPU quantities and node assignment in
//! one step, and put the result back. Binding is complete once the store
//! reflects the assignment; the write is last-write-wins and a later
//! controller reconciliation may overwrite it.

use anyhow::{Context, Result};
use libcatalog::Catalog;

use common::PodTask;
use common::pod::{ContainerResources, PodCondition, ResourceList};
use common::quantity::format_milli_cpu;

/// Per-container mutation to apply to the stored pod.
#[derive(Debug, Clone, Default)]
pub struct ContainerPatch {
    pub name: String,
    pub image: Option<String>,
    pub cpu_request_milli: Option<u64>,
    pub cpu_limit_milli: Option<u64>,
}

/// Applies `patches` and the node assignment to a decoded pod. The
/// `PodScheduled` condition is appended once; re-applying the same patches
/// leaves the pod unchanged apart from timestamps.
pub fn apply_assignment(pod: &mut PodTask, node_name: &str, patches: &[ContainerPatch]) {
    for container in &mut pod.spec.containers {
        let Some(patch) = patches.iter().find(|p| p.name == container.name) else {
            continue;
        };
        if let Some(image) = &patch.image {
            container.image = image.clone();
        }
        if let Some(milli) = patch.cpu_request_milli {
            let resources = container.resources.get_or_insert_with(ContainerResources::default);
            resources
                .requests
                .get_or_insert_with(ResourceList::default)
                .cpu = Some(format_milli_cpu(milli));
        }
        if let Some(milli) = patch.cpu_limit_milli {
            let resources = container.resources.get_or_insert_with(ContainerResources::default);
            resources
                .limits
                .get_or_insert_with(ResourceList::default)
                .cpu = Some(format_milli_cpu(milli));
        }
    }

    pod.spec.node_name = Some(node_name.to_string());

    let already_scheduled = pod
        .status
        .conditions
        .iter()
        .any(|c| c.condition_type == "PodScheduled");
    if !already_scheduled {
        pod.status.conditions.push(PodCondition::scheduled());
    }
}

/// Fetches the stored pod, applies the assignment and writes it back.
pub async fn commit_assignment(
    store: &dyn Catalog,
    namespace: &str,
    pod_name: &str,
    node_name: &str,
    patches: &[ContainerPatch],
) -> Result<()> {
    let mut stored = store
        .get_pod(namespace, pod_name)
        .await?
        .with_context(|| format!("pod {namespace}/{pod_name} not found in registry"))?;
    apply_assignment(&mut stored, node_name, patches);
    store.put_pod(&stored).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pod() -> PodTask {
        serde_yaml::from_str(
            r#"
apiVersion: v1
kind: Pod
metadata:
  name: web
  namespace: shop
spec:
  schedulerName: rhice-scheduler
  containers:
  - name: nginx
    image: nginx:latest
    resources:
      requests:
        cpu: 500m
      limits:
        cpu: 800m
"#,
        )
        .unwrap()
    }

    #[test]
    fn assignment_patches_image_cpu_and_node() {
        let mut p = pod();
        let patches = vec![ContainerPatch {
            name: "nginx".to_string(),
            image: Some("nginx-arm64:latest".to_string()),
            cpu_request_milli: Some(1000),
            cpu_limit_milli: Some(1600),
        }];
        apply_assignment(&mut p, "edge-1", &patches);

        assert_eq!(p.spec.containers[0].image, "nginx-arm64:latest");
        let resources = p.spec.containers[0].resources.as_ref().unwrap();
        assert_eq!(resources.requests.as_ref().unwrap().cpu.as_deref(), Some("1000m"));
        assert_eq!(resources.limits.as_ref().unwrap().cpu.as_deref(), Some("1600m"));
        assert_eq!(p.spec.node_name.as_deref(), Some("edge-1"));
        assert_eq!(p.status.conditions.len(), 1);
        assert_eq!(p.status.conditions[0].condition_type, "PodScheduled");
        assert_eq!(p.status.conditions[0].status, "True");
    }

    #[test]
    fn reapplying_the_same_assignment_is_idempotent() {
        let mut p = pod();
        let patches = vec![ContainerPatch {
            name: "nginx".to_string(),
            image: Some("nginx-arm64:latest".to_string()),
            cpu_request_milli: Some(1000),
            cpu_limit_milli: None,
        }];
        apply_assignment(&mut p, "edge-1", &patches);
        let mut again = p.clone();
        apply_assignment(&mut again, "edge-1", &patches);

        // Identical modulo the condition timestamp.
        again.status.conditions[0].last_transition_time =
            p.status.conditions[0].last_transition_time;
        assert_eq!(again, p);
    }

    #[test]
    fn unmatched_containers_are_left_alone() {
        let mut p = pod();
        let patches = vec![ContainerPatch {
            name: "sidecar".to_string(),
            image: Some("other".to_string()),
            ..Default::default()
        }];
        apply_assignment(&mut p, "edge-1", &patches);
        assert_eq!(p.spec.containers[0].image, "nginx:latest");
        assert_eq!(p.spec.node_name.as_deref(), Some("edge-1"));
    }
}
