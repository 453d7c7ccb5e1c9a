use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    #[serde(rename = "ownerReferences", default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
}

fn default_namespace() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OwnerReference {
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub controller: bool,
}

/// Named resource quantities as they appear in manifests (`"500m"`, `"2"`,
/// `"64Mi"`). Parsed into numbers by [`crate::quantity`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceList {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    #[serde(
        rename = "ephemeral-storage",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub ephemeral_storage: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerResources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests: Option<ResourceList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<ResourceList>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ContainerResources>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PodSpec {
    #[serde(default)]
    pub containers: Vec<ContainerSpec>,
    #[serde(rename = "initContainers", default, skip_serializing_if = "Vec::is_empty")]
    pub init_containers: Vec<ContainerSpec>,
    #[serde(rename = "schedulerName", default, skip_serializing_if = "Option::is_none")]
    pub scheduler_name: Option<String>,
    #[serde(rename = "nodeName", default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overhead: Option<ResourceList>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodCondition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
    #[serde(
        rename = "lastTransitionTime",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl PodCondition {
    pub fn scheduled() -> Self {
        Self {
            condition_type: "PodScheduled".to_string(),
            status: "True".to_string(),
            last_transition_time: Some(Utc::now()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub name: String,
    #[serde(rename = "containerID", default)]
    pub container_id: String,
}

impl ContainerStatus {
    /// The runtime-local container id, with the `docker://`-style scheme
    /// prefix stripped.
    pub fn runtime_id(&self) -> &str {
        match self.container_id.split_once("://") {
            Some((_, id)) => id,
            None => &self.container_id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PodStatus {
    #[serde(default)]
    pub phase: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<PodCondition>,
    #[serde(
        rename = "containerStatuses",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub container_statuses: Vec<ContainerStatus>,
}

/// A pod as stored under `/registry/pods/{namespace}/{name}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodTask {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: PodSpec,
    #[serde(default)]
    pub status: PodStatus,
}

impl PodTask {
    pub fn registry_key(&self) -> String {
        format!(
            "/registry/pods/{}/{}",
            self.metadata.namespace, self.metadata.name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POD_YAML: &str = r#"
apiVersion: v1
kind: Pod
metadata:
  name: nginx-hc-pod
  labels:
    app: nginx-hc
    hice.kb: "2.0"
  annotations:
    team: platform
spec:
  schedulerName: rhice-scheduler
  containers:
  - name: nginx
    image: nginx1:latest
    resources:
      requests:
        cpu: 100m
      limits:
        cpu: 200m
  - name: cache
    image: local-registry:5000/redis:latest
    resources:
      requests:
        cpu: 100m
        memory: 64Mi
"#;

    #[test]
    fn pod_round_trip_preserves_scheduling_fields() {
        let mut pod: PodTask = serde_yaml::from_str(POD_YAML).unwrap();
        pod.spec.node_name = Some("edge-1".to_string());

        let encoded = serde_yaml::to_string(&pod).unwrap();
        let decoded: PodTask = serde_yaml::from_str(&encoded).unwrap();

        assert_eq!(decoded.spec.containers[0].image, "nginx1:latest");
        assert_eq!(
            decoded.spec.containers[0]
                .resources
                .as_ref()
                .unwrap()
                .requests
                .as_ref()
                .unwrap()
                .cpu
                .as_deref(),
            Some("100m")
        );
        assert_eq!(
            decoded.spec.scheduler_name.as_deref(),
            Some("rhice-scheduler")
        );
        assert_eq!(decoded.metadata.labels["hice.kb"], "2.0");
        assert_eq!(decoded.metadata.annotations["team"], "platform");
        assert_eq!(decoded.spec.node_name.as_deref(), Some("edge-1"));
        assert_eq!(decoded.metadata.namespace, "default");
    }

    #[test]
    fn runtime_id_strips_scheme_prefix() {
        let status = ContainerStatus {
            name: "nginx".to_string(),
            container_id: "docker://abcdef0123".to_string(),
        };
        assert_eq!(status.runtime_id(), "abcdef0123");

        let bare = ContainerStatus {
            name: "nginx".to_string(),
            container_id: "abcdef0123".to_string(),
        };
        assert_eq!(bare.runtime_id(), "abcdef0123");
    }
}
