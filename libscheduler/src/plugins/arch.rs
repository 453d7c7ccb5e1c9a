//! Hicev1: multi-architecture awareness.
//!
//! PreFilter intersects the per-container architecture sets from the image
//! catalog, Filter admits nodes whose arch label is in the intersection,
//! and Bind rewrites every container image to the variant matching the
//! chosen node before committing the pod to the registry.
//!
//! Image substitution happens at bind rather than admission so the owning
//! controllers keep seeing the image reference they were created with.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use libcatalog::Catalog;
use log::{debug, trace, warn};

use common::Arch;
use common::images::ImagesList;

use crate::cycle_state::CycleState;
use crate::models::{NodeInfo, PodInfo};
use crate::plugins::binding::{ContainerPatch, commit_assignment};
use crate::plugins::{
    ActionType, BindPlugin, ClusterEvent, ClusterEventWithHint, EnqueueExtension, EventInner,
    EventResource, FilterPlugin, Plugin, PreFilterPlugin, QueueingHint, Status,
};
use crate::snapshot::SharedSnapshot;

pub const NAME: &str = "Hicev1";

const PRE_FILTER_STATE_KEY: &str = "PreFilterHicev1";
/// Catalog snapshot pinned for the whole cycle; the bind hooks consume
/// exactly the bytes PreFilter read.
const IMAGE_STATE_KEY: &str = "images";

const ERR_REASON_ARCH: &str = "node(s)'s arch isn't included in the pod's arches";

struct AvailableArches(HashSet<Arch>);

struct ImageSnapshot(Vec<u8>);

pub struct ArchPlugin {
    catalog: Arc<dyn Catalog>,
    snapshot: SharedSnapshot,
}

impl ArchPlugin {
    pub fn new(catalog: Arc<dyn Catalog>, snapshot: SharedSnapshot) -> Self {
        Self { catalog, snapshot }
    }
}

/// Architectures able to run every container image of the pod, plus the
/// images with no catalog entry at all.
pub fn pod_available_arches(
    pod: &PodInfo,
    images: &ImagesList,
) -> (HashSet<Arch>, Vec<String>) {
    let mut missing = Vec::new();
    let mut available: Option<HashSet<Arch>> = None;
    let all_containers = pod.containers.iter().chain(pod.init_containers.iter());
    for container in all_containers {
        match images.variants_of(&container.image) {
            None => {
                if !missing.contains(&container.image) {
                    missing.push(container.image.clone());
                }
            }
            Some(variants) => {
                let arches: HashSet<Arch> = variants.iter().map(|v| v.arch).collect();
                available = Some(match available {
                    None => arches,
                    Some(prev) => prev.intersection(&arches).copied().collect(),
                });
            }
        }
    }
    (available.unwrap_or_default(), missing)
}

/// Image substitutions for a pod bound to an `arch` node. Containers whose
/// image has no variant for the arch keep their name; Filter only lets an
/// arch through when every image has one.
pub(crate) fn image_patches(
    pod: &PodInfo,
    arch: Arch,
    images: &ImagesList,
) -> Vec<ContainerPatch> {
    pod.containers
        .iter()
        .filter_map(|container| {
            let variant = images.variant_for(&container.image, arch)?;
            Some(ContainerPatch {
                name: container.name.clone(),
                image: Some(variant.name.clone()),
                ..Default::default()
            })
        })
        .collect()
}

/// Pins the PreFilter results into the cycle state: the architectures the
/// pod can run on, and the exact catalog bytes every downstream hook of
/// this cycle must consume.
pub fn write_pre_filter_state(state: &mut CycleState, arches: HashSet<Arch>, data: Vec<u8>) {
    state.write(PRE_FILTER_STATE_KEY, Box::new(AvailableArches(arches)));
    state.write(IMAGE_STATE_KEY, Box::new(ImageSnapshot(data)));
}

pub(crate) fn image_snapshot_from_state(state: &CycleState) -> ImagesList {
    match state.read::<ImageSnapshot>(IMAGE_STATE_KEY) {
        Some(snapshot) => ImagesList::decode(&snapshot.0).unwrap_or_else(|e| {
            warn!("pinned image snapshot is undecodable: {e}");
            ImagesList::default()
        }),
        None => ImagesList::default(),
    }
}

impl Plugin for ArchPlugin {
    fn name(&self) -> &str {
        NAME
    }
}

#[async_trait]
impl PreFilterPlugin for ArchPlugin {
    async fn pre_filter(
        &self,
        state: &mut CycleState,
        pod: &PodInfo,
        _nodes: &[NodeInfo],
    ) -> Status {
        if pod.containers.is_empty() {
            return Status::error(format!("pod {} has no containers", pod.name));
        }
        let data = match self.catalog.images_snapshot().await {
            Ok(data) => data,
            Err(e) => return Status::error(format!("reading image catalog: {e:#}")),
        };
        let images = match ImagesList::decode(&data) {
            Ok(images) => images,
            Err(e) => return Status::error(format!("decoding image catalog: {e}")),
        };

        let (arches, missing) = pod_available_arches(pod, &images);
        if !missing.is_empty() {
            if let Err(e) = self.catalog.mark_unavailable(&missing).await {
                warn!("failed to record unavailable images: {e:#}");
            }
            return Status::error(format!(
                "can't find image {:?} in the multi-arch catalog",
                missing[0]
            ));
        }

        debug!("pod {} can run on arches {arches:?}", pod.name);
        write_pre_filter_state(state, arches, data);
        Status::default()
    }
}

impl FilterPlugin for ArchPlugin {
    fn filter(&self, state: &mut CycleState, _pod: &PodInfo, node_info: &NodeInfo) -> Status {
        let Some(AvailableArches(arches)) = state.read(PRE_FILTER_STATE_KEY) else {
            return Status::error(format!("reading {PRE_FILTER_STATE_KEY} from cycle state"));
        };
        match node_info.arch() {
            Some(arch) if arches.contains(&arch) => Status::default(),
            _ => Status::unschedulable(ERR_REASON_ARCH),
        }
    }
}

#[async_trait]
impl BindPlugin for ArchPlugin {
    async fn bind(&self, state: &mut CycleState, pod: &PodInfo, node_name: &str) -> Status {
        debug!(
            "attempting to bind {}/{} to {node_name}",
            pod.namespace, pod.name
        );
        let arch = {
            let snapshot = self.snapshot.read().expect("snapshot lock poisoned");
            match snapshot.get(node_name).and_then(NodeInfo::arch) {
                Some(arch) => arch,
                None => {
                    return Status::error(format!("node {node_name} has no architecture label"));
                }
            }
        };
        let images = image_snapshot_from_state(state);
        let patches = image_patches(pod, arch, &images);
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

impl EnqueueExtension for ArchPlugin {
    fn events_to_register(&self) -> Vec<ClusterEventWithHint> {
        vec![ClusterEventWithHint {
            event: ClusterEvent {
                resource: EventResource::Node,
                action_type: ActionType::Add | ActionType::UpdateNodeLabel,
            },
            queueing_hint_fn: Some(Box::new(|pod, event| match event {
                EventInner::Node(_, Some(node)) if node.arch().is_some() => {
                    trace!(
                        "node {} gained or changed its arch label, requeueing pod {}",
                        node.name, pod.name
                    );
                    QueueingHint::Queue
                }
                _ => QueueingHint::Skip,
            })),
        }]
    }
}
