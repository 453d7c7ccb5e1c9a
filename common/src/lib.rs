//! Shared definitions for the rhice scheduler extensions.
//!
//! Everything that crosses a crate boundary lives here: the pod/node
//! registry objects, resource-quantity parsing, the multi-arch image
//! catalog shapes and the monitor wire format.

pub mod arch;
pub mod images;
pub mod node;
pub mod pod;
pub mod quantity;
pub mod stats;

pub use arch::{Arch, Os};
pub use node::Node;
pub use pod::PodTask;

/// Scheduler identity carried in `PodSpec::scheduler_name` by pods that
/// opted into heterogeneity-aware scheduling.
pub const SCHEDULER_NAME: &str = "rhice-scheduler";

/// Node label holding the CPU instruction-set architecture.
pub const ARCH_LABEL: &str = "kubernetes.io/arch";

/// Node label holding the node's single-thread performance factor (kj).
pub const PERF_NODE_LABEL: &str = "hice.kj";

/// Pod label holding the reference node's performance factor (kb) against
/// which the pod's CPU quantities were authored.
pub const PERF_BASELINE_LABEL: &str = "hice.kb";

/// Pod label naming the microservice the pod belongs to.
pub const SERVICE_LABEL: &str = "app";
