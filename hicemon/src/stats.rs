use serde::Deserialize;

use common::stats::{ContainerCpuStat, NodeStat};

/// One entry of the runtime's container list.
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerSummary {
    #[serde(rename = "Id")]
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CpuUsage {
    #[serde(default)]
    pub total_usage: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CpuStats {
    #[serde(default)]
    pub cpu_usage: CpuUsage,
    #[serde(default)]
    pub system_cpu_usage: u64,
    #[serde(default)]
    pub online_cpus: u64,
}

/// The slice of the runtime's stats document the agent cares about. The
/// runtime reports the previous sample alongside the current one, so one
/// request yields a usable delta.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContainerStats {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub cpu_stats: CpuStats,
    #[serde(default)]
    pub precpu_stats: CpuStats,
}

/// CPU usage in integer percent-of-cores:
/// `online_cpus * 100 * delta_total / delta_system`. The first sample of a
/// container has no previous system counter and reads as zero.
pub fn cpu_percent(stats: &ContainerStats) -> u64 {
    let total_delta = stats
        .cpu_stats
        .cpu_usage
        .total_usage
        .saturating_sub(stats.precpu_stats.cpu_usage.total_usage);
    let system_delta = stats
        .cpu_stats
        .system_cpu_usage
        .saturating_sub(stats.precpu_stats.system_cpu_usage);
    if system_delta == 0 {
        return 0;
    }
    stats.cpu_stats.online_cpus * 100 * total_delta / system_delta
}

/// Upper bound for one stat datagram on the wire.
pub const MAX_DATAGRAM_BYTES: usize = 10 * 1024;

/// Splits a batch into datagrams that each encode under the wire bound.
pub fn chunk_node_stat(node_name: &str, stats: Vec<ContainerCpuStat>) -> Vec<NodeStat> {
    let mut chunks = Vec::new();
    let mut current = NodeStat {
        node_name: node_name.to_string(),
        containers_cpu_stat: Vec::new(),
    };
    for stat in stats {
        current.containers_cpu_stat.push(stat);
        if current.encode().len() > MAX_DATAGRAM_BYTES {
            let overflow = current.containers_cpu_stat.pop().expect("just pushed");
            if !current.containers_cpu_stat.is_empty() {
                chunks.push(std::mem::replace(
                    &mut current,
                    NodeStat {
                        node_name: node_name.to_string(),
                        containers_cpu_stat: Vec::new(),
                    },
                ));
            }
            current.containers_cpu_stat.push(overflow);
        }
    }
    if !current.containers_cpu_stat.is_empty() {
        chunks.push(current);
    }
    chunks
}
