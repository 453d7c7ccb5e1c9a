use serde::{Deserialize, Serialize};

/// CPU usage of one container, in integer percent-of-cores
/// (`online_cpus × 100 × Δtotal / Δsystem`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContainerCpuStat {
    pub id: String,
    pub usage: u64,
}

/// One monitor-agent batch: every running container's CPU usage on a node.
///
/// Travels as a single JSON UDP datagram from agent to server and is
/// republished verbatim onto the broker with the node name as record key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeStat {
    pub node_name: String,
    pub containers_cpu_stat: Vec<ContainerCpuStat>,
}

impl NodeStat {
    pub fn decode(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }

    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("node stat serialization cannot fail")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_stat_round_trips() {
        let stat = NodeStat {
            node_name: "edge-1".to_string(),
            containers_cpu_stat: vec![ContainerCpuStat {
                id: "abc123".to_string(),
                usage: 42,
            }],
        };
        assert_eq!(NodeStat::decode(&stat.encode()).unwrap(), stat);
    }

    #[test]
    fn malformed_node_stat_is_an_error() {
        assert!(NodeStat::decode(b"{\"node_name\": 3}").is_err());
        assert!(NodeStat::decode(b"not json").is_err());
    }
}
