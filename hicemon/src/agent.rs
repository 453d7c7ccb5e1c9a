use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, warn};
use tokio::net::UdpSocket;

use common::stats::ContainerCpuStat;

use crate::stats::{ContainerStats, ContainerSummary, chunk_node_stat, cpu_percent};

/// Backoff after a failed datagram send; the server being down is no
/// reason to hammer the network.
const SEND_BACKOFF: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Name this node is registered under; becomes the stat batch key.
    pub node_name: String,
    /// Container runtime HTTP endpoint, e.g. `http://127.0.0.1:2375`.
    pub runtime_endpoint: String,
    /// Monitor server `host:port` the datagrams go to.
    pub server_addr: String,
    pub interval: Duration,
}

pub struct Agent {
    cfg: AgentConfig,
    http: reqwest::Client,
    socket: UdpSocket,
}

impl Agent {
    pub async fn new(cfg: AgentConfig) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .context("binding agent socket")?;
        socket
            .connect(&cfg.server_addr)
            .await
            .with_context(|| format!("connecting to monitor server {}", cfg.server_addr))?;
        Ok(Self {
            cfg,
            http: reqwest::Client::new(),
            socket,
        })
    }

    /// One sample of every running container's CPU usage.
    pub async fn sample(&self) -> Result<Vec<ContainerCpuStat>> {
        let containers: Vec<ContainerSummary> = self
            .http
            .get(format!("{}/containers/json", self.cfg.runtime_endpoint))
            .send()
            .await
            .context("listing containers")?
            .json()
            .await
            .context("decoding container list")?;

        let mut stats = Vec::with_capacity(containers.len());
        for container in containers {
            let url = format!(
                "{}/containers/{}/stats?stream=false",
                self.cfg.runtime_endpoint, container.id
            );
            let container_stats: ContainerStats = match self.http.get(&url).send().await {
                Ok(resp) => match resp.json().await {
                    Ok(stats) => stats,
                    Err(e) => {
                        warn!("undecodable stats for {}: {e}", container.id);
                        continue;
                    }
                },
                Err(e) => {
                    warn!("failed to read stats for {}: {e}", container.id);
                    continue;
                }
            };
            stats.push(ContainerCpuStat {
                id: container.id,
                usage: cpu_percent(&container_stats),
            });
        }
        Ok(stats)
    }

    pub async fn run(&self) {
        loop {
            match self.sample().await {
                Ok(stats) => {
                    debug!("sampled {} container(s)", stats.len());
                    for chunk in chunk_node_stat(&self.cfg.node_name, stats) {
                        if let Err(e) = self.socket.send(&chunk.encode()).await {
                            warn!("failed to send stat datagram: {e}");
                            tokio::time::sleep(SEND_BACKOFF).await;
                            break;
                        }
                    }
                }
                Err(e) => warn!("stat sample failed: {e:#}"),
            }
            tokio::time::sleep(self.cfg.interval).await;
        }
    }
}
