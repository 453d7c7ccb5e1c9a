use std::time::Duration;

use anyhow::{Context, Result, bail};
use log::{debug, info, warn};
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use tokio::net::UdpSocket;

use common::stats::NodeStat;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// UDP listen address, e.g. `0.0.0.0:12345`.
    pub listen: String,
    /// Broker bootstrap addresses, comma separated host:port.
    pub brokers: String,
    pub topic: String,
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.brokers.is_empty() {
            bail!("no broker bootstrap addresses configured");
        }
        if self.topic.is_empty() {
            bail!("no broker topic configured");
        }
        Ok(())
    }
}

/// Validates a received datagram. Malformed input is dropped by the
/// caller; the raw bytes travel on unchanged so the consumer sees exactly
/// what the agent sent.
pub fn parse_datagram(data: &[u8]) -> Result<NodeStat> {
    NodeStat::decode(data).context("decoding node stat datagram")
}

/// Receives agent datagrams and republishes each as a keyed record on the
/// broker topic. Bad datagrams and broker hiccups are logged and skipped;
/// the server never stops consuming.
pub async fn run_server(cfg: ServerConfig) -> Result<()> {
    cfg.validate()?;
    let socket = UdpSocket::bind(&cfg.listen)
        .await
        .with_context(|| format!("binding {}", cfg.listen))?;
    let producer: FutureProducer = ClientConfig::new()
        .set("bootstrap.servers", &cfg.brokers)
        .set("partitioner", "random")
        .set("message.timeout.ms", "5000")
        .create()
        .context("creating broker producer")?;
    info!("monitor server listening on {}", cfg.listen);

    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let (len, peer) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                warn!("recv failed: {e}");
                continue;
            }
        };
        let stat = match parse_datagram(&buf[..len]) {
            Ok(stat) => stat,
            Err(e) => {
                warn!("dropping malformed datagram from {peer}: {e:#}");
                continue;
            }
        };
        debug!(
            "forwarding {} container stat(s) from {}",
            stat.containers_cpu_stat.len(),
            stat.node_name
        );
        let record = FutureRecord::to(&cfg.topic)
            .key(stat.node_name.as_bytes())
            .payload(&buf[..len]);
        if let Err((e, _)) = producer
            .send(record, Timeout::After(Duration::from_secs(5)))
            .await
        {
            warn!("failed to publish stats of {}: {e}", stat.node_name);
        }
    }
}
