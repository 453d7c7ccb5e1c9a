use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use serde::Deserialize;

/// Connection settings for the catalog store, passed down from the process
/// boundary. TLS material is optional; when any of the three paths is set,
/// all three must be.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    pub endpoints: Vec<String>,
    #[serde(default)]
    pub ca_path: Option<PathBuf>,
    #[serde(default)]
    pub cert_path: Option<PathBuf>,
    #[serde(default)]
    pub key_path: Option<PathBuf>,
    /// Dial timeout for the initial connection.
    #[serde(default = "default_dial_timeout", with = "duration_secs")]
    pub dial_timeout: Duration,
    /// Per-operation deadline; a scheduling hook never waits longer than
    /// this on the store.
    #[serde(default = "default_op_timeout", with = "duration_secs")]
    pub op_timeout: Duration,
}

fn default_dial_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_op_timeout() -> Duration {
    Duration::from_secs(1)
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

impl CatalogConfig {
    pub fn new(endpoints: Vec<String>) -> Self {
        Self {
            endpoints,
            ca_path: None,
            cert_path: None,
            key_path: None,
            dial_timeout: default_dial_timeout(),
            op_timeout: default_op_timeout(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            bail!("no catalog endpoints configured");
        }
        let tls_parts = [&self.ca_path, &self.cert_path, &self.key_path];
        let set = tls_parts.iter().filter(|p| p.is_some()).count();
        if set != 0 && set != 3 {
            bail!("catalog TLS requires ca, cert and key together");
        }
        Ok(())
    }

    pub fn tls_enabled(&self) -> bool {
        self.ca_path.is_some()
    }
}
