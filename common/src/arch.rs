use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// CPU instruction-set architectures an image variant can target.
///
/// The serialized forms match the `kubernetes.io/arch` label values and the
/// architecture strings found in registry manifest lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Arch {
    #[serde(rename = "386")]
    I386,
    #[serde(rename = "amd64")]
    Amd64,
    #[serde(rename = "arm")]
    Arm,
    #[serde(rename = "arm64")]
    Arm64,
    #[serde(rename = "ppc64le")]
    Ppc64le,
    #[serde(rename = "s390x")]
    S390x,
    #[serde(rename = "mips64le")]
    Mips64le,
    #[serde(rename = "riscv64")]
    Riscv64,
}

impl Arch {
    /// All architectures, ordered so that longer names shadow their
    /// prefixes during keyword matching (`arm64` before `arm`).
    pub const ALL: [Arch; 8] = [
        Arch::I386,
        Arch::Amd64,
        Arch::Arm64,
        Arch::Arm,
        Arch::Ppc64le,
        Arch::S390x,
        Arch::Mips64le,
        Arch::Riscv64,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::I386 => "386",
            Arch::Amd64 => "amd64",
            Arch::Arm => "arm",
            Arch::Arm64 => "arm64",
            Arch::Ppc64le => "ppc64le",
            Arch::S390x => "s390x",
            Arch::Mips64le => "mips64le",
            Arch::Riscv64 => "riscv64",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Arch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "386" => Ok(Arch::I386),
            "amd64" => Ok(Arch::Amd64),
            "arm" => Ok(Arch::Arm),
            "arm64" => Ok(Arch::Arm64),
            "ppc64le" => Ok(Arch::Ppc64le),
            "s390x" => Ok(Arch::S390x),
            "mips64le" => Ok(Arch::Mips64le),
            "riscv64" => Ok(Arch::Riscv64),
            other => Err(format!("unknown architecture {other:?}")),
        }
    }
}

/// Operating systems an image variant can target. Linux-only in scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Os {
    #[default]
    #[serde(rename = "linux")]
    Linux,
}
