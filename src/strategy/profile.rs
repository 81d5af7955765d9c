//! Kernel profiles and the strategy configuration selected at startup.

use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::Error;

/// Files larger than this switch to the large-file branch of the policy.
pub const DEFAULT_LARGE_FILE_THRESHOLD: u64 = 256 * 1024 * 1024;

/// Reference kernel whose I/O behaviour the selection policy is tuned for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum KernelProfile {
    /// Profile A.
    Linux,
    /// Profile B.
    Xnu,
}

impl KernelProfile {
    pub fn host() -> Self {
        if cfg!(any(target_os = "macos", target_os = "ios")) {
            KernelProfile::Xnu
        } else {
            KernelProfile::Linux
        }
    }
}

impl fmt::Display for KernelProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelProfile::Linux => f.write_str("linux"),
            KernelProfile::Xnu => f.write_str("xnu"),
        }
    }
}

impl FromStr for KernelProfile {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linux" | "a" => Ok(KernelProfile::Linux),
            "xnu" | "darwin" | "macos" | "b" => Ok(KernelProfile::Xnu),
            _ => Err(Error::InvalidArgument("unknown kernel profile")),
        }
    }
}

/// Configuration for [`crate::strategy::IoStrategy`] defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct StrategyConfig {
    /// Policy table to apply.
    /// Default: the host kernel.
    pub profile: KernelProfile,

    /// Size cutover between the small- and large-file policies.
    /// Default: 256 MiB
    pub large_file_threshold: u64,
}

impl StrategyConfig {
    pub fn for_host() -> Self {
        Self::with_profile(KernelProfile::host())
    }

    pub fn with_profile(profile: KernelProfile) -> Self {
        Self {
            profile,
            large_file_threshold: DEFAULT_LARGE_FILE_THRESHOLD,
        }
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self::for_host()
    }
}
