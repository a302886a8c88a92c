//! XDP configuration and status report

use crate::capability::XdpCapability;
use crate::rlimit::MemlockLimit;
use crate::XdpError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// XDP attach mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum XdpMode {
    /// Driver mode (`XDP_FLAGS_DRV_MODE`)
    #[default]
    Native,
    /// SKB mode, works on any NIC (`XDP_FLAGS_SKB_MODE`)
    Generic,
    /// NIC offload (`XDP_FLAGS_HW_MODE`)
    Offload,
}

impl XdpMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            XdpMode::Native => "native",
            XdpMode::Generic => "generic",
            XdpMode::Offload => "offload",
        }
    }
}

impl FromStr for XdpMode {
    type Err = XdpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" | "drv" | "driver" => Ok(XdpMode::Native),
            "generic" | "skb" => Ok(XdpMode::Generic),
            "offload" | "hw" => Ok(XdpMode::Offload),
            _ => Err(XdpError::UnknownMode(s.to_string())),
        }
    }
}

impl fmt::Display for XdpMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// XDP toggle, mode and target interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XdpConfig {
    pub enabled: bool,
    pub mode: XdpMode,
    pub interface: String,
}

impl Default for XdpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: XdpMode::Native,
            interface: "eth0".to_string(),
        }
    }
}

/// Startup report served by the gateway
#[derive(Debug, Clone, Serialize)]
pub struct XdpStatus {
    pub config: XdpConfig,
    pub capability: XdpCapability,
    /// `RLIMIT_MEMLOCK` after the startup raise, if it could be read
    pub memlock: Option<MemlockLimit>,
    /// Enabled in config and supported by the host
    pub active: bool,
}

impl XdpStatus {
    pub fn new(config: XdpConfig, capability: XdpCapability, memlock: Option<MemlockLimit>) -> Self {
        let active = config.enabled && capability.supported;
        Self {
            config,
            capability,
            memlock,
            active,
        }
    }

    /// Log the status once, at info level
    pub fn log(&self) {
        if self.config.enabled && !self.capability.supported {
            tracing::info!(
                interface = %self.config.interface,
                mode = %self.config.mode,
                "XDP requested but not supported, using software path"
            );
        } else {
            tracing::info!(
                enabled = self.config.enabled,
                supported = self.capability.supported,
                bpf_fs = self.capability.bpf_fs_mounted,
                interface = %self.config.interface,
                mode = %self.config.mode,
                "XDP status"
            );
        }
    }
}
