// Copyright 2025-2026 CEMAXECUTER LLC

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use bt_output::SinkSpec;
use bt_protocol::{AccessAddress, AdvertisingChannel, CrcErrorBudget, LinkLayerAddress};

/// Device-side CRC verification request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrcPolicy {
    Enable,
    Disable,
    /// Keep and report whatever the device currently does
    #[default]
    Query,
}

/// One operator request. Arguments are validated before a mode is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestedMode {
    Follow { channel: AdvertisingChannel },
    Promiscuous,
    Transmit { channel: AdvertisingChannel, address: LinkLayerAddress },
    GetAccessAddress,
    SetAccessAddress(AccessAddress),
    CrcVerify(CrcPolicy),
    SetTarget(LinkLayerAddress),
    FauxSlave { channel: AdvertisingChannel, address: LinkLayerAddress },
}

impl fmt::Display for RequestedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestedMode::Follow { channel } => write!(f, "follow on {}", channel),
            RequestedMode::Promiscuous => f.write_str("promiscuous"),
            RequestedMode::Transmit { channel, address } => {
                write!(f, "transmit {} on {}", address, channel)
            }
            RequestedMode::GetAccessAddress => f.write_str("get access address"),
            RequestedMode::SetAccessAddress(aa) => write!(f, "set access address {}", aa),
            RequestedMode::CrcVerify(policy) => write!(f, "CRC verify {:?}", policy),
            RequestedMode::SetTarget(mac) => write!(f, "set target {}", mac),
            RequestedMode::FauxSlave { channel, address } => {
                write!(f, "faux slave {} on {}", address, channel)
            }
        }
    }
}

/// Where raw frames come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Live device by index (-1 = first found)
    Device(i32),
    /// Recorded binary dump
    File(PathBuf),
}

/// Settings shared by every mode of one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub budget: CrcErrorBudget,
    /// Access address data-channel frames are gated against
    pub expected_aa: Option<AccessAddress>,
    pub crc_policy: CrcPolicy,
    pub poll_interval: Duration,
    pub stats: bool,
    pub sinks: Vec<SinkSpec>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            budget: CrcErrorBudget::default(),
            expected_aa: None,
            crc_policy: CrcPolicy::Query,
            poll_interval: Duration::from_micros(10),
            stats: false,
            sinks: Vec::new(),
        }
    }
}

/// Everything a run needs, fully validated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub source: Source,
    pub config: SessionConfig,
    /// In execution order
    pub modes: Vec<RequestedMode>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_display() {
        let mode = RequestedMode::SetTarget(LinkLayerAddress::new([0x22, 0x44, 0x66, 0x88, 0xaa, 0xcc]));
        assert_eq!(mode.to_string(), "set target 22:44:66:88:aa:cc");
        assert_eq!(
            RequestedMode::Follow { channel: AdvertisingChannel::Ch39 }.to_string(),
            "follow on 39 (2480 MHz)"
        );
    }
}
