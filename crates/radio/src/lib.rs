// Copyright 2025-2026 CEMAXECUTER LLC

pub mod file;

#[cfg(feature = "ubertooth")]
pub mod ubertooth;

use std::io;

use bt_protocol::{AccessAddress, LinkLayerAddress, RawFrame};
use thiserror::Error;

/// Sniffing parameter passed when starting connection following
pub const FOLLOW_SNIFF_PARAM: u16 = 2;

/// Radio modulation as set with the firmware's set-modulation command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modulation {
    BtLowEnergy,
}

impl Modulation {
    pub fn code(self) -> u16 {
        match self {
            Modulation::BtLowEnergy => 1,
        }
    }
}

/// Device communication failure
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("could not open Ubertooth device {0}")]
    DeviceNotFound(i32),

    #[error("USB error during {op}: {code}")]
    Usb { op: &'static str, code: i32 },

    #[error("capture file read error: {0}")]
    Io(#[from] io::Error),

    #[error("no radio backend compiled in (rebuild with the `ubertooth` feature)")]
    NoBackend,
}

/// Status word returned by commands that report success in-band (0 = ok)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandStatus(pub i32);

impl CommandStatus {
    pub const OK: CommandStatus = CommandStatus(0);

    pub fn is_ok(&self) -> bool {
        self.0 == 0
    }
}

/// Result of one poll of a packet source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Polled {
    Frame(RawFrame),
    /// Nothing available yet
    Idle,
    /// Recorded source has no more frames
    Exhausted,
}

/// Anything that produces raw frames: a live device or a recording
pub trait PacketSource {
    fn poll(&mut self) -> Result<Polled, TransportError>;
}

/// Command surface of a BLE sniffing dongle
pub trait Radio: PacketSource {
    fn set_modulation(&mut self, modulation: Modulation) -> Result<(), TransportError>;

    /// Tune to a channel in device units (MHz)
    fn set_channel(&mut self, channel: u16) -> Result<CommandStatus, TransportError>;

    fn get_channel(&mut self) -> Result<u16, TransportError>;

    fn get_access_address(&mut self) -> Result<AccessAddress, TransportError>;

    fn set_access_address(&mut self, aa: AccessAddress) -> Result<(), TransportError>;

    fn get_crc_verify(&mut self) -> Result<bool, TransportError>;

    fn set_crc_verify(&mut self, verify: bool) -> Result<(), TransportError>;

    fn begin_follow(&mut self, param: u16) -> Result<(), TransportError>;

    fn begin_promiscuous(&mut self) -> Result<(), TransportError>;

    fn stop(&mut self) -> Result<(), TransportError>;

    fn set_target(&mut self, mac: &LinkLayerAddress) -> Result<CommandStatus, TransportError>;

    fn faux_slave(&mut self, mac: &LinkLayerAddress) -> Result<(), TransportError>;

    fn transmit(&mut self, mac: &LinkLayerAddress) -> Result<CommandStatus, TransportError>;
}
