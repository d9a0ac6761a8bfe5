// Copyright 2025-2026 CEMAXECUTER LLC

pub mod address;
pub mod ble;
pub mod ble_connection;
pub mod channel;
pub mod error;
pub mod frame;

pub use address::{AccessAddress, CrcErrorBudget, LinkLayerAddress};
pub use channel::{resolve_channel, AdvertisingChannel};
pub use error::ValidationError;
pub use frame::{FrameError, LePacket, RawFrame};

use std::time::{SystemTime, UNIX_EPOCH};

/// Frequency in MHz to BLE channel number mapping.
/// Returns None for frequencies that are not a BLE channel centre.
pub fn freq_to_channel(freq_mhz: u32) -> Option<u8> {
    if !(2402..=2480).contains(&freq_mhz) || (freq_mhz - 2402) % 2 != 0 {
        return None;
    }
    let phys_channel = (freq_mhz - 2402) / 2;
    let index = match phys_channel {
        0 => 37,
        12 => 38,
        39 => 39,
        c if c < 12 => c - 1,
        c => c - 2,
    };
    Some(index as u8)
}

/// Wall-clock capture timestamp
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timespec {
    pub tv_sec: u64,
    pub tv_nsec: u64,
}

impl Timespec {
    pub fn now() -> Self {
        let d = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            tv_sec: d.as_secs(),
            tv_nsec: d.subsec_nanos() as u64,
        }
    }

    pub fn as_micros(&self) -> u64 {
        self.tv_sec * 1_000_000 + self.tv_nsec / 1000
    }
}
