// Copyright 2025-2026 CEMAXECUTER LLC

use thiserror::Error;

use crate::address::AccessAddress;
use crate::ble::crc_from_bytes;
use crate::freq_to_channel;

/// Size of one frame as delivered by the device (`usb_pkt_rx`)
pub const USB_PKT_SIZE: usize = 64;
/// Payload area of a frame
pub const DMA_SIZE: usize = 50;

// Frame types
pub const BR_PACKET: u8 = 0;
pub const LE_PACKET: u8 = 1;

const DATA_OFFSET: usize = USB_PKT_SIZE - DMA_SIZE;
/// AA(4) + header(2) + CRC(3)
const LE_OVERHEAD: usize = 4 + 2 + 3;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame is {0} bytes, expected 64")]
    WrongSize(usize),

    #[error("not a BLE frame (type {0})")]
    NotLowEnergy(u8),

    #[error("channel offset {0} is not a BLE channel")]
    BadChannel(u8),

    #[error("declared PDU length {0} does not fit the frame")]
    Truncated(usize),
}

/// One fixed-size frame from the packet source.
///
/// Layout (little-endian): pkt_type, status, channel (MHz above 2402),
/// clkn_high, clk100ns (u32), rssi_max, rssi_min, rssi_avg, rssi_count,
/// 2 reserved bytes, then 50 bytes of BLE packet
/// (AA(4) + header(2) + payload + CRC(3)).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    bytes: [u8; USB_PKT_SIZE],
}

impl RawFrame {
    pub fn from_bytes(bytes: [u8; USB_PKT_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn from_slice(b: &[u8]) -> Result<Self, FrameError> {
        let bytes: [u8; USB_PKT_SIZE] = b.try_into().map_err(|_| FrameError::WrongSize(b.len()))?;
        Ok(Self { bytes })
    }

    /// Wrap a BLE packet (AA through CRC) into an LE frame.
    /// Returns None if the packet does not fit the payload area.
    pub fn with_le_packet(channel_offset: u8, rssi: i8, packet: &[u8]) -> Option<Self> {
        if packet.len() > DMA_SIZE {
            return None;
        }
        let mut bytes = [0u8; USB_PKT_SIZE];
        bytes[0] = LE_PACKET;
        bytes[2] = channel_offset;
        bytes[8] = rssi as u8;
        bytes[9] = rssi as u8;
        bytes[10] = rssi as u8;
        bytes[11] = 1;
        bytes[DATA_OFFSET..DATA_OFFSET + packet.len()].copy_from_slice(packet);
        Some(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; USB_PKT_SIZE] {
        &self.bytes
    }

    pub fn pkt_type(&self) -> u8 {
        self.bytes[0]
    }

    pub fn status(&self) -> u8 {
        self.bytes[1]
    }

    pub fn channel_offset(&self) -> u8 {
        self.bytes[2]
    }

    pub fn clkn_high(&self) -> u8 {
        self.bytes[3]
    }

    pub fn clk100ns(&self) -> u32 {
        u32::from_le_bytes([self.bytes[4], self.bytes[5], self.bytes[6], self.bytes[7]])
    }

    pub fn rssi_max(&self) -> i8 {
        self.bytes[8] as i8
    }

    pub fn rssi_min(&self) -> i8 {
        self.bytes[9] as i8
    }

    pub fn rssi_avg(&self) -> i8 {
        self.bytes[10] as i8
    }

    /// Zero means the RSSI fields are not valid
    pub fn rssi_count(&self) -> u8 {
        self.bytes[11]
    }

    pub fn data(&self) -> &[u8] {
        &self.bytes[DATA_OFFSET..]
    }

    pub fn freq_mhz(&self) -> u32 {
        2402 + self.channel_offset() as u32
    }

    fn le_channel(&self) -> Result<u8, FrameError> {
        if self.pkt_type() != LE_PACKET {
            return Err(FrameError::NotLowEnergy(self.pkt_type()));
        }
        freq_to_channel(self.freq_mhz()).ok_or(FrameError::BadChannel(self.channel_offset()))
    }

    /// Borrow the BLE packet carried in this frame.
    pub fn le_packet(&self) -> Result<LePacket<'_>, FrameError> {
        let channel = self.le_channel()?;
        let data = self.data();
        let pdu_len = (data[5] & 0x3F) as usize;
        let total = LE_OVERHEAD + pdu_len;
        if total > DMA_SIZE {
            return Err(FrameError::Truncated(pdu_len));
        }

        Ok(LePacket {
            bytes: &data[..total],
            channel,
        })
    }

    /// Like `le_packet`, but a declared length running past the payload
    /// area is clamped to the whole payload area instead of rejected.
    pub fn le_packet_clamped(&self) -> Result<LePacket<'_>, FrameError> {
        match self.le_packet() {
            Err(FrameError::Truncated(_)) => Ok(LePacket {
                bytes: self.data(),
                channel: self.le_channel()?,
            }),
            other => other,
        }
    }
}

/// Borrowed view of one BLE link-layer packet: AA(4) + PDU + CRC(3)
#[derive(Debug, Clone, Copy)]
pub struct LePacket<'a> {
    bytes: &'a [u8],
    channel: u8,
}

impl<'a> LePacket<'a> {
    pub fn access_address(&self) -> AccessAddress {
        AccessAddress(u32::from_le_bytes([
            self.bytes[0],
            self.bytes[1],
            self.bytes[2],
            self.bytes[3],
        ]))
    }

    /// BLE channel index (0-39)
    pub fn channel_index(&self) -> u8 {
        self.channel
    }

    /// RF channel number (0-39, ordered by frequency)
    pub fn rf_channel(&self) -> u8 {
        let freq = match self.channel {
            37 => 2402,
            38 => 2426,
            39 => 2480,
            c if c < 11 => 2404 + 2 * c as u32,
            c => 2406 + 2 * c as u32,
        };
        ((freq - 2402) / 2) as u8
    }

    pub fn is_advertising(&self) -> bool {
        self.channel >= 37
    }

    pub fn pdu_type(&self) -> u8 {
        self.bytes[4] & 0x0F
    }

    pub fn pdu_len(&self) -> usize {
        (self.bytes[5] & 0x3F) as usize
    }

    /// Header + payload: the CRC input
    pub fn pdu(&self) -> &'a [u8] {
        &self.bytes[4..self.bytes.len() - 3]
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.bytes[6..self.bytes.len() - 3]
    }

    pub fn carried_crc(&self) -> u32 {
        let n = self.bytes.len();
        crc_from_bytes([self.bytes[n - 3], self.bytes[n - 2], self.bytes[n - 1]])
    }

    /// Whole packet, AA through CRC
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }
}
