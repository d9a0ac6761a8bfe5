// Copyright 2025-2026 CEMAXECUTER LLC

//! Frame builders and a counting sink shared by the app tests.

use std::cell::Cell;
use std::io;
use std::rc::Rc;

use bt_output::{CaptureSink, FrameRecord, SinkKind};
use bt_protocol::ble::{with_crc, ADV_CRC_SEED, BLE_ADV_AA, PDU_ADV_NONCONN_IND, PDU_CONNECT_IND};
use bt_protocol::RawFrame;

/// Channel offset of advertising channel 37 (2402 MHz)
pub const OFFSET_CH37: u8 = 0;
/// Channel offset of data channel 0 (2404 MHz)
pub const OFFSET_DATA0: u8 = 2;

pub fn frame_with(offset: u8, aa: u32, pdu: &[u8], seed: u32) -> RawFrame {
    let mut pkt = aa.to_le_bytes().to_vec();
    pkt.extend_from_slice(&with_crc(pdu, seed));
    RawFrame::with_le_packet(offset, -55, &pkt).unwrap()
}

/// ADV_NONCONN_IND on channel 37 carrying a valid CRC
pub fn adv_frame() -> RawFrame {
    let pdu = [PDU_ADV_NONCONN_IND, 0x06, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66];
    frame_with(OFFSET_CH37, BLE_ADV_AA, &pdu, ADV_CRC_SEED)
}

/// Copy of `frame` with the last CRC byte flipped
pub fn corrupt_crc(frame: &RawFrame) -> RawFrame {
    let mut bytes = *frame.as_bytes();
    let len = frame.le_packet().unwrap().bytes().len();
    bytes[14 + len - 1] ^= 0xFF;
    RawFrame::from_bytes(bytes)
}

/// Copy of `frame` with bits of the access address flipped
pub fn flip_aa_bits(frame: &RawFrame, mask: u32) -> RawFrame {
    let mut bytes = *frame.as_bytes();
    let aa = u32::from_le_bytes(bytes[14..18].try_into().unwrap()) ^ mask;
    bytes[14..18].copy_from_slice(&aa.to_le_bytes());
    RawFrame::from_bytes(bytes)
}

/// CONNECT_IND on channel 37 announcing `aa` with `crc_init`
pub fn connect_ind_frame(aa: u32, crc_init: u32) -> RawFrame {
    let mut pdu = vec![PDU_CONNECT_IND, 34];
    pdu.extend_from_slice(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06]); // InitA
    pdu.extend_from_slice(&[0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F]); // AdvA
    pdu.extend_from_slice(&aa.to_le_bytes());
    pdu.extend_from_slice(&crc_init.to_le_bytes()[..3]);
    pdu.push(2);
    pdu.extend_from_slice(&[0, 0]);
    pdu.extend_from_slice(&36u16.to_le_bytes());
    pdu.extend_from_slice(&0u16.to_le_bytes());
    pdu.extend_from_slice(&100u16.to_le_bytes());
    pdu.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF, 0x1F]);
    pdu.push(0x25);
    frame_with(OFFSET_CH37, BLE_ADV_AA, &pdu, ADV_CRC_SEED)
}

/// Empty LL data PDU on data channel 0
pub fn data_frame(aa: u32, seed: u32) -> RawFrame {
    frame_with(OFFSET_DATA0, aa, &[0x01, 0x00], seed)
}

/// Sink that counts writes and closes through shared cells
pub struct CountingSink {
    pub kind: SinkKind,
    pub writes: Rc<Cell<u32>>,
    pub closes: Rc<Cell<u32>>,
}

impl CountingSink {
    pub fn new(kind: SinkKind) -> (Self, Rc<Cell<u32>>, Rc<Cell<u32>>) {
        let writes = Rc::new(Cell::new(0));
        let closes = Rc::new(Cell::new(0));
        let sink = Self {
            kind,
            writes: writes.clone(),
            closes: closes.clone(),
        };
        (sink, writes, closes)
    }
}

impl CaptureSink for CountingSink {
    fn kind(&self) -> SinkKind {
        self.kind
    }

    fn write(&mut self, _rec: &FrameRecord<'_>) -> io::Result<()> {
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.closes.set(self.closes.get() + 1);
        Ok(())
    }
}
