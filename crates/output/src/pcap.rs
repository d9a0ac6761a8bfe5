// Copyright 2025-2026 CEMAXECUTER LLC

use std::io::{self, Write};
use byteorder::{LittleEndian, WriteBytesExt};

use crate::{CaptureSink, FrameRecord, SinkKind};

// Link-layer type constants
pub const DLT_PPI: u32 = 192;
pub const DLT_BLUETOOTH_LE_LL_WITH_PHDR: u32 = 256;

// BLE LE header flags
const LE_DEWHITENED: u16 = 0x0001;
const LE_SIGNAL_POWER_VALID: u16 = 0x0002;
const LE_REF_AA_VALID: u16 = 0x0010;
const LE_CRC_CHECKED: u16 = 0x0400;
const LE_CRC_VALID: u16 = 0x0800;

// PPI header size (no fields): version(1) + flags(1) + len(2) + dlt(4) = 8
const PPI_HDR_SIZE: usize = 8;

/// LE pseudo header: rf_channel(1) + signal(1) + noise(1) + aa_offenses(1)
/// + ref_aa(4) + flags(2)
pub const LE_PHDR_SIZE: usize = 10;

/// Largest LE packet: AA(4) + header(2) + payload(255) + CRC(3)
const MAX_LE_PACKET: usize = 4 + 2 + 255 + 3;

/// File-level link type of a PCAP capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    LeLlWithPhdr,
    Ppi,
}

impl LinkType {
    pub fn dlt(self) -> u32 {
        match self {
            LinkType::LeLlWithPhdr => DLT_BLUETOOTH_LE_LL_WITH_PHDR,
            LinkType::Ppi => DLT_PPI,
        }
    }
}

/// Flags word of the LE pseudo header for a dispatched frame
fn le_flags(rec: &FrameRecord<'_>) -> u16 {
    let mut flags: u16 = LE_DEWHITENED;
    if rec.frame.rssi_count() > 0 {
        flags |= LE_SIGNAL_POWER_VALID;
    }
    if rec.ref_aa.is_some() {
        flags |= LE_REF_AA_VALID;
    }
    if rec.crc_checked {
        flags |= LE_CRC_CHECKED;
        if rec.crc_valid {
            flags |= LE_CRC_VALID;
        }
    }
    flags
}

/// Write the 10-byte BLE LE link-layer pseudo header (packed LE)
pub fn write_le_header<W: Write>(w: &mut W, rec: &FrameRecord<'_>) -> io::Result<()> {
    let signal = if rec.frame.rssi_count() > 0 {
        rec.frame.rssi_max()
    } else {
        0
    };
    w.write_u8(rec.packet.rf_channel())?;
    w.write_i8(signal)?;
    w.write_i8(0)?; // noise power, not measured
    w.write_u8(rec.aa_offenses)?;
    w.write_u32::<LittleEndian>(rec.ref_aa.map_or(0, |aa| aa.value()))?;
    w.write_u16::<LittleEndian>(le_flags(rec))?;
    Ok(())
}

/// Write PPI header
fn write_ppi_header<W: Write>(w: &mut W, ppi_len: u16, dlt: u32) -> io::Result<()> {
    w.write_u8(0)?; // version
    w.write_u8(0)?; // flags
    w.write_u16::<LittleEndian>(ppi_len)?;
    w.write_u32::<LittleEndian>(dlt)?;
    Ok(())
}

/// PCAP file writer
pub struct PcapWriter<W: Write> {
    writer: W,
    link: LinkType,
}

impl<W: Write> PcapWriter<W> {
    /// Create a new PCAP file writer with the global header.
    pub fn new(mut writer: W, link: LinkType) -> io::Result<Self> {
        // PCAP global header
        writer.write_u32::<LittleEndian>(0xa1b2c3d4)?; // magic
        writer.write_u16::<LittleEndian>(2)?; // version_major
        writer.write_u16::<LittleEndian>(4)?; // version_minor
        writer.write_i32::<LittleEndian>(0)?; // thiszone
        writer.write_u32::<LittleEndian>(0)?; // sigfigs
        let snaplen = PPI_HDR_SIZE + LE_PHDR_SIZE + MAX_LE_PACKET;
        writer.write_u32::<LittleEndian>(snaplen as u32)?; // snaplen
        writer.write_u32::<LittleEndian>(link.dlt())?; // network
        writer.flush()?;
        Ok(Self { writer, link })
    }

    /// Write a BLE packet record
    pub fn write_le(&mut self, rec: &FrameRecord<'_>) -> io::Result<()> {
        let ppi_len = match self.link {
            LinkType::Ppi => PPI_HDR_SIZE,
            LinkType::LeLlWithPhdr => 0,
        };
        let total_len = ppi_len + LE_PHDR_SIZE + rec.packet.bytes().len();

        // PCAP record header
        self.writer.write_u32::<LittleEndian>(rec.timestamp.tv_sec as u32)?;
        self.writer.write_u32::<LittleEndian>((rec.timestamp.tv_nsec / 1000) as u32)?;
        self.writer.write_u32::<LittleEndian>(total_len as u32)?;
        self.writer.write_u32::<LittleEndian>(total_len as u32)?;

        if self.link == LinkType::Ppi {
            write_ppi_header(&mut self.writer, ppi_len as u16, DLT_BLUETOOTH_LE_LL_WITH_PHDR)?;
        }

        write_le_header(&mut self.writer, rec)?;

        // Packet data
        self.writer.write_all(rec.packet.bytes())?;
        self.writer.flush()?;
        Ok(())
    }

    /// Flush the writer
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    /// Get inner writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> CaptureSink for PcapWriter<W> {
    fn kind(&self) -> SinkKind {
        SinkKind::Pcap
    }

    fn write(&mut self, rec: &FrameRecord<'_>) -> io::Result<()> {
        self.write_le(rec)
    }

    fn close(&mut self) -> io::Result<()> {
        self.flush()
    }
}
