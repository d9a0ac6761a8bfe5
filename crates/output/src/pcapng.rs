// Copyright 2025-2026 CEMAXECUTER LLC

use std::io::{self, Write};
use byteorder::{LittleEndian, WriteBytesExt};

use crate::pcap::{write_le_header, DLT_BLUETOOTH_LE_LL_WITH_PHDR, LE_PHDR_SIZE};
use crate::{CaptureSink, FrameRecord, SinkKind};

const BLOCK_SHB: u32 = 0x0A0D0D0A;
const BLOCK_IDB: u32 = 0x00000001;
const BLOCK_EPB: u32 = 0x00000006;
const BYTE_ORDER_MAGIC: u32 = 0x1A2B3C4D;

const SHB_LEN: u32 = 28;
const IDB_LEN: u32 = 20;
/// EPB without packet data: type, len, iface, ts_high, ts_low, caplen, len, trailing len
const EPB_OVERHEAD: usize = 32;

/// PCAPNG writer: one section, one LE interface, microsecond timestamps
pub struct PcapNgWriter<W: Write> {
    writer: W,
}

impl<W: Write> PcapNgWriter<W> {
    pub fn new(mut writer: W) -> io::Result<Self> {
        // Section header block
        writer.write_u32::<LittleEndian>(BLOCK_SHB)?;
        writer.write_u32::<LittleEndian>(SHB_LEN)?;
        writer.write_u32::<LittleEndian>(BYTE_ORDER_MAGIC)?;
        writer.write_u16::<LittleEndian>(1)?; // major
        writer.write_u16::<LittleEndian>(0)?; // minor
        writer.write_i64::<LittleEndian>(-1)?; // section length unknown
        writer.write_u32::<LittleEndian>(SHB_LEN)?;

        // Interface description block
        writer.write_u32::<LittleEndian>(BLOCK_IDB)?;
        writer.write_u32::<LittleEndian>(IDB_LEN)?;
        writer.write_u16::<LittleEndian>(DLT_BLUETOOTH_LE_LL_WITH_PHDR as u16)?;
        writer.write_u16::<LittleEndian>(0)?; // reserved
        writer.write_u32::<LittleEndian>(0)?; // snaplen: unlimited
        writer.write_u32::<LittleEndian>(IDB_LEN)?;

        writer.flush()?;
        Ok(Self { writer })
    }

    /// Write one enhanced packet block
    pub fn write_le(&mut self, rec: &FrameRecord<'_>) -> io::Result<()> {
        let mut body = Vec::with_capacity(LE_PHDR_SIZE + rec.packet.bytes().len());
        write_le_header(&mut body, rec)?;
        body.extend_from_slice(rec.packet.bytes());

        let pad = (4 - body.len() % 4) % 4;
        let total_len = (EPB_OVERHEAD + body.len() + pad) as u32;
        let ts = rec.timestamp.as_micros();

        self.writer.write_u32::<LittleEndian>(BLOCK_EPB)?;
        self.writer.write_u32::<LittleEndian>(total_len)?;
        self.writer.write_u32::<LittleEndian>(0)?; // interface id
        self.writer.write_u32::<LittleEndian>((ts >> 32) as u32)?;
        self.writer.write_u32::<LittleEndian>(ts as u32)?;
        self.writer.write_u32::<LittleEndian>(body.len() as u32)?;
        self.writer.write_u32::<LittleEndian>(body.len() as u32)?;
        self.writer.write_all(&body)?;
        self.writer.write_all(&[0u8; 3][..pad])?;
        self.writer.write_u32::<LittleEndian>(total_len)?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> CaptureSink for PcapNgWriter<W> {
    fn kind(&self) -> SinkKind {
        SinkKind::PcapNg
    }

    fn write(&mut self, rec: &FrameRecord<'_>) -> io::Result<()> {
        self.write_le(rec)
    }

    fn close(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{adv_frame, record};

    fn u32_at(buf: &[u8], at: usize) -> u32 {
        u32::from_le_bytes(buf[at..at + 4].try_into().unwrap())
    }

    #[test]
    fn test_section_and_interface_blocks() {
        let buf = PcapNgWriter::new(Vec::new()).unwrap().into_inner();
        assert_eq!(buf.len(), 48);
        assert_eq!(u32_at(&buf, 0), BLOCK_SHB);
        assert_eq!(u32_at(&buf, 8), BYTE_ORDER_MAGIC);
        assert_eq!(u32_at(&buf, 24), SHB_LEN);
        assert_eq!(u32_at(&buf, 28), BLOCK_IDB);
        assert_eq!(buf[36..38], [0, 1]); // linktype 256
        assert_eq!(u32_at(&buf, 44), IDB_LEN);
    }

    #[test]
    fn test_enhanced_packet_block_is_padded() {
        let frame = adv_frame();
        let rec = record(&frame);
        let mut writer = PcapNgWriter::new(Vec::new()).unwrap();
        writer.write_le(&rec).unwrap();
        let buf = writer.into_inner();

        let epb = &buf[48..];
        // LE header (10) + packet (15) = 25, padded to 28
        assert_eq!(epb.len(), 32 + 28);
        assert_eq!(u32_at(epb, 0), BLOCK_EPB);
        assert_eq!(u32_at(epb, 4), 60);
        let ts = ((u32_at(epb, 12) as u64) << 32) | u32_at(epb, 16) as u64;
        assert_eq!(ts, 1_000_500_000);
        assert_eq!(u32_at(epb, 20), 25);
        assert_eq!(&epb[38..53], rec.packet.bytes());
        assert_eq!(epb[53..56], [0, 0, 0]);
        assert_eq!(u32_at(epb, 56), 60);
    }
}
