// Copyright 2025-2026 CEMAXECUTER LLC

pub mod dump;
pub mod pcap;
pub mod pcapng;
pub mod registry;

pub use registry::SinkRegistry;

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use bt_protocol::{AccessAddress, LePacket, RawFrame, Timespec};

/// An accepted frame on its way to the sinks, with the dispatcher's verdict
#[derive(Debug, Clone, Copy)]
pub struct FrameRecord<'a> {
    pub frame: &'a RawFrame,
    pub packet: LePacket<'a>,
    pub timestamp: Timespec,
    pub crc_checked: bool,
    pub crc_valid: bool,
    pub aa_offenses: u8,
    /// Access address the frame was matched against
    pub ref_aa: Option<AccessAddress>,
}

/// Sink slot; at most one sink of each kind is open per session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkKind {
    Dump,
    Pcap,
    PcapNg,
}

/// Common interface of all capture sinks
pub trait CaptureSink {
    fn kind(&self) -> SinkKind;

    fn write(&mut self, rec: &FrameRecord<'_>) -> io::Result<()>;

    fn close(&mut self) -> io::Result<()>;
}

/// On-disk capture format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkFormat {
    /// Raw device frames, readable by the replay source
    Dump,
    /// PCAP with DLT_BLUETOOTH_LE_LL_WITH_PHDR
    PcapLe,
    /// PCAP with DLT_PPI wrapping the LE header
    PcapPpi,
    PcapNg,
}

impl SinkFormat {
    pub fn kind(self) -> SinkKind {
        match self {
            SinkFormat::Dump => SinkKind::Dump,
            SinkFormat::PcapLe | SinkFormat::PcapPpi => SinkKind::Pcap,
            SinkFormat::PcapNg => SinkKind::PcapNg,
        }
    }
}

/// A requested capture file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkSpec {
    pub format: SinkFormat,
    pub path: PathBuf,
}

impl SinkSpec {
    pub fn new(format: SinkFormat, path: impl Into<PathBuf>) -> Self {
        Self {
            format,
            path: path.into(),
        }
    }
}

/// Create the file for `format` at `path` and write its headers.
pub fn open_file_sink(format: SinkFormat, path: &Path) -> io::Result<Box<dyn CaptureSink>> {
    let writer = BufWriter::new(File::create(path)?);
    let sink: Box<dyn CaptureSink> = match format {
        SinkFormat::Dump => Box::new(dump::DumpWriter::new(writer)),
        SinkFormat::PcapLe => Box::new(pcap::PcapWriter::new(writer, pcap::LinkType::LeLlWithPhdr)?),
        SinkFormat::PcapPpi => Box::new(pcap::PcapWriter::new(writer, pcap::LinkType::Ppi)?),
        SinkFormat::PcapNg => Box::new(pcapng::PcapNgWriter::new(writer)?),
    };
    log::info!("capturing to {} ({:?})", path.display(), format);
    Ok(sink)
}
