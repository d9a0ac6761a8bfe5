// Copyright 2025-2026 CEMAXECUTER LLC

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use bt_protocol::frame::USB_PKT_SIZE;
use bt_protocol::RawFrame;

use crate::{PacketSource, Polled, TransportError};

/// Reads back a binary dump: raw device frames stored back to back.
pub struct FrameReader<R: Read> {
    reader: R,
    frames_read: u64,
    done: bool,
}

/// Dump file replay source
pub type DumpFileSource = FrameReader<BufReader<File>>;

impl DumpFileSource {
    pub fn open(path: &Path) -> Result<Self, TransportError> {
        let file = File::open(path)?;
        log::info!("reading frames from {}", path.display());
        Ok(FrameReader::new(BufReader::with_capacity(64 * 1024, file)))
    }
}

impl<R: Read> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            frames_read: 0,
            done: false,
        }
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Fill `buf` completely. Returns the number of bytes read, which is
    /// short only at end of input.
    fn read_record(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

impl<R: Read> PacketSource for FrameReader<R> {
    fn poll(&mut self) -> Result<Polled, TransportError> {
        if self.done {
            return Ok(Polled::Exhausted);
        }

        let mut buf = [0u8; USB_PKT_SIZE];
        let n = self.read_record(&mut buf)?;
        if n < USB_PKT_SIZE {
            if n > 0 {
                log::warn!("ignoring {} trailing bytes after frame {}", n, self.frames_read);
            }
            log::info!("end of capture file after {} frames", self.frames_read);
            self.done = true;
            return Ok(Polled::Exhausted);
        }

        self.frames_read += 1;
        Ok(Polled::Frame(RawFrame::from_bytes(buf)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn frame(tag: u8) -> RawFrame {
        RawFrame::with_le_packet(0, -30, &[tag; 9]).unwrap()
    }

    #[test]
    fn test_reads_frames_in_order() {
        let mut data = Vec::new();
        data.extend_from_slice(frame(1).as_bytes());
        data.extend_from_slice(frame(2).as_bytes());

        let mut source = FrameReader::new(Cursor::new(data));
        assert_eq!(source.poll().unwrap(), Polled::Frame(frame(1)));
        assert_eq!(source.poll().unwrap(), Polled::Frame(frame(2)));
        assert_eq!(source.poll().unwrap(), Polled::Exhausted);
        assert_eq!(source.poll().unwrap(), Polled::Exhausted);
        assert_eq!(source.frames_read(), 2);
    }

    #[test]
    fn test_partial_trailing_record_is_dropped() {
        let mut data = frame(7).as_bytes().to_vec();
        data.extend_from_slice(&[0u8; 20]);

        let mut source = FrameReader::new(Cursor::new(data));
        assert!(matches!(source.poll().unwrap(), Polled::Frame(_)));
        assert_eq!(source.poll().unwrap(), Polled::Exhausted);
    }

    #[test]
    fn test_empty_input() {
        let mut source = FrameReader::new(Cursor::new(Vec::new()));
        assert_eq!(source.poll().unwrap(), Polled::Exhausted);
    }

    #[test]
    fn test_missing_file_is_transport_error() {
        let err = DumpFileSource::open(Path::new("/nonexistent/capture.bin"))
            .err()
            .unwrap();
        assert!(matches!(err, TransportError::Io(_)));
    }
}
